//! Record decoding state machine.
//!
//! Each `read()` consumes exactly one epoch level record. Line
//! discovery works on the raw stream window; the window only moves
//! between records, so all offsets below are valid for the duration of
//! one call.

use log::debug;
use num_integer::div_ceil;

use crate::epoch::EpochFlag;
use crate::fields::{is_blank, parse_fixed, parse_uint};
use crate::header::Header;
use crate::stream::{Stream, BLOCK_SIZE};
use crate::sv::SvName;

use super::{Error, ObsParser, ReadStatus};

/// Observation field width: F14.3 value, LLI column, SSI column.
const FIELD: usize = 16;

macro_rules! fail {
    ($self:ident, $err:expr) => {{
        $self.error_line = line!();
        return Err($err);
    }};
}

/// Output arrays of one record, borrowed apart from the stream so the
/// window can stay borrowed while they are filled.
struct RecordBuffers<'a> {
    presence: &'a mut Vec<u8>,
    values: &'a mut Vec<i64>,
    lli: &'a mut Vec<u8>,
    ssi: &'a mut Vec<u8>,
}

impl RecordBuffers<'_> {
    fn clear(&mut self) {
        self.presence.clear();
        self.values.clear();
        self.lli.clear();
        self.ssi.clear();
    }

    fn push_satellite(&mut self, sv: SvName, bitmap_len: usize) -> usize {
        self.presence.push(sv.system);
        self.presence.push(sv.prn);
        let bitmap_start = self.presence.len();
        self.presence.resize(bitmap_start + bitmap_len, 0);
        bitmap_start
    }

    fn push_observation(&mut self, bitmap_start: usize, code_index: usize, field: &[u8; FIELD]) -> Result<(), Error> {
        let value = parse_fixed(&field[..14], 3).map_err(|_| Error::BadFormat)?;
        self.presence[bitmap_start + code_index / 8] |= 1 << (code_index % 8);
        self.values.push(value);
        self.lli.push(field[14]);
        self.ssi.push(field[15]);
        Ok(())
    }
}

/// Cursor over the body of one record.
struct FieldCursor<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn at_newline(&self) -> bool {
        self.body.get(self.pos) == Some(&b'\n')
    }

    /// Consumes the newline ending a body line.
    fn expect_newline(&mut self) -> Result<(), Error> {
        if !self.at_newline() {
            return Err(Error::BadFormat);
        }
        self.pos += 1;
        Ok(())
    }

    /// Reads one 16 column observation field, blank padded when the
    /// line ends inside it. Never consumes the newline.
    fn field(&mut self) -> [u8; FIELD] {
        let limit = self.body.len().min(self.pos + FIELD);
        let slice = &self.body[self.pos..limit];
        let take = slice.iter().position(|&b| b == b'\n').unwrap_or(slice.len());
        let mut field = [b' '; FIELD];
        field[..take].copy_from_slice(&slice[..take]);
        self.pos += take;
        field
    }
}

impl<S: Stream> ObsParser<S> {
    /// Finds the offset one past the next newline, sliding the window
    /// forward as needed. `None` is clean end of input.
    fn get_newline(&mut self) -> Result<Option<usize>, Error> {
        loop {
            let size = self.stream.size();
            let window = self.stream.buffer();
            if let Some(pos) = window[self.parse_ofs..size].iter().position(|&b| b == b'\n') {
                return Ok(Some(self.parse_ofs + pos + 1));
            }
            if self.parse_ofs == 0 {
                return Ok(None);
            }
            self.stream.advance(BLOCK_SIZE, self.parse_ofs)?;
            self.parse_ofs = 0;
        }
    }

    /// Finds `n_header + n_body` newlines from the current offset,
    /// returning the offset after the header group and the offset past
    /// the final newline. `None` means the input ended first.
    fn get_newlines(
        &mut self,
        n_header: usize,
        n_body: usize,
    ) -> Result<Option<(usize, usize)>, Error> {
        let n_total = n_header + n_body;
        if n_total == 0 {
            return Ok(Some((self.parse_ofs, self.parse_ofs)));
        }
        loop {
            let size = self.stream.size();
            let window = self.stream.buffer();
            let mut body_ofs = self.parse_ofs;
            let mut found = 0;
            let mut end = None;
            for (ii, &b) in window[self.parse_ofs..size].iter().enumerate() {
                if b != b'\n' {
                    continue;
                }
                found += 1;
                if found == n_header {
                    body_ofs = self.parse_ofs + ii + 1;
                }
                if found == n_total {
                    end = Some(self.parse_ofs + ii + 1);
                    break;
                }
            }
            if let Some(end) = end {
                return Ok(Some((body_ofs, end)));
            }
            if self.parse_ofs == 0 {
                return Ok(None);
            }
            self.stream.advance(BLOCK_SIZE, self.parse_ofs)?;
            self.parse_ofs = 0;
        }
    }

    /// Decodes a 2.x record.
    pub(super) fn read_v2(&mut self) -> Result<ReadStatus, Error> {
        let end = match self.get_newline()? {
            Some(end) => end,
            None => return Ok(ReadStatus::Eof),
        };
        let line_len = end - 1 - self.parse_ofs;
        if line_len < 32 {
            fail!(self, Error::BadFormat);
        }

        // epoch line: timestamp, flag, satellite count, clock offset
        {
            let line = &self.stream.buffer()[self.parse_ofs..];
            let flag = match EpochFlag::from_ascii(line[28]) {
                Some(flag) => flag,
                None => fail!(self, Error::BadFormat),
            };
            let fields = (|| -> Result<_, crate::fields::Error> {
                let yy = parse_uint(&line[1..3])?;
                let mm = parse_uint(&line[4..6])?;
                let dd = parse_uint(&line[7..9])?;
                let hh = parse_uint(&line[10..12])?;
                let min = parse_uint(&line[13..15])?;
                let sec = parse_fixed(&line[15..26], 7)?;
                let n_sats = parse_uint(&line[29..32])?;
                Ok((yy, mm, dd, hh, min, sec, n_sats))
            })();
            let (yy, mm, dd, hh, min, sec, n_sats) = match fields {
                Ok(f) => f,
                Err(_) => fail!(self, Error::BadFormat),
            };
            let yyyy = yy + if yy < 80 { 2000 } else { 1900 };
            self.epoch.yyyy_mm_dd = ((yyyy * 100 + mm) * 100 + dd) as i32;
            self.epoch.hh_mm = (hh * 100 + min) as i16;
            self.epoch.sec_e7 = sec as i32;
            self.epoch.flag = flag;
            self.epoch.n_sats = n_sats as i32;
            self.epoch.clock_offset_e12 = match clock_offset(line, line_len, 68, 12, 9) {
                Ok(offset) => offset * 1000,
                Err(e) => fail!(self, e),
            };
        }

        if self.epoch.flag.is_observation() {
            let n_sats = self.epoch.n_sats as usize;
            let n_obs = self.header.systems()[0].codes.len();
            let lines_per_sat = div_ceil(n_obs, 5);
            let (body_ofs, end) =
                match self.get_newlines(div_ceil(n_sats, 12), n_sats * lines_per_sat)? {
                    Some(found) => found,
                    None => fail!(self, Error::BadFormat),
                };
            let window = self.stream.buffer();
            let mut bufs = RecordBuffers {
                presence: &mut self.buffer,
                values: &mut self.values,
                lli: &mut self.lli,
                ssi: &mut self.ssi,
            };
            bufs.clear();
            let res = read_v2_observations(
                &mut bufs,
                &window[self.parse_ofs..],
                &window[body_ofs..end],
                n_sats,
                n_obs,
            );
            if let Err(e) = res {
                fail!(self, e);
            }
            self.parse_ofs = end;
            Ok(ReadStatus::Record)
        } else {
            // special event: keep the body lines verbatim
            self.parse_ofs = end;
            self.read_event_body()
        }
    }

    /// Decodes a 3.x record.
    pub(super) fn read_v3(&mut self) -> Result<ReadStatus, Error> {
        let end = match self.get_newline()? {
            Some(end) => end,
            None => return Ok(ReadStatus::Eof),
        };
        let line_len = end - 1 - self.parse_ofs;
        if line_len < 34 {
            fail!(self, Error::BadFormat);
        }

        {
            let line = &self.stream.buffer()[self.parse_ofs..];
            let flag = match EpochFlag::from_ascii(line[31]) {
                Some(flag) if line[0] == b'>' => flag,
                _ => fail!(self, Error::BadFormat),
            };
            let fields = (|| -> Result<_, crate::fields::Error> {
                let yyyy = parse_uint(&line[2..6])?;
                let mm = parse_uint(&line[7..9])?;
                let dd = parse_uint(&line[10..12])?;
                let hh = parse_uint(&line[13..15])?;
                let min = parse_uint(&line[16..18])?;
                let sec = parse_fixed(&line[18..29], 7)?;
                let n_sats = parse_uint(&line[32..35])?;
                Ok((yyyy, mm, dd, hh, min, sec, n_sats))
            })();
            let (yyyy, mm, dd, hh, min, sec, n_sats) = match fields {
                Ok(f) => f,
                Err(_) => fail!(self, Error::BadFormat),
            };
            self.epoch.yyyy_mm_dd = ((yyyy * 100 + mm) * 100 + dd) as i32;
            self.epoch.hh_mm = (hh * 100 + min) as i16;
            self.epoch.sec_e7 = sec as i32;
            self.epoch.flag = flag;
            self.epoch.n_sats = n_sats as i32;
            self.epoch.clock_offset_e12 = match clock_offset(line, line_len, 41, 15, 12) {
                Ok(offset) => offset,
                Err(e) => fail!(self, e),
            };
        }
        self.parse_ofs = end;

        if self.epoch.flag.is_observation() {
            let n_sats = self.epoch.n_sats as usize;
            let (_, end) = match self.get_newlines(0, n_sats)? {
                Some(found) => found,
                None => fail!(self, Error::BadFormat),
            };
            let window = self.stream.buffer();
            let mut bufs = RecordBuffers {
                presence: &mut self.buffer,
                values: &mut self.values,
                lli: &mut self.lli,
                ssi: &mut self.ssi,
            };
            bufs.clear();
            let res = read_v3_observations(
                &mut bufs,
                &self.header,
                &window[self.parse_ofs..end],
                n_sats,
            );
            if let Err(e) = res {
                fail!(self, e);
            }
            self.parse_ofs = end;
            Ok(ReadStatus::Record)
        } else {
            self.read_event_body()
        }
    }

    /// Copies the `n_sats` body lines of a special event verbatim.
    fn read_event_body(&mut self) -> Result<ReadStatus, Error> {
        let n_lines = self.epoch.n_sats as usize;
        let (_, end) = match self.get_newlines(0, n_lines)? {
            Some(found) => found,
            None => fail!(self, Error::BadFormat),
        };
        let window = self.stream.buffer();
        self.buffer.clear();
        self.buffer.extend_from_slice(&window[self.parse_ofs..end]);
        self.values.clear();
        self.lli.clear();
        self.ssi.clear();
        self.parse_ofs = end;
        debug!("event record: {} line(s)", n_lines);
        Ok(ReadStatus::Record)
    }
}

/// Decodes the optional receiver clock offset of an epoch line.
fn clock_offset(
    line: &[u8],
    line_len: usize,
    start: usize,
    width: usize,
    frac: usize,
) -> Result<i64, Error> {
    if line_len <= start {
        return Ok(0);
    }
    let field_end = line_len.min(start + width);
    if is_blank(&line[start..field_end]) {
        return Ok(0);
    }
    if line_len < start + width {
        return Err(Error::BadFormat);
    }
    parse_fixed(&line[start..start + width], frac).map_err(|_| Error::BadFormat)
}

/// 2.x observations: satellite names on the epoch line (12 per line),
/// then `ceil(n_obs / 5)` data lines per satellite, five 16 column
/// fields per line.
fn read_v2_observations(
    bufs: &mut RecordBuffers,
    head: &[u8],
    body: &[u8],
    n_sats: usize,
    n_obs: usize,
) -> Result<(), Error> {
    let bitmap_len = div_ceil(n_obs, 8);
    let mut cursor = FieldCursor { body, pos: 0 };
    let mut head_line = 0;

    for ii in 0..n_sats {
        let name_ofs = head_line + 32 + 3 * (ii % 12);
        let sv = SvName::from_bytes(&head[name_ofs..name_ofs + 3])
            .map_err(|_| Error::BadFormat)?;
        let bitmap_start = bufs.push_satellite(sv, bitmap_len);

        for jj in 0..n_obs {
            if !cursor.at_newline() {
                let field = cursor.field();
                if !is_blank(&field) {
                    bufs.push_observation(bitmap_start, jj, &field)?;
                }
            }
            // five observations per data line
            if jj % 5 == 4 || jj + 1 == n_obs {
                cursor.expect_newline()?;
            }
        }

        // twelve satellite names per header line
        if ii % 12 == 11 && ii + 1 < n_sats {
            let eol = head[head_line..]
                .iter()
                .position(|&b| b == b'\n')
                .ok_or(Error::BadFormat)?;
            head_line += eol + 1;
        }
    }
    Ok(())
}

/// 3.x observations: one body line per satellite, the name followed by
/// `n_obs[system]` fields. A line may end early; the remaining fields
/// are simply not observed.
fn read_v3_observations(
    bufs: &mut RecordBuffers,
    header: &Header,
    body: &[u8],
    n_sats: usize,
) -> Result<(), Error> {
    let mut cursor = FieldCursor { body, pos: 0 };

    for _ in 0..n_sats {
        if cursor.pos + 3 > body.len() {
            return Err(Error::BadFormat);
        }
        let sv = SvName::from_bytes(&body[cursor.pos..cursor.pos + 3])
            .map_err(|_| Error::BadFormat)?;
        if !header.has_system(sv.system) {
            return Err(Error::BadFormat);
        }
        cursor.pos += 3;

        let n_obs = header.n_obs(sv.system);
        let bitmap_start = bufs.push_satellite(sv, div_ceil(n_obs, 8));
        for jj in 0..n_obs {
            if cursor.at_newline() {
                break;
            }
            let field = cursor.field();
            if !is_blank(&field) {
                bufs.push_observation(bitmap_start, jj, &field)?;
            }
        }
        cursor.expect_newline()?;
    }
    Ok(())
}
