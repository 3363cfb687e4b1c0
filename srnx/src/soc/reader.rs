//! Container reader: chunk walking and table decoding.

use std::cell::Cell;
use std::fs::File;
use std::ops::Range;
use std::path::Path;

use log::debug;
use memmap2::Mmap;

use crate::epoch::Epoch;
use crate::header::{self, Header};
use crate::leb128::read_uleb128;
use crate::observable::ObsCode;
use crate::sv::SvName;

use super::digest::{DigestId, Hasher};
use super::obs::ObsReader;
use super::{epoc, Error};
use super::{MAJOR, TAG_EPOC, TAG_EVTF, TAG_RHDR, TAG_SATE, TAG_SDIR, TAG_SOCD, TAG_SRNX};

enum Data {
    Map(Mmap),
    Owned(Vec<u8>),
}

impl Data {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Map(map) => map,
            Self::Owned(vec) => vec,
        }
    }
}

/// One located chunk.
#[derive(Debug, Clone)]
struct Chunk {
    start: usize,
    payload: Range<usize>,
    /// Offset of the following chunk (digest included).
    next: usize,
}

/// Satellite directory entry.
struct SdirEntry {
    name: [u8; 3],
    offset: u64,
}

/// Cached chunk offset: negative unknown, zero absent, else the offset.
type OffsetCache = Cell<i64>;

pub struct SocReader {
    data: Data,
    /// End of the chunk area: file length minus the file digest and
    /// one chunk digest, i.e. just past the last chunk's payload.
    data_size: usize,
    major: u64,
    minor: u64,
    chunk_digest: DigestId,
    file_digest: DigestId,
    header: Header,
    rhdr: Range<usize>,
    /// First chunk after the SRNX / RHDR prefix.
    next_offset: usize,
    sdir: Option<Vec<SdirEntry>>,
    epoc_offset: OffsetCache,
    evtf_offset: OffsetCache,
}

fn uleb_at(data: &[u8], pos: &mut usize, end: usize) -> Result<u64, Error> {
    if *pos >= end {
        return Err(Error::Corrupt);
    }
    let mut slice = &data[*pos..end];
    let before = slice.len();
    let value = read_uleb128(&mut slice).ok_or(Error::Corrupt)?;
    *pos += before - slice.len();
    Ok(value)
}

fn sleb_at(data: &[u8], pos: &mut usize, end: usize) -> Result<i64, Error> {
    uleb_at(data, pos, end).map(crate::leb128::unzigzag)
}

/// Decodes one chunk at `offset` of a bounded byte area.
fn chunk_at_raw(
    bytes: &[u8],
    data_size: usize,
    chunk_digest: DigestId,
    offset: usize,
) -> Result<Chunk, Error> {
    if offset + 4 >= data_size {
        return Err(Error::Corrupt);
    }
    let mut pos = offset + 4;
    let payload_len = uleb_at(bytes, &mut pos, data_size)? as usize;
    if data_size - pos < payload_len {
        return Err(Error::Corrupt);
    }
    Ok(Chunk {
        start: offset,
        payload: pos..pos + payload_len,
        next: pos + payload_len + chunk_digest.len(),
    })
}

impl SocReader {
    /// Opens a container file through a shared memory map.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        Self::init(Data::Map(map))
    }

    /// Opens a container already held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        Self::init(Data::Owned(bytes))
    }

    fn init(data: Data) -> Result<Self, Error> {
        let bytes = data.bytes();
        if bytes.len() < 4 || &bytes[0..4] != TAG_SRNX {
            return Err(Error::NotSrnx);
        }

        // SRNX payload: versions, digest identifiers, directory offset
        let mut pos = 4;
        let payload_len = uleb_at(bytes, &mut pos, bytes.len())? as usize;
        if bytes.len() - pos < payload_len {
            return Err(Error::Corrupt);
        }
        let payload_end = pos + payload_len;

        let major = uleb_at(bytes, &mut pos, payload_end)?;
        if major != MAJOR {
            return Err(Error::BadMajor);
        }
        let minor = uleb_at(bytes, &mut pos, payload_end)?;
        let chunk_digest = DigestId::from_u64(uleb_at(bytes, &mut pos, payload_end)?)
            .ok_or(Error::Corrupt)?;
        let file_digest = DigestId::from_u64(uleb_at(bytes, &mut pos, payload_end)?)
            .ok_or(Error::Corrupt)?;
        let sdir_offset = if pos < payload_end {
            uleb_at(bytes, &mut pos, payload_end)?
        } else {
            0
        };
        // any remaining payload is padding

        let overhead = file_digest.len() + chunk_digest.len();
        let data_size = bytes
            .len()
            .checked_sub(overhead)
            .ok_or(Error::Corrupt)?;
        if payload_end + chunk_digest.len() > data_size {
            return Err(Error::Corrupt);
        }

        // RHDR must follow immediately
        let rhdr = chunk_at_raw(bytes, data_size, chunk_digest, payload_end + chunk_digest.len())?;
        if &bytes[rhdr.start..rhdr.start + 4] != TAG_RHDR {
            return Err(Error::Corrupt);
        }
        let text =
            std::str::from_utf8(&bytes[rhdr.payload.clone()]).map_err(|_| Error::Corrupt)?;
        let header = header::parse_rhdr(text).map_err(|_| Error::Corrupt)?;

        let mut reader = Self {
            data_size,
            major,
            minor,
            chunk_digest,
            file_digest,
            header,
            rhdr: rhdr.payload.clone(),
            next_offset: rhdr.next,
            sdir: None,
            epoc_offset: Cell::new(-1),
            evtf_offset: Cell::new(-1),
            data,
        };
        if sdir_offset != 0 {
            reader.load_sdir(sdir_offset as usize)?;
        }
        debug!(
            "container: version {}.{}, chunk digest {:?}, file digest {:?}",
            reader.major, reader.minor, reader.chunk_digest, reader.file_digest
        );
        Ok(reader)
    }

    /// Decodes one chunk at `offset`.
    fn chunk_at(&self, offset: usize) -> Result<Chunk, Error> {
        chunk_at_raw(self.data.bytes(), self.data_size, self.chunk_digest, offset)
    }

    /// Finds the next `tag` chunk at or after `whence`.
    fn find_chunk(&self, tag: &[u8; 4], mut whence: usize) -> Result<Chunk, Error> {
        let bytes = self.data.bytes();
        while whence + 4 < self.data_size {
            let chunk = self.chunk_at(whence)?;
            if &bytes[chunk.start..chunk.start + 4] == tag {
                return Ok(chunk);
            }
            whence = chunk.next;
        }
        Err(Error::NoChunk)
    }

    /// Finds a uniquely cached chunk, remembering where it was (or that
    /// it is absent).
    fn find_cached(&self, tag: &[u8; 4], cache: &OffsetCache) -> Result<Chunk, Error> {
        match cache.get() {
            0 => Err(Error::NoChunk),
            offset if offset > 0 => {
                let chunk = self.chunk_at(offset as usize)?;
                if &self.data.bytes()[chunk.start..chunk.start + 4] != tag {
                    return Err(Error::BadState);
                }
                Ok(chunk)
            },
            _ => match self.find_chunk(tag, self.next_offset) {
                Ok(chunk) => {
                    cache.set(chunk.start as i64);
                    Ok(chunk)
                },
                Err(Error::NoChunk) => {
                    cache.set(0);
                    Err(Error::NoChunk)
                },
                Err(e) => Err(e),
            },
        }
    }

    /// Decodes the satellite directory chunk.
    fn load_sdir(&mut self, offset: usize) -> Result<(), Error> {
        let chunk = self.chunk_at(offset)?;
        if &self.data.bytes()[chunk.start..chunk.start + 4] != TAG_SDIR {
            return Err(Error::Corrupt);
        }
        let bytes = self.data.bytes();
        let mut pos = chunk.payload.start;
        let end = chunk.payload.end;
        let epoc = uleb_at(bytes, &mut pos, end)?;
        let evtf = uleb_at(bytes, &mut pos, end)?;
        self.epoc_offset.set(epoc as i64);
        self.evtf_offset.set(evtf as i64);

        let mut entries = Vec::new();
        while pos + 3 < end {
            let mut name = [0u8; 3];
            name.copy_from_slice(&bytes[pos..pos + 3]);
            pos += 3;
            let offset = uleb_at(bytes, &mut pos, end)?;
            entries.push(SdirEntry { name, offset });
        }
        self.sdir = Some(entries);
        Ok(())
    }

    /// Container format version.
    pub fn version(&self) -> (u64, u64) {
        (self.major, self.minor)
    }

    pub fn chunk_digest(&self) -> DigestId {
        self.chunk_digest
    }

    pub fn file_digest(&self) -> DigestId {
        self.file_digest
    }

    /// The stored RINEX header text.
    pub fn header_text(&self) -> &str {
        // validated UTF-8 at open
        std::str::from_utf8(&self.data.bytes()[self.rhdr.clone()]).unwrap_or("")
    }

    /// The decoded header tables.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Decodes the epoch list.
    pub fn epochs(&self) -> Result<Vec<Epoch>, Error> {
        let chunk = self.find_cached(TAG_EPOC, &self.epoc_offset)?;
        epoc::decode(&self.data.bytes()[chunk.payload])
    }

    /// Lists the satellites stored in the container.
    pub fn satellites(&self) -> Result<Vec<SvName>, Error> {
        let mut names = Vec::new();
        if let Some(entries) = &self.sdir {
            for entry in entries {
                names.push(SvName::from_bytes(&entry.name).map_err(|_| Error::Corrupt)?);
            }
            return Ok(names);
        }

        let mut whence = self.next_offset;
        loop {
            match self.find_chunk(TAG_SATE, whence) {
                Ok(chunk) => {
                    if chunk.payload.len() < 4 {
                        return Err(Error::Corrupt);
                    }
                    let name = &self.data.bytes()[chunk.payload.start..chunk.payload.start + 3];
                    names.push(SvName::from_bytes(name).map_err(|_| Error::Corrupt)?);
                    whence = chunk.next;
                },
                Err(Error::NoChunk) => return Ok(names),
                Err(e) => return Err(e),
            }
        }
    }

    /// Iterates over special events.
    pub fn events(&self) -> Events<'_> {
        Events {
            reader: self,
            whence: None,
            done: false,
        }
    }

    /// Finds the SATE chunk of `sv`.
    fn find_sate(&self, sv: SvName) -> Result<Chunk, Error> {
        let name = sv.to_bytes();
        if let Some(entries) = &self.sdir {
            let entry = entries
                .iter()
                .find(|e| e.name == name)
                .ok_or(Error::UnknownSatellite)?;
            let chunk = self.chunk_at(entry.offset as usize)?;
            if &self.data.bytes()[chunk.start..chunk.start + 4] != TAG_SATE
                || chunk.payload.len() < 4
                || self.data.bytes()[chunk.payload.start..chunk.payload.start + 3] != name
            {
                return Err(Error::Corrupt);
            }
            return Ok(chunk);
        }

        let mut whence = self.next_offset;
        loop {
            let chunk = match self.find_chunk(TAG_SATE, whence) {
                Ok(chunk) => chunk,
                Err(Error::NoChunk) => return Err(Error::UnknownSatellite),
                Err(e) => return Err(e),
            };
            if chunk.payload.len() >= 4
                && self.data.bytes()[chunk.payload.start..chunk.payload.start + 3] == name
            {
                return Ok(chunk);
            }
            whence = chunk.next;
        }
    }

    /// Reads the per code SOCD offsets of a SATE payload. Returns the
    /// offsets and the position where the presence sequences begin.
    fn sate_offsets(&self, sv: SvName, chunk: &Chunk) -> Result<(Vec<i64>, usize), Error> {
        let n_obs = self.header.n_obs(sv.system);
        if n_obs == 0 {
            return Err(Error::UnknownSystem);
        }
        let bytes = self.data.bytes();
        let mut pos = chunk.payload.start + 4;
        let mut offsets = Vec::with_capacity(n_obs);
        for _ in 0..n_obs {
            offsets.push(sleb_at(bytes, &mut pos, chunk.payload.end)?);
        }
        Ok((offsets, pos))
    }

    /// Decodes the presence runs of one signal as `(first epoch index,
    /// count)` pairs.
    pub fn presence(&self, sv: SvName, code_index: usize) -> Result<Vec<(u64, u64)>, Error> {
        let sate = self.find_sate(sv)?;
        let (offsets, mut pos) = self.sate_offsets(sv, &sate)?;
        if code_index >= offsets.len() {
            return Err(Error::UnknownCode);
        }
        let bytes = self.data.bytes();
        let end = sate.payload.end;
        for (ii, &offset) in offsets.iter().enumerate() {
            if offset == 0 {
                if ii == code_index {
                    return Err(Error::UnknownCode);
                }
                continue;
            }
            let runs = uleb_at(bytes, &mut pos, end)? as usize + 1;
            let mut decoded = Vec::with_capacity(if ii == code_index { runs } else { 0 });
            let mut epoch = 0u64;
            for _ in 0..runs {
                let gap = uleb_at(bytes, &mut pos, end)?;
                let count = uleb_at(bytes, &mut pos, end)? + 1;
                epoch += gap;
                if ii == code_index {
                    decoded.push((epoch, count));
                }
                epoch += count;
            }
            if ii == code_index {
                return Ok(decoded);
            }
        }
        Err(Error::UnknownCode)
    }

    /// Opens the observation stream of `sv` for the code at
    /// `code_index` in its system's declared table.
    pub fn open_obs_by_index(&self, sv: SvName, code_index: usize) -> Result<ObsReader<'_>, Error> {
        if !self.header.has_system(sv.system) {
            return Err(Error::UnknownSystem);
        }
        if code_index >= self.header.n_obs(sv.system) {
            return Err(Error::UnknownCode);
        }
        let code = self.header.codes(sv.system)[code_index];

        let sate = self.find_sate(sv)?;
        let (offsets, _) = self.sate_offsets(sv, &sate)?;
        let offset = offsets[code_index];
        if offset == 0 {
            return Err(Error::UnknownCode);
        }

        // SOCD offsets are relative to the SATE tag
        let socd_start = (sate.start as i64)
            .checked_add(offset)
            .filter(|&s| s >= 0)
            .ok_or(Error::Corrupt)? as usize;
        let socd = self.chunk_at(socd_start)?;
        let bytes = self.data.bytes();
        if &bytes[socd.start..socd.start + 4] != TAG_SOCD || socd.payload.len() < 8 {
            return Err(Error::Corrupt);
        }
        let name = &bytes[socd.payload.start..socd.payload.start + 8];
        let mut expect = [0u8; 8];
        expect[0..3].copy_from_slice(&sv.to_bytes());
        expect[4..8].copy_from_slice(code.as_bytes());
        if name != expect {
            return Err(Error::Corrupt);
        }

        ObsReader::from_payload(
            &bytes[..self.data_size],
            socd.payload.start + 8,
            socd.payload.end,
        )
    }

    /// Opens the observation stream of `sv` for `code`.
    pub fn open_obs(&self, sv: SvName, code: &ObsCode) -> Result<ObsReader<'_>, Error> {
        let code_index = self
            .header
            .codes(sv.system)
            .iter()
            .position(|c| c == code)
            .ok_or_else(|| {
                if self.header.has_system(sv.system) {
                    Error::UnknownCode
                } else {
                    Error::UnknownSystem
                }
            })?;
        self.open_obs_by_index(sv, code_index)
    }

    /// Verifies every chunk digest and the file digest.
    pub fn verify(&self) -> Result<(), Error> {
        let bytes = self.data.bytes();
        if !self.chunk_digest.is_none() {
            let mut whence = 0;
            while whence + 4 < self.data_size {
                let chunk = self.chunk_at(whence)?;
                let stored = &bytes[chunk.payload.end..chunk.payload.end + self.chunk_digest.len()];
                self.chunk_digest
                    .verify(&bytes[chunk.start..chunk.payload.end], stored)?;
                whence = chunk.next;
            }
        }
        if !self.file_digest.is_none() {
            let covered = bytes.len() - self.file_digest.len();
            let mut hasher = Hasher::new(self.file_digest);
            hasher.update(&bytes[..covered]);
            if hasher.finalize() != bytes[covered..] {
                return Err(Error::Corrupt);
            }
        }
        Ok(())
    }
}

/// A special event record stored in the container.
pub struct Event<'a> {
    /// Number of observation epochs preceding the event.
    pub epoch_index: u64,
    /// Verbatim event lines.
    pub text: &'a [u8],
}

/// Iterator over EVTF chunks.
pub struct Events<'a> {
    reader: &'a SocReader,
    whence: Option<usize>,
    done: bool,
}

impl<'a> Iterator for Events<'a> {
    type Item = Result<Event<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let found = match self.whence {
            None => self
                .reader
                .find_cached(TAG_EVTF, &self.reader.evtf_offset),
            Some(whence) => self.reader.find_chunk(TAG_EVTF, whence),
        };
        let chunk = match found {
            Ok(chunk) => chunk,
            Err(Error::NoChunk) => {
                self.done = true;
                return None;
            },
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            },
        };
        self.whence = Some(chunk.next);

        let bytes = self.reader.data.bytes();
        let mut pos = chunk.payload.start;
        let epoch_index = match uleb_at(bytes, &mut pos, chunk.payload.end) {
            Ok(index) => index,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            },
        };
        Some(Ok(Event {
            epoch_index,
            text: &bytes[pos..chunk.payload.end],
        }))
    }
}
