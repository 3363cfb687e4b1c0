//! Streaming observation record reader.
//!
//! [ObsParser] pulls one record at a time from a [Stream]: either an
//! observation epoch, demultiplexed into per signal presence bits and
//! parallel value / indicator arrays, or a special event carried as
//! verbatim text. Output buffers belong to the parser and are
//! overwritten by every [ObsParser::read] call; [ObsParser::record]
//! borrows them between calls.

use num_integer::div_ceil;
use thiserror::Error;

use crate::epoch::Epoch;
use crate::header::{self, Header};
use crate::observable::ObsCode;
use crate::stream::{Stream, BLOCK_SIZE};
use crate::sv::SvName;

mod lli;
mod parsing;

pub use lli::LliFlags;

#[derive(Debug, Error)]
pub enum Error {
    /// File header present but not an observation file.
    #[error("not an observation file")]
    NotObservation,
    /// Header revision is neither 2.x nor 3.x.
    #[error("unsupported format revision")]
    UnknownVersion,
    /// Structural violation in the text.
    #[error("malformed observation text")]
    BadFormat,
    /// Underlying transport failure.
    #[error("i/o error")]
    System(#[from] std::io::Error),
}

/// Outcome of a successful [ObsParser::read] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// A record was decoded and can be borrowed from the parser.
    Record,
    /// Clean end of input.
    Eof,
}

/// Pull parser over an observation text stream.
pub struct ObsParser<S: Stream> {
    stream: S,
    header: Header,
    epoch: Epoch,
    /// Presence buffer for observation records (`[system, prn,
    /// bitmap]` per satellite), or the verbatim body of an event.
    buffer: Vec<u8>,
    values: Vec<i64>,
    lli: Vec<u8>,
    ssi: Vec<u8>,
    /// Read offset into the stream window.
    parse_ofs: usize,
    /// Source location of the last failure, for diagnostics.
    error_line: u32,
}

impl<S: Stream> ObsParser<S> {
    /// Reads the file header and prepares for record iteration.
    pub fn new(mut stream: S) -> Result<Self, Error> {
        stream.advance(BLOCK_SIZE, 0)?;
        if stream.size() < 80 {
            return Err(Error::BadFormat);
        }
        let (header, consumed) = header::parse(&stream.buffer()[..stream.size()])?;
        Ok(Self {
            stream,
            header,
            epoch: Epoch::default(),
            buffer: Vec::new(),
            values: Vec::new(),
            lli: Vec::new(),
            ssi: Vec::new(),
            parse_ofs: consumed,
            error_line: 0,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Epoch of the last record read.
    pub fn epoch(&self) -> &Epoch {
        &self.epoch
    }

    /// Source location of the last failure (zero when none occurred).
    pub fn error_line(&self) -> u32 {
        self.error_line
    }

    /// Advances to the next record. After `Ok(ReadStatus::Record)` the
    /// record contents are available through [ObsParser::record] until
    /// the next call. Any error leaves the parser unusable.
    pub fn read(&mut self) -> Result<ReadStatus, Error> {
        if self.header.version().major == 2 {
            self.read_v2()
        } else {
            self.read_v3()
        }
    }

    /// Borrows the last record read.
    pub fn record(&self) -> Record<'_> {
        Record {
            epoch: self.epoch,
            header: &self.header,
            buffer: &self.buffer,
            values: &self.values,
            lli: &self.lli,
            ssi: &self.ssi,
        }
    }
}

/// Borrowed view of one decoded record.
#[derive(Clone, Copy)]
pub struct Record<'a> {
    pub epoch: Epoch,
    header: &'a Header,
    buffer: &'a [u8],
    values: &'a [i64],
    lli: &'a [u8],
    ssi: &'a [u8],
}

impl<'a> Record<'a> {
    pub fn is_event(&self) -> bool {
        self.epoch.flag.is_event()
    }

    /// Verbatim body lines of a special event record.
    pub fn event_text(&self) -> &'a [u8] {
        debug_assert!(self.is_event());
        self.buffer
    }

    /// Observation values times 1000, one per set presence bit.
    pub fn values(&self) -> &'a [i64] {
        self.values
    }

    /// Loss of lock indicators, parallel to [Record::values].
    pub fn lli(&self) -> &'a [u8] {
        self.lli
    }

    /// Signal strength indicators, parallel to [Record::values].
    pub fn ssi(&self) -> &'a [u8] {
        self.ssi
    }

    /// Satellites of an observation record with their presence bitmaps.
    pub fn satellites(&self) -> Satellites<'a> {
        Satellites {
            header: self.header,
            rest: if self.is_event() { &[] } else { self.buffer },
        }
    }

    /// Flattened iteration over every observed signal of the record, in
    /// record order.
    pub fn signals(&self) -> Signals<'a> {
        Signals {
            satellites: self.satellites(),
            header: self.header,
            current: None,
            value_idx: 0,
            values: self.values,
            lli: self.lli,
            ssi: self.ssi,
        }
    }
}

/// Iterator over `(satellite, presence bitmap)` pairs of a record.
pub struct Satellites<'a> {
    header: &'a Header,
    rest: &'a [u8],
}

impl<'a> Iterator for Satellites<'a> {
    type Item = (SvName, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let sv = SvName::new(self.rest[0], self.rest[1]);
        let bitmap_len = div_ceil(self.header.n_obs(sv.system), 8);
        let bitmap = &self.rest[2..2 + bitmap_len];
        self.rest = &self.rest[2 + bitmap_len..];
        Some((sv, bitmap))
    }
}

/// One observed signal within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalObservation {
    pub sv: SvName,
    /// Position of the code in the system's declared table.
    pub code_index: usize,
    pub code: ObsCode,
    /// Observation value times 1000.
    pub value: i64,
    pub lli: u8,
    pub ssi: u8,
}

/// Iterator over every observed signal of a record.
pub struct Signals<'a> {
    satellites: Satellites<'a>,
    header: &'a Header,
    current: Option<(SvName, &'a [u8], usize)>,
    value_idx: usize,
    values: &'a [i64],
    lli: &'a [u8],
    ssi: &'a [u8],
}

impl<'a> Iterator for Signals<'a> {
    type Item = SignalObservation;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let (sv, bitmap) = self.satellites.next()?;
                self.current = Some((sv, bitmap, 0));
            }
            let (sv, bitmap, ref mut bit) = *self.current.as_mut()?;
            let n_obs = self.header.n_obs(sv.system);
            while *bit < n_obs {
                let code_index = *bit;
                *bit += 1;
                if bitmap[code_index / 8] >> (code_index % 8) & 1 != 0 {
                    let idx = self.value_idx;
                    self.value_idx += 1;
                    return Some(SignalObservation {
                        sv,
                        code_index,
                        code: self.header.codes(sv.system)[code_index],
                        value: self.values[idx],
                        lli: self.lli[idx],
                        ssi: self.ssi[idx],
                    });
                }
            }
            self.current = None;
        }
    }
}
