//! Container writer.
//!
//! The writer accumulates per signal state keyed by satellite and
//! observation code while records stream in, then lays the container
//! out in one pass: leading chunk (with a reserved directory offset
//! slot), stored header, epoch spans, events, and per satellite tables
//! followed by their observation chunks. The directory offset is
//! patched once the layout is final; everything else is write once.

use log::debug;
use num_integer::gcd;

use crate::epoch::Epoch;
use crate::header::Header;
use crate::leb128::{
    sleb128_len, uleb128_len, write_sleb128, write_uleb128, write_uleb128_padded,
};
use crate::observation::Record;
use crate::sv::SvName;

use super::blocks::{self, Differencer, MAX_ORDER};
use super::digest::{DigestId, Hasher};
use super::{epoc, Error};
use super::{MAJOR, TAG_EPOC, TAG_EVTF, TAG_RHDR, TAG_SATE, TAG_SDIR, TAG_SOCD, TAG_SRNX};

/// Width reserved for the patched directory offset field.
const SDIR_SLOT: usize = 9;

/// Elements pre-reserved per signal: one day of 30 second epochs.
const SIGNAL_RESERVE: usize = 2880;

#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub chunk_digest: DigestId,
    pub file_digest: DigestId,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            chunk_digest: DigestId::Crc32c,
            file_digest: DigestId::Crc32c,
        }
    }
}

/// Accumulated stream of one (satellite, code) signal.
struct SignalAcc {
    /// Maximal spans of epoch indices, as (first, count).
    runs: Vec<(u64, u64)>,
    values: Vec<i64>,
    lli: Vec<u8>,
    ssi: Vec<u8>,
}

impl SignalAcc {
    fn new() -> Self {
        Self {
            runs: Vec::new(),
            values: Vec::with_capacity(SIGNAL_RESERVE),
            lli: Vec::with_capacity(SIGNAL_RESERVE),
            ssi: Vec::with_capacity(SIGNAL_RESERVE),
        }
    }

    fn push(&mut self, epoch_index: u64, value: i64, lli: u8, ssi: u8) -> Result<(), Error> {
        match self.runs.last_mut() {
            Some((first, count)) if *first + *count == epoch_index => *count += 1,
            Some((first, count)) if *first + *count > epoch_index => {
                return Err(Error::BadState)
            },
            _ => self.runs.push((epoch_index, 1)),
        }
        self.values.push(value);
        self.lli.push(lli);
        self.ssi.push(ssi);
        Ok(())
    }
}

struct SatAcc {
    sv: SvName,
    /// One slot per declared code of the satellite's system.
    signals: Vec<Option<SignalAcc>>,
}

pub struct SocWriter {
    options: WriterOptions,
    header: Header,
    epochs: Vec<Epoch>,
    events: Vec<(u64, Vec<u8>)>,
    sats: Vec<SatAcc>,
    /// Radix index: system low bits times 100 plus vehicle number.
    index: Vec<u16>,
}

impl SocWriter {
    pub fn new(header: &Header, options: WriterOptions) -> Self {
        Self {
            options,
            header: header.clone(),
            epochs: Vec::new(),
            events: Vec::new(),
            sats: Vec::new(),
            index: vec![u16::MAX; 32 * 100],
        }
    }

    /// Appends one decoded record: an observation epoch with all its
    /// signals, or a special event.
    pub fn append(&mut self, record: &Record) -> Result<(), Error> {
        if record.is_event() {
            self.append_event(record.event_text());
            return Ok(());
        }
        let epoch_index = self.append_epoch(record.epoch)?;
        for signal in record.signals() {
            self.append_signal(
                signal.sv,
                signal.code_index,
                epoch_index,
                signal.value,
                signal.lli,
                signal.ssi,
            )?;
        }
        Ok(())
    }

    /// Appends an observation epoch, returning its index. Epochs must
    /// arrive in strictly increasing timestamp order.
    pub fn append_epoch(&mut self, epoch: Epoch) -> Result<u64, Error> {
        if let Some(last) = self.epochs.last() {
            let monotonic = (epoch.yyyy_mm_dd, epoch.hh_mm, epoch.sec_e7)
                > (last.yyyy_mm_dd, last.hh_mm, last.sec_e7);
            if !monotonic {
                return Err(Error::BadState);
            }
        }
        self.epochs.push(epoch);
        Ok(self.epochs.len() as u64 - 1)
    }

    /// Appends a special event positioned before the next observation
    /// epoch.
    pub fn append_event(&mut self, text: &[u8]) {
        self.events.push((self.epochs.len() as u64, text.to_vec()));
    }

    /// Appends one observation of a signal at the given epoch index.
    pub fn append_signal(
        &mut self,
        sv: SvName,
        code_index: usize,
        epoch_index: u64,
        value: i64,
        lli: u8,
        ssi: u8,
    ) -> Result<(), Error> {
        let n_obs = self.header.n_obs(sv.system);
        if n_obs == 0 {
            return Err(Error::UnknownSystem);
        }
        if code_index >= n_obs || sv.prn >= 100 {
            return Err(Error::UnknownCode);
        }

        let key = sv.system_index() * 100 + usize::from(sv.prn);
        let sat_idx = match self.index[key] {
            u16::MAX => {
                self.index[key] = self.sats.len() as u16;
                self.sats.push(SatAcc {
                    sv,
                    signals: (0..n_obs).map(|_| None).collect(),
                });
                self.sats.len() - 1
            },
            idx => usize::from(idx),
        };
        self.sats[sat_idx].signals[code_index]
            .get_or_insert_with(SignalAcc::new)
            .push(epoch_index, value, lli, ssi)
    }

    /// Lays out and returns the finished container.
    pub fn finish(self) -> Vec<u8> {
        let chunk_digest = self.options.chunk_digest;
        let mut out = Vec::new();

        // SRNX: versions, digest identifiers, reserved directory offset
        let mut srnx_payload = Vec::new();
        write_uleb128(&mut srnx_payload, MAJOR);
        write_uleb128(&mut srnx_payload, 0);
        write_uleb128(&mut srnx_payload, chunk_digest.id());
        write_uleb128(&mut srnx_payload, self.options.file_digest.id());
        let sdir_slot_ofs = srnx_payload.len();
        write_uleb128_padded(&mut srnx_payload, 0, SDIR_SLOT);
        let srnx_start = emit_chunk(&mut out, TAG_SRNX, &srnx_payload, chunk_digest);

        emit_chunk(&mut out, TAG_RHDR, self.header.text().as_bytes(), chunk_digest);

        let mut epoc_start = 0u64;
        if !self.epochs.is_empty() || !self.events.is_empty() {
            epoc_start = out.len() as u64;
            emit_chunk(&mut out, TAG_EPOC, &epoc::encode(&self.epochs), chunk_digest);
        }

        let mut evtf_start = 0u64;
        for (epoch_index, text) in &self.events {
            if evtf_start == 0 {
                evtf_start = out.len() as u64;
            }
            let mut payload = Vec::with_capacity(text.len() + 4);
            write_uleb128(&mut payload, *epoch_index);
            payload.extend_from_slice(text);
            emit_chunk(&mut out, TAG_EVTF, &payload, chunk_digest);
        }

        let mut directory = Vec::new();
        for sat in &self.sats {
            let sate_start = emit_satellite(&mut out, &self.header, sat, chunk_digest);
            directory.push((sat.sv, sate_start));
        }

        // SDIR last, then patch its offset into the reserved slot
        let sdir_start = out.len() as u64;
        let mut sdir_payload = Vec::new();
        write_uleb128(&mut sdir_payload, epoc_start);
        write_uleb128(&mut sdir_payload, evtf_start);
        for (sv, sate_start) in &directory {
            sdir_payload.extend_from_slice(&sv.to_bytes());
            write_uleb128(&mut sdir_payload, *sate_start as u64);
        }
        emit_chunk(&mut out, TAG_SDIR, &sdir_payload, chunk_digest);

        let field_pos = srnx_start + 4 + uleb128_len(srnx_payload.len() as u64) + sdir_slot_ofs;
        let mut slot = Vec::with_capacity(SDIR_SLOT);
        write_uleb128_padded(&mut slot, sdir_start, SDIR_SLOT);
        out[field_pos..field_pos + SDIR_SLOT].copy_from_slice(&slot);

        // the patch invalidates the SRNX chunk digest; recompute it
        if !chunk_digest.is_none() {
            let payload_end = field_pos + SDIR_SLOT;
            let digest = chunk_digest.digest(&out[srnx_start..payload_end]);
            out[payload_end..payload_end + chunk_digest.len()].copy_from_slice(&digest);
        }

        if !self.options.file_digest.is_none() {
            let mut hasher = Hasher::new(self.options.file_digest);
            hasher.update(&out);
            let digest = hasher.finalize();
            out.extend_from_slice(&digest);
        }

        debug!(
            "container: {} epoch(s), {} event(s), {} satellite(s), {} bytes",
            self.epochs.len(),
            self.events.len(),
            self.sats.len(),
            out.len()
        );
        out
    }
}

/// Appends one chunk (tag, length, payload, digest) to `out`,
/// returning its start offset.
fn emit_chunk(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8], digest: DigestId) -> usize {
    let start = out.len();
    out.extend_from_slice(tag);
    write_uleb128(out, payload.len() as u64);
    out.extend_from_slice(payload);
    if !digest.is_none() {
        let bytes = digest.digest(&out[start..]);
        out.extend_from_slice(&bytes);
    }
    start
}

/// Total encoded size of a chunk with `payload_len` payload bytes.
fn chunk_len(payload_len: usize, digest: DigestId) -> usize {
    4 + uleb128_len(payload_len as u64) + payload_len + digest.len()
}

/// Emits the SATE chunk of one satellite followed by its SOCD chunks,
/// returning the SATE start offset.
fn emit_satellite(out: &mut Vec<u8>, header: &Header, sat: &SatAcc, digest: DigestId) -> usize {
    let codes = header.codes(sat.sv.system);

    // observation chunks, in declared code order
    let socd_payloads: Vec<Option<Vec<u8>>> = sat
        .signals
        .iter()
        .enumerate()
        .map(|(ii, slot)| {
            slot.as_ref()
                .map(|acc| socd_payload(sat.sv, codes[ii].as_bytes(), acc))
        })
        .collect();

    // presence sequences, in declared code order
    let mut presence = Vec::new();
    for slot in &sat.signals {
        if let Some(acc) = slot {
            write_uleb128(&mut presence, acc.runs.len() as u64 - 1);
            let mut prev_end = 0;
            for &(first, count) in &acc.runs {
                write_uleb128(&mut presence, first - prev_end);
                write_uleb128(&mut presence, count - 1);
                prev_end = first + count;
            }
        }
    }

    // SOCD offsets are relative to the SATE tag and depend on the SATE
    // chunk's own encoded length; iterate the variable length fields to
    // a fixed point
    let fixed_len = 4 + presence.len();
    let mut offsets = vec![0i64; sat.signals.len()];
    loop {
        let payload_len = fixed_len
            + offsets.iter().map(|&o| sleb128_len(o)).sum::<usize>();
        let mut next = chunk_len(payload_len, digest) as i64;
        let mut changed = false;
        for (ii, payload) in socd_payloads.iter().enumerate() {
            let offset = match payload {
                Some(payload) => {
                    let this = next;
                    next += chunk_len(payload.len(), digest) as i64;
                    this
                },
                None => 0,
            };
            if offsets[ii] != offset {
                offsets[ii] = offset;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut sate_payload = Vec::with_capacity(fixed_len + offsets.len() * 2);
    sate_payload.extend_from_slice(&sat.sv.to_bytes());
    sate_payload.push(0);
    for &offset in &offsets {
        write_sleb128(&mut sate_payload, offset);
    }
    sate_payload.extend_from_slice(&presence);

    let sate_start = emit_chunk(out, TAG_SATE, &sate_payload, digest);
    for payload in socd_payloads.iter().flatten() {
        emit_chunk(out, TAG_SOCD, payload, digest);
    }
    sate_start
}

/// Builds one SOCD payload: signal name, value count, indicator runs,
/// and the residual coded data block.
fn socd_payload(sv: SvName, code: &[u8; 4], acc: &SignalAcc) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&sv.to_bytes());
    payload.push(0);
    payload.extend_from_slice(code);
    write_uleb128(&mut payload, acc.values.len() as u64 - 1);

    for indicators in [&acc.lli, &acc.ssi] {
        let rle = indicator_rle(indicators);
        write_uleb128(&mut payload, rle.len() as u64);
        payload.extend_from_slice(&rle);
    }

    let data = data_block(&acc.values);
    write_uleb128(&mut payload, data.len() as u64);
    payload.extend_from_slice(&data);
    payload
}

/// Run length codes an indicator column, dropping the trailing blank
/// runs the decoder fills back in.
fn indicator_rle(indicators: &[u8]) -> Vec<u8> {
    let mut trimmed = indicators.len();
    while trimmed > 0 && indicators[trimmed - 1] == b' ' {
        trimmed -= 1;
    }
    let mut out = Vec::new();
    let mut ii = 0;
    while ii < trimmed {
        let indicator = indicators[ii];
        let mut count = 1u64;
        while ii + (count as usize) < trimmed && indicators[ii + count as usize] == indicator {
            count += 1;
        }
        out.push(indicator);
        write_uleb128(&mut out, count - 1);
        ii += count as usize;
    }
    out
}

/// Scale and order selection, then residual block packing.
fn data_block(values: &[i64]) -> Vec<u8> {
    let scale = values
        .iter()
        .fold(0i64, |acc, &v| gcd(acc, v.abs()))
        .max(1);
    let scaled: Vec<i64> = values.iter().map(|&v| v / scale).collect();

    // cheapest differencing order, ties to the lowest
    let mut best: Option<(usize, usize, Vec<i64>)> = None;
    for order in 0..=MAX_ORDER {
        let mut diff = Differencer::seeded(order, scaled[0]);
        let residuals: Vec<i64> = scaled.iter().map(|&v| diff.difference(v)).collect();
        let mut cost = blocks::measure(&residuals);
        cost += uleb128_len(order as u64 + if scale > 1 { 8 } else { 0 });
        if scale > 1 {
            cost += uleb128_len(scale as u64 * 1000);
        }
        cost += initial_state(order, scaled[0])
            .iter()
            .map(|&v| sleb128_len(v))
            .sum::<usize>();
        if best.as_ref().map_or(true, |(c, _, _)| cost < *c) {
            best = Some((cost, order, residuals));
        }
    }
    let (_, order, residuals) = best.unwrap();

    let mut out = Vec::new();
    let schema = order as u64 + if scale > 1 { 8 } else { 0 };
    write_uleb128(&mut out, schema);
    if scale > 1 {
        write_uleb128(&mut out, scale as u64 * 1000);
    }
    for value in initial_state(order, scaled[0]) {
        write_sleb128(&mut out, value);
    }
    blocks::pack(&mut out, &residuals);
    out
}

/// Stored integrator state: the first value at the lowest difference
/// level, zero above it.
fn initial_state(order: usize, first: i64) -> Vec<i64> {
    let mut state = vec![0i64; order];
    if order > 0 {
        state[0] = first;
    }
    state
}
