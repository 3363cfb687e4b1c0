//! Per signal observation reader.
//!
//! One SOCD chunk holds the observation stream of a single (satellite,
//! observation code) pair: run length coded LLI and SSI indicators,
//! then the residual block stream. The reader decodes blocks on demand
//! into a fixed ring of 256 values, running the inverse integrator and
//! the scale multiplication as residuals arrive.

use crate::leb128::{read_sleb128, read_uleb128};
use crate::transpose;

use super::blocks::Differencer;
use super::{Error, BLOCK_SLEB128, BLOCK_ZERO_RUN};

/// Decoded values buffered between refills.
const RING: usize = 256;

pub struct ObsReader<'a> {
    /// Container bytes, bounded to the walkable area.
    data: &'a [u8],
    n_values: u64,
    scale_x1000: i64,
    diff: Differencer,
    /// Offset of the LLI indicator block.
    lli_offset: usize,
    /// Next read position in the data block.
    data_offset: usize,
    /// End of the data block.
    data_end: usize,
    /// Pending run block state.
    block_code: u8,
    block_left: u64,
    ring: [i64; RING],
    valid: usize,
    idx: usize,
}

fn uleb_at(data: &[u8], pos: &mut usize, end: usize) -> Result<u64, Error> {
    let mut slice = &data[*pos..end];
    let before = slice.len();
    let value = read_uleb128(&mut slice).ok_or(Error::Corrupt)?;
    *pos += before - slice.len();
    Ok(value)
}

fn sleb_at(data: &[u8], pos: &mut usize, end: usize) -> Result<i64, Error> {
    let mut slice = &data[*pos..end];
    let before = slice.len();
    let value = read_sleb128(&mut slice).ok_or(Error::Corrupt)?;
    *pos += before - slice.len();
    Ok(value)
}

impl<'a> ObsReader<'a> {
    /// Decodes the SOCD payload that follows the signal name. `pos` is
    /// the offset of the value count field; `payload_end` bounds the
    /// chunk payload.
    pub(crate) fn from_payload(
        data: &'a [u8],
        mut pos: usize,
        payload_end: usize,
    ) -> Result<Self, Error> {
        let n_values = uleb_at(data, &mut pos, payload_end)? + 1;

        // indicator blocks are skipped here and decoded on request
        let lli_offset = pos;
        for _ in 0..2 {
            let len = uleb_at(data, &mut pos, payload_end)? as usize;
            if payload_end - pos < len {
                return Err(Error::Corrupt);
            }
            pos += len;
        }

        // data block: length, then schema, scale, initial state
        let data_len = uleb_at(data, &mut pos, payload_end)? as usize;
        if payload_end - pos < data_len {
            return Err(Error::Corrupt);
        }
        let data_end = pos + data_len;

        let schema = uleb_at(data, &mut pos, data_end)?;
        if schema >= 16 {
            return Err(Error::Corrupt);
        }
        let scale_x1000 = if schema >= 8 {
            let stored = uleb_at(data, &mut pos, data_end)?;
            if stored == 0 || stored > i64::MAX as u64 {
                return Err(Error::Corrupt);
            }
            stored as i64
        } else {
            1000
        };
        let order = (schema % 8) as usize;
        let mut state = Vec::with_capacity(order);
        for _ in 0..order {
            state.push(sleb_at(data, &mut pos, data_end)?);
        }

        Ok(Self {
            data,
            n_values,
            scale_x1000,
            diff: Differencer::from_state(state),
            lli_offset,
            data_offset: pos,
            data_end,
            block_code: 0,
            block_left: 0,
            ring: [0; RING],
            valid: 0,
            idx: 0,
        })
    }

    /// Number of observations stored for this signal.
    pub fn n_values(&self) -> u64 {
        self.n_values
    }

    /// Stored scale times 1000 (1000 when the stream is unscaled).
    pub fn scale_x1000(&self) -> i64 {
        self.scale_x1000
    }

    /// Decodes the LLI and SSI indicator arrays, one byte per stored
    /// observation. Indicators beyond the stored runs are blanks.
    pub fn read_indicators(&self) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let mut pos = self.lli_offset;
        let lli = self.decode_indicators(&mut pos)?;
        let ssi = self.decode_indicators(&mut pos)?;
        Ok((lli, ssi))
    }

    fn decode_indicators(&self, pos: &mut usize) -> Result<Vec<u8>, Error> {
        let len = uleb_at(self.data, pos, self.data.len())? as usize;
        if self.data.len() - *pos < len {
            return Err(Error::Corrupt);
        }
        let end = *pos + len;
        let n_values = self.n_values as usize;
        let mut out = Vec::with_capacity(n_values);
        while *pos < end {
            let indicator = self.data[*pos];
            *pos += 1;
            let count = uleb_at(self.data, pos, end)? as usize + 1;
            if out.len() + count > n_values {
                return Err(Error::Corrupt);
            }
            out.resize(out.len() + count, indicator);
        }
        out.resize(n_values, b' ');
        Ok(out)
    }

    /// Collects every remaining value of the stream.
    pub fn read_values(&mut self) -> Result<Vec<i64>, Error> {
        let hint = usize::try_from(self.n_values).unwrap_or(0).min(1 << 20);
        let mut values = Vec::with_capacity(hint);
        while let Some(value) = self.read_value()? {
            values.push(value);
        }
        Ok(values)
    }

    /// Next observation value times 1000, or `None` once the stream is
    /// exhausted.
    pub fn read_value(&mut self) -> Result<Option<i64>, Error> {
        if self.idx >= self.valid {
            self.refill()?;
            if self.valid == 0 {
                return Ok(None);
            }
        }
        let value = self.ring[self.idx];
        self.idx += 1;
        Ok(Some(value))
    }

    fn push(&mut self, residual: i64) {
        let value = self.diff.integrate(residual);
        let scaled = (value as i128 * self.scale_x1000 as i128) / 1000;
        self.ring[self.valid] = scaled as i64;
        self.valid += 1;
    }

    fn refill(&mut self) -> Result<(), Error> {
        self.idx = 0;
        self.valid = 0;
        let mut scratch = [0i64; 32];

        loop {
            let avail = RING - self.valid;
            if avail == 0 {
                break;
            }

            // drain a pending run block
            if self.block_left > 0 {
                let take = self.block_left.min(avail as u64) as usize;
                match self.block_code {
                    BLOCK_ZERO_RUN => {
                        for _ in 0..take {
                            self.push(0);
                        }
                    },
                    BLOCK_SLEB128 => {
                        for _ in 0..take {
                            let residual =
                                sleb_at(self.data, &mut self.data_offset, self.data_end)?;
                            self.push(residual);
                        }
                    },
                    _ => return Err(Error::Corrupt),
                }
                self.block_left -= take as u64;
                continue;
            }

            if self.data_offset >= self.data_end {
                break;
            }

            let header = self.data[self.data_offset];
            self.data_offset += 1;
            if header == BLOCK_ZERO_RUN || header == BLOCK_SLEB128 {
                self.block_left = uleb_at(self.data, &mut self.data_offset, self.data_end)? + 1;
                self.block_code = header;
                continue;
            }

            // transposed bit matrix
            let count = 8usize << (header >> 5);
            let bits = usize::from(header & 31) + 1;
            if count > 32 {
                return Err(Error::Corrupt);
            }
            let matrix_len = count / 8 * bits;
            if self.data_end - self.data_offset < matrix_len {
                return Err(Error::Corrupt);
            }
            if avail < count {
                // not enough room; reprocess this header next refill
                self.data_offset -= 1;
                break;
            }
            transpose::transpose(
                &mut scratch[..count],
                &self.data[self.data_offset..self.data_offset + matrix_len],
                bits,
            );
            self.data_offset += matrix_len;
            for ii in 0..count {
                self.push(scratch[ii]);
            }
        }
        Ok(())
    }
}
