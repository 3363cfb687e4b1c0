//! EPOC chunk codec: epoch spans and receiver clock offset runs.
//!
//! Identical timestamps never repeat, so epochs are stored as spans: a
//! start date and time, a per tick interval, and a count. Within a
//! span seconds advance by the interval; the minute rolls over exactly
//! when the new whole second value equals 60, so a leap second (second
//! 60 on display) must begin a span of its own and day rollovers must
//! begin a new span as well. Clock offsets follow as value runs, with
//! an all zero tail omitted.

use crate::epoch::{Epoch, EpochFlag};
use crate::leb128::{read_sleb128, read_uleb128, write_sleb128, write_uleb128};

use super::Error;

/// Decimal coded time upper bound: 24:60:61 in `hh·10¹¹ + mm·10⁹ +
/// sec·10⁷` form.
const MAX_TIME: u64 = 2_460_610_000_000;

/// Decodes an EPOC payload. Span epochs carry flag `'0'` and no
/// satellite count; callers needing those walk the records themselves.
pub(crate) fn decode(mut payload: &[u8]) -> Result<Vec<Epoch>, Error> {
    let cursor = &mut payload;
    let n_epoch = read_uleb128(cursor).ok_or(Error::Corrupt)? as usize;
    let mut epochs: Vec<Epoch> = Vec::with_capacity(n_epoch.min(1 << 20));

    // epoch spans
    while epochs.len() < n_epoch {
        let interval = read_sleb128(cursor).ok_or(Error::Corrupt)?;
        let count = read_uleb128(cursor).ok_or(Error::Corrupt)? as usize + 1;
        let date = read_uleb128(cursor).ok_or(Error::Corrupt)?;
        let time = read_uleb128(cursor).ok_or(Error::Corrupt)?;
        if epochs.len() + count > n_epoch || date > i32::MAX as u64 || time > MAX_TIME {
            return Err(Error::Corrupt);
        }

        // negative interval: whole seconds
        let interval_e7 = if interval < 0 {
            interval
                .checked_mul(-10_000_000)
                .ok_or(Error::Corrupt)?
        } else {
            interval
        };

        // two digit years follow the 2.x convention
        let date = if date < 1_000_000 {
            date + if date < 800_000 { 20_000_000 } else { 19_000_000 }
        } else {
            date
        };

        let mut sec_e7 = (time % 1_000_000_000) as i64;
        let mut hh_mm = (time / 1_000_000_000) as i16;
        if !(0..610_000_000).contains(&sec_e7) || hh_mm % 100 >= 60 {
            return Err(Error::Corrupt);
        }

        for tick in 0..count {
            epochs.push(Epoch {
                yyyy_mm_dd: date as i32,
                hh_mm,
                flag: EpochFlag::Ok,
                sec_e7: sec_e7 as i32,
                n_sats: 0,
                clock_offset_e12: 0,
            });

            if tick + 1 == count {
                break;
            }
            sec_e7 += interval_e7;
            if sec_e7 / 10_000_000 == 60 {
                sec_e7 -= 600_000_000;
                hh_mm += 1;
                if hh_mm % 100 == 60 {
                    hh_mm += 40;
                }
            }
            if !(0..610_000_000).contains(&sec_e7) {
                return Err(Error::Corrupt);
            }
        }
    }

    // receiver clock offset runs; the unspecified tail stays zero
    let mut idx = 0;
    while !cursor.is_empty() && idx < n_epoch {
        let value = read_sleb128(cursor).ok_or(Error::Corrupt)?;
        let count = read_uleb128(cursor).ok_or(Error::Corrupt)? as usize + 1;
        if idx + count > n_epoch {
            return Err(Error::Corrupt);
        }
        for _ in 0..count {
            epochs[idx].clock_offset_e12 = value;
            idx += 1;
        }
    }

    Ok(epochs)
}

/// Encodes observation epochs as an EPOC payload. The span builder
/// simulates the decoder, so any tick the decoder would mangle (minute
/// crossings away from second 60, day rollovers, leap seconds) starts
/// a new span.
pub(crate) fn encode(epochs: &[Epoch]) -> Vec<u8> {
    let mut out = Vec::new();
    write_uleb128(&mut out, epochs.len() as u64);

    let mut ii = 0;
    while ii < epochs.len() {
        // probe the interval on the first pair, then extend while the
        // decoder reproduces the recorded epochs
        let interval_e7 = epochs
            .get(ii + 1)
            .filter(|next| next.yyyy_mm_dd == epochs[ii].yyyy_mm_dd)
            .map_or(0, |next| {
                next.second_of_day_e7() - epochs[ii].second_of_day_e7()
            });
        let mut count = 1usize;
        let mut hh_mm = epochs[ii].hh_mm;
        let mut sec_e7 = i64::from(epochs[ii].sec_e7);
        while ii + count < epochs.len() {
            let next = &epochs[ii + count];
            sec_e7 += interval_e7;
            if sec_e7 / 10_000_000 == 60 {
                sec_e7 -= 600_000_000;
                hh_mm += 1;
                if hh_mm % 100 == 60 {
                    hh_mm += 40;
                }
            }
            if !(0..610_000_000).contains(&sec_e7)
                || next.yyyy_mm_dd != epochs[ii].yyyy_mm_dd
                || next.hh_mm != hh_mm
                || i64::from(next.sec_e7) != sec_e7
            {
                break;
            }
            count += 1;
        }

        let first = &epochs[ii];
        let interval = if interval_e7 != 0 && interval_e7 % 10_000_000 == 0 {
            -(interval_e7 / 10_000_000)
        } else {
            interval_e7
        };
        write_sleb128(&mut out, interval);
        write_uleb128(&mut out, count as u64 - 1);
        write_uleb128(&mut out, first.yyyy_mm_dd as u64);
        let time = u64::from(first.hh_mm as u16 / 100) * 100_000_000_000
            + u64::from(first.hh_mm as u16 % 100) * 1_000_000_000
            + first.sec_e7 as u64;
        write_uleb128(&mut out, time);

        ii += count;
    }

    // clock offset runs, trailing zeros trimmed
    let mut trimmed = epochs.len();
    while trimmed > 0 && epochs[trimmed - 1].clock_offset_e12 == 0 {
        trimmed -= 1;
    }
    let mut ii = 0;
    while ii < trimmed {
        let value = epochs[ii].clock_offset_e12;
        let mut count = 1usize;
        while ii + count < trimmed && epochs[ii + count].clock_offset_e12 == value {
            count += 1;
        }
        write_sleb128(&mut out, value);
        write_uleb128(&mut out, count as u64 - 1);
        ii += count;
    }

    out
}
