//! Succinct observation container format.
//!
//! A container is an ordered list of tagged chunks: a four byte ASCII
//! tag, a ULEB128 payload length, the payload, and an optional digest
//! of `tag ‖ length ‖ payload`. The `SRNX` chunk leads, the RINEX
//! header (`RHDR`) follows; epochs (`EPOC`), special events (`EVTF`),
//! per satellite tables (`SATE`) and per signal observation data
//! (`SOCD`) come after in any order, with an optional directory
//! (`SDIR`) to locate them without scanning.

use thiserror::Error;

pub mod blocks;
pub mod digest;
pub mod epoc;
pub mod obs;
pub mod reader;
pub mod writer;

pub use digest::DigestId;
pub use obs::ObsReader;
pub use reader::{Event, Events, SocReader};
pub use writer::{SocWriter, WriterOptions};

pub(crate) const TAG_SRNX: &[u8; 4] = b"SRNX";
pub(crate) const TAG_RHDR: &[u8; 4] = b"RHDR";
pub(crate) const TAG_SDIR: &[u8; 4] = b"SDIR";
pub(crate) const TAG_EPOC: &[u8; 4] = b"EPOC";
pub(crate) const TAG_EVTF: &[u8; 4] = b"EVTF";
pub(crate) const TAG_SATE: &[u8; 4] = b"SATE";
pub(crate) const TAG_SOCD: &[u8; 4] = b"SOCD";

/// Container major version this implementation understands.
pub(crate) const MAJOR: u64 = 1;

// Residual block headers of a SOCD data stream. Headers `000kkkkk`,
// `001kkkkk` and `010kkkkk` introduce a transposed bit matrix of
// `8 << (header >> 5)` values, `(header & 31) + 1` bits each.
/// Run of zero residuals, ULEB128 count minus one.
pub(crate) const BLOCK_ZERO_RUN: u8 = 0xfe;
/// Literal SLEB128 residuals, ULEB128 count minus one.
pub(crate) const BLOCK_SLEB128: u8 = 0xff;

#[derive(Debug, Error)]
pub enum Error {
    /// Leading chunk tag absent: not a container file.
    #[error("not a succinct rinex container")]
    NotSrnx,
    /// Container validation failure.
    #[error("corrupt container")]
    Corrupt,
    /// Container major version not understood.
    #[error("unsupported container major version")]
    BadMajor,
    /// Operation invalid in the reader's current state.
    #[error("invalid operation for reader state")]
    BadState,
    /// Requested chunk absent.
    #[error("no such chunk")]
    NoChunk,
    /// Satellite system not declared by the stored header.
    #[error("unknown satellite system")]
    UnknownSystem,
    /// Observation code not declared, or never observed for the
    /// requested satellite.
    #[error("unknown observation code")]
    UnknownCode,
    /// Satellite absent from the container.
    #[error("unknown satellite")]
    UnknownSatellite,
    /// Underlying transport failure.
    #[error("i/o error")]
    System(#[from] std::io::Error),
}

/// Converts decoded observation values to floating point:
/// `value * scale / 1000`, with `scale` the stored scale times 1000.
/// Exact for magnitudes below 2⁵¹.
pub fn convert_s64_to_double(values: &[i64], scale_x1000: i64) -> Vec<f64> {
    let factor = scale_x1000 as f64 / 1000.0;
    values.iter().map(|&v| v as f64 * factor).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn double_conversion() {
        let values = [23_619_095_450i64, -353, 0];
        let doubles = convert_s64_to_double(&values, 1000);
        assert_eq!(doubles, [23_619_095_450.0, -353.0, 0.0]);
        let halves = convert_s64_to_double(&values[..2], 500);
        assert_eq!(halves, [11_809_547_725.0, -176.5]);
    }
}
