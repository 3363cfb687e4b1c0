//! Loss of lock indicator interpretation.
//!
//! The record reader passes LLI bytes through verbatim; this is the
//! decoded view for callers that want to reason about them.

use bitflags::bitflags;

bitflags! {
    /// Decoded loss of lock indicator.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LliFlags: u8 {
        /// Lock lost between previous and current observation: possible
        /// cycle slip.
        const LOCK_LOSS = 0x01;
        /// Half cycle slip marker.
        const HALF_CYCLE_SLIP = 0x02;
        /// Observation under anti spoofing: possibly degraded.
        const UNDER_ANTI_SPOOFING = 0x04;
    }
}

impl LliFlags {
    /// Decodes the one column indicator of an observation field. Blank
    /// means "nothing to report".
    pub fn from_ascii(c: u8) -> Option<Self> {
        match c {
            b' ' => Some(Self::empty()),
            b'0'..=b'7' => Some(Self::from_bits_truncate(c - b'0')),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decoding() {
        assert_eq!(LliFlags::from_ascii(b' '), Some(LliFlags::empty()));
        assert_eq!(LliFlags::from_ascii(b'1'), Some(LliFlags::LOCK_LOSS));
        assert_eq!(
            LliFlags::from_ascii(b'5'),
            Some(LliFlags::LOCK_LOSS | LliFlags::UNDER_ANTI_SPOOFING)
        );
        assert_eq!(LliFlags::from_ascii(b'x'), None);
    }
}
