//! Observation codes.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An observation code: two characters in 2.x files (`C1`, `L2`),
/// three in 3.x files (`C1C`, `L2W`), NUL padded to a fixed width slot
/// so signal names compare and hash as plain words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObsCode([u8; 4]);

impl ObsCode {
    /// Builds a code from a 2 or 3 character slot, dropping trailing
    /// blanks.
    pub fn from_slice(slot: &[u8]) -> Self {
        let mut code = [0u8; 4];
        for (ii, &b) in slot.iter().take(3).enumerate() {
            if b == b' ' || b == 0 {
                break;
            }
            code[ii] = b;
        }
        Self(code)
    }

    /// The NUL padded slot, as stored in the container.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(4);
        std::str::from_utf8(&self.0[..len]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Display for ObsCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObsCode {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_slice(s.as_bytes()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slot_decoding() {
        assert_eq!(ObsCode::from_slice(b"C1").as_str(), "C1");
        assert_eq!(ObsCode::from_slice(b"C1 ").as_str(), "C1");
        assert_eq!(ObsCode::from_slice(b"L2W").as_str(), "L2W");
        assert!(ObsCode::from_slice(b"   ").is_empty());
    }

    #[test]
    fn comparison() {
        let a: ObsCode = "C1C".parse().unwrap();
        let b = ObsCode::from_slice(b"C1C");
        assert_eq!(a, b);
        assert_ne!(a, "C1W".parse().unwrap());
    }
}
