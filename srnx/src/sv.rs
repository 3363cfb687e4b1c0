//! Satellite names.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("satellite system letter is not printable")]
    BadSystem,
    #[error("satellite number is not numeric")]
    BadNumber,
}

/// A satellite name: one system letter and a two digit vehicle number,
/// e.g. `G05`. A blank system letter is the GPS shorthand of the 2.x
/// format and normalizes to `'G'`.
///
/// The low five bits of the system letter are distinct for every
/// defined system, which is what the per system tables index on; see
/// [SvName::system_index].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SvName {
    /// System letter (`G R S E C J I`).
    pub system: u8,
    /// Vehicle number within the system.
    pub prn: u8,
}

impl SvName {
    pub fn new(system: u8, prn: u8) -> Self {
        Self { system, prn }
    }

    /// Decodes the three name bytes of an epoch or body line.
    pub fn from_bytes(name: &[u8]) -> Result<Self, Error> {
        let system = match name[0] {
            b' ' => b'G',
            c if c.is_ascii_uppercase() => c,
            _ => return Err(Error::BadSystem),
        };
        let tens = match name[1] {
            b' ' => 0,
            c if c.is_ascii_digit() => c - b'0',
            _ => return Err(Error::BadNumber),
        };
        if !name[2].is_ascii_digit() {
            return Err(Error::BadNumber);
        }
        Ok(Self {
            system,
            prn: tens * 10 + (name[2] - b'0'),
        })
    }

    /// The three name bytes, as stored in the container.
    pub fn to_bytes(self) -> [u8; 3] {
        [
            self.system,
            b'0' + self.prn / 10,
            b'0' + self.prn % 10,
        ]
    }

    /// Index into the 32 entry system tables.
    pub fn system_index(self) -> usize {
        usize::from(self.system & 31)
    }
}

impl fmt::Display for SvName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{:02}", char::from(self.system), self.prn)
    }
}

impl FromStr for SvName {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 3 {
            return Err(Error::BadNumber);
        }
        Self::from_bytes(s.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn name_parsing() {
        assert_eq!(SvName::from_bytes(b"G05"), Ok(SvName::new(b'G', 5)));
        assert_eq!(SvName::from_bytes(b"R 9"), Ok(SvName::new(b'R', 9)));
        assert_eq!(SvName::from_bytes(b" 12"), Ok(SvName::new(b'G', 12)));
        assert_eq!(SvName::from_bytes(b"E36"), Ok(SvName::new(b'E', 36)));
        assert!(SvName::from_bytes(b"Gxx").is_err());
    }

    #[test]
    fn name_formatting() {
        assert_eq!(SvName::new(b'G', 5).to_bytes(), *b"G05");
        assert_eq!(SvName::new(b'C', 36).to_string(), "C36");
        assert_eq!("J03".parse::<SvName>(), Ok(SvName::new(b'J', 3)));
    }

    #[test]
    fn system_indices_are_distinct() {
        let systems = [b'G', b'R', b'S', b'E', b'C', b'J', b'I'];
        for (ii, &a) in systems.iter().enumerate() {
            for &b in systems.iter().skip(ii + 1) {
                assert_ne!(SvName::new(a, 1).system_index(), SvName::new(b, 1).system_index());
            }
        }
    }
}
