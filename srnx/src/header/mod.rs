//! RINEX observation header model.
//!
//! Only the parts of the header the record reader and the container
//! need are decoded: the version, the file type, and the per system
//! observation code tables. The full header text survives verbatim
//! (modulo line terminator normalization) so it can be stored in the
//! container and searched by label.

use std::fmt;

use crate::observable::ObsCode;

mod parsing;

pub(crate) use parsing::parse;
pub(crate) use parsing::parse_rhdr;

/// File format revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Observation codes declared for one satellite system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemCodes {
    /// System letter as declared (`'M'` covers the 2.x mixed case).
    pub system: u8,
    /// Declared codes, in header order.
    pub codes: Vec<ObsCode>,
}

/// Parsed observation file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    version: Version,
    text: String,
    systems: Vec<SystemCodes>,
    /// Low five bits of a system letter to `1 + systems` position;
    /// zero marks an undeclared system.
    index: [u8; 32],
}

impl Header {
    pub fn version(&self) -> Version {
        self.version
    }

    /// Normalized header text, END OF HEADER line included. Terminators
    /// are LF and trailing blanks are trimmed from every line.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Declared systems in header order.
    pub fn systems(&self) -> &[SystemCodes] {
        &self.systems
    }

    fn entry(&self, system: u8) -> Option<&SystemCodes> {
        match self.index[usize::from(system & 31)] {
            0 => None,
            ii => self.systems.get(usize::from(ii) - 1),
        }
    }

    /// True when `system` is declared by this header.
    pub fn has_system(&self, system: u8) -> bool {
        self.index[usize::from(system & 31)] != 0
    }

    /// Number of observation codes declared for `system`.
    pub fn n_obs(&self, system: u8) -> usize {
        self.entry(system).map_or(0, |e| e.codes.len())
    }

    /// Declared codes for `system`, in record layout order.
    pub fn codes(&self, system: u8) -> &[ObsCode] {
        self.entry(system).map_or(&[], |e| e.codes.as_slice())
    }

    /// First header line carrying `label` in its label columns.
    pub fn find_label<'a>(&'a self, label: &str) -> Option<&'a str> {
        self.text
            .lines()
            .find(|line| line.len() == 60 + label.len() && &line[60..] == label)
    }

    /// All header lines carrying `label` in their label columns.
    pub fn lines_with_label<'a>(
        &'a self,
        label: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.text
            .lines()
            .filter(move |line| line.len() == 60 + label.len() && &line[60..] == label)
    }
}
