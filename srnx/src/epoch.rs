//! Epoch records: the timestamped head of every observation or event.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `EpochFlag` validates an epoch, or describes the special event that
/// occurred instead of observations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EpochFlag {
    /// Epoch is sane
    #[default]
    Ok,
    /// Power failure since previous epoch
    PowerFailure,
    /// Antenna is being moved at current epoch
    AntennaBeingMoved,
    /// Site has changed, receiver has moved since last epoch
    NewSiteOccupation,
    /// New header information follows this epoch
    HeaderInformationFollows,
    /// External significant event at this epoch
    ExternalEvent,
    /// Cycle slip records at this epoch
    CycleSlip,
}

impl EpochFlag {
    /// Decodes the single column flag of an epoch line.
    pub fn from_ascii(c: u8) -> Option<Self> {
        match c {
            b'0' => Some(Self::Ok),
            b'1' => Some(Self::PowerFailure),
            b'2' => Some(Self::AntennaBeingMoved),
            b'3' => Some(Self::NewSiteOccupation),
            b'4' => Some(Self::HeaderInformationFollows),
            b'5' => Some(Self::ExternalEvent),
            b'6' => Some(Self::CycleSlip),
            _ => None,
        }
    }

    /// The column this flag occupies in an epoch line.
    pub fn to_ascii(self) -> u8 {
        match self {
            Self::Ok => b'0',
            Self::PowerFailure => b'1',
            Self::AntennaBeingMoved => b'2',
            Self::NewSiteOccupation => b'3',
            Self::HeaderInformationFollows => b'4',
            Self::ExternalEvent => b'5',
            Self::CycleSlip => b'6',
        }
    }

    /// True when the record following this flag carries observations.
    pub fn is_observation(self) -> bool {
        matches!(self, Self::Ok | Self::PowerFailure | Self::CycleSlip)
    }

    /// True when the record following this flag is a special event.
    pub fn is_event(self) -> bool {
        !self.is_observation()
    }
}

impl fmt::Display for EpochFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", char::from(self.to_ascii()))
    }
}

/// Decimal coded epoch: date, time of day, flag, record count and
/// receiver clock offset. Kept syntactic on purpose; no time scale
/// arithmetic is performed on these fields.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Epoch {
    /// Decimal coded date: `year * 10000 + month * 100 + day`.
    pub yyyy_mm_dd: i32,
    /// Decimal coded minute of day: `hour * 100 + minute`.
    pub hh_mm: i16,
    /// Epoch flag.
    pub flag: EpochFlag,
    /// Seconds of minute times 10⁷.
    pub sec_e7: i32,
    /// Number of satellites, or of special event records.
    pub n_sats: i32,
    /// Receiver clock offset in seconds times 10¹².
    pub clock_offset_e12: i64,
}

impl Epoch {
    /// Seconds since midnight times 10⁷, used when delta coding
    /// consecutive epochs.
    pub fn second_of_day_e7(&self) -> i64 {
        let hours = i64::from(self.hh_mm) / 100;
        let minutes = i64::from(self.hh_mm) % 100;
        (hours * 3600 + minutes * 60) * 10_000_000 + i64::from(self.sec_e7)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:010.7}",
            self.yyyy_mm_dd / 10000,
            self.yyyy_mm_dd / 100 % 100,
            self.yyyy_mm_dd % 100,
            self.hh_mm / 100,
            self.hh_mm % 100,
            self.sec_e7 as f64 / 1e7,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flag_roundtrip() {
        for c in b'0'..=b'6' {
            let flag = EpochFlag::from_ascii(c).unwrap();
            assert_eq!(flag.to_ascii(), c);
        }
        assert_eq!(EpochFlag::from_ascii(b'7'), None);
        assert!(EpochFlag::Ok.is_observation());
        assert!(EpochFlag::CycleSlip.is_observation());
        assert!(EpochFlag::AntennaBeingMoved.is_event());
    }

    #[test]
    fn second_of_day() {
        let epoch = Epoch {
            yyyy_mm_dd: 20200101,
            hh_mm: 1230,
            sec_e7: 150_000_000,
            ..Default::default()
        };
        assert_eq!(epoch.second_of_day_e7(), (12 * 3600 + 30 * 60 + 15) * 10_000_000);
    }

    #[test]
    fn display() {
        let epoch = Epoch {
            yyyy_mm_dd: 20050115,
            hh_mm: 316,
            sec_e7: 120_000_000,
            ..Default::default()
        };
        assert_eq!(epoch.to_string(), "2005-01-15 03:16:12.0000000");
    }
}
