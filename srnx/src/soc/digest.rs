//! Chunk and file digests.

use crc::{Crc, CRC_32_ISCSI};
use sha2::{Digest as _, Sha256};

use super::Error;

static CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Digest algorithm identifier, as stored in the leading chunk.
/// Zero means "no digest"; identifier 2 is CRC32C and 6 is SHA-256.
/// Other values are reserved and rejected, since chunks cannot be
/// walked without a trusted digest length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestId {
    #[default]
    None,
    Crc32c,
    Sha256,
}

impl DigestId {
    pub fn from_u64(id: u64) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            2 => Some(Self::Crc32c),
            6 => Some(Self::Sha256),
            _ => None,
        }
    }

    pub fn id(self) -> u64 {
        match self {
            Self::None => 0,
            Self::Crc32c => 2,
            Self::Sha256 => 6,
        }
    }

    /// Stored digest length in bytes.
    pub fn len(self) -> usize {
        match self {
            Self::None => 0,
            Self::Crc32c => 4,
            Self::Sha256 => 32,
        }
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Digests `data`, big endian for the CRC.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = Hasher::new(self);
        hasher.update(data);
        hasher.finalize()
    }

    /// Checks a stored digest against `data`.
    pub fn verify(self, data: &[u8], stored: &[u8]) -> Result<(), Error> {
        if self.digest(data) == stored {
            Ok(())
        } else {
            Err(Error::Corrupt)
        }
    }
}

/// Incremental digest state.
pub enum Hasher {
    None,
    Crc32c(crc::Digest<'static, u32>),
    Sha256(Box<Sha256>),
}

impl Hasher {
    pub fn new(id: DigestId) -> Self {
        match id {
            DigestId::None => Self::None,
            DigestId::Crc32c => Self::Crc32c(CASTAGNOLI.digest()),
            DigestId::Sha256 => Self::Sha256(Box::default()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::None => {},
            Self::Crc32c(digest) => digest.update(data),
            Self::Sha256(sha) => sha.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::None => Vec::new(),
            Self::Crc32c(digest) => digest.finalize().to_be_bytes().to_vec(),
            Self::Sha256(sha) => sha.finalize().to_vec(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identifiers() {
        assert_eq!(DigestId::from_u64(0), Some(DigestId::None));
        assert_eq!(DigestId::from_u64(2), Some(DigestId::Crc32c));
        assert_eq!(DigestId::from_u64(6), Some(DigestId::Sha256));
        assert_eq!(DigestId::from_u64(3), None);
        assert_eq!(DigestId::Crc32c.len(), 4);
        assert_eq!(DigestId::Sha256.len(), 32);
    }

    #[test]
    fn crc32c_known_answer() {
        // CRC-32/iSCSI of "123456789"
        assert_eq!(
            DigestId::Crc32c.digest(b"123456789"),
            0xe3069283u32.to_be_bytes().to_vec()
        );
    }

    #[test]
    fn verify_detects_corruption() {
        let digest = DigestId::Sha256.digest(b"payload");
        assert!(DigestId::Sha256.verify(b"payload", &digest).is_ok());
        assert!(DigestId::Sha256.verify(b"payload!", &digest).is_err());
    }
}
