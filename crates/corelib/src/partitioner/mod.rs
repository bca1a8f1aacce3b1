//! Partitioner abstraction for the identifier ring.
//!
//! Partitioners are responsible for converting keys (tag text, member
//! addresses) into digests that can be placed on the ring.

pub mod blake3;
pub mod sip;
pub mod traits;
pub mod xxh3;

pub use self::blake3::Blake3Partitioner;
pub use self::sip::SipPartitioner;
pub use self::xxh3::Xxh3Partitioner;
pub use traits::Partitioner;

use serde::{Deserialize, Serialize};

/// Partitioner selection, as it appears in configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Xxh3,
    Sip,
}

impl HashAlgorithm {
    /// Boxed partitioner for this algorithm.
    pub fn partitioner(self) -> Box<dyn Partitioner> {
        match self {
            HashAlgorithm::Blake3 => Box::new(Blake3Partitioner),
            HashAlgorithm::Xxh3 => Box::new(Xxh3Partitioner),
            HashAlgorithm::Sip => Box::new(SipPartitioner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitioners_are_deterministic() {
        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Xxh3, HashAlgorithm::Sip] {
            let partitioner = algorithm.partitioner();
            assert_eq!(partitioner.digest(b"news"), partitioner.digest(b"news"));
            assert_ne!(partitioner.digest(b"news"), partitioner.digest(b"sports"));
        }
    }

    #[test]
    fn test_partitioner_names() {
        assert_eq!(HashAlgorithm::Blake3.partitioner().name(), "Blake3Partitioner");
        assert_eq!(HashAlgorithm::Xxh3.partitioner().name(), "Xxh3Partitioner");
        assert_eq!(HashAlgorithm::Sip.partitioner().name(), "SipPartitioner");
    }
}
