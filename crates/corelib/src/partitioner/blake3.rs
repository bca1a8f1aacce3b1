//! BLAKE3 content-digest partitioner.

use crate::partitioner::traits::Partitioner;

/// Content-digest partitioner; the default for tags and member addresses.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Partitioner;

impl Partitioner for Blake3Partitioner {
    fn digest(&self, key: &[u8]) -> u64 {
        let hash = ::blake3::hash(key);
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    fn name(&self) -> &'static str {
        "Blake3Partitioner"
    }
}
