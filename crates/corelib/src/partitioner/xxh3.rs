//! XXH3 partitioner.

use crate::partitioner::traits::Partitioner;
use xxhash_rust::xxh3::xxh3_64;

/// Fast non-cryptographic partitioner.
#[derive(Clone, Copy, Debug, Default)]
pub struct Xxh3Partitioner;

impl Partitioner for Xxh3Partitioner {
    fn digest(&self, key: &[u8]) -> u64 {
        xxh3_64(key)
    }

    fn name(&self) -> &'static str {
        "Xxh3Partitioner"
    }
}
