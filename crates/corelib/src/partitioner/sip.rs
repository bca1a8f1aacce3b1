//! SipHash partitioner.

use crate::partitioner::traits::Partitioner;
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// SipHash-1-3 with zero keys, so digests agree across processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct SipPartitioner;

impl Partitioner for SipPartitioner {
    fn digest(&self, key: &[u8]) -> u64 {
        let mut hasher = SipHasher13::new();
        hasher.write(key);
        hasher.finish()
    }

    fn name(&self) -> &'static str {
        "SipPartitioner"
    }
}
