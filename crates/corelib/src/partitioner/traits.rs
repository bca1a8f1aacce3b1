//! Core partitioner trait definitions.

/// A partitioner converts opaque keys into raw digests that the identifier
/// space reduces onto the ring.
///
/// Partitioners are stateless and thread-safe, so tag hashing and member id
/// assignment need no synchronization.
pub trait Partitioner: Send + Sync + 'static {
    /// Digest of `key`. Must be deterministic across processes.
    fn digest(&self, key: &[u8]) -> u64;

    /// Returns the name of this partitioner.
    fn name(&self) -> &'static str;
}
