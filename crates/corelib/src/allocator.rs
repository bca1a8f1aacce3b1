//! Collision-free identifier assignment.
//!
//! The ring cannot hold two members (or two tags) on one identifier, so every
//! hashed key is checked against the identifiers already handed out and
//! rehashed with a perturbation until a free slot turns up.

use crate::error::{Error, Result};
use crate::partitioner::Partitioner;
use crate::ring::{Identifier, IdentifierSpace};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Assigns unique identifiers to keys.
///
/// A key keeps the identifier it was first given; asking again returns the
/// same one.
pub struct IdAllocator {
    space: IdentifierSpace,
    partitioner: Box<dyn Partitioner>,
    used: HashSet<Identifier>,
    assigned: HashMap<String, Identifier>,
}

impl IdAllocator {
    pub fn new(space: IdentifierSpace, partitioner: Box<dyn Partitioner>) -> Self {
        Self {
            space,
            partitioner,
            used: HashSet::new(),
            assigned: HashMap::new(),
        }
    }

    pub fn space(&self) -> IdentifierSpace {
        self.space
    }

    /// Marks `id` as taken without a key (the coordinator's well-known id).
    pub fn reserve(&mut self, id: Identifier) -> Result<()> {
        if !self.space.contains(id) {
            return Err(Error::InvalidSpace(format!(
                "identifier {} outside ring of size {}",
                id,
                self.space.size()
            )));
        }
        if !self.used.insert(id) {
            return Err(Error::IdentifierTaken(id));
        }
        Ok(())
    }

    /// Identifier for `key`, hashing (and rehashing on collision) on first use.
    pub fn allocate(&mut self, key: &str) -> Result<Identifier> {
        if let Some(id) = self.assigned.get(key) {
            return Ok(*id);
        }
        if self.used.len() as u64 >= self.space.size() {
            return Err(Error::SpaceExhausted {
                size: self.space.size(),
            });
        }

        let mut candidate = self.space.hash(&*self.partitioner, key.as_bytes());
        let mut attempt: u64 = 0;
        let rehash_budget = self.space.size().saturating_mul(4);
        while self.used.contains(&candidate) {
            attempt += 1;
            if attempt <= rehash_budget {
                let perturbed = format!("{}#{}", key, attempt);
                candidate = self.space.hash(&*self.partitioner, perturbed.as_bytes());
            } else {
                // Hash keeps landing on taken slots; probe clockwise instead.
                candidate = self.space.add(candidate, 1);
            }
        }

        if attempt > 0 {
            tracing::debug!(key, attempts = attempt, id = %candidate, "resolved identifier collision");
        }
        self.used.insert(candidate);
        self.assigned.insert(key.to_string(), candidate);
        Ok(candidate)
    }

    /// Restores an assignment made earlier, e.g. by another process.
    ///
    /// Re-assigning the same pair is a no-op; moving a key or sharing an
    /// identifier between keys is refused.
    pub fn assign(&mut self, key: &str, id: Identifier) -> Result<()> {
        match self.assigned.get(key) {
            Some(existing) if *existing == id => return Ok(()),
            Some(existing) => {
                return Err(Error::KeyAssigned {
                    key: key.to_string(),
                    id: *existing,
                })
            }
            None => {}
        }
        self.reserve(id)?;
        self.assigned.insert(key.to_string(), id);
        Ok(())
    }

    /// Every key with its identifier, in no particular order.
    pub fn assignments(&self) -> impl Iterator<Item = (&str, Identifier)> + '_ {
        self.assigned.iter().map(|(key, id)| (key.as_str(), *id))
    }

    /// Identifier previously assigned to `key`, if any.
    pub fn get(&self, key: &str) -> Option<Identifier> {
        self.assigned.get(key).copied()
    }

    pub fn is_used(&self, id: Identifier) -> bool {
        self.used.contains(&id)
    }

    /// Number of identifiers handed out or reserved.
    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

impl fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdAllocator")
            .field("space", &self.space)
            .field("partitioner", &self.partitioner.name())
            .field("used", &self.used.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioner::Blake3Partitioner;

    /// Maps every key to the same digest, so every second key collides.
    struct ConstantPartitioner;

    impl Partitioner for ConstantPartitioner {
        fn digest(&self, key: &[u8]) -> u64 {
            // Perturbed keys ("tag#n") get distinct digests, raw keys all collide.
            match key.iter().position(|b| *b == b'#') {
                Some(pos) => key[pos + 1..].iter().map(|b| *b as u64).sum::<u64>() + 7,
                None => 7,
            }
        }

        fn name(&self) -> &'static str {
            "ConstantPartitioner"
        }
    }

    fn allocator(bits: u32) -> IdAllocator {
        IdAllocator::new(IdentifierSpace::new(bits).unwrap(), Box::new(Blake3Partitioner))
    }

    #[test]
    fn test_allocation_is_idempotent() {
        let mut ids = allocator(6);
        let first = ids.allocate("news").unwrap();
        assert_eq!(ids.allocate("news").unwrap(), first);
        assert_eq!(ids.get("news"), Some(first));
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_colliding_keys_get_distinct_ids() {
        let space = IdentifierSpace::new(6).unwrap();
        let mut ids = IdAllocator::new(space, Box::new(ConstantPartitioner));
        let a = ids.allocate("alpha").unwrap();
        let b = ids.allocate("beta").unwrap();
        assert_eq!(a, Identifier(7));
        assert_ne!(a, b);
        // The first key keeps its slot.
        assert_eq!(ids.get("alpha"), Some(Identifier(7)));
    }

    #[test]
    fn test_reserved_id_is_never_handed_out() {
        let space = IdentifierSpace::new(6).unwrap();
        let mut ids = IdAllocator::new(space, Box::new(ConstantPartitioner));
        ids.reserve(Identifier(7)).unwrap();
        assert_ne!(ids.allocate("alpha").unwrap(), Identifier(7));
        assert!(matches!(ids.reserve(Identifier(7)), Err(Error::IdentifierTaken(_))));
    }

    #[test]
    fn test_fills_whole_space_then_fails() {
        let mut ids = allocator(3);
        let mut seen = HashSet::new();
        for n in 0..8 {
            assert!(seen.insert(ids.allocate(&format!("key-{}", n)).unwrap()));
        }
        assert!(matches!(
            ids.allocate("one-too-many"),
            Err(Error::SpaceExhausted { size: 8 })
        ));
    }

    #[test]
    fn test_restored_assignments_steer_new_keys() {
        let space = IdentifierSpace::new(6).unwrap();
        let mut ids = IdAllocator::new(space, Box::new(ConstantPartitioner));
        ids.assign("alpha", Identifier(7)).unwrap();
        ids.assign("alpha", Identifier(7)).unwrap();
        assert_eq!(ids.allocate("alpha").unwrap(), Identifier(7));
        assert_ne!(ids.allocate("beta").unwrap(), Identifier(7));
        assert_eq!(ids.assignments().count(), 2);
    }

    #[test]
    fn test_conflicting_assignments_are_refused() {
        let mut ids = allocator(6);
        ids.assign("alpha", Identifier(7)).unwrap();
        assert!(matches!(
            ids.assign("alpha", Identifier(8)),
            Err(Error::KeyAssigned { id: Identifier(7), .. })
        ));
        assert!(matches!(
            ids.assign("beta", Identifier(7)),
            Err(Error::IdentifierTaken(Identifier(7)))
        ));
        assert!(ids.assign("gamma", Identifier(64)).is_err());
        assert_eq!(ids.get("beta"), None);
    }

    #[test]
    fn test_reserve_outside_space() {
        let mut ids = allocator(3);
        assert!(ids.reserve(Identifier(8)).is_err());
    }
}
