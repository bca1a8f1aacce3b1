//! Client-side tag identifiers.
//!
//! Identifiers are assigned by the client, not the ring, so every client
//! process that talks to one ring must see the same assignments. The
//! registry is kept in a JSON file next to the client and reloaded on
//! every run.

use corelib::{HashAlgorithm, IdAllocator, Identifier, IdentifierSpace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed tag registry: {0}")]
    Format(#[from] serde_json::Error),
    #[error("tag registry was written for {found}, ring uses {expected}")]
    Mismatch { expected: String, found: String },
    #[error(transparent)]
    Ring(#[from] corelib::Error),
}

/// On-disk form of a registry.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    bits: u32,
    hash: HashAlgorithm,
    tags: BTreeMap<String, Identifier>,
}

/// Maps tag text to ring identifiers.
///
/// A tag keeps the identifier it was first given, and two distinct tags
/// never share one. Only tags this registry has seen can be subscribed to.
#[derive(Debug)]
pub struct TagRegistry {
    ids: IdAllocator,
    hash: HashAlgorithm,
}

impl TagRegistry {
    pub fn new(space: IdentifierSpace, hash: HashAlgorithm) -> Self {
        Self {
            ids: IdAllocator::new(space, hash.partitioner()),
            hash,
        }
    }

    /// Loads the registry saved at `path`; a missing file is an empty
    /// registry. The file must have been written for the same ring width
    /// and hash.
    pub fn load(
        path: &Path,
        space: IdentifierSpace,
        hash: HashAlgorithm,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(space, hash);
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(registry),
            Err(e) => return Err(e.into()),
        };

        let file: RegistryFile = serde_json::from_str(&content)?;
        if file.bits != space.bits() || file.hash != hash {
            return Err(RegistryError::Mismatch {
                expected: format!("M={} {:?}", space.bits(), hash),
                found: format!("M={} {:?}", file.bits, file.hash),
            });
        }
        for (tag, id) in &file.tags {
            registry.ids.assign(tag, *id)?;
        }
        debug!(path = %path.display(), tags = registry.len(), "tag registry loaded");
        Ok(registry)
    }

    /// Writes the registry to `path`, replacing the file whole.
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let file = RegistryFile {
            bits: self.space().bits(),
            hash: self.hash,
            tags: self
                .ids
                .assignments()
                .map(|(tag, id)| (tag.to_string(), id))
                .collect(),
        };
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        std::fs::write(&staging, serde_json::to_string_pretty(&file)?)?;
        std::fs::rename(&staging, path)?;
        debug!(path = %path.display(), tags = file.tags.len(), "tag registry saved");
        Ok(())
    }

    /// Identifier for `tag`, assigning one on first use.
    pub fn register(&mut self, tag: &str) -> corelib::Result<Identifier> {
        self.ids.allocate(tag)
    }

    /// Identifier of a tag registered earlier.
    pub fn resolve(&self, tag: &str) -> Option<Identifier> {
        self.ids.get(tag)
    }

    pub fn space(&self) -> IdentifierSpace {
        self.ids.space()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
