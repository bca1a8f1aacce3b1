//! Lookup trace.

use crate::ring::Identifier;
use serde::{Deserialize, Serialize};

/// Identifiers of the members a request visited, in visitation order.
///
/// Diagnostic only; routing never reads it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    hops: Vec<Identifier>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: Identifier) {
        self.hops.push(id);
    }

    /// Records `id` unless it is already the most recent hop.
    pub fn record_once(&mut self, id: Identifier) {
        if self.hops.last() != Some(&id) {
            self.hops.push(id);
        }
    }

    pub fn extend<I: IntoIterator<Item = Identifier>>(&mut self, hops: I) {
        self.hops.extend(hops);
    }

    pub fn hops(&self) -> &[Identifier] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn clear(&mut self) {
        self.hops.clear();
    }

    pub fn into_vec(self) -> Vec<Identifier> {
        self.hops
    }
}

impl From<Vec<Identifier>> for Trace {
    fn from(hops: Vec<Identifier>) -> Self {
        Self { hops }
    }
}
