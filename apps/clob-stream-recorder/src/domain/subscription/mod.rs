//! Subscription Set
//!
//! Tracks the stream identifiers (asset token ids) the session is subscribed
//! to. The set is insertion-ordered and duplicate-free so the exact same
//! list can be replayed on every reconnect.

use std::collections::HashSet;

// =============================================================================
// Types
// =============================================================================

/// Opaque identifier of one instrument stream (an asset token id).
pub type StreamIdentifier = String;

// =============================================================================
// Subscription Set
// =============================================================================

/// Ordered, duplicate-free set of subscribed stream identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    ordered: Vec<StreamIdentifier>,
    index: HashSet<StreamIdentifier>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add identifiers, keeping first-seen order.
    ///
    /// Returns the identifiers that were actually new.
    pub fn add<I>(&mut self, ids: I) -> Vec<StreamIdentifier>
    where
        I: IntoIterator<Item = StreamIdentifier>,
    {
        let mut added = Vec::new();
        for id in ids {
            if id.is_empty() || self.index.contains(&id) {
                continue;
            }
            self.index.insert(id.clone());
            self.ordered.push(id.clone());
            added.push(id);
        }
        added
    }

    /// Remove identifiers.
    ///
    /// Returns the identifiers that were actually present.
    pub fn remove(&mut self, ids: &[StreamIdentifier]) -> Vec<StreamIdentifier> {
        let mut removed = Vec::new();
        for id in ids {
            if self.index.remove(id) {
                removed.push(id.clone());
            }
        }
        if !removed.is_empty() {
            self.ordered.retain(|id| self.index.contains(id));
        }
        removed
    }

    /// Identifiers in subscription order, for replay on reconnect.
    #[must_use]
    pub fn to_vec(&self) -> Vec<StreamIdentifier> {
        self.ordered.clone()
    }

    /// Number of subscribed identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Check if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

impl FromIterator<StreamIdentifier> for SubscriptionSet {
    fn from_iter<T: IntoIterator<Item = StreamIdentifier>>(iter: T) -> Self {
        let mut set = Self::new();
        set.add(iter);
        set
    }
}

// =============================================================================
// Tests
// =============================================================================
