//! Session tag store
//!
//! Two logical layers back every analytics report:
//! - baseline tags, fixed at initialization and immutable afterwards
//! - session tags, baseline plus per-session metadata, re-seeded from the
//!   baseline whenever a playback session ends

use crate::types::{TagMap, TagValue};

/// Append/merge-only mapping used to build outgoing analytics metadata.
///
/// Merges are last-write-wins on key collision and never remove keys. The
/// session layer always contains every baseline key unless a session-scoped
/// merge overwrote it.
#[derive(Debug, Default)]
pub struct TagStore {
    baseline: TagMap,
    session: TagMap,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the baseline layer. Both layers receive the tags; the session
    /// layer will be re-seeded from the baseline on every reset.
    ///
    /// Only initialization calls this; the baseline is immutable afterwards.
    pub fn seed_baseline(&mut self, tags: TagMap) {
        for (key, value) in tags {
            self.baseline.insert(key.clone(), value.clone());
            self.session.insert(key, value);
        }
    }

    /// Merge `additions` into the session layer, overwriting on collision.
    pub fn merge(&mut self, additions: TagMap) {
        for (key, value) in additions {
            self.session.insert(key, value);
        }
    }

    /// Insert a single session-scoped tag.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        self.session.insert(key.into(), value.into());
    }

    /// Replace the session layer with a fresh copy of the baseline.
    ///
    /// Deep-copy semantics: mutating the session afterwards must not leak
    /// into the baseline.
    pub fn reset_to_baseline(&mut self) {
        self.session = self.baseline.clone();
    }

    /// Owned snapshot of the session layer, handed to sink calls.
    pub fn snapshot(&self) -> TagMap {
        self.session.clone()
    }

    pub fn session(&self) -> &TagMap {
        &self.session
    }

    pub fn baseline(&self) -> &TagMap {
        &self.baseline
    }
}
