//! # In-memory Version Index
//!
//! Fast-path copy of `__version__.json`.
//!
//! Readers take a short read lock and never wait on I/O. Updates are merged
//! entry by entry after the durable document has been written; published
//! entries live only here.

use parking_lot::RwLock;

use qconfig_core::{ItemVersion, VersionEntry, VersionIndex};

/// Shared in-memory version index.
#[derive(Debug, Default)]
pub struct VersionIndexCache {
    inner: RwLock<VersionIndex>,
}

impl VersionIndexCache {
    pub fn new(index: VersionIndex) -> Self {
        VersionIndexCache {
            inner: RwLock::new(index),
        }
    }

    /// Returns a copy of the whole index.
    pub fn snapshot(&self) -> VersionIndex {
        self.inner.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<VersionEntry> {
        self.inner.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Every known item with its version and profile.
    pub fn want_list(&self) -> Vec<ItemVersion> {
        self.inner.read().want_list()
    }

    /// Records one entry without touching disk.
    pub fn insert(&self, name: &str, entry: VersionEntry) {
        self.inner.write().insert(name, entry);
    }

    /// Overwrites the given entries in one write section, leaving every other
    /// entry as it is.
    pub fn merge<'a, I>(&self, entries: I)
    where
        I: IntoIterator<Item = (&'a str, VersionEntry)>,
    {
        let mut index = self.inner.write();
        for (name, entry) in entries {
            index.insert(name, entry);
        }
    }

    /// Replaces the whole index.
    pub fn replace(&self, index: VersionIndex) {
        *self.inner.write() = index;
    }
}
