//! # Domain Types
//!
//! Core data model of the QConfig client.
//!
//! ## Type Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ClientIdentity ─── bootstrap ──► (server token, server type, addrs)   │
//! │                                                                         │
//! │  ConfigItem { name, version, profile, checksum, body }                  │
//! │       │                                                                 │
//! │       │ entry()                                                         │
//! │       ▼                                                                 │
//! │  VersionIndex: name → VersionEntry { version, checksum, profile }       │
//! │       │                                                                 │
//! │       │ want_list()                                                     │
//! │       ▼                                                                 │
//! │  ItemVersion { name, version, profile } ── checkupdatev2 ──►           │
//! │                                                                         │
//! │  ◄── ChangeDescriptor { group, name, version, profile }                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::CoreResult;

// =============================================================================
// Client Identity
// =============================================================================

/// Who this client is and where it bootstraps from.
///
/// Immutable after construction. All four fields must be non-empty before an
/// engine may start (see [`crate::validation::validate_identity`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Project (group) name, e.g. "order-service".
    pub project_name: String,
    /// Long-lived project token exchanged for a server token.
    pub project_token: String,
    /// URL of the token exchange endpoint.
    pub token_endpoint_url: String,
    /// URL of the entrypoint (server list) endpoint.
    pub entrypoint_url: String,
}

impl ClientIdentity {
    /// Creates a validated identity.
    pub fn new(
        project_name: impl Into<String>,
        project_token: impl Into<String>,
        token_endpoint_url: impl Into<String>,
        entrypoint_url: impl Into<String>,
    ) -> CoreResult<Self> {
        let identity = ClientIdentity {
            project_name: project_name.into(),
            project_token: project_token.into(),
            token_endpoint_url: token_endpoint_url.into(),
            entrypoint_url: entrypoint_url.into(),
        };
        crate::validation::validate_identity(&identity)?;
        Ok(identity)
    }
}

// =============================================================================
// Config Item
// =============================================================================

/// A named configuration file as served by `forceloadv2`.
///
/// Identity is `name`. An item is always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    /// Server-assigned, monotonically increasing.
    pub version: i64,
    /// Environment tag, e.g. "prod" or "beta".
    pub profile: String,
    pub checksum: String,
    pub body: String,
}

impl ConfigItem {
    /// Returns the index entry describing this item (everything but the body).
    pub fn entry(&self) -> VersionEntry {
        VersionEntry {
            version: self.version,
            checksum: self.checksum.clone(),
            profile: self.profile.clone(),
        }
    }
}

// =============================================================================
// Version Index
// =============================================================================

/// What we believe is the latest version of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: i64,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub profile: String,
}

/// Mapping of item name to its last-known [`VersionEntry`].
///
/// Serializes as a plain JSON object, which is exactly the layout of
/// `__version__.json`:
///
/// ```json
/// { "a.properties": { "version": 3, "checksum": "9f..", "profile": "prod" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionIndex(BTreeMap<String, VersionEntry>);

impl VersionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&VersionEntry> {
        self.0.get(name)
    }

    /// Inserts or overwrites the entry for `name`, returning the previous one.
    pub fn insert(&mut self, name: impl Into<String>, entry: VersionEntry) -> Option<VersionEntry> {
        self.0.insert(name.into(), entry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VersionEntry)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Adds every entry of `other` that this index does not know yet.
    pub fn fill_missing_from(&mut self, other: &VersionIndex) {
        for (name, entry) in other.iter() {
            self.0
                .entry(name.to_string())
                .or_insert_with(|| entry.clone());
        }
    }

    /// Builds the checkupdatev2 request list: one tuple per known item.
    pub fn want_list(&self) -> Vec<ItemVersion> {
        self.0
            .iter()
            .map(|(name, entry)| ItemVersion {
                name: name.clone(),
                version: entry.version,
                profile: entry.profile.clone(),
            })
            .collect()
    }
}

impl FromIterator<(String, VersionEntry)> for VersionIndex {
    fn from_iter<T: IntoIterator<Item = (String, VersionEntry)>>(iter: T) -> Self {
        VersionIndex(iter.into_iter().collect())
    }
}

// =============================================================================
// Update Check Types
// =============================================================================

/// One `(name, version, profile)` tuple sent to checkupdatev2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVersion {
    pub name: String,
    pub version: i64,
    pub profile: String,
}

impl ItemVersion {
    pub fn new(name: impl Into<String>, version: i64, profile: impl Into<String>) -> Self {
        ItemVersion {
            name: name.into(),
            version,
            profile: profile.into(),
        }
    }
}

/// Server-reported notice that `name` has a newer version than we know of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    /// Project name echoed back by the server.
    pub group: String,
    pub name: String,
    pub version: i64,
    pub profile: String,
}
