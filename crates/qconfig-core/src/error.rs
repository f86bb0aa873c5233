//! # Error Types
//!
//! Domain-specific error types for qconfig-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  qconfig-core errors (this file)                                       │
//! │  └── CoreError     - Invalid identity, item name or wire value         │
//! │                                                                         │
//! │  qconfig-store errors (separate crate)                                 │
//! │  └── StoreError    - Durable cache failures                            │
//! │                                                                         │
//! │  qconfig-sync errors (separate crate)                                  │
//! │  └── QConfigError  - Auth / Discovery / CheckUpdate / Fetch / ...      │
//! │                                                                         │
//! │  Flow: CoreError → StoreError → QConfigError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core validation and decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A required identity field is empty.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// An item name cannot be used as a cache file name.
    ///
    /// ## When This Occurs
    /// - Empty name
    /// - Name contains `/`, `\` or NUL
    /// - Name is `.`, `..` or the version-index file name
    #[error("Invalid config item name '{name}': {reason}")]
    InvalidItemName { name: String, reason: &'static str },

    /// A header or field that must be an integer version is not one.
    #[error("Invalid version value: '{0}'")]
    InvalidVersion(String),
}
