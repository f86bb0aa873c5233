//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       QConfig Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Bootstrap      │  │  Transient      │  │  Permanent              │ │
//! │  │  (fatal)        │  │  (retry later)  │  │  (fix your upload)      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Auth           │  │  CheckUpdate    │  │  NotFound               │ │
//! │  │  Discovery      │  │  Fetch          │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Batch          │  │  Local          │  │  Lifecycle              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Update         │  │  Store          │  │  NotReady               │ │
//! │  │  (not-found +   │  │  Core           │  │  InvalidState           │ │
//! │  │   failed names) │  │  InvalidConfig  │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use qconfig_core::CoreError;
use qconfig_store::StoreError;

/// Result type alias for sync operations.
pub type QConfigResult<T> = Result<T, QConfigError>;

/// Error type covering every failure of the QConfig client.
#[derive(Debug, Error)]
pub enum QConfigError {
    // =========================================================================
    // Bootstrap Errors
    // =========================================================================
    /// Token exchange rejected or unreachable.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Entrypoint returned no usable server address.
    #[error("Server discovery failed: {0}")]
    Discovery(String),

    // =========================================================================
    // Per-call Errors
    // =========================================================================
    /// checkupdatev2 answered with an unexpected status or could not be reached.
    #[error("Update check against {url} failed: {}", describe_check(.status, .message))]
    CheckUpdate {
        url: String,
        status: Option<u16>,
        message: String,
    },

    /// forceloadv2 failed for a reason other than "not found".
    #[error("Failed to fetch '{name}': {message}")]
    Fetch { name: String, message: String },

    /// The item was never uploaded to the configuration service.
    #[error("Config '{name}' does not exist on the server, upload it first")]
    NotFound { name: String },

    /// At least one item of an update batch could not be fetched.
    /// Nothing from the batch was applied.
    #[error("Update failed: {}", describe_batch(.not_found, .failed))]
    Update {
        not_found: Vec<String>,
        failed: Vec<String>,
    },

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Durable cache write failed.
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid identity or item name.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The engine has not completed bootstrap.
    #[error("Engine is not ready (state: {0})")]
    NotReady(String),

    /// Operation not allowed in the current lifecycle state.
    #[error("Invalid engine state: {0}")]
    InvalidState(String),
}

fn describe_check(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("status {}", status),
        None => message.to_string(),
    }
}

fn describe_batch(not_found: &[String], failed: &[String]) -> String {
    let mut parts = Vec::new();
    if !not_found.is_empty() {
        parts.push(format!("not found on server: {}", not_found.join(",")));
    }
    if !failed.is_empty() {
        parts.push(format!("failed to load: {}", failed.join(",")));
    }
    parts.join("; ")
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<toml::de::Error> for QConfigError {
    fn from(err: toml::de::Error) -> Self {
        QConfigError::ConfigLoadFailed(err.to_string())
    }
}

impl From<std::io::Error> for QConfigError {
    fn from(err: std::io::Error) -> Self {
        QConfigError::ConfigLoadFailed(err.to_string())
    }
}

impl From<url::ParseError> for QConfigError {
    fn from(err: url::ParseError) -> Self {
        QConfigError::InvalidConfig(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl QConfigError {
    /// Returns true if a later attempt may succeed without any change on the
    /// server side.
    pub fn is_retryable(&self) -> bool {
        match self {
            QConfigError::CheckUpdate { .. } | QConfigError::Fetch { .. } => true,
            QConfigError::Update { failed, .. } => !failed.is_empty(),
            _ => false,
        }
    }

    /// Returns true if the failure means "never uploaded" rather than
    /// "try again".
    pub fn is_not_found(&self) -> bool {
        match self {
            QConfigError::NotFound { .. } => true,
            QConfigError::Update { not_found, failed } => !not_found.is_empty() && failed.is_empty(),
            _ => false,
        }
    }

    /// Returns true for bootstrap errors that leave the engine unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QConfigError::Auth(_) | QConfigError::Discovery(_))
    }
}
