//! # qconfig-core: Pure Types for the QConfig Client
//!
//! This crate holds the data model and the wire codec shared by the durable
//! cache (`qconfig-store`) and the sync engine (`qconfig-sync`).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      QConfig Client Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Host application / qconfig-agent                │   │
//! │  │        client.get("db.properties"), refresh task, ...           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    qconfig-sync (SyncEngine)                    │   │
//! │  │   bootstrap ─► checkupdatev2 ─► forceloadv2 ─► persist/notify   │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────────┐   ┌───────────▼───────────────┐   │
//! │  │ ★ qconfig-core (THIS CRATE) ★   │   │ qconfig-store             │   │
//! │  │ types · protocol · validation   │◄──│ __version__.json + bodies │   │
//! │  │ NO I/O                          │   │                           │   │
//! │  └─────────────────────────────────┘   └───────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - ClientIdentity, ConfigItem, VersionIndex, ChangeDescriptor
//! - [`protocol`] - checkupdatev2 / forceloadv2 / token exchange wire formats
//! - [`validation`] - identity and item name rules
//! - [`error`] - Core error types
//!
//! ## Example Usage
//!
//! ```rust
//! use qconfig_core::protocol::{encode_check_update, parse_check_update};
//! use qconfig_core::ItemVersion;
//!
//! let payload = encode_check_update("demo", &[ItemVersion::new("a.properties", 2, "prod")]);
//! assert_eq!(payload, "demo,a.properties,2,prod\n");
//!
//! let changes = parse_check_update("demo,a.properties,3,prod\nbroken-line");
//! assert_eq!(changes.len(), 1);
//! assert_eq!(changes[0].version, 3);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod protocol;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// File name of the durable version-index document.
///
/// Lives next to the item bodies, so no item may carry this name.
pub const VERSION_FILE_NAME: &str = "__version__.json";

/// Directory created under the configured base dir to hold all caches.
pub const CACHE_DIR_NAME: &str = ".qconfig";
