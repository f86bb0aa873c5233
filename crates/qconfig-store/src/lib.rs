//! # qconfig-store: Durable Cache for the QConfig Client
//!
//! This crate persists configuration bodies and the version index so a
//! restarted process can serve configuration before it reaches the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        QConfig Cache Data Flow                          │
//! │                                                                         │
//! │  SyncEngine (update / get / init)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   qconfig-store (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   read_body / write_body        read_index / write_index        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  {base_dir}/.qconfig/{project}/{server_type}/                   │   │
//! │  │      __version__.json                                           │   │
//! │  │      a.properties                                               │   │
//! │  │      b.json                                                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qconfig_store::LocalStore;
//!
//! let store = LocalStore::open(base_dir, "demo", "prod").await?;
//! store.write_body("a.properties", "k=v").await?;
//! let index = store.read_index().await; // {} when missing or corrupt
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use store::LocalStore;
