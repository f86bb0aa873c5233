//! # qconfig-sync: Sync Engine for the QConfig Client
//!
//! This crate keeps a process's configuration files in step with the QConfig
//! service. It bootstraps a server session, polls for version changes,
//! fetches changed items, persists them as a cold-start cache, and notifies
//! in-process subscribers.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncEngine (Orchestrator)                     │  │
//! │  │                                                                  │  │
//! │  │  init → get / check_update / update / publish / subscribe       │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │      ┌──────────────┬─────────┼──────────┬──────────────┐              │
//! │      ▼              ▼         ▼          ▼              ▼              │
//! │  ┌─────────┐  ┌──────────┐ ┌───────┐ ┌─────────┐ ┌─────────────┐      │
//! │  │Bootstrap│  │ Selector │ │Checker│ │ Fetcher │ │ Subscription│      │
//! │  │         │  │          │ │       │ │         │ │ Hub         │      │
//! │  │token +  │  │ random   │ │check- │ │force-   │ │ per-listener│      │
//! │  │entrypt  │  │ address  │ │upd.v2 │ │loadv2   │ │ queues      │      │
//! │  └────┬────┘  └──────────┘ └───┬───┘ └────┬────┘ └─────────────┘      │
//! │       │                        │          │                            │
//! │       └────────────────────────┼──────────┘                            │
//! │                                ▼                                        │
//! │                      dyn HttpTransport                                  │
//! │                                                                         │
//! │  Durable cache: qconfig-store (bodies + __version__.json)              │
//! │  Periodic polling: RefreshTask (outside the engine)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `SyncEngine` orchestrator and lifecycle
//! - [`bootstrap`] - Token exchange and server discovery
//! - [`selector`] - Random data-plane address choice
//! - [`checker`] - checkupdatev2 client
//! - [`fetcher`] - forceloadv2 client
//! - [`index`] - In-memory version index
//! - [`hub`] - Subscription registry
//! - [`coordinator`] - `Coordinator` trait and per-process `Client`
//! - [`refresh`] - Periodic polling task
//! - [`transport`] - HTTP seam, reqwest and mock implementations
//! - [`config`] - Client settings
//! - [`error`] - Error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use qconfig_sync::{QConfigSettings, RefreshTask, ReqwestTransport, SyncEngine};
//!
//! let settings = QConfigSettings::load(None)?;
//! let transport = Arc::new(ReqwestTransport::new(settings.request_timeout())?);
//! let engine = Arc::new(SyncEngine::new(settings.identity()?, settings.base_dir()?, transport));
//! engine.init().await?;
//!
//! let body = engine.get("app.properties").await?;
//! engine.subscribe("app.properties", |name, body| println!("{name} changed: {body}"));
//!
//! let refresh = RefreshTask::spawn(engine.clone(), settings.interval()?);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bootstrap;
pub mod checker;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod hub;
pub mod index;
pub mod refresh;
pub mod selector;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use bootstrap::{Bootstrapper, ServerSession};
pub use config::{parse_interval, QConfigSettings};
pub use coordinator::{Client, Coordinator, Listener};
pub use engine::{EngineState, EngineStatus, SyncEngine};
pub use error::{QConfigError, QConfigResult};
pub use fetcher::FetchBatch;
pub use hub::SubscriptionId;
pub use refresh::{refresh_once, RefreshHandle, RefreshTask};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, MockTransport, ReqwestTransport,
    TransportError,
};

pub use qconfig_core::{ChangeDescriptor, ClientIdentity, ConfigItem, ItemVersion, VersionEntry};
