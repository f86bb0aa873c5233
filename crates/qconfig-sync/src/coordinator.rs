//! # Coordinator and Client
//!
//! The seam between readers and whoever owns the sync state.
//!
//! ## Topology
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Client (cache)   Client (cache)   Client (cache)                     │
//! │        │                 │                │                             │
//! │        └─────────────────┼────────────────┘                             │
//! │                          ▼                                              │
//! │                 dyn Coordinator                                         │
//! │          subscribe / publish / get_remote_or_local                      │
//! │                          │                                              │
//! │            ┌─────────────┴──────────────┐                               │
//! │            ▼                            ▼                               │
//! │     SyncEngine                   multi-process relay                    │
//! │     (standalone)                 (outside this crate)                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use qconfig_core::ConfigItem;

use crate::engine::SyncEngine;
use crate::error::QConfigResult;
use crate::hub::SubscriptionId;

/// Change callback: `(name, body)`.
pub type Listener = Box<dyn Fn(&str, &str) + Send + Sync>;

/// What a reader needs from the owner of the sync state.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Registers a change listener for `name`.
    fn subscribe(&self, name: &str, listener: Listener) -> SubscriptionId;

    /// Makes already-obtained items visible to every subscriber.
    fn publish(&self, items: &[ConfigItem]) -> QConfigResult<()>;

    /// Returns the body of `name` from wherever it is cheapest.
    async fn get_remote_or_local(&self, name: &str) -> QConfigResult<String>;
}

#[async_trait]
impl Coordinator for SyncEngine {
    fn subscribe(&self, name: &str, listener: Listener) -> SubscriptionId {
        SyncEngine::subscribe(self, name, listener)
    }

    fn publish(&self, items: &[ConfigItem]) -> QConfigResult<()> {
        SyncEngine::publish(self, items)
    }

    async fn get_remote_or_local(&self, name: &str) -> QConfigResult<String> {
        self.get(name).await
    }
}

// =============================================================================
// Client
// =============================================================================

/// Per-process reader with its own body cache.
///
/// The first miss for a name subscribes to it, so later publications keep
/// the cache current without another lookup.
pub struct Client<C: Coordinator> {
    coordinator: Arc<C>,
    cache: Arc<RwLock<HashMap<String, String>>>,
    subscribed: Mutex<HashSet<String>>,
}

impl<C: Coordinator> Client<C> {
    pub fn new(coordinator: Arc<C>) -> Self {
        Client {
            coordinator,
            cache: Arc::new(RwLock::new(HashMap::new())),
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the body of `name`.
    pub async fn get(&self, name: &str) -> QConfigResult<String> {
        if let Some(body) = self.cached(name) {
            debug!(%name, "Client cache hit");
            return Ok(body);
        }

        self.ensure_subscribed(name);

        let body = self.coordinator.get_remote_or_local(name).await?;
        self.cache.write().insert(name.to_string(), body.clone());
        Ok(body)
    }

    fn ensure_subscribed(&self, name: &str) {
        if !self.subscribed.lock().insert(name.to_string()) {
            return;
        }
        let cache = self.cache.clone();
        self.coordinator.subscribe(
            name,
            Box::new(move |name: &str, body: &str| {
                cache.write().insert(name.to_string(), body.to_string());
            }),
        );
    }

    /// Forwards items to the coordinator.
    pub fn publish(&self, items: &[ConfigItem]) -> QConfigResult<()> {
        self.coordinator.publish(items)
    }

    /// Registers a listener with the coordinator.
    pub fn subscribe<F>(&self, name: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.coordinator.subscribe(name, Box::new(listener))
    }

    /// Returns the cached body without any lookup.
    pub fn cached(&self, name: &str) -> Option<String> {
        self.cache.read().get(name).cloned()
    }

    pub fn coordinator(&self) -> &Arc<C> {
        &self.coordinator
    }
}
