//! # Sync Engine
//!
//! Orchestrates bootstrap, update checks, fetches, the durable cache and the
//! subscription hub for one project.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Engine State Machine                             │
//! │                                                                         │
//! │  Uninitialized ──init()──► Authenticating ──► Discovering               │
//! │                                  │                 │                    │
//! │                                  │                 ▼                    │
//! │                                  │            Hydrating                 │
//! │                                  │       (open cache, read index)       │
//! │                                  │                 │                    │
//! │                                  │                 ▼                    │
//! │                                  │            Reconciling               │
//! │                                  │         (ensure_fresh)               │
//! │                                  │                 │                    │
//! │                                  ▼                 ▼                    │
//! │                        Failed(reason) ◄──── any error    Ready          │
//! │                        (absorbing)                                      │
//! │                                                                         │
//! │  Later polling (check_update / update) never leaves Ready.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Three Sources of Truth
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   remote (forceloadv2)  ──update()──►  disk (bodies + __version__.json) │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                               memory (VersionIndexCache + hub values)   │
//! │                                                                         │
//! │  update() is all-or-nothing per batch: one missing or failed name and   │
//! │  nothing from the batch is written. The index read-merge-write runs     │
//! │  under a single lock; fetches run in parallel outside it.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use qconfig_core::validation::validate_item_name;
use qconfig_core::{ChangeDescriptor, ClientIdentity, ConfigItem, ItemVersion, VersionEntry};
use qconfig_store::LocalStore;

use crate::bootstrap::{Bootstrapper, ServerSession};
use crate::checker::UpdateChecker;
use crate::error::{QConfigError, QConfigResult};
use crate::fetcher::Fetcher;
use crate::hub::{SubscriptionHub, SubscriptionId};
use crate::index::VersionIndexCache;
use crate::selector::ServerSelector;
use crate::transport::HttpTransport;

// =============================================================================
// Engine State
// =============================================================================

/// Lifecycle state of a [`SyncEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Authenticating,
    Discovering,
    Hydrating,
    Reconciling,
    Ready,
    /// Absorbing; the engine must be recreated.
    Failed(String),
}

impl EngineState {
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EngineState::Failed(_))
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Uninitialized => write!(f, "uninitialized"),
            EngineState::Authenticating => write!(f, "authenticating"),
            EngineState::Discovering => write!(f, "discovering"),
            EngineState::Hydrating => write!(f, "hydrating"),
            EngineState::Reconciling => write!(f, "reconciling"),
            EngineState::Ready => write!(f, "ready"),
            EngineState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Point-in-time view of the engine for external queries.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    /// Deployment tier reported by the token exchange.
    pub server_type: Option<String>,
    /// Number of candidate data-plane addresses.
    pub address_count: usize,
    /// Number of items in the version index.
    pub indexed_items: usize,
    /// Last update check that completed without error.
    pub last_check: Option<DateTime<Utc>>,
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Everything produced by bootstrap. Set exactly once.
struct Runtime {
    session: Arc<ServerSession>,
    selector: ServerSelector,
    store: LocalStore,
    checker: UpdateChecker,
    fetcher: Fetcher,
}

/// The QConfig synchronization engine.
///
/// One instance per project per process. All methods take `&self` and are
/// safe to call concurrently; share the engine behind an `Arc`.
pub struct SyncEngine {
    identity: ClientIdentity,
    base_dir: PathBuf,
    transport: Arc<dyn HttpTransport>,

    state_tx: watch::Sender<EngineState>,
    init_started: AtomicBool,
    runtime: OnceLock<Runtime>,

    index: VersionIndexCache,
    hub: SubscriptionHub,

    /// Serializes the read-index → merge → write-index section of `update`.
    index_lock: Mutex<()>,

    last_check: parking_lot::Mutex<Option<DateTime<Utc>>>,
}

impl SyncEngine {
    /// Creates an engine. Nothing touches the network or disk until
    /// [`SyncEngine::init`].
    pub fn new(
        identity: ClientIdentity,
        base_dir: impl Into<PathBuf>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let (state_tx, _) = watch::channel(EngineState::Uninitialized);
        SyncEngine {
            identity,
            base_dir: base_dir.into(),
            transport,
            state_tx,
            init_started: AtomicBool::new(false),
            runtime: OnceLock::new(),
            index: VersionIndexCache::default(),
            hub: SubscriptionHub::new(),
            index_lock: Mutex::new(()),
            last_check: parking_lot::Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Bootstraps the engine: authenticate, discover, open the cache,
    /// hydrate the index, reconcile with the server, then mark Ready.
    ///
    /// May be called once. Any failure leaves the engine in
    /// [`EngineState::Failed`].
    pub async fn init(&self) -> QConfigResult<()> {
        if self.init_started.swap(true, Ordering::SeqCst) {
            return Err(QConfigError::InvalidState(format!(
                "init already called (state: {})",
                self.state()
            )));
        }

        info!(project = %self.identity.project_name, "Initializing QConfig engine");
        match self.run_init().await {
            Ok(()) => {
                self.set_state(EngineState::Ready);
                info!(
                    project = %self.identity.project_name,
                    items = self.index.len(),
                    "QConfig engine ready"
                );
                Ok(())
            }
            Err(e) => {
                error!(project = %self.identity.project_name, error = %e, "QConfig engine failed to start");
                self.set_state(EngineState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_init(&self) -> QConfigResult<()> {
        let bootstrapper = Bootstrapper::new(self.identity.clone(), self.transport.clone());

        self.set_state(EngineState::Authenticating);
        let (server_token, server_type) = bootstrapper.authenticate().await?;

        self.set_state(EngineState::Discovering);
        let server_addresses = bootstrapper.discover().await?;
        info!(
            project = %self.identity.project_name,
            %server_type,
            addresses = server_addresses.len(),
            "Bootstrap complete"
        );

        let session = Arc::new(ServerSession {
            server_token,
            server_type,
            server_addresses,
        });
        let selector = ServerSelector::new(session.server_addresses.clone())?;

        self.set_state(EngineState::Hydrating);
        let store = LocalStore::open(
            &self.base_dir,
            &self.identity.project_name,
            &session.server_type,
        )
        .await?;
        let index = store.read_index().await;
        debug!(dir = %store.dir().display(), items = index.len(), "Hydrated version index");
        self.index.replace(index);

        let runtime = Runtime {
            checker: UpdateChecker::new(
                self.identity.project_name.clone(),
                session.clone(),
                selector.clone(),
                self.transport.clone(),
            ),
            fetcher: Fetcher::new(
                self.identity.project_name.clone(),
                session.clone(),
                selector.clone(),
                self.transport.clone(),
            ),
            session,
            selector,
            store,
        };
        if self.runtime.set(runtime).is_err() {
            return Err(QConfigError::InvalidState("engine already bootstrapped".into()));
        }

        self.set_state(EngineState::Reconciling);
        self.ensure_fresh().await?;
        Ok(())
    }

    fn set_state(&self, state: EngineState) {
        debug!(%state, "Engine state change");
        self.state_tx.send_replace(state);
    }

    /// Returns the bootstrap products, or why they are unavailable.
    fn runtime(&self) -> QConfigResult<&Runtime> {
        let state = self.state();
        if let EngineState::Failed(reason) = &state {
            return Err(QConfigError::NotReady(format!("failed: {}", reason)));
        }
        self.runtime
            .get()
            .ok_or_else(|| QConfigError::NotReady(state.to_string()))
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state_tx.borrow().clone()
    }

    /// Returns a receiver that observes every state change.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// Resolves once the engine is Ready, or fails with the bootstrap
    /// failure reason.
    pub async fn wait_ready(&self) -> QConfigResult<()> {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                EngineState::Ready => return Ok(()),
                EngineState::Failed(reason) => return Err(QConfigError::NotReady(reason)),
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(QConfigError::NotReady("engine dropped".into()));
            }
        }
    }

    /// Returns a status snapshot.
    pub fn status(&self) -> EngineStatus {
        let runtime = self.runtime.get();
        EngineStatus {
            state: self.state(),
            server_type: runtime.map(|rt| rt.session.server_type.clone()),
            address_count: runtime.map(|rt| rt.selector.len()).unwrap_or(0),
            indexed_items: self.index.len(),
            last_check: *self.last_check.lock(),
        }
    }

    /// Returns the durable cache directory once bootstrapped.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.runtime.get().map(|rt| rt.store.dir())
    }

    /// Returns the version index entry for `name`.
    pub fn version_of(&self, name: &str) -> Option<VersionEntry> {
        self.index.get(name)
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Checks every known item and updates exactly those that changed.
    ///
    /// Returns the applied items.
    pub async fn ensure_fresh(&self) -> QConfigResult<Vec<ConfigItem>> {
        let changes = self.check_update(Vec::new()).await?;
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = changes.into_iter().map(|c| c.name).collect();
        self.update(&names).await
    }

    /// Asks the server which items changed.
    ///
    /// An empty `want` means every item in the version index. With nothing
    /// known and nothing requested, no request is made.
    pub async fn check_update(&self, want: Vec<ItemVersion>) -> QConfigResult<Vec<ChangeDescriptor>> {
        let runtime = self.runtime()?;
        let want = if want.is_empty() {
            self.index.want_list()
        } else {
            want
        };

        let changes = runtime.checker.check(&want).await?;
        *self.last_check.lock() = Some(Utc::now());

        if !changes.is_empty() {
            info!(
                changed = changes.len(),
                names = %changes.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(","),
                "Config updates available"
            );
        }
        Ok(changes)
    }

    /// Fetches the latest version of `names` and applies them.
    ///
    /// All-or-nothing: if any name is not found or fails, nothing is written
    /// and [`QConfigError::Update`] names every offender.
    pub async fn update(&self, names: &[String]) -> QConfigResult<Vec<ConfigItem>> {
        let runtime = self.runtime()?;

        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            validate_item_name(name)?;
            if !unique.contains(name) {
                unique.push(name.clone());
            }
        }
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let batch = runtime.fetcher.fetch_many(&unique).await;
        if !batch.is_complete() {
            warn!(
                not_found = ?batch.not_found,
                failed = ?batch.failed,
                "Update batch rejected, nothing applied"
            );
            return Err(QConfigError::Update {
                not_found: batch.not_found,
                failed: batch.failed,
            });
        }
        let items = batch.success;

        {
            let _guard = self.index_lock.lock().await;

            for item in &items {
                runtime.store.write_body(&item.name, &item.body).await?;
            }

            let mut index = runtime.store.read_index().await;
            index.fill_missing_from(&self.index.snapshot());
            for item in &items {
                index.insert(item.name.clone(), item.entry());
            }
            runtime.store.write_index(&index).await?;
            // merge rather than swap: publish may have added entries meanwhile
            self.index
                .merge(items.iter().map(|item| (item.name.as_str(), item.entry())));

            for item in &items {
                self.hub.notify(&item.name, &item.body);
            }
        }

        info!(
            count = items.len(),
            names = %items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join(","),
            "Applied config update"
        );
        Ok(items)
    }

    /// Returns the body of `name`.
    ///
    /// Memory first, then the durable cache, then a single-item `update`.
    pub async fn get(&self, name: &str) -> QConfigResult<String> {
        let runtime = self.runtime()?;
        validate_item_name(name)?;

        if self.index.contains(name) {
            if let Some(body) = self.hub.current(name) {
                return Ok(body);
            }
        }

        if let Some(body) = runtime.store.read_body(name).await {
            return Ok(self.hub.seed(name, &body));
        }

        debug!(%name, "Config not cached, fetching from server");
        match self.update(&[name.to_string()]).await {
            Ok(items) => items
                .into_iter()
                .find(|item| item.name == name)
                .map(|item| item.body)
                .ok_or_else(|| QConfigError::Fetch {
                    name: name.to_string(),
                    message: "update returned no body".into(),
                }),
            Err(QConfigError::Update { not_found, failed }) if failed.is_empty() && !not_found.is_empty() => {
                Err(QConfigError::NotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Injects items obtained elsewhere (e.g. relayed by a coordinator)
    /// into the in-memory index and the hub. Nothing is fetched or written
    /// to disk.
    pub fn publish(&self, items: &[ConfigItem]) -> QConfigResult<()> {
        for item in items {
            validate_item_name(&item.name)?;
        }
        for item in items {
            self.index.insert(&item.name, item.entry());
            self.hub.notify(&item.name, &item.body);
        }
        debug!(count = items.len(), "Published config items");
        Ok(())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Registers `listener` for changes of `name`. A listener registered after
    /// a value is known receives that value first.
    pub fn subscribe<F>(&self, name: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.hub.subscribe(name, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.hub.listener_count(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, Method, MockTransport};
    use qconfig_core::protocol::{CHECK_UPDATE_PATH, FORCE_LOAD_PATH};

    const TOKEN_URL: &str = "http://ctl/token";
    const ENTRYPOINT_URL: &str = "http://ctl/entrypoint";

    fn engine(mock: &Arc<MockTransport>, base: &Path) -> SyncEngine {
        let identity = ClientIdentity::new("demo", "pt", TOKEN_URL, ENTRYPOINT_URL).unwrap();
        SyncEngine::new(identity, base, mock.clone())
    }

    fn bootstrap_routes(mock: &MockTransport) {
        mock.respond(
            Method::Post,
            TOKEN_URL,
            HttpResponse::new(200, r#"{"status":0,"data":{"server.token":"st","server.type":"prod"}}"#),
        );
        mock.respond(Method::Get, ENTRYPOINT_URL, HttpResponse::new(200, "http://a"));
    }

    #[tokio::test]
    async fn test_operations_before_init_are_not_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new());
        let engine = engine(&mock, tmp.path());

        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(matches!(engine.get("a.properties").await, Err(QConfigError::NotReady(_))));
        assert!(matches!(engine.check_update(vec![]).await, Err(QConfigError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_fresh_init_with_empty_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new());
        bootstrap_routes(&mock);
        let engine = engine(&mock, tmp.path());

        engine.init().await.unwrap();

        assert!(engine.state().is_ready());
        // Nothing known, so no update check
        assert_eq!(mock.request_count(CHECK_UPDATE_PATH), 0);
        assert_eq!(
            engine.cache_dir().unwrap(),
            tmp.path().join(".qconfig").join("demo").join("prod")
        );

        let status = engine.status();
        assert_eq!(status.server_type.as_deref(), Some("prod"));
        assert_eq!(status.address_count, 1);
        assert_eq!(status.indexed_items, 0);
        engine.wait_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_init_twice_is_invalid_state() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new());
        bootstrap_routes(&mock);
        let engine = engine(&mock, tmp.path());

        engine.init().await.unwrap();
        assert!(matches!(engine.init().await, Err(QConfigError::InvalidState(_))));
        assert!(engine.state().is_ready());
    }

    #[tokio::test]
    async fn test_auth_failure_is_absorbing() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::Post,
            TOKEN_URL,
            HttpResponse::new(200, r#"{"status":403,"message":"unknown project"}"#),
        );
        let engine = engine(&mock, tmp.path());

        let err = engine.init().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(engine.state().is_failed());
        // Discovery never attempted
        assert_eq!(mock.request_count(ENTRYPOINT_URL), 0);
        assert!(matches!(engine.wait_ready().await, Err(QConfigError::NotReady(ref r)) if r.contains("unknown project")));
        assert!(matches!(engine.get("a.properties").await, Err(QConfigError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_state_receiver_sees_ready() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new());
        bootstrap_routes(&mock);
        let engine = Arc::new(engine(&mock, tmp.path()));

        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.wait_ready().await })
        };
        let rx = engine.state_receiver();

        engine.init().await.unwrap();
        waiter.await.unwrap().unwrap();
        assert_eq!(*rx.borrow(), EngineState::Ready);
    }

    #[tokio::test]
    async fn test_publish_updates_memory_only() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new());
        bootstrap_routes(&mock);
        let engine = engine(&mock, tmp.path());
        engine.init().await.unwrap();

        let item = ConfigItem {
            name: "relayed.json".into(),
            version: 7,
            profile: "prod".into(),
            checksum: "c".into(),
            body: "{}".into(),
        };
        engine.publish(&[item]).unwrap();

        assert_eq!(engine.version_of("relayed.json").map(|e| e.version), Some(7));
        assert_eq!(engine.get("relayed.json").await.unwrap(), "{}");
        assert_eq!(mock.request_count(FORCE_LOAD_PATH), 0);
        assert!(!engine.cache_dir().unwrap().join("relayed.json").exists());
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_network() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockTransport::new());
        bootstrap_routes(&mock);
        let engine = engine(&mock, tmp.path());
        engine.init().await.unwrap();

        let err = engine.update(&["../etc/passwd".to_string()]).await.unwrap_err();
        assert!(matches!(err, QConfigError::Core(_)));
        assert_eq!(mock.request_count(FORCE_LOAD_PATH), 0);
    }
}
