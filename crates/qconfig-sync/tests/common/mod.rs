//! Stateful fake of the QConfig control and data plane, served through
//! `MockTransport`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use qconfig_core::protocol::{CHECK_UPDATE_PATH, FORCE_LOAD_PATH};
use qconfig_sync::{ClientIdentity, HttpResponse, Method, MockTransport, SyncEngine};

pub const TOKEN_URL: &str = "http://ctl.test/token";
pub const ENTRYPOINT_URL: &str = "http://ctl.test/entrypoint";
pub const ADDRESSES: [&str; 2] = ["http://data-a.test:8080", "http://data-b.test:8080"];
pub const PROJECT: &str = "demo";
pub const SERVER_TYPE: &str = "prod";

#[derive(Debug, Clone)]
pub struct ServedItem {
    pub version: i64,
    pub profile: String,
    pub body: String,
}

/// Items currently uploaded to the fake server.
#[derive(Clone, Default)]
pub struct FakeServer {
    items: Arc<Mutex<HashMap<String, ServedItem>>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads (or replaces) an item.
    pub fn put(&self, name: &str, version: i64, body: &str) {
        self.items.lock().insert(
            name.to_string(),
            ServedItem {
                version,
                profile: SERVER_TYPE.to_string(),
                body: body.to_string(),
            },
        );
    }

    /// Routes every endpoint of `mock` to this server.
    pub fn install(&self, mock: &MockTransport) {
        mock.respond(
            Method::Post,
            TOKEN_URL,
            HttpResponse::new(
                200,
                format!(
                    r#"{{"status":0,"data":{{"server.token":"server-token","server.type":"{}"}}}}"#,
                    SERVER_TYPE
                ),
            ),
        );
        mock.respond(
            Method::Get,
            ENTRYPOINT_URL,
            HttpResponse::new(200, ADDRESSES.join(",")),
        );

        let items = self.items.clone();
        mock.on(Method::Post, CHECK_UPDATE_PATH, move |req| {
            let items = items.lock();
            let mut changed = String::new();
            for line in req.text_body().unwrap_or_default().lines() {
                let fields: Vec<&str> = line.split(',').collect();
                if fields.len() != 4 {
                    continue;
                }
                let known: i64 = fields[2].parse().unwrap_or(-1);
                if let Some(item) = items.get(fields[1]) {
                    if item.version > known {
                        changed.push_str(&format!(
                            "{},{},{},{}\n",
                            fields[0], fields[1], item.version, item.profile
                        ));
                    }
                }
            }
            Ok(if changed.is_empty() {
                HttpResponse::new(304, "")
            } else {
                HttpResponse::new(200, changed)
            })
        });

        let items = self.items.clone();
        mock.on(Method::Get, FORCE_LOAD_PATH, move |req| {
            let name = req.query_value("dataId").unwrap_or_default();
            Ok(match items.lock().get(name) {
                Some(item) => HttpResponse::new(200, item.body.clone())
                    .with_header("version", item.version.to_string())
                    .with_header("profile", item.profile.clone())
                    .with_header("checksum", format!("sum-{}", item.version)),
                None => HttpResponse::new(404, ""),
            })
        });
    }
}

pub fn identity() -> ClientIdentity {
    ClientIdentity::new(PROJECT, "project-token", TOKEN_URL, ENTRYPOINT_URL).unwrap()
}

/// A fake server plus a mock transport routed to it.
pub fn harness() -> (FakeServer, Arc<MockTransport>) {
    let server = FakeServer::new();
    let mock = Arc::new(MockTransport::new());
    server.install(&mock);
    (server, mock)
}

pub fn engine(mock: &Arc<MockTransport>, base_dir: &Path) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(identity(), base_dir, mock.clone()))
}

pub async fn ready_engine(mock: &Arc<MockTransport>, base_dir: &Path) -> Arc<SyncEngine> {
    let engine = engine(mock, base_dir);
    engine.init().await.unwrap();
    engine
}

pub fn cache_dir(base_dir: &Path) -> std::path::PathBuf {
    base_dir.join(".qconfig").join(PROJECT).join(SERVER_TYPE)
}

/// Reads `__version__.json` straight from disk.
pub fn disk_index(base_dir: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(cache_dir(base_dir).join("__version__.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// Lets listener drain tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Collects `(name, body)` deliveries of a listener.
pub fn recorder() -> (
    Arc<Mutex<Vec<(String, String)>>>,
    impl Fn(&str, &str) + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |name: &str, body: &str| {
        sink.lock().push((name.to_string(), body.to_string()))
    })
}
