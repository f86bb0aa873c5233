//! # Local Store
//!
//! File-backed cache of item bodies and the version index.
//!
//! ## Directory Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  {base_dir}/                                                           │
//! │   └── .qconfig/                                                        │
//! │        └── {project}/            one tree per project                  │
//! │             ├── prod/            one tree per server type              │
//! │             │    ├── __version__.json                                  │
//! │             │    ├── a.properties   (raw body)                         │
//! │             │    └── b.json         (raw body)                         │
//! │             └── beta/                                                  │
//! │                  └── ...                                               │
//! │                                                                         │
//! │  Different server types never share files, so a beta deployment        │
//! │  cannot serve a cached prod body or vice versa.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Strategy
//! Every write goes to a sibling temp file which is then renamed over the
//! target. A crash mid-write leaves the previous file intact, so the index is
//! always either fully old or fully new for a batch.

use std::path::{Path, PathBuf};

use qconfig_core::validation::validate_item_name;
use qconfig_core::{VersionIndex, CACHE_DIR_NAME, VERSION_FILE_NAME};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Durable cache rooted at one project/server-type directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Returns the cache directory for a project and server type.
    pub fn cache_dir(base_dir: &Path, project: &str, server_type: &str) -> StoreResult<PathBuf> {
        validate_item_name(project)?;
        validate_item_name(server_type)?;
        Ok(base_dir
            .join(CACHE_DIR_NAME)
            .join(project)
            .join(server_type))
    }

    /// Opens the store, creating the cache directory if it does not exist.
    pub async fn open(base_dir: &Path, project: &str, server_type: &str) -> StoreResult<Self> {
        let dir = Self::cache_dir(base_dir, project, server_type)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;
        debug!(dir = %dir.display(), "Opened local config store");
        Ok(LocalStore { dir })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(VERSION_FILE_NAME)
    }

    fn body_path(&self, name: &str) -> StoreResult<PathBuf> {
        validate_item_name(name)?;
        Ok(self.dir.join(name))
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    /// Reads the cached body of `name`. Any failure is a miss.
    pub async fn read_body(&self, name: &str) -> Option<String> {
        let path = match self.body_path(name) {
            Ok(path) => path,
            Err(e) => {
                debug!(%name, error = %e, "Refusing to read invalid item name");
                return None;
            }
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => {
                debug!(path = %path.display(), "Read config body from disk");
                Some(body)
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Config body not cached");
                None
            }
        }
    }

    /// Writes the body of `name`, replacing any previous version.
    pub async fn write_body(&self, name: &str, body: &str) -> StoreResult<()> {
        let path = self.body_path(name)?;
        write_replace(&path, body.as_bytes()).await?;
        debug!(path = %path.display(), bytes = body.len(), "Wrote config body");
        Ok(())
    }

    // =========================================================================
    // Version Index
    // =========================================================================

    /// Reads `__version__.json`.
    ///
    /// A missing or corrupt document means "no prior knowledge" and yields an
    /// empty index; it is never an error.
    pub async fn read_index(&self) -> VersionIndex {
        let path = self.index_path();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No version index yet");
                return VersionIndex::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read version index, starting empty");
                return VersionIndex::new();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt version index, starting empty");
                VersionIndex::new()
            }
        }
    }

    /// Replaces `__version__.json` with `index` in a single atomic step.
    pub async fn write_index(&self, index: &VersionIndex) -> StoreResult<()> {
        let path = self.index_path();
        let contents = serde_json::to_string_pretty(index)?;
        write_replace(&path, contents.as_bytes()).await?;
        debug!(path = %path.display(), entries = index.len(), "Wrote version index");
        Ok(())
    }
}

/// Writes `contents` to a temp file next to `path`, then renames it over `path`.
async fn write_replace(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qconfig_core::VersionEntry;

    fn entry(version: i64) -> VersionEntry {
        VersionEntry {
            version,
            checksum: format!("md5-{}", version),
            profile: "prod".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_creates_namespaced_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path(), "demo", "prod").await.unwrap();

        assert_eq!(store.dir(), tmp.path().join(".qconfig").join("demo").join("prod"));
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_server_types_do_not_share_files() {
        let tmp = tempfile::tempdir().unwrap();
        let prod = LocalStore::open(tmp.path(), "demo", "prod").await.unwrap();
        let beta = LocalStore::open(tmp.path(), "demo", "beta").await.unwrap();

        prod.write_body("a.properties", "env=prod").await.unwrap();
        assert_eq!(prod.read_body("a.properties").await.as_deref(), Some("env=prod"));
        assert!(beta.read_body("a.properties").await.is_none());
    }

    #[tokio::test]
    async fn test_body_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path(), "demo", "prod").await.unwrap();

        store.write_body("a.properties", "v=1").await.unwrap();
        store.write_body("a.properties", "v=2").await.unwrap();
        assert_eq!(store.read_body("a.properties").await.as_deref(), Some("v=2"));
    }

    #[tokio::test]
    async fn test_invalid_names_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path(), "demo", "prod").await.unwrap();

        assert!(store.write_body("../escape", "x").await.is_err());
        assert!(store.write_body(VERSION_FILE_NAME, "x").await.is_err());
        assert!(store.read_body("../escape").await.is_none());
        assert!(LocalStore::open(tmp.path(), "demo", "..").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_index_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path(), "demo", "prod").await.unwrap();
        assert!(store.read_index().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path(), "demo", "prod").await.unwrap();
        std::fs::write(store.dir().join(VERSION_FILE_NAME), "{ not json").unwrap();

        assert!(store.read_index().await.is_empty());
    }

    #[tokio::test]
    async fn test_index_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path(), "demo", "prod").await.unwrap();

        let mut index = VersionIndex::new();
        index.insert("a.properties", entry(3));
        index.insert("b.json", entry(1));
        store.write_index(&index).await.unwrap();

        let reopened = LocalStore::open(tmp.path(), "demo", "prod").await.unwrap();
        assert_eq!(reopened.read_index().await, index);

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
