//! # Fetcher
//!
//! Downloads the latest version of items with `forceloadv2`.
//!
//! ```text
//! GET {addr}/client/forceloadv2?group={project}&dataId={name}
//!     header token: <server token>
//!
//! 2xx ──► body + headers {version, profile, checksum}
//! 404 ──► NotFound (never uploaded)
//! else ─► Fetch (transient)
//! ```

use std::sync::Arc;

use futures_util::future::join_all;
use qconfig_core::protocol::{
    parse_version, CHECKSUM_HEADER, DATA_ID_PARAM, FORCE_LOAD_PATH, GROUP_PARAM, PROFILE_HEADER,
    TOKEN_HEADER, VERSION_HEADER,
};
use qconfig_core::ConfigItem;
use tracing::{debug, warn};

use crate::bootstrap::ServerSession;
use crate::error::{QConfigError, QConfigResult};
use crate::selector::ServerSelector;
use crate::transport::{HttpRequest, HttpTransport};

/// Outcome of a parallel fetch, split by failure kind.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub success: Vec<ConfigItem>,
    /// Transient failures.
    pub failed: Vec<String>,
    /// Items the server has never seen.
    pub not_found: Vec<String>,
}

impl FetchBatch {
    /// Returns true if every item was fetched.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.not_found.is_empty()
    }
}

/// Issues forceloadv2 requests.
pub struct Fetcher {
    project: String,
    session: Arc<ServerSession>,
    selector: ServerSelector,
    transport: Arc<dyn HttpTransport>,
}

impl Fetcher {
    pub fn new(
        project: impl Into<String>,
        session: Arc<ServerSession>,
        selector: ServerSelector,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Fetcher {
            project: project.into(),
            session,
            selector,
            transport,
        }
    }

    /// Downloads the latest version of `name`.
    pub async fn fetch_latest(&self, name: &str) -> QConfigResult<ConfigItem> {
        let url = format!("{}{}", self.selector.pick(), FORCE_LOAD_PATH);
        let request = HttpRequest::get(&url)
            .header(TOKEN_HEADER, &self.session.server_token)
            .query(GROUP_PARAM, &self.project)
            .query(DATA_ID_PARAM, name);

        let fetch_error = |message: String| QConfigError::Fetch {
            name: name.to_string(),
            message,
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if response.status == 404 {
            return Err(QConfigError::NotFound {
                name: name.to_string(),
            });
        }
        if !response.is_success() {
            return Err(fetch_error(format!("{} returned status {}", url, response.status)));
        }

        let version = response
            .header(VERSION_HEADER)
            .ok_or_else(|| fetch_error("response carries no version header".into()))
            .and_then(|raw| parse_version(raw).map_err(|e| fetch_error(e.to_string())))?;

        let item = ConfigItem {
            name: name.to_string(),
            version,
            profile: response.header(PROFILE_HEADER).unwrap_or_default().to_string(),
            checksum: response.header(CHECKSUM_HEADER).unwrap_or_default().to_string(),
            body: response.body,
        };
        debug!(%name, version, profile = %item.profile, "Fetched config");
        Ok(item)
    }

    /// Fetches every name in parallel and buckets the outcomes.
    pub async fn fetch_many(&self, names: &[String]) -> FetchBatch {
        let results = join_all(names.iter().map(|name| self.fetch_latest(name))).await;

        let mut batch = FetchBatch::default();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(item) => batch.success.push(item),
                Err(QConfigError::NotFound { .. }) => {
                    warn!(%name, "Config does not exist on the server");
                    batch.not_found.push(name.clone());
                }
                Err(e) => {
                    warn!(%name, error = %e, "Failed to fetch config");
                    batch.failed.push(name.clone());
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, Method, MockTransport};

    fn fetcher(mock: &Arc<MockTransport>) -> Fetcher {
        let session = Arc::new(ServerSession {
            server_token: "st".into(),
            server_type: "prod".into(),
            server_addresses: vec!["http://a".into()],
        });
        let selector = ServerSelector::new(session.server_addresses.clone()).unwrap();
        Fetcher::new("demo", session, selector, mock.clone())
    }

    fn serve(mock: &MockTransport) {
        mock.on(Method::Get, FORCE_LOAD_PATH, |req| {
            Ok(match req.query_value("dataId") {
                Some("a.properties") => HttpResponse::new(200, "k=v")
                    .with_header("version", "3")
                    .with_header("profile", "prod")
                    .with_header("checksum", "abc"),
                Some("flaky.json") => HttpResponse::new(502, "bad gateway"),
                _ => HttpResponse::new(404, ""),
            })
        });
    }

    #[tokio::test]
    async fn test_fetch_latest() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);

        let item = fetcher(&mock).fetch_latest("a.properties").await.unwrap();
        assert_eq!(item.version, 3);
        assert_eq!(item.profile, "prod");
        assert_eq!(item.checksum, "abc");
        assert_eq!(item.body, "k=v");

        let sent = &mock.requests()[0];
        assert_eq!(sent.header_value("token"), Some("st"));
        assert_eq!(sent.query_value("group"), Some("demo"));
        assert_eq!(sent.query_value("dataId"), Some("a.properties"));
    }

    #[tokio::test]
    async fn test_404_is_not_found() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);

        let err = fetcher(&mock).fetch_latest("missing.properties").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_version_header_is_fetch_error() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::Get, FORCE_LOAD_PATH, HttpResponse::new(200, "k=v"));

        let err = fetcher(&mock).fetch_latest("a.properties").await.unwrap_err();
        assert!(matches!(err, QConfigError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_fetch_many_buckets() {
        let mock = Arc::new(MockTransport::new());
        serve(&mock);

        let names = vec![
            "a.properties".to_string(),
            "flaky.json".to_string(),
            "missing.properties".to_string(),
        ];
        let batch = fetcher(&mock).fetch_many(&names).await;

        assert_eq!(batch.success.len(), 1);
        assert_eq!(batch.failed, vec!["flaky.json"]);
        assert_eq!(batch.not_found, vec!["missing.properties"]);
        assert!(!batch.is_complete());
    }
}
