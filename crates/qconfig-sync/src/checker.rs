//! # Update Checker
//!
//! Asks the data plane which known items have a newer version.
//!
//! ## checkupdatev2 Exchange
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  POST {addr}/client/checkupdatev2      header  token: <server token>    │
//! │                                                                         │
//! │    demo,a.properties,3,prod\n                                          │
//! │    demo,b.json,1,prod\n                                                │
//! │                                                                         │
//! │  304  ──► no update                                                     │
//! │  200  ──► demo,a.properties,4,prod      one line per changed item       │
//! │           (malformed lines dropped, empty result == no update)          │
//! │  else ──► CheckUpdate error with status and URL                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use qconfig_core::protocol::{encode_check_update, parse_check_update, CHECK_UPDATE_PATH, TOKEN_HEADER};
use qconfig_core::{ChangeDescriptor, ItemVersion};
use tracing::debug;

use crate::bootstrap::ServerSession;
use crate::error::{QConfigError, QConfigResult};
use crate::selector::ServerSelector;
use crate::transport::{HttpRequest, HttpTransport};

/// Issues checkupdatev2 requests.
pub struct UpdateChecker {
    project: String,
    session: Arc<ServerSession>,
    selector: ServerSelector,
    transport: Arc<dyn HttpTransport>,
}

impl UpdateChecker {
    pub fn new(
        project: impl Into<String>,
        session: Arc<ServerSession>,
        selector: ServerSelector,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        UpdateChecker {
            project: project.into(),
            session,
            selector,
            transport,
        }
    }

    /// Returns the change descriptors for `want`.
    ///
    /// An empty `want` returns no update without touching the network.
    pub async fn check(&self, want: &[ItemVersion]) -> QConfigResult<Vec<ChangeDescriptor>> {
        if want.is_empty() {
            debug!("Nothing to check, skipping checkupdatev2");
            return Ok(Vec::new());
        }

        let url = format!("{}{}", self.selector.pick(), CHECK_UPDATE_PATH);
        let request = HttpRequest::post(&url)
            .header(TOKEN_HEADER, &self.session.server_token)
            .text(encode_check_update(&self.project, want));

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| QConfigError::CheckUpdate {
                url: url.clone(),
                status: None,
                message: if e.timed_out {
                    format!("timed out: {}", e.message)
                } else {
                    e.message
                },
            })?;

        match response.status {
            304 => {
                debug!(%url, items = want.len(), "No update");
                Ok(Vec::new())
            }
            200 => {
                let changes = parse_check_update(&response.body);
                debug!(%url, items = want.len(), changed = changes.len(), "Update check complete");
                Ok(changes)
            }
            status => Err(QConfigError::CheckUpdate {
                url,
                status: Some(status),
                message: response.body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, Method, MockTransport};

    fn checker(mock: &Arc<MockTransport>) -> UpdateChecker {
        let session = Arc::new(ServerSession {
            server_token: "st".into(),
            server_type: "prod".into(),
            server_addresses: vec!["http://a".into()],
        });
        let selector = ServerSelector::new(session.server_addresses.clone()).unwrap();
        UpdateChecker::new("demo", session, selector, mock.clone())
    }

    fn want() -> Vec<ItemVersion> {
        vec![
            ItemVersion::new("a.properties", 3, "prod"),
            ItemVersion::new("b.json", 1, "prod"),
        ]
    }

    #[tokio::test]
    async fn test_empty_want_makes_no_request() {
        let mock = Arc::new(MockTransport::new());
        let changes = checker(&mock).check(&[]).await.unwrap();
        assert!(changes.is_empty());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_request_encoding() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::Post, CHECK_UPDATE_PATH, HttpResponse::new(304, ""));

        checker(&mock).check(&want()).await.unwrap();

        let sent = &mock.requests()[0];
        assert_eq!(sent.url, "http://a/client/checkupdatev2");
        assert_eq!(sent.header_value("token"), Some("st"));
        assert_eq!(
            sent.text_body(),
            Some("demo,a.properties,3,prod\ndemo,b.json,1,prod\n")
        );
    }

    #[tokio::test]
    async fn test_200_drops_malformed_lines() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::Post,
            CHECK_UPDATE_PATH,
            HttpResponse::new(200, "demo,a.properties,4,prod\ngarbage\ndemo,b.json,x,prod\n"),
        );

        let changes = checker(&mock).check(&want()).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "a.properties");
        assert_eq!(changes[0].version, 4);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_error() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::Post, CHECK_UPDATE_PATH, HttpResponse::new(500, "boom"));

        let err = checker(&mock).check(&want()).await.unwrap_err();
        match err {
            QConfigError::CheckUpdate { url, status, .. } => {
                assert_eq!(status, Some(500));
                assert_eq!(url, "http://a/client/checkupdatev2");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_check_error() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(Method::Post, CHECK_UPDATE_PATH, "connection refused");

        let err = checker(&mock).check(&want()).await.unwrap_err();
        assert!(matches!(err, QConfigError::CheckUpdate { status: None, .. }));
        assert!(err.is_retryable());
    }
}
