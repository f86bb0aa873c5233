//! # Bootstrapper
//!
//! Turns a [`ClientIdentity`] into a [`ServerSession`].
//!
//! ## Bootstrap Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ┌──────────────┐        ┌──────────────────┐                          │
//! │  │  SyncEngine  │        │  Control plane   │                          │
//! │  └──────┬───────┘        └────────┬─────────┘                          │
//! │         │  1. POST token_url       │                                    │
//! │         │  {token, name,           │                                    │
//! │         │   server: {pid}}         │                                    │
//! │         │─────────────────────────►│                                    │
//! │         │  {status: 0, data:       │                                    │
//! │         │   {server.token,         │                                    │
//! │         │    server.type}}         │                                    │
//! │         │◄─────────────────────────│                                    │
//! │         │                          │                                    │
//! │         │  2. GET entrypoint_url   │                                    │
//! │         │─────────────────────────►│                                    │
//! │         │  "http://a,http://b"     │                                    │
//! │         │◄─────────────────────────│                                    │
//! │         │                          │                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Either failure is fatal to initialization. Nothing here retries; the
//! session lives for the whole process and the server token is never
//! refreshed.

use std::sync::Arc;

use qconfig_core::protocol::{parse_entrypoint, ServerInfo, TokenRequest, TokenResponse};
use qconfig_core::ClientIdentity;
use tracing::debug;

use crate::error::{QConfigError, QConfigResult};
use crate::transport::{HttpRequest, HttpTransport};

/// Result of a successful bootstrap.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSession {
    /// Attached as the `token` header to every data-plane request.
    pub server_token: String,
    /// Deployment tier; partitions the local cache directory.
    pub server_type: String,
    /// Candidate data-plane addresses, in entrypoint order.
    pub server_addresses: Vec<String>,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("server_token", &redact(&self.server_token))
            .field("server_type", &self.server_type)
            .field("server_addresses", &self.server_addresses)
            .finish()
    }
}

/// Keeps only a short prefix of a secret for logs.
pub(crate) fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}***", prefix)
}

/// Performs the token exchange and server discovery.
pub struct Bootstrapper {
    identity: ClientIdentity,
    transport: Arc<dyn HttpTransport>,
}

impl Bootstrapper {
    pub fn new(identity: ClientIdentity, transport: Arc<dyn HttpTransport>) -> Self {
        Bootstrapper {
            identity,
            transport,
        }
    }

    /// Exchanges the project token for `(server_token, server_type)`.
    pub async fn authenticate(&self) -> QConfigResult<(String, String)> {
        let request = TokenRequest {
            token: self.identity.project_token.clone(),
            name: self.identity.project_name.clone(),
            server: ServerInfo {
                pid: std::process::id(),
            },
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| QConfigError::Auth(format!("Failed to encode token request: {}", e)))?;

        debug!(url = %self.identity.token_endpoint_url, "Exchanging project token");
        let response = self
            .transport
            .send(HttpRequest::post(&self.identity.token_endpoint_url).json(body))
            .await
            .map_err(|e| QConfigError::Auth(format!("Token endpoint unreachable: {}", e)))?;

        if !response.is_success() {
            return Err(QConfigError::Auth(format!(
                "Token endpoint returned status {}",
                response.status
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| QConfigError::Auth(format!("Malformed token response: {}", e)))?;

        if parsed.status != 0 {
            return Err(QConfigError::Auth(
                parsed
                    .message
                    .unwrap_or_else(|| format!("token exchange rejected with status {}", parsed.status)),
            ));
        }

        let data = parsed
            .data
            .ok_or_else(|| QConfigError::Auth("Token response carries no data".into()))?;

        debug!(
            server_token = %redact(&data.server_token),
            server_type = %data.server_type,
            "Token exchange succeeded"
        );
        Ok((data.server_token, data.server_type))
    }

    /// Fetches the data-plane address list.
    pub async fn discover(&self) -> QConfigResult<Vec<String>> {
        debug!(url = %self.identity.entrypoint_url, "Resolving server addresses");
        let response = self
            .transport
            .send(HttpRequest::get(&self.identity.entrypoint_url))
            .await
            .map_err(|e| QConfigError::Discovery(format!("Entrypoint unreachable: {}", e)))?;

        if !response.is_success() {
            return Err(QConfigError::Discovery(format!(
                "Entrypoint returned status {}",
                response.status
            )));
        }

        let addresses = parse_entrypoint(&response.body);
        if addresses.is_empty() {
            return Err(QConfigError::Discovery(
                "Entrypoint returned no server address".into(),
            ));
        }
        Ok(addresses)
    }
}
