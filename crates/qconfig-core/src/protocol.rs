//! # Wire Protocol
//!
//! Request and response formats of the configuration service.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       QConfig Service Endpoints                         │
//! │                                                                         │
//! │  CONTROL PLANE                                                         │
//! │  ─────────────                                                         │
//! │  POST {get_token_url}       JSON {token, name, server:{pid}}           │
//! │     ◄── {status, message?, data:{"server.token", "server.type"}}       │
//! │  GET  {get_entrypoint_url}  ◄── "http://a:8080,http://b:8080"          │
//! │                                                                         │
//! │  DATA PLANE (header `token: <server token>`)                           │
//! │  ──────────                                                            │
//! │  POST {addr}/client/checkupdatev2                                      │
//! │     body: "project,name,version,profile\n" per item                    │
//! │     ◄── 304 (nothing changed)                                          │
//! │     ◄── 200 "group,name,version,profile\n" per changed item            │
//! │  GET  {addr}/client/forceloadv2?group=project&dataId=name              │
//! │     ◄── 200 body, headers version/profile/checksum                     │
//! │     ◄── 404 item never uploaded                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{ChangeDescriptor, ItemVersion};

// =============================================================================
// Constants
// =============================================================================

/// Path of the version-diff endpoint, relative to a data-plane address.
pub const CHECK_UPDATE_PATH: &str = "/client/checkupdatev2";

/// Path of the single-item download endpoint.
pub const FORCE_LOAD_PATH: &str = "/client/forceloadv2";

/// Header carrying the server token on every data-plane request.
pub const TOKEN_HEADER: &str = "token";

/// Response headers of forceloadv2.
pub const VERSION_HEADER: &str = "version";
pub const PROFILE_HEADER: &str = "profile";
pub const CHECKSUM_HEADER: &str = "checksum";

/// Query parameters of forceloadv2.
pub const GROUP_PARAM: &str = "group";
pub const DATA_ID_PARAM: &str = "dataId";

// =============================================================================
// Token Exchange
// =============================================================================

/// Body of the token exchange request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token: String,
    pub name: String,
    pub server: ServerInfo,
}

/// Describes the requesting process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub pid: u32,
}

/// Response of the token exchange. `status != 0` means failure.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<TokenData>,
}

/// Payload of a successful token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenData {
    #[serde(rename = "server.token")]
    pub server_token: String,
    #[serde(rename = "server.type")]
    pub server_type: String,
}

// =============================================================================
// Entrypoint
// =============================================================================

/// Splits an entrypoint body into data-plane addresses.
///
/// Blank segments are dropped and trailing slashes removed so paths can be
/// appended directly. An empty result means the discovery failed.
pub fn parse_entrypoint(body: &str) -> Vec<String> {
    body.split(',')
        .map(|addr| addr.trim().trim_end_matches('/'))
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// checkupdatev2
// =============================================================================

/// Encodes the checkupdatev2 request body.
///
/// One line per item: `project,name,version,profile`, each newline-terminated.
pub fn encode_check_update(project: &str, items: &[ItemVersion]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "{},{},{},{}\n",
                project, item.name, item.version, item.profile
            )
        })
        .collect()
}

/// Parses a 200 response of checkupdatev2.
///
/// Every line with exactly four comma-separated fields and an integer version
/// becomes a [`ChangeDescriptor`]; anything else is dropped.
pub fn parse_check_update(body: &str) -> Vec<ChangeDescriptor> {
    body.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.trim().split(',').collect();
            if fields.len() != 4 {
                return None;
            }
            let version = parse_version(fields[2]).ok()?;
            Some(ChangeDescriptor {
                group: fields[0].to_string(),
                name: fields[1].to_string(),
                version,
                profile: fields[3].to_string(),
            })
        })
        .collect()
}

/// Parses a version number as sent in headers and response lines.
pub fn parse_version(raw: &str) -> CoreResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| CoreError::InvalidVersion(raw.to_string()))
}
