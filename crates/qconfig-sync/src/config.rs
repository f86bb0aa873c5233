//! # Client Configuration
//!
//! Configuration surface of the QConfig client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     QCONFIG_NAME=order-service                                         │
//! │     QCONFIG_TOKEN=...                                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/qconfig/qconfig.toml (Linux)                             │
//! │     ~/Library/Application Support/com.qconfig.client/qconfig.toml      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     interval = "1m", request_timeout_secs = 10                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # qconfig.toml
//! name = "order-service"
//! token = "project-token"
//! get_token_url = "http://qconfig.internal/token"
//! get_entrypoint_url = "http://qconfig.internal/entrypoint"
//! base_dir = "/var/lib/order-service"
//! interval = "5m"
//! request_timeout_secs = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use qconfig_core::ClientIdentity;

use crate::error::{QConfigError, QConfigResult};

// =============================================================================
// Settings
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QConfigSettings {
    /// Project (group) name.
    #[serde(default)]
    pub name: String,

    /// Project token, exchanged for a server token at bootstrap.
    #[serde(default)]
    pub token: String,

    /// Token exchange endpoint.
    #[serde(default)]
    pub get_token_url: String,

    /// Entrypoint endpoint returning the server list.
    #[serde(default)]
    pub get_entrypoint_url: String,

    /// Root of the durable cache. The cache lives under `{base_dir}/.qconfig`.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Polling period of the refresh task ("30s", "1m", "1h" or bare seconds).
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Per-request HTTP timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for QConfigSettings {
    fn default() -> Self {
        QConfigSettings {
            name: String::new(),
            token: String::new(),
            get_token_url: String::new(),
            get_entrypoint_url: String::new(),
            base_dir: None,
            interval: default_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl QConfigSettings {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (qconfig.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> QConfigResult<Self> {
        let mut settings = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading qconfig settings from file");
                settings = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;

        Ok(settings)
    }

    /// Loads settings or returns defaults if loading fails.
    ///
    /// The result is not guaranteed to be valid; the engine's own identity
    /// check still applies.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load qconfig settings: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML settings file.
    pub fn from_file(path: &Path) -> QConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the settings.
    pub fn validate(&self) -> QConfigResult<()> {
        let required = [
            ("name", &self.name),
            ("token", &self.token),
            ("get_token_url", &self.get_token_url),
            ("get_entrypoint_url", &self.get_entrypoint_url),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(QConfigError::InvalidConfig(format!("{} is required", field)));
            }
        }

        validate_http_url("get_token_url", &self.get_token_url)?;
        validate_http_url("get_entrypoint_url", &self.get_entrypoint_url)?;

        match &self.base_dir {
            Some(dir) if !dir.as_os_str().is_empty() => {}
            _ => return Err(QConfigError::InvalidConfig("base_dir is required".into())),
        }

        self.interval()?;

        if self.request_timeout_secs == 0 {
            return Err(QConfigError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies overrides from a variable lookup (the process environment in
    /// [`QConfigSettings::load`]).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("QCONFIG_NAME") {
            debug!(%name, "Overriding project name from environment");
            self.name = name;
        }

        if let Some(token) = lookup("QCONFIG_TOKEN") {
            self.token = token;
        }

        if let Some(url) = lookup("QCONFIG_TOKEN_URL") {
            debug!(%url, "Overriding token URL from environment");
            self.get_token_url = url;
        }

        if let Some(url) = lookup("QCONFIG_ENTRYPOINT_URL") {
            debug!(%url, "Overriding entrypoint URL from environment");
            self.get_entrypoint_url = url;
        }

        if let Some(dir) = lookup("QCONFIG_BASE_DIR") {
            self.base_dir = Some(PathBuf::from(dir));
        }

        if let Some(interval) = lookup("QCONFIG_INTERVAL") {
            self.interval = interval;
        }

        if let Some(timeout) = lookup("QCONFIG_REQUEST_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "Ignoring invalid QCONFIG_REQUEST_TIMEOUT_SECS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "qconfig", "client")
            .map(|dirs| dirs.config_dir().join("qconfig.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Builds the immutable client identity.
    pub fn identity(&self) -> QConfigResult<ClientIdentity> {
        Ok(ClientIdentity::new(
            self.name.clone(),
            self.token.clone(),
            self.get_token_url.clone(),
            self.get_entrypoint_url.clone(),
        )?)
    }

    /// Returns the cache root.
    pub fn base_dir(&self) -> QConfigResult<&Path> {
        self.base_dir
            .as_deref()
            .ok_or_else(|| QConfigError::InvalidConfig("base_dir is required".into()))
    }

    /// Returns the parsed polling interval.
    pub fn interval(&self) -> QConfigResult<Duration> {
        parse_interval(&self.interval)
    }

    /// Returns the HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn validate_http_url(field: &str, raw: &str) -> QConfigResult<()> {
    let url = url::Url::parse(raw)
        .map_err(|e| QConfigError::InvalidConfig(format!("{} is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(QConfigError::InvalidConfig(format!(
            "{} must use http or https, got: {}",
            field, other
        ))),
    }
}

/// Parses a polling interval such as `"30s"`, `"5m"`, `"1h"` or `"90"`.
///
/// Zero is rejected.
pub fn parse_interval(raw: &str) -> QConfigResult<Duration> {
    let raw = raw.trim();
    let invalid = || QConfigError::InvalidConfig(format!("Invalid interval: '{}'", raw));

    let (digits, multiplier) = match raw.char_indices().last() {
        Some((idx, 's')) => (&raw[..idx], 1),
        Some((idx, 'm')) => (&raw[..idx], 60),
        Some((idx, 'h')) => (&raw[..idx], 3600),
        Some(_) => (raw, 1),
        None => return Err(invalid()),
    };

    let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
    let secs = value.checked_mul(multiplier).ok_or_else(invalid)?;
    if secs == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> QConfigSettings {
        QConfigSettings {
            name: "demo".into(),
            token: "project-token".into(),
            get_token_url: "http://ctl/token".into(),
            get_entrypoint_url: "http://ctl/entrypoint".into(),
            base_dir: Some(PathBuf::from("/tmp/demo")),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_interval("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_interval("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("90").unwrap(), Duration::from_secs(90));

        assert!(parse_interval("").is_err());
        assert!(parse_interval("0s").is_err());
        assert!(parse_interval("fast").is_err());
        assert!(parse_interval("m").is_err());
    }

    #[test]
    fn test_default_settings() {
        let settings = QConfigSettings::default();
        assert_eq!(settings.interval().unwrap(), Duration::from_secs(60));
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation() {
        assert!(valid().validate().is_ok());

        let mut settings = valid();
        settings.token = "  ".into();
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.get_token_url = "ftp://ctl/token".into();
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.get_entrypoint_url = "not a url".into();
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.base_dir = None;
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.interval = "0m".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let vars: HashMap<&str, &str> = [
            ("QCONFIG_NAME", "billing"),
            ("QCONFIG_INTERVAL", "30s"),
            ("QCONFIG_REQUEST_TIMEOUT_SECS", "bogus"),
        ]
        .into_iter()
        .collect();

        let mut settings = valid();
        settings.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.name, "billing");
        assert_eq!(settings.interval().unwrap(), Duration::from_secs(30));
        // invalid number is ignored
        assert_eq!(settings.request_timeout_secs, 10);
        assert_eq!(settings.token, "project-token");
    }

    #[test]
    fn test_from_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("qconfig.toml");
        std::fs::write(
            &path,
            r#"
name = "demo"
token = "t"
get_token_url = "https://ctl/token"
get_entrypoint_url = "https://ctl/entrypoint"
base_dir = "/srv/demo"
interval = "5m"
"#,
        )
        .unwrap();

        let settings = QConfigSettings::from_file(&path).unwrap();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.interval().unwrap(), Duration::from_secs(300));
        assert_eq!(settings.request_timeout_secs, 10);
        assert_eq!(settings.base_dir().unwrap(), Path::new("/srv/demo"));

        let identity = settings.identity().unwrap();
        assert_eq!(identity.project_name, "demo");
        assert_eq!(identity.entrypoint_url, "https://ctl/entrypoint");
    }

    #[test]
    fn test_malformed_file_is_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("qconfig.toml");
        std::fs::write(&path, "name = [").unwrap();

        let err = QConfigSettings::from_file(&path).unwrap_err();
        assert!(matches!(err, QConfigError::ConfigLoadFailed(_)));
    }
}
