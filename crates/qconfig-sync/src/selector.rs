//! # Server Selector
//!
//! Uniform random choice over the discovered data-plane addresses.
//! Stateless: no sticky sessions and no health tracking. A failing address
//! is simply skipped by the next random pick.

use rand::seq::SliceRandom;

use crate::error::{QConfigError, QConfigResult};

/// Picks a data-plane address per request.
#[derive(Debug, Clone)]
pub struct ServerSelector {
    addresses: Vec<String>,
}

impl ServerSelector {
    /// Creates a selector. An empty list is a discovery failure.
    pub fn new(addresses: Vec<String>) -> QConfigResult<Self> {
        if addresses.is_empty() {
            return Err(QConfigError::Discovery("No server address to select from".into()));
        }
        Ok(ServerSelector { addresses })
    }

    /// Returns one address chosen uniformly at random.
    pub fn pick(&self) -> &str {
        self.addresses
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            // non-empty by construction
            .unwrap_or_default()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
