use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable holding the backend base URL.
pub const REMOTE_URL_ENV: &str = "MERCADO_REMOTE_URL";
/// Environment variable holding the backend API key.
pub const REMOTE_KEY_ENV: &str = "MERCADO_REMOTE_KEY";

/// Default bound on any single remote call made while syncing.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters for the remote backend. With either one missing the
/// client runs fully offline on bundled data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

impl RemoteConfig {
    pub fn new(url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            url: non_empty(url).map(|u| u.trim_end_matches('/').to_string()),
            api_key: non_empty(api_key),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var(REMOTE_URL_ENV).ok(),
            std::env::var(REMOTE_KEY_ENV).ok(),
        )
    }

    pub fn offline() -> Self {
        Self::default()
    }

    /// `(url, api_key)` when both are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.url, &self.api_key) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Hardening switches for the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Reject order status changes outside the pending → delivered chain
    /// (cancellation aside).
    pub enforce_transitions: bool,
    /// Take stock when an order is placed and give it back on cancellation.
    pub reserve_stock: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            enforce_transitions: true,
            reserve_stock: false,
        }
    }
}

/// Everything needed to wire up a client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub remote: RemoteConfig,
    pub remote_timeout: Duration,
    pub store: StoreOptions,
    /// Directory of the durable local store. `None` keeps it in memory.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::offline(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            store: StoreOptions::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// Platform data directory for the local store, e.g. `~/.local/share/mercadocuba`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("mercadocuba"))
}
