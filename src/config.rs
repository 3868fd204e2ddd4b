use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::errors::ProxyError;

pub const CONFIG_PATH: &str = "proxy.config.json";
pub const LISTEN_ADDR: [u8; 4] = [127, 0, 0, 1];
pub const LISTEN_PORT: u16 = 3030;

/// Snapshot of the proxy configuration, loaded once at startup and shared
/// read-only across requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    /// Origins that are allowed to use the proxy. A single "*" entry allows
    /// every referrer; an empty list allows none.
    pub allowed_referrers: Vec<String>,
    /// Backend entries in priority order; the first whose prefix matches the
    /// target URL wins.
    pub server_urls: Vec<ServerUrl>,
    /// Fallback token lifetime for token responses without an expiry.
    pub token_cache_minutes: u64,
}

/// One proxied backend: the URL prefix it applies to and the credential
/// material used against it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerUrl {
    pub url_prefix: String,
    /// Use the proxy process's own ambient identity against this backend.
    pub use_process_identity: bool,
    pub domain: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub oauth2_endpoint: Option<String>,
}

pub fn load_config(path: impl AsRef<Path>) -> Result<ProxyConfig, ProxyError> {
    let raw = fs::read_to_string(path.as_ref())
        .map_err(|e| ProxyError::Config(format!("cannot read {}: {}", path.as_ref().display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| ProxyError::Config(format!("cannot parse {}: {}", path.as_ref().display(), e)))
}
