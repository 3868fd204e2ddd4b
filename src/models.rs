use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use hyper::client::HttpConnector;
use hyper::Client;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::ProxyConfig;

/// Authentication mode derived from a server entry. Precedence is resolved
/// by `services::resolve_auth`; the variants carry the material the
/// transport needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    ProcessIdentity,
    DomainCredential {
        domain: String,
        username: String,
        password: String,
    },
    UserCredential {
        username: String,
        password: String,
    },
    OAuth2Client,
    Anonymous,
}

pub struct TokenCacheEntry {
    pub token: String,
    pub expires_at: SystemTime,
}

pub struct AppState {
    pub token_cache: HashMap<String, TokenCacheEntry>,
    /// Referrer of the most recent proxied request, surfaced by the ping
    /// endpoint.
    pub last_referrer: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            token_cache: HashMap::new(),
            last_referrer: None,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a request handler needs: the configuration snapshot (absent
/// when the config file could not be loaded), the shared state, and the
/// outbound client.
#[derive(Clone)]
pub struct ProxyContext {
    pub config: Option<Arc<ProxyConfig>>,
    pub state: Arc<RwLock<AppState>>,
    pub client: Client<HttpConnector>,
}

impl ProxyContext {
    pub fn new(config: Option<Arc<ProxyConfig>>) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(AppState::new())),
            client: Client::new(),
        }
    }
}

// Field order on these mirrors the JSON emitted on the wire.
#[derive(Serialize)]
pub struct PingResponse {
    pub message: &'static str,
    #[serde(rename = "hasConfig")]
    pub has_config: bool,
    #[serde(rename = "referringUrl")]
    pub referring_url: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
}
