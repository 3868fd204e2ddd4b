use crate::config::{ProxyConfig, ServerUrl};
use crate::models::{AppState, AuthMode, TokenCacheEntry};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;


/// Determines if the referring URL is allowed to use the proxy.
///
/// An unset allow-list rejects everything (assume someone forgot to set this
/// node in the config, take the safe path). A "*" entry allows any site to
/// use the proxy; only use that in development.
pub fn is_allowed_referrer(referrer: Option<&str>, config: &ProxyConfig) -> bool {
    if config.allowed_referrers.is_empty() {
        return false;
    }
    if config.allowed_referrers.iter().any(|r| r == "*") {
        return true;
    }
    let origin = match referrer.and_then(referrer_origin) {
        Some(origin) => origin,
        None => return false,
    };
    config
        .allowed_referrers
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&origin))
}

// scheme://host[:port] of an absolute URL; None when the referrer does not
// parse as one.
fn referrer_origin(referrer: &str) -> Option<String> {
    let uri: http::Uri = referrer.parse().ok()?;
    let scheme = uri.scheme_str()?;
    let authority = uri.authority()?;
    Some(format!("{}://{}", scheme, authority))
}

/// Returns the first configured entry whose URL prefix is contained in the
/// target URL, or None when the request should pass through untouched.
pub fn find_server_url<'a>(target_url: &str, server_urls: &'a [ServerUrl]) -> Option<&'a ServerUrl> {
    server_urls
        .iter()
        .find(|su| target_url.contains(&su.url_prefix))
}

/// Derives the authentication mode for a server entry. First satisfied rule
/// wins: process identity, then domain credentials, then username/password,
/// then OAuth2 client credentials. A server entry carrying both a
/// username/password pair and OAuth2 material resolves to the user
/// credential; this ordering is intentional.
pub fn resolve_auth(su: &ServerUrl) -> AuthMode {
    if su.use_process_identity {
        return AuthMode::ProcessIdentity;
    }
    if let Some(domain) = filled(&su.domain) {
        return AuthMode::DomainCredential {
            domain: domain.to_string(),
            username: filled(&su.username).unwrap_or("").to_string(),
            password: filled(&su.password).unwrap_or("").to_string(),
        };
    }
    if let (Some(username), Some(password)) = (filled(&su.username), filled(&su.password)) {
        return AuthMode::UserCredential {
            username: username.to_string(),
            password: password.to_string(),
        };
    }
    if filled(&su.client_id).is_some() && filled(&su.client_secret).is_some() {
        return AuthMode::OAuth2Client;
    }
    AuthMode::Anonymous
}

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub fn token_cache_key(su: &ServerUrl) -> String {
    format!("token_for_{}", su.url_prefix)
}

/// Form fields for the OAuth2 client-credentials token request.
pub fn oauth2_form_data(su: &ServerUrl, proxy_referrer: &str) -> Vec<(&'static str, String)> {
    vec![
        ("client_id", su.client_id.clone().unwrap_or_default()),
        ("client_secret", su.client_secret.clone().unwrap_or_default()),
        ("grant_type", "client_credentials".to_string()),
        ("redirect_uri", proxy_referrer.to_string()),
        ("f", "json".to_string()),
    ]
}

/// Form fields for exchanging a portal app token for a server token.
pub fn portal_exchange_form_data(
    su: &ServerUrl,
    proxy_referrer: &str,
    portal_code: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("client_id", su.client_id.clone().unwrap_or_default()),
        ("redirect_uri", proxy_referrer.to_string()),
        ("grant_type", "authorization_code".to_string()),
        ("code", portal_code.to_string()),
        ("f", "json".to_string()),
    ]
}

/// Returns the cached token for the key, treating entries at or past their
/// expiry as absent.
pub async fn get_cached_token(state: &Arc<RwLock<AppState>>, cache_key: &str) -> Option<String> {
    let state = state.read().await;
    if let Some(entry) = state.token_cache.get(cache_key) {
        if SystemTime::now() < entry.expires_at {
            return Some(entry.token.clone());
        }
    }
    None
}

/// Stores a freshly fetched token, overwriting any previous entry for the
/// key. Concurrent refreshes may race here; last write wins.
pub async fn cache_token(state: &Arc<RwLock<AppState>>, cache_key: &str, token: String, ttl: Duration) {
    let mut state = state.write().await;
    state.token_cache.insert(
        cache_key.to_string(),
        TokenCacheEntry {
            token,
            expires_at: SystemTime::now() + ttl,
        },
    );
}
