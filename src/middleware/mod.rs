use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use hyper::client::connect::Connect;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use hyper::{Body, Client, Method, Request, Response, Uri};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::{ProxyConfig, ServerUrl};
use crate::errors::ProxyError;
use crate::models::{AppState, AuthMode};
use crate::services;

#[cfg(test)]
mod tests;

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Builds the outbound request: inbound method, headers and body are copied,
/// the host header is rewritten to the target authority, and a server token
/// (when present) is merged into the body. A tokenized request always goes
/// out as a POST.
pub fn build_proxy_request(
    method: Method,
    headers: &HeaderMap,
    body: Bytes,
    target: &Uri,
    token: Option<&str>,
) -> Result<Request<Body>, ProxyError> {
    let authority = target
        .authority()
        .ok_or_else(|| ProxyError::InvalidUri(format!("{} has no authority", target)))?
        .clone();

    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains(JSON_CONTENT_TYPE))
        .unwrap_or(false);

    let mut method = method;
    let mut body = body;
    let mut content_type = None;

    if let Some(token) = token {
        method = Method::POST;
        if is_json {
            let mut content: serde_json::Value = if body.is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_slice(&body).map_err(|e| ProxyError::BodyRead(e.to_string()))?
            };
            content["f"] = serde_json::Value::from("json");
            content["token"] = serde_json::Value::from(token);
            body = Bytes::from(content.to_string());
            content_type = Some(JSON_CONTENT_TYPE);
        } else {
            let mut form =
                String::from_utf8(body.to_vec()).map_err(|e| ProxyError::BodyRead(e.to_string()))?;
            if !form.is_empty() {
                form.push('&');
            }
            form.push_str("f=json&token=");
            form.push_str(token);
            body = Bytes::from(form);
            content_type = Some(FORM_CONTENT_TYPE);
        }
    }

    let mut builder = Request::builder().method(method).uri(target.clone());
    for (name, value) in headers.iter() {
        // host is rewritten below; framing headers are recomputed by the
        // transport for the (possibly rewritten) body.
        if matches!(name.as_str(), "host" | "transfer-encoding" | "content-length") {
            continue;
        }
        if content_type.is_some() && name.as_str() == "content-type" {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder = builder.header(HOST, authority.as_str());
    if let Some(ct) = content_type {
        builder = builder.header(CONTENT_TYPE, ct);
    }

    builder
        .body(Body::from(body))
        .map_err(|e| ProxyError::InvalidUri(e.to_string()))
}

/// Basic credential header for modes whose material rides the transport.
/// Process-identity and anonymous requests carry nothing.
pub fn authorization_header(mode: &AuthMode) -> Option<HeaderValue> {
    let credentials = match mode {
        AuthMode::DomainCredential {
            domain,
            username,
            password,
        } => format!("{}\\{}:{}", domain, username, password),
        AuthMode::UserCredential { username, password } => format!("{}:{}", username, password),
        _ => return None,
    };
    HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(credentials))).ok()
}

/// Sends the outbound request, attaching transport-level credentials for the
/// given mode. Network failures surface as upstream errors; nothing is
/// retried.
pub async fn forward_to_server<C>(
    client: &Client<C>,
    mut request: Request<Body>,
    mode: &AuthMode,
) -> Result<Response<Body>, ProxyError>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    if let Some(value) = authorization_header(mode) {
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    client
        .request(request)
        .await
        .map_err(|e| ProxyError::Upstream(e.to_string()))
}

/// Form-encoded POST to a token endpoint, response parsed as JSON.
pub async fn request_token_json<C>(
    client: &Client<C>,
    token_uri: &str,
    form_data: &[(&'static str, String)],
) -> Result<serde_json::Value, ProxyError>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let uri: Uri = token_uri
        .parse()
        .map_err(|e: http::uri::InvalidUri| ProxyError::InvalidUri(e.to_string()))?;
    let form = serde_urlencoded::to_string(form_data)
        .map_err(|e| ProxyError::Config(format!("cannot encode token request form: {}", e)))?;

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .body(Body::from(form))
        .map_err(|e| ProxyError::InvalidUri(e.to_string()))?;

    let response = client
        .request(request)
        .await
        .map_err(|e| ProxyError::Upstream(e.to_string()))?;
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(|e| ProxyError::Upstream(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ProxyError::TokenParse(e.to_string()))
}

/// Returns a live server token for the entry, fetching and caching one when
/// the cache has no live entry. Two requests may race an expired key; both
/// fetch and the last write wins.
pub async fn acquire_server_token<C>(
    client: &Client<C>,
    config: &ProxyConfig,
    state: &Arc<RwLock<AppState>>,
    su: &ServerUrl,
    proxy_referrer: &str,
) -> Result<String, ProxyError>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let cache_key = services::token_cache_key(su);
    if let Some(token) = services::get_cached_token(state, &cache_key).await {
        return Ok(token);
    }

    let endpoint = su
        .oauth2_endpoint
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            ProxyError::Config(format!("no oauth2Endpoint configured for {}", su.url_prefix))
        })?;

    let token_uri = if endpoint.ends_with('/') {
        format!("{}token", endpoint)
    } else {
        format!("{}/token", endpoint)
    };
    let app_login =
        request_token_json(client, &token_uri, &services::oauth2_form_data(su, proxy_referrer))
            .await?;
    let access_token = app_login
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProxyError::TokenParse("access_token missing from token response".to_string()))?;

    let mut token = access_token.to_string();
    let mut expires_in = parse_expires_in(&app_login);

    // Portal endpoints hand out an app token that still has to be exchanged
    // for a server token at <portal root>/generateToken.
    let lowered = endpoint.to_ascii_lowercase();
    if let Some(idx) = lowered.find("/oauth2/") {
        let exchange_uri = format!("{}/generateToken", &lowered[..idx]);
        let exchanged = request_token_json(
            client,
            &exchange_uri,
            &services::portal_exchange_form_data(su, proxy_referrer, access_token),
        )
        .await?;
        token = exchanged
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ProxyError::TokenParse("token missing from generateToken response".to_string())
            })?
            .to_string();
        if let Some(secs) = parse_expires_in(&exchanged) {
            expires_in = Some(secs);
        }
    }

    let ttl = expires_in
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(config.token_cache_minutes * 60));
    services::cache_token(state, &cache_key, token.clone(), ttl).await;
    Ok(token)
}

// expires_in arrives as a number or a numeric string depending on the server.
fn parse_expires_in(value: &serde_json::Value) -> Option<u64> {
    match value.get("expires_in")? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Prepares an upstream response for the client. The status is copied
/// verbatim and transfer-encoding is removed so the client does not expect a
/// chunked response; the body streams through untouched, so when the client
/// disconnects the upstream read stops with it.
pub fn relay_response(upstream: Response<Body>) -> Response<Body> {
    let (mut parts, body) = upstream.into_parts();
    parts.headers.remove(TRANSFER_ENCODING);
    Response::from_parts(parts, body)
}
