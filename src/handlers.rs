use bytes::Bytes;
use hyper::{Body, HeaderMap, Method, Response, StatusCode, Uri};
use std::convert::Infallible;
use std::time::SystemTime;
use warp::{Filter, Rejection, Reply};

use crate::errors::ProxyError;
use crate::middleware;
use crate::models::{AuthMode, ErrorBody, ErrorDetail, PingResponse, ProxyContext};
use crate::services;


/// The whole proxy as one warp filter: any method, any path, the target URL
/// carried in the raw query string. Rejections are rendered by
/// `handle_rejection`, which callers attach with `.recover(...)`.
pub fn proxy_routes(
    ctx: ProxyContext,
) -> impl Filter<Extract = (Response<Body>,), Error = Rejection> + Clone {
    let ctx_filter = warp::any().map(move || ctx.clone());

    warp::any()
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(warp::query::raw().or_else(|_| async { Ok::<(String,), Infallible>((String::new(),)) }))
        .and(warp::body::bytes())
        .and(ctx_filter)
        .and_then(handle_proxy)
}

async fn handle_proxy(
    method: Method,
    headers: HeaderMap,
    query: String,
    body: Bytes,
    ctx: ProxyContext,
) -> Result<Response<Body>, Rejection> {
    let start_time = SystemTime::now();

    // Diagnostic short-circuit; never reaches the matcher or a backend.
    if query.eq_ignore_ascii_case("ping") {
        return Ok(ping_reply(&ctx).await);
    }

    // "referer" is the standard header spelling
    let referrer = headers
        .get("referer")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    {
        let mut state = ctx.state.write().await;
        state.last_referrer = referrer.clone();
    }

    let config = match ctx.config.clone() {
        Some(config) if services::is_allowed_referrer(referrer.as_deref(), &config) => config,
        _ => {
            return Err(warp::reject::custom(ProxyError::ReferrerRejected(
                referrer.unwrap_or_default(),
            )))
        }
    };

    // The query string is the URL being proxied.
    let proxied_url = query;
    if proxied_url.is_empty() {
        return Err(warp::reject::custom(ProxyError::EmptyParameters));
    }
    let target: Uri = proxied_url.parse().map_err(|e: http::uri::InvalidUri| {
        warp::reject::custom(ProxyError::InvalidUri(e.to_string()))
    })?;

    let server_url = services::find_server_url(&proxied_url, &config.server_urls);
    let mode = server_url
        .map(services::resolve_auth)
        .unwrap_or(AuthMode::Anonymous);

    let token = match (&mode, server_url) {
        (AuthMode::OAuth2Client, Some(su)) => Some(
            middleware::acquire_server_token(
                &ctx.client,
                &config,
                &ctx.state,
                su,
                referrer.as_deref().unwrap_or(""),
            )
            .await
            .map_err(warp::reject::custom)?,
        ),
        _ => None,
    };

    let request = middleware::build_proxy_request(method.clone(), &headers, body, &target, token.as_deref())
        .map_err(warp::reject::custom)?;
    let upstream = middleware::forward_to_server(&ctx.client, request, &mode)
        .await
        .map_err(warp::reject::custom)?;
    let response = middleware::relay_response(upstream);

    if let Ok(duration) = start_time.elapsed() {
        println!(
            "{} {} {} {}ms",
            method,
            proxied_url,
            response.status(),
            duration.as_millis()
        );
    }

    Ok(response)
}

async fn ping_reply(ctx: &ProxyContext) -> Response<Body> {
    let state = ctx.state.read().await;
    json_response(
        StatusCode::OK,
        &PingResponse {
            message: "Pong!",
            has_config: ctx.config.is_some(),
            referring_url: state.last_referrer.clone(),
        },
    )
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let json = serde_json::to_string(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(json))
        .unwrap()
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(e) = err.find::<ProxyError>() {
        (e.status_code(), e.to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    let body = ErrorBody {
        error: ErrorDetail {
            code: code.as_u16(),
            message,
        },
    };
    Ok(json_response(code, &body))
}
