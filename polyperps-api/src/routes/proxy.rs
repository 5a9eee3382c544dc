//! Pass-through proxy to the Polymarket Gamma and CLOB APIs
//!
//! The browser cannot call either API directly because of CORS, so
//! `/api/gamma/*` and `/api/clob/*` (and the `/gamma-api/*`, `/clob-api/*`
//! aliases) are forwarded with their prefix stripped.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tracing::{debug, warn};

use super::error_response;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upstream {
    Gamma,
    Clob,
}

impl Upstream {
    fn base<'a>(&self, state: &'a AppState) -> &'a str {
        match self {
            Upstream::Gamma => &state.config.gamma_api_url,
            Upstream::Clob => &state.config.clob_api_url,
        }
    }
}

/// Join the upstream base, the stripped path and the raw query string
fn upstream_url(base: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

async fn forward(
    state: &AppState,
    upstream: Upstream,
    method: Method,
    path: &str,
    query: Option<String>,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let url = upstream_url(upstream.base(state), path, query.as_deref());
    debug!("Proxying {} {} -> {}", method, path, url);

    let mut request = state.http.request(method, &url);
    for name in [header::CONTENT_TYPE, header::ACCEPT] {
        if let Some(value) = headers.get(&name) {
            request = request.header(name, value.clone());
        }
    }
    if !body.is_empty() {
        request = request.body(body);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("Proxy request to {} failed: {}", url, e);
            return error_response(StatusCode::BAD_GATEWAY, format!("Upstream request failed: {}", e));
        }
    };

    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            warn!("Proxy response from {} could not be read: {}", url, e);
            return error_response(StatusCode::BAD_GATEWAY, format!("Upstream read failed: {}", e));
        }
    };

    let mut out = (status, bytes).into_response();
    if let Some(content_type) = content_type {
        out.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    out
}

async fn gamma_proxy(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(&state, Upstream::Gamma, method, &path, query, &headers, body).await
}

async fn clob_proxy(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    forward(&state, Upstream::Clob, method, &path, query, &headers, body).await
}

/// Proxy routes, mounted at the root
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/gamma/{*path}", any(gamma_proxy))
        .route("/gamma-api/{*path}", any(gamma_proxy))
        .route("/api/clob/{*path}", any(clob_proxy))
        .route("/clob-api/{*path}", any(clob_proxy))
}
