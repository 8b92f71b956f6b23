//! axum surface
//!
//! - `GET {path_prefix}` and anything below it: delivery
//! - `GET /healthz`
//! - `POST /internal/links`, `DELETE /internal/links/{token}`: issuance and
//!   revocation for out-of-process callers, mounted only when an admin key
//!   is configured

pub mod admin_auth;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::delivery::{Delivered, DeliveryHandler, DeliveryRequest, DeliverySource};
use crate::error::ProxyError;
use crate::issuer::UrlIssuer;
use crate::search_links::SearchLinks;

pub use admin_auth::AdminKey;

/// Address used when no client address can be determined
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Response header telling whether the edge cache served the request
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Shared state of the router
#[derive(Debug, Clone)]
pub struct AppState {
    /// Delivery pipeline
    pub delivery: Arc<DeliveryHandler>,
    /// Link issuer
    pub issuer: Arc<UrlIssuer>,
    /// Admin key guarding the internal API
    pub admin: Option<AdminKey>,
}

/// Build the router serving deliveries under `path_prefix`
pub fn router(state: AppState, path_prefix: &str) -> Router {
    let prefix = path_prefix.trim_end_matches('/');
    let mut router = Router::new()
        .route(if prefix.is_empty() { "/" } else { prefix }, get(deliver))
        .route(&format!("{prefix}/{{*rest}}"), get(deliver))
        .route("/healthz", get(healthz));

    if state.admin.is_some() {
        router = router
            .route("/internal/links", post(issue_link))
            .route("/internal/links/{token}", delete(revoke_link));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Client address for rate limiting
///
/// `cf-connecting-ip`, then the first `x-forwarded-for` entry, then the TCP
/// peer, then [`UNKNOWN_CLIENT`].
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header_value("cf-connecting-ip") {
        return ip.to_string();
    }
    if let Some(first) = header_value("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}

async fn deliver(State(state): State<AppState>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    let query = request.uri().query().unwrap_or_default();

    let delivery_request = DeliveryRequest::from_query(query, ip);
    match state.delivery.deliver(&delivery_request).await {
        Ok(delivered) => delivered.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

impl IntoResponse for Delivered {
    fn into_response(self) -> Response {
        let cache_status = match self.source {
            DeliverySource::Cache => "HIT",
            DeliverySource::Upstream => "MISS",
        };
        let mut response = (self.response.status, self.response.body).into_response();
        response.headers_mut().extend(self.response.headers);
        response.headers_mut().insert(
            CACHE_STATUS_HEADER,
            HeaderValue::from_static(cache_status),
        );
        response
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), self.sanitize()).into_response();
        if let ProxyError::RateLimited(info) = &self {
            let secs = info.retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Body of `POST /internal/links`
#[derive(Debug, Deserialize)]
pub struct IssueLinkRequest {
    /// Resource to grant access to
    pub resource_id: String,
    /// Subject the link is issued to
    #[serde(default)]
    pub subject_id: String,
}

/// Response of `POST /internal/links`
#[derive(Debug, Serialize, Deserialize)]
pub struct IssueLinkResponse {
    /// Signed URL
    pub url: String,
    /// Expiry, Unix seconds
    pub expires_at: u64,
    /// Reverse image search links for `url`
    pub search_links: SearchLinks,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        "Unauthorized",
    )
        .into_response()
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    state.admin.as_ref().is_some_and(|key| key.authorize(headers))
}

fn admin_error(error: &ProxyError) -> Response {
    let status = match error {
        ProxyError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
        other => other.status_code(),
    };
    (status, error.sanitize()).into_response()
}

async fn issue_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let body: IssueLinkRequest = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("Invalid body: {e}")).into_response(),
    };
    match state.issuer.issue(&body.resource_id, &body.subject_id).await {
        Ok(link) => {
            info!(resource_id = %body.resource_id, subject_id = %body.subject_id, "issued link");
            let search_links = link.search_links();
            Json(IssueLinkResponse {
                url: link.url,
                expires_at: link.expires_at,
                search_links,
            })
            .into_response()
        }
        Err(e) => admin_error(&e),
    }
}

async fn revoke_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match state.issuer.revoke(&token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => admin_error(&e),
    }
}
