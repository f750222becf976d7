//! HTTP endpoints: health check and token-gated digest administration.
//!
//! None of these touch live rooms; they only read the usage counters.

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::abuse::client_ip;
use crate::auth::{self, AdminConfig};
use crate::digest::DeliveryStatus;
use crate::state::{stats::StatsSummary, AppState};
use crate::ws;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

/// GET /admin/digest-preview
///
/// The digest exactly as it would be sent now, as plain text.
pub async fn digest_preview(State(state): State<Arc<AppState>>) -> Response {
    let text = state.digest_preview().await;
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestTarget {
    pub to_default: String,
    pub from: String,
    pub webhook: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestInfo {
    pub last_delivery: Option<DeliveryStatus>,
    pub stats: StatsSummary,
    pub digest: DigestTarget,
}

/// GET /admin/digest-info
pub async fn digest_info(State(state): State<Arc<AppState>>) -> Json<DigestInfo> {
    let stats = state.stats.read().await.summary();
    let config = &state.digest.config;
    Json(DigestInfo {
        last_delivery: state.digest.last_status().await,
        stats,
        digest: DigestTarget {
            to_default: config.to.clone(),
            from: config.from.clone(),
            webhook: config.webhook_url.is_some(),
        },
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct SendDigestParams {
    pub to: Option<String>,
    pub subj: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDigestResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET|POST /admin/send-digest-now?to=&subj=
///
/// Sends immediately regardless of the daily schedule. Counters reset on
/// success.
pub async fn send_digest_now(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SendDigestParams>,
) -> Response {
    match state
        .send_digest(params.to.as_deref(), params.subj.as_deref())
        .await
    {
        Ok(status) => Json(SendDigestResponse {
            ok: true,
            message_id: status.message_id,
            error: None,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Manual digest send failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SendDigestResponse {
                    ok: false,
                    message_id: None,
                    error: Some("send_failed".to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Count every HTTP visitor towards the digest's unique-visitor figure
pub async fn track_visitor(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    state.record_visitor(&ip).await;
    next.run(request).await
}

/// Full HTTP surface: socket, health, admin and static files
pub fn router(state: Arc<AppState>, admin: Arc<AdminConfig>, static_dir: &Path) -> Router {
    // Admin routes answer 404 unless the token matches
    let admin_routes = Router::new()
        .route("/admin/digest-preview", get(digest_preview))
        .route("/admin/digest-info", get(digest_info))
        .route(
            "/admin/send-digest-now",
            get(send_digest_now).post(send_digest_now),
        )
        .layer(middleware::from_fn_with_state(
            admin,
            auth::admin_auth_middleware,
        ));

    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .merge(admin_routes)
        .fallback_service(ServeDir::new(static_dir))
        .layer(middleware::from_fn_with_state(state.clone(), track_visitor))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
