/// Local status endpoint
use crate::{
    connectivity::Connectivity,
    context::AppContext,
    error::{VerifyLogError, VerifyLogResult},
    event_log::LogStats,
    metrics,
    sync::SyncReport,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Snapshot returned by `GET /status`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub connectivity: Connectivity,
    pub syncing: bool,
    pub logs: LogStats,
    pub revoked_credentials: usize,
    pub cached_documents: usize,
    pub api_base: String,
}

/// Build the status router
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/metrics", get(metrics_handler))
        .route("/sync", post(trigger_sync))
        .with_state(ctx)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn status(State(ctx): State<AppContext>) -> VerifyLogResult<Json<StatusReport>> {
    Ok(Json(StatusReport {
        connectivity: ctx.connectivity.current(),
        syncing: ctx.sync_engine.is_syncing(),
        logs: ctx.event_store.stats().await?,
        revoked_credentials: ctx.revocations.len().await?,
        cached_documents: ctx.did_cache().len().await?,
        api_base: ctx.config.remote.api_base.clone(),
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// Run one sync pass and report its outcome
async fn trigger_sync(State(ctx): State<AppContext>) -> VerifyLogResult<Json<SyncReport>> {
    Ok(Json(ctx.sync_engine.sync_all().await?))
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Serve the status endpoint on localhost
pub async fn serve(ctx: AppContext, port: u16) -> VerifyLogResult<()> {
    let addr = format!("127.0.0.1:{}", port);
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| VerifyLogError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("Status endpoint listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| VerifyLogError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
