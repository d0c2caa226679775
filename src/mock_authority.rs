/// In-memory remote authority for demos and integration tests
///
/// Serves the same endpoints the client talks to: log collection, the
/// revocation list and a verifier that accepts everything not on that list.
/// It can be switched offline (every route answers 503) or told to reject
/// log submissions, which is enough to exercise the client's sync paths.
use crate::{
    error::{VerifyLogError, VerifyLogResult},
    verifier::parse_scan_payload,
};
use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// A log received through `POST /api/logs`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedLog {
    pub id: i64,
    pub data: Value,
    pub synced: bool,
    pub server_timestamp: i64,
}

#[derive(Default)]
struct MockState {
    logs: RwLock<Vec<ReceivedLog>>,
    revocations: RwLock<BTreeMap<String, Option<String>>>,
    offline: AtomicBool,
    reject_logs: AtomicBool,
}

/// Handle to a mock authority; clones share state
#[derive(Clone)]
pub struct MockAuthority {
    state: Arc<MockState>,
}

impl MockAuthority {
    /// Mock seeded with the demo revocation list
    pub fn new() -> Self {
        let mut revocations = BTreeMap::new();
        revocations.insert("cred123".to_string(), Some("Compromised".to_string()));
        revocations.insert("cred999".to_string(), Some("Expired".to_string()));

        Self {
            state: Arc::new(MockState {
                revocations: RwLock::new(revocations),
                ..Default::default()
            }),
        }
    }

    /// Answer every request with 503 while offline
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
    }

    /// Answer log submissions with 500
    pub fn set_reject_logs(&self, reject: bool) {
        self.state.reject_logs.store(reject, Ordering::SeqCst);
    }

    pub async fn revoke(&self, id: &str, reason: Option<&str>) {
        self.state
            .revocations
            .write()
            .await
            .insert(id.to_string(), reason.map(str::to_string));
    }

    pub async fn received_logs(&self) -> Vec<ReceivedLog> {
        self.state.logs.read().await.clone()
    }

    pub async fn log_count(&self) -> usize {
        self.state.logs.read().await.len()
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]);

        Router::new()
            .route("/health", get(health_check))
            .route("/api/logs", get(list_logs).post(store_log))
            .route("/api/revocations", get(list_revocations))
            .route("/v1/verify", post(verify))
            .route("/v1/verify/vc-verification", get(capabilities))
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&self.state),
                offline_switch,
            ))
            .with_state(Arc::clone(&self.state))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until the task is dropped
    pub async fn serve(self, addr: SocketAddr) -> VerifyLogResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| VerifyLogError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Mock authority listening on {}", addr);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| VerifyLogError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Serve on an ephemeral localhost port in the background
    pub async fn spawn_local(&self) -> VerifyLogResult<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = self.router();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Mock authority stopped: {}", e);
            }
        });

        Ok((addr, handle))
    }
}

type SharedState = Arc<MockState>;

async fn offline_switch(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    if state.offline.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Unavailable", "message": "Authority is offline" })),
        )
            .into_response();
    }
    next.run(request).await
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now().timestamp_millis() }))
}

async fn store_log(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    if state.reject_logs.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Rejected", "message": "Log submissions are disabled" })),
        )
            .into_response();
    }

    let mut logs = state.logs.write().await;
    let id = logs.len() as i64 + 1;
    logs.push(ReceivedLog {
        id,
        data: body,
        synced: true,
        server_timestamp: Utc::now().timestamp_millis(),
    });
    info!("Stored log {}", id);

    (StatusCode::CREATED, Json(json!({ "success": true, "id": id }))).into_response()
}

/// Newest first
async fn list_logs(State(state): State<SharedState>) -> Json<Vec<ReceivedLog>> {
    let mut logs = state.logs.read().await.clone();
    logs.reverse();
    Json(logs)
}

async fn list_revocations(State(state): State<SharedState>) -> Json<Value> {
    let revocations = state.revocations.read().await;
    Json(Value::Array(
        revocations
            .iter()
            .map(|(id, reason)| json!({ "id": id, "reason": reason }))
            .collect(),
    ))
}

async fn capabilities() -> Json<Value> {
    Json(json!({
        "status": "AVAILABLE",
        "service": "veriflog-mock-authority",
        "supportedCredentialTypes": ["VerifiablePresentation", "VerifiableCredential"],
        "message": "Mock VC verification service is available",
    }))
}

/// Accepts JSON, JSON text, compact JWTs and base64url bodies
async fn verify(State(state): State<SharedState>, body: String) -> Json<Value> {
    let presentation = parse_scan_payload(&body).into_value();

    let cred_id = ["/vc/id", "/credential/id", "/id"]
        .iter()
        .filter_map(|path| presentation.pointer(path))
        .find_map(Value::as_str)
        .map(str::to_string);

    let revoked = match &cred_id {
        Some(id) => state.revocations.read().await.get(id).cloned(),
        None => None,
    };

    let issuer = first_present(&presentation, &["/issuer", "/vc/issuer", "/credential/issuer"])
        .unwrap_or_else(|| json!("Demo Issuer"));
    let subject = first_present(
        &presentation,
        &[
            "/subject",
            "/vc/credentialSubject/id",
            "/credential/credentialSubject/id",
        ],
    )
    .unwrap_or_else(|| json!("Demo Subject"));

    let message = match &revoked {
        Some(reason) => format!(
            "This credential has been revoked: {}",
            reason.as_deref().unwrap_or("no reason given")
        ),
        None => "Mock verification succeeded".to_string(),
    };

    Json(json!({
        "verified": revoked.is_none(),
        "revoked": revoked.is_some(),
        "status": if revoked.is_some() { "revoked" } else { "success" },
        "issuer": issuer,
        "subject": subject,
        "checkedAt": Utc::now().to_rfc3339(),
        "message": message,
        "raw": presentation,
    }))
}

fn first_present(value: &Value, paths: &[&str]) -> Option<Value> {
    paths
        .iter()
        .filter_map(|path| value.pointer(path))
        .find(|v| !v.is_null())
        .cloned()
}

async fn not_found(request: Request) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "NotFound", "path": request.uri().path() })),
    )
}
