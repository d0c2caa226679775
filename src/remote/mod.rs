/// Remote authority client
///
/// The remote authority stores synced verification logs, publishes the
/// revocation list and fronts the credential verifier. The sync engine,
/// revocation cache and DID resolver only talk to it through the
/// `RemoteAuthority` trait.

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpAuthority;

use crate::{error::VerifyLogResult, event_log::LogSubmission};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Remote authority operations
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Deliver one log record (`POST /api/logs`). Ok only on a 2xx answer.
    async fn submit_log(&self, submission: &LogSubmission) -> VerifyLogResult<()>;

    /// Fetch the raw revocation list (`GET /api/revocations`)
    async fn fetch_revocations(&self) -> VerifyLogResult<serde_json::Value>;

    /// Ask the verifier about a presentation (`POST /v1/verify`)
    async fn verify(&self, request: &VerifyRequest) -> VerifyLogResult<serde_json::Value>;

    /// Capability descriptor (`GET /v1/verify/vc-verification`)
    async fn capabilities(&self) -> VerifyLogResult<ServiceCapabilities>;

    /// Liveness check (`GET /health`)
    async fn health(&self) -> VerifyLogResult<()>;
}

/// Body of a verification request
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyRequest {
    /// Sent as `application/json`
    Json(serde_json::Value),
    /// Sent as `text/plain`: JSON text, base64url or a compact JWT
    Text(String),
}

/// Verifier capability descriptor, every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCapabilities {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub supported_credential_types: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServiceCapabilities {
    pub fn is_available(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("available"))
            .unwrap_or(false)
    }
}
