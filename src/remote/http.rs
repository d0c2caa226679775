/// reqwest implementation of the remote authority
use crate::{
    config::RemoteConfig,
    error::{VerifyLogError, VerifyLogResult},
    event_log::LogSubmission,
    remote::{RemoteAuthority, ServiceCapabilities, VerifyRequest},
};
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use std::time::Duration;
use tracing::debug;

/// HTTP client for the remote authority
#[derive(Clone)]
pub struct HttpAuthority {
    base_url: String,
    http_client: Client,
}

impl HttpAuthority {
    /// Create a new client from configuration
    pub fn new(config: &RemoteConfig) -> VerifyLogResult<Self> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VerifyLogError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.api_base.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn non-2xx answers into `RemoteRejected`
async fn ensure_success(response: Response) -> VerifyLogResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(VerifyLogError::RemoteRejected {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

fn unreachable(what: &str, e: reqwest::Error) -> VerifyLogError {
    VerifyLogError::NetworkUnreachable(format!("{}: {}", what, e))
}

#[async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn submit_log(&self, submission: &LogSubmission) -> VerifyLogResult<()> {
        let response = self
            .http_client
            .post(self.url("/api/logs"))
            .json(submission)
            .send()
            .await
            .map_err(|e| unreachable(&format!("Failed to deliver log {}", submission.id), e))?;

        ensure_success(response).await?;
        debug!("Remote accepted log {}", submission.id);
        Ok(())
    }

    async fn fetch_revocations(&self) -> VerifyLogResult<serde_json::Value> {
        let response = self
            .http_client
            .get(self.url("/api/revocations"))
            .send()
            .await
            .map_err(|e| unreachable("Failed to fetch revocation list", e))?;

        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| VerifyLogError::InvalidRemoteData(format!("Revocation list is not JSON: {}", e)))
    }

    async fn verify(&self, request: &VerifyRequest) -> VerifyLogResult<serde_json::Value> {
        let builder = self.http_client.post(self.url("/v1/verify"));
        let builder = match request {
            VerifyRequest::Json(body) => builder.json(body),
            VerifyRequest::Text(text) => builder
                .header(header::CONTENT_TYPE, "text/plain")
                .body(text.clone()),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| unreachable("Verification request failed", e))?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn capabilities(&self) -> VerifyLogResult<ServiceCapabilities> {
        let response = self
            .http_client
            .get(self.url("/v1/verify/vc-verification"))
            .send()
            .await
            .map_err(|e| unreachable("Capability discovery failed", e))?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn health(&self) -> VerifyLogResult<()> {
        let response = self
            .http_client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| unreachable("Health check failed", e))?;

        ensure_success(response).await?;
        Ok(())
    }
}
