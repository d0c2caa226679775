/// Scripted in-process remote authority for unit tests
use crate::{
    error::{VerifyLogError, VerifyLogResult},
    event_log::LogSubmission,
    remote::{RemoteAuthority, ServiceCapabilities, VerifyRequest},
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the next submission should experience
#[derive(Debug, Clone, Copy)]
pub enum SubmitOutcome {
    Accept,
    Reject(u16),
    Unreachable,
}

#[derive(Default)]
pub struct FakeAuthority {
    /// Ids of every submission that reached the authority, in order
    pub submissions: Mutex<Vec<i64>>,
    /// Per-call script; empty means accept
    script: Mutex<VecDeque<SubmitOutcome>>,
    /// Per-record script, consulted before the per-call script
    per_record: Mutex<HashMap<i64, VecDeque<SubmitOutcome>>>,
    submit_delay: Mutex<Option<Duration>>,
    revocations: Mutex<Option<serde_json::Value>>,
    verify_response: Mutex<Option<serde_json::Value>>,
    pub verify_calls: AtomicUsize,
}

impl FakeAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, outcomes: &[SubmitOutcome]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn script_record(&self, id: i64, outcomes: &[SubmitOutcome]) {
        self.per_record
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .extend(outcomes.iter().copied());
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_revocations(&self, value: Option<serde_json::Value>) {
        *self.revocations.lock().unwrap() = value;
    }

    pub fn set_verify_response(&self, value: serde_json::Value) {
        *self.verify_response.lock().unwrap() = Some(value);
    }

    pub fn submitted(&self) -> Vec<i64> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteAuthority for FakeAuthority {
    async fn submit_log(&self, submission: &LogSubmission) -> VerifyLogResult<()> {
        let delay = *self.submit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = {
            let mut per_record = self.per_record.lock().unwrap();
            let next = per_record
                .get_mut(&submission.id)
                .and_then(|queue| queue.pop_front());
            next
        }
        .or_else(|| self.script.lock().unwrap().pop_front())
        .unwrap_or(SubmitOutcome::Accept);

        match outcome {
            SubmitOutcome::Accept => {
                self.submissions.lock().unwrap().push(submission.id);
                Ok(())
            }
            SubmitOutcome::Reject(status) => {
                self.submissions.lock().unwrap().push(submission.id);
                Err(VerifyLogError::RemoteRejected {
                    status,
                    body: "rejected".to_string(),
                })
            }
            SubmitOutcome::Unreachable => Err(VerifyLogError::NetworkUnreachable(
                "connection refused".to_string(),
            )),
        }
    }

    async fn fetch_revocations(&self) -> VerifyLogResult<serde_json::Value> {
        self.revocations
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| VerifyLogError::NetworkUnreachable("connection refused".to_string()))
    }

    async fn verify(&self, request: &VerifyRequest) -> VerifyLogResult<serde_json::Value> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.verify_response.lock().unwrap().clone() {
            return Ok(response);
        }

        let raw = match request {
            VerifyRequest::Json(value) => value.clone(),
            VerifyRequest::Text(text) => json!({ "raw": text }),
        };
        Ok(json!({
            "verified": true,
            "status": "success",
            "issuer": "Demo Issuer",
            "subject": raw.pointer("/credential/id").cloned().unwrap_or(json!("Demo Subject")),
            "raw": raw,
        }))
    }

    async fn capabilities(&self) -> VerifyLogResult<ServiceCapabilities> {
        Ok(ServiceCapabilities {
            status: Some("AVAILABLE".to_string()),
            service: Some("fake".to_string()),
            supported_credential_types: vec!["VerifiableCredential".to_string()],
            message: None,
        })
    }

    async fn health(&self) -> VerifyLogResult<()> {
        Ok(())
    }
}
