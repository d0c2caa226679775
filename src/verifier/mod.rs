/// Verification workflow
///
/// The credential checks themselves run in the remote verifier. This module
/// turns scanned or uploaded text into a payload, asks the verifier (through
/// the DID cache when the credential is identifiable), enriches the answer
/// with the local revocation snapshot and records the result in the event
/// log.

pub mod outcome;
pub mod payload;

pub use outcome::VerificationOutcome;
pub use payload::{parse_scan_payload, validate_payload, ParsedPayload};

use crate::{
    connectivity::ConnectivityMonitor,
    error::{VerifyLogError, VerifyLogResult},
    event_log::EventStore,
    identity::DidResolver,
    remote::{RemoteAuthority, ServiceCapabilities, VerifyRequest},
    revocation::{RevocationCache, RevocationStatus},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Identifier of the credential inside a scanned payload
///
/// Looks at `credential.id`, then `credential.credentialSubject.id`.
pub fn credential_id(payload: &Value) -> Option<String> {
    ["/credential/id", "/credential/credentialSubject/id"]
        .iter()
        .filter_map(|path| payload.pointer(path))
        .filter_map(Value::as_str)
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

/// A verification that has been written to the event log
#[derive(Debug, Clone)]
pub struct RecordedVerification {
    pub log_id: i64,
    pub outcome: VerificationOutcome,
    /// Resolved from the local DID cache without contacting the verifier
    pub from_cache: bool,
}

/// Verify-and-record workflow
#[derive(Clone)]
pub struct Verifier {
    remote: Arc<dyn RemoteAuthority>,
    resolver: DidResolver,
    revocations: RevocationCache,
    store: EventStore,
    connectivity: ConnectivityMonitor,
}

impl Verifier {
    pub fn new(
        remote: Arc<dyn RemoteAuthority>,
        resolver: DidResolver,
        revocations: RevocationCache,
        store: EventStore,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            remote,
            resolver,
            revocations,
            store,
            connectivity,
        }
    }

    /// Parse, validate, verify and record scanned or uploaded text
    pub async fn verify_and_record(&self, input: &str) -> VerifyLogResult<RecordedVerification> {
        let payload = parse_scan_payload(input).into_value();
        validate_payload(&payload)?;
        self.verify_value(payload).await
    }

    /// Verify an already-structured payload and record the result
    pub async fn verify_value(&self, payload: Value) -> VerifyLogResult<RecordedVerification> {
        let (response, from_cache) = if credential_id(&payload).is_some() {
            let resolution = self.resolver.resolve(&payload).await?;
            (resolution.document, resolution.from_cache)
        } else {
            if !self.connectivity.is_online() {
                return Err(VerifyLogError::NetworkUnreachable(
                    "offline and the payload carries no cacheable credential id".to_string(),
                ));
            }
            (self.remote.verify(&VerifyRequest::Json(payload)).await?, false)
        };

        let mut outcome = VerificationOutcome::from_value(response);

        let status = match outcome.credential_id() {
            Some(id) => self.revocations.status(&id).await?,
            None => RevocationStatus::NotKnownRevoked,
        };
        outcome.apply_revocation(&status);

        let log_id = self.store.append(&outcome.to_value()?).await?;
        info!(
            "Recorded verification {} ({}, revocation {})",
            log_id,
            if outcome.is_verified() { "verified" } else { "not verified" },
            status.label()
        );

        Ok(RecordedVerification {
            log_id,
            outcome,
            from_cache,
        })
    }

    /// Capability descriptor of the remote verifier
    pub async fn capabilities(&self) -> VerifyLogResult<ServiceCapabilities> {
        self.remote.capabilities().await
    }
}
