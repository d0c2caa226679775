/// End-to-end tests against the in-memory mock authority
///
/// Every test opens real SQLite files in a temporary directory and talks to
/// the mock authority over HTTP on an ephemeral localhost port.
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::assert_ok;
use veriflog::{
    config::ClientConfig,
    event_log::export::{self, ExportFormat},
    jobs::SyncCoordinator,
    mock_authority::MockAuthority,
    remote::{HttpAuthority, RemoteAuthority, VerifyRequest},
    AppContext, VerifyLogError,
};

struct Harness {
    mock: MockAuthority,
    config: ClientConfig,
    _dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let mock = MockAuthority::new();
        let (addr, _) = mock.spawn_local().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::with_data_directory(&format!("http://{}", addr), dir.path().to_path_buf());

        Self {
            mock,
            config,
            _dir: dir,
        }
    }

    async fn context(&self) -> AppContext {
        AppContext::new(self.config.clone()).await.unwrap()
    }
}

#[tokio::test]
async fn test_offline_records_are_delivered_after_reconnect() {
    let harness = Harness::start().await;
    harness.mock.set_offline(true);

    let ctx = harness.context().await;
    assert!(!ctx.connectivity.is_online());

    for n in 0..3 {
        ctx.event_store.append(&json!({ "verified": true, "n": n })).await.unwrap();
    }

    let report = ctx.sync_engine.sync_all().await.unwrap();
    assert!(report.offline);
    assert_eq!(ctx.event_store.list_pending().await.unwrap().len(), 3);
    assert_eq!(harness.mock.log_count().await, 0);

    harness.mock.set_offline(false);
    assert!(ctx.refresh_connectivity().await.is_online());

    let report = assert_ok!(ctx.sync_engine.sync_all().await);
    assert_eq!(report.synced, 3);
    assert!(ctx.event_store.list_pending().await.unwrap().is_empty());
    assert_eq!(harness.mock.log_count().await, 3);

    let received = harness.mock.received_logs().await;
    assert_eq!(received[0].data["data"]["n"], 0);
    assert_eq!(received[0].data["synced"], false);
}

#[tokio::test]
async fn test_rejected_submissions_stay_pending() {
    let harness = Harness::start().await;
    let ctx = harness.context().await;
    harness.mock.set_reject_logs(true);

    let id = ctx.event_store.append_raw("not json").await.unwrap();
    let report = ctx.sync_engine.sync_all().await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(!ctx.event_store.get(id).await.unwrap().unwrap().synced);

    harness.mock.set_reject_logs(false);
    let report = ctx.sync_engine.sync_all().await.unwrap();
    assert_eq!(report.synced, 1);

    let received = harness.mock.received_logs().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].data["data"], json!({ "raw": "not json" }));
}

#[tokio::test]
async fn test_pending_records_survive_restart() {
    let harness = Harness::start().await;
    harness.mock.set_offline(true);

    let id = {
        let ctx = harness.context().await;
        ctx.event_store.append(&json!({ "issuer": "Demo Issuer" })).await.unwrap()
    };

    harness.mock.set_offline(false);
    let ctx = harness.context().await;
    let pending = ctx.event_store.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);

    ctx.sync_engine.sync_all().await.unwrap();
    assert!(ctx.event_store.get(id).await.unwrap().unwrap().synced);
}

#[tokio::test]
async fn test_verify_refresh_and_record() {
    let harness = Harness::start().await;
    let ctx = harness.context().await;

    assert_eq!(ctx.revocations.refresh_from(ctx.remote.as_ref()).await.unwrap(), 2);
    assert!(ctx.revocations.is_revoked("cred123").await.unwrap());
    assert_eq!(
        ctx.revocations.reason_for("cred999").await.unwrap().as_deref(),
        Some("Expired")
    );

    let recorded = ctx
        .verifier
        .verify_and_record(r#"{"credential":{"id":"cred-ok","credentialSubject":{"id":"did:example:alice"}}}"#)
        .await
        .unwrap();
    assert!(recorded.outcome.is_verified());
    assert_eq!(recorded.outcome.revocation_status.as_deref(), Some("good"));

    let revoked = ctx
        .verifier
        .verify_and_record(r#"{"credential":{"id":"cred123","credentialSubject":{"id":"did:example:bob"}}}"#)
        .await
        .unwrap();
    assert_eq!(revoked.outcome.revoked, Some(true));
    assert!(!revoked.outcome.is_verified());

    assert_eq!(ctx.event_store.stats().await.unwrap().pending, 2);
}

#[tokio::test]
async fn test_cached_documents_verify_while_offline() {
    let harness = Harness::start().await;
    let ctx = harness.context().await;
    let payload = r#"{"credential":{"id":"cred-cached","credentialSubject":{"name":"Alice"}}}"#;

    ctx.verifier.verify_and_record(payload).await.unwrap();

    harness.mock.set_offline(true);
    assert!(!ctx.refresh_connectivity().await.is_online());

    let recorded = ctx.verifier.verify_and_record(payload).await.unwrap();
    assert!(recorded.from_cache);

    let err = ctx
        .verifier
        .verify_and_record(r#"{"credential":{"id":"never-seen","credentialSubject":{}}}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyLogError::NetworkUnreachable(_)));
}

#[tokio::test]
async fn test_malformed_revocation_list_keeps_snapshot() {
    let harness = Harness::start().await;
    let ctx = harness.context().await;
    ctx.revocations.refresh_from(ctx.remote.as_ref()).await.unwrap();

    let err = ctx.revocations.refresh(&json!({ "not": "a list" })).await.unwrap_err();
    assert!(matches!(err, VerifyLogError::InvalidRemoteData(_)));
    assert!(ctx.revocations.is_revoked("cred123").await.unwrap());

    harness.mock.set_offline(true);
    assert!(ctx.revocations.refresh_from(ctx.remote.as_ref()).await.is_err());
    assert_eq!(ctx.revocations.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_export_does_not_change_sync_state() {
    let harness = Harness::start().await;
    harness.mock.set_offline(true);
    let ctx = harness.context().await;

    ctx.event_store.append(&json!({ "issuer": "A, Inc." })).await.unwrap();
    ctx.event_store.append_raw("plain").await.unwrap();
    let before = ctx.event_store.list_all().await.unwrap();

    let json_export = export::export(&before, ExportFormat::Json).unwrap();
    let parsed: Value = serde_json::from_str(&json_export).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
    assert_eq!(parsed[1]["data"], json!({ "raw": "plain" }));

    let csv = export::export(&before, ExportFormat::Csv).unwrap();
    assert!(csv.starts_with("id,timestamp,synced,payload"));

    assert_eq!(ctx.event_store.list_all().await.unwrap(), before);
    assert_eq!(harness.mock.log_count().await, 0);
}

#[tokio::test]
async fn test_coordinator_syncs_on_reconnect() {
    let harness = Harness::start().await;
    harness.mock.set_offline(true);
    let ctx = Arc::new(harness.context().await);
    let jobs = Arc::new(SyncCoordinator::new(Arc::clone(&ctx))).start();

    ctx.event_store.append(&json!({ "verified": true })).await.unwrap();
    ctx.event_store.append(&json!({ "verified": false })).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.mock.log_count().await, 0);

    harness.mock.set_offline(false);
    ctx.refresh_connectivity().await;

    let mut delivered = 0;
    for _ in 0..300 {
        delivered = harness.mock.log_count().await;
        if delivered == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered, 2);

    for job in jobs {
        job.abort();
    }
}

#[tokio::test]
async fn test_http_authority_against_mock() {
    let harness = Harness::start().await;
    let authority = HttpAuthority::new(&harness.config.remote).unwrap();

    assert_ok!(authority.health().await);
    assert!(authority.capabilities().await.unwrap().is_available());

    let text = authority
        .verify(&VerifyRequest::Text(r#"{"vc":{"id":"cred999"}}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(text["status"], "revoked");

    harness.mock.set_offline(true);
    let err = authority.fetch_revocations().await.unwrap_err();
    assert!(matches!(err, VerifyLogError::RemoteRejected { status: 503, .. }));
}
