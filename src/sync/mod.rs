/// Sync Engine - reconciles pending log records with the remote authority
///
/// Each record moves `pending -> synced` only after the remote authority
/// accepted it. Delivery is at-least-once: a record whose acceptance could
/// not be recorded locally is simply sent again on the next pass.
use crate::{
    connectivity::ConnectivityMonitor,
    error::{VerifyLogError, VerifyLogResult},
    event_log::{EventStore, VerificationLogRecord},
    metrics,
    remote::RemoteAuthority,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Summary of one `sync_all` pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records a delivery was attempted for
    pub attempted: usize,
    /// Records accepted and marked synced
    pub synced: usize,
    /// Records left pending after a rejection or failure
    pub failed: usize,
    /// Another pass was already running
    pub skipped: bool,
    /// Nothing was attempted because the client is offline
    pub offline: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.skipped && !self.offline && self.failed == 0
    }
}

/// Clears the in-progress flag however the pass ends
struct InProgressGuard(Arc<AtomicBool>);

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives delivery of pending records
#[derive(Clone)]
pub struct SyncEngine {
    store: EventStore,
    remote: Arc<dyn RemoteAuthority>,
    connectivity: ConnectivityMonitor,
    in_progress: Arc<AtomicBool>,
    /// Set by a skipped call; the running pass goes around once more
    rerun: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(
        store: EventStore,
        remote: Arc<dyn RemoteAuthority>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            in_progress: Arc::new(AtomicBool::new(false)),
            rerun: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Attempt delivery of every pending record
    ///
    /// A failing record is logged and left pending; the pass continues with
    /// the next one. A call made while a pass is running returns a skipped
    /// report and asks the running pass, whoever started it, to scan the
    /// pending set once more before finishing. Retrying failed records is
    /// left to the caller.
    pub async fn sync_all(&self) -> VerifyLogResult<SyncReport> {
        let mut report = SyncReport::default();
        let mut first = true;

        loop {
            let guard = match self.try_begin() {
                Some(guard) => guard,
                None if first => {
                    debug!("Sync already in progress; skipping");
                    return Ok(SyncReport::skipped());
                }
                // Another caller picked up the outstanding rerun
                None => break,
            };
            first = false;

            if !self.connectivity.is_online() {
                debug!("Offline; leaving pending logs for later");
                report.offline = true;
                return Ok(report);
            }

            loop {
                self.rerun.store(false, Ordering::SeqCst);
                self.run_pass(&mut report).await?;
                if !self.rerun.swap(false, Ordering::SeqCst) {
                    break;
                }
                debug!("Sync requested during pass; scanning pending logs again");
            }

            drop(guard);
            if !self.rerun.load(Ordering::SeqCst) {
                break;
            }
        }

        info!(
            "Sync attempt complete: {} attempted, {} synced, {} failed",
            report.attempted, report.synced, report.failed
        );

        Ok(report)
    }

    /// Take the in-progress flag, or leave a rerun request for its holder
    fn try_begin(&self) -> Option<InProgressGuard> {
        loop {
            if self
                .in_progress
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Some(InProgressGuard(Arc::clone(&self.in_progress)));
            }

            self.rerun.store(true, Ordering::SeqCst);
            if self.in_progress.load(Ordering::SeqCst) {
                return None;
            }
            // The holder finished before it could see the request
        }
    }

    async fn run_pass(&self, report: &mut SyncReport) -> VerifyLogResult<()> {
        let pending = self.store.list_pending().await?;

        for record in pending {
            report.attempted += 1;

            if let Err(e) = self.deliver(&record).await {
                if e.is_transient() {
                    warn!("Sync failed for log {}, will retry: {}", record.id, e);
                } else {
                    warn!("Sync failed for log {}: {}", record.id, e);
                }
                report.failed += 1;
                continue;
            }

            match self.store.mark_synced(record.id).await {
                Ok(_) => {
                    report.synced += 1;
                    info!("Synced log {}", record.id);
                }
                Err(e) => {
                    // Accepted remotely but still pending here; it will be resent
                    warn!("Log {} accepted but could not be marked synced: {}", record.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(())
    }

    async fn deliver(&self, record: &VerificationLogRecord) -> VerifyLogResult<()> {
        let submission = record.submission();
        if submission.data.is_raw() {
            warn!("Log {} payload is not valid JSON; sending raw wrapper", record.id);
        }

        match self.remote.submit_log(&submission).await {
            Ok(()) => {
                metrics::record_delivery("accepted");
                Ok(())
            }
            Err(e) => {
                metrics::record_delivery(delivery_outcome(&e));
                Err(e)
            }
        }
    }
}

fn delivery_outcome(e: &VerifyLogError) -> &'static str {
    match e {
        VerifyLogError::RemoteRejected { .. } => "rejected",
        VerifyLogError::NetworkUnreachable(_) => "unreachable",
        _ => "error",
    }
}
