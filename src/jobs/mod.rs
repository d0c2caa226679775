use crate::{
    connectivity::Connectivity,
    context::AppContext,
    event_log::StoreEvent,
    remote::RemoteAuthority,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Ask the remote authority whether it is reachable
pub async fn probe(remote: &dyn RemoteAuthority) -> Connectivity {
    match remote.health().await {
        Ok(()) => Connectivity::Online,
        Err(e) => {
            debug!("Health probe failed: {}", e);
            Connectivity::Offline
        }
    }
}

/// Background jobs driving synchronization
///
/// A sync pass is started at startup, whenever connectivity comes back and
/// whenever a record is appended while online. Each pass runs in its own
/// task; the sync engine skips passes that would overlap.
pub struct SyncCoordinator {
    context: Arc<AppContext>,
}

impl SyncCoordinator {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("Starting sync coordinator");

        let mut handles = vec![tokio::spawn(Self::trigger_job(Arc::clone(&self)))];

        let probe_secs = self.context.config.connectivity.probe_interval_secs;
        if probe_secs > 0 {
            handles.push(tokio::spawn(Self::health_probe_job(
                Arc::clone(&self),
                Duration::from_secs(probe_secs),
            )));
        } else {
            info!("Connectivity probing disabled");
        }

        handles
    }

    /// React to connectivity transitions and store appends
    async fn trigger_job(coordinator: Arc<Self>) {
        let ctx = &coordinator.context;
        let mut store_events = ctx.event_store.subscribe();
        let mut connectivity = ctx.connectivity.subscribe();

        if connectivity.borrow_and_update().is_online() {
            coordinator.spawn_sync("startup");
            coordinator.spawn_revocation_refresh();
        }

        loop {
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *connectivity.borrow_and_update();
                    if current.is_online() {
                        coordinator.spawn_sync("connectivity restored");
                        coordinator.spawn_revocation_refresh();
                    }
                }
                event = store_events.recv() => match event {
                    Ok(StoreEvent::Appended { id }) => {
                        if ctx.connectivity.is_online() {
                            debug!("Log {} appended while online", id);
                            coordinator.spawn_sync("append");
                        }
                    }
                    Ok(StoreEvent::Cleared) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} store events; scheduling a full sync", missed);
                        coordinator.spawn_sync("lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!("Sync coordinator stopped");
    }

    /// Probe the remote authority on an interval
    async fn health_probe_job(coordinator: Arc<Self>, period: Duration) {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            coordinator.context.refresh_connectivity().await;
        }
    }

    /// Run a sync pass in the background
    ///
    /// A trigger that lands while another pass is running is skipped by the
    /// engine, which makes the running pass scan the pending set again.
    fn spawn_sync(&self, reason: &'static str) {
        let engine = self.context.sync_engine.clone();
        tokio::spawn(async move {
            match engine.sync_all().await {
                Ok(report) if report.skipped => debug!("Sync ({}) folded into running pass", reason),
                Ok(report) if report.offline => debug!("Sync ({}) deferred while offline", reason),
                Ok(report) => {
                    if report.attempted > 0 {
                        info!(
                            "Sync ({}) finished: {} synced, {} failed",
                            reason, report.synced, report.failed
                        );
                    }
                }
                Err(e) => error!("Sync ({}) failed: {}", reason, e),
            }
        });
    }

    fn spawn_revocation_refresh(&self) {
        let revocations = self.context.revocations.clone();
        let remote = Arc::clone(&self.context.remote);
        tokio::spawn(async move {
            if let Err(e) = revocations.refresh_from(remote.as_ref()).await {
                warn!("Revocation refresh failed: {}", e);
            }
        });
    }
}
