/// Application context and dependency injection
use crate::{
    config::ClientConfig,
    connectivity::{Connectivity, ConnectivityMonitor},
    db::{self, Collection, DatabaseOptions},
    error::{VerifyLogError, VerifyLogResult},
    event_log::EventStore,
    identity::{DidCache, DidResolver},
    jobs,
    remote::{HttpAuthority, RemoteAuthority},
    revocation::RevocationCache,
    sync::SyncEngine,
    verifier::Verifier,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Shared client services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ClientConfig>,
    pub remote: Arc<dyn RemoteAuthority>,
    pub connectivity: ConnectivityMonitor,
    pub event_store: EventStore,
    pub revocations: RevocationCache,
    pub resolver: DidResolver,
    pub sync_engine: SyncEngine,
    pub verifier: Verifier,
}

impl AppContext {
    /// Create a context talking to the configured remote authority
    pub async fn new(config: ClientConfig) -> VerifyLogResult<Self> {
        config.validate()?;
        let remote: Arc<dyn RemoteAuthority> = Arc::new(HttpAuthority::new(&config.remote)?);
        Self::with_remote(config, remote).await
    }

    /// Open the local collections and wire them to `remote`
    ///
    /// The initial connectivity state comes from one health probe.
    pub async fn with_remote(
        config: ClientConfig,
        remote: Arc<dyn RemoteAuthority>,
    ) -> VerifyLogResult<Self> {
        Self::ensure_directories(&config).await?;

        let storage = &config.storage;
        let event_log_db =
            db::open_collection(Collection::EventLog, &storage.event_log_db, DatabaseOptions::default()).await?;
        let did_cache_db =
            db::open_collection(Collection::DidCache, &storage.did_cache_db, DatabaseOptions::default()).await?;
        let revocation_db =
            db::open_collection(Collection::Revocations, &storage.revocation_db, DatabaseOptions::default())
                .await?;

        let initial = jobs::probe(remote.as_ref()).await;
        info!(
            "Remote authority {} is {}",
            config.remote.api_base,
            if initial.is_online() { "reachable" } else { "unreachable" }
        );

        Ok(Self::from_parts(
            config,
            remote,
            ConnectivityMonitor::new(initial),
            event_log_db,
            did_cache_db,
            revocation_db,
        ))
    }

    /// Assemble a context from already migrated pools
    pub fn from_parts(
        config: ClientConfig,
        remote: Arc<dyn RemoteAuthority>,
        connectivity: ConnectivityMonitor,
        event_log_db: SqlitePool,
        did_cache_db: SqlitePool,
        revocation_db: SqlitePool,
    ) -> Self {
        let event_store = EventStore::new(event_log_db);
        let revocations = RevocationCache::new(revocation_db);
        let resolver = DidResolver::new(
            DidCache::with_capacity(did_cache_db, config.did_cache.capacity),
            Arc::clone(&remote),
            connectivity.clone(),
        );
        let sync_engine = SyncEngine::new(event_store.clone(), Arc::clone(&remote), connectivity.clone());
        let verifier = Verifier::new(
            Arc::clone(&remote),
            resolver.clone(),
            revocations.clone(),
            event_store.clone(),
            connectivity.clone(),
        );

        Self {
            config: Arc::new(config),
            remote,
            connectivity,
            event_store,
            revocations,
            resolver,
            sync_engine,
            verifier,
        }
    }

    pub fn did_cache(&self) -> &DidCache {
        self.resolver.cache()
    }

    /// Re-probe the remote authority and record the result
    pub async fn refresh_connectivity(&self) -> Connectivity {
        let observed = jobs::probe(self.remote.as_ref()).await;
        self.connectivity.report(observed);
        observed
    }

    async fn ensure_directories(config: &ClientConfig) -> VerifyLogResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                VerifyLogError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }
}

/// In-memory context around a scripted remote authority
#[cfg(test)]
pub(crate) async fn test_context(
    remote: Arc<crate::remote::fake::FakeAuthority>,
    initial: Connectivity,
) -> AppContext {
    async fn pool(collection: Collection) -> SqlitePool {
        let pool = db::create_memory_pool().await.unwrap();
        db::run_migrations(collection, &pool).await.unwrap();
        pool
    }

    let config = ClientConfig::with_data_directory("http://localhost:5000", std::env::temp_dir());
    AppContext::from_parts(
        config,
        remote,
        ConnectivityMonitor::new(initial),
        pool(Collection::EventLog).await,
        pool(Collection::DidCache).await,
        pool(Collection::Revocations).await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeAuthority;
    use serde_json::json;

    #[tokio::test]
    async fn test_with_remote_opens_collections_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::with_data_directory("http://localhost:5000", dir.path().join("data"));
        let ctx = AppContext::with_remote(config, Arc::new(FakeAuthority::new()))
            .await
            .unwrap();

        assert!(ctx.connectivity.is_online());
        assert!(dir.path().join("data").join("event_log.sqlite").exists());
        assert!(dir.path().join("data").join("did_cache.sqlite").exists());
        assert!(dir.path().join("data").join("revocations.sqlite").exists());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::with_data_directory("http://localhost:5000", dir.path().to_path_buf());

        let first = AppContext::with_remote(config.clone(), Arc::new(FakeAuthority::new()))
            .await
            .unwrap();
        let id = first.event_store.append(&json!({ "verified": true })).await.unwrap();
        drop(first);

        let second = AppContext::with_remote(config, Arc::new(FakeAuthority::new()))
            .await
            .unwrap();
        let record = second.event_store.get(id).await.unwrap().unwrap();
        assert!(!record.synced);
        assert_eq!(record.payload_value().unwrap(), json!({ "verified": true }));
    }

    #[tokio::test]
    async fn test_did_cache_uses_configured_capacity() {
        let ctx = test_context(Arc::new(FakeAuthority::new()), Connectivity::Online).await;
        assert_eq!(ctx.did_cache().capacity(), 100);
    }
}
