/// DID Resolver - cache-first resolution with remote fallback
use crate::{
    connectivity::ConnectivityMonitor,
    error::{VerifyLogError, VerifyLogResult},
    identity::{DidCache, DidCacheEntry},
    metrics,
    remote::{RemoteAuthority, VerifyRequest},
    verifier,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub did: String,
    pub document: serde_json::Value,
    pub from_cache: bool,
}

/// Resolves credential identifiers to documents
///
/// Resolution order:
/// 1. Local bounded cache (works offline)
/// 2. Remote verifier, when online
/// 3. Cache the successful resolution
///
/// Cache failures are logged and treated as misses; they never fail a
/// resolution on their own.
#[derive(Clone)]
pub struct DidResolver {
    cache: DidCache,
    remote: Arc<dyn RemoteAuthority>,
    connectivity: ConnectivityMonitor,
}

impl DidResolver {
    pub fn new(
        cache: DidCache,
        remote: Arc<dyn RemoteAuthority>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            cache,
            remote,
            connectivity,
        }
    }

    pub fn cache(&self) -> &DidCache {
        &self.cache
    }

    /// Resolve the document for the credential carried by `payload`
    pub async fn resolve(&self, payload: &serde_json::Value) -> VerifyLogResult<Resolution> {
        let did = verifier::credential_id(payload)
            .ok_or_else(|| VerifyLogError::InvalidPayload("Missing credential ID".to_string()))?;

        match self.cache.get(&did).await {
            Ok(Some(entry)) => {
                metrics::record_cache_lookup("hit");
                debug!("DID cache hit for {} (used {} times)", did, entry.usage_count);
                return Ok(Resolution {
                    did,
                    document: entry.document,
                    from_cache: true,
                });
            }
            Ok(None) => metrics::record_cache_lookup("miss"),
            Err(e) => {
                metrics::record_cache_lookup("error");
                warn!("DID cache unavailable, treating {} as a miss: {}", did, e);
            }
        }

        if !self.connectivity.is_online() {
            return Err(VerifyLogError::NetworkUnreachable(format!(
                "offline and {} is not cached",
                did
            )));
        }

        let document = self
            .remote
            .verify(&VerifyRequest::Json(payload.clone()))
            .await?;

        if let Err(e) = self
            .cache
            .put(&DidCacheEntry::fresh(did.clone(), document.clone()))
            .await
        {
            warn!("Failed to cache document for {}: {}", did, e);
        }

        Ok(Resolution {
            did,
            document,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::Connectivity;
    use crate::db::{self, Collection};
    use crate::remote::fake::FakeAuthority;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    async fn create_test_resolver(
        online: bool,
    ) -> (DidResolver, Arc<FakeAuthority>, ConnectivityMonitor) {
        let db = db::create_memory_pool().await.unwrap();
        db::run_migrations(Collection::DidCache, &db).await.unwrap();

        let remote = Arc::new(FakeAuthority::new());
        let connectivity = ConnectivityMonitor::new(Connectivity::from_online(online));
        let resolver = DidResolver::new(
            DidCache::with_capacity(db, 10),
            remote.clone(),
            connectivity.clone(),
        );
        (resolver, remote, connectivity)
    }

    fn payload(id: &str) -> serde_json::Value {
        json!({ "credential": { "id": id, "credentialSubject": { "name": "Alice" } } })
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let (resolver, remote, _) = create_test_resolver(true).await;

        let first = resolver.resolve(&payload("cred-1")).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.did, "cred-1");

        let second = resolver.resolve(&payload("cred-1")).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.document, first.document);
        assert_eq!(remote.verify_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_documents_resolve_offline() {
        let (resolver, _, connectivity) = create_test_resolver(true).await;
        resolver.resolve(&payload("cred-2")).await.unwrap();

        connectivity.set_offline();
        let cached = resolver.resolve(&payload("cred-2")).await.unwrap();
        assert!(cached.from_cache);

        let err = resolver.resolve(&payload("cred-3")).await.unwrap_err();
        assert!(matches!(err, VerifyLogError::NetworkUnreachable(_)));
    }

    #[tokio::test]
    async fn test_subject_id_is_used_when_credential_id_is_absent() {
        let (resolver, _, _) = create_test_resolver(true).await;
        let payload = json!({ "credential": { "credentialSubject": { "id": "did:example:bob" } } });

        let resolution = resolver.resolve(&payload).await.unwrap();
        assert_eq!(resolution.did, "did:example:bob");
    }

    #[tokio::test]
    async fn test_missing_credential_id_is_rejected() {
        let (resolver, _, _) = create_test_resolver(true).await;
        let err = resolver.resolve(&json!({ "foo": 1 })).await.unwrap_err();
        assert!(matches!(err, VerifyLogError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_unavailable_cache_falls_back_to_remote() {
        let (resolver, remote, _) = create_test_resolver(true).await;
        resolver.cache.db_for_tests().close().await;

        let resolution = resolver.resolve(&payload("cred-4")).await.unwrap();
        assert!(!resolution.from_cache);
        assert_eq!(remote.verify_calls.load(Ordering::SeqCst), 1);
    }
}
