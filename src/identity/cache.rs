/// DID Cache - bounded SQLite store for resolved DID documents
use crate::{
    db::now_ms,
    error::VerifyLogResult,
    identity::{DidCacheEntry, DEFAULT_CACHE_CAPACITY},
    metrics,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

/// Capacity-bounded DID document cache
///
/// Every `put` that pushes the entry count over capacity evicts exactly one
/// entry: the one with the smallest `last_accessed`, oldest insertion first
/// on ties. There is no TTL.
#[derive(Clone)]
pub struct DidCache {
    db: SqlitePool,
    capacity: usize,
}

impl DidCache {
    /// Create a cache with the default capacity
    pub fn new(db: SqlitePool) -> Self {
        Self::with_capacity(db, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache with a custom capacity
    pub fn with_capacity(db: SqlitePool, capacity: usize) -> Self {
        Self {
            db,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub(crate) fn db_for_tests(&self) -> &SqlitePool {
        &self.db
    }

    /// Get a cached document, refreshing its recency and usage count
    pub async fn get(&self, did: &str) -> VerifyLogResult<Option<DidCacheEntry>> {
        let row = sqlx::query(
            r#"
            UPDATE did_cache
            SET last_accessed = ?2, usage_count = usage_count + 1
            WHERE did = ?1
            RETURNING did, document, last_accessed, usage_count
            "#,
        )
        .bind(did)
        .bind(now_ms())
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => self.decode_or_discard(row).await,
            None => Ok(None),
        }
    }

    /// Read an entry without touching its recency
    pub async fn peek(&self, did: &str) -> VerifyLogResult<Option<DidCacheEntry>> {
        let row = sqlx::query(
            r#"
            SELECT did, document, last_accessed, usage_count
            FROM did_cache
            WHERE did = ?1
            "#,
        )
        .bind(did)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => self.decode_or_discard(row).await,
            None => Ok(None),
        }
    }

    /// Insert or replace an entry, evicting at most one entry when over capacity
    ///
    /// The victim is chosen among the entries already present, never the one
    /// just written. Replacing a key keeps its usage count growing. Returns the
    /// key of the evicted entry, if any.
    pub async fn put(&self, entry: &DidCacheEntry) -> VerifyLogResult<Option<String>> {
        let document = serde_json::to_string(&entry.document)?;

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO did_cache (did, document, last_accessed, usage_count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(did) DO UPDATE SET
                document = excluded.document,
                last_accessed = excluded.last_accessed,
                usage_count = MAX(did_cache.usage_count + 1, excluded.usage_count)
            "#,
        )
        .bind(&entry.did)
        .bind(&document)
        .bind(entry.last_accessed)
        .bind(entry.usage_count)
        .execute(&mut *tx)
        .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM did_cache")
            .fetch_one(&mut *tx)
            .await?;

        let mut evicted = None;
        if count as usize > self.capacity {
            let oldest: Option<String> = sqlx::query_scalar(
                r#"
                SELECT did FROM did_cache
                WHERE did != ?1
                ORDER BY last_accessed ASC, rowid ASC
                LIMIT 1
                "#,
            )
            .bind(&entry.did)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(did) = oldest {
                sqlx::query("DELETE FROM did_cache WHERE did = ?1")
                    .bind(&did)
                    .execute(&mut *tx)
                    .await?;
                evicted = Some(did);
            }
        }

        tx.commit().await?;

        if let Some(did) = &evicted {
            metrics::DID_CACHE_EVICTIONS_TOTAL.inc();
            debug!("Evicted {} from DID cache", did);
        }

        Ok(evicted)
    }

    /// Number of cached entries
    pub async fn len(&self) -> VerifyLogResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM did_cache")
            .fetch_one(&self.db)
            .await?;
        Ok(count as usize)
    }

    pub async fn is_empty(&self) -> VerifyLogResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Delete DID document from cache
    pub async fn remove(&self, did: &str) -> VerifyLogResult<()> {
        sqlx::query("DELETE FROM did_cache WHERE did = ?1")
            .bind(did)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Decode a row; a corrupted document is dropped and reported as a miss
    async fn decode_or_discard(
        &self,
        row: sqlx::sqlite::SqliteRow,
    ) -> VerifyLogResult<Option<DidCacheEntry>> {
        let did: String = row.try_get("did")?;
        let raw: String = row.try_get("document")?;

        match serde_json::from_str(&raw) {
            Ok(document) => Ok(Some(DidCacheEntry {
                did,
                document,
                last_accessed: row.try_get("last_accessed")?,
                usage_count: row.try_get("usage_count")?,
            })),
            Err(e) => {
                warn!("Discarding corrupted DID cache entry {}: {}", did, e);
                self.remove(&did).await?;
                Ok(None)
            }
        }
    }
}
