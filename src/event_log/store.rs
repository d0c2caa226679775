/// SQLite-backed event store implementation
use crate::{
    db::now_ms,
    error::VerifyLogResult,
    event_log::{LogStats, StoreEvent, VerificationLogRecord},
    metrics,
};
use sqlx::{Row, SqlitePool};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the store event channel; slow subscribers miss old events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Durable, append-only verification event store
#[derive(Clone)]
pub struct EventStore {
    db: SqlitePool,
    events: broadcast::Sender<StoreEvent>,
}

impl EventStore {
    /// Create a new event store over a migrated pool
    pub fn new(db: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { db, events }
    }

    #[cfg(test)]
    pub(crate) fn pool_for_tests(&self) -> &SqlitePool {
        &self.db
    }

    /// Subscribe to append/clear notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Append a structured verification result
    pub async fn append(&self, payload: &serde_json::Value) -> VerifyLogResult<i64> {
        let serialized = serde_json::to_string(payload)?;
        self.append_raw(&serialized).await
    }

    /// Append an already-serialized verification result
    pub async fn append_raw(&self, payload: &str) -> VerifyLogResult<i64> {
        let timestamp = now_ms();

        let row = sqlx::query(
            r#"
            INSERT INTO verification_logs (timestamp, payload, synced)
            VALUES (?1, ?2, 0)
            RETURNING id
            "#,
        )
        .bind(timestamp)
        .bind(payload)
        .fetch_one(&self.db)
        .await?;

        let id: i64 = row.try_get("id")?;

        metrics::LOGS_APPENDED_TOTAL.inc();
        metrics::PENDING_LOGS.inc();
        info!("Stored verification log {}", id);

        // Nobody listening is fine; sync will pick the record up later
        let _ = self.events.send(StoreEvent::Appended { id });

        Ok(id)
    }

    /// Every record in insertion order
    pub async fn list_all(&self) -> VerifyLogResult<Vec<VerificationLogRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, payload, synced
            FROM verification_logs
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Records not yet accepted by the remote authority, oldest first
    pub async fn list_pending(&self) -> VerifyLogResult<Vec<VerificationLogRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, payload, synced
            FROM verification_logs
            WHERE synced = 0
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }

    /// Get a single record
    pub async fn get(&self, id: i64) -> VerifyLogResult<Option<VerificationLogRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, timestamp, payload, synced
            FROM verification_logs
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_record).transpose()
    }

    /// Mark a record as accepted by the remote authority
    ///
    /// Idempotent. Returns true only when this call performed the transition.
    pub async fn mark_synced(&self, id: i64) -> VerifyLogResult<bool> {
        let result = sqlx::query("UPDATE verification_logs SET synced = 1 WHERE id = ?1 AND synced = 0")
            .bind(id)
            .execute(&self.db)
            .await?;

        let transitioned = result.rows_affected() > 0;
        if transitioned {
            metrics::PENDING_LOGS.dec();
            debug!("Marked log {} as synced", id);
        }

        Ok(transitioned)
    }

    /// Remove every record. Irreversible.
    pub async fn clear_all(&self) -> VerifyLogResult<u64> {
        let result = sqlx::query("DELETE FROM verification_logs")
            .execute(&self.db)
            .await?;

        metrics::PENDING_LOGS.set(0);
        info!("Cleared {} verification logs", result.rows_affected());
        let _ = self.events.send(StoreEvent::Cleared);

        Ok(result.rows_affected())
    }

    /// Total / synced / pending counters
    pub async fn stats(&self) -> VerifyLogResult<LogStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total, COALESCE(SUM(synced), 0) AS synced
            FROM verification_logs
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let total: i64 = row.try_get("total")?;
        let synced: i64 = row.try_get("synced")?;
        let stats = LogStats {
            total,
            synced,
            pending: total - synced,
        };
        metrics::PENDING_LOGS.set(stats.pending);

        Ok(stats)
    }

    /// Case-insensitive substring search over record ids and payloads
    pub async fn search(&self, filter: &str) -> VerifyLogResult<Vec<VerificationLogRecord>> {
        let all = self.list_all().await?;
        if filter.is_empty() {
            return Ok(all);
        }

        let needle = filter.to_lowercase();
        Ok(all
            .into_iter()
            .filter(|rec| {
                rec.payload.to_lowercase().contains(&needle) || rec.id.to_string().contains(&needle)
            })
            .collect())
    }
}

/// Convert database row to a record
fn row_to_record(row: sqlx::sqlite::SqliteRow) -> VerifyLogResult<VerificationLogRecord> {
    Ok(VerificationLogRecord {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        payload: row.try_get("payload")?,
        synced: row.try_get::<i64, _>("synced")? != 0,
    })
}
