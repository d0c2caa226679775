//! Revocation Cache
//!
//! A local snapshot of the remote revocation list. The snapshot is replaced
//! wholesale on every successful refresh and is only as fresh as that
//! refresh: an id that is not found is "not known to be revoked", never
//! "confirmed valid".

use crate::{
    error::{VerifyLogError, VerifyLogResult},
    metrics,
    remote::RemoteAuthority,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

/// One revoked credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of a local revocation lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationStatus {
    Revoked { reason: Option<String> },
    /// Absent from the snapshot; may still be revoked remotely
    NotKnownRevoked,
}

impl RevocationStatus {
    pub fn is_revoked(&self) -> bool {
        matches!(self, RevocationStatus::Revoked { .. })
    }

    /// Label stored alongside verification results
    pub fn label(&self) -> &'static str {
        match self {
            RevocationStatus::Revoked { .. } => "revoked",
            RevocationStatus::NotKnownRevoked => "good",
        }
    }
}

/// Validate a remote revocation list
///
/// The list must be a JSON array of objects with a non-empty string `id` and
/// an optional string (or null) `reason`. Any violation rejects the whole
/// list.
pub fn parse_revocation_list(value: &Value) -> VerifyLogResult<Vec<RevocationEntry>> {
    let items = value.as_array().ok_or_else(|| {
        VerifyLogError::InvalidRemoteData(format!(
            "revocation list must be an array, got {}",
            json_kind(value)
        ))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let obj = item.as_object().ok_or_else(|| {
                VerifyLogError::InvalidRemoteData(format!(
                    "revocation entry {} is {}, expected an object",
                    index,
                    json_kind(item)
                ))
            })?;

            let id = obj
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    VerifyLogError::InvalidRemoteData(format!(
                        "revocation entry {} has no string id",
                        index
                    ))
                })?;

            let reason = match obj.get("reason") {
                None | Some(Value::Null) => None,
                Some(Value::String(reason)) => Some(reason.clone()),
                Some(other) => {
                    return Err(VerifyLogError::InvalidRemoteData(format!(
                        "revocation entry {} has a {} reason",
                        index,
                        json_kind(other)
                    )))
                }
            };

            Ok(RevocationEntry {
                id: id.to_string(),
                reason,
            })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Locally replicated revocation snapshot
#[derive(Clone)]
pub struct RevocationCache {
    db: SqlitePool,
}

impl RevocationCache {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Replace the snapshot with a remote list
    ///
    /// Malformed input fails with `InvalidRemoteData` and leaves the current
    /// snapshot untouched.
    pub async fn refresh(&self, remote_list: &Value) -> VerifyLogResult<usize> {
        let entries = match parse_revocation_list(remote_list) {
            Ok(entries) => entries,
            Err(e) => {
                metrics::record_revocation_refresh("invalid");
                warn!("Rejected revocation list: {}", e);
                return Err(e);
            }
        };

        self.replace_all(&entries).await
    }

    /// Replace the snapshot in a single transaction
    pub async fn replace_all(&self, entries: &[RevocationEntry]) -> VerifyLogResult<usize> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM revocations")
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO revocations (id, reason)
                VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET reason = excluded.reason
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.reason)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let count = self.len().await?;
        metrics::record_revocation_refresh("replaced");
        info!("Revocation list cached: {} entries", count);

        Ok(count)
    }

    /// Fetch the list from the remote authority and replace the snapshot
    ///
    /// Network or remote failures leave the snapshot as it was.
    pub async fn refresh_from(&self, remote: &dyn RemoteAuthority) -> VerifyLogResult<usize> {
        let list = match remote.fetch_revocations().await {
            Ok(list) => list,
            Err(e) => {
                metrics::record_revocation_refresh("unreachable");
                warn!("Failed to update revocation list: {}", e);
                return Err(e);
            }
        };

        self.refresh(&list).await
    }

    pub async fn is_revoked(&self, id: &str) -> VerifyLogResult<bool> {
        Ok(self.status(id).await?.is_revoked())
    }

    pub async fn reason_for(&self, id: &str) -> VerifyLogResult<Option<String>> {
        match self.status(id).await? {
            RevocationStatus::Revoked { reason } => Ok(reason),
            RevocationStatus::NotKnownRevoked => Ok(None),
        }
    }

    /// Look an id up in the current snapshot
    pub async fn status(&self, id: &str) -> VerifyLogResult<RevocationStatus> {
        let row = sqlx::query("SELECT reason FROM revocations WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        match row {
            Some(row) => Ok(RevocationStatus::Revoked {
                reason: row.try_get("reason")?,
            }),
            None => Ok(RevocationStatus::NotKnownRevoked),
        }
    }

    /// Every entry of the snapshot, ordered by id
    pub async fn list_all(&self) -> VerifyLogResult<Vec<RevocationEntry>> {
        let rows = sqlx::query("SELECT id, reason FROM revocations ORDER BY id ASC")
            .fetch_all(&self.db)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RevocationEntry {
                    id: row.try_get("id")?,
                    reason: row.try_get("reason")?,
                })
            })
            .collect()
    }

    pub async fn len(&self) -> VerifyLogResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM revocations")
            .fetch_one(&self.db)
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, Collection};
    use crate::remote::fake::FakeAuthority;
    use serde_json::json;

    async fn create_test_cache() -> RevocationCache {
        let db = db::create_memory_pool().await.unwrap();
        db::run_migrations(Collection::Revocations, &db).await.unwrap();
        RevocationCache::new(db)
    }

    async fn seeded() -> RevocationCache {
        let cache = create_test_cache().await;
        cache
            .refresh(&json!([
                { "id": "cred123", "reason": "Compromised" },
                { "id": "cred999", "reason": "Expired" },
                { "id": "cred000" }
            ]))
            .await
            .unwrap();
        cache
    }

    #[tokio::test]
    async fn test_refresh_and_lookup() {
        let cache = seeded().await;

        assert!(cache.is_revoked("cred123").await.unwrap());
        assert_eq!(
            cache.reason_for("cred999").await.unwrap().as_deref(),
            Some("Expired")
        );
        assert!(cache.is_revoked("cred000").await.unwrap());
        assert_eq!(cache.reason_for("cred000").await.unwrap(), None);
        assert_eq!(
            cache.status("unknown").await.unwrap(),
            RevocationStatus::NotKnownRevoked
        );
    }

    #[tokio::test]
    async fn test_refresh_replaces_whole_snapshot() {
        let cache = seeded().await;
        cache
            .refresh(&json!([{ "id": "cred555", "reason": null }]))
            .await
            .unwrap();

        assert!(!cache.is_revoked("cred123").await.unwrap());
        assert!(cache.is_revoked("cred555").await.unwrap());
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_list_clears_snapshot() {
        let cache = seeded().await;
        assert_eq!(cache.refresh(&json!([])).await.unwrap(), 0);
        assert!(cache.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_input_leaves_snapshot_untouched() {
        let cache = seeded().await;
        let before = cache.list_all().await.unwrap();

        let malformed = [
            json!({ "id": "cred123" }),
            json!("[]"),
            json!(null),
            json!([{ "id": "ok" }, 42]),
            json!([{ "reason": "no id" }]),
            json!([{ "id": 7 }]),
            json!([{ "id": "x", "reason": 3 }]),
        ];

        for input in malformed.iter() {
            let err = cache.refresh(input).await.unwrap_err();
            assert!(matches!(err, VerifyLogError::InvalidRemoteData(_)), "{}", input);
        }

        assert_eq!(cache.list_all().await.unwrap(), before);
        for entry in &before {
            assert!(cache.is_revoked(&entry.id).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_last_reason() {
        let cache = create_test_cache().await;
        cache
            .refresh(&json!([
                { "id": "dup", "reason": "first" },
                { "id": "dup", "reason": "second" }
            ]))
            .await
            .unwrap();
        assert_eq!(cache.len().await.unwrap(), 1);
        assert_eq!(cache.reason_for("dup").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_unreachable_remote_keeps_snapshot() {
        let cache = seeded().await;
        let remote = FakeAuthority::new();

        let err = cache.refresh_from(&remote).await.unwrap_err();
        assert!(matches!(err, VerifyLogError::NetworkUnreachable(_)));
        assert_eq!(cache.len().await.unwrap(), 3);

        remote.set_revocations(Some(json!([{ "id": "fresh" }])));
        assert_eq!(cache.refresh_from(&remote).await.unwrap(), 1);
        assert!(cache.is_revoked("fresh").await.unwrap());
    }
}
