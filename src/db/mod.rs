/// Database layer for the verification log client
///
/// Manages SQLite connections and the embedded migrations of the three
/// independent local collections: event log, DID cache and revocations.
use crate::error::VerifyLogResult;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

static EVENT_LOG_MIGRATOR: Migrator = sqlx::migrate!("./migrations/event_log");
static DID_CACHE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/did_cache");
static REVOCATION_MIGRATOR: Migrator = sqlx::migrate!("./migrations/revocations");

/// A local collection with its own schema history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    EventLog,
    DidCache,
    Revocations,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::EventLog => "event_log",
            Collection::DidCache => "did_cache",
            Collection::Revocations => "revocations",
        }
    }

    fn migrator(&self) -> &'static Migrator {
        match self {
            Collection::EventLog => &EVENT_LOG_MIGRATOR,
            Collection::DidCache => &DID_CACHE_MIGRATOR,
            Collection::Revocations => &REVOCATION_MIGRATOR,
        }
    }
}

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> VerifyLogResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Create a private in-memory database
///
/// Pinned to a single connection that never expires, since every SQLite
/// in-memory connection is its own database.
pub async fn create_memory_pool() -> VerifyLogResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::new().in_memory(true))
        .await?;

    Ok(pool)
}

/// Open a collection's database file and bring its schema up to date
pub async fn open_collection(
    collection: Collection,
    path: &Path,
    options: DatabaseOptions,
) -> VerifyLogResult<SqlitePool> {
    let pool = create_pool(path, options).await?;
    run_migrations(collection, &pool).await?;
    test_connection(&pool).await?;
    Ok(pool)
}

/// Run the additive migrations of one collection
pub async fn run_migrations(collection: Collection, pool: &SqlitePool) -> VerifyLogResult<()> {
    collection.migrator().run(pool).await?;
    tracing::debug!("{} schema up to date", collection.as_str());
    Ok(())
}

/// Latest applied schema version of a collection, if any
pub async fn schema_version(pool: &SqlitePool) -> VerifyLogResult<Option<i64>> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(version)
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> VerifyLogResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
