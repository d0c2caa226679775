/// Configuration management for the verification log client
use crate::error::{VerifyLogError, VerifyLogResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub did_cache: DidCacheConfig,
    pub connectivity: ConnectivityConfig,
    pub status: StatusConfig,
    pub logging: LoggingConfig,
}

/// Remote authority configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote authority, without trailing slash
    pub api_base: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Storage configuration
///
/// Each collection lives in its own database file so the stores stay
/// independently valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub event_log_db: PathBuf,
    pub did_cache_db: PathBuf,
    pub revocation_db: PathBuf,
}

/// DID document cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidCacheConfig {
    pub capacity: usize,
}

/// Connectivity probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Seconds between health probes; 0 disables the probe
    pub probe_interval_secs: u64,
}

/// Local status server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    pub port: Option<u16>,
    pub mock_port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> VerifyLogResult<Self> {
        dotenv::dotenv().ok();

        let api_base = env::var("VERIFYLOG_API_BASE")
            .unwrap_or_else(|_| "http://localhost:5000".to_string())
            .trim_end_matches('/')
            .to_string();
        let timeout_secs = env_or("VERIFYLOG_HTTP_TIMEOUT_SECS", 10, "HTTP timeout")?;
        let user_agent = env::var("VERIFYLOG_USER_AGENT")
            .unwrap_or_else(|_| format!("veriflog/{}", env!("CARGO_PKG_VERSION")));

        let data_directory: PathBuf = env::var("VERIFYLOG_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let event_log_db = env::var("VERIFYLOG_EVENT_LOG_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("event_log.sqlite"));
        let did_cache_db = env::var("VERIFYLOG_DID_CACHE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("did_cache.sqlite"));
        let revocation_db = env::var("VERIFYLOG_REVOCATION_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("revocations.sqlite"));

        let capacity = env_or("VERIFYLOG_DID_CACHE_CAPACITY", 100, "DID cache capacity")?;

        let probe_interval_secs = env_or("VERIFYLOG_PROBE_INTERVAL_SECS", 30, "probe interval")?;

        let port = match env::var("VERIFYLOG_STATUS_PORT") {
            Ok(p) => Some(
                p.parse()
                    .map_err(|_| VerifyLogError::Config("Invalid status port".to_string()))?,
            ),
            Err(_) => None,
        };
        let mock_port = env_or("VERIFYLOG_MOCK_PORT", 5000, "mock authority port")?;

        let level = env::var("RUST_LOG").unwrap_or_else(|_| "veriflog=info,tower_http=info".to_string());

        Ok(ClientConfig {
            remote: RemoteConfig {
                api_base,
                timeout_secs,
                user_agent,
            },
            storage: StorageConfig {
                data_directory,
                event_log_db,
                did_cache_db,
                revocation_db,
            },
            did_cache: DidCacheConfig { capacity },
            connectivity: ConnectivityConfig {
                probe_interval_secs,
            },
            status: StatusConfig { port, mock_port },
            logging: LoggingConfig { level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> VerifyLogResult<()> {
        if !(self.remote.api_base.starts_with("http://")
            || self.remote.api_base.starts_with("https://"))
        {
            return Err(VerifyLogError::Config(format!(
                "API base must be an http(s) URL, got '{}'",
                self.remote.api_base
            )));
        }

        if self.did_cache.capacity == 0 {
            return Err(VerifyLogError::Config(
                "DID cache capacity must be at least 1".to_string(),
            ));
        }

        if self.remote.timeout_secs == 0 {
            return Err(VerifyLogError::Config(
                "HTTP timeout must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }

    /// Build a configuration rooted at a data directory, used by tests and tools
    pub fn with_data_directory(api_base: &str, data_directory: PathBuf) -> Self {
        Self {
            remote: RemoteConfig {
                api_base: api_base.trim_end_matches('/').to_string(),
                timeout_secs: 10,
                user_agent: format!("veriflog/{}", env!("CARGO_PKG_VERSION")),
            },
            storage: StorageConfig {
                event_log_db: data_directory.join("event_log.sqlite"),
                did_cache_db: data_directory.join("did_cache.sqlite"),
                revocation_db: data_directory.join("revocations.sqlite"),
                data_directory,
            },
            did_cache: DidCacheConfig { capacity: 100 },
            connectivity: ConnectivityConfig {
                probe_interval_secs: 0,
            },
            status: StatusConfig {
                port: None,
                mock_port: 5000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

/// Numeric setting from the environment, falling back to `default` when unset
fn env_or<T: FromStr>(name: &str, default: T, what: &str) -> VerifyLogResult<T> {
    parse_setting(env::var(name).ok(), default, what)
}

fn parse_setting<T: FromStr>(value: Option<String>, default: T, what: &str) -> VerifyLogResult<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| VerifyLogError::Config(format!("Invalid {}: {}", what, raw))),
    }
}
