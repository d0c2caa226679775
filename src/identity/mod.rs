/// Identity document caching and resolution
///
/// DID documents resolved through the remote verifier are kept in a bounded
/// local cache so that previously seen credentials can still be resolved
/// while offline.

pub mod cache;
pub mod resolver;

pub use cache::DidCache;
pub use resolver::{DidResolver, Resolution};

use serde::Serialize;

/// Default number of cached DID documents
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Cached DID document entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCacheEntry {
    pub did: String,
    pub document: serde_json::Value,
    /// Milliseconds since epoch of the last read or write
    pub last_accessed: i64,
    pub usage_count: i64,
}

impl DidCacheEntry {
    /// Entry for a freshly resolved document
    pub fn fresh(did: impl Into<String>, document: serde_json::Value) -> Self {
        Self {
            did: did.into(),
            document,
            last_accessed: crate::db::now_ms(),
            usage_count: 1,
        }
    }
}
