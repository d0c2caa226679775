/// Veriflog - offline-first verification log client
///
/// Records credential verification results in a durable local log and
/// reconciles them with a remote authority whenever connectivity allows.
/// Resolved documents and the revocation list are cached locally so that
/// verification keeps working while offline.

pub mod config;
pub mod connectivity;
pub mod context;
pub mod db;
pub mod error;
pub mod event_log;
pub mod identity;
pub mod jobs;
pub mod metrics;
pub mod mock_authority;
pub mod remote;
pub mod revocation;
pub mod server;
pub mod sync;
pub mod verifier;

pub use context::AppContext;
pub use error::{VerifyLogError, VerifyLogResult};
