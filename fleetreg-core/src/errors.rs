//! Registry error hierarchy, categorized by operational concern.
//!
//! Internal code propagates these typed errors with `?`; the gRPC layer
//! converts them to `tonic::Status` exactly once, at the handler
//! boundary, through [`Error::into_status`].

use std::path::PathBuf;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (filesystem, serialization, tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// KV substrate failures
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Certificate-based identity failures
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Key material and certificate minting failures
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A create-guarded write lost to an earlier writer
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Malformed request fields
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Server-side conditions with no better category; surfaced as
    /// `Internal`
    #[error("internal: {0}")]
    Internal(String),

    /// Unrecoverable failures requiring process termination
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// Maps the error taxonomy onto gRPC status codes. Authentication
    /// failures are surfaced verbatim; substrate failures collapse to
    /// `Internal` so callers retry through their own background loops.
    pub fn into_status(self) -> tonic::Status {
        match self {
            Error::Auth(e) => {
                tracing::warn!("authentication failure: {e}");
                tonic::Status::unauthenticated("authentication failure")
            }
            Error::AlreadyExists(what) => tonic::Status::already_exists(what),
            Error::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
            other => {
                tracing::error!("internal error: {other}");
                tonic::Status::internal("internal server error")
            }
        }
    }
}

impl From<Error> for tonic::Status {
    fn from(e: Error) -> Self {
        e.into_status()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Disk I/O failures in a state directory
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization failures for persisted records
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Background task failures
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

/// Failures of the replicated KV substrate. All of these surface to
/// clients as `Internal`; the substrate adaptor logs the specifics.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("range failed: {0}")]
    Range(String),

    #[error("transaction failed: {0}")]
    Txn(String),

    #[error("lease grant failed: {0}")]
    LeaseGrant(String),

    #[error("lease {0} not found")]
    LeaseNotFound(i64),

    #[error("lease operation failed: {0}")]
    Lease(String),

    #[error("watch channel closed")]
    WatchClosed,

    #[error("optimistic transaction exhausted after {0} attempts")]
    TooManyRetries(usize),

    #[error("cluster membership operation failed: {0}")]
    Membership(String),

    #[error("substrate backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no peer certificate presented")]
    MissingCertificate,

    #[error("malformed peer certificate: {0}")]
    MalformedCertificate(String),

    #[error("node {datacenter}/{name} is not registered")]
    UnknownNode { datacenter: String, name: String },

    #[error("certificate role {actual} may not call this endpoint")]
    RoleMismatch { actual: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("certificate generation failed: {0}")]
    Mint(String),

    #[error("malformed bootstrap token")]
    MalformedToken,

    #[error("enrollment token rejected")]
    TokenRejected,

    #[error("certificate parse failed: {0}")]
    Parse(String),
}
