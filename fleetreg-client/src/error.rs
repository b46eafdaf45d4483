use std::path::PathBuf;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level connection failures
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    /// RPC-level rejections from the registry
    #[error(transparent)]
    Status(#[from] tonic::Status),

    /// Node state directory I/O failures
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unusable certificate or key material
    #[error("bad credentials: {0}")]
    BadCredentials(String),

    /// The endpoint pool is empty
    #[error("no registry endpoints configured")]
    NoEndpoints,
}
