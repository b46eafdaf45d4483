use std::fs;
use std::path::PathBuf;

use crate::ClientConfig;
use crate::ClientError;
use crate::ClientResult;
use crate::CredentialStore;
use crate::EndpointStore;
use crate::NodeClient;

/// Configurable constructor for [`NodeClient`] instances.
///
/// The state directory is created on build; credentials fall back to
/// the admin-provided files until the registry rotates them.
pub struct NodeClientBuilder {
    state_dir: PathBuf,
    ca_file: PathBuf,
    cert_file: PathBuf,
    key_file: PathBuf,
    endpoints: Vec<String>,
    config: ClientConfig,
}

impl NodeClientBuilder {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ca_file: PathBuf::from("ca.crt"),
            cert_file: PathBuf::from("node.crt"),
            key_file: PathBuf::from("node.key"),
            endpoints: vec![],
            config: ClientConfig::default(),
        }
    }

    /// Path to the cluster root CA certificate.
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = path.into();
        self
    }

    /// Fallback certificate and key, as handed out by `AddNode`.
    pub fn credential_files(
        mut self,
        cert: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.cert_file = cert.into();
        self.key_file = key.into();
        self
    }

    /// Initial registry endpoints (`host:port`); superseded by the
    /// cached list once the node has talked to the cluster.
    pub fn endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn set_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ClientResult<NodeClient> {
        fs::create_dir_all(&self.state_dir).map_err(|source| ClientError::Io {
            path: self.state_dir.clone(),
            source,
        })?;

        let ca_pem = fs::read_to_string(&self.ca_file).map_err(|source| ClientError::Io {
            path: self.ca_file.clone(),
            source,
        })?;

        let credentials =
            CredentialStore::load(&self.state_dir, &self.cert_file, &self.key_file)?;
        let endpoints = EndpointStore::load(&self.state_dir, self.endpoints)?;

        NodeClient::assemble(ca_pem, credentials, endpoints, self.config)
    }
}
