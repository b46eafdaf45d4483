use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Connection parameters for the consensus KV substrate.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubstrateConfig {
    /// Client endpoints of the consensus ensemble.
    /// Default: ["http://127.0.0.1:2379"]
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Connect timeout in milliseconds. Default: 3000
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per-request timeout in milliseconds. Default: 5000
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Authenticate to the substrate with the peer's server certificate
    /// over TLS. Default: false (plaintext loopback ensembles)
    #[serde(default)]
    pub tls: bool,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            tls: false,
        }
    }
}

impl SubstrateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "substrate.endpoints must contain at least one endpoint".into(),
            )));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "substrate timeouts must be non-zero".into(),
            )));
        }
        Ok(())
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    5000
}
