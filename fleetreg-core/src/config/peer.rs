use std::net::SocketAddr;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::keys::validate_segment;
use crate::Error;
use crate::Result;

/// Identity and listener configuration for one registry peer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerConfig {
    /// Peer name; becomes the consensus member name and the server
    /// certificate CN. Required.
    #[serde(default)]
    pub name: String,

    /// State directory holding the token and key material.
    /// Default: "state"
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// Bootstrap token received out of band by a joining peer. Empty on
    /// the bootstrap peer, which generates a fresh secret instead.
    #[serde(default)]
    pub initial_token: String,

    /// File to read the bootstrap token from; takes precedence over
    /// `initial_token` when set.
    #[serde(default)]
    pub initial_token_file: String,

    /// Gateway address of an existing peer to join through. Empty on
    /// the bootstrap peer.
    #[serde(default)]
    pub join_url: String,

    /// The single mTLS listener for all four API surfaces.
    /// Default: 0.0.0.0:2382
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// `host:port` under which nodes reach this peer's gateway; written
    /// to `peer_agent_api/{name}` after startup. Required.
    #[serde(default)]
    pub advertise_host: String,

    /// Consensus peer URLs advertised when joining the membership.
    #[serde(default)]
    pub consensus_advertise_urls: Vec<String>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            dir: default_dir(),
            initial_token: String::new(),
            initial_token_file: String::new(),
            join_url: String::new(),
            listen_address: default_listen_address(),
            advertise_host: String::new(),
            consensus_advertise_urls: vec![],
        }
    }
}

impl PeerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "peer.name is required".into(),
            )));
        }
        validate_segment("peer.name", &self.name)
            .map_err(|e| Error::Config(ConfigError::Message(e.to_string())))?;

        if self.advertise_host.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "peer.advertise_host is required".into(),
            )));
        }

        if !self.join_url.is_empty() && self.consensus_advertise_urls.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "peer.consensus_advertise_urls is required when joining a cluster".into(),
            )));
        }

        Ok(())
    }

    /// The bootstrap token, from file when configured.
    pub fn bootstrap_token(&self) -> Result<Option<String>> {
        if !self.initial_token_file.is_empty() {
            let token = std::fs::read_to_string(&self.initial_token_file).map_err(|source| {
                crate::SystemError::Io {
                    path: PathBuf::from(&self.initial_token_file),
                    source,
                }
            })?;
            return Ok(Some(token.trim().to_string()));
        }
        if !self.initial_token.is_empty() {
            return Ok(Some(self.initial_token.clone()));
        }
        Ok(None)
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_listen_address() -> SocketAddr {
    "0.0.0.0:2382".parse().expect("valid default listen address")
}
