//! Registry peer configuration.
//!
//! Hierarchical loading with the usual precedence: struct defaults,
//! then the TOML file named by `CONFIG_PATH`, then `FLEETREG__`
//! environment variables. Validation is explicit and separate so
//! overrides can be layered before it runs.

mod peer;
mod substrate;

pub use peer::*;
pub use substrate::*;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RegistryConfig {
    /// This peer's identity, listeners and state directory
    pub peer: PeerConfig,
    /// The consensus KV substrate the data plane runs against
    pub substrate: SubstrateConfig,
}

impl RegistryConfig {
    /// Loads configuration without validating it; call [`validate`]
    /// before use.
    ///
    /// [`validate`]: RegistryConfig::validate
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("FLEETREG")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("peer.consensus_advertise_urls")
                .with_list_parse_key("substrate.endpoints"),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.peer.validate()?;
        self.substrate.validate()?;
        Ok(())
    }
}
