//! Peer assembly and run loop.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;

use fleetreg_core::config::RegistryConfig;
use fleetreg_core::kv::ClusterApi;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::Error;
use fleetreg_core::Result;

use crate::join_cluster;
use crate::publish_agent_api_addr;
use crate::start_gateway;
use crate::substrate::EtcdKv;
use crate::substrate::EtcdTlsMaterial;
use crate::PeerState;
use crate::Registry;

/// Builds a [`RegistryPeer`] out of configuration: state directory,
/// optional cluster join, substrate connection.
pub struct PeerBuilder {
    config: RegistryConfig,
    shutdown_signal: watch::Receiver<()>,
}

impl PeerBuilder {
    pub fn new(config: RegistryConfig, shutdown_signal: watch::Receiver<()>) -> Self {
        Self {
            config,
            shutdown_signal,
        }
    }

    pub async fn build(self) -> Result<RegistryPeer<EtcdKv>> {
        self.config.validate()?;
        let state = Arc::new(PeerState::load(&self.config.peer)?);

        if !self.config.peer.join_url.is_empty() {
            // A failed join is not fatal: the peer keeps starting and
            // may crash later if the substrate refuses it.
            match join_cluster(
                &state.ca,
                &state.server_cert,
                &self.config.peer.join_url,
                &self.config.peer.consensus_advertise_urls,
            )
            .await
            {
                Ok(peers) => {
                    info!(members = peers.len(), "cluster join accepted");
                }
                Err(e) => {
                    warn!("failed to join cluster: {e}");
                    warn!("continuing with registry startup, server may crash");
                }
            }
        }

        let tls = self.config.substrate.tls.then(|| EtcdTlsMaterial {
            ca_pem: state.ca.root_cert_pem(),
            cert_pem: state.server_cert.cert_pem.clone(),
            key_pem: state.server_cert.key_pem.clone(),
        });
        let kv = EtcdKv::connect(&self.config.substrate, tls)
            .await
            .map_err(|e| Error::Fatal(format!("substrate connection failed: {e}")))?;

        Ok(RegistryPeer {
            registry: Registry::new(Arc::new(kv), state, self.config),
            shutdown_signal: self.shutdown_signal,
        })
    }
}

pub struct RegistryPeer<E> {
    registry: Registry<E>,
    shutdown_signal: watch::Receiver<()>,
}

impl<E> RegistryPeer<E>
where
    E: KvEngine + ClusterApi,
{
    /// Serves the gateway until the shutdown signal fires. The peer's
    /// reachable address is published once the listener is up.
    pub async fn run(self) -> Result<()> {
        let registry = self.registry.clone();
        let listen_address = registry.config.peer.listen_address;

        let gateway = tokio::spawn(start_gateway(
            self.registry,
            listen_address,
            self.shutdown_signal,
        ));

        publish_agent_api_addr(
            registry.kv().as_ref(),
            &registry.config.peer.name,
            &registry.config.peer.advertise_host,
        )
        .await
        .unwrap_or_else(|e| {
            error!("failed to publish agent API address: {e}");
        });

        gateway
            .await
            .map_err(|e| Error::System(fleetreg_core::SystemError::TaskFailed(e.to_string())))?
    }
}
