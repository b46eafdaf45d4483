//! Shared handler context: one [`Registry`] value backs all four API
//! surfaces on the gateway listener.

use std::sync::Arc;
use std::time::SystemTime;

use tonic::Request;
use tracing::info;

use fleetreg_core::ca::seconds_until_renewal;
use fleetreg_core::ca::PeerCertIdentity;
use fleetreg_core::ca::NODE_CERT_EXPIRY;
use fleetreg_core::config::RegistryConfig;
use fleetreg_core::keys::PEER_AGENT_API_NS;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::RangeRequest;
use fleetreg_core::Result;
use fleetreg_core::NODE_KEEPALIVE_TTL_SECS;
use fleetreg_proto::node::ConfigResponse;

use crate::authenticate_node;
use crate::presented_certificate;
use crate::NodeIdentity;
use crate::PeerState;

pub struct Registry<E> {
    pub(crate) kv: Arc<E>,
    pub(crate) state: Arc<PeerState>,
    pub(crate) config: RegistryConfig,
}

impl<E> Clone for Registry<E> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
            state: self.state.clone(),
            config: self.config.clone(),
        }
    }
}

impl<E: KvEngine> Registry<E> {
    pub fn new(kv: Arc<E>, state: Arc<PeerState>, config: RegistryConfig) -> Self {
        Self { kv, state, config }
    }

    pub fn kv(&self) -> &Arc<E> {
        &self.kv
    }

    /// Resolves the caller's certificate to a node identity.
    pub(crate) async fn authenticated_node<T>(
        &self,
        req: &Request<T>,
    ) -> Result<(PeerCertIdentity, NodeIdentity)> {
        let cert = presented_certificate(req)?;
        let identity = authenticate_node(self.kv.as_ref(), &cert).await?;
        Ok((cert, identity))
    }

    /// Every reachable registry gateway, as published by the peers.
    pub(crate) async fn registry_addrs(&self) -> Result<Vec<String>> {
        let prefix = format!("{PEER_AGENT_API_NS}/").into_bytes();
        let entries = self.kv.range(RangeRequest::prefix(prefix, 0)).await?;
        Ok(entries
            .into_iter()
            .map(|e| String::from_utf8_lossy(&e.value).into_owned())
            .collect())
    }

    /// Builds the `Config` response for a node: when the presented
    /// certificate is inside the final half of its life, fresh
    /// credentials ride along; otherwise the node is told when to check
    /// back.
    pub(crate) async fn node_config_response(
        &self,
        cert: &PeerCertIdentity,
        identity: &NodeIdentity,
    ) -> Result<ConfigResponse> {
        let renew_period = NODE_CERT_EXPIRY.as_secs() / 2;
        let renew_at =
            seconds_until_renewal(cert.not_after, NODE_CERT_EXPIRY, SystemTime::now());

        let mut response = ConfigResponse {
            certificate: None,
            key: None,
            renew_period_seconds: renew_period,
            heartbeat_period_seconds: NODE_KEEPALIVE_TTL_SECS / 2,
            registry_addrs: self.registry_addrs().await?,
        };

        if renew_at < 0 {
            let record = &identity.record;
            info!(
                datacenter = %record.datacenter,
                node = %record.name,
                "renewing node certificate"
            );
            let minted =
                self.state
                    .ca
                    .create_node_cert(&record.datacenter, &record.name, identity.role)?;
            response.certificate = Some(minted.cert_pem.into_bytes());
            response.key = Some(minted.key_pem.into_bytes());
        } else {
            response.renew_period_seconds = renew_at as u64;
        }

        Ok(response)
    }
}
