//! The node's connection to the registry cluster.
//!
//! tonic has no per-handshake certificate callback, so rotation works
//! by rebuilding the channel: the credential store and endpoint pool
//! hold current state, and [`NodeClient::rebuild_channel`] folds both
//! into a fresh balanced channel that subsequent calls pick up through
//! the swap.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tonic::transport::Certificate;
use tonic::transport::Channel;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Endpoint;
use tracing::info;
use tracing::warn;

use fleetreg_core::ca::CLUSTER_SERVICE_NAME;
use fleetreg_core::NODE_KEEPALIVE_TTL_SECS;
use fleetreg_proto::agent::agent_api_client::AgentApiClient;
use fleetreg_proto::agent::DeregisterServiceRequest;
use fleetreg_proto::agent::DiscoverRequest;
use fleetreg_proto::agent::DiscoverResponse;
use fleetreg_proto::agent::RegisterServiceRequest;
use fleetreg_proto::agent::RegisterServiceResponse;
use fleetreg_proto::agent::ResetRequest;
use fleetreg_proto::node::node_api_client::NodeApiClient;
use fleetreg_proto::node::ConfigRequest;
use fleetreg_proto::node::ConfigResponse;
use fleetreg_proto::node::HeartbeatRequest;
use fleetreg_proto::observer::observer_api_client::ObserverApiClient;
use fleetreg_proto::observer::GetDatacenterServicesResponse;
use fleetreg_proto::observer::WatchDatacenterServicesRequest;
use fleetreg_proto::observer::WatchDatacenterServicesResponse;

use crate::ClientResult;
use crate::CredentialStore;
use crate::EndpointStore;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Clone)]
pub struct NodeClient {
    inner: Arc<NodeClientInner>,
}

pub(crate) struct NodeClientInner {
    pub(crate) ca_pem: String,
    pub(crate) credentials: CredentialStore,
    pub(crate) endpoints: EndpointStore,
    pub(crate) config: ClientConfig,
    channel: ArcSwap<Channel>,
    heartbeat_period_secs: AtomicU32,
}

impl NodeClient {
    pub(crate) fn assemble(
        ca_pem: String,
        credentials: CredentialStore,
        endpoints: EndpointStore,
        config: ClientConfig,
    ) -> ClientResult<Self> {
        let channel = build_channel(&ca_pem, &credentials, &endpoints, &config)?;
        Ok(Self {
            inner: Arc::new(NodeClientInner {
                ca_pem,
                credentials,
                endpoints,
                config,
                channel: ArcSwap::from_pointee(channel),
                heartbeat_period_secs: AtomicU32::new(NODE_KEEPALIVE_TTL_SECS / 2),
            }),
        })
    }

    fn channel(&self) -> Channel {
        self.inner.channel.load().as_ref().clone()
    }

    /// Rebuilds the balanced channel from current credentials and
    /// endpoints; in-flight calls keep the channel they started with.
    pub fn rebuild_channel(&self) -> ClientResult<()> {
        let channel = build_channel(
            &self.inner.ca_pem,
            &self.inner.credentials,
            &self.inner.endpoints,
            &self.inner.config,
        )?;
        self.inner.channel.store(Arc::new(channel));
        Ok(())
    }

    /// Seconds between heartbeats, as last instructed by the registry.
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(u64::from(
            self.inner.heartbeat_period_secs.load(Ordering::Relaxed),
        ))
    }

    /// One `Config` round trip, applying whatever it returns: rotated
    /// credentials are installed and the endpoint pool is refreshed,
    /// each followed by a channel rebuild. Returns the server-suggested
    /// delay until the next call.
    pub async fn refresh_config(&self) -> ClientResult<Duration> {
        let response = self.config().await?;

        let mut rebuild = false;

        if let (Some(cert), Some(key)) = (&response.certificate, &response.key) {
            let cert = String::from_utf8_lossy(cert);
            let key = String::from_utf8_lossy(key);
            match self.inner.credentials.update(&cert, &key) {
                Ok(()) => {
                    info!("installed rotated node credentials");
                    rebuild = true;
                }
                Err(e) => warn!("failed to install rotated credentials: {e}"),
            }
        }

        if !response.registry_addrs.is_empty() {
            let before = self.inner.endpoints.snapshot();
            self.inner.endpoints.update(response.registry_addrs.clone());
            rebuild |= before != self.inner.endpoints.snapshot();
        }

        if response.heartbeat_period_seconds > 0 {
            self.inner
                .heartbeat_period_secs
                .store(response.heartbeat_period_seconds, Ordering::Relaxed);
        }

        if rebuild {
            self.rebuild_channel()?;
        }

        Ok(Duration::from_secs(response.renew_period_seconds))
    }

    pub async fn config(&self) -> ClientResult<ConfigResponse> {
        let mut client = NodeApiClient::new(self.channel());
        Ok(client.config(ConfigRequest {}).await?.into_inner())
    }

    pub async fn heartbeat(&self) -> ClientResult<()> {
        let mut client = NodeApiClient::new(self.channel());
        client.heartbeat(HeartbeatRequest {}).await?;
        Ok(())
    }

    pub async fn register(
        &self,
        request: RegisterServiceRequest,
    ) -> ClientResult<RegisterServiceResponse> {
        let mut client = AgentApiClient::new(self.channel());
        Ok(client.register(request).await?.into_inner())
    }

    pub async fn deregister(&self, service: &str, instance: &str) -> ClientResult<()> {
        let mut client = AgentApiClient::new(self.channel());
        client
            .deregister(DeregisterServiceRequest {
                service: service.to_string(),
                instance: instance.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Drops this node's lease; the registry evicts everything the
    /// node had registered. Called from cleanup paths on shutdown.
    pub async fn reset(&self) -> ClientResult<()> {
        let mut client = AgentApiClient::new(self.channel());
        client.reset(ResetRequest {}).await?;
        Ok(())
    }

    pub async fn discover(&self, request: DiscoverRequest) -> ClientResult<DiscoverResponse> {
        let mut client = AgentApiClient::new(self.channel());
        Ok(client.discover(request).await?.into_inner())
    }

    pub async fn get_datacenter_services(
        &self,
    ) -> ClientResult<GetDatacenterServicesResponse> {
        let mut client = ObserverApiClient::new(self.channel());
        Ok(client
            .get_datacenter_services(
                fleetreg_proto::observer::GetDatacenterServicesRequest {},
            )
            .await?
            .into_inner())
    }

    pub async fn watch_datacenter_services(
        &self,
    ) -> ClientResult<tonic::Streaming<WatchDatacenterServicesResponse>> {
        let mut client = ObserverApiClient::new(self.channel());
        Ok(client
            .watch_datacenter_services(WatchDatacenterServicesRequest {})
            .await?
            .into_inner())
    }
}

fn build_channel(
    ca_pem: &str,
    credentials: &CredentialStore,
    endpoints: &EndpointStore,
    config: &ClientConfig,
) -> ClientResult<Channel> {
    let tls = ClientTlsConfig::new()
        .domain_name(CLUSTER_SERVICE_NAME)
        .ca_certificate(Certificate::from_pem(ca_pem))
        .identity(credentials.identity());

    let addrs = endpoints.snapshot();
    if addrs.is_empty() {
        return Err(crate::ClientError::NoEndpoints);
    }

    let mut targets = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let endpoint = Endpoint::from_shared(format!("https://{addr}"))?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .tls_config(tls.clone())?;
        targets.push(endpoint);
    }

    Ok(Channel::balance_list(targets.into_iter()))
}
