//! The mTLS gRPC gateway.
//!
//! One listener per peer. The TLS acceptor requires and verifies a
//! client certificate against both cluster CAs (root CA for peers and
//! the CLI, node CA for agents and observers); which of the four
//! multiplexed services a caller may actually use is re-checked inside
//! every handler from the certificate's OUs.

mod agent_service;
mod node_service;
mod observer_service;
mod peer_service;

use std::net::SocketAddr;

use futures::FutureExt;
use tokio::sync::watch;
use tonic::transport::server::Router;
use tonic::transport::Certificate;
use tonic::transport::Identity;
use tonic::transport::ServerTlsConfig;
use tonic_health::server::health_reporter;
use tracing::error;
use tracing::info;
use tracing::warn;

use fleetreg_core::kv::ClusterApi;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::Error;
use fleetreg_core::Result;
use fleetreg_proto::agent::agent_api_server::AgentApiServer;
use fleetreg_proto::node::node_api_server::NodeApiServer;
use fleetreg_proto::observer::observer_api_server::ObserverApiServer;
use fleetreg_proto::peer::peer_api_server::PeerApiServer;

use crate::Registry;

pub async fn start_gateway<E>(
    registry: Registry<E>,
    listen_address: SocketAddr,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()>
where
    E: KvEngine + ClusterApi,
{
    info!("starting registry gateway at https://{listen_address}");

    build_router(registry)
        .await?
        .serve_with_shutdown(
            listen_address,
            shutdown_signal.changed().map(move |_| {
                warn!("stopping registry gateway at {listen_address}");
            }),
        )
        .await
        .map_err(|e| {
            error!("gateway server failed: {e}");
            Error::Fatal(format!("gateway server failed: {e}"))
        })
}

/// Serves the gateway on an already-bound listener, for embedders and
/// the test harness that need an ephemeral port.
pub async fn start_gateway_with_incoming<E>(
    registry: Registry<E>,
    listener: tokio::net::TcpListener,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()>
where
    E: KvEngine + ClusterApi,
{
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    build_router(registry)
        .await?
        .serve_with_incoming_shutdown(incoming, shutdown_signal.changed().map(|_| {}))
        .await
        .map_err(|e| Error::Fatal(format!("gateway server failed: {e}")))
}

async fn build_router<E>(registry: Registry<E>) -> Result<Router>
where
    E: KvEngine + ClusterApi,
{
    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<PeerApiServer<Registry<E>>>()
        .await;
    health_reporter
        .set_serving::<NodeApiServer<Registry<E>>>()
        .await;
    health_reporter
        .set_serving::<AgentApiServer<Registry<E>>>()
        .await;
    health_reporter
        .set_serving::<ObserverApiServer<Registry<E>>>()
        .await;

    let identity = Identity::from_pem(
        &registry.state.server_cert.cert_pem,
        &registry.state.server_cert.key_pem,
    );

    // Both CAs in one bundle: the verifier accepts client chains
    // anchored at either.
    let client_ca_bundle = format!(
        "{}{}",
        registry.state.ca.root_cert_pem(),
        registry.state.ca.node_ca_cert_pem()
    );
    let tls = ServerTlsConfig::new()
        .identity(identity)
        .client_ca_root(Certificate::from_pem(client_ca_bundle));

    let router = tonic::transport::Server::builder()
        .tls_config(tls)
        .map_err(|e| Error::Fatal(format!("gateway TLS configuration rejected: {e}")))?
        .add_service(health_service)
        .add_service(PeerApiServer::new(registry.clone()))
        .add_service(NodeApiServer::new(registry.clone()))
        .add_service(AgentApiServer::new(registry.clone()))
        .add_service(ObserverApiServer::new(registry));

    Ok(router)
}
