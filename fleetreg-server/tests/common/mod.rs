//! Harness for end-to-end tests: a full registry gateway with real
//! mTLS on a loopback ephemeral port, backed by the in-memory
//! substrate.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tonic::transport::Certificate;
use tonic::transport::Channel;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Endpoint;
use tonic::transport::Identity;

use fleetreg_core::ca::CertifiedKey;
use fleetreg_core::ca::CLUSTER_SERVICE_NAME;
use fleetreg_core::config::PeerConfig;
use fleetreg_core::config::RegistryConfig;
use fleetreg_core::NodeRole;
use fleetreg_proto::agent::agent_api_client::AgentApiClient;
use fleetreg_proto::common::NodeRole as ProtoNodeRole;
use fleetreg_proto::observer::observer_api_client::ObserverApiClient;
use fleetreg_proto::peer::peer_api_client::PeerApiClient;
use fleetreg_proto::peer::AddNodeRequest;
use fleetreg_server::start_gateway_with_incoming;
use fleetreg_server::substrate::MemKv;
use fleetreg_server::PeerState;
use fleetreg_server::Registry;

pub struct TestCluster {
    pub addr: SocketAddr,
    pub state: Arc<PeerState>,
    pub kv: Arc<MemKv>,
    _dir: tempfile::TempDir,
    _shutdown_tx: watch::Sender<()>,
}

impl TestCluster {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = RegistryConfig {
            peer: PeerConfig {
                name: "peer-a".into(),
                dir: dir.path().to_path_buf(),
                advertise_host: "127.0.0.1:2382".into(),
                ..Default::default()
            },
            ..Default::default()
        };

        let state = Arc::new(PeerState::load(&config.peer).unwrap());
        let kv = Arc::new(MemKv::new());
        let registry = Registry::new(kv.clone(), state.clone(), config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        tokio::spawn(start_gateway_with_incoming(registry, listener, shutdown_rx));

        // Let the acceptor come up before the first handshake.
        tokio::task::yield_now().await;

        Self {
            addr,
            state,
            kv,
            _dir: dir,
            _shutdown_tx: shutdown_tx,
        }
    }

    async fn channel(&self, identity: Identity) -> Channel {
        let tls = ClientTlsConfig::new()
            .domain_name(CLUSTER_SERVICE_NAME)
            .ca_certificate(Certificate::from_pem(self.state.ca.root_cert_pem()))
            .identity(identity);

        Endpoint::from_shared(format!("https://{}", self.addr))
            .unwrap()
            .tls_config(tls)
            .unwrap()
            .connect()
            .await
            .expect("connect to test gateway")
    }

    /// Channel authenticated with this peer's own server certificate,
    /// the way other peers and the admin CLI connect.
    pub async fn peer_channel(&self) -> Channel {
        self.channel(Identity::from_pem(
            &self.state.server_cert.cert_pem,
            &self.state.server_cert.key_pem,
        ))
        .await
    }

    pub async fn peer_client(&self) -> PeerApiClient<Channel> {
        PeerApiClient::new(self.peer_channel().await)
    }

    /// Channel authenticated with a node certificate.
    pub async fn node_channel(&self, creds: &CertifiedKey) -> Channel {
        self.channel(Identity::from_pem(&creds.cert_pem, &creds.key_pem))
            .await
    }

    /// Registers a node through the admin plane and returns its minted
    /// credentials.
    pub async fn add_node(
        &self,
        name: &str,
        datacenter: &str,
        location: &str,
        role: NodeRole,
    ) -> CertifiedKey {
        let response = self
            .peer_client()
            .await
            .add_node(AddNodeRequest {
                name: name.into(),
                datacenter: datacenter.into(),
                location: location.into(),
                role: ProtoNodeRole::from(role).into(),
            })
            .await
            .expect("add node")
            .into_inner();

        CertifiedKey {
            cert_pem: String::from_utf8(response.certificate).unwrap(),
            key_pem: String::from_utf8(response.key).unwrap(),
        }
    }

    pub async fn agent_client(&self, creds: &CertifiedKey) -> AgentApiClient<Channel> {
        AgentApiClient::new(self.node_channel(creds).await)
    }

    pub async fn observer_client(&self, creds: &CertifiedKey) -> ObserverApiClient<Channel> {
        ObserverApiClient::new(self.node_channel(creds).await)
    }
}
