//! Helper client for managing the fleetreg service registry.
//!
//! Talks PeerAPI over mTLS with a peer certificate; meant for operators
//! and provisioning scripts, not for nodes.

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use tonic::transport::Certificate;
use tonic::transport::Channel;
use tonic::transport::ClientTlsConfig;
use tonic::transport::Endpoint;
use tonic::transport::Identity;

use fleetreg_core::ca::CLUSTER_SERVICE_NAME;
use fleetreg_proto::common::NodeRole;
use fleetreg_proto::peer::peer_api_client::PeerApiClient;
use fleetreg_proto::peer::AddNodeRequest;
use fleetreg_proto::peer::GetNodeCredentialsRequest;
use fleetreg_proto::peer::GetPeersRequest;

#[derive(Parser)]
#[command(name = "fleetreg", about = "Manage the fleetreg service registry")]
struct Cli {
    /// Path to the certificate authority file
    #[arg(long, default_value = "ca.crt", global = true)]
    ca: PathBuf,

    /// Path to a peer certificate file
    #[arg(long, default_value = "peer.crt", global = true)]
    crt: PathBuf,

    /// Path to a peer key file
    #[arg(long, default_value = "peer.key", global = true)]
    key: PathBuf,

    /// Address of the cluster peer API
    #[arg(long, default_value = "127.0.0.1:2382", global = true)]
    cluster: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage registry nodes
    #[command(subcommand)]
    Node(NodeCommand),

    /// Manage registry peers
    #[command(subcommand)]
    Peer(PeerCommand),
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Add a node to the registry and write its first credentials
    Add {
        name: String,

        /// The node's datacenter
        #[arg(long)]
        datacenter: String,

        /// Location the datacenter belongs to
        #[arg(long)]
        location: String,

        /// Role the node's certificate will carry
        #[arg(long, value_enum, default_value_t = RoleArg::Agent)]
        role: RoleArg,

        /// Where the node certificate will be written ('-' for stdout)
        #[arg(long, default_value = "node.crt")]
        node_crt: String,

        /// Where the node key will be written ('-' for stdout)
        #[arg(long, default_value = "node.key")]
        node_key: String,
    },

    /// Retrieve fresh credentials for an existing node
    Creds {
        name: String,

        /// The node's datacenter
        #[arg(long)]
        datacenter: String,

        /// Where the node certificate will be written ('-' for stdout)
        #[arg(long, default_value = "node.crt")]
        node_crt: String,

        /// Where the node key will be written ('-' for stdout)
        #[arg(long, default_value = "node.key")]
        node_key: String,
    },
}

#[derive(Subcommand)]
enum PeerCommand {
    /// List the consensus membership
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Agent,
    Observer,
}

impl From<RoleArg> for NodeRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Agent => NodeRole::Agent,
            RoleArg::Observer => NodeRole::Observer,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = peer_api_client(&cli).await?;

    match cli.command {
        Command::Node(NodeCommand::Add {
            name,
            datacenter,
            location,
            role,
            node_crt,
            node_key,
        }) => {
            let response = client
                .add_node(AddNodeRequest {
                    name,
                    datacenter,
                    location,
                    role: NodeRole::from(role).into(),
                })
                .await
                .map_err(|e| format!("failed to add node: {}", e.message()))?
                .into_inner();

            write_output(&node_crt, &response.certificate)?;
            write_output(&node_key, &response.key)?;
            println!("node added, enrollment token: {}", response.enrollment_token);
        }

        Command::Node(NodeCommand::Creds {
            name,
            datacenter,
            node_crt,
            node_key,
        }) => {
            let response = client
                .get_node_credentials(GetNodeCredentialsRequest { name, datacenter })
                .await
                .map_err(|e| format!("failed to fetch credentials: {}", e.message()))?
                .into_inner();

            write_output(&node_crt, &response.certificate)?;
            write_output(&node_key, &response.key)?;
        }

        Command::Peer(PeerCommand::List) => {
            let response = client
                .get_peers(GetPeersRequest {})
                .await
                .map_err(|e| format!("failed to list peers: {}", e.message()))?
                .into_inner();

            for peer in response.peers {
                println!(
                    "{}\t{}\tpeer={}\tclient={}",
                    peer.id,
                    peer.name,
                    peer.peer_urls.join(","),
                    peer.client_urls.join(",")
                );
            }
        }
    }

    Ok(())
}

async fn peer_api_client(
    cli: &Cli,
) -> Result<PeerApiClient<Channel>, Box<dyn std::error::Error>> {
    let ca = std::fs::read_to_string(&cli.ca)
        .map_err(|e| format!("failed to read CA certificate {}: {e}", cli.ca.display()))?;
    let cert = std::fs::read_to_string(&cli.crt)
        .map_err(|e| format!("failed to read peer certificate {}: {e}", cli.crt.display()))?;
    let key = std::fs::read_to_string(&cli.key)
        .map_err(|e| format!("failed to read peer key {}: {e}", cli.key.display()))?;

    let tls = ClientTlsConfig::new()
        .domain_name(CLUSTER_SERVICE_NAME)
        .ca_certificate(Certificate::from_pem(ca))
        .identity(Identity::from_pem(cert, key));

    let channel = Endpoint::from_shared(format!("https://{}", cli.cluster))?
        .tls_config(tls)?
        .connect()
        .await
        .map_err(|e| format!("failed to reach cluster at {}: {e}", cli.cluster))?;

    Ok(PeerApiClient::new(channel))
}

fn write_output(target: &str, contents: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
    if target == "-" {
        std::io::stdout().write_all(contents)?;
        println!();
    } else {
        std::fs::write(Path::new(target), contents)
            .map_err(|e| format!("failed to write {target}: {e}"))?;
    }
    Ok(())
}
