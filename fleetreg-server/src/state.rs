//! Peer state directory.
//!
//! `{dir}/token` is the durable root of trust: once written it wins
//! over any configured bootstrap token, so a restarted peer keeps its
//! cluster identity. Everything else in the directory is derived or
//! minted from it on every start:
//!
//! ```text
//! {dir}/token            shareable bootstrap token
//! {dir}/ca.{crt,key}     root CA (derived, deterministic)
//! {dir}/node-ca.{crt,key} node CA (derived, deterministic)
//! {dir}/node.{crt,key}   this peer's server certificate (fresh)
//! {dir}/etcd/            consensus substrate data (cluster-token)
//! ```

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use tracing::info;

use fleetreg_core::ca::CertAuthority;
use fleetreg_core::ca::CertifiedKey;
use fleetreg_core::config::PeerConfig;
use fleetreg_core::secrets::ClusterSecret;
use fleetreg_core::Error;
use fleetreg_core::Result;
use fleetreg_core::SystemError;

pub struct PeerState {
    pub secret: ClusterSecret,
    pub ca: CertAuthority,
    pub server_cert: CertifiedKey,
    pub etcd_dir: PathBuf,
}

impl PeerState {
    /// Loads or initializes the state directory. Any failure here is
    /// startup-fatal; a corrupt token file in particular is not
    /// recoverable at runtime.
    pub fn load(config: &PeerConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir).map_err(|source| SystemError::Io {
            path: config.dir.clone(),
            source,
        })?;

        let secret = load_or_init_secret(config)?;
        let ca = CertAuthority::derive(&secret)?;

        write_secret_file(&config.dir.join("ca.crt"), ca.root_cert_pem().as_bytes())?;
        write_secret_file(&config.dir.join("ca.key"), ca.root_key_pem().as_bytes())?;
        write_secret_file(
            &config.dir.join("node-ca.crt"),
            ca.node_ca_cert_pem().as_bytes(),
        )?;
        write_secret_file(
            &config.dir.join("node-ca.key"),
            ca.node_ca_key_pem().as_bytes(),
        )?;

        let server_cert =
            ca.create_server_cert(&config.name, &[host_part(&config.advertise_host).to_string()])?;
        write_secret_file(&config.dir.join("node.crt"), server_cert.cert_pem.as_bytes())?;
        write_secret_file(&config.dir.join("node.key"), server_cert.key_pem.as_bytes())?;

        let etcd_dir = config.dir.join("etcd");
        fs::create_dir_all(&etcd_dir).map_err(|source| SystemError::Io {
            path: etcd_dir.clone(),
            source,
        })?;
        // The consensus ensemble is named after the cluster secret so
        // peers of unrelated clusters refuse to form a quorum; the
        // substrate process reads the token from its data directory.
        write_secret_file(&etcd_dir.join("cluster-token"), secret.cluster_token().as_bytes())?;

        Ok(Self {
            secret,
            ca,
            server_cert,
            etcd_dir,
        })
    }
}

fn load_or_init_secret(config: &PeerConfig) -> Result<ClusterSecret> {
    let token_file = config.dir.join("token");

    if token_file.exists() {
        let encoded = fs::read_to_string(&token_file).map_err(|source| SystemError::Io {
            path: token_file.clone(),
            source,
        })?;
        let secret = ClusterSecret::decode(&encoded)
            .map_err(|_| Error::Fatal(format!("corrupt token file {}", token_file.display())))?;
        return Ok(secret);
    }

    let secret = match config.bootstrap_token()? {
        Some(token) => ClusterSecret::decode(&token)?,
        None => {
            info!("no bootstrap token configured, generating a fresh cluster secret");
            ClusterSecret::generate()
        }
    };

    write_secret_file(&token_file, secret.encode().as_bytes())?;
    Ok(secret)
}

/// Writes key material with owner-only permissions.
fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|source| SystemError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
            SystemError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
    }

    Ok(())
}

/// The host portion of a `host:port` advertise address, bracket-free
/// for IPv6 literals.
pub(crate) fn host_part(advertise: &str) -> &str {
    if let Some(stripped) = advertise.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            return &stripped[..end];
        }
    }
    match advertise.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty()
                && !host.contains(':')
                && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            host
        }
        _ => advertise,
    }
}
