//! The node's client certificate.
//!
//! `{dir}/node.{crt,key}` is the working copy; the files handed out by
//! the admin (`AddNode` output) are only the fallback for the first
//! start. Rotation rewrites the working copy atomically - write to a
//! temporary file in the same directory, then rename - and swaps the
//! in-memory credential under the lock, so the next connection attempt
//! picks up the new identity.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::Mutex;
use tonic::transport::Identity;

use crate::ClientError;
use crate::ClientResult;

pub struct CredentialStore {
    cert_file: PathBuf,
    key_file: PathBuf,
    pems: Mutex<(String, String)>,
}

impl CredentialStore {
    /// Loads the working credentials, falling back to the provided
    /// files when the state directory has none yet. The working copy is
    /// (re)written either way.
    pub fn load(
        state_dir: &Path,
        fallback_cert: &Path,
        fallback_key: &Path,
    ) -> ClientResult<Self> {
        let cert_file = state_dir.join("node.crt");
        let key_file = state_dir.join("node.key");

        let cert_pem = read_with_fallback(&cert_file, fallback_cert)?;
        let key_pem = read_with_fallback(&key_file, fallback_key)?;

        if !cert_pem.contains("BEGIN CERTIFICATE") {
            return Err(ClientError::BadCredentials(format!(
                "{} does not look like a PEM certificate",
                cert_file.display()
            )));
        }

        write_atomically(&cert_file, cert_pem.as_bytes())?;
        write_atomically(&key_file, key_pem.as_bytes())?;

        Ok(Self {
            cert_file,
            key_file,
            pems: Mutex::new((cert_pem, key_pem)),
        })
    }

    /// The identity to present on the next TLS handshake.
    pub fn identity(&self) -> Identity {
        let pems = self.pems.lock();
        Identity::from_pem(&pems.0, &pems.1)
    }

    /// Installs rotated credentials: disk first, then the in-memory
    /// copy, all under the lock so concurrent connection attempts never
    /// see a half-rotated pair.
    pub fn update(&self, cert_pem: &str, key_pem: &str) -> ClientResult<()> {
        let mut pems = self.pems.lock();
        write_atomically(&self.cert_file, cert_pem.as_bytes())?;
        write_atomically(&self.key_file, key_pem.as_bytes())?;
        *pems = (cert_pem.to_string(), key_pem.to_string());
        Ok(())
    }
}

fn read_with_fallback(primary: &Path, fallback: &Path) -> ClientResult<String> {
    match fs::read_to_string(primary) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::read_to_string(fallback).map_err(|source| ClientError::Io {
                path: fallback.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(ClientError::Io {
            path: primary.to_path_buf(),
            source,
        }),
    }
}

pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> ClientResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source| ClientError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    use std::io::Write;
    tmp.write_all(contents).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }

    tmp.persist(path).map_err(|e| ClientError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
