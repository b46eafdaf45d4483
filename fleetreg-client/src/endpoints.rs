//! The registry endpoint pool.
//!
//! `{dir}/addrs` caches the last known registry addresses, one per
//! line, so a restarted node can reach the cluster even when the
//! endpoint it was originally configured with is gone. Every `Config`
//! response carrying a fresh list rewrites the cache.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::warn;

use crate::credentials::write_atomically;
use crate::ClientError;
use crate::ClientResult;

pub struct EndpointStore {
    addrs_file: PathBuf,
    addrs: Mutex<Vec<String>>,
}

impl EndpointStore {
    /// Loads the cached list, seeding it from the provided endpoints
    /// when the cache is missing or empty.
    pub fn load(state_dir: &Path, provided: Vec<String>) -> ClientResult<Self> {
        let addrs_file = state_dir.join("addrs");

        let cached = match fs::read_to_string(&addrs_file) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => vec![],
            Err(source) => {
                return Err(ClientError::Io {
                    path: addrs_file,
                    source,
                })
            }
        };

        let addrs = if cached.is_empty() { provided } else { cached };
        if addrs.is_empty() {
            return Err(ClientError::NoEndpoints);
        }

        write_atomically(&addrs_file, addrs.join("\n").as_bytes())?;

        Ok(Self {
            addrs_file,
            addrs: Mutex::new(addrs),
        })
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.addrs.lock().clone()
    }

    /// Replaces the pool with a fresh list from the registry. An empty
    /// list is ignored - a cluster always has at least one peer and an
    /// empty cache would strand the node.
    pub fn update(&self, addrs: Vec<String>) {
        if addrs.is_empty() {
            return;
        }
        let mut current = self.addrs.lock();
        if *current == addrs {
            return;
        }
        if let Err(e) = write_atomically(&self.addrs_file, addrs.join("\n").as_bytes()) {
            warn!("failed to persist registry addresses: {e}");
        }
        *current = addrs;
    }
}
