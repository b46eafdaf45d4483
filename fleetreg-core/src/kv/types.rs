use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::keys::prefix_end;
use crate::KvError;

/// One stored key/value pair plus the revision metadata the optimistic
/// concurrency paths compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Modifications since creation, starting at 1.
    pub version: i64,
    /// Global revision at which the key was created; 0 for a missing key.
    pub create_revision: i64,
    /// Lease id attached to the key, 0 when none.
    pub lease: i64,
}

#[derive(Debug, Clone)]
pub struct RangeRequest {
    pub key: Vec<u8>,
    /// Exclusive upper bound; `None` reads the single key.
    pub range_end: Option<Vec<u8>>,
    /// 0 means unlimited.
    pub limit: i64,
}

impl RangeRequest {
    pub fn single(key: Vec<u8>) -> Self {
        Self {
            key,
            range_end: None,
            limit: 1,
        }
    }

    pub fn prefix(prefix: Vec<u8>, limit: i64) -> Self {
        let range_end = prefix_end(&prefix);
        Self {
            key: prefix,
            range_end: Some(range_end),
            limit,
        }
    }
}

/// Guard evaluated before a transaction's success branch applies.
#[derive(Debug, Clone)]
pub enum Compare {
    /// Key's version equals the value; a missing key has version 0.
    VersionEq { key: Vec<u8>, version: i64 },
    /// Key's create revision equals the value; `create_revision == 0`
    /// asserts the key does not exist.
    CreateRevisionEq { key: Vec<u8>, revision: i64 },
}

#[derive(Debug, Clone)]
pub enum TxnOp {
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        /// 0 attaches no lease.
        lease: i64,
    },
    Delete {
        key: Vec<u8>,
    },
}

/// All compares must hold for the success ops to apply; there is no
/// failure branch - callers re-read and retry instead.
#[derive(Debug, Clone, Default)]
pub struct TxnRequest {
    pub compares: Vec<Compare>,
    pub success: Vec<TxnOp>,
}

#[derive(Debug, Clone)]
pub struct TxnResponse {
    pub succeeded: bool,
}

/// A change observed by a prefix watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put(KeyValue),
    Delete { key: Vec<u8> },
}

/// Live prefix subscription. Dropping it cancels the watch.
pub struct PrefixWatcher {
    events: mpsc::UnboundedReceiver<WatchEvent>,
    cancel: CancellationToken,
}

impl PrefixWatcher {
    pub fn new(
        events: mpsc::UnboundedReceiver<WatchEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { events, cancel }
    }

    /// Next event, or `WatchClosed` once the substrate side hangs up.
    pub async fn recv(&mut self) -> Result<WatchEvent, KvError> {
        self.events.recv().await.ok_or(KvError::WatchClosed)
    }
}

impl Drop for PrefixWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One consensus member as reported by the substrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMember {
    pub id: u64,
    pub name: String,
    pub peer_urls: Vec<String>,
    pub client_urls: Vec<String>,
}
