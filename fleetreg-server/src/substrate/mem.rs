//! In-memory substrate with etcd-compatible semantics: revisions,
//! version/create-revision compares, lease-bound keys and prefix
//! watches. A background sweeper evicts keys of expired leases the way
//! the real substrate does cluster-wide.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ops::Bound;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use fleetreg_core::kv::ClusterApi;
use fleetreg_core::kv::Compare;
use fleetreg_core::kv::KeyValue;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::PeerMember;
use fleetreg_core::kv::PrefixWatcher;
use fleetreg_core::kv::RangeRequest;
use fleetreg_core::kv::TxnOp;
use fleetreg_core::kv::TxnRequest;
use fleetreg_core::kv::TxnResponse;
use fleetreg_core::kv::WatchEvent;
use fleetreg_core::KvError;

const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct MemKv {
    inner: Arc<MemInner>,
}

struct MemInner {
    store: Mutex<MemStore>,
    lease_counter: AtomicI64,
    members: Mutex<Vec<PeerMember>>,
    member_counter: AtomicU64,
}

#[derive(Default)]
struct MemStore {
    data: BTreeMap<Vec<u8>, MemEntry>,
    leases: HashMap<i64, MemLease>,
    watchers: Vec<MemWatcher>,
    revision: i64,
}

#[derive(Clone)]
struct MemEntry {
    value: Vec<u8>,
    version: i64,
    create_revision: i64,
    lease: i64,
}

struct MemLease {
    ttl: Duration,
    expires_at: Instant,
}

struct MemWatcher {
    prefix: Vec<u8>,
    tx: mpsc::UnboundedSender<WatchEvent>,
    cancel: CancellationToken,
}

impl MemKv {
    /// Must be created inside a tokio runtime; the lease sweeper runs
    /// as a background task for as long as any clone is alive.
    pub fn new() -> Self {
        let inner = Arc::new(MemInner {
            store: Mutex::new(MemStore::default()),
            lease_counter: AtomicI64::new(1000),
            members: Mutex::new(Vec::new()),
            member_counter: AtomicU64::new(1),
        });

        tokio::spawn(sweep_expired_leases(Arc::downgrade(&inner)));

        Self { inner }
    }
}

impl Default for MemKv {
    fn default() -> Self {
        Self::new()
    }
}

async fn sweep_expired_leases(inner: Weak<MemInner>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let now = Instant::now();
        let mut store = inner.store.lock();
        let expired: Vec<i64> = store
            .leases
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            trace!(lease = id, "lease expired, evicting keys");
            store.revoke(id);
        }
    }
}

impl MemStore {
    fn entry_version(&self, key: &[u8]) -> i64 {
        self.data.get(key).map(|e| e.version).unwrap_or(0)
    }

    fn entry_create_revision(&self, key: &[u8]) -> i64 {
        self.data.get(key).map(|e| e.create_revision).unwrap_or(0)
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>, lease: i64) {
        self.revision += 1;
        let revision = self.revision;

        match self.data.get_mut(&key) {
            Some(entry) => {
                entry.value = value;
                entry.version += 1;
                entry.lease = lease;
            }
            None => {
                self.data.insert(
                    key.clone(),
                    MemEntry {
                        value,
                        version: 1,
                        create_revision: revision,
                        lease,
                    },
                );
            }
        }

        let Some(entry) = self.data.get(&key) else {
            return;
        };
        let kv = KeyValue {
            key,
            value: entry.value.clone(),
            version: entry.version,
            create_revision: entry.create_revision,
            lease: entry.lease,
        };
        self.notify(WatchEvent::Put(kv));
    }

    fn delete(&mut self, key: &[u8]) {
        if self.data.remove(key).is_some() {
            self.revision += 1;
            self.notify(WatchEvent::Delete { key: key.to_vec() });
        }
    }

    /// Removes the lease and every key bound to it, as one atomic step.
    fn revoke(&mut self, lease_id: i64) -> bool {
        if self.leases.remove(&lease_id).is_none() {
            return false;
        }
        let doomed: Vec<Vec<u8>> = self
            .data
            .iter()
            .filter(|(_, e)| e.lease == lease_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.delete(&key);
        }
        true
    }

    fn notify(&mut self, event: WatchEvent) {
        self.watchers.retain(|w| {
            if w.cancel.is_cancelled() {
                return false;
            }
            if !event_key(&event).starts_with(&w.prefix) {
                return true;
            }
            w.tx.send(event.clone()).is_ok()
        });
    }
}

fn event_key(event: &WatchEvent) -> &[u8] {
    match event {
        WatchEvent::Put(kv) => &kv.key,
        WatchEvent::Delete { key } => key,
    }
}

#[async_trait]
impl KvEngine for MemKv {
    async fn range(&self, req: RangeRequest) -> Result<Vec<KeyValue>, KvError> {
        let store = self.inner.store.lock();

        let to_kv = |(key, entry): (&Vec<u8>, &MemEntry)| KeyValue {
            key: key.clone(),
            value: entry.value.clone(),
            version: entry.version,
            create_revision: entry.create_revision,
            lease: entry.lease,
        };

        let kvs = match &req.range_end {
            None => store.data.get_key_value(&req.key).map(to_kv).into_iter().collect(),
            Some(end) => {
                let bounds = (Bound::Included(req.key.clone()), Bound::Excluded(end.clone()));
                let iter = store.data.range(bounds).map(to_kv);
                if req.limit > 0 {
                    iter.take(req.limit as usize).collect()
                } else {
                    iter.collect()
                }
            }
        };

        Ok(kvs)
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KvError> {
        self.inner.store.lock().put(key, value, 0);
        Ok(())
    }

    async fn txn(&self, req: TxnRequest) -> Result<TxnResponse, KvError> {
        let mut store = self.inner.store.lock();

        let succeeded = req.compares.iter().all(|compare| match compare {
            Compare::VersionEq { key, version } => store.entry_version(key) == *version,
            Compare::CreateRevisionEq { key, revision } => {
                store.entry_create_revision(key) == *revision
            }
        });

        if succeeded {
            for op in req.success {
                match op {
                    TxnOp::Put { key, value, lease } => {
                        if lease != 0 && !store.leases.contains_key(&lease) {
                            return Err(KvError::Txn(format!("lease {lease} not found")));
                        }
                        store.put(key, value, lease);
                    }
                    TxnOp::Delete { key } => store.delete(&key),
                }
            }
        }

        Ok(TxnResponse { succeeded })
    }

    async fn lease_grant(&self, ttl_secs: i64) -> Result<i64, KvError> {
        if ttl_secs <= 0 {
            return Err(KvError::LeaseGrant("ttl must be positive".into()));
        }
        let id = self.inner.lease_counter.fetch_add(1, Ordering::SeqCst);
        let ttl = Duration::from_secs(ttl_secs as u64);
        self.inner.store.lock().leases.insert(
            id,
            MemLease {
                ttl,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(id)
    }

    async fn lease_renew(&self, lease_id: i64) -> Result<(), KvError> {
        let mut store = self.inner.store.lock();
        let now = Instant::now();

        match store.leases.get_mut(&lease_id) {
            Some(lease) if lease.expires_at > now => {
                lease.expires_at = now + lease.ttl;
                Ok(())
            }
            Some(_) => {
                // Expired but not yet swept: evict now, renewal fails.
                store.revoke(lease_id);
                Err(KvError::LeaseNotFound(lease_id))
            }
            None => Err(KvError::LeaseNotFound(lease_id)),
        }
    }

    async fn lease_revoke(&self, lease_id: i64) -> Result<(), KvError> {
        if self.inner.store.lock().revoke(lease_id) {
            Ok(())
        } else {
            Err(KvError::LeaseNotFound(lease_id))
        }
    }

    async fn watch_prefix(&self, prefix: Vec<u8>) -> Result<PrefixWatcher, KvError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        self.inner.store.lock().watchers.push(MemWatcher {
            prefix,
            tx,
            cancel: cancel.clone(),
        });
        Ok(PrefixWatcher::new(rx, cancel))
    }
}

#[async_trait]
impl ClusterApi for MemKv {
    async fn member_add(
        &self,
        name: String,
        peer_urls: Vec<String>,
    ) -> Result<(), KvError> {
        let mut members = self.inner.members.lock();
        if members.iter().any(|m| m.name == name) {
            return Err(KvError::Membership(format!("member {name} already exists")));
        }
        members.push(PeerMember {
            id: self.inner.member_counter.fetch_add(1, Ordering::SeqCst),
            name,
            peer_urls,
            client_urls: vec![],
        });
        Ok(())
    }

    async fn member_list(&self) -> Result<Vec<PeerMember>, KvError> {
        Ok(self.inner.members.lock().clone())
    }
}
