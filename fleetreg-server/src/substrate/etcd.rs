//! Production substrate adaptor over an etcd ensemble.
//!
//! The adaptor is a thin translation layer: each trait call clones the
//! underlying client (channels are reference-counted) and maps request
//! and response shapes one-to-one. Lease-not-found conditions are
//! normalized into [`KvError::LeaseNotFound`] so the data plane treats
//! both substrates identically.

use async_trait::async_trait;
use etcd_client::Certificate;
use etcd_client::Client;
use etcd_client::Compare as EtcdCompare;
use etcd_client::CompareOp;
use etcd_client::ConnectOptions;
use etcd_client::EventType;
use etcd_client::GetOptions;
use etcd_client::Identity;
use etcd_client::PutOptions;
use etcd_client::TlsOptions;
use etcd_client::Txn;
use etcd_client::TxnOp as EtcdTxnOp;
use etcd_client::WatchOptions;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use fleetreg_core::ca::CLUSTER_SERVICE_NAME;
use fleetreg_core::config::SubstrateConfig;
use fleetreg_core::kv::ClusterApi;
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

/// TLS material for authenticating to the ensemble: the root CA plus
/// this peer's server certificate and key, all PEM.
pub struct EtcdTlsMaterial {
    pub ca_pem: String,
    pub cert_pem: String,
    pub key_pem: String,
}

#[derive(Clone)]
pub struct EtcdKv {
    client: Client,
}

impl EtcdKv {
    pub async fn connect(
        config: &SubstrateConfig,
        tls: Option<EtcdTlsMaterial>,
    ) -> Result<Self, KvError> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .with_timeout(Duration::from_millis(config.request_timeout_ms));

        if let Some(material) = tls {
            let tls = TlsOptions::new()
                .domain_name(CLUSTER_SERVICE_NAME)
                .ca_certificate(Certificate::from_pem(material.ca_pem))
                .identity(Identity::from_pem(material.cert_pem, material.key_pem));
            options = options.with_tls(tls);
        }

        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        Ok(Self { client })
    }
}

fn convert_kv(kv: &etcd_client::KeyValue) -> KeyValue {
    KeyValue {
        key: kv.key().to_vec(),
        value: kv.value().to_vec(),
        version: kv.version(),
        create_revision: kv.create_revision(),
        lease: kv.lease(),
    }
}

fn is_lease_not_found(e: &etcd_client::Error) -> bool {
    e.to_string().contains("lease not found")
}

#[async_trait]
impl KvEngine for EtcdKv {
    async fn range(&self, req: RangeRequest) -> Result<Vec<KeyValue>, KvError> {
        let mut client = self.client.clone();

        let options = match req.range_end {
            Some(end) => Some(GetOptions::new().with_range(end).with_limit(req.limit)),
            None => None,
        };

        let resp = client
            .get(req.key, options)
            .await
            .map_err(|e| KvError::Range(e.to_string()))?;

        Ok(resp.kvs().iter().map(convert_kv).collect())
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KvError> {
        let mut client = self.client.clone();
        client
            .put(key, value, None)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn txn(&self, req: TxnRequest) -> Result<TxnResponse, KvError> {
        let mut client = self.client.clone();

        let compares = req
            .compares
            .into_iter()
            .map(|compare| match compare {
                fleetreg_core::kv::Compare::VersionEq { key, version } => {
                    EtcdCompare::version(key, CompareOp::Equal, version)
                }
                fleetreg_core::kv::Compare::CreateRevisionEq { key, revision } => {
                    EtcdCompare::create_revision(key, CompareOp::Equal, revision)
                }
            })
            .collect::<Vec<_>>();

        let success = req
            .success
            .into_iter()
            .map(|op| match op {
                TxnOp::Put { key, value, lease } => {
                    let options = (lease != 0).then(|| PutOptions::new().with_lease(lease));
                    EtcdTxnOp::put(key, value, options)
                }
                TxnOp::Delete { key } => EtcdTxnOp::delete(key, None),
            })
            .collect::<Vec<_>>();

        let resp = client
            .txn(Txn::new().when(compares).and_then(success))
            .await
            .map_err(|e| KvError::Txn(e.to_string()))?;

        Ok(TxnResponse {
            succeeded: resp.succeeded(),
        })
    }

    async fn lease_grant(&self, ttl_secs: i64) -> Result<i64, KvError> {
        let mut client = self.client.clone();
        let resp = client
            .lease_grant(ttl_secs, None)
            .await
            .map_err(|e| KvError::LeaseGrant(e.to_string()))?;
        Ok(resp.id())
    }

    async fn lease_renew(&self, lease_id: i64) -> Result<(), KvError> {
        let mut client = self.client.clone();

        let (mut keeper, mut responses) = client
            .lease_keep_alive(lease_id)
            .await
            .map_err(|e| KvError::Lease(e.to_string()))?;

        keeper
            .keep_alive()
            .await
            .map_err(|e| KvError::Lease(e.to_string()))?;

        match responses.message().await {
            // The server answers an expired lease with TTL 0.
            Ok(Some(resp)) if resp.ttl() > 0 => Ok(()),
            Ok(_) => Err(KvError::LeaseNotFound(lease_id)),
            Err(e) if is_lease_not_found(&e) => Err(KvError::LeaseNotFound(lease_id)),
            Err(e) => Err(KvError::Lease(e.to_string())),
        }
    }

    async fn lease_revoke(&self, lease_id: i64) -> Result<(), KvError> {
        let mut client = self.client.clone();
        match client.lease_revoke(lease_id).await {
            Ok(_) => Ok(()),
            Err(e) if is_lease_not_found(&e) => Err(KvError::LeaseNotFound(lease_id)),
            Err(e) => Err(KvError::Lease(e.to_string())),
        }
    }

    async fn watch_prefix(&self, prefix: Vec<u8>) -> Result<PrefixWatcher, KvError> {
        let mut client = self.client.clone();

        let (mut watcher, mut stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = task_cancel.cancelled() => {
                        if let Err(e) = watcher.cancel().await {
                            debug!("watch cancel failed: {e}");
                        }
                        return;
                    }
                    message = stream.message() => message,
                };

                let resp = match message {
                    Ok(Some(resp)) => resp,
                    Ok(None) => return,
                    Err(e) => {
                        warn!("watch stream error: {e}");
                        return;
                    }
                };

                for event in resp.events() {
                    let Some(kv) = event.kv() else { continue };
                    let translated = match event.event_type() {
                        EventType::Put => WatchEvent::Put(convert_kv(kv)),
                        EventType::Delete => WatchEvent::Delete {
                            key: kv.key().to_vec(),
                        },
                    };
                    if tx.send(translated).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(PrefixWatcher::new(rx, cancel))
    }
}

#[async_trait]
impl ClusterApi for EtcdKv {
    async fn member_add(
        &self,
        name: String,
        peer_urls: Vec<String>,
    ) -> Result<(), KvError> {
        let mut client = self.client.clone();
        debug!(peer = %name, ?peer_urls, "adding consensus member");
        client
            .member_add(peer_urls, None)
            .await
            .map_err(|e| KvError::Membership(e.to_string()))?;
        Ok(())
    }

    async fn member_list(&self) -> Result<Vec<PeerMember>, KvError> {
        let mut client = self.client.clone();
        let resp = client
            .member_list()
            .await
            .map_err(|e| KvError::Membership(e.to_string()))?;

        Ok(resp
            .members()
            .iter()
            .map(|m| PeerMember {
                id: m.id(),
                name: m.name().to_string(),
                peer_urls: m.peer_urls().to_vec(),
                client_urls: m.client_urls().to_vec(),
            })
            .collect())
    }
}
