use tonic::Request;
use tonic::Response;
use tonic::Status;

use fleetreg_core::keys::node_key;
use fleetreg_core::keys::validate_segment;
use fleetreg_core::kv::ClusterApi;
use fleetreg_core::kv::Compare;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::kv::RangeRequest;
use fleetreg_core::kv::TxnOp;
use fleetreg_core::kv::TxnRequest;
use fleetreg_core::secrets::EnrollmentClaims;
use fleetreg_core::Error;
use fleetreg_core::NodeRecord;
use fleetreg_core::NodeRole;
use fleetreg_proto::common::NodeRole as ProtoNodeRole;
use fleetreg_proto::peer::peer_api_server::PeerApi;
use fleetreg_proto::peer::AddNodeRequest;
use fleetreg_proto::peer::AddNodeResponse;
use fleetreg_proto::peer::AddSelfPeerRequest;
use fleetreg_proto::peer::AddSelfPeerResponse;
use fleetreg_proto::peer::GetNodeCredentialsRequest;
use fleetreg_proto::peer::GetNodeCredentialsResponse;
use fleetreg_proto::peer::GetPeersRequest;
use fleetreg_proto::peer::GetPeersResponse;

use crate::add_self_peer;
use crate::get_peers;
use crate::presented_certificate;
use crate::require_peer;
use crate::Registry;

#[tonic::async_trait]
impl<E> PeerApi for Registry<E>
where
    E: KvEngine + ClusterApi,
{
    async fn add_self_peer(
        &self,
        request: Request<AddSelfPeerRequest>,
    ) -> Result<Response<AddSelfPeerResponse>, Status> {
        let cert = presented_certificate(&request)?;
        require_peer(&cert)?;

        let req = request.into_inner();
        add_self_peer(self.kv.as_ref(), &cert.common_name, &req.advertised_urls).await?;

        Ok(Response::new(AddSelfPeerResponse {}))
    }

    async fn get_peers(
        &self,
        request: Request<GetPeersRequest>,
    ) -> Result<Response<GetPeersResponse>, Status> {
        let cert = presented_certificate(&request)?;
        require_peer(&cert)?;

        let peers = get_peers(self.kv.as_ref()).await?;
        Ok(Response::new(GetPeersResponse { peers }))
    }

    async fn add_node(
        &self,
        request: Request<AddNodeRequest>,
    ) -> Result<Response<AddNodeResponse>, Status> {
        let cert = presented_certificate(&request)?;
        require_peer(&cert)?;

        let req = request.into_inner();
        validate_segment("name", &req.name)?;
        validate_segment("datacenter", &req.datacenter)?;
        validate_segment("location", &req.location)?;
        let role = NodeRole::try_from(
            ProtoNodeRole::try_from(req.role)
                .map_err(|_| Error::InvalidArgument("unknown node role".into()))?,
        )?;

        let record = NodeRecord {
            name: req.name.clone(),
            datacenter: req.datacenter.clone(),
            location: req.location.clone(),
            role,
        };
        let key = node_key(&record.datacenter, &record.name);
        let value = serde_json::to_vec(&record)
            .map_err(|e| Error::from(fleetreg_core::SystemError::Json(e)))?;

        // One-shot creation: the guard loses against any earlier
        // writer, making concurrent AddNode first-writer-wins.
        let txn = TxnRequest {
            compares: vec![Compare::CreateRevisionEq {
                key: key.clone(),
                revision: 0,
            }],
            success: vec![TxnOp::Put {
                key,
                value,
                lease: 0,
            }],
        };

        let result = self.kv.txn(txn).await.map_err(Error::from)?;
        if !result.succeeded {
            return Err(Error::AlreadyExists(format!(
                "node {}/{}",
                record.datacenter, record.name
            ))
            .into());
        }

        let minted =
            self.state
                .ca
                .create_node_cert(&record.datacenter, &record.name, record.role)
                .map_err(Error::from)?;

        let enrollment_token = self
            .state
            .secret
            .seal_enrollment(&EnrollmentClaims {
                name: record.name,
                datacenter: record.datacenter,
                location: record.location,
                role: record.role,
            })
            .map_err(Error::from)?;

        Ok(Response::new(AddNodeResponse {
            certificate: minted.cert_pem.into_bytes(),
            key: minted.key_pem.into_bytes(),
            enrollment_token,
        }))
    }

    async fn get_node_credentials(
        &self,
        request: Request<GetNodeCredentialsRequest>,
    ) -> Result<Response<GetNodeCredentialsResponse>, Status> {
        let cert = presented_certificate(&request)?;
        require_peer(&cert)?;

        let req = request.into_inner();
        validate_segment("name", &req.name)?;
        validate_segment("datacenter", &req.datacenter)?;

        let kvs = self
            .kv
            .range(RangeRequest::single(node_key(&req.datacenter, &req.name)))
            .await
            .map_err(Error::from)?;
        let Some(entry) = kvs.into_iter().next() else {
            return Err(Error::InvalidArgument(format!(
                "node {}/{} does not exist",
                req.datacenter, req.name
            ))
            .into());
        };
        let record: NodeRecord = serde_json::from_slice(&entry.value)
            .map_err(|e| Error::from(fleetreg_core::SystemError::Json(e)))?;

        let minted = self
            .state
            .ca
            .create_node_cert(&record.datacenter, &record.name, record.role)
            .map_err(Error::from)?;

        Ok(Response::new(GetNodeCredentialsResponse {
            certificate: minted.cert_pem.into_bytes(),
            key: minted.key_pem.into_bytes(),
        }))
    }
}
