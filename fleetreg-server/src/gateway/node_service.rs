use tonic::Request;
use tonic::Response;
use tonic::Status;

use fleetreg_core::kv::ClusterApi;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::Error;
use fleetreg_proto::node::node_api_server::NodeApi;
use fleetreg_proto::node::ConfigRequest;
use fleetreg_proto::node::ConfigResponse;
use fleetreg_proto::node::HeartbeatRequest;
use fleetreg_proto::node::HeartbeatResponse;

use crate::get_node_lease;
use crate::Registry;

#[tonic::async_trait]
impl<E> NodeApi for Registry<E>
where
    E: KvEngine + ClusterApi,
{
    async fn config(
        &self,
        request: Request<ConfigRequest>,
    ) -> Result<Response<ConfigResponse>, Status> {
        let (cert, identity) = self.authenticated_node(&request).await?;
        let response = self.node_config_response(&cert, &identity).await?;
        Ok(Response::new(response))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let (_, identity) = self.authenticated_node(&request).await?;

        // Re-fetching the lease renews it; before the first register
        // this simply creates one.
        get_node_lease(
            self.kv.as_ref(),
            &identity.record.datacenter,
            &identity.record.name,
        )
        .await
        .map_err(Error::into_status)?;

        Ok(Response::new(HeartbeatResponse {}))
    }
}
