use tonic::Request;
use tonic::Response;
use tonic::Status;

use fleetreg_core::kv::ClusterApi;
use fleetreg_core::kv::KvEngine;
use fleetreg_proto::agent::agent_api_server::AgentApi;
use fleetreg_proto::agent::DeregisterServiceRequest;
use fleetreg_proto::agent::DeregisterServiceResponse;
use fleetreg_proto::agent::DiscoverRequest;
use fleetreg_proto::agent::DiscoverResponse;
use fleetreg_proto::agent::RegisterServiceRequest;
use fleetreg_proto::agent::RegisterServiceResponse;
use fleetreg_proto::agent::ResetRequest;
use fleetreg_proto::agent::ResetResponse;
use fleetreg_proto::node::HeartbeatRequest;
use fleetreg_proto::node::HeartbeatResponse;

use crate::catalog;
use crate::discover;
use crate::get_node_lease;
use crate::require_agent;
use crate::source_ip;
use crate::Registry;

#[tonic::async_trait]
impl<E> AgentApi for Registry<E>
where
    E: KvEngine + ClusterApi,
{
    async fn register(
        &self,
        request: Request<RegisterServiceRequest>,
    ) -> Result<Response<RegisterServiceResponse>, Status> {
        let source = source_ip(&request);
        let (_, identity) = self.authenticated_node(&request).await?;
        require_agent(&identity)?;

        let spec = catalog::register(
            self.kv.as_ref(),
            &identity.record,
            request.into_inner(),
            source,
        )
        .await?;

        Ok(Response::new(RegisterServiceResponse {
            service: Some(spec),
        }))
    }

    async fn deregister(
        &self,
        request: Request<DeregisterServiceRequest>,
    ) -> Result<Response<DeregisterServiceResponse>, Status> {
        let (_, identity) = self.authenticated_node(&request).await?;
        require_agent(&identity)?;

        let req = request.into_inner();
        catalog::deregister(self.kv.as_ref(), &identity.record, &req.service, &req.instance)
            .await?;

        Ok(Response::new(DeregisterServiceResponse {}))
    }

    async fn reset(
        &self,
        request: Request<ResetRequest>,
    ) -> Result<Response<ResetResponse>, Status> {
        let (_, identity) = self.authenticated_node(&request).await?;
        require_agent(&identity)?;

        catalog::reset(self.kv.as_ref(), &identity.record).await?;

        Ok(Response::new(ResetResponse {}))
    }

    async fn discover(
        &self,
        request: Request<DiscoverRequest>,
    ) -> Result<Response<DiscoverResponse>, Status> {
        let (_, identity) = self.authenticated_node(&request).await?;
        require_agent(&identity)?;

        let services =
            discover::discover(self.kv.as_ref(), &identity.record, request.get_ref()).await?;

        Ok(Response::new(DiscoverResponse { services }))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let (_, identity) = self.authenticated_node(&request).await?;
        require_agent(&identity)?;

        get_node_lease(
            self.kv.as_ref(),
            &identity.record.datacenter,
            &identity.record.name,
        )
        .await?;

        Ok(Response::new(HeartbeatResponse {}))
    }
}
