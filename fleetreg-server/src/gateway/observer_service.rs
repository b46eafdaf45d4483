use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tracing::debug;
use tracing::warn;

use fleetreg_core::keys::dc_service_prefix;
use fleetreg_core::kv::ClusterApi;
use fleetreg_core::kv::KvEngine;
use fleetreg_core::Error;
use fleetreg_proto::observer::observer_api_server::ObserverApi;
use fleetreg_proto::observer::GetDatacenterServicesRequest;
use fleetreg_proto::observer::GetDatacenterServicesResponse;
use fleetreg_proto::observer::WatchDatacenterServicesRequest;
use fleetreg_proto::observer::WatchDatacenterServicesResponse;

use crate::datacenter_snapshot;
use crate::require_observer;
use crate::translate_event;
use crate::Registry;

#[tonic::async_trait]
impl<E> ObserverApi for Registry<E>
where
    E: KvEngine + ClusterApi,
{
    async fn get_datacenter_services(
        &self,
        request: Request<GetDatacenterServicesRequest>,
    ) -> Result<Response<GetDatacenterServicesResponse>, Status> {
        let (_, identity) = self.authenticated_node(&request).await?;
        require_observer(&identity)?;

        let services =
            datacenter_snapshot(self.kv.as_ref(), &identity.record.datacenter).await?;

        Ok(Response::new(GetDatacenterServicesResponse { services }))
    }

    type WatchDatacenterServicesStream =
        ReceiverStream<Result<WatchDatacenterServicesResponse, Status>>;

    async fn watch_datacenter_services(
        &self,
        request: Request<WatchDatacenterServicesRequest>,
    ) -> Result<Response<Self::WatchDatacenterServicesStream>, Status> {
        let (_, identity) = self.authenticated_node(&request).await?;
        require_observer(&identity)?;

        let datacenter = identity.record.datacenter.clone();
        let mut watcher = self
            .kv
            .watch_prefix(dc_service_prefix(&datacenter))
            .await
            .map_err(Error::from)?;

        let (tx, rx) = mpsc::channel(16);

        // The pump owns the watcher; when the client hangs up the send
        // fails, the loop ends and dropping the watcher releases the
        // substrate subscription.
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = tx.closed() => {
                        debug!(%datacenter, "observer went away, releasing watch");
                        return;
                    }
                    event = watcher.recv() => event,
                };

                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(%datacenter, "datacenter watch interrupted: {e}");
                        let _ = tx
                            .send(Err(Status::internal("watch interrupted")))
                            .await;
                        return;
                    }
                };

                let message = match translate_event(event) {
                    Ok(message) => Ok(message),
                    Err(e) => {
                        warn!(%datacenter, "dropping watch stream: {e}");
                        let _ = tx.send(Err(e.into_status())).await;
                        return;
                    }
                };

                if tx.send(message).await.is_err() {
                    debug!(%datacenter, "observer went away, releasing watch");
                    return;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
