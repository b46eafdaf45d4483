use crate::common::ServiceSpec;
use crate::observer::watch_datacenter_services_response::Notification;
use crate::observer::WatchDatacenterServicesResponse;
use crate::observer::WatchServiceDelete;
use crate::observer::WatchServiceUpdate;

impl WatchDatacenterServicesResponse {
    pub fn update(service: ServiceSpec) -> Self {
        Self {
            notification: Some(Notification::Update(WatchServiceUpdate {
                service: Some(service),
            })),
        }
    }

    pub fn delete(
        node: impl Into<String>,
        service_name: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            notification: Some(Notification::Delete(WatchServiceDelete {
                node: node.into(),
                service_name: service_name.into(),
                instance: instance.into(),
            })),
        }
    }
}
