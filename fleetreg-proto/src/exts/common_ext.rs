use std::fmt;

use crate::common::PortSpec;
use crate::common::ServiceSpec;

impl PortSpec {
    pub fn new(
        name: impl Into<String>,
        port: u16,
        proto: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            port: u32::from(port),
            proto: proto.into(),
        }
    }
}

impl ServiceSpec {
    /// `service/instance` label used in log lines.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.service_name, self.instance)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}/{}", self.name, self.port, self.proto)
    }
}
