//! Background jobs every node runs for its whole lifetime.
//!
//! Both loops treat RPC failure as routine: log, back off briefly and
//! try again at the next tick. The cluster's lease TTL absorbs missed
//! heartbeats up to its bound.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::NodeClient;

/// Cadence of the configuration refresher.
const CONFIG_REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// Pause after a failed call before re-entering the loop.
const FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Calls `Config` every minute, installing rotated credentials and
/// endpoint updates as they arrive. Runs until cancelled.
pub async fn run_config_refresher(client: NodeClient, cancel: CancellationToken) {
    loop {
        let delay = match client.refresh_config().await {
            Ok(_suggested) => {
                debug!("configuration refreshed");
                CONFIG_REFRESH_PERIOD
            }
            Err(e) => {
                warn!("failed to refresh configuration: {e}");
                FAILURE_BACKOFF
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Sends heartbeats at the period the registry dictates (half the node
/// keepalive TTL), keeping the node's lease - and with it every
/// registered service - alive. Runs until cancelled.
pub async fn run_heartbeat(client: NodeClient, cancel: CancellationToken) {
    loop {
        let delay = match client.heartbeat().await {
            Ok(()) => client.heartbeat_period(),
            Err(e) => {
                warn!("failed to send heartbeat: {e}");
                FAILURE_BACKOFF
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
