use fleetreg_core::config::RegistryConfig;
use fleetreg_core::Result;
use fleetreg_server::PeerBuilder;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RegistryConfig::load()?;
    config.validate()?;

    let _guard = init_observability();

    let (graceful_tx, graceful_rx) = watch::channel(());

    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("failed to propagate shutdown: {e}");
        }
    });

    let peer = PeerBuilder::new(config, graceful_rx).build().await?;

    info!("registry peer started");
    if let Err(e) = peer.run().await {
        error!("registry peer stopped: {e:?}");
        std::process::exit(1);
    }

    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| fleetreg_core::Error::Fatal(format!("signal handler: {e}")))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| fleetreg_core::Error::Fatal(format!("signal handler: {e}")))?;

    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    graceful_tx
        .send(())
        .map_err(|e| fleetreg_core::Error::Fatal(format!("shutdown signal lost: {e}")))?;
    Ok(())
}

fn init_observability() -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();
    guard
}
