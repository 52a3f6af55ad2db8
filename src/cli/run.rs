use super::output::{OutputFormat, StdoutConsumer};
use crate::config::parse::ConfigError;
use crate::config::{load_or_default, Config};
use crate::delivery::DeliveryHub;
use crate::record::Origin;
use crate::source::{HttpPoller, IngestSink, PollError, SocketSource};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Consumer id used for the process's own stdout sink.
pub const STDOUT_CONSUMER: &str = "stdout";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("poll error: {0}")]
    Poll(#[from] PollError),

    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}

pub async fn run(config_path: Option<&Path>, json: bool) -> Result<(), RunError> {
    let (config, path) = load_or_default(config_path)?;
    match &path {
        Some(path) => info!(config_path = %path.display(), "Loaded configuration"),
        None => info!("No config file found, using defaults"),
    }

    let ingest = Ingest::start(&config, OutputFormat::from_json_flag(json)).await?;
    if !ingest.has_inputs() {
        warn!("No inputs configured: enable 'socket' or add 'polls' entries");
    }

    info!("Ingestion started, press Ctrl+C to shutdown");
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    ingest.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Everything `run` starts, kept together so it can be torn down in order.
pub struct Ingest {
    pub hub: Arc<DeliveryHub>,
    pub socket: Option<SocketSource>,
    pub poller: HttpPoller,
    cancel: CancellationToken,
}

impl Ingest {
    pub async fn start(config: &Config, format: OutputFormat) -> Result<Self, RunError> {
        let cancel = CancellationToken::new();
        let hub = Arc::new(DeliveryHub::new(config.delivery.clone()));
        hub.register(Arc::new(StdoutConsumer::new(STDOUT_CONSUMER, format)));
        hub.spawn_capacity_monitor(cancel.clone());

        let sink: Arc<dyn IngestSink> = hub.clone();

        let socket = if config.socket.enabled {
            let source = SocketSource::new(config.socket.clone(), Arc::clone(&sink));
            let outcome = source.start(config.socket.port, STDOUT_CONSUMER).await;
            if outcome.ok {
                hub.route(Origin::Socket, STDOUT_CONSUMER);
                info!(message = %outcome.message, "Socket source ready");
                Some(source)
            } else {
                // Ingestion for this source halts; the rest keeps running.
                error!(message = %outcome.message, "Socket source failed to start");
                None
            }
        } else {
            None
        };

        let poller = HttpPoller::new(config.poll.clone(), sink)?;
        for target in &config.polls {
            poller.start_poll(&target.url, target.interval);
        }

        Ok(Self {
            hub,
            socket,
            poller,
            cancel,
        })
    }

    pub fn has_inputs(&self) -> bool {
        self.socket.is_some() || self.poller.active_polls() > 0
    }

    pub async fn shutdown(self) {
        self.poller.stop_all();
        if let Some(socket) = &self.socket {
            let outcome = socket.stop(STDOUT_CONSUMER).await;
            info!(message = %outcome.message, "Socket source stopped");
        }
        self.cancel.cancel();
        self.hub.flush_all().await;
        self.hub.shutdown();
    }
}
