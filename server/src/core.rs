use crate::config::Config;
use crate::http::{self, UploadState};
use crate::sink::{PacketSink, PcapSink, SinkError};
use crate::stats::Stats;
use common::interface::InterfaceError;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub fn start(config: Config) -> Result<(), CoreError> {
    let sink = match PcapSink::open(&config.device) {
        Ok(value) => value,
        Err(err) => {
            if let SinkError::Interface(InterfaceError::UnknownInterface(_)) = &err {
                common::interface::log_usable_interfaces();
            }
            return Err(CoreError::Sink(err));
        },
    };
    let sink: Arc<Mutex<dyn PacketSink>> = Arc::new(Mutex::new(sink));

    let stats = Arc::new(Stats::default());
    let state = UploadState {
        sink,
        stats: Arc::clone(&stats),
        acknowledge: config.acknowledge,
    };
    let router = http::router(state, config.max_body_bytes);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CoreError::Runtime)?;

    runtime.block_on(async move {
        let address = config.socket_address();
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(CoreError::Bind)?;

        log::info!(
            "Listening on {}. Replaying to device {} (acknowledge: {}).",
            address,
            config.device,
            config.acknowledge
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(CoreError::Serve)
    })?;

    log::info!("Stopped. Totals: {}", stats);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {}", err);
        return;
    }
    log::info!("Shutdown requested.");
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Replay sink error.")]
    Sink(SinkError),

    #[error("Failed to build async runtime.")]
    Runtime(std::io::Error),

    #[error("Failed to bind listener.")]
    Bind(std::io::Error),

    #[error("Server error.")]
    Serve(std::io::Error),
}

impl CoreError {
    pub fn additional_info(&self) -> Option<String> {
        match self {
            CoreError::Sink(err) => err.additional_info(),
            CoreError::Runtime(err) | CoreError::Bind(err) | CoreError::Serve(err) => {
                Some(err.to_string())
            },
        }
    }
}
