use crate::batch::{BatchEncoder, BatchError};
use crate::capture::{self, FrameSource, PacketSource, SourceError};
use crate::config::Config;
use crate::queue;
use crate::stats::Stats;
use crate::upload::{self, UploadError, Uploader};
use common::interface::InterfaceError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use thiserror::Error;

pub fn start(config: Config) -> Result<(), CoreError> {
    let stats = Arc::new(Stats::default());
    let shutdown_flag = Arc::new(AtomicBool::new(false));

    let source = match PacketSource::open(&config) {
        Ok(value) => value,
        Err(err) => {
            if let SourceError::Interface(InterfaceError::UnknownInterface(_)) = &err {
                common::interface::log_usable_interfaces();
            }
            return Err(CoreError::Source(err));
        },
    };
    let header = source.header();

    let uploader = Uploader::new(
        config.server_url(),
        config.upload_retries,
        config.retry_backoff(),
    )
    .map_err(CoreError::Upload)?;

    let shutdown_flag_copy = Arc::clone(&shutdown_flag);
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested. Sealing the last batch.");
        shutdown_flag_copy.store(true, Ordering::Release);
    })
    .map_err(CoreError::SignalHandler)?;

    log::info!(
        "Capturing packets on device {} (link type {}) in {} s batches. Server: {}",
        config.device,
        header.link_type,
        config.batch_window_seconds,
        uploader.url()
    );

    let (frames_tx, frames_rx) = crossbeam::channel::bounded(config.frame_queue_capacity);
    let (upload_queue, containers_rx) = queue::bounded(
        config.upload_queue_capacity,
        config.overflow_policy,
        Arc::clone(&stats),
    );

    let capture_handle = {
        let shutdown_flag = Arc::clone(&shutdown_flag);
        let stats = Arc::clone(&stats);
        thread::spawn(move || capture::run(source, frames_tx, shutdown_flag, stats))
    };

    let upload_handle = {
        let stats = Arc::clone(&stats);
        thread::spawn(move || {
            if let Err(err) = upload::run(uploader, containers_rx, stats) {
                let mut message = format!("{err}");
                if let Some(additional_info) = err.additional_info() {
                    message.push_str(&format!(" Additional info: {additional_info}"));
                }
                log::error!("{} Aborting.", message);
                std::process::exit(1);
            }
        })
    };

    let ticks = crossbeam::channel::tick(config.batch_window());
    let encoder = BatchEncoder::new(header, Arc::clone(&stats));
    let encoder_result = encoder.run(&frames_rx, &ticks, &upload_queue);

    // Closing both channels lets the other threads finish their loops.
    shutdown_flag.store(true, Ordering::Release);
    drop(frames_rx);
    drop(upload_queue);

    let capture_result = match capture_handle.join() {
        Ok(result) => result,
        Err(_) => return Err(CoreError::ThreadPanicked("capture")),
    };
    if upload_handle.join().is_err() {
        return Err(CoreError::ThreadPanicked("upload"));
    }

    encoder_result.map_err(CoreError::Batch)?;
    capture_result.map_err(CoreError::Source)?;

    log::info!("Stopped. Totals: {}", stats);
    Ok(())
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Packet source error.")]
    Source(SourceError),

    #[error("Uploader error.")]
    Upload(UploadError),

    #[error("Batch encoder error.")]
    Batch(BatchError),

    #[error("Failed to set Ctrl-C handler.")]
    SignalHandler(ctrlc::Error),

    #[error("The {0} thread panicked.")]
    ThreadPanicked(&'static str),
}

impl CoreError {
    pub fn additional_info(&self) -> Option<String> {
        match self {
            CoreError::Source(err) => err.additional_info(),
            CoreError::Upload(err) => err.additional_info(),
            CoreError::Batch(err) => Some(err.to_string()),
            CoreError::SignalHandler(err) => Some(err.to_string()),
            CoreError::ThreadPanicked(_) => None,
        }
    }
}
