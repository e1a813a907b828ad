use crate::queue::{QueueError, UploadQueue};
use crate::stats::Stats;
use common::container::{CaptureContainer, CaptureHeader, ContainerWriter};
use common::frame::OwnedFrame;
use crossbeam::channel::Receiver;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Accumulates frames of the current window and seals them into a container.
///
/// Two states: accumulating (`append`) and sealing (`seal`). Sealing is driven by an
/// absolute ticker raced against frame arrival, so only one of them runs at a time and
/// every received frame ends up in exactly one batch.
pub struct BatchEncoder {
    writer: ContainerWriter,
    stats: Arc<Stats>,
}

impl BatchEncoder {
    pub fn new(header: CaptureHeader, stats: Arc<Stats>) -> Self {
        Self {
            writer: ContainerWriter::new(header),
            stats,
        }
    }

    pub fn frames(&self) -> usize {
        self.writer.frames()
    }

    pub fn append(&mut self, frame: &OwnedFrame) {
        if let Err(err) = self.writer.write_frame(frame) {
            self.stats.frames_dropped.increment();
            log::warn!("Frame skipped: {}", err);
        }
    }

    /// Seals the current batch. The next batch starts with a fresh file header,
    /// even when this one had no frames.
    pub fn seal(&mut self) -> CaptureContainer {
        let container = self.writer.reset();
        self.stats.batches_sealed.increment();
        log::info!(
            "Sealed batch: {} frames, {} bytes.",
            container.frames(),
            container.len()
        );

        container
    }

    /// Encoder loop. Returns once the frame stream is closed and the last batch is queued.
    pub fn run(
        mut self, frames: &Receiver<OwnedFrame>, ticks: &Receiver<Instant>,
        queue: &UploadQueue,
    ) -> Result<(), BatchError> {
        loop {
            crossbeam::select! {
                recv(frames) -> message => match message {
                    Ok(frame) => self.append(&frame),
                    Err(_) => {
                        queue.push(self.seal()).map_err(BatchError::Queue)?;
                        log::info!("Frame stream closed. Batch encoder stopped.");
                        return Ok(());
                    },
                },
                recv(ticks) -> tick => {
                    if tick.is_err() {
                        return Err(BatchError::TimerStopped);
                    }
                    log::debug!("Batch window elapsed with {} frames.", self.frames());
                    queue.push(self.seal()).map_err(BatchError::Queue)?;
                },
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to hand a sealed batch over.")]
    Queue(QueueError),

    #[error("Batch timer stopped.")]
    TimerStopped,
}
