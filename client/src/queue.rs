use crate::stats::Stats;
use common::container::CaptureContainer;
use crossbeam::channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// What happens to a sealed batch when the upload queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Encoder waits for the uploader.
    Block,

    /// The batch that was just sealed is discarded.
    DropNewest,

    /// The oldest queued batch is evicted to make room.
    DropOldest,
}

/// Sending half of the bounded hand-off between the batch encoder and the uploader thread.
pub struct UploadQueue {
    tx: Sender<CaptureContainer>,
    // Set only for `DropOldest`. This receiver keeps the channel open, so with that policy
    // `push` never reports `QueueError::Disconnected`; the other policies see it.
    evict_rx: Option<Receiver<CaptureContainer>>,
    policy: OverflowPolicy,
    stats: Arc<Stats>,
}

pub fn bounded(
    capacity: usize, policy: OverflowPolicy, stats: Arc<Stats>,
) -> (UploadQueue, Receiver<CaptureContainer>) {
    let (tx, rx) = crossbeam::channel::bounded::<CaptureContainer>(capacity);
    let evict_rx = match policy {
        OverflowPolicy::DropOldest => Some(rx.clone()),
        OverflowPolicy::Block | OverflowPolicy::DropNewest => None,
    };

    let queue = UploadQueue {
        tx,
        evict_rx,
        policy,
        stats,
    };

    (queue, rx)
}

impl UploadQueue {
    pub fn push(&self, container: CaptureContainer) -> Result<(), QueueError> {
        match self.policy {
            OverflowPolicy::Block => {
                self.tx.send(container).map_err(|_| QueueError::Disconnected)
            },
            OverflowPolicy::DropNewest => match self.tx.try_send(container) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    self.dropped(&rejected);
                    Ok(())
                },
                Err(TrySendError::Disconnected(_)) => Err(QueueError::Disconnected),
            },
            OverflowPolicy::DropOldest => self.push_evicting(container),
        }
    }

    fn push_evicting(&self, mut container: CaptureContainer) -> Result<(), QueueError> {
        loop {
            match self.tx.try_send(container) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    let evicted = self.evict_rx.as_ref().and_then(|rx| rx.try_recv().ok());
                    match evicted {
                        Some(oldest) => {
                            self.dropped(&oldest);
                            container = rejected;
                        },
                        // Zero-capacity queue: nothing to evict.
                        None => {
                            self.dropped(&rejected);
                            return Ok(());
                        },
                    }
                },
                Err(TrySendError::Disconnected(_)) => return Err(QueueError::Disconnected),
            }
        }
    }

    fn dropped(&self, container: &CaptureContainer) {
        self.stats.batches_dropped.increment();
        log::warn!(
            "Upload queue is full ({}). Dropped batch with {} frames.",
            self.policy,
            container.frames()
        );
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Uploader is gone, upload queue is closed.")]
    Disconnected,
}
