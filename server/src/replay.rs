use crate::sink::PacketSink;
use common::frame::OwnedFrame;
use std::sync::Mutex;

/// Outcome of replaying one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub written: u64,
    pub skipped_truncated: u64,
    pub skipped_empty: u64,
    pub failed: u64,
    pub bytes: u64,
}

impl ReplayReport {
    pub fn skipped(&self) -> u64 {
        self.skipped_truncated + self.skipped_empty
    }
}

/// Writes frames to the sink in their original order.
///
/// Truncated and empty frames are skipped. A failed write is logged and the rest of
/// the batch is still attempted. The sink is locked per frame, so frames of concurrent
/// batches may interleave but are never split.
pub fn replay<S>(frames: &[OwnedFrame], sink: &Mutex<S>) -> ReplayReport
where
    S: PacketSink + ?Sized,
{
    let mut report = ReplayReport::default();

    for (index, frame) in frames.iter().enumerate() {
        if frame.header.is_truncated() {
            report.skipped_truncated += 1;
            log::debug!(
                "Frame {} skipped: captured {} of {} bytes.",
                index,
                frame.header.caplen,
                frame.header.len
            );
            continue;
        }
        if frame.data.is_empty() {
            report.skipped_empty += 1;
            log::debug!("Frame {} skipped: empty payload.", index);
            continue;
        }

        let result = match sink.lock() {
            Ok(mut guard) => guard.send(&frame.data),
            Err(poisoned) => poisoned.into_inner().send(&frame.data),
        };

        match result {
            Ok(()) => {
                report.written += 1;
                report.bytes += frame.data.len() as u64;
            },
            Err(err) => {
                report.failed += 1;
                log::warn!(
                    "Frame {} was not replayed: {} {}",
                    index,
                    err,
                    err.additional_info().unwrap_or_default()
                );
            },
        }
    }

    report
}
