use common::stats::Counter;
use std::fmt::{Display, Formatter};

#[derive(Debug, Default)]
pub struct Stats {
    pub batches_accepted: Counter,
    pub batches_rejected: Counter,
    pub frames_written: Counter,
    pub frames_skipped: Counter,
    pub frames_failed: Counter,
    pub bytes_replayed: Counter,
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batches accepted: {}, batches rejected: {}, frames written: {}, \
             frames skipped: {}, frames failed: {}, bytes replayed: {}",
            self.batches_accepted,
            self.batches_rejected,
            self.frames_written,
            self.frames_skipped,
            self.frames_failed,
            self.bytes_replayed,
        )
    }
}
