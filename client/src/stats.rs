use common::stats::Counter;
use std::fmt::{Display, Formatter};

/// Agent-side diagnostics. Shared between capture, encoder and uploader threads.
#[derive(Debug, Default)]
pub struct Stats {
    pub frames_captured: Counter,
    pub frames_dropped: Counter,
    pub batches_sealed: Counter,
    pub batches_dropped: Counter,
    pub batches_uploaded: Counter,
    pub bytes_uploaded: Counter,
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frames captured: {}, frames dropped: {}, batches sealed: {}, \
             batches dropped: {}, batches uploaded: {}, bytes uploaded: {}",
            self.frames_captured,
            self.frames_dropped,
            self.batches_sealed,
            self.batches_dropped,
            self.batches_uploaded,
            self.bytes_uploaded,
        )
    }
}
