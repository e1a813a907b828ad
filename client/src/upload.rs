use crate::stats::Stats;
use common::container::CaptureContainer;
use crossbeam::channel::Receiver;
use http::StatusCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Posts base64-encoded containers to the replay server.
///
/// With zero retries every failure is final. Otherwise transient failures
/// (connection problems, 5xx, 429) are retried with exponential backoff.
pub struct Uploader {
    client: reqwest::blocking::Client,
    url: String,
    retries: u32,
    backoff: Duration,
}

impl Uploader {
    pub fn new(url: String, retries: u32, backoff: Duration) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(UploadError::Client)?;

        Ok(Self {
            client,
            url,
            retries,
            backoff,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn upload(&self, container: &CaptureContainer) -> Result<(), UploadError> {
        let body = common::envelope::encode(container.bytes());

        let mut attempt: u32 = 0;
        loop {
            match self.send(&body) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    let delay = self.delay(attempt);
                    attempt += 1;
                    log::warn!(
                        "Upload failed: {}. Retry {}/{} in {} ms.",
                        err,
                        attempt,
                        self.retries,
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                },
                Err(err) => return Err(err),
            }
        }
    }

    fn send(&self, body: &str) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.url)
            .header(http::header::CONTENT_TYPE, "text/plain")
            .body(body.to_owned())
            .send()
            .map_err(UploadError::Transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(UploadError::Status(status))
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Uploader thread loop. Runs until the queue is closed and drained.
pub fn run(
    uploader: Uploader, containers: Receiver<CaptureContainer>, stats: Arc<Stats>,
) -> Result<(), UploadError> {
    for container in containers.iter() {
        uploader.upload(&container)?;

        stats.batches_uploaded.increment();
        stats.bytes_uploaded.add(container.len() as u64);
        log::info!(
            "Sent {} frames to {}. Totals: {}",
            container.frames(),
            uploader.url(),
            stats
        );
    }

    log::info!("Upload queue closed. Uploader stopped.");
    Ok(())
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to build HTTP client.")]
    Client(reqwest::Error),

    #[error("Failed to send batch.")]
    Transport(reqwest::Error),

    #[error("Server rejected batch with status {0}.")]
    Status(StatusCode),
}

impl UploadError {
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Client(_) => false,
            UploadError::Transport(err) => !err.is_builder() && !err.is_redirect(),
            UploadError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            },
        }
    }

    pub fn additional_info(&self) -> Option<String> {
        match self {
            UploadError::Client(err) | UploadError::Transport(err) => Some(err.to_string()),
            UploadError::Status(_) => None,
        }
    }
}
