use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// HTTP route the agent posts envelopes to.
pub const UPLOAD_PATH: &str = "/upload";

/// Text-safe transport form of a capture container.
pub fn encode(container: &[u8]) -> String {
    STANDARD.encode(container)
}

pub fn decode(body: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    STANDARD.decode(body).map_err(EnvelopeError::Base64)
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Body is not valid base64.")]
    Base64(base64::DecodeError),
}

impl EnvelopeError {
    pub fn additional_info(&self) -> Option<String> {
        match self {
            EnvelopeError::Base64(err) => Some(err.to_string()),
        }
    }
}
