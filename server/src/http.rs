use crate::config::Acknowledge;
use crate::replay::{self, ReplayReport};
use crate::sink::PacketSink;
use crate::stats::Stats;
use axum::Router;
use axum::extract::{DefaultBodyLimit, FromRequest, Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bytes::Bytes;
use common::container::{self, ContainerError, ParsedContainer};
use common::envelope::{self, EnvelopeError, UPLOAD_PATH};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const FRAMES_WRITTEN_HEADER: &str = "x-stap-frames-written";
pub const FRAMES_SKIPPED_HEADER: &str = "x-stap-frames-skipped";
pub const FRAMES_FAILED_HEADER: &str = "x-stap-frames-failed";

#[derive(Clone)]
pub struct UploadState {
    pub sink: Arc<Mutex<dyn PacketSink>>,
    pub stats: Arc<Stats>,
    pub acknowledge: Acknowledge,
}

/// `max_body_bytes = 0` lifts the body limit.
pub fn router(state: UploadState, max_body_bytes: usize) -> Router {
    let body_limit = match max_body_bytes {
        0 => DefaultBodyLimit::disable(),
        limit => DefaultBodyLimit::max(limit),
    };

    Router::new()
        .route(UPLOAD_PATH, any(upload))
        .layer(body_limit)
        .with_state(state)
}

async fn upload(State(state): State<UploadState>, request: Request) -> Response {
    if request.method() != Method::POST {
        log::debug!("Rejected {} request.", request.method());
        return (StatusCode::BAD_REQUEST, "Only POST method allowed").into_response();
    }

    let body = match Bytes::from_request(request, &()).await {
        Ok(value) => value,
        Err(rejection) => {
            log::warn!("Failed to read batch: {}", rejection.body_text());
            return rejection.into_response();
        },
    };

    let parsed = match decode_body(&body) {
        Ok(value) => value,
        Err(err) => {
            state.stats.batches_rejected.increment();
            log::warn!(
                "Rejected batch of {} bytes: {} {}",
                body.len(),
                err,
                err.additional_info().unwrap_or_default()
            );
            return (StatusCode::BAD_REQUEST, "Invalid pcap data").into_response();
        },
    };
    state.stats.batches_accepted.increment();
    log::debug!(
        "Accepted batch: {} frames, link type {}.",
        parsed.frames.len(),
        parsed.header.link_type
    );

    let replay_task = {
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            let report = replay::replay(&parsed.frames, &*state.sink);
            record(&state.stats, &report);
            report
        })
    };

    match state.acknowledge {
        Acknowledge::Received => (StatusCode::OK, "OK").into_response(),
        Acknowledge::Replayed => match replay_task.await {
            Ok(report) => (
                StatusCode::OK,
                [
                    (FRAMES_WRITTEN_HEADER, report.written.to_string()),
                    (FRAMES_SKIPPED_HEADER, report.skipped().to_string()),
                    (FRAMES_FAILED_HEADER, report.failed.to_string()),
                ],
                "OK",
            )
                .into_response(),
            Err(err) => {
                log::error!("Replay task failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Replay failed").into_response()
            },
        },
    }
}

fn decode_body(body: &[u8]) -> Result<ParsedContainer, UploadError> {
    let container = envelope::decode(body).map_err(UploadError::Envelope)?;
    container::decode(&container).map_err(UploadError::Container)
}

fn record(stats: &Stats, report: &ReplayReport) {
    stats.frames_written.add(report.written);
    stats.frames_skipped.add(report.skipped());
    stats.frames_failed.add(report.failed);
    stats.bytes_replayed.add(report.bytes);

    log::info!(
        "Replayed {} frames ({} bytes), skipped {}, failed {}. Totals: {}",
        report.written,
        report.bytes,
        report.skipped(),
        report.failed,
        stats
    );
}

#[derive(Debug, Error)]
enum UploadError {
    #[error("Transport encoding error.")]
    Envelope(EnvelopeError),

    #[error("Capture container error.")]
    Container(ContainerError),
}

impl UploadError {
    fn additional_info(&self) -> Option<String> {
        match self {
            UploadError::Envelope(err) => err.additional_info(),
            UploadError::Container(err) => Some(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::tests::{RecordingSink, frame};
    use axum::body::Body;
    use axum::http::Request;
    use bytes::{BufMut, BytesMut};
    use common::container::{CaptureHeader, DEFAULT_SNAPSHOT_LENGTH};
    use common::frame::OwnedFrame;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        recording: Arc<Mutex<RecordingSink>>,
        stats: Arc<Stats>,
    }

    fn app(acknowledge: Acknowledge) -> TestApp {
        app_with_limit(acknowledge, 1024 * 1024)
    }

    fn app_with_limit(acknowledge: Acknowledge, max_body_bytes: usize) -> TestApp {
        let recording = Arc::new(Mutex::new(RecordingSink::default()));
        let stats = Arc::new(Stats::default());
        let sink: Arc<Mutex<dyn PacketSink>> = recording.clone();
        let state = UploadState {
            sink,
            stats: Arc::clone(&stats),
            acknowledge,
        };

        TestApp {
            router: router(state, max_body_bytes),
            recording,
            stats,
        }
    }

    fn body_for(frames: &[OwnedFrame]) -> String {
        let header = CaptureHeader::new(1, DEFAULT_SNAPSHOT_LENGTH);
        let sealed = container::encode(header, frames).unwrap();
        envelope::encode(sealed.bytes())
    }

    fn post(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(UPLOAD_PATH)
            .header("content-type", "text/plain")
            .body(body.into())
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn header_value(response: &Response, name: &str) -> String {
        response
            .headers()
            .get(name)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_three_frames_are_replayed_in_order() {
        let test = app(Acknowledge::Replayed);
        let frames = vec![frame(b"A", 1), frame(b"B", 1), frame(b"C", 1)];

        let response = test.router.oneshot(post(body_for(&frames))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, FRAMES_WRITTEN_HEADER), "3");
        assert_eq!(header_value(&response, FRAMES_SKIPPED_HEADER), "0");
        assert_eq!(header_value(&response, FRAMES_FAILED_HEADER), "0");
        assert_eq!(text(response).await, "OK");
        assert_eq!(
            test.recording.lock().unwrap().written,
            vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]
        );
        assert_eq!(test.stats.frames_written.get(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_is_accepted() {
        let test = app(Acknowledge::Replayed);

        let response = test.router.oneshot(post(body_for(&[]))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, FRAMES_WRITTEN_HEADER), "0");
        assert!(test.recording.lock().unwrap().written.is_empty());
        assert_eq!(test.stats.batches_accepted.get(), 1);
    }

    #[tokio::test]
    async fn test_truncated_frames_are_not_replayed() {
        let test = app(Acknowledge::Replayed);
        let frames = vec![frame(b"A", 1), frame(b"partial", 1500), frame(b"C", 1)];

        let response = test.router.oneshot(post(body_for(&frames))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, FRAMES_SKIPPED_HEADER), "1");
        assert_eq!(
            test.recording.lock().unwrap().written,
            vec![b"A".to_vec(), b"C".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_rejected() {
        let valid = body_for(&[frame(b"A", 1)]);
        let mut wrong_magic = envelope::decode(valid.as_bytes()).unwrap();
        wrong_magic[0] = 0x00;
        let mut cut_record = envelope::decode(valid.as_bytes()).unwrap();
        cut_record.pop();

        let bodies = vec![
            "not base64!".to_string(),
            valid[..valid.len() - 1].to_string(),
            envelope::encode(&wrong_magic),
            envelope::encode(&cut_record),
            envelope::encode(b"short"),
        ];

        for body in bodies {
            let test = app(Acknowledge::Replayed);
            let response = test.router.oneshot(post(body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(text(response).await, "Invalid pcap data");
            assert!(test.recording.lock().unwrap().written.is_empty());
            assert_eq!(test.stats.batches_rejected.get(), 1);
        }
    }

    #[tokio::test]
    async fn test_only_post_is_allowed() {
        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let test = app(Acknowledge::Received);
            let request = Request::builder()
                .method(method)
                .uri(UPLOAD_PATH)
                .body(Body::empty())
                .unwrap();

            let response = test.router.oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(text(response).await, "Only POST method allowed");
        }
    }

    #[tokio::test]
    async fn test_other_routes_are_not_served() {
        let test = app(Acknowledge::Received);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/replay")
            .body(Body::empty())
            .unwrap();

        let response = test.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_received_mode_answers_before_replay() {
        let test = app(Acknowledge::Received);
        let frames = vec![frame(b"A", 1), frame(b"B", 1)];

        let response = test.router.oneshot(post(body_for(&frames))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(FRAMES_WRITTEN_HEADER).is_none());
        assert_eq!(text(response).await, "OK");

        for _ in 0..100 {
            if test.stats.frames_written.get() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            test.recording.lock().unwrap().written,
            vec![b"A".to_vec(), b"B".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_oversized_body_is_refused() {
        let test = app(Acknowledge::Replayed);
        let body = "A".repeat(2 * 1024 * 1024);

        let response = test.router.oneshot(post(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(test.recording.lock().unwrap().written.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_limit_accepts_large_batch() {
        let test = app_with_limit(Acknowledge::Replayed, 0);
        let frames: Vec<OwnedFrame> = (0..40u8).map(|id| frame(&[id; 60_000], 60_000)).collect();
        let body = body_for(&frames);
        assert!(body.len() > 2 * 1024 * 1024);

        let response = test.router.oneshot(post(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, FRAMES_WRITTEN_HEADER), "40");
        assert_eq!(test.recording.lock().unwrap().written.len(), 40);
    }

    #[tokio::test]
    async fn test_method_is_checked_before_body_limit() {
        let test = app(Acknowledge::Replayed);
        let request = Request::builder()
            .method(Method::PUT)
            .uri(UPLOAD_PATH)
            .body(Body::from("A".repeat(2 * 1024 * 1024)))
            .unwrap();

        let response = test.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(text(response).await, "Only POST method allowed");
    }

    #[tokio::test]
    async fn test_frame_with_odd_lengths_does_not_reject_batch() {
        let test = app(Acknowledge::Replayed);
        let mut bytes = BytesMut::from(
            container::encode(CaptureHeader::new(1, DEFAULT_SNAPSHOT_LENGTH), &[frame(b"A", 1)])
                .unwrap()
                .bytes()
                .as_ref(),
        );
        // Captured length above the original length
        bytes.put_u32_le(1_700_000_000);
        bytes.put_u32_le(0);
        bytes.put_u32_le(4);
        bytes.put_u32_le(2);
        bytes.put_slice(b"BBBB");
        bytes.put_u32_le(1_700_000_000);
        bytes.put_u32_le(0);
        bytes.put_u32_le(1);
        bytes.put_u32_le(1);
        bytes.put_slice(b"C");

        let response = test
            .router
            .oneshot(post(envelope::encode(&bytes)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_value(&response, FRAMES_WRITTEN_HEADER), "2");
        assert_eq!(header_value(&response, FRAMES_SKIPPED_HEADER), "1");
        assert_eq!(
            test.recording.lock().unwrap().written,
            vec![b"A".to_vec(), b"C".to_vec()]
        );
        assert_eq!(test.stats.batches_rejected.get(), 0);
    }
}
