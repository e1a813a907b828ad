use crate::config::Config;
use crate::stats::Stats;
use common::container::CaptureHeader;
use common::frame::OwnedFrame;
use common::interface::{self, InterfaceError};
use crossbeam::channel::{Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Anything frames can be pulled from. `Ok(None)` means "nothing yet, ask again".
pub trait FrameSource {
    fn header(&self) -> CaptureHeader;

    fn next_frame(&mut self) -> Result<Option<OwnedFrame>, SourceError>;
}

/// Live capture on a network interface.
pub struct PacketSource {
    capture: pcap::Capture<pcap::Active>,
    header: CaptureHeader,
}

impl PacketSource {
    pub fn open(config: &Config) -> Result<Self, SourceError> {
        let device =
            interface::get_network_interface(&config.device).map_err(SourceError::Interface)?;
        let snapshot_length = i32::try_from(config.snapshot_length)
            .map_err(|_| SourceError::SnapshotLength(config.snapshot_length))?;

        let mut capture = pcap::Capture::from_device(device)
            .map_err(SourceError::Pcap)?
            .snaplen(snapshot_length)
            .promisc(config.promiscuous)
            .timeout(config.read_timeout_ms)
            .open()
            .map_err(SourceError::Pcap)?;

        let filter = control_traffic_filter(&config.server_host, config.server_port);
        capture.filter(&filter, true).map_err(SourceError::Filter)?;
        log::debug!("Capture filter: {}", filter);

        let datalink = capture.get_datalink();
        let link_type =
            u32::try_from(datalink.0).map_err(|_| SourceError::LinkType(datalink.0))?;

        Ok(Self {
            capture,
            header: CaptureHeader::new(link_type, config.snapshot_length),
        })
    }
}

impl FrameSource for PacketSource {
    fn header(&self) -> CaptureHeader {
        self.header
    }

    fn next_frame(&mut self) -> Result<Option<OwnedFrame>, SourceError> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(OwnedFrame::from(packet))),
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(err) => Err(SourceError::Pcap(err)),
        }
    }
}

/// BPF expression excluding the relay's own uploads from the capture.
pub fn control_traffic_filter(host: &str, port: u16) -> String {
    format!(
        "not ((dst host {host} and dst port {port}) or (src host {host} and src port {port}))"
    )
}

/// Capture loop. Stops on shutdown, on a read error or when the encoder is gone. <br>
/// A full frame channel drops the newest frame.
pub fn run(
    mut source: impl FrameSource, frames_tx: Sender<OwnedFrame>,
    shutdown_flag: Arc<AtomicBool>, stats: Arc<Stats>,
) -> Result<(), SourceError> {
    while !shutdown_flag.load(Ordering::Acquire) {
        let frame = match source.next_frame()? {
            Some(value) => value,
            None => continue,
        };
        stats.frames_captured.increment();

        match frames_tx.try_send(frame) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                stats.frames_dropped.increment();
                log::trace!("Frame queue is full. Frame dropped.");
            },
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Batch encoder stopped. Capture stopped.");
                break;
            },
        }
    }

    log::info!("Capture stopped.");
    Ok(())
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Capture device lookup failed.")]
    Interface(InterfaceError),

    #[error("Pcap Library error.")]
    Pcap(pcap::Error),

    #[error("Failed to compile capture filter.")]
    Filter(pcap::Error),

    #[error("Unsupported link-layer type {0}.")]
    LinkType(i32),

    #[error("Snapshot length {0} is too large.")]
    SnapshotLength(u32),
}

impl SourceError {
    pub fn additional_info(&self) -> Option<String> {
        match self {
            SourceError::Interface(err) => Some(format!(
                "{err} {}",
                err.additional_info().unwrap_or_default()
            )),
            SourceError::Pcap(err) | SourceError::Filter(err) => Some(err.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::frame::FrameHeader;
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: VecDeque<Option<OwnedFrame>>,
        shutdown_flag: Arc<AtomicBool>,
    }

    impl FrameSource for ScriptedSource {
        fn header(&self) -> CaptureHeader {
            CaptureHeader::new(1, 65536)
        }

        fn next_frame(&mut self) -> Result<Option<OwnedFrame>, SourceError> {
            let next = self.frames.pop_front().flatten();
            if self.frames.is_empty() {
                self.shutdown_flag.store(true, Ordering::Release);
            }
            Ok(next)
        }
    }

    fn frame(byte: u8) -> OwnedFrame {
        OwnedFrame::new(
            FrameHeader {
                tv_sec: 0,
                tv_usec: 0,
                caplen: 1,
                len: 1,
            },
            vec![byte],
        )
    }

    #[test]
    fn test_control_traffic_filter() {
        assert_eq!(
            control_traffic_filter("10.1.2.3", 65445),
            "not ((dst host 10.1.2.3 and dst port 65445) or (src host 10.1.2.3 and src port 65445))"
        );
    }

    #[test]
    fn test_run_forwards_frames_and_skips_timeouts() {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Stats::default());
        let source = ScriptedSource {
            frames: VecDeque::from(vec![Some(frame(1)), None, Some(frame(2)), None]),
            shutdown_flag: Arc::clone(&shutdown_flag),
        };
        let (tx, rx) = crossbeam::channel::bounded(16);

        run(source, tx, shutdown_flag, Arc::clone(&stats)).unwrap();

        let received: Vec<u8> = rx.iter().map(|frame| frame.data[0]).collect();
        assert_eq!(received, vec![1, 2]);
        assert_eq!(stats.frames_captured.get(), 2);
        assert_eq!(stats.frames_dropped.get(), 0);
    }

    #[test]
    fn test_run_drops_newest_frames_when_encoder_lags() {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Stats::default());
        let source = ScriptedSource {
            frames: (1..=5).map(|byte| Some(frame(byte))).collect(),
            shutdown_flag: Arc::clone(&shutdown_flag),
        };
        let (tx, rx) = crossbeam::channel::bounded(2);

        run(source, tx, shutdown_flag, Arc::clone(&stats)).unwrap();

        let received: Vec<u8> = rx.iter().map(|frame| frame.data[0]).collect();
        assert_eq!(received, vec![1, 2]);
        assert_eq!(stats.frames_captured.get(), 5);
        assert_eq!(stats.frames_dropped.get(), 3);
    }
}
