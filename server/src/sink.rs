use common::interface::{self, InterfaceError};
use thiserror::Error;

const SNAPSHOT_LENGTH: i32 = 65536;

/// Destination for replayed frames.
pub trait PacketSink: Send {
    fn send(&mut self, data: &[u8]) -> Result<(), SinkError>;
}

/// Injects frames on a local network interface.
pub struct PcapSink {
    capture: pcap::Capture<pcap::Active>,
}

impl PcapSink {
    pub fn open(device_name: &str) -> Result<Self, SinkError> {
        let device = interface::get_network_interface(device_name).map_err(SinkError::Interface)?;

        let capture = pcap::Capture::from_device(device)
            .map_err(SinkError::Pcap)?
            .snaplen(SNAPSHOT_LENGTH)
            .promisc(true)
            .open()
            .map_err(SinkError::Pcap)?;

        Ok(Self { capture })
    }
}

impl PacketSink for PcapSink {
    fn send(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.capture.sendpacket(data).map_err(SinkError::Pcap)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Replay device lookup failed.")]
    Interface(InterfaceError),

    #[error("Pcap Library error.")]
    Pcap(pcap::Error),
}

impl SinkError {
    pub fn additional_info(&self) -> Option<String> {
        match self {
            SinkError::Interface(err) => Some(format!(
                "{err} {}",
                err.additional_info().unwrap_or_default()
            )),
            SinkError::Pcap(err) => Some(err.to_string()),
        }
    }
}
