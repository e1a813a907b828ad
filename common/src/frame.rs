#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrame {
    pub header: FrameHeader,
    pub data: Vec<u8>,
}

impl OwnedFrame {
    pub fn new(header: FrameHeader, data: Vec<u8>) -> Self {
        Self { header, data }
    }
}

impl<'a> From<pcap::Packet<'a>> for OwnedFrame {
    fn from(packet: pcap::Packet<'a>) -> Self {
        OwnedFrame {
            header: FrameHeader::from(packet.header),
            data: packet.data.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub tv_sec: i64,
    pub tv_usec: i64,
    pub caplen: u32,
    pub len: u32,
}

impl FrameHeader {
    /// Part of the frame was cut off by the snapshot length.
    pub fn is_truncated(&self) -> bool {
        self.caplen != self.len
    }
}

impl From<&pcap::PacketHeader> for FrameHeader {
    fn from(header: &pcap::PacketHeader) -> Self {
        Self {
            tv_sec: i64::from(header.ts.tv_sec),
            tv_usec: i64::from(header.ts.tv_usec),
            caplen: header.caplen,
            len: header.len,
        }
    }
}
