use crate::frame::{FrameHeader, OwnedFrame};
use bytes::{BufMut, Bytes, BytesMut};
use nom::IResult;
use nom::number::Endianness;
use thiserror::Error;

// Capture container: classic libpcap savefile format.
// https://www.ietf.org/archive/id/draft-gharris-opsawg-pcap-01.html

pub const MAGIC_MICROSECONDS: u32 = 0xa1b2_c3d4;
pub const MAGIC_NANOSECONDS: u32 = 0xa1b2_3c4d;
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;

pub const FILE_HEADER_LENGTH: usize = 24;
pub const RECORD_HEADER_LENGTH: usize = 16;
pub const DEFAULT_SNAPSHOT_LENGTH: u32 = 65536;

const MICROSECONDS_PER_SECOND: i64 = 1_000_000;
const NANOSECONDS_PER_MICROSECOND: u32 = 1_000;
const INITIAL_CAPACITY: usize = 64 * 1024;

/// File-header attributes every container carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHeader {
    pub link_type: u32,
    pub snapshot_length: u32,
}

impl CaptureHeader {
    pub fn new(link_type: u32, snapshot_length: u32) -> Self {
        Self {
            link_type,
            snapshot_length,
        }
    }
}

/// Sealed, immutable container bytes ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureContainer {
    bytes: Bytes,
    frames: usize,
}

impl CaptureContainer {
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }
}

/// Container parsed back into frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContainer {
    pub header: CaptureHeader,
    pub frames: Vec<OwnedFrame>,
}

/// Appends frame records behind a file header. <br>
/// Always writes little-endian files with microsecond timestamps.
pub struct ContainerWriter {
    header: CaptureHeader,
    buffer: BytesMut,
    frames: usize,
}

impl ContainerWriter {
    pub fn new(header: CaptureHeader) -> Self {
        let mut buffer = BytesMut::with_capacity(INITIAL_CAPACITY);
        write_file_header(&mut buffer, &header);

        Self {
            header,
            buffer,
            frames: 0,
        }
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn write_frame(&mut self, frame: &OwnedFrame) -> Result<(), ContainerError> {
        let header = &frame.header;
        if header.caplen as usize != frame.data.len() {
            return Err(ContainerError::LengthMismatch {
                caplen: header.caplen,
                data: frame.data.len(),
            });
        }
        if header.caplen > header.len {
            return Err(ContainerError::CaptureExceedsOriginal {
                caplen: header.caplen,
                len: header.len,
            });
        }
        let seconds = u32::try_from(header.tv_sec)
            .map_err(|_| ContainerError::TimestampOutOfRange)?;
        if !(0..MICROSECONDS_PER_SECOND).contains(&header.tv_usec) {
            return Err(ContainerError::TimestampOutOfRange);
        }
        let microseconds = u32::try_from(header.tv_usec)
            .map_err(|_| ContainerError::TimestampOutOfRange)?;

        self.buffer
            .reserve(RECORD_HEADER_LENGTH.saturating_add(frame.data.len()));
        self.buffer.put_u32_le(seconds);
        self.buffer.put_u32_le(microseconds);
        self.buffer.put_u32_le(header.caplen);
        self.buffer.put_u32_le(header.len);
        self.buffer.put_slice(&frame.data);
        self.frames += 1;

        Ok(())
    }

    pub fn finish(self) -> CaptureContainer {
        CaptureContainer {
            bytes: self.buffer.freeze(),
            frames: self.frames,
        }
    }

    /// Seals what was written so far and starts over with a fresh file header.
    pub fn reset(&mut self) -> CaptureContainer {
        let sealed = std::mem::replace(self, Self::new(self.header));
        sealed.finish()
    }
}

fn write_file_header(buffer: &mut BytesMut, header: &CaptureHeader) {
    buffer.put_u32_le(MAGIC_MICROSECONDS);
    buffer.put_u16_le(VERSION_MAJOR);
    buffer.put_u16_le(VERSION_MINOR);
    // GMT offset
    buffer.put_i32_le(0);
    // Timestamp accuracy
    buffer.put_u32_le(0);
    buffer.put_u32_le(header.snapshot_length);
    buffer.put_u32_le(header.link_type);
}

pub fn encode(
    header: CaptureHeader, frames: &[OwnedFrame],
) -> Result<CaptureContainer, ContainerError> {
    let mut writer = ContainerWriter::new(header);
    for frame in frames {
        writer.write_frame(frame)?;
    }

    Ok(writer.finish())
}

pub fn decode(bytes: &[u8]) -> Result<ParsedContainer, ContainerError> {
    let (mut rest, layout) = file_header(bytes)?;

    let mut frames = Vec::new();
    while !rest.is_empty() {
        let (next, frame) = record(rest, &layout, frames.len())?;
        frames.push(frame);
        rest = next;
    }

    Ok(ParsedContainer {
        header: layout.header,
        frames,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Precision {
    Microseconds,
    Nanoseconds,
}

struct FileLayout {
    endian: Endianness,
    precision: Precision,
    header: CaptureHeader,
}

fn file_header(input: &[u8]) -> Result<(&[u8], FileLayout), ContainerError> {
    // Magic number. 4 bytes
    let (rest, magic) = read_u32(input, Endianness::Big)
        .map_err(|_| ContainerError::TruncatedHeader)?;
    let (endian, precision) = match magic {
        MAGIC_MICROSECONDS => (Endianness::Big, Precision::Microseconds),
        MAGIC_NANOSECONDS => (Endianness::Big, Precision::Nanoseconds),
        value if value.swap_bytes() == MAGIC_MICROSECONDS => {
            (Endianness::Little, Precision::Microseconds)
        },
        value if value.swap_bytes() == MAGIC_NANOSECONDS => {
            (Endianness::Little, Precision::Nanoseconds)
        },
        value => return Err(ContainerError::UnknownMagic(value)),
    };

    let (rest, (major, minor, snapshot_length, link_type)) =
        header_fields(rest, endian).map_err(|_| ContainerError::TruncatedHeader)?;
    if major != VERSION_MAJOR {
        return Err(ContainerError::UnsupportedVersion(major, minor));
    }

    let layout = FileLayout {
        endian,
        precision,
        header: CaptureHeader::new(link_type, snapshot_length),
    };

    Ok((rest, layout))
}

fn header_fields(input: &[u8], endian: Endianness) -> IResult<&[u8], (u16, u16, u32, u32)> {
    // Version. 2 + 2 bytes
    let (rest, major) = read_u16(input, endian)?;
    let (rest, minor) = read_u16(rest, endian)?;
    // GMT offset and timestamp accuracy, both unused. 4 + 4 bytes
    let (rest, _) = read_bytes(rest, 8)?;
    // Snapshot length. 4 bytes
    let (rest, snapshot_length) = read_u32(rest, endian)?;
    // Link-layer type. 4 bytes
    let (rest, link_type) = read_u32(rest, endian)?;

    Ok((rest, (major, minor, snapshot_length, link_type)))
}

fn record<'a>(
    input: &'a [u8], layout: &FileLayout, index: usize,
) -> Result<(&'a [u8], OwnedFrame), ContainerError> {
    let (rest, (seconds, fraction, caplen, len)) =
        record_fields(input, layout.endian)
            .map_err(|_| ContainerError::TruncatedRecord(index))?;

    // Odd lengths are a per-frame concern of the consumer, the record itself is intact.
    let snapshot_length = layout.header.snapshot_length;
    if snapshot_length != 0 && caplen > snapshot_length {
        log::debug!(
            "Record #{}: capture length {} exceeds snapshot length {}.",
            index,
            caplen,
            snapshot_length
        );
    }

    let (rest, data) =
        read_bytes(rest, caplen).map_err(|_| ContainerError::TruncatedRecord(index))?;

    let microseconds = match layout.precision {
        Precision::Microseconds => fraction,
        Precision::Nanoseconds => fraction / NANOSECONDS_PER_MICROSECOND,
    };
    let header = FrameHeader {
        tv_sec: i64::from(seconds),
        tv_usec: i64::from(microseconds),
        caplen,
        len,
    };

    Ok((rest, OwnedFrame::new(header, data.to_vec())))
}

fn record_fields(input: &[u8], endian: Endianness) -> IResult<&[u8], (u32, u32, u32, u32)> {
    // Timestamp: seconds, then micro- or nanoseconds. 4 + 4 bytes
    let (rest, seconds) = read_u32(input, endian)?;
    let (rest, fraction) = read_u32(rest, endian)?;
    // Captured length. 4 bytes
    let (rest, caplen) = read_u32(rest, endian)?;
    // Original length. 4 bytes
    let (rest, len) = read_u32(rest, endian)?;

    Ok((rest, (seconds, fraction, caplen, len)))
}

fn read_u16(input: &[u8], endian: Endianness) -> IResult<&[u8], u16> {
    nom::number::complete::u16(endian)(input)
}

fn read_u32(input: &[u8], endian: Endianness) -> IResult<&[u8], u32> {
    nom::number::complete::u32(endian)(input)
}

fn read_bytes(input: &[u8], count: u32) -> IResult<&[u8], &[u8]> {
    nom::bytes::complete::take(count as usize)(input)
}

#[derive(Debug, Error, PartialEq)]
pub enum ContainerError {
    #[error("File header is truncated.")]
    TruncatedHeader,

    #[error("Unknown magic number {0:#010x}.")]
    UnknownMagic(u32),

    #[error("Unsupported format version {0}.{1}.")]
    UnsupportedVersion(u16, u16),

    #[error("Record #{0} is truncated.")]
    TruncatedRecord(usize),

    #[error("Capture length {caplen} exceeds original length {len}.")]
    CaptureExceedsOriginal { caplen: u32, len: u32 },

    #[error("Capture length {caplen} does not match data length {data}.")]
    LengthMismatch { caplen: u32, data: usize },

    #[error("Timestamp does not fit into a record.")]
    TimestampOutOfRange,
}
