//! libpcap capture codec: byte buffer ↔ packet records.
//!
//! The reader is deliberately tolerant. Capture files in the wild are
//! frequently cut off mid-record or carry a corrupt header or two, and a
//! partially readable capture is still worth inspecting: a truncated tail
//! ends the walk with everything parsed so far, and a header that fails
//! the sanity bound is skipped at its 16-byte stride so the walk can
//! resync on the next record.
//!
//! The writer always emits the canonical big-endian, microsecond-magic
//! form regardless of what was read.

use std::fmt;

use crate::config::SeedRule;
use crate::decoder;
use crate::record::PacketRecord;

/// Microsecond-precision capture magic.
pub const MAGIC_MICROS: u32 = 0xA1B2_C3D4;
/// Nanosecond-precision variant. Accepted on read; the fractional field
/// is still interpreted as microseconds, as the upstream tooling does.
pub const MAGIC_NANOS: u32 = 0xA1B2_3C4D;

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

const VERSION_MAJOR: u16 = 2;
const VERSION_MINOR: u16 = 4;
const SNAPLEN: u32 = 65_535;
/// Link-layer type 1 = Ethernet.
const LINKTYPE_ETHERNET: u32 = 1;

/// Captured lengths beyond this are treated as header corruption, not
/// giant frames.
const MAX_CAPTURED_LEN: usize = 256 * 1024;

/// The capture buffer is not a readable libpcap file.
#[derive(Debug)]
pub enum FormatError {
    /// Shorter than the 24-byte global header.
    TooShort { actual: usize },
    /// Magic number matched neither byte order.
    InvalidMagic(u32),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::TooShort { actual } => {
                write!(f, "invalid capture format: {} bytes is too short", actual)
            }
            FormatError::InvalidMagic(magic) => {
                write!(f, "invalid capture format: unrecognized magic 0x{:08x}", magic)
            }
        }
    }
}

impl std::error::Error for FormatError {}

#[derive(Clone, Copy)]
enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    fn u32(&self, buf: &[u8], offset: usize) -> u32 {
        let b = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        match self {
            ByteOrder::Big => u32::from_be_bytes(b),
            ByteOrder::Little => u32::from_le_bytes(b),
        }
    }
}

/// Decode a capture buffer into records, numbering them from 1.
pub fn decode(bytes: &[u8], seed: &SeedRule) -> Result<Vec<PacketRecord>, FormatError> {
    decode_from(bytes, 1, seed)
}

/// Decode a capture buffer, numbering records from `first_id` so a
/// session can hand out its own id range.
pub fn decode_from(
    bytes: &[u8],
    first_id: u64,
    seed: &SeedRule,
) -> Result<Vec<PacketRecord>, FormatError> {
    if bytes.len() < GLOBAL_HEADER_LEN {
        return Err(FormatError::TooShort { actual: bytes.len() });
    }

    let magic_be = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic_le = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let order = if magic_be == MAGIC_MICROS || magic_be == MAGIC_NANOS {
        ByteOrder::Big
    } else if magic_le == MAGIC_MICROS || magic_le == MAGIC_NANOS {
        ByteOrder::Little
    } else {
        return Err(FormatError::InvalidMagic(magic_be));
    };

    let mut records = Vec::new();
    let mut id = first_id;
    let mut offset = GLOBAL_HEADER_LEN;

    while offset + RECORD_HEADER_LEN <= bytes.len() {
        let ts_sec = order.u32(bytes, offset);
        let ts_frac = order.u32(bytes, offset + 4);
        let captured_len = order.u32(bytes, offset + 8) as usize;
        let original_len = order.u32(bytes, offset + 12);

        if captured_len > MAX_CAPTURED_LEN {
            // Corrupt record header: skip the stride and resync.
            tracing::warn!(
                offset,
                captured_len,
                "skipping malformed packet header in capture"
            );
            offset += RECORD_HEADER_LEN;
            continue;
        }

        let start = offset + RECORD_HEADER_LEN;
        let end = start + captured_len;
        if end > bytes.len() {
            // Truncated tail: keep what we have, emit no partial record.
            tracing::debug!(
                offset,
                captured_len,
                remaining = bytes.len() - start,
                "capture ends mid-record"
            );
            break;
        }

        let mut record = decoder::extract(id, &bytes[start..end], ts_sec, ts_frac, seed);
        // The wire knows the pre-truncation length; the frame does not.
        record.size = original_len;
        records.push(record);

        id += 1;
        offset = end;
    }

    Ok(records)
}

/// Serialize records back to canonical big-endian libpcap bytes.
pub fn encode(records: &[PacketRecord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        GLOBAL_HEADER_LEN + records.iter().map(|r| RECORD_HEADER_LEN + r.data.len() / 3 + 1).sum::<usize>(),
    );

    out.extend_from_slice(&MAGIC_MICROS.to_be_bytes());
    out.extend_from_slice(&VERSION_MAJOR.to_be_bytes());
    out.extend_from_slice(&VERSION_MINOR.to_be_bytes());
    out.extend_from_slice(&0i32.to_be_bytes()); // thiszone
    out.extend_from_slice(&0u32.to_be_bytes()); // sigfigs
    out.extend_from_slice(&SNAPLEN.to_be_bytes());
    out.extend_from_slice(&LINKTYPE_ETHERNET.to_be_bytes());

    for record in records {
        let frame = record.frame_bytes();
        let captured_len = frame.len() as u32;
        let original_len = if record.size > 0 { record.size } else { captured_len };
        let ts_sec = record.timestamp.timestamp().clamp(0, u32::MAX as i64) as u32;
        let ts_micros = record.timestamp.timestamp_subsec_micros();

        out.extend_from_slice(&ts_sec.to_be_bytes());
        out.extend_from_slice(&ts_micros.to_be_bytes());
        out.extend_from_slice(&captured_len.to_be_bytes());
        out.extend_from_slice(&original_len.to_be_bytes());
        out.extend_from_slice(&frame);
    }

    out
}
