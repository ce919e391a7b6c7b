//! Zero-copy IPv4 header parser.
//!
//! IPv4 header layout (20-60 bytes):
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |Version|  IHL  |Type of Service|          Total Length         |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |         Identification        |Flags|      Fragment Offset    |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |  Time to Live |    Protocol   |         Header Checksum       |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                       Source Address                          |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                    Destination Address                        |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! Unlike a strict parser this one only demands the 20 fixed bytes: a
//! capture that truncated the options area still yields addresses and the
//! protocol number, and the caller clamps the transport offset itself.

use super::{IpProtocol, ParseError};
use std::fmt;
use std::net::Ipv4Addr;

/// Minimum IPv4 header length (no options)
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Zero-copy IPv4 header.
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    data: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    /// Parse an IPv4 header from a byte slice.
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: IPV4_MIN_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = (data[0] >> 4) & 0x0F;
        if version != 4 {
            return Err(ParseError::InvalidHeader(format!(
                "expected IPv4 (version 4), got version {}",
                version
            )));
        }

        let ihl = (data[0] & 0x0F) as usize;
        let header_len = ihl * 4;

        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(ParseError::InvalidHeader(format!(
                "IHL too small: {} (min 5)",
                ihl
            )));
        }

        Ok(Ipv4Header { data, header_len })
    }

    /// IP version (always 4).
    #[inline]
    pub fn version(&self) -> u8 {
        (self.data[0] >> 4) & 0x0F
    }

    /// Internet Header Length in 32-bit words.
    #[inline]
    pub fn ihl(&self) -> u8 {
        self.data[0] & 0x0F
    }

    /// Header length in bytes. May exceed the captured bytes when the
    /// options area was truncated by the capture.
    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Total length of the IP packet (header + payload) in bytes.
    #[inline]
    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// Time to Live.
    #[inline]
    pub fn ttl(&self) -> u8 {
        self.data[8]
    }

    /// Protocol number.
    #[inline]
    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.data[9])
    }

    /// Protocol number as raw u8.
    #[inline]
    pub fn protocol_raw(&self) -> u8 {
        self.data[9]
    }

    /// Source IP address.
    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[12], self.data[13], self.data[14], self.data[15])
    }

    /// Destination IP address.
    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[16], self.data[17], self.data[18], self.data[19])
    }

    /// The bytes after the IP header, clamped to what was captured.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let start = self.header_len.min(self.data.len());
        &self.data[start..]
    }
}

impl<'a> fmt::Display for Ipv4Header<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} proto={} ttl={} len={}",
            self.src_addr(),
            self.dst_addr(),
            self.protocol(),
            self.ttl(),
            self.total_length()
        )
    }
}
