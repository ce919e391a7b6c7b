//! The structured packet record shared by every stage of the pipeline.
//!
//! Records serialize with camelCase field names because the same JSON
//! shape crosses two external boundaries: the dashboard that renders
//! them and the live-feed collaborator that streams them in.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::protocol::IpProtocol;

/// One captured frame, decoded as far as the bytes allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketRecord {
    /// Unique within a capture session, stable for the record's lifetime.
    pub id: u64,
    /// Capture time, microsecond precision.
    pub timestamp: DateTime<Utc>,
    /// `0.0.0.0` when the frame could not be decoded that far.
    pub source_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
    /// Meaningful only for TCP/UDP; 0 otherwise.
    pub source_port: u16,
    pub dest_port: u16,
    /// IP protocol number (1=ICMP, 6=TCP, 17=UDP, others pass through).
    pub protocol: u8,
    /// Original on-wire frame length; may exceed the captured length.
    pub size: u32,
    /// TCP control-bit summary ("S", "PA", ...); empty for non-TCP.
    pub flags: String,
    /// OR-merged across detectors, never reset to false.
    pub is_malicious: bool,
    /// Captured frame bytes as lowercase space-separated hex octets.
    pub data: String,
    /// Confidence from the last ML pass, 0.0-1.0.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ml_confidence: Option<f64>,
}

impl PacketRecord {
    /// A TCP segment whose only set control bit is SYN.
    pub fn is_bare_syn(&self) -> bool {
        self.protocol == IpProtocol::Tcp.as_u8() && self.flags == "S"
    }

    /// The captured frame bytes, recovered from the hex encoding.
    pub fn frame_bytes(&self) -> Vec<u8> {
        decode_frame_hex(&self.data)
    }

    /// Capture time as fractional seconds since the epoch.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.timestamp() as f64 + self.timestamp.timestamp_subsec_micros() as f64 / 1e6
    }
}

/// The verdict reducer used at every detector boundary: a record that any
/// detector flagged stays flagged.
pub fn merge_verdict(existing: bool, detector: bool) -> bool {
    existing || detector
}

/// Build a capture timestamp from pcap header seconds + microseconds.
/// Fractional values of a full second or more roll into the seconds part.
pub fn capture_timestamp(ts_sec: u32, ts_micros: u32) -> DateTime<Utc> {
    let secs = ts_sec as i64 + (ts_micros / 1_000_000) as i64;
    let micros = ts_micros % 1_000_000;
    match Utc.timestamp_opt(secs, micros * 1_000) {
        chrono::LocalResult::Single(ts) => ts,
        _ => Utc.timestamp_opt(0, 0).unwrap(),
    }
}

/// Encode frame bytes as lowercase hex octets separated by single spaces.
pub fn encode_frame_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Decode a space-separated hex string back into bytes. Tokens that do
/// not parse as hex octets are dropped rather than aborting the frame.
pub fn decode_frame_hex(data: &str) -> Vec<u8> {
    data.split_whitespace()
        .filter_map(|tok| u8::from_str_radix(tok, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(id: u64) -> PacketRecord {
        PacketRecord {
            id,
            timestamp: capture_timestamp(1_700_000_000, 250_000),
            source_ip: Ipv4Addr::new(10, 0, 0, 1),
            dest_ip: Ipv4Addr::new(10, 0, 0, 2),
            source_port: 40000,
            dest_port: 80,
            protocol: 6,
            size: 54,
            flags: "S".into(),
            is_malicious: false,
            data: "de ad be ef".into(),
            ml_confidence: None,
        }
    }

    #[test]
    fn hex_round_trip() {
        let bytes = vec![0x00, 0x0f, 0xa1, 0xff];
        let hex = encode_frame_hex(&bytes);
        assert_eq!(hex, "00 0f a1 ff");
        assert_eq!(decode_frame_hex(&hex), bytes);
        assert_eq!(encode_frame_hex(&[]), "");
        assert!(decode_frame_hex("").is_empty());
    }

    #[test]
    fn bare_syn_requires_tcp_and_lone_syn() {
        let mut r = sample_record(1);
        assert!(r.is_bare_syn());
        r.flags = "SA".into();
        assert!(!r.is_bare_syn());
        r.flags = "S".into();
        r.protocol = 17;
        assert!(!r.is_bare_syn());
    }

    #[test]
    fn verdict_merge_is_monotonic() {
        assert!(merge_verdict(true, false));
        assert!(merge_verdict(false, true));
        assert!(merge_verdict(true, true));
        assert!(!merge_verdict(false, false));
    }

    #[test]
    fn timestamp_normalizes_overflowing_micros() {
        let ts = capture_timestamp(100, 2_500_000);
        assert_eq!(ts.timestamp(), 102);
        assert_eq!(ts.timestamp_subsec_micros(), 500_000);
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_value(sample_record(7)).unwrap();
        assert_eq!(json["sourceIp"], "10.0.0.1");
        assert_eq!(json["destPort"], 80);
        assert_eq!(json["isMalicious"], false);
        assert!(json.get("mlConfidence").is_none());
    }
}
