//! Raw frame bytes → `PacketRecord`.
//!
//! Extraction never fails: a frame too short or too foreign to decode
//! still produces a record with zeroed address/port fields, the capture
//! timestamp, and the full hex payload, so every captured byte remains
//! exportable.

use std::net::Ipv4Addr;

use crate::config::SeedRule;
use crate::protocol::ethernet::EthernetHeader;
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::tcp::TcpHeader;
use crate::protocol::udp::UdpHeader;
use crate::protocol::IpProtocol;
use crate::record::{capture_timestamp, encode_frame_hex, merge_verdict, PacketRecord};

/// Decode one captured frame into a record.
///
/// `ts_sec`/`ts_micros` come straight from the capture header. The seed
/// rule plants the baseline malicious flag (SYN toward the watch port);
/// downstream detectors OR into it and never clear it.
pub fn extract(
    id: u64,
    frame: &[u8],
    ts_sec: u32,
    ts_micros: u32,
    seed: &SeedRule,
) -> PacketRecord {
    let mut record = PacketRecord {
        id,
        timestamp: capture_timestamp(ts_sec, ts_micros),
        source_ip: Ipv4Addr::UNSPECIFIED,
        dest_ip: Ipv4Addr::UNSPECIFIED,
        source_port: 0,
        dest_port: 0,
        protocol: 0,
        size: frame.len() as u32,
        flags: String::new(),
        is_malicious: false,
        data: encode_frame_hex(frame),
        ml_confidence: None,
    };

    let Ok(eth) = EthernetHeader::parse(frame) else {
        return record;
    };
    // The IP version nibble, not the EtherType, decides whether this is
    // IPv4: feed sources include cooked frames with unreliable
    // EtherType fields.
    let Ok(ip) = Ipv4Header::parse(eth.payload()) else {
        return record;
    };

    record.source_ip = ip.src_addr();
    record.dest_ip = ip.dst_addr();
    record.protocol = ip.protocol_raw();

    let transport = ip.payload();
    if transport.len() < 4 {
        return record;
    }

    match IpProtocol::from(record.protocol) {
        IpProtocol::Tcp => match TcpHeader::parse(transport) {
            Ok(tcp) => {
                record.source_port = tcp.src_port();
                record.dest_port = tcp.dst_port();
                record.flags = tcp.symbol_string();
                if seed.enabled {
                    let hit = tcp.syn() && tcp.dst_port() == seed.port;
                    record.is_malicious = merge_verdict(record.is_malicious, hit);
                }
            }
            // Ports fit in the captured bytes but the flags octet does not.
            Err(_) => {
                let (src, dst) = port_pair(transport);
                record.source_port = src;
                record.dest_port = dst;
            }
        },
        IpProtocol::Udp => match UdpHeader::parse(transport) {
            Ok(udp) => {
                record.source_port = udp.src_port();
                record.dest_port = udp.dst_port();
            }
            Err(_) => {
                let (src, dst) = port_pair(transport);
                record.source_port = src;
                record.dest_port = dst;
            }
        },
        _ => {}
    }

    record
}

/// Big-endian port pair from the first four transport bytes.
/// Caller guarantees at least four bytes.
fn port_pair(transport: &[u8]) -> (u16, u16) {
    (
        u16::from_be_bytes([transport[0], transport[1]]),
        u16::from_be_bytes([transport[2], transport[3]]),
    )
}
