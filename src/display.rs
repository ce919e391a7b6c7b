//! Record display / pretty-printing for the CLI.

use crate::protocol::IpProtocol;
use crate::record::PacketRecord;
use crate::session::ProtocolStats;

/// Print a one-line summary of a decoded record.
pub fn print_record_summary(record: &PacketRecord) {
    let proto = IpProtocol::from(record.protocol);

    let endpoints = match proto {
        IpProtocol::Tcp | IpProtocol::Udp => format!(
            "{}:{} -> {}:{}",
            record.source_ip, record.source_port, record.dest_ip, record.dest_port
        ),
        _ => format!("{} -> {}", record.source_ip, record.dest_ip),
    };

    let mut line = format!(
        "#{:<6} {} {:<5} {:<42} {:>5}B",
        record.id,
        record.timestamp.format("%H:%M:%S%.6f"),
        proto.to_string(),
        endpoints,
        record.size,
    );

    if !record.flags.is_empty() {
        line.push_str(&format!(" [{}]", record.flags));
    }
    if let Some(confidence) = record.ml_confidence {
        line.push_str(&format!(" ml={:.2}", confidence));
    }
    if record.is_malicious {
        line.push_str(" !! malicious");
    }

    println!("{}", line);
}

/// Print the end-of-run summary block.
pub fn print_session_summary(stats: &ProtocolStats, flood_seen: bool) {
    println!();
    println!("{}", "=".repeat(50));
    println!("Inspection complete.");
    println!("  Packets:    {}", stats.total);
    println!("  Malicious:  {}", stats.malicious);
    println!(
        "  Protocols:  tcp={} udp={} icmp={} other={}",
        stats.tcp, stats.udp, stats.icmp, stats.other
    );
    println!(
        "  SYN flood:  {}",
        if flood_seen { "DETECTED" } else { "not detected" }
    );
    println!("{}", "=".repeat(50));
}
