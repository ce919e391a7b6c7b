//! Sliding-window SYN-flood detection.
//!
//! Three rules vote over the trailing window, each tuned to a different
//! attack shape: Rule A catches volumetric floods by bare-SYN proportion,
//! Rule B catches distributed/spoofed many-to-one patterns at moderate
//! volume, and Rule C catches the single-target watch-port case below
//! Rule A's volume threshold.

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::record::PacketRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FloodConfig {
    pub enabled: bool,
    /// Trailing records considered by the rules.
    pub window: usize,
    /// Below this many records in the session, never report a flood.
    pub min_records: usize,
    /// Rule A: bare-SYN share of the window must exceed this (strict).
    pub syn_ratio: f64,
    /// Rule B: a destination must see more than this many distinct
    /// sources among the window's bare-SYNs.
    pub fanin_sources: usize,
    /// Rule B also requires more than this many bare-SYNs in the window.
    pub fanin_min_syns: usize,
    /// Rule C: more than this many bare-SYNs at the watch port.
    pub targeted_count: usize,
}

impl Default for FloodConfig {
    fn default() -> Self {
        FloodConfig {
            enabled: true,
            window: 100,
            min_records: 10,
            syn_ratio: 0.3,
            fanin_sources: 5,
            fanin_min_syns: 10,
            targeted_count: 3,
        }
    }
}

/// Pure function of the trailing window: is a SYN flood in progress?
///
/// The caller re-invokes this as batches arrive and, on a hit, marks the
/// bare-SYN records of the newly appended batch malicious.
pub fn is_flood_in_progress(
    records: &[PacketRecord],
    watch_port: u16,
    config: &FloodConfig,
) -> bool {
    if records.len() < config.min_records {
        return false;
    }

    let window = &records[records.len().saturating_sub(config.window)..];
    let syns: Vec<&PacketRecord> = window.iter().filter(|r| r.is_bare_syn()).collect();

    // Rule A: high proportion of bare-SYN traffic.
    if !window.is_empty() && syns.len() as f64 / window.len() as f64 > config.syn_ratio {
        return true;
    }

    // Rule B: many distinct sources converging on one destination,
    // the spoofed-source signature.
    if syns.len() > config.fanin_min_syns {
        let mut sources_by_dst: AHashMap<Ipv4Addr, AHashSet<Ipv4Addr>> = AHashMap::new();
        for syn in &syns {
            sources_by_dst
                .entry(syn.dest_ip)
                .or_default()
                .insert(syn.source_ip);
        }
        if sources_by_dst
            .values()
            .any(|sources| sources.len() > config.fanin_sources)
        {
            return true;
        }
    }

    // Rule C: bare-SYNs converging on the watch port.
    syns.iter().filter(|r| r.dest_port == watch_port).count() > config.targeted_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{capture_timestamp, PacketRecord};

    fn record(
        id: u64,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        dst_port: u16,
        protocol: u8,
        flags: &str,
    ) -> PacketRecord {
        PacketRecord {
            id,
            timestamp: capture_timestamp(1_700_000_000 + id as u32, 0),
            source_ip: src,
            dest_ip: dst,
            source_port: 40000 + id as u16,
            dest_port: dst_port,
            protocol,
            size: 60,
            flags: flags.into(),
            is_malicious: false,
            data: String::new(),
            ml_confidence: None,
        }
    }

    fn ack(id: u64) -> PacketRecord {
        record(
            id,
            Ipv4Addr::new(172, 16, 0, (id % 250 + 1) as u8),
            Ipv4Addr::new(172, 16, 0, 1),
            22000,
            6,
            "A",
        )
    }

    fn bare_syn(id: u64, src: Ipv4Addr, dst: Ipv4Addr, dst_port: u16) -> PacketRecord {
        record(id, src, dst, dst_port, 6, "S")
    }

    #[test]
    fn below_min_records_is_never_a_flood() {
        let src = Ipv4Addr::new(1, 2, 3, 4);
        let dst = Ipv4Addr::new(5, 6, 7, 8);
        let records: Vec<_> = (0..9).map(|i| bare_syn(i, src, dst, 80)).collect();
        assert!(!is_flood_in_progress(&records, 80, &FloodConfig::default()));
    }

    #[test]
    fn rule_a_proportion_is_strictly_greater() {
        let src = Ipv4Addr::new(1, 2, 3, 4);
        let dst = Ipv4Addr::new(5, 6, 7, 8);
        // Single source, off-watch port: rules B and C stay quiet.
        let mut records: Vec<_> = (0..70).map(ack).collect();
        records.extend((70..100).map(|i| bare_syn(i, src, dst, 8080)));
        assert_eq!(records.len(), 100);
        // 30/100 = 0.3 exactly: not a flood.
        assert!(!is_flood_in_progress(&records, 80, &FloodConfig::default()));

        // 31/100: flood.
        let mut records: Vec<_> = (0..69).map(ack).collect();
        records.extend((69..100).map(|i| bare_syn(i, src, dst, 8080)));
        assert_eq!(records.len(), 100);
        assert!(is_flood_in_progress(&records, 80, &FloodConfig::default()));
    }

    #[test]
    fn rule_b_distinct_source_fan_in() {
        let target = Ipv4Addr::new(10, 0, 0, 2);
        let decoy = Ipv4Addr::new(10, 0, 0, 99);

        // 40 records, 12 bare-SYNs (ratio 0.3, Rule A quiet), all at
        // off-watch ports (Rule C quiet). Six distinct sources hit the
        // target; the other six SYNs share one source toward a decoy.
        let mut records: Vec<_> = (0..28).map(ack).collect();
        for i in 0..6u64 {
            records.push(bare_syn(
                28 + i,
                Ipv4Addr::new(192, 168, 0, (10 + i) as u8),
                target,
                8080,
            ));
        }
        for i in 0..6u64 {
            records.push(bare_syn(34 + i, Ipv4Addr::new(192, 168, 0, 200), decoy, 8081));
        }
        assert_eq!(records.len(), 40);
        assert!(is_flood_in_progress(&records, 80, &FloodConfig::default()));

        // Same shape with only five distinct sources at the target.
        let mut records: Vec<_> = (0..28).map(ack).collect();
        for i in 0..6u64 {
            let octet = 10 + (i % 5); // five distinct, one repeated
            records.push(bare_syn(
                28 + i,
                Ipv4Addr::new(192, 168, 0, octet as u8),
                target,
                8080,
            ));
        }
        for i in 0..6u64 {
            records.push(bare_syn(34 + i, Ipv4Addr::new(192, 168, 0, 200), decoy, 8081));
        }
        assert!(!is_flood_in_progress(&records, 80, &FloodConfig::default()));
    }

    #[test]
    fn rule_c_watch_port_concentration() {
        let src = Ipv4Addr::new(1, 2, 3, 4);
        let dst = Ipv4Addr::new(5, 6, 7, 8);
        // 4 bare-SYNs at the watch port inside a 20-record window:
        // ratio 0.2 keeps Rule A quiet, one source keeps Rule B quiet.
        let mut records: Vec<_> = (0..16).map(ack).collect();
        records.extend((16..20).map(|i| bare_syn(i, src, dst, 80)));
        assert!(is_flood_in_progress(&records, 80, &FloodConfig::default()));

        // Exactly 3 is below the strict threshold.
        let mut records: Vec<_> = (0..17).map(ack).collect();
        records.extend((17..20).map(|i| bare_syn(i, src, dst, 80)));
        assert!(!is_flood_in_progress(&records, 80, &FloodConfig::default()));

        // The port is a parameter, not a constant.
        let mut records: Vec<_> = (0..16).map(ack).collect();
        records.extend((16..20).map(|i| bare_syn(i, src, dst, 8443)));
        assert!(!is_flood_in_progress(&records, 80, &FloodConfig::default()));
        assert!(is_flood_in_progress(&records, 8443, &FloodConfig::default()));
    }

    #[test]
    fn only_the_trailing_window_counts() {
        let src = Ipv4Addr::new(1, 2, 3, 4);
        let dst = Ipv4Addr::new(5, 6, 7, 8);
        // 31 bare-SYNs followed by 100 benign records: the SYNs have
        // scrolled out of the window.
        let mut records: Vec<_> = (0..31).map(|i| bare_syn(i, src, dst, 8080)).collect();
        records.extend((31..131).map(ack));
        assert!(!is_flood_in_progress(&records, 80, &FloodConfig::default()));
    }
}
