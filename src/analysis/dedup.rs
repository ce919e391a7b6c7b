//! Duplicate-arrival suppression for streaming sources.
//!
//! Live feeds replay the same frame more than once (kernel duplication,
//! reconnects, overlapping sniffers), so each record is fingerprinted
//! before it enters the session. Bare-SYN records fingerprint on their
//! endpoint 4-tuple bucketed into a coarse time window: rapid repeated
//! SYNs from one endpoint pair count once per bucket, a deliberate
//! tradeoff against over-deduplicating a real flood. Everything else
//! fingerprints on the exact field tuple and never expires within the
//! session.
//!
//! State is owned by the session (no globals) and clears with it.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::record::PacketRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Bare-SYN bucket width in seconds.
    pub bucket_secs: u64,
    /// How long after its bucket closes a bare-SYN fingerprint lives.
    pub ttl_secs: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        DedupConfig {
            bucket_secs: 10,
            ttl_secs: 30.0,
        }
    }
}

/// How often (in stream seconds) to sweep expired fingerprints.
const SWEEP_INTERVAL_SECS: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Fingerprint {
    BareSyn {
        source_ip: Ipv4Addr,
        source_port: u16,
        dest_ip: Ipv4Addr,
        dest_port: u16,
        bucket: u64,
    },
    Exact {
        timestamp_micros: i64,
        source_ip: Ipv4Addr,
        source_port: u16,
        dest_ip: Ipv4Addr,
        dest_port: u16,
        protocol: u8,
        size: u32,
    },
}

/// Session-scoped duplicate memory: a fingerprint map with per-entry
/// expiry, swept lazily as records are observed.
#[derive(Debug)]
pub struct FingerprintSet {
    config: DedupConfig,
    /// Fingerprint → stream time after which it may be evicted
    /// (`None` = lives for the whole session).
    seen: AHashMap<Fingerprint, Option<f64>>,
    last_sweep: f64,
}

impl FingerprintSet {
    pub fn new(config: DedupConfig) -> Self {
        FingerprintSet {
            config,
            seen: AHashMap::new(),
            last_sweep: 0.0,
        }
    }

    /// Record an arrival. Returns true when the record duplicates one
    /// already seen (the caller drops it silently).
    pub fn observe(&mut self, record: &PacketRecord) -> bool {
        let now = record.timestamp_secs();
        let (fingerprint, expires_at) = self.fingerprint(record, now);

        // Time moves with the stream, not the wall clock.
        if now - self.last_sweep >= SWEEP_INTERVAL_SECS {
            self.sweep(now);
            self.last_sweep = now;
        }

        if self.seen.contains_key(&fingerprint) {
            return true;
        }
        self.seen.insert(fingerprint, expires_at);
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.last_sweep = 0.0;
    }

    fn fingerprint(&self, record: &PacketRecord, now: f64) -> (Fingerprint, Option<f64>) {
        if record.is_bare_syn() {
            let bucket_secs = self.config.bucket_secs.max(1);
            let bucket = (now.max(0.0) as u64) / bucket_secs;
            // Expiry counts from the bucket's close, so eviction can
            // never resurrect a duplicate the bucket could still admit.
            let bucket_end = ((bucket + 1) * bucket_secs) as f64;
            (
                Fingerprint::BareSyn {
                    source_ip: record.source_ip,
                    source_port: record.source_port,
                    dest_ip: record.dest_ip,
                    dest_port: record.dest_port,
                    bucket,
                },
                Some(bucket_end + self.config.ttl_secs),
            )
        } else {
            (
                Fingerprint::Exact {
                    timestamp_micros: record.timestamp.timestamp_micros(),
                    source_ip: record.source_ip,
                    source_port: record.source_port,
                    dest_ip: record.dest_ip,
                    dest_port: record.dest_port,
                    protocol: record.protocol,
                    size: record.size,
                },
                None,
            )
        }
    }

    fn sweep(&mut self, now: f64) {
        self.seen
            .retain(|_, expires_at| expires_at.map_or(true, |at| at > now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::capture_timestamp;

    fn syn_at(secs: u32, source_port: u16) -> PacketRecord {
        PacketRecord {
            id: 0,
            timestamp: capture_timestamp(secs, 0),
            source_ip: Ipv4Addr::new(10, 0, 0, 1),
            dest_ip: Ipv4Addr::new(10, 0, 0, 2),
            source_port,
            dest_port: 80,
            protocol: 6,
            size: 54,
            flags: "S".into(),
            is_malicious: false,
            data: String::new(),
            ml_confidence: None,
        }
    }

    fn udp_at(secs: u32, micros: u32) -> PacketRecord {
        let mut r = syn_at(secs, 53000);
        r.timestamp = capture_timestamp(secs, micros);
        r.protocol = 17;
        r.dest_port = 53;
        r.flags = String::new();
        r
    }

    #[test]
    fn same_bucket_syn_is_dropped() {
        let mut set = FingerprintSet::new(DedupConfig::default());
        assert!(!set.observe(&syn_at(1000, 40000)));
        // Same endpoints, 5 seconds later: same 10-second bucket.
        assert!(set.observe(&syn_at(1005, 40000)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn different_bucket_syn_is_retained() {
        let mut set = FingerprintSet::new(DedupConfig::default());
        assert!(!set.observe(&syn_at(1000, 40000)));
        // 1000 and 1011 fall in different buckets.
        assert!(!set.observe(&syn_at(1011, 40000)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn different_endpoints_never_collide() {
        let mut set = FingerprintSet::new(DedupConfig::default());
        assert!(!set.observe(&syn_at(1000, 40000)));
        assert!(!set.observe(&syn_at(1000, 40001)));
    }

    #[test]
    fn syn_fingerprints_expire_after_ttl() {
        let mut set = FingerprintSet::new(DedupConfig::default());
        assert!(!set.observe(&syn_at(1000, 40000)));
        // Far past bucket close + TTL; the sweep runs on this observe.
        assert!(!set.observe(&syn_at(1100, 41000)));
        // The original fingerprint is gone, so a same-endpoint SYN in a
        // fresh bucket is new.
        assert!(!set.observe(&syn_at(1101, 40000)));
        assert_eq!(set.len(), 2); // the 1000s entry was swept
    }

    #[test]
    fn exact_fingerprints_do_not_expire() {
        let mut set = FingerprintSet::new(DedupConfig::default());
        assert!(!set.observe(&udp_at(1000, 500)));
        assert!(set.observe(&udp_at(1000, 500)));
        // A long-later sweep must not evict it.
        assert!(!set.observe(&udp_at(5000, 0)));
        assert!(set.observe(&udp_at(1000, 500)));
    }

    #[test]
    fn identical_fields_differing_timestamp_are_distinct() {
        let mut set = FingerprintSet::new(DedupConfig::default());
        assert!(!set.observe(&udp_at(1000, 500)));
        assert!(!set.observe(&udp_at(1000, 501)));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut set = FingerprintSet::new(DedupConfig::default());
        assert!(!set.observe(&syn_at(1000, 40000)));
        set.clear();
        assert!(set.is_empty());
        assert!(!set.observe(&syn_at(1000, 40000)));
    }
}
