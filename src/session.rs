//! The capture session: the ordered record store, its derived counters,
//! and the single mutation path every producer goes through.
//!
//! Single-writer by construction: all methods take `&mut self` and the
//! session holds no locks. Two producers (say a file ingest and a live
//! feed) must be serialized by the caller. Appends are batch-atomic: a
//! batch contributes zero or more complete records, never a partial one,
//! and a failed decode leaves the session exactly as it was.

use std::fmt;

use crate::analysis::dedup::FingerprintSet;
use crate::analysis::flood;
use crate::config::DetectionConfig;
use crate::ml::MlResponse;
use crate::pcap::{self, FormatError};
use crate::record::{merge_verdict, PacketRecord};

/// Protocol-distribution counters, maintained incrementally and always
/// equal to a fresh recount over the record sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolStats {
    pub total: u64,
    pub malicious: u64,
    pub tcp: u64,
    pub udp: u64,
    pub icmp: u64,
    pub other: u64,
}

impl ProtocolStats {
    fn observe(&mut self, record: &PacketRecord) {
        self.total += 1;
        if record.is_malicious {
            self.malicious += 1;
        }
        match record.protocol {
            6 => self.tcp += 1,
            17 => self.udp += 1,
            1 => self.icmp += 1,
            _ => self.other += 1,
        }
    }

    /// Recount from scratch. The incremental counters must always agree
    /// with this.
    pub fn recount(records: &[PacketRecord]) -> Self {
        let mut stats = ProtocolStats::default();
        for record in records {
            stats.observe(record);
        }
        stats
    }
}

impl fmt::Display for ProtocolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} packets ({} malicious) | tcp={} udp={} icmp={} other={}",
            self.total, self.malicious, self.tcp, self.udp, self.icmp, self.other
        )
    }
}

/// What one ingest batch did to the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendSummary {
    pub appended: usize,
    pub duplicates: usize,
    /// True when the flood detector fired on this batch.
    pub flood: bool,
}

#[derive(Debug)]
pub enum IngestError {
    /// Zero-length input, rejected before touching session state.
    EmptyInput,
    Format(FormatError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::EmptyInput => write!(f, "empty capture input"),
            IngestError::Format(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<FormatError> for IngestError {
    fn from(err: FormatError) -> Self {
        IngestError::Format(err)
    }
}

/// One analysis run: records, counters, duplicate memory, id allocator.
#[derive(Debug)]
pub struct CaptureSession {
    config: DetectionConfig,
    records: Vec<PacketRecord>,
    stats: ProtocolStats,
    dedup: FingerprintSet,
    next_id: u64,
}

impl CaptureSession {
    pub fn new(config: DetectionConfig) -> Self {
        let dedup = FingerprintSet::new(config.dedup.clone());
        CaptureSession {
            config,
            records: Vec::new(),
            stats: ProtocolStats::default(),
            dedup,
            next_id: 1,
        }
    }

    pub fn records(&self) -> &[PacketRecord] {
        &self.records
    }

    pub fn stats(&self) -> &ProtocolStats {
        &self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Decode a capture buffer and append its records.
    ///
    /// Empty input is rejected outright; a format error propagates
    /// without touching accumulated state.
    pub fn ingest_capture(&mut self, bytes: &[u8]) -> Result<AppendSummary, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::EmptyInput);
        }
        let records = pcap::decode_from(bytes, self.next_id, &self.config.seed())?;
        Ok(self.append_batch(records))
    }

    /// Append pre-decoded records from a live-feed collaborator.
    ///
    /// Feed ids are collaborator-scoped, so the session re-assigns them
    /// into its own space to keep the uniqueness invariant.
    pub fn ingest_records(&mut self, records: Vec<PacketRecord>) -> AppendSummary {
        let renumbered = records
            .into_iter()
            .map(|mut record| {
                record.id = 0; // assigned on append
                record
            })
            .collect();
        self.append_batch(renumbered)
    }

    fn append_batch(&mut self, records: Vec<PacketRecord>) -> AppendSummary {
        let batch_start = self.records.len();
        let mut duplicates = 0;

        for mut record in records {
            if self.dedup.observe(&record) {
                duplicates += 1;
                continue;
            }
            if record.id == 0 {
                record.id = self.next_id;
            }
            self.next_id = self.next_id.max(record.id + 1);
            self.stats.observe(&record);
            self.records.push(record);
        }

        let flood = self.config.flood.enabled
            && flood::is_flood_in_progress(
                &self.records,
                self.config.watch_port,
                &self.config.flood,
            );
        if flood {
            // Only the newly appended batch gets marked; earlier records
            // keep whatever verdicts earlier passes gave them.
            for record in &mut self.records[batch_start..] {
                if record.is_bare_syn() {
                    let was = record.is_malicious;
                    record.is_malicious = merge_verdict(record.is_malicious, true);
                    if !was {
                        self.stats.malicious += 1;
                    }
                }
            }
        }

        AppendSummary {
            appended: self.records.len() - batch_start,
            duplicates,
            flood,
        }
    }

    /// Merge an ML pass into the records: predictions OR into the
    /// malicious flag, confidences overwrite (latest pass wins).
    pub fn apply_classification(&mut self, response: &MlResponse) {
        for (record, prediction) in self.records.iter_mut().zip(&response.predictions) {
            let was = record.is_malicious;
            record.is_malicious = merge_verdict(record.is_malicious, prediction.is_malicious());
            if record.is_malicious && !was {
                self.stats.malicious += 1;
            }
        }
        for (record, confidence) in self.records.iter_mut().zip(&response.confidence) {
            record.ml_confidence = Some(*confidence);
        }
    }

    /// Drop everything: records, counters, duplicate memory, ids.
    pub fn clear(&mut self) {
        self.records.clear();
        self.stats = ProtocolStats::default();
        self.dedup.clear();
        self.next_id = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::client::{Prediction, Summary};
    use crate::record::capture_timestamp;
    use std::net::Ipv4Addr;

    fn detection() -> DetectionConfig {
        DetectionConfig::default()
    }

    fn record(id: u64, secs: u32, protocol: u8, dest_port: u16, flags: &str) -> PacketRecord {
        PacketRecord {
            id,
            timestamp: capture_timestamp(secs, 0),
            source_ip: Ipv4Addr::new(10, 0, 0, (id % 200 + 1) as u8),
            dest_ip: Ipv4Addr::new(10, 0, 0, 250),
            source_port: 40000 + id as u16,
            dest_port,
            protocol,
            size: 60,
            flags: flags.into(),
            is_malicious: false,
            data: String::new(),
            ml_confidence: None,
        }
    }

    #[test]
    fn counters_match_recount_after_ingest() {
        let mut session = CaptureSession::new(detection());
        let batch: Vec<_> = (0..20)
            .map(|i| match i % 4 {
                0 => record(0, 1000 + i, 6, 8080, "PA"),
                1 => record(0, 1000 + i, 17, 53, ""),
                2 => record(0, 1000 + i, 1, 0, ""),
                _ => record(0, 1000 + i, 47, 0, ""),
            })
            .collect();
        session.ingest_records(batch);

        assert_eq!(session.stats().total, 20);
        assert_eq!(session.stats().tcp, 5);
        assert_eq!(session.stats().udp, 5);
        assert_eq!(session.stats().icmp, 5);
        assert_eq!(session.stats().other, 5);
        assert_eq!(*session.stats(), ProtocolStats::recount(session.records()));
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let mut session = CaptureSession::new(detection());
        session.ingest_records((0..5).map(|i| record(99, 1000 + i, 17, 53, "")).collect());
        let ids: Vec<u64> = session.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn flood_marks_only_new_batch_syns() {
        let mut session = CaptureSession::new(detection());
        // A quiet baseline: 69 ACKs, below every rule.
        session.ingest_records((0..69).map(|i| record(0, 1000 + i, 6, 8080, "A")).collect());
        assert_eq!(session.stats().malicious, 0);

        // 31 bare-SYNs from distinct sources trip Rule A.
        let summary = session.ingest_records(
            (0..31)
                .map(|i| record(0, 2000 + i * 11, 6, 8080, "S"))
                .collect(),
        );
        assert!(summary.flood);
        let flagged = session
            .records()
            .iter()
            .filter(|r| r.is_malicious)
            .count();
        assert_eq!(flagged, 31);
        assert_eq!(session.stats().malicious, 31);
        assert_eq!(*session.stats(), ProtocolStats::recount(session.records()));
    }

    #[test]
    fn duplicates_are_dropped_before_the_window() {
        let mut session = CaptureSession::new(detection());
        let syn = record(0, 1000, 6, 8080, "S");
        let mut twin = syn.clone();
        twin.timestamp = capture_timestamp(1004, 0); // same 10 s bucket
        let summary = session.ingest_records(vec![syn, twin]);
        assert_eq!(summary.appended, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(session.stats().total, 1);
    }

    #[test]
    fn classification_merges_and_never_clears() {
        let mut session = CaptureSession::new(detection());
        let mut seeded = record(0, 1000, 6, 80, "S");
        seeded.is_malicious = true; // a prior detector's verdict
        let benign = record(0, 1001, 17, 53, "");
        session.ingest_records(vec![seeded, benign]);

        let response = MlResponse {
            predictions: vec![Prediction::Flag(false), Prediction::Flag(true)],
            confidence: vec![0.2, 0.9],
            summary: Summary {
                total: 2,
                malicious: 1,
                benign: 1,
                accuracy: None,
            },
        };
        session.apply_classification(&response);

        // The false prediction must not clear the earlier verdict.
        assert!(session.records()[0].is_malicious);
        assert!(session.records()[1].is_malicious);
        assert_eq!(session.records()[0].ml_confidence, Some(0.2));
        assert_eq!(session.records()[1].ml_confidence, Some(0.9));
        assert_eq!(*session.stats(), ProtocolStats::recount(session.records()));
    }

    #[test]
    fn empty_input_is_rejected_without_state_change() {
        let mut session = CaptureSession::new(detection());
        session.ingest_records(vec![record(0, 1000, 17, 53, "")]);
        let err = session.ingest_capture(&[]).unwrap_err();
        assert!(matches!(err, IngestError::EmptyInput));
        assert_eq!(session.stats().total, 1);
    }

    #[test]
    fn format_error_leaves_accumulated_state_intact() {
        let mut session = CaptureSession::new(detection());
        session.ingest_records(vec![record(0, 1000, 17, 53, "")]);
        let err = session.ingest_capture(&[0u8; 40]).unwrap_err();
        assert!(matches!(err, IngestError::Format(_)));
        assert_eq!(session.stats().total, 1);
        assert_eq!(*session.stats(), ProtocolStats::recount(session.records()));
    }

    #[test]
    fn clear_resets_dedup_memory_too() {
        let mut session = CaptureSession::new(detection());
        let syn = record(0, 1000, 6, 8080, "S");
        session.ingest_records(vec![syn.clone()]);
        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.stats().total, 0);
        // The same record is new again after clear.
        let summary = session.ingest_records(vec![syn]);
        assert_eq!(summary.appended, 1);
        assert_eq!(session.records()[0].id, 1);
    }
}
