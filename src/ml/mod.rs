//! Feature extraction and the bridge to the external statistical
//! classifier.
//!
//! The feature vector layout is a compatibility contract with the model
//! training pipeline: `[source ip, dest ip, protocol, frame size]`, in
//! that order, with dotted-quad addresses packed big-endian into u32.
//! Reordering or extending it requires a coordinated model retrain.

pub mod client;

pub use client::{fallback_classify, ClassifierOutcome, MlBridge, MlResponse};

use std::net::Ipv4Addr;

use crate::record::PacketRecord;

/// Dotted-quad address packed big-endian into an unsigned 32-bit value.
pub fn ip_to_u32(addr: Ipv4Addr) -> u32 {
    u32::from(addr)
}

/// Project a record into the classifier's feature vector.
pub fn extract_features(record: &PacketRecord) -> [f64; 4] {
    [
        ip_to_u32(record.source_ip) as f64,
        ip_to_u32(record.dest_ip) as f64,
        record.protocol as f64,
        record.size as f64,
    ]
}

/// Project records into the retraining CSV: one row per record with the
/// feature columns plus the current malicious label.
pub fn to_training_csv(records: &[PacketRecord]) -> String {
    let mut out = String::from("src_ip,dst_ip,proto,length,label\n");
    for record in records {
        let label = if record.is_malicious { 1 } else { 0 };
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            ip_to_u32(record.source_ip),
            ip_to_u32(record.dest_ip),
            record.protocol,
            record.size,
            label
        ));
    }
    out
}
