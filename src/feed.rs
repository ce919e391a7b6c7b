//! The live-feed collaborator boundary.
//!
//! Live acquisition happens out of process: a capture collaborator owns
//! the interface and streams pre-decoded, record-shaped JSON events plus
//! command acknowledgements. This module defines those shapes and a
//! bounded hand-off channel; the transport that carries the JSON (a
//! websocket, a pipe, a file of JSON lines) is deliberately not defined
//! here.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::record::PacketRecord;
use crate::session::{AppendSummary, CaptureSession};

/// What the core asks the collaborator to capture. The filter expression
/// is opaque: forwarded verbatim, never parsed or validated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRequest {
    pub interface: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filter: Option<String>,
}

/// One event from the collaborator: either a decoded packet or a
/// command acknowledgement.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeedEvent {
    Ack(FeedAck),
    Packet(Box<PacketRecord>),
}

/// Acknowledgement of a save/load command, as the collaborator emits it.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedAck {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    pub status: String,
    #[serde(default)]
    pub packet_count: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Parse one JSON event off the feed.
pub fn parse_event(json: &str) -> Result<FeedEvent, serde_json::Error> {
    serde_json::from_str(json)
}

/// Producer half handed to whatever drives the transport.
pub struct FeedHandle {
    event_tx: Sender<FeedEvent>,
}

impl FeedHandle {
    /// Push an event toward the session. Returns false when the buffer
    /// is full or the drain is gone; the feed drops rather than blocks,
    /// like any capture source under backpressure.
    pub fn push(&self, event: FeedEvent) -> bool {
        match self.event_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer half owned by whoever owns the session.
pub struct FeedDrain {
    event_rx: Receiver<FeedEvent>,
}

/// What one drain pass delivered.
#[derive(Debug, Default)]
pub struct DrainSummary {
    pub appended: usize,
    pub duplicates: usize,
    pub floods: usize,
    pub acks: Vec<FeedAck>,
}

impl FeedDrain {
    /// Move every buffered event into the session. Packets append as one
    /// batch (so the flood pass sees them together); acks are returned
    /// to the caller.
    pub fn drain_into(&self, session: &mut CaptureSession) -> DrainSummary {
        let mut packets = Vec::new();
        let mut summary = DrainSummary::default();

        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                FeedEvent::Packet(record) => packets.push(*record),
                FeedEvent::Ack(ack) => summary.acks.push(ack),
            }
        }

        if !packets.is_empty() {
            let AppendSummary {
                appended,
                duplicates,
                flood,
            } = session.ingest_records(packets);
            summary.appended = appended;
            summary.duplicates = duplicates;
            if flood {
                summary.floods = 1;
            }
        }

        summary
    }
}

/// A bounded feed hand-off.
pub fn channel(capacity: usize) -> (FeedHandle, FeedDrain) {
    let (event_tx, event_rx) = bounded(capacity);
    (FeedHandle { event_tx }, FeedDrain { event_rx })
}
