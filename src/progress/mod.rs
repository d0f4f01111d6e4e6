//! Progress Channel (spec §4.7): a per-scan, single-writer, multi-reader
//! append-only stream of `ProgressEvent`s, grounded on the teacher's
//! `AppState.signal_broadcast: broadcast::Sender<WsServerEvent>` pattern.
//!
//! Slow subscribers never back-pressure the pipeline: `tokio::sync::broadcast`
//! already drops lagging receivers rather than blocking the sender, and a
//! bounded replay buffer backs best-effort reconnect-with-`lastSeq` semantics
//! for a grace window after a scan completes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{ProgressEvent, ProgressEventKind};

const REPLAY_CAPACITY: usize = 256;
const BROADCAST_CAPACITY: usize = 256;

struct ScanChannel {
    sender: broadcast::Sender<ProgressEvent>,
    replay: Mutex<VecDeque<ProgressEvent>>,
    next_sequence: AtomicU64,
}

impl ScanChannel {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender, replay: Mutex::new(VecDeque::with_capacity(REPLAY_CAPACITY)), next_sequence: AtomicU64::new(1) }
    }

    fn publish(&self, scan_id: Uuid, event: ProgressEventKind) -> ProgressEvent {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let event = ProgressEvent { scan_id, sequence, event, payload: None };

        let mut replay = self.replay.lock();
        if replay.len() == REPLAY_CAPACITY {
            replay.pop_front();
        }
        replay.push_back(event.clone());
        drop(replay);

        // No active subscribers is not an error: the event is still recorded
        // in the replay buffer for anyone who reconnects.
        let _ = self.sender.send(event.clone());
        event
    }

    fn replay_since(&self, since: u64) -> Vec<ProgressEvent> {
        self.replay.lock().iter().filter(|e| e.sequence > since).cloned().collect()
    }
}

/// Owns every scan's progress channel for the lifetime of the process.
#[derive(Default)]
pub struct ProgressHub {
    channels: parking_lot::RwLock<HashMap<Uuid, Arc<ScanChannel>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_for(&self, scan_id: Uuid) -> Arc<ScanChannel> {
        if let Some(channel) = self.channels.read().get(&scan_id) {
            return channel.clone();
        }
        self.channels.write().entry(scan_id).or_insert_with(|| Arc::new(ScanChannel::new())).clone()
    }

    /// Publishes an event, assigning it the next sequence number for this scan.
    pub fn publish(&self, scan_id: Uuid, event: ProgressEventKind) -> ProgressEvent {
        self.channel_for(scan_id).publish(scan_id, event)
    }

    pub fn subscribe(&self, scan_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
        self.channel_for(scan_id).sender.subscribe()
    }

    /// Buffered events with `sequence > since`, for SSE resume (`?since=`).
    pub fn replay_since(&self, scan_id: Uuid, since: u64) -> Vec<ProgressEvent> {
        match self.channels.read().get(&scan_id) {
            Some(channel) => channel.replay_since(since),
            None => Vec::new(),
        }
    }

    /// Drops a scan's channel. Callers should only do this after the grace
    /// window for reconnecting subscribers has elapsed.
    pub fn remove(&self, scan_id: Uuid) {
        self.channels.write().remove(&scan_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotone_and_starts_at_one() {
        let hub = ProgressHub::new();
        let scan_id = Uuid::new_v4();
        let first = hub.publish(scan_id, ProgressEventKind::Start);
        let second = hub.publish(scan_id, ProgressEventKind::AnalysisStart);
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
    }

    #[test]
    fn replay_since_excludes_already_seen_events() {
        let hub = ProgressHub::new();
        let scan_id = Uuid::new_v4();
        hub.publish(scan_id, ProgressEventKind::Start);
        hub.publish(scan_id, ProgressEventKind::AnalysisStart);
        hub.publish(scan_id, ProgressEventKind::SynthesisStart);

        let replay = hub.replay_since(scan_id, 1);
        assert_eq!(replay.len(), 2);
        assert!(replay.iter().all(|e| e.sequence > 1));
    }

    #[tokio::test]
    async fn live_subscriber_receives_published_events() {
        let hub = ProgressHub::new();
        let scan_id = Uuid::new_v4();
        let mut rx = hub.subscribe(scan_id);
        hub.publish(scan_id, ProgressEventKind::Start);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.sequence, 1);
    }
}
