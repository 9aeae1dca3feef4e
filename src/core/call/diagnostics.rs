// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Diagnostics log: bounded chronological merge of local and remote
//! telemetry events.

use crate::core::types::{now_ms, TelemetrySample};
use crate::core::validation::MAX_DIAG_MESSAGE_CHARS;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Entries older than this are pruned on every insert, ms.
pub const RETENTION_MS: u64 = 15 * 60 * 1000;

/// One diagnostics event: a telemetry sample plus context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagEvent {
    /// Event time, ms since UNIX epoch.
    pub timestamp: u64,
    /// Peer that produced the event.
    pub peer_id: String,
    /// Round-trip time, ms.
    pub rtt_ms: u32,
    /// Jitter, ms.
    pub jitter_ms: u32,
    /// Packet loss percentage.
    pub packet_loss_pct: f64,
    /// Outbound bitrate, kbit/s.
    pub bitrate_kbps: u32,
    /// Frame width, pixels.
    pub frame_width: u32,
    /// Frame height, pixels.
    pub frame_height: u32,
    /// Frames per second.
    pub fps: f64,
    /// Audio level in [0, 1].
    pub audio_level: f64,
    /// Event class, e.g. "stats" or "quality-change".
    pub event_type: String,
    /// Free-form message, truncated to 512 chars.
    pub message: String,
}

impl DiagEvent {
    /// Build a "stats" event from a projected sample.
    pub fn from_sample(peer_id: &str, timestamp: u64, s: &TelemetrySample) -> Self {
        Self {
            timestamp,
            peer_id: peer_id.to_string(),
            rtt_ms: s.rtt_ms,
            jitter_ms: s.jitter_ms,
            packet_loss_pct: s.packet_loss_pct,
            bitrate_kbps: s.bitrate_kbps,
            frame_width: s.frame_width,
            frame_height: s.frame_height,
            fps: s.fps,
            audio_level: s.audio_level,
            event_type: "stats".to_string(),
            message: String::new(),
        }
    }

    fn truncated(mut self) -> Self {
        if self.message.chars().count() > MAX_DIAG_MESSAGE_CHARS {
            self.message = self.message.chars().take(MAX_DIAG_MESSAGE_CHARS).collect();
        }
        self
    }
}

/// Two append-only sequences with a retention prune on insert.
#[derive(Debug, Default)]
pub struct DiagnosticsLog {
    local: VecDeque<DiagEvent>,
    remote: VecDeque<DiagEvent>,
}

fn prune(seq: &mut VecDeque<DiagEvent>, now: u64) {
    while let Some(front) = seq.front() {
        if now.saturating_sub(front.timestamp) > RETENTION_MS {
            seq.pop_front();
        } else {
            break;
        }
    }
}

impl DiagnosticsLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locally produced event; prunes both sequences.
    pub fn insert_local(&mut self, event: DiagEvent) {
        let now = event.timestamp;
        self.local.push_back(event.truncated());
        prune(&mut self.local, now);
        prune(&mut self.remote, now);
    }

    /// Append an event received from the peer; prunes both sequences.
    pub fn insert_remote(&mut self, event: DiagEvent) {
        let now = event.timestamp;
        self.remote.push_back(event.truncated());
        prune(&mut self.local, now);
        prune(&mut self.remote, now);
    }

    /// Number of retained local events.
    pub fn local_count(&self) -> usize {
        self.local.len()
    }

    /// Number of retained remote events.
    pub fn remote_count(&self) -> usize {
        self.remote.len()
    }

    /// Both sequences merged with a stable sort by timestamp.
    pub fn merged_events(&self) -> Vec<DiagEvent> {
        let mut all: Vec<DiagEvent> =
            self.local.iter().chain(self.remote.iter()).cloned().collect();
        all.sort_by_key(|e| e.timestamp);
        all
    }

    /// Merged export: `{exportedAt, localCount, remoteCount, events}`.
    pub fn export_merged_json(&self) -> serde_json::Value {
        serde_json::json!({
            "exportedAt": now_ms(),
            "localCount": self.local_count(),
            "remoteCount": self.remote_count(),
            "events": self.merged_events(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: u64, peer: &str) -> DiagEvent {
        DiagEvent {
            timestamp: ts,
            peer_id: peer.to_string(),
            rtt_ms: 50,
            jitter_ms: 5,
            packet_loss_pct: 0.0,
            bitrate_kbps: 2000,
            frame_width: 1280,
            frame_height: 720,
            fps: 30.0,
            audio_level: 0.5,
            event_type: "stats".to_string(),
            message: String::new(),
        }
    }

    #[test]
    fn merge_orders_across_sequences() {
        let mut log = DiagnosticsLog::new();
        let t = 1_000_000;
        log.insert_local(event(t + 20, "local"));
        log.insert_remote(event(t + 10, "remote"));
        let merged = log.merged_events();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].peer_id, "remote");
        assert_eq!(merged[1].peer_id, "local");
    }

    #[test]
    fn retention_prunes_old_entries_on_insert() {
        let mut log = DiagnosticsLog::new();
        let t = 10_000_000;
        log.insert_local(event(t, "local"));
        log.insert_remote(event(t + 1, "remote"));
        log.insert_local(event(t + RETENTION_MS + 2, "local"));
        assert_eq!(log.local_count(), 1);
        assert_eq!(log.remote_count(), 0);
    }

    #[test]
    fn long_messages_are_truncated() {
        let mut log = DiagnosticsLog::new();
        let mut e = event(1_000, "local");
        e.message = "m".repeat(600);
        log.insert_local(e);
        assert_eq!(log.merged_events()[0].message.chars().count(), 512);
    }

    #[test]
    fn export_shape() {
        let mut log = DiagnosticsLog::new();
        log.insert_local(event(now_ms(), "local"));
        let v = log.export_merged_json();
        assert_eq!(v["localCount"], 1);
        assert_eq!(v["remoteCount"], 0);
        assert!(v["exportedAt"].as_u64().is_some());
        assert_eq!(v["events"].as_array().unwrap().len(), 1);
    }
}
