// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Transport-peer capability seam.
//!
//! The real-time transport stack is deliberately out of scope; the call
//! controller only sees this trait: offer/answer creation, description
//! acceptance, candidate ingestion, data-channel multiplexing, encoder
//! parameter adjustment, and periodic statistics reports. Events flow back
//! through a channel taken once at construction, so the controller never
//! holds a lock while waiting on the transport.

use crate::core::call::media::LocalMediaSource;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level failure. The controller treats most of these as
/// recoverable per the failure-isolation policy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer has been closed.
    #[error("transport closed")]
    Closed,
    /// Offer/answer creation or description acceptance failed.
    #[error("negotiation failed")]
    Negotiation,
    /// A candidate was rejected (duplicates and incompatibles are expected).
    #[error("candidate rejected")]
    Candidate,
    /// Channel create/send failed.
    #[error("data channel unavailable")]
    Channel,
    /// Statistics report unavailable this tick.
    #[error("stats unavailable")]
    Stats,
    /// Encoder parameter update rejected.
    #[error("encoder update rejected")]
    Encoder,
}

/// Candidate-gathering progress reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatheringState {
    /// Gathering has not started.
    New,
    /// Candidates are still being produced.
    Gathering,
    /// The transport reported completion.
    Complete,
}

/// Connection lifecycle reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Freshly constructed.
    New,
    /// Negotiation and connectivity checks in progress.
    Connecting,
    /// Media is flowing.
    Connected,
    /// Temporarily lost connectivity.
    Disconnected,
    /// Connectivity establishment failed.
    Failed,
    /// Closed locally.
    Closed,
}

/// Events pushed by the transport to its owning controller.
#[derive(Clone, Debug)]
pub enum PeerEvent {
    /// A gathered candidate; `None` marks end-of-candidates.
    Candidate(Option<String>),
    /// Connection state change.
    ConnectionState(ConnectionState),
    /// A data channel opened (joiner side receives host-created channels).
    ChannelOpened(String),
    /// Text received on a data channel.
    ChannelMessage {
        /// Channel label.
        label: String,
        /// Raw frame text.
        text: String,
    },
    /// A data channel closed.
    ChannelClosed(String),
}

/// Outbound video stream counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OutboundVideoStats {
    /// Cumulative bytes sent.
    pub bytes_sent: u64,
    /// Current encoded frame width.
    pub frame_width: u32,
    /// Current encoded frame height.
    pub frame_height: u32,
    /// Current encoded frames per second.
    pub fps: f64,
}

/// Remote-inbound video counters (the peer's view of our video).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RemoteInboundVideoStats {
    /// Cumulative packets lost.
    pub packets_lost: u64,
    /// Cumulative packets received.
    pub packets_received: u64,
    /// Round-trip time, seconds.
    pub round_trip_time: f64,
}

/// Inbound audio counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InboundAudioStats {
    /// Jitter, seconds.
    pub jitter: f64,
}

/// Selected candidate-pair counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CandidatePairStats {
    /// Current round-trip time, seconds.
    pub current_round_trip_time: f64,
}

/// One periodic statistics report. Sections the transport cannot produce
/// this tick are `None`; the projection treats them as zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatsReport {
    /// Outbound video stream section.
    pub outbound_video: Option<OutboundVideoStats>,
    /// Remote inbound video section.
    pub remote_inbound_video: Option<RemoteInboundVideoStats>,
    /// Inbound audio section.
    pub inbound_audio: Option<InboundAudioStats>,
    /// Selected candidate pair section.
    pub candidate_pair: Option<CandidatePairStats>,
    /// Audio media-source level in [0, 1].
    pub audio_source_level: Option<f64>,
}

/// The transport peer capability. Exactly one controller owns a peer.
#[async_trait]
pub trait TransportPeer: Send + 'static {
    /// Attach the shared local media source's tracks.
    async fn attach_media(&mut self, source: Arc<LocalMediaSource>) -> Result<(), TransportError>;

    /// Create an offer session description.
    async fn create_offer(&mut self) -> Result<String, TransportError>;

    /// Create an answer session description (requires a remote offer).
    async fn create_answer(&mut self) -> Result<String, TransportError>;

    /// Install the local session description and start gathering.
    async fn set_local_description(&mut self, sdp: &str) -> Result<(), TransportError>;

    /// Install the remote session description.
    async fn set_remote_description(&mut self, sdp: &str) -> Result<(), TransportError>;

    /// Ingest one remote candidate.
    async fn add_ice_candidate(&mut self, candidate: &str) -> Result<(), TransportError>;

    /// The current local description, if set.
    fn local_description(&self) -> Option<String>;

    /// Candidate-gathering progress.
    fn gathering_state(&self) -> GatheringState;

    /// Connection lifecycle state.
    fn connection_state(&self) -> ConnectionState;

    /// Create a reliable, ordered data channel (host side).
    async fn create_data_channel(&mut self, label: &str) -> Result<(), TransportError>;

    /// Send text on a data channel.
    async fn send_text(&mut self, label: &str, text: &str) -> Result<(), TransportError>;

    /// Close one data channel. Unknown labels are a no-op.
    async fn close_channel(&mut self, label: &str);

    /// Collect a statistics report.
    async fn collect_stats(&mut self) -> Result<StatsReport, TransportError>;

    /// Update the video sender's first encoding `maxBitrate`.
    fn set_video_max_bitrate(&mut self, kbps: u32) -> Result<(), TransportError>;

    /// Take the event receiver. Yields `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<PeerEvent>>;

    /// Close the peer and all channels. Idempotent.
    async fn close(&mut self);
}
