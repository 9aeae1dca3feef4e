// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Call controller: the local session state machine.
//!
//! One controller is created per session and destroyed on close. It
//! exclusively owns its transport peer, candidate buffer, data channels,
//! and timers; the local media source is shared by reference and only the
//! controller flips track flags.
//!
//! Failure isolation: a rejected candidate never aborts description
//! exchange; a failed bitrate or constraint update never disables media;
//! a malformed channel frame is dropped without affecting the session.

use crate::core::call::diagnostics::{DiagEvent, DiagnosticsLog};
use crate::core::call::media::{LocalMediaSource, TrackConstraints};
use crate::core::call::quality::{QualityController, QualityLevel, QualityState};
use crate::core::call::transport::{
    ConnectionState, GatheringState, PeerEvent, StatsReport, TransportError, TransportPeer,
};
use crate::core::errors::{CallFailure, FailureCode};
use crate::core::types::{
    now_ms, AnswerPayload, ChannelFrame, ChannelKind, ClientInfo, OfferPayload, RemoteMediaState,
    SenderRole, TelemetrySample,
};
use crate::core::validation::{sanitize_chat_text, validate_offer_payload};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Chat channel label.
pub const CHAT_CHANNEL: &str = "chat";
/// Diagnostics channel label.
pub const DIAG_CHANNEL: &str = "diag";
/// Inbound channel frames above this are dropped silently, chars.
pub const MAX_INBOUND_FRAME_CHARS: usize = 16_000;

/// Controller timing and identity knobs. Defaults match the protocol;
/// tests shrink the timers.
#[derive(Clone, Debug)]
pub struct CallConfig {
    /// Connect watchdog deadline.
    pub connect_timeout: Duration,
    /// Statistics collection cadence.
    pub stats_interval: Duration,
    /// Candidate settle window, reset on every candidate.
    pub ice_settle: Duration,
    /// Hard cap on candidate gathering.
    pub ice_gather_cap: Duration,
    /// Minimum interval between outgoing chat messages.
    pub chat_min_interval: Duration,
    /// Requested media profile advertised in the offer.
    pub media_target: String,
    /// Local peer label stamped into diagnostics events.
    pub peer_label: String,
    /// User agent stamped into payload client info.
    pub user_agent: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(25),
            stats_interval: Duration::from_millis(1000),
            ice_settle: Duration::from_millis(250),
            ice_gather_cap: Duration::from_millis(1500),
            chat_min_interval: Duration::from_millis(250),
            media_target: "1080p30".to_string(),
            peer_label: "local".to_string(),
            user_agent: "meetlink".to_string(),
        }
    }
}

/// Observer callbacks. Defaults are no-ops.
pub struct CallEvents {
    /// Connection state changed.
    pub on_state_change: Box<dyn Fn(ConnectionState) + Send + Sync>,
    /// Sanitized chat text arrived from the peer.
    pub on_chat_message: Box<dyn Fn(String) + Send + Sync>,
    /// The peer broadcast its media state.
    pub on_remote_media_state: Box<dyn Fn(RemoteMediaState) + Send + Sync>,
    /// A user-actionable failure occurred.
    pub on_failure: Box<dyn Fn(CallFailure) + Send + Sync>,
    /// The active quality rung changed.
    pub on_quality_change: Box<dyn Fn(QualityState) + Send + Sync>,
}

impl Default for CallEvents {
    fn default() -> Self {
        Self {
            on_state_change: Box::new(|_| {}),
            on_chat_message: Box::new(|_| {}),
            on_remote_media_state: Box::new(|_| {}),
            on_failure: Box::new(|_| {}),
            on_quality_change: Box::new(|_| {}),
        }
    }
}

/// Controller-level errors.
#[derive(Debug, Error)]
pub enum CallError {
    /// The underlying transport rejected a required operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The controller has been closed.
    #[error("controller is closed")]
    Closed,
    /// An answer arrived for a different session.
    #[error("answer session id does not match this session")]
    SessionMismatch,
    /// Chat text was empty after sanitization or over the length bound.
    #[error("chat message rejected")]
    InvalidChat,
    /// Chat messages are throttled to one per 250 ms.
    #[error("chat throttled")]
    ChatThrottled,
    /// The transport produced a malformed payload.
    #[error("transport produced an invalid payload")]
    InvalidPayload,
}

fn new_session_id() -> Result<String, CallError> {
    let rng = SystemRandom::new();
    let mut b = [0u8; 8];
    rng.fill(&mut b).map_err(|_| CallError::Transport(TransportError::Negotiation))?;
    Ok(format!("session-{}", hex::encode(b)))
}

/// State shared between the controller handle and its background tasks.
struct Shared {
    closed: AtomicBool,
    stats_started: AtomicBool,
    connection: Mutex<ConnectionState>,
    candidates: Mutex<Vec<String>>,
    gathering_done: AtomicBool,
    // Bumped on every candidate event; the settle wait watches it.
    gather_seq: watch::Sender<u64>,
    last_chat_at: Mutex<Option<Instant>>,
    diag: Mutex<DiagnosticsLog>,
    quality: Mutex<QualityController>,
}

impl Shared {
    fn new() -> Self {
        let (gather_seq, _) = watch::channel(0);
        Self {
            closed: AtomicBool::new(false),
            stats_started: AtomicBool::new(false),
            connection: Mutex::new(ConnectionState::New),
            candidates: Mutex::new(Vec::new()),
            gathering_done: AtomicBool::new(false),
            gather_seq,
            last_chat_at: Mutex::new(None),
            diag: Mutex::new(DiagnosticsLog::new()),
            quality: Mutex::new(QualityController::new(QualityLevel::Hd1080)),
        }
    }
}

/// The call controller. Generic over the transport capability.
pub struct CallController<P: TransportPeer> {
    role: SenderRole,
    cfg: CallConfig,
    peer: Arc<AsyncMutex<P>>,
    media: Arc<LocalMediaSource>,
    events: Arc<CallEvents>,
    shared: Arc<Shared>,
    session_id: Mutex<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: TransportPeer> CallController<P> {
    /// Construct the host side: attaches media, creates the `chat` and
    /// `diag` channels, and starts the event pump.
    pub async fn host(
        peer: P,
        media: Arc<LocalMediaSource>,
        cfg: CallConfig,
        events: CallEvents,
    ) -> Result<Self, CallError> {
        let mut peer = peer;
        peer.attach_media(media.clone()).await?;
        peer.create_data_channel(CHAT_CHANNEL).await?;
        peer.create_data_channel(DIAG_CHANNEL).await?;
        Self::finish_construction(SenderRole::Host, peer, media, cfg, events)
    }

    /// Construct the joiner side: attaches media and starts the event
    /// pump; channels arrive via channel-opened notifications.
    pub async fn joiner(
        peer: P,
        media: Arc<LocalMediaSource>,
        cfg: CallConfig,
        events: CallEvents,
    ) -> Result<Self, CallError> {
        let mut peer = peer;
        peer.attach_media(media.clone()).await?;
        Self::finish_construction(SenderRole::Joiner, peer, media, cfg, events)
    }

    fn finish_construction(
        role: SenderRole,
        mut peer: P,
        media: Arc<LocalMediaSource>,
        cfg: CallConfig,
        events: CallEvents,
    ) -> Result<Self, CallError> {
        let rx = peer.take_events().ok_or(TransportError::Closed)?;
        let controller = Self {
            role,
            cfg,
            peer: Arc::new(AsyncMutex::new(peer)),
            media,
            events: Arc::new(events),
            shared: Arc::new(Shared::new()),
            session_id: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        };
        let pump = controller.spawn_event_pump(rx);
        controller.tasks.lock().expect("tasks lock").push(pump);
        Ok(controller)
    }

    /// Which side this controller drives.
    pub fn role(&self) -> SenderRole {
        self.role
    }

    /// Exposed connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.lock().expect("connection lock")
    }

    /// The session id, once negotiated.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().expect("session lock").clone()
    }

    /// The diagnostics export, `{exportedAt, localCount, remoteCount, events}`.
    pub fn export_diagnostics(&self) -> serde_json::Value {
        self.shared.diag.lock().expect("diag lock").export_merged_json()
    }

    /// The merged diagnostics events.
    pub fn diagnostics_events(&self) -> Vec<DiagEvent> {
        self.shared.diag.lock().expect("diag lock").merged_events()
    }

    fn ensure_open(&self) -> Result<(), CallError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(CallError::Closed);
        }
        Ok(())
    }

    fn client_info(&self) -> ClientInfo {
        ClientInfo::local(self.cfg.user_agent.clone())
    }

    /// Host offer flow: clear the candidate buffer, create and install the
    /// offer, await gathering, arm the connect watchdog, return the payload.
    pub async fn create_offer_payload(&self) -> Result<OfferPayload, CallError> {
        self.ensure_open()?;
        self.reset_gathering();

        {
            let mut peer = self.peer.lock().await;
            let sdp = peer.create_offer().await?;
            peer.set_local_description(&sdp).await?;
        }
        let ice_candidates = self.await_candidate_gathering().await;
        self.arm_connect_watchdog();

        let sdp_offer = {
            let peer = self.peer.lock().await;
            peer.local_description().ok_or(TransportError::Negotiation)?
        };
        let session_id = new_session_id()?;
        *self.session_id.lock().expect("session lock") = Some(session_id.clone());

        let payload = OfferPayload {
            session_id,
            sdp_offer,
            ice_candidates,
            media_target: self.cfg.media_target.clone(),
            client_info: self.client_info(),
        };
        validate_offer_payload(&payload).map_err(|_| CallError::InvalidPayload)?;
        Ok(payload)
    }

    /// Joiner answer flow: adopt the offer's session, install the remote
    /// description, ingest its candidates, produce the answer payload.
    pub async fn accept_offer(&self, offer: &OfferPayload) -> Result<AnswerPayload, CallError> {
        self.ensure_open()?;
        *self.session_id.lock().expect("session lock") = Some(offer.session_id.clone());

        {
            let mut peer = self.peer.lock().await;
            peer.set_remote_description(&offer.sdp_offer).await?;
            for candidate in &offer.ice_candidates {
                // Duplicates and incompatibles are expected; never abort.
                if let Err(e) = peer.add_ice_candidate(candidate).await {
                    debug!(?e, "ignoring rejected remote candidate");
                }
            }
        }
        self.reset_gathering();
        {
            let mut peer = self.peer.lock().await;
            let sdp = peer.create_answer().await?;
            peer.set_local_description(&sdp).await?;
        }
        let ice_candidates = self.await_candidate_gathering().await;
        self.arm_connect_watchdog();

        let sdp_answer = {
            let peer = self.peer.lock().await;
            peer.local_description().ok_or(TransportError::Negotiation)?
        };
        Ok(AnswerPayload {
            session_id: offer.session_id.clone(),
            sdp_answer,
            ice_candidates,
            accepted_media_target: offer.media_target.clone(),
            client_info: self.client_info(),
        })
    }

    /// Host side of answer ingestion. Rejects a mismatched session id.
    pub async fn apply_answer(&self, answer: &AnswerPayload) -> Result<(), CallError> {
        self.ensure_open()?;
        let expected = self.session_id();
        if expected.as_deref() != Some(answer.session_id.as_str()) {
            return Err(CallError::SessionMismatch);
        }
        let mut peer = self.peer.lock().await;
        peer.set_remote_description(&answer.sdp_answer).await?;
        for candidate in &answer.ice_candidates {
            if let Err(e) = peer.add_ice_candidate(candidate).await {
                debug!(?e, "ignoring rejected remote candidate");
            }
        }
        Ok(())
    }

    /// Send sanitized chat text, locally throttled to one message per
    /// 250 ms.
    pub async fn send_chat(&self, text: &str) -> Result<(), CallError> {
        self.ensure_open()?;
        let text = sanitize_chat_text(text).ok_or(CallError::InvalidChat)?;
        {
            let mut last = self.shared.last_chat_at.lock().expect("chat lock");
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.cfg.chat_min_interval {
                    return Err(CallError::ChatThrottled);
                }
            }
            *last = Some(now);
        }
        let frame = ChannelFrame {
            kind: ChannelKind::Chat,
            payload: serde_json::json!({ "text": text, "timestamp": now_ms() }),
        };
        self.send_frame(CHAT_CHANNEL, &frame).await
    }

    /// Flip the microphone track and broadcast the new media state.
    pub async fn toggle_microphone_enabled(&self, on: bool) -> Result<(), CallError> {
        self.ensure_open()?;
        self.media.set_audio_enabled(on);
        self.broadcast_media_state().await
    }

    /// Flip the camera track and broadcast the new media state.
    pub async fn toggle_camera_enabled(&self, on: bool) -> Result<(), CallError> {
        self.ensure_open()?;
        self.media.set_video_enabled(on);
        self.broadcast_media_state().await
    }

    async fn broadcast_media_state(&self) -> Result<(), CallError> {
        let state = RemoteMediaState {
            audio_enabled: self.media.audio().enabled(),
            video_enabled: self.media.video().enabled(),
            timestamp: now_ms(),
        };
        let frame = ChannelFrame {
            kind: ChannelKind::Control,
            payload: serde_json::to_value(state).map_err(|_| CallError::InvalidPayload)?,
        };
        self.send_frame(CHAT_CHANNEL, &frame).await
    }

    async fn send_frame(&self, label: &str, frame: &ChannelFrame) -> Result<(), CallError> {
        let text = serde_json::to_string(frame).map_err(|_| CallError::InvalidPayload)?;
        let mut peer = self.peer.lock().await;
        peer.send_text(label, &text).await?;
        Ok(())
    }

    /// Close the controller: stop all tasks, close both channels and the
    /// peer. Idempotent.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().expect("tasks lock").drain(..) {
            task.abort();
        }
        let mut peer = self.peer.lock().await;
        peer.close_channel(CHAT_CHANNEL).await;
        peer.close_channel(DIAG_CHANNEL).await;
        peer.close().await;
        *self.shared.connection.lock().expect("connection lock") = ConnectionState::Closed;
    }

    fn reset_gathering(&self) {
        self.shared.candidates.lock().expect("candidates lock").clear();
        self.shared.gathering_done.store(false, Ordering::SeqCst);
    }

    /// Wait for candidate gathering to settle: transport-reported
    /// completion, a null candidate, 250 ms of quiet, or the 1500 ms cap,
    /// whichever comes first. The buffer is capped at the payload bound.
    async fn await_candidate_gathering(&self) -> Vec<String> {
        let deadline = Instant::now() + self.cfg.ice_gather_cap;
        let mut seq = self.shared.gather_seq.subscribe();
        loop {
            if self.shared.gathering_done.load(Ordering::SeqCst) {
                break;
            }
            {
                let peer = self.peer.lock().await;
                if peer.gathering_state() == GatheringState::Complete {
                    break;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let settle = self.cfg.ice_settle.min(deadline - now);
            match timeout(settle, seq.changed()).await {
                // A candidate arrived: the settle window restarts.
                Ok(Ok(())) => continue,
                // Event source gone or quiet period elapsed: settled.
                Ok(Err(_)) | Err(_) => break,
            }
        }
        let mut candidates = self.shared.candidates.lock().expect("candidates lock").clone();
        candidates.truncate(crate::core::validation::MAX_CANDIDATES);
        candidates
    }

    fn arm_connect_watchdog(&self) {
        let shared = self.shared.clone();
        let events = self.events.clone();
        let timeout_after = self.cfg.connect_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout_after).await;
            if shared.closed.load(Ordering::SeqCst) {
                return;
            }
            let state = *shared.connection.lock().expect("connection lock");
            if state != ConnectionState::Connected {
                (events.on_failure)(CallFailure::new(FailureCode::ConnectionTimeout));
            }
        });
        self.tasks.lock().expect("tasks lock").push(handle);
    }

    fn spawn_event_pump(&self, mut rx: mpsc::UnboundedReceiver<PeerEvent>) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let events = self.events.clone();
        let peer = self.peer.clone();
        let media = self.media.clone();
        let cfg = self.cfg.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if shared.closed.load(Ordering::SeqCst) {
                    break;
                }
                match event {
                    PeerEvent::Candidate(Some(candidate)) => {
                        shared.candidates.lock().expect("candidates lock").push(candidate);
                        shared.gather_seq.send_modify(|n| *n += 1);
                    }
                    PeerEvent::Candidate(None) => {
                        shared.gathering_done.store(true, Ordering::SeqCst);
                        shared.gather_seq.send_modify(|n| *n += 1);
                    }
                    PeerEvent::ConnectionState(state) => {
                        *shared.connection.lock().expect("connection lock") = state;
                        (events.on_state_change)(state);
                        match state {
                            ConnectionState::Connected => {
                                if !shared.stats_started.swap(true, Ordering::SeqCst) {
                                    spawn_stats_loop(
                                        shared.clone(),
                                        events.clone(),
                                        peer.clone(),
                                        media.clone(),
                                        cfg.clone(),
                                    );
                                }
                            }
                            ConnectionState::Failed => {
                                (events.on_failure)(CallFailure::new(FailureCode::NatBlocked));
                            }
                            _ => {}
                        }
                    }
                    PeerEvent::ChannelMessage { text, .. } => {
                        handle_channel_message(&shared, &events, &text);
                    }
                    PeerEvent::ChannelOpened(label) => {
                        debug!(%label, "data channel opened");
                    }
                    PeerEvent::ChannelClosed(label) => {
                        debug!(%label, "data channel closed");
                    }
                }
            }
        })
    }
}

// Chat, control, and diag frames are accepted from either channel; the
// envelope's `type` field is authoritative.
fn handle_channel_message(shared: &Shared, events: &CallEvents, text: &str) {
    if text.len() > MAX_INBOUND_FRAME_CHARS {
        return;
    }
    // Frames with unknown `type` values fail to parse and are dropped.
    let Ok(frame) = serde_json::from_str::<ChannelFrame>(text) else {
        return;
    };
    match frame.kind {
        ChannelKind::Chat => {
            let Some(raw) = frame.payload.get("text").and_then(|t| t.as_str()) else {
                return;
            };
            if let Some(clean) = sanitize_chat_text(raw) {
                (events.on_chat_message)(clean);
            }
        }
        ChannelKind::Control => {
            let Ok(state) = serde_json::from_value::<RemoteMediaState>(frame.payload) else {
                return;
            };
            (events.on_remote_media_state)(state);
        }
        ChannelKind::Diag => {
            let Ok(event) = serde_json::from_value::<DiagEvent>(frame.payload) else {
                return;
            };
            shared.diag.lock().expect("diag lock").insert_remote(event);
        }
    }
}

struct StatsCursor {
    last_bytes_sent: u64,
    last_at: Instant,
}

/// Project one transport report into a telemetry sample.
fn project_sample(cursor: &mut StatsCursor, report: &StatsReport, at: Instant) -> TelemetrySample {
    let elapsed_ms = at.duration_since(cursor.last_at).as_millis().max(1) as u64;

    let outbound = report.outbound_video.unwrap_or_default();
    let delta_bytes = outbound.bytes_sent.saturating_sub(cursor.last_bytes_sent);
    cursor.last_bytes_sent = outbound.bytes_sent.max(cursor.last_bytes_sent);
    cursor.last_at = at;
    let bitrate_kbps = ((delta_bytes * 8) as f64 / elapsed_ms as f64).round() as u32;

    let remote = report.remote_inbound_video.unwrap_or_default();
    let total = remote.packets_lost + remote.packets_received;
    let packet_loss_pct = 100.0 * remote.packets_lost as f64 / total.max(1) as f64;

    let pair_rtt = report.candidate_pair.unwrap_or_default().current_round_trip_time;
    let rtt_ms = (1000.0 * remote.round_trip_time.max(pair_rtt)).round() as u32;

    let jitter_ms = (1000.0 * report.inbound_audio.unwrap_or_default().jitter).round() as u32;

    TelemetrySample {
        rtt_ms,
        jitter_ms,
        packet_loss_pct,
        bitrate_kbps,
        frame_width: outbound.frame_width,
        frame_height: outbound.frame_height,
        fps: outbound.fps,
        audio_level: report.audio_source_level.unwrap_or(0.0),
    }
}

/// Apply a quality decision: resolve the recovery sentinel to one rung up
/// and pin it, then nudge the encoder and the local track. Both updates
/// tolerate failure silently.
async fn apply_quality_change<P: TransportPeer>(
    change: QualityState,
    shared: &Shared,
    events: &CallEvents,
    peer: &Arc<AsyncMutex<P>>,
    media: &LocalMediaSource,
) {
    let target = {
        let mut quality = shared.quality.lock().expect("quality lock");
        match change {
            QualityState::Recovering => {
                let up = quality.active().up().unwrap_or(QualityLevel::Hd1080);
                quality.force_state(up);
                up
            }
            QualityState::Active(level) => level,
        }
    };
    (events.on_quality_change)(QualityState::Active(target));

    let profile = target.profile();
    {
        let mut peer = peer.lock().await;
        if let Err(e) = peer.set_video_max_bitrate(profile.max_bitrate_kbps) {
            debug!(?e, "bitrate update rejected");
        }
    }
    let constraints = TrackConstraints {
        width: profile.width,
        height: profile.height,
        frame_rate: 30.0,
    };
    if let Err(e) = media.apply_video_constraints(constraints) {
        debug!(?e, "constraint update rejected");
    }
}

fn spawn_stats_loop<P: TransportPeer>(
    shared: Arc<Shared>,
    events: Arc<CallEvents>,
    peer: Arc<AsyncMutex<P>>,
    media: Arc<LocalMediaSource>,
    cfg: CallConfig,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cfg.stats_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately and only seeds the cursor.
        ticker.tick().await;
        let mut cursor = StatsCursor { last_bytes_sent: 0, last_at: Instant::now() };

        loop {
            ticker.tick().await;
            if shared.closed.load(Ordering::SeqCst) {
                break;
            }
            let report = {
                let mut peer = peer.lock().await;
                match peer.collect_stats().await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(?e, "stats collection failed this tick");
                        continue;
                    }
                }
            };
            let sample = project_sample(&mut cursor, &report, Instant::now());
            let event = DiagEvent::from_sample(&cfg.peer_label, now_ms(), &sample);

            shared.diag.lock().expect("diag lock").insert_local(event.clone());

            let frame = ChannelFrame {
                kind: ChannelKind::Diag,
                payload: serde_json::to_value(&event).unwrap_or(serde_json::Value::Null),
            };
            if let Ok(text) = serde_json::to_string(&frame) {
                let mut peer = peer.lock().await;
                if let Err(e) = peer.send_text(DIAG_CHANNEL, &text).await {
                    debug!(?e, "diag frame dropped");
                }
            }

            let change = shared.quality.lock().expect("quality lock").on_sample(&sample);
            if let Some(change) = change {
                apply_quality_change(change, &shared, &events, &peer, &media).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call::transport::{
        CandidatePairStats, InboundAudioStats, OutboundVideoStats, RemoteInboundVideoStats,
    };

    // Projection math is pure; drive it directly.
    #[test]
    fn projection_formulas() {
        let start = Instant::now();
        let mut cursor = StatsCursor { last_bytes_sent: 1_000, last_at: start };
        let report = StatsReport {
            outbound_video: Some(OutboundVideoStats {
                bytes_sent: 251_000,
                frame_width: 1280,
                frame_height: 720,
                fps: 30.0,
            }),
            remote_inbound_video: Some(RemoteInboundVideoStats {
                packets_lost: 5,
                packets_received: 95,
                round_trip_time: 0.120,
            }),
            inbound_audio: Some(InboundAudioStats { jitter: 0.012 }),
            candidate_pair: Some(CandidatePairStats { current_round_trip_time: 0.150 }),
            audio_source_level: Some(0.6),
        };
        let sample = project_sample(&mut cursor, &report, start + Duration::from_millis(1000));
        assert_eq!(sample.bitrate_kbps, 2000);
        assert_eq!(sample.packet_loss_pct, 5.0);
        assert_eq!(sample.rtt_ms, 150);
        assert_eq!(sample.jitter_ms, 12);
        assert_eq!(sample.frame_width, 1280);
        assert_eq!(sample.audio_level, 0.6);
    }

    #[test]
    fn projection_tolerates_missing_sections() {
        let start = Instant::now();
        let mut cursor = StatsCursor { last_bytes_sent: 0, last_at: start };
        let sample =
            project_sample(&mut cursor, &StatsReport::default(), start + Duration::from_millis(1000));
        assert_eq!(sample.bitrate_kbps, 0);
        assert_eq!(sample.packet_loss_pct, 0.0);
        assert_eq!(sample.rtt_ms, 0);
    }
}
