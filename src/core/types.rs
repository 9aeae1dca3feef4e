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
#![warn(missing_docs)]

//! Shared wire types and size-capped JSON decoding helpers.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// JSON decoding error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
}

/// Encode a wire structure as JSON bytes. Struct fields serialize in
/// declaration order, which is the canonical key order for every type here.
pub fn encode_json<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(v).map_err(|_| CodecError::Serialize)
}

/// Decode JSON with a hard size cap on the raw input.
pub fn decode_json_limited<T: DeserializeOwned>(bytes: &[u8], max: usize) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    serde_json::from_slice(bytes).map_err(|_| CodecError::Deserialize)
}

/// Milliseconds since UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Signal envelope wire version.
pub const ENVELOPE_VERSION: u32 = 1;

/// Envelope lifetime: 10 minutes from creation.
pub const ENVELOPE_TTL_MS: u64 = 10 * 60 * 1000;

/// What a signal envelope carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Session offer, produced by the host.
    Offer,
    /// Session answer, produced by the joiner.
    Answer,
}

impl SignalKind {
    /// Lowercase wire name, used in the associated-data string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
        }
    }
}

/// Which side of the call produced an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    /// The side that creates the offer and the data channels.
    Host,
    /// The side that consumes the offer and produces the answer.
    Joiner,
}

impl SenderRole {
    /// Lowercase wire name, used in the associated-data string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Host => "host",
            SenderRole::Joiner => "joiner",
        }
    }
}

/// Authenticated, timestamped container for an encrypted signal payload.
///
/// Field declaration order is the canonical JSON key order. The ordered
/// concatenation `version|type|roomCode|createdAt|expiresAt|senderRole` is
/// bound into the ciphertext authentication tag; mutating any of those
/// fields fails decryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    /// Wire version, always 1.
    pub version: u32,
    /// Offer or answer.
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Room code the sender encrypted against.
    pub room_code: String,
    /// Creation time, ms since UNIX epoch.
    pub created_at: u64,
    /// Expiry time, ms since UNIX epoch. At most `created_at + 10 min`.
    pub expires_at: u64,
    /// Which side produced this envelope.
    pub sender_role: SenderRole,
    /// PBKDF2 salt, url-safe base64, >= 16 bytes decoded.
    pub salt: String,
    /// AES-GCM nonce, url-safe base64, >= 12 bytes decoded.
    pub iv: String,
    /// Ciphertext plus tag, url-safe base64.
    pub ciphertext: String,
}

/// Client identification stamped into offer/answer payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Free-form user agent string.
    pub user_agent: String,
    /// Application version.
    pub app_version: String,
}

impl ClientInfo {
    /// Stamp with this crate's version.
    pub fn local(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Decrypted offer payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    /// Session identifier, adopted by the answering side.
    pub session_id: String,
    /// Local session description of the offerer.
    pub sdp_offer: String,
    /// Gathered connectivity candidates, at most 96.
    pub ice_candidates: Vec<String>,
    /// Requested media profile, e.g. "1080p30".
    pub media_target: String,
    /// Sender identification.
    pub client_info: ClientInfo,
}

/// Decrypted answer payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    /// Session identifier, must match the offer.
    pub session_id: String,
    /// Local session description of the answerer.
    pub sdp_answer: String,
    /// Gathered connectivity candidates, at most 96.
    pub ice_candidates: Vec<String>,
    /// Media profile the answerer accepted.
    pub accepted_media_target: String,
    /// Sender identification.
    pub client_info: ClientInfo,
}

/// In-call data-channel frame kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// User-visible text message.
    Chat,
    /// Media-state broadcast (mic/camera flags).
    Control,
    /// Telemetry sample forwarded to the peer's diagnostics log.
    Diag,
}

/// Envelope for every message on the `chat` and `diag` channels.
/// Unknown fields are permitted and ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelFrame {
    /// Frame kind. Frames with unrecognized kinds fail to parse and are dropped.
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
}

/// Media-state broadcast sent on the control channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMediaState {
    /// Whether the sender's microphone track is enabled.
    pub audio_enabled: bool,
    /// Whether the sender's camera track is enabled.
    pub video_enabled: bool,
    /// Sender wall-clock timestamp, ms since UNIX epoch.
    pub timestamp: u64,
}

/// One projected statistics sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    /// Round-trip time, milliseconds.
    pub rtt_ms: u32,
    /// Inbound audio jitter, milliseconds.
    pub jitter_ms: u32,
    /// Packet loss percentage over remote inbound video.
    pub packet_loss_pct: f64,
    /// Outbound video bitrate, kbit/s.
    pub bitrate_kbps: u32,
    /// Outbound video frame width.
    pub frame_width: u32,
    /// Outbound video frame height.
    pub frame_height: u32,
    /// Outbound video frames per second.
    pub fps: f64,
    /// Audio source level in [0, 1].
    pub audio_level: f64,
}
