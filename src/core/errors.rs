// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Failure taxonomy: user-visible codes and the boundary collapse of
//! internal errors into them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User-visible failure codes. Internal errors collapse into these at the
/// boundary; the UI maps each code to a recovery hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// Decryption failed; the passphrase (or room code) is wrong.
    PassPhraseMismatch,
    /// The packet is past its expiry window.
    ExpiredPacket,
    /// The transport reported `failed`; no route between the peers.
    NatBlocked,
    /// The user denied camera/microphone access.
    DeviceDenied,
    /// The platform cannot produce the requested media.
    MediaUnsupported,
    /// The connect watchdog fired before the transport connected.
    ConnectionTimeout,
    /// Packet text exceeds the global input cap.
    PacketTooLarge,
    /// Room code fails the documented pattern.
    RoomCodeInvalid,
    /// Passphrase is below the minimum length.
    PassphraseWeak,
    /// Too many decrypt failures; attempts are locally rejected for a while.
    SecurityCooldown,
}

impl FailureCode {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::PassPhraseMismatch => "PASS_PHRASE_MISMATCH",
            FailureCode::ExpiredPacket => "EXPIRED_PACKET",
            FailureCode::NatBlocked => "NAT_BLOCKED",
            FailureCode::DeviceDenied => "DEVICE_DENIED",
            FailureCode::MediaUnsupported => "MEDIA_UNSUPPORTED",
            FailureCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
            FailureCode::PacketTooLarge => "PACKET_TOO_LARGE",
            FailureCode::RoomCodeInvalid => "ROOM_CODE_INVALID",
            FailureCode::PassphraseWeak => "PASSPHRASE_WEAK",
            FailureCode::SecurityCooldown => "SECURITY_COOLDOWN",
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure surfaced to the user: a code plus a non-leaky message.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CallFailure {
    /// Taxonomy code.
    pub code: FailureCode,
    /// Human-readable description. Never includes key material or ciphertext.
    pub message: String,
}

impl CallFailure {
    /// Build a failure with the code's default description.
    pub fn new(code: FailureCode) -> Self {
        let message = match code {
            FailureCode::PassPhraseMismatch => "Could not decrypt the packet with this passphrase.",
            FailureCode::ExpiredPacket => "This packet has expired; ask the peer for a fresh one.",
            FailureCode::NatBlocked => "No route to the peer; a relay server may be required.",
            FailureCode::DeviceDenied => "Camera or microphone access was denied.",
            FailureCode::MediaUnsupported => "The requested media profile is not supported here.",
            FailureCode::ConnectionTimeout => "The connection did not come up in time.",
            FailureCode::PacketTooLarge => "Packet text is too large.",
            FailureCode::RoomCodeInvalid => "Room code has an invalid format.",
            FailureCode::PassphraseWeak => "Passphrase must be at least 8 characters.",
            FailureCode::SecurityCooldown => "Too many failed attempts; wait before retrying.",
        };
        Self { code, message: message.to_string() }
    }

    /// Build a failure with a custom message.
    pub fn with_message(code: FailureCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&FailureCode::PassPhraseMismatch).unwrap();
        assert_eq!(json, "\"PASS_PHRASE_MISMATCH\"");
        assert_eq!(FailureCode::SecurityCooldown.as_str(), "SECURITY_COOLDOWN");
    }

    #[test]
    fn failure_display_contains_code() {
        let f = CallFailure::new(FailureCode::ExpiredPacket);
        assert!(f.to_string().contains("EXPIRED_PACKET"));
    }
}
