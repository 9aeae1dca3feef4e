// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Declarative bounds checks for every boundary input.
//!
//! Each check states its bound as a constant and returns a descriptive but
//! non-leaky error. Nothing here inspects key material or ciphertext content.

use crate::core::codec::bytes::from_base64_url;
use crate::core::types::{
    AnswerPayload, OfferPayload, SignalEnvelope, SignalKind, SenderRole, ENVELOPE_TTL_MS,
    ENVELOPE_VERSION,
};
use thiserror::Error;

/// Room code: 4..=48 chars of `[A-Za-z0-9_-]`.
pub const ROOM_CODE_MIN: usize = 4;
/// Room code upper bound.
pub const ROOM_CODE_MAX: usize = 48;
/// Session description upper bound, chars.
pub const MAX_SDP_CHARS: usize = 30_000;
/// Candidate list upper bound.
pub const MAX_CANDIDATES: usize = 96;
/// Single candidate upper bound, chars.
pub const MAX_CANDIDATE_CHARS: usize = 2_048;
/// Session id upper bound, chars.
pub const MAX_SESSION_ID_CHARS: usize = 128;
/// Chat text upper bound after sanitization, chars.
pub const MAX_CHAT_CHARS: usize = 500;
/// Diagnostics message upper bound, chars.
pub const MAX_DIAG_MESSAGE_CHARS: usize = 512;
/// Passphrase lower bound, chars.
pub const MIN_PASSPHRASE_CHARS: usize = 8;
/// Envelope salt lower bound, bytes.
pub const MIN_SALT_BYTES: usize = 16;
/// Envelope nonce lower bound, bytes.
pub const MIN_IV_BYTES: usize = 12;
/// TURN peer id upper bound after sanitization, chars.
pub const MAX_TURN_PEER_ID_CHARS: usize = 40;

/// Boundary validation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Room code fails the documented pattern.
    #[error("room code must be 4-48 characters of letters, digits, '_' or '-'")]
    RoomCode,
    /// Room identifier fails the documented pattern.
    #[error("room id has an invalid format")]
    RoomId,
    /// Passphrase is below the minimum length.
    #[error("passphrase must be at least 8 characters")]
    PassphraseWeak,
    /// Envelope field is structurally invalid.
    #[error("envelope field `{0}` is invalid")]
    EnvelopeField(&'static str),
    /// Envelope time window violates `createdAt < expiresAt <= createdAt + 10 min`.
    #[error("envelope time window is invalid")]
    TimeWindow,
    /// Payload field exceeds its bound.
    #[error("payload field `{0}` is out of bounds")]
    PayloadField(&'static str),
}

fn is_room_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Canonicalize and validate a room code: trim surrounding whitespace,
/// then enforce `^[A-Za-z0-9_-]{4,48}$`.
pub fn canonical_room_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim();
    if code.len() < ROOM_CODE_MIN || code.len() > ROOM_CODE_MAX {
        return Err(ValidationError::RoomCode);
    }
    if !code.chars().all(is_room_code_char) {
        return Err(ValidationError::RoomCode);
    }
    Ok(code.to_string())
}

/// Validate a broker room identifier: `^meet-[a-z0-9](?:[a-z0-9-]{10,62}[a-z0-9])$`.
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    let rest = id.strip_prefix("meet-").ok_or(ValidationError::RoomId)?;
    let bytes = rest.as_bytes();
    if bytes.len() < 12 || bytes.len() > 64 {
        return Err(ValidationError::RoomId);
    }
    let inner_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-';
    let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(&bytes[0]) || !edge_ok(&bytes[bytes.len() - 1]) {
        return Err(ValidationError::RoomId);
    }
    if !bytes.iter().all(inner_ok) {
        return Err(ValidationError::RoomId);
    }
    Ok(())
}

/// Enforce the passphrase lower bound.
pub fn validate_passphrase(passphrase: &str) -> Result<(), ValidationError> {
    if passphrase.chars().count() < MIN_PASSPHRASE_CHARS {
        return Err(ValidationError::PassphraseWeak);
    }
    Ok(())
}

/// Structural envelope validation: version, room code, binary field sizes,
/// and the time window. Does not touch the ciphertext.
pub fn validate_envelope(env: &SignalEnvelope) -> Result<(), ValidationError> {
    if env.version != ENVELOPE_VERSION {
        return Err(ValidationError::EnvelopeField("version"));
    }
    canonical_room_code(&env.room_code).map_err(|_| ValidationError::EnvelopeField("roomCode"))?;
    let salt = from_base64_url(&env.salt).map_err(|_| ValidationError::EnvelopeField("salt"))?;
    if salt.len() < MIN_SALT_BYTES {
        return Err(ValidationError::EnvelopeField("salt"));
    }
    let iv = from_base64_url(&env.iv).map_err(|_| ValidationError::EnvelopeField("iv"))?;
    if iv.len() < MIN_IV_BYTES {
        return Err(ValidationError::EnvelopeField("iv"));
    }
    from_base64_url(&env.ciphertext).map_err(|_| ValidationError::EnvelopeField("ciphertext"))?;
    if env.created_at >= env.expires_at || env.expires_at > env.created_at + ENVELOPE_TTL_MS {
        return Err(ValidationError::TimeWindow);
    }
    Ok(())
}

fn validate_signal_common(
    session_id: &str,
    sdp: &str,
    candidates: &[String],
) -> Result<(), ValidationError> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_CHARS {
        return Err(ValidationError::PayloadField("sessionId"));
    }
    if sdp.is_empty() || sdp.len() > MAX_SDP_CHARS {
        return Err(ValidationError::PayloadField("sdp"));
    }
    if candidates.len() > MAX_CANDIDATES {
        return Err(ValidationError::PayloadField("iceCandidates"));
    }
    if candidates.iter().any(|c| c.is_empty() || c.len() > MAX_CANDIDATE_CHARS) {
        return Err(ValidationError::PayloadField("iceCandidates"));
    }
    Ok(())
}

/// Validate a decrypted offer payload against its schema bounds.
pub fn validate_offer_payload(p: &OfferPayload) -> Result<(), ValidationError> {
    validate_signal_common(&p.session_id, &p.sdp_offer, &p.ice_candidates)?;
    if p.media_target.is_empty() {
        return Err(ValidationError::PayloadField("mediaTarget"));
    }
    Ok(())
}

/// Validate a decrypted answer payload against its schema bounds.
pub fn validate_answer_payload(p: &AnswerPayload) -> Result<(), ValidationError> {
    validate_signal_common(&p.session_id, &p.sdp_answer, &p.ice_candidates)?;
    if p.accepted_media_target.is_empty() {
        return Err(ValidationError::PayloadField("acceptedMediaTarget"));
    }
    Ok(())
}

/// Require kind/role cross-consistency: offers come from hosts, answers
/// from joiners.
pub fn validate_kind_role(kind: SignalKind, role: SenderRole) -> Result<(), ValidationError> {
    let ok = matches!(
        (kind, role),
        (SignalKind::Offer, SenderRole::Host) | (SignalKind::Answer, SenderRole::Joiner)
    );
    if !ok {
        return Err(ValidationError::EnvelopeField("senderRole"));
    }
    Ok(())
}

/// Sanitize chat text: strip control characters, collapse whitespace runs
/// to a single space, trim. Returns `None` when nothing remains or the
/// result exceeds the chat bound.
pub fn sanitize_chat_text(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !c.is_control()).collect();
    let collapsed: String = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed.chars().count() > MAX_CHAT_CHARS {
        return None;
    }
    Some(collapsed)
}

/// Sanitize a peer id for TURN usernames: keep `[A-Za-z0-9_-]`, truncate to
/// 40 chars, fall back to `anon` when nothing remains.
pub fn sanitize_turn_peer_id(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_TURN_PEER_ID_CHARS)
        .collect();
    if cleaned.is_empty() {
        "anon".to_string()
    } else {
        cleaned
    }
}
