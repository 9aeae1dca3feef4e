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

//! Signal-packet envelope codec.
//!
//! Encode: encrypt the payload under the passphrase-derived key, pack the
//! envelope as canonical JSON, gzip, base64-url-encode, and split into
//! newline-separated chunks `P2PV1|<packetId>|<i>/<N>|<payload>`.
//!
//! Decode reverses the pipeline with a hard size cap at every stage. The
//! transport is a human (paste buffers, QR codes): receivers tolerate
//! duplicate and reordered chunks, and a missing chunk is a structural
//! error, never a crypto error.
//!
//! Chunk counts and packet ids are framing only and are never part of the
//! authenticated associated data; that covers envelope fields alone.

use crate::core::codec::bytes::{from_base64_url, to_base64_url};
use crate::core::errors::FailureCode;
use crate::core::security::cooldown::DecryptGuard;
use crate::core::security::encryptor::{self, CryptoError};
use crate::core::types::{
    decode_json_limited, encode_json, AnswerPayload, OfferPayload, SenderRole, SignalEnvelope,
    SignalKind, ENVELOPE_TTL_MS, ENVELOPE_VERSION,
};
use crate::core::validation::{
    canonical_room_code, validate_answer_payload, validate_envelope, validate_kind_role,
    validate_offer_payload, validate_passphrase, ValidationError,
};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use thiserror::Error;

/// Chunk line prefix.
pub const PACKET_PREFIX: &str = "P2PV1";
/// Maximum base64 payload per chunk line, chars.
pub const MAX_CHUNK_PAYLOAD: usize = 900;
/// Maximum chunks per packet.
pub const MAX_CHUNKS: usize = 256;
/// Maximum gzip-compressed envelope size, bytes.
pub const MAX_COMPRESSED_BYTES: usize = 120_000;
/// Maximum decompressed envelope size, bytes.
pub const MAX_DECOMPRESSED_BYTES: usize = 350_000;
/// Maximum total packet text, chars.
pub const MAX_PACKET_TEXT: usize = 200_000;
/// Packet id length, hex chars.
pub const PACKET_ID_HEX_LEN: usize = 16;

/// Envelope codec errors. Messages are descriptive but never leak key
/// material, ciphertext, or which crypto check failed.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Total packet text exceeds the global input cap.
    #[error("Packet text is too large.")]
    PacketTooLarge,
    /// A chunk line does not match `P2PV1|<id>|<i>/<N>|<payload>`.
    #[error("packet line {0} is not a valid chunk")]
    BadChunk(usize),
    /// Chunks disagree on packet id or part count.
    #[error("packet chunks disagree on id or count")]
    ChunkMismatch,
    /// Fewer distinct indices than the advertised part count.
    #[error("packet is incomplete: missing chunks")]
    MissingChunks,
    /// Advertised part count exceeds the chunk cap.
    #[error("packet has too many chunks")]
    TooManyChunks,
    /// Compressed envelope exceeds its cap.
    #[error("compressed packet body is too large")]
    CompressedTooLarge,
    /// Decompressed envelope exceeds its cap.
    #[error("decompressed packet body is too large")]
    DecompressedTooLarge,
    /// Envelope body is not valid base64/gzip/JSON.
    #[error("packet body is not a valid envelope")]
    Malformed,
    /// Envelope or payload fails schema validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Post-decode expiry: the envelope's window has passed.
    #[error("PACKET_EXPIRED: packet is past its expiry window")]
    PacketExpired,
    /// The envelope was built for a different room code.
    #[error("packet was created for a different room code")]
    RoomCodeMismatch,
    /// Opaque crypto failure.
    #[error("DECRYPTION_FAILED")]
    DecryptionFailed,
    /// Local cooldown after repeated decrypt failures.
    #[error("SECURITY_COOLDOWN: too many failed attempts, retry later")]
    SecurityCooldown,
    /// Sealing or randomness failure at encode time.
    #[error("packet encryption failed")]
    Encrypt,
}

impl From<CryptoError> for EnvelopeError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed => EnvelopeError::DecryptionFailed,
            CryptoError::EncryptionFailed => EnvelopeError::Encrypt,
        }
    }
}

impl EnvelopeError {
    /// Collapse into the user-facing taxonomy, where a code exists.
    ///
    /// Crypto failures surface as `PASS_PHRASE_MISMATCH`; other structural
    /// failures carry only their descriptive message.
    pub fn user_code(&self) -> Option<FailureCode> {
        match self {
            EnvelopeError::DecryptionFailed => Some(FailureCode::PassPhraseMismatch),
            EnvelopeError::PacketExpired => Some(FailureCode::ExpiredPacket),
            EnvelopeError::SecurityCooldown => Some(FailureCode::SecurityCooldown),
            EnvelopeError::PacketTooLarge
            | EnvelopeError::TooManyChunks
            | EnvelopeError::CompressedTooLarge
            | EnvelopeError::DecompressedTooLarge => Some(FailureCode::PacketTooLarge),
            EnvelopeError::RoomCodeMismatch
            | EnvelopeError::Validation(ValidationError::RoomCode) => {
                Some(FailureCode::RoomCodeInvalid)
            }
            EnvelopeError::Validation(ValidationError::PassphraseWeak) => {
                Some(FailureCode::PassphraseWeak)
            }
            _ => None,
        }
    }
}

/// Associated-data string bound into the ciphertext tag: the ordered
/// concatenation `version|type|roomCode|createdAt|expiresAt|senderRole`.
fn associated_data(
    version: u32,
    kind: SignalKind,
    room_code: &str,
    created_at: u64,
    expires_at: u64,
    sender_role: SenderRole,
) -> Vec<u8> {
    format!(
        "{version}|{}|{room_code}|{created_at}|{expires_at}|{}",
        kind.as_str(),
        sender_role.as_str()
    )
    .into_bytes()
}

fn random_packet_id() -> Result<String, EnvelopeError> {
    let rng = SystemRandom::new();
    let mut id = [0u8; PACKET_ID_HEX_LEN / 2];
    rng.fill(&mut id).map_err(|_| EnvelopeError::Encrypt)?;
    Ok(hex::encode(id))
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).map_err(|_| EnvelopeError::Encrypt)?;
    enc.finish().map_err(|_| EnvelopeError::Encrypt)
}

fn gunzip_limited(bytes: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let mut out = Vec::new();
    let mut dec = GzDecoder::new(bytes).take(MAX_DECOMPRESSED_BYTES as u64 + 1);
    dec.read_to_end(&mut out).map_err(|_| EnvelopeError::Malformed)?;
    if out.len() > MAX_DECOMPRESSED_BYTES {
        return Err(EnvelopeError::DecompressedTooLarge);
    }
    Ok(out)
}

fn encode_signal(
    kind: SignalKind,
    sender_role: SenderRole,
    plaintext: Vec<u8>,
    room_code: &str,
    passphrase: &str,
    now_ms: u64,
) -> Result<String, EnvelopeError> {
    validate_passphrase(passphrase)?;
    let room_code = canonical_room_code(room_code)?;

    let created_at = now_ms;
    let expires_at = now_ms + ENVELOPE_TTL_MS;
    let salt = encryptor::random_salt().map_err(|_| EnvelopeError::Encrypt)?;
    let aad = associated_data(ENVELOPE_VERSION, kind, &room_code, created_at, expires_at, sender_role);
    let (iv, ciphertext) = encryptor::seal(passphrase, &room_code, &salt, &aad, &plaintext)?;

    let envelope = SignalEnvelope {
        version: ENVELOPE_VERSION,
        kind,
        room_code,
        created_at,
        expires_at,
        sender_role,
        salt: to_base64_url(&salt),
        iv: to_base64_url(&iv),
        ciphertext: to_base64_url(&ciphertext),
    };

    let json = encode_json(&envelope).map_err(|_| EnvelopeError::Encrypt)?;
    let compressed = gzip(&json)?;
    if compressed.len() > MAX_COMPRESSED_BYTES {
        return Err(EnvelopeError::PacketTooLarge);
    }

    let body = to_base64_url(&compressed);
    let chunks: Vec<&str> = body
        .as_bytes()
        .chunks(MAX_CHUNK_PAYLOAD)
        .map(|c| std::str::from_utf8(c).expect("base64 is ascii"))
        .collect();
    if chunks.len() > MAX_CHUNKS {
        return Err(EnvelopeError::PacketTooLarge);
    }

    let packet_id = random_packet_id()?;
    let total = chunks.len();
    let lines: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{PACKET_PREFIX}|{packet_id}|{}/{total}|{c}", i + 1))
        .collect();
    let text = lines.join("\n");
    if text.len() > MAX_PACKET_TEXT {
        return Err(EnvelopeError::PacketTooLarge);
    }
    Ok(text)
}

/// Encrypt and frame an offer payload into packet text.
pub fn encode_offer(
    payload: &OfferPayload,
    room_code: &str,
    passphrase: &str,
    now_ms: u64,
) -> Result<String, EnvelopeError> {
    validate_offer_payload(payload)?;
    let plaintext = encode_json(payload).map_err(|_| EnvelopeError::Encrypt)?;
    encode_signal(SignalKind::Offer, SenderRole::Host, plaintext, room_code, passphrase, now_ms)
}

/// Encrypt and frame an answer payload into packet text.
pub fn encode_answer(
    payload: &AnswerPayload,
    room_code: &str,
    passphrase: &str,
    now_ms: u64,
) -> Result<String, EnvelopeError> {
    validate_answer_payload(payload)?;
    let plaintext = encode_json(payload).map_err(|_| EnvelopeError::Encrypt)?;
    encode_signal(SignalKind::Answer, SenderRole::Joiner, plaintext, room_code, passphrase, now_ms)
}

struct ParsedChunk<'a> {
    packet_id: &'a str,
    index: usize,
    total: usize,
    payload: &'a str,
}

fn parse_chunk_line(line_no: usize, line: &str) -> Result<ParsedChunk<'_>, EnvelopeError> {
    let mut parts = line.splitn(4, '|');
    let prefix = parts.next().ok_or(EnvelopeError::BadChunk(line_no))?;
    let packet_id = parts.next().ok_or(EnvelopeError::BadChunk(line_no))?;
    let position = parts.next().ok_or(EnvelopeError::BadChunk(line_no))?;
    let payload = parts.next().ok_or(EnvelopeError::BadChunk(line_no))?;

    if prefix != PACKET_PREFIX {
        return Err(EnvelopeError::BadChunk(line_no));
    }
    if packet_id.len() != PACKET_ID_HEX_LEN
        || !packet_id.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(EnvelopeError::BadChunk(line_no));
    }
    let (index, total) = position.split_once('/').ok_or(EnvelopeError::BadChunk(line_no))?;
    let index: usize = index.parse().map_err(|_| EnvelopeError::BadChunk(line_no))?;
    let total: usize = total.parse().map_err(|_| EnvelopeError::BadChunk(line_no))?;
    if total == 0 || index == 0 || index > total {
        return Err(EnvelopeError::BadChunk(line_no));
    }
    if payload.is_empty() || payload.len() > MAX_CHUNK_PAYLOAD {
        return Err(EnvelopeError::BadChunk(line_no));
    }
    Ok(ParsedChunk { packet_id, index, total, payload })
}

/// Reassemble chunk lines into the base64 envelope body. Tolerates
/// reordered and duplicate chunks; rejects mixed packets and gaps.
fn reassemble(text: &str) -> Result<String, EnvelopeError> {
    let mut packet_id: Option<&str> = None;
    let mut total: Option<usize> = None;
    let mut parts: BTreeMap<usize, &str> = BTreeMap::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let chunk = parse_chunk_line(line_no + 1, line)?;
        match packet_id {
            None => packet_id = Some(chunk.packet_id),
            Some(id) if id != chunk.packet_id => return Err(EnvelopeError::ChunkMismatch),
            Some(_) => {}
        }
        match total {
            None => {
                if chunk.total > MAX_CHUNKS {
                    return Err(EnvelopeError::TooManyChunks);
                }
                total = Some(chunk.total);
            }
            Some(t) if t != chunk.total => return Err(EnvelopeError::ChunkMismatch),
            Some(_) => {}
        }
        match parts.get(&chunk.index) {
            None => {
                parts.insert(chunk.index, chunk.payload);
            }
            // Duplicate index: tolerated when identical, corruption otherwise.
            Some(existing) if *existing != chunk.payload => {
                return Err(EnvelopeError::ChunkMismatch)
            }
            Some(_) => {}
        }
    }

    let total = total.ok_or(EnvelopeError::MissingChunks)?;
    if parts.len() != total {
        return Err(EnvelopeError::MissingChunks);
    }
    // BTreeMap iteration is index order; indices are known to be 1..=total.
    Ok(parts.values().copied().collect())
}

/// Decode packet text into a structurally validated envelope.
///
/// Enforces the global input cap, chunk framing, the compressed and
/// decompressed size caps, the envelope schema, and the time window.
/// Does not decrypt.
pub fn decode_packet(text: &str) -> Result<SignalEnvelope, EnvelopeError> {
    if text.len() > MAX_PACKET_TEXT {
        return Err(EnvelopeError::PacketTooLarge);
    }
    let body = reassemble(text)?;
    let compressed = from_base64_url(&body).map_err(|_| EnvelopeError::Malformed)?;
    if compressed.len() > MAX_COMPRESSED_BYTES {
        return Err(EnvelopeError::CompressedTooLarge);
    }
    let json = gunzip_limited(&compressed)?;
    let envelope: SignalEnvelope =
        decode_json_limited(&json, MAX_DECOMPRESSED_BYTES).map_err(|_| EnvelopeError::Malformed)?;
    validate_envelope(&envelope)?;
    Ok(envelope)
}

fn decrypt_signal(
    envelope: &SignalEnvelope,
    expected_kind: SignalKind,
    room_code: &str,
    passphrase: &str,
    now_ms: u64,
) -> Result<Vec<u8>, EnvelopeError> {
    let room_code = canonical_room_code(room_code)?;
    if envelope.room_code != room_code {
        return Err(EnvelopeError::RoomCodeMismatch);
    }
    if now_ms > envelope.expires_at {
        return Err(EnvelopeError::PacketExpired);
    }
    if envelope.kind != expected_kind {
        return Err(EnvelopeError::Validation(ValidationError::EnvelopeField("type")));
    }
    validate_kind_role(envelope.kind, envelope.sender_role)?;

    // AAD is recomputed from the *received* fields; any post-encryption
    // mutation of them fails the tag check inside `open`.
    let aad = associated_data(
        envelope.version,
        envelope.kind,
        &envelope.room_code,
        envelope.created_at,
        envelope.expires_at,
        envelope.sender_role,
    );
    let salt = from_base64_url(&envelope.salt).map_err(|_| EnvelopeError::DecryptionFailed)?;
    let iv = from_base64_url(&envelope.iv).map_err(|_| EnvelopeError::DecryptionFailed)?;
    let ciphertext =
        from_base64_url(&envelope.ciphertext).map_err(|_| EnvelopeError::DecryptionFailed)?;
    Ok(encryptor::open(passphrase, &room_code, &salt, &iv, &aad, &ciphertext)?)
}

/// Decrypt and validate an offer envelope.
pub fn decrypt_offer(
    envelope: &SignalEnvelope,
    room_code: &str,
    passphrase: &str,
    now_ms: u64,
) -> Result<OfferPayload, EnvelopeError> {
    let plain = decrypt_signal(envelope, SignalKind::Offer, room_code, passphrase, now_ms)?;
    let payload: OfferPayload =
        decode_json_limited(&plain, MAX_DECOMPRESSED_BYTES).map_err(|_| EnvelopeError::Malformed)?;
    validate_offer_payload(&payload)?;
    Ok(payload)
}

/// Decrypt and validate an answer envelope.
pub fn decrypt_answer(
    envelope: &SignalEnvelope,
    room_code: &str,
    passphrase: &str,
    now_ms: u64,
) -> Result<AnswerPayload, EnvelopeError> {
    let plain = decrypt_signal(envelope, SignalKind::Answer, room_code, passphrase, now_ms)?;
    let payload: AnswerPayload =
        decode_json_limited(&plain, MAX_DECOMPRESSED_BYTES).map_err(|_| EnvelopeError::Malformed)?;
    validate_answer_payload(&payload)?;
    Ok(payload)
}

/// Decryptor with the brute-force cooldown applied.
///
/// One instance per offline session. Crypto failures feed the rolling
/// window; while the cooldown is active every attempt is rejected locally
/// before any key derivation happens.
#[derive(Debug, Default)]
pub struct PacketDecryptor {
    guard: DecryptGuard,
}

impl PacketDecryptor {
    /// Fresh decryptor with no recorded failures.
    pub fn new() -> Self {
        Self { guard: DecryptGuard::new() }
    }

    fn guarded<T>(
        &mut self,
        now_ms: u64,
        attempt: impl FnOnce() -> Result<T, EnvelopeError>,
    ) -> Result<T, EnvelopeError> {
        if !self.guard.check(now_ms) {
            return Err(EnvelopeError::SecurityCooldown);
        }
        match attempt() {
            Ok(v) => {
                self.guard.record_success();
                Ok(v)
            }
            Err(e) => {
                if matches!(e, EnvelopeError::DecryptionFailed) {
                    self.guard.record_failure(now_ms);
                }
                Err(e)
            }
        }
    }

    /// Guarded [`decrypt_offer`].
    pub fn decrypt_offer(
        &mut self,
        envelope: &SignalEnvelope,
        room_code: &str,
        passphrase: &str,
        now_ms: u64,
    ) -> Result<OfferPayload, EnvelopeError> {
        self.guarded(now_ms, || decrypt_offer(envelope, room_code, passphrase, now_ms))
    }

    /// Guarded [`decrypt_answer`].
    pub fn decrypt_answer(
        &mut self,
        envelope: &SignalEnvelope,
        room_code: &str,
        passphrase: &str,
        now_ms: u64,
    ) -> Result<AnswerPayload, EnvelopeError> {
        self.guarded(now_ms, || decrypt_answer(envelope, room_code, passphrase, now_ms))
    }
}
