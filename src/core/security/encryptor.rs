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

//! Authenticated encryptor: passphrase-derived AES-256-GCM.
//!
//! The key is derived from `passphrase || ":" || roomCode` with
//! PBKDF2-HMAC-SHA256 over the envelope's random salt. The envelope's
//! metadata string is bound into the authentication tag as associated data,
//! so any mutation of those fields invalidates the ciphertext.
//!
//! Every decryption failure - wrong passphrase, wrong room code, tampered
//! associated data, truncated ciphertext - surfaces as the single opaque
//! [`CryptoError::DecryptionFailed`]. Distinguishing the cases would leak
//! which part of the input was wrong.

use ring::{
    aead,
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};
use std::num::NonZeroU32;
use thiserror::Error;
use zeroize::Zeroize;

/// PBKDF2-HMAC-SHA256 iteration count for passphrase-derived keys.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Salt length generated at encode time, bytes.
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce length, bytes.
pub const NONCE_LEN: usize = 12;

/// Encryptor errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Opaque decryption failure. Covers wrong passphrase, wrong room code,
    /// tampered associated data, and truncated ciphertext alike.
    #[error("DECRYPTION_FAILED")]
    DecryptionFailed,
    /// Sealing failed (key setup or random generation).
    #[error("encryption failed")]
    EncryptionFailed,
}

fn derive_key(passphrase: &str, room_code: &str, salt: &[u8]) -> [u8; 32] {
    let mut secret = format!("{passphrase}:{room_code}").into_bytes();
    let mut out = [0u8; 32];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero"),
        salt,
        &secret,
        &mut out,
    );
    secret.zeroize();
    out
}

/// Generate a random salt for key derivation.
pub fn random_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).map_err(|_| CryptoError::EncryptionFailed)?;
    Ok(salt)
}

/// Encrypt `plaintext` under the passphrase-derived key with a fresh random
/// nonce, binding `aad` into the tag. Returns `(nonce, ciphertext || tag)`.
pub fn seal(
    passphrase: &str,
    room_code: &str,
    salt: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes).map_err(|_| CryptoError::EncryptionFailed)?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut key = derive_key(passphrase, room_code, salt);
    let unbound =
        aead::UnboundKey::new(&aead::AES_256_GCM, &key).map_err(|_| CryptoError::EncryptionFailed)?;
    let less_safe = aead::LessSafeKey::new(unbound);

    let mut in_out = plaintext.to_vec();
    less_safe
        .seal_in_place_append_tag(nonce, aead::Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    key.zeroize();
    Ok((nonce_bytes, in_out))
}

/// Decrypt `ciphertext || tag` under the passphrase-derived key.
pub fn open(
    passphrase: &str,
    room_code: &str,
    salt: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if iv.len() < NONCE_LEN || ciphertext.len() < aead::AES_256_GCM.tag_len() {
        return Err(CryptoError::DecryptionFailed);
    }
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&iv[..NONCE_LEN]);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut key = derive_key(passphrase, room_code, salt);
    let unbound =
        aead::UnboundKey::new(&aead::AES_256_GCM, &key).map_err(|_| CryptoError::DecryptionFailed)?;
    let less_safe = aead::LessSafeKey::new(unbound);

    let mut in_out = ciphertext.to_vec();
    let plain = less_safe
        .open_in_place(nonce, aead::Aad::from(aad), &mut in_out)
        .map(|p| p.to_vec())
        .map_err(|_| CryptoError::DecryptionFailed);

    key.zeroize();
    plain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let salt = random_salt().unwrap();
        let (iv, ct) = seal("pass-one", "room-1", &salt, b"meta", b"payload").unwrap();
        let pt = open("pass-one", "room-1", &salt, &iv, b"meta", &ct).unwrap();
        assert_eq!(pt, b"payload");
    }

    #[test]
    fn wrong_passphrase_room_code_or_aad_all_fail_the_same() {
        let salt = random_salt().unwrap();
        let (iv, ct) = seal("pass-one", "room-1", &salt, b"meta", b"payload").unwrap();

        let wrong_pass = open("pass-two", "room-1", &salt, &iv, b"meta", &ct).unwrap_err();
        let wrong_room = open("pass-one", "room-2", &salt, &iv, b"meta", &ct).unwrap_err();
        let wrong_aad = open("pass-one", "room-1", &salt, &iv, b"mutated", &ct).unwrap_err();
        let truncated = open("pass-one", "room-1", &salt, &iv, b"meta", &ct[..ct.len() - 1])
            .unwrap_err();

        for e in [wrong_pass, wrong_room, wrong_aad, truncated] {
            assert_eq!(e, CryptoError::DecryptionFailed);
            assert_eq!(e.to_string(), "DECRYPTION_FAILED");
        }
    }

    #[test]
    fn short_ciphertext_is_opaque_failure() {
        let salt = random_salt().unwrap();
        let err = open("p", "r", &salt, &[0u8; NONCE_LEN], b"", &[0u8; 4]).unwrap_err();
        assert_eq!(err, CryptoError::DecryptionFailed);
    }
}
