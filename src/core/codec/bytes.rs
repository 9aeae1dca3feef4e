// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Byte/string conversion: url-safe and standard base64.
//!
//! Envelope fields and packet chunks use the unpadded url-safe alphabet
//! (QR- and copy/paste-friendly); TURN credentials use the standard
//! alphabet required by the TURN REST convention.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use thiserror::Error;

/// Base64 decoding error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Base64Error {
    /// Input contains characters outside the expected alphabet, or has
    /// invalid length/padding.
    #[error("invalid base64")]
    Invalid,
}

/// Encode bytes with the unpadded url-safe alphabet.
pub fn to_base64_url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode an unpadded url-safe base64 string.
pub fn from_base64_url(s: &str) -> Result<Vec<u8>, Base64Error> {
    URL_SAFE_NO_PAD.decode(s).map_err(|_| Base64Error::Invalid)
}

/// Encode bytes with the standard padded alphabet.
pub fn to_base64_std(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a standard padded base64 string.
pub fn from_base64_std(s: &str) -> Result<Vec<u8>, Base64Error> {
    STANDARD.decode(s).map_err(|_| Base64Error::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_safe_round_trip() {
        let data = [0xffu8, 0xfe, 0x00, 0x7f, 0x80];
        let s = to_base64_url(&data);
        assert!(!s.contains('+') && !s.contains('/') && !s.contains('='));
        assert_eq!(from_base64_url(&s).unwrap(), data);
    }

    #[test]
    fn rejects_foreign_alphabet() {
        assert!(from_base64_url("a+b/c=").is_err());
        assert!(from_base64_url("not base64!").is_err());
    }

    #[test]
    fn std_round_trip() {
        let data = b"turn credential bytes";
        assert_eq!(from_base64_std(&to_base64_std(data)).unwrap(), data);
    }
}
