// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Ephemeral TURN credentials (TURN REST convention).
//!
//! `username = expiry ":" peerId`, `credential = base64(HMAC-SHA1(secret,
//! username))`. The relay server recomputes the MAC and rejects expired
//! usernames, so no broker state is needed per credential.

use crate::core::codec::bytes::to_base64_std;
use crate::core::validation::sanitize_turn_peer_id;
use ring::hmac;
use serde::{Deserialize, Serialize};

/// Credential lifetime floor, seconds.
pub const MIN_TTL_SECONDS: u64 = 30;

/// TURN settings carried by the broker config.
#[derive(Clone, Debug, Default)]
pub struct TurnConfig {
    /// Relay URLs handed to peers as-is.
    pub urls: Vec<String>,
    /// Shared secret with the relay server. `None` disables minting.
    pub shared_secret: Option<String>,
    /// Configured credential lifetime, seconds.
    pub ttl_seconds: u64,
}

/// A short-lived credential pair a peer presents to the relay server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCredentials {
    /// Relay URLs.
    pub urls: Vec<String>,
    /// `expiry:peerId`, or empty without a shared secret.
    pub username: String,
    /// base64 HMAC-SHA1 over the username, or empty without a secret.
    pub credential: String,
    /// Credential lifetime, seconds.
    pub ttl_seconds: u64,
}

/// Mint credentials for a peer at `now_ms`. Deterministic for a fixed
/// `(secret, peer_id, now)`.
pub fn build_turn_credentials(cfg: &TurnConfig, peer_id: &str, now_ms: u64) -> TurnCredentials {
    let ttl_seconds = cfg.ttl_seconds.max(MIN_TTL_SECONDS);
    let Some(secret) = cfg.shared_secret.as_deref().filter(|s| !s.is_empty()) else {
        return TurnCredentials {
            urls: cfg.urls.clone(),
            username: String::new(),
            credential: String::new(),
            ttl_seconds,
        };
    };

    let expiry = now_ms / 1000 + ttl_seconds;
    let username = format!("{expiry}:{}", sanitize_turn_peer_id(peer_id));
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret.as_bytes());
    let tag = hmac::sign(&key, username.as_bytes());
    TurnCredentials {
        urls: cfg.urls.clone(),
        username,
        credential: to_base64_std(tag.as_ref()),
        ttl_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(secret: Option<&str>) -> TurnConfig {
        TurnConfig {
            urls: vec!["turn:turn.example.com:3478".to_string()],
            shared_secret: secret.map(str::to_string),
            ttl_seconds: 600,
        }
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let a = build_turn_credentials(&cfg(Some("s3cret")), "peer-1", 1_700_000_000_000);
        let b = build_turn_credentials(&cfg(Some("s3cret")), "peer-1", 1_700_000_000_000);
        assert_eq!(a, b);
        assert_eq!(a.username, "1700000600:peer-1");
        assert!(!a.credential.is_empty());
    }

    #[test]
    fn without_secret_credentials_are_empty() {
        let creds = build_turn_credentials(&cfg(None), "peer-1", 1_700_000_000_000);
        assert!(creds.username.is_empty());
        assert!(creds.credential.is_empty());
        assert_eq!(creds.urls, vec!["turn:turn.example.com:3478".to_string()]);
    }

    #[test]
    fn ttl_is_floored() {
        let mut c = cfg(Some("s"));
        c.ttl_seconds = 5;
        assert_eq!(build_turn_credentials(&c, "p", 0).ttl_seconds, MIN_TTL_SECONDS);
    }

    #[test]
    fn peer_id_is_sanitized_into_the_username() {
        let creds = build_turn_credentials(&cfg(Some("s")), "pe er!<script>", 1_000_000);
        assert!(creds.username.ends_with(":peerscript"));
    }
}
