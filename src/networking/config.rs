// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Broker configuration, read from the environment.

use serde::{Deserialize, Serialize};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Broker runtime configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Listen port.
    pub port: u16,
    /// Listen host.
    pub host: String,
    /// Base URL join links are built against.
    pub frontend_base_url: String,
    /// Room lifetime, seconds.
    pub room_ttl_seconds: u64,
    /// Cleanup timer interval, ms.
    pub cleanup_interval_ms: u64,
    /// Per-request JSON body cap, bytes.
    pub max_json_body_bytes: usize,
    /// REST rate-limit window, ms.
    pub rest_rate_limit_window_ms: u64,
    /// REST rate-limit cap per window.
    pub rest_rate_limit_max: u32,
    /// WS-upgrade rate-limit window, ms.
    pub ws_rate_limit_window_ms: u64,
    /// WS-upgrade rate-limit cap per window.
    pub ws_rate_limit_max: u32,
    /// TURN server URLs handed to peers.
    pub turn_urls: Vec<String>,
    /// TURN REST shared secret. Empty disables credential minting.
    pub turn_shared_secret: Option<String>,
    /// TURN credential lifetime, seconds (floored to 30).
    pub turn_ttl_seconds: u64,
    /// CORS origin allow-list. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            frontend_base_url: "http://localhost:5173".to_string(),
            room_ttl_seconds: 24 * 60 * 60,
            cleanup_interval_ms: 60_000,
            max_json_body_bytes: 16 * 1024,
            rest_rate_limit_window_ms: 60_000,
            rest_rate_limit_max: 60,
            ws_rate_limit_window_ms: 60_000,
            ws_rate_limit_max: 30,
            turn_urls: Vec::new(),
            turn_shared_secret: None,
            turn_ttl_seconds: 600,
            cors_origins: Vec::new(),
        }
    }
}

impl BrokerConfig {
    /// Read the enumerated `PORT`/`HOST`/`ROOM_TTL_SECONDS`/... options
    /// from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let secret = env("TURN_SHARED_SECRET", "");
        Self {
            port: env_parse("PORT", d.port),
            host: env("HOST", &d.host),
            frontend_base_url: env("FRONTEND_BASE_URL", &d.frontend_base_url),
            room_ttl_seconds: env_parse("ROOM_TTL_SECONDS", d.room_ttl_seconds),
            cleanup_interval_ms: env_parse("CLEANUP_INTERVAL_MS", d.cleanup_interval_ms),
            max_json_body_bytes: env_parse("MAX_JSON_BODY_BYTES", d.max_json_body_bytes),
            rest_rate_limit_window_ms: env_parse(
                "REST_RATE_LIMIT_WINDOW_MS",
                d.rest_rate_limit_window_ms,
            ),
            rest_rate_limit_max: env_parse("REST_RATE_LIMIT_MAX", d.rest_rate_limit_max),
            ws_rate_limit_window_ms: env_parse("WS_RATE_LIMIT_WINDOW_MS", d.ws_rate_limit_window_ms),
            ws_rate_limit_max: env_parse("WS_RATE_LIMIT_MAX", d.ws_rate_limit_max),
            turn_urls: env_list("TURN_URLS"),
            turn_shared_secret: if secret.trim().is_empty() { None } else { Some(secret) },
            turn_ttl_seconds: env_parse("TURN_TTL_SECONDS", d.turn_ttl_seconds),
            cors_origins: env_list("CORS_ORIGINS"),
        }
    }

    /// Room lifetime in milliseconds.
    pub fn room_ttl_ms(&self) -> u64 {
        self.room_ttl_seconds * 1000
    }

    /// Join URL for a room id.
    pub fn join_url(&self, room_id: &str) -> String {
        format!("{}/join/{room_id}", self.frontend_base_url.trim_end_matches('/'))
    }
}
