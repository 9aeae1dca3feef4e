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

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Open rooms gauge.
    pub rooms_open: IntGauge,
    /// Live WS sessions gauge.
    pub ws_sessions: IntGauge,

    /// Relayed signaling/chat messages.
    pub relay_messages_total: IntCounter,
    /// Dropped or rejected WS frames.
    pub relay_dropped_total: IntCounter,
    /// REST requests rejected by the rate limiter.
    pub rest_rate_limited_total: IntCounter,
    /// WS upgrades rejected before admission.
    pub ws_rejected_total: IntCounter,
    /// Rooms evicted by expiry.
    pub rooms_expired_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let rooms_open = IntGauge::new("meetlink_rooms_open", "Open rooms")
            .map_err(|_| MetricsError::Prom)?;
        let ws_sessions = IntGauge::new("meetlink_ws_sessions", "Live WS sessions")
            .map_err(|_| MetricsError::Prom)?;

        let relay_messages_total =
            IntCounter::new("meetlink_relay_messages_total", "Relayed messages")
                .map_err(|_| MetricsError::Prom)?;
        let relay_dropped_total =
            IntCounter::new("meetlink_relay_dropped_total", "Dropped or rejected WS frames")
                .map_err(|_| MetricsError::Prom)?;
        let rest_rate_limited_total = IntCounter::new(
            "meetlink_rest_rate_limited_total",
            "Rate-limited REST requests",
        )
        .map_err(|_| MetricsError::Prom)?;
        let ws_rejected_total =
            IntCounter::new("meetlink_ws_rejected_total", "Rejected WS upgrades")
                .map_err(|_| MetricsError::Prom)?;
        let rooms_expired_total =
            IntCounter::new("meetlink_rooms_expired_total", "Rooms evicted by expiry")
                .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(rooms_open.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(ws_sessions.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(relay_messages_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(relay_dropped_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(rest_rate_limited_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(ws_rejected_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(rooms_expired_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            rooms_open,
            ws_sessions,
            relay_messages_total,
            relay_dropped_total,
            rest_rate_limited_total,
            ws_rejected_total,
            rooms_expired_total,
        })
    }

    /// Render the registry in the Prometheus text format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
