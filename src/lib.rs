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

//! Meetlink - peer-to-peer call signaling core.
//!
//! This repository provides:
//! - An offline signal-packet codec: gzip-compressed, chunked, authenticated
//!   envelopes carrying session descriptions over copy/paste or QR channels
//! - Passphrase-derived authenticated encryption (PBKDF2-HMAC-SHA256 +
//!   AES-256-GCM) with envelope metadata bound into the authentication tag
//! - A call controller driving offer/answer exchange, candidate gathering
//!   with settle-based termination, adaptive quality control, and a reliable
//!   in-call control channel
//! - A rendezvous broker: two-peer rooms, rate-limited admission, message
//!   relay, and ephemeral TURN credentials
//! - Monitoring via Prometheus metrics and structured logging

/// Core signaling primitives (types, codecs, crypto, call control).
pub mod core;
/// Observability (metrics, structured logging helpers).
pub mod monitoring;
/// Rendezvous broker (rooms, admission, relay, TURN credentials).
pub mod networking;
