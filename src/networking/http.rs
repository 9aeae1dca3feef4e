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

//! Broker HTTP surface: REST endpoints, CORS allow-list, body caps,
//! rate limiting, and the WS upgrade route.

use crate::core::types::now_ms;
use crate::core::validation::validate_room_id;
use crate::monitoring::metrics::{Metrics, MetricsError};
use crate::networking::config::BrokerConfig;
use crate::networking::ratelimit::FixedWindowLimiter;
use crate::networking::relay::{self, SessionRegistry};
use crate::networking::rooms::{JoinRejection, RoomRegistry};
use crate::networking::turn::{build_turn_credentials, TurnConfig};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Shared broker state behind the axum router.
pub struct BrokerState {
    /// Runtime configuration.
    pub cfg: BrokerConfig,
    /// Room registry. Mutated only behind this lock.
    pub rooms: Mutex<RoomRegistry>,
    /// Live WS sessions.
    pub sessions: Mutex<SessionRegistry>,
    /// REST rate-limit store.
    pub rest_limiter: Mutex<FixedWindowLimiter>,
    /// WS-upgrade rate-limit store.
    pub ws_limiter: Mutex<FixedWindowLimiter>,
    /// Prometheus metrics.
    pub metrics: Metrics,
}

/// The router's state handle.
pub type SharedState = Arc<BrokerState>;

impl BrokerState {
    /// Build state from configuration.
    pub fn new(cfg: BrokerConfig) -> Result<SharedState, MetricsError> {
        let metrics = Metrics::new()?;
        Ok(Arc::new(Self {
            rooms: Mutex::new(RoomRegistry::new(cfg.room_ttl_ms())),
            sessions: Mutex::new(SessionRegistry::new()),
            rest_limiter: Mutex::new(FixedWindowLimiter::new(
                cfg.rest_rate_limit_window_ms,
                cfg.rest_rate_limit_max,
            )),
            ws_limiter: Mutex::new(FixedWindowLimiter::new(
                cfg.ws_rate_limit_window_ms,
                cfg.ws_rate_limit_max,
            )),
            metrics,
            cfg,
        }))
    }

    /// The TURN slice of the configuration.
    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            urls: self.cfg.turn_urls.clone(),
            shared_secret: self.cfg.turn_shared_secret.clone(),
            ttl_seconds: self.cfg.turn_ttl_seconds,
        }
    }
}

/// Room join error mapping to HTTP statuses.
pub fn join_status(rejection: JoinRejection) -> StatusCode {
    match rejection {
        JoinRejection::RoomNotFound => StatusCode::NOT_FOUND,
        JoinRejection::RoomExpired => StatusCode::GONE,
        JoinRejection::RoomFull | JoinRejection::RoleTaken => StatusCode::CONFLICT,
        JoinRejection::InvalidRole => StatusCode::BAD_REQUEST,
    }
}

fn error_body(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "code": code }))).into_response()
}

fn client_ip(req: &Request) -> IpAddr {
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ci) => ci.0.ip(),
        None => {
            // No connect info (in-process tests); treat as loopback.
            IpAddr::from([127, 0, 0, 1])
        }
    }
}

async fn cors_middleware(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(o) = &origin {
        let allowed =
            state.cfg.cors_origins.is_empty() || state.cfg.cors_origins.iter().any(|a| a == o);
        if !allowed {
            warn!(origin = %o, "blocked origin");
            return error_body(StatusCode::FORBIDDEN, "CORS_BLOCKED");
        }
    }

    let allow_origin = origin.clone().unwrap_or_else(|| "*".to_string());
    if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        let headers = resp.headers_mut();
        if let Ok(v) = HeaderValue::from_str(&allow_origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, v);
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("content-type"),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
        return resp;
    }

    let mut resp = next.run(req).await;
    if origin.is_some() {
        if let Ok(v) = HeaderValue::from_str(&allow_origin) {
            resp.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, v);
        }
    }
    resp
}

async fn body_cap_middleware(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if matches!(declared, Some(len) if len > state.cfg.max_json_body_bytes) {
        return error_body(StatusCode::PAYLOAD_TOO_LARGE, "BODY_TOO_LARGE");
    }
    next.run(req).await
}

async fn rest_rate_limit_middleware(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    let allowed = state.rest_limiter.lock().expect("rest limiter lock").allow(ip, now_ms());
    if !allowed {
        state.metrics.rest_rate_limited_total.inc();
        return error_body(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED");
    }
    next.run(req).await
}

async fn create_room(State(state): State<SharedState>) -> Response {
    let now = now_ms();
    let (room, open) = {
        let mut rooms = state.rooms.lock().expect("rooms lock");
        match rooms.create_room(now) {
            Ok(room) => (room, rooms.len()),
            Err(_) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        }
    };
    state.metrics.rooms_open.set(open as i64);
    (
        StatusCode::CREATED,
        Json(json!({
            "roomId": room.room_id,
            "joinUrl": state.cfg.join_url(&room.room_id),
            "expiresAt": room.expires_at,
        })),
    )
        .into_response()
}

async fn room_status(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    if validate_room_id(&id).is_err() {
        return error_body(StatusCode::NOT_FOUND, "ROOM_NOT_FOUND");
    }
    let room = state.rooms.lock().expect("rooms lock").get_active(&id, now_ms());
    match room {
        Some(room) => Json(json!({
            "roomId": room.room_id,
            "status": "open",
            "expiresAt": room.expires_at,
            "participantCount": room.participant_count(),
        }))
        .into_response(),
        None => error_body(StatusCode::NOT_FOUND, "ROOM_NOT_FOUND"),
    }
}

async fn turn_credentials(
    State(state): State<SharedState>,
    body: Option<Json<serde_json::Value>>,
) -> Response {
    let peer_id = body
        .as_ref()
        .and_then(|Json(v)| v.get("peerId"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Json(build_turn_credentials(&state.turn_config(), peer_id, now_ms())).into_response()
}

async fn health() -> Response {
    Json(json!({ "ok": true, "timestamp": now_ms() })).into_response()
}

async fn metrics_endpoint(State(state): State<SharedState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

/// Build the broker router.
pub fn build_router(state: SharedState) -> Router {
    let rest = Router::new()
        .route("/v1/rooms", post(create_room))
        .route("/v1/rooms/:id", get(room_status))
        .route("/v1/turn-credentials", post(turn_credentials))
        .layer(middleware::from_fn_with_state(state.clone(), rest_rate_limit_middleware));

    Router::new()
        .merge(rest)
        .route("/v1/ws", get(relay::ws_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .layer(DefaultBodyLimit::max(state.cfg.max_json_body_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), body_cap_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
}
