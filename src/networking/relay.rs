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

//! WS sessions and message relay.
//!
//! One long-lived session per `(roomId, peerId, role)`. Each session gets
//! a writer task fed by an unbounded queue, which preserves per-sender
//! order to every recipient. A malformed frame is dropped without
//! affecting the session; an oversized frame closes it with code 1009.

use crate::core::types::now_ms;
use crate::core::validation::validate_room_id;
use crate::networking::http::SharedState;
use crate::networking::rooms::RoomRole;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Frames above this many bytes close the session with code 1009.
pub const MAX_WS_FRAME_BYTES: usize = 64_000;

/// Close code for oversized frames.
pub const CLOSE_TOO_BIG: u16 = 1009;

/// Chat relay payload text bounds.
pub const CHAT_TEXT_MIN: usize = 1;
/// Upper chat bound, chars.
pub const CHAT_TEXT_MAX: usize = 500;

/// Message types the broker relays verbatim.
const RELAYED_TYPES: [&str; 4] = ["offer", "answer", "ice-candidate", "chat"];

/// A live session's send handle.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    /// The session's peer id.
    pub peer_id: String,
    /// The session's admitted role.
    pub role: RoomRole,
    tx: mpsc::UnboundedSender<Message>,
}

impl SessionHandle {
    /// Queue one frame; `false` when the writer is gone.
    pub fn send(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// All live sessions, grouped by room.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    rooms: HashMap<String, Vec<SessionHandle>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing a stale one for the same peer.
    pub fn add(&mut self, room_id: &str, handle: SessionHandle) {
        let sessions = self.rooms.entry(room_id.to_string()).or_default();
        sessions.retain(|s| s.peer_id != handle.peer_id);
        sessions.push(handle);
    }

    /// Remove one session.
    pub fn remove(&mut self, room_id: &str, peer_id: &str) -> Option<SessionHandle> {
        let sessions = self.rooms.get_mut(room_id)?;
        let pos = sessions.iter().position(|s| s.peer_id == peer_id)?;
        let handle = sessions.remove(pos);
        if sessions.is_empty() {
            self.rooms.remove(room_id);
        }
        Some(handle)
    }

    /// Live sessions in a room.
    pub fn count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, Vec::len)
    }

    /// Total live sessions.
    pub fn total(&self) -> usize {
        self.rooms.values().map(Vec::len).sum()
    }

    /// Send to one peer in a room.
    pub fn send_to(&self, room_id: &str, peer_id: &str, msg: Message) -> bool {
        self.rooms
            .get(room_id)
            .and_then(|sessions| sessions.iter().find(|s| s.peer_id == peer_id))
            .map(|s| s.send(msg))
            .unwrap_or(false)
    }

    /// Send to every peer in a room except one.
    pub fn broadcast_except(&self, room_id: &str, except_peer: &str, msg: Message) {
        if let Some(sessions) = self.rooms.get(room_id) {
            for s in sessions.iter().filter(|s| s.peer_id != except_peer) {
                s.send(msg.clone());
            }
        }
    }

    /// Close every session in a room with a terminal error frame.
    pub fn close_room(&mut self, room_id: &str, code: &str, reason: &str) -> usize {
        let Some(sessions) = self.rooms.remove(room_id) else {
            return 0;
        };
        let frame = server_frame("error", Some(json!({ "code": code, "message": reason })));
        for s in &sessions {
            s.send(frame.clone());
            s.send(Message::Close(Some(CloseFrame {
                code: 1000,
                reason: reason.to_string().into(),
            })));
        }
        sessions.len()
    }

    /// Close every session in every room (shutdown path).
    pub fn close_all(&mut self, code: &str, reason: &str) -> usize {
        let room_ids: Vec<String> = self.rooms.keys().cloned().collect();
        room_ids.iter().map(|id| self.close_room(id, code, reason)).sum()
    }
}

/// Build a server-emitted frame `{type, payload?, timestamp}`.
pub fn server_frame(kind: &str, payload: Option<Value>) -> Message {
    let mut frame = json!({ "type": kind, "timestamp": now_ms() });
    if let Some(p) = payload {
        frame["payload"] = p;
    }
    Message::Text(frame.to_string())
}

/// What to do with one incoming frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameAction {
    /// Echo back to the sender only (heartbeat).
    Echo(Value),
    /// Relay the decorated frame: to one peer, or the rest of the room.
    Relay {
        /// Decorated frame to deliver.
        frame: Value,
        /// Explicit recipient, when the sender addressed one.
        to_peer: Option<String>,
    },
    /// Reply to the sender with an `error` frame.
    ErrorFrame(&'static str),
    /// Malformed input: drop without a reply.
    Drop,
}

/// Classify one incoming text frame. Pure; covers everything except
/// delivery, so the decision table is directly testable and fuzzable.
pub fn classify_frame(text: &str, from_peer: &str, room_id: &str, now_ms: u64) -> FrameAction {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return FrameAction::Drop;
    };
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return FrameAction::Drop;
    };

    if kind == "heartbeat" {
        return FrameAction::Echo(json!({ "type": "heartbeat", "timestamp": now_ms }));
    }
    if !RELAYED_TYPES.contains(&kind) {
        return FrameAction::ErrorFrame("unsupported message type");
    }
    if kind == "chat" {
        let text_len = value
            .pointer("/payload/text")
            .and_then(Value::as_str)
            .map(|t| t.chars().count());
        match text_len {
            Some(n) if (CHAT_TEXT_MIN..=CHAT_TEXT_MAX).contains(&n) => {}
            _ => return FrameAction::ErrorFrame("invalid chat payload"),
        }
    }

    let to_peer = value.get("toPeerId").and_then(Value::as_str).map(str::to_string);
    let mut frame = value;
    if let Some(obj) = frame.as_object_mut() {
        obj.insert("fromPeerId".to_string(), json!(from_peer));
        obj.insert("roomId".to_string(), json!(room_id));
        obj.insert("timestamp".to_string(), json!(now_ms));
    }
    FrameAction::Relay { frame, to_peer }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    #[serde(rename = "roomId")]
    room_id: String,
    #[serde(rename = "peerId")]
    peer_id: String,
    role: String,
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, axum::Json(json!({ "code": code }))).into_response()
}

/// Admission + upgrade for `GET /v1/ws?roomId&peerId&role`.
pub(crate) async fn ws_handler(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let now = now_ms();
    if !state.ws_limiter.lock().expect("ws limiter lock").allow(addr.ip(), now) {
        state.metrics.ws_rejected_total.inc();
        return reject(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED");
    }
    // An id that fails the documented pattern cannot name a room.
    if validate_room_id(&query.room_id).is_err() {
        state.metrics.ws_rejected_total.inc();
        return reject(StatusCode::NOT_FOUND, "ROOM_NOT_FOUND");
    }
    if query.peer_id.is_empty() || query.peer_id.len() > 64 {
        state.metrics.ws_rejected_total.inc();
        return reject(StatusCode::BAD_REQUEST, "INVALID_PEER_ID");
    }
    let Some(role) = RoomRole::parse(&query.role) else {
        state.metrics.ws_rejected_total.inc();
        return reject(StatusCode::BAD_REQUEST, "INVALID_ROLE");
    };
    let admission = state
        .rooms
        .lock()
        .expect("rooms lock")
        .validate_join(&query.room_id, &query.peer_id, role, now);
    if let Err(rejection) = admission {
        state.metrics.ws_rejected_total.inc();
        return reject(crate::networking::http::join_status(rejection), rejection.as_str());
    }

    ws.on_upgrade(move |socket| session_loop(state, socket, query.room_id, query.peer_id, role))
}

async fn session_loop(
    state: SharedState,
    socket: WebSocket,
    room_id: String,
    peer_id: String,
    role: RoomRole,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Re-validate under the registry lock: the slot may have been taken
    // between the pre-upgrade check and now.
    let admitted = {
        let mut rooms = state.rooms.lock().expect("rooms lock");
        match rooms.validate_join(&room_id, &peer_id, role, now_ms()) {
            Ok(_) => rooms.add_participant(&room_id, &peer_id, role),
            Err(_) => false,
        }
    };
    if !admitted {
        let _ = tx.send(server_frame(
            "error",
            Some(json!({ "code": "ROLE_TAKEN", "message": "admission lost" })),
        ));
        let _ = tx.send(Message::Close(None));
        drop(tx);
        let _ = writer.await;
        return;
    }

    let participant_count = {
        let mut sessions = state.sessions.lock().expect("sessions lock");
        sessions.add(&room_id, SessionHandle { peer_id: peer_id.clone(), role, tx: tx.clone() });
        sessions.count(&room_id)
    };
    state.metrics.ws_sessions.inc();
    info!(room = %room_id, peer = %peer_id, role = role.as_str(), "peer joined");

    let _ = tx.send(server_frame(
        "session-joined",
        Some(json!({ "participantCount": participant_count })),
    ));
    {
        let sessions = state.sessions.lock().expect("sessions lock");
        sessions.broadcast_except(
            &room_id,
            &peer_id,
            server_frame("peer-joined", Some(json!({ "role": role.as_str() }))),
        );
    }

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if text.len() > MAX_WS_FRAME_BYTES {
                    warn!(room = %room_id, peer = %peer_id, "oversized frame; closing");
                    state.metrics.relay_dropped_total.inc();
                    let _ = tx.send(Message::Close(Some(CloseFrame {
                        code: CLOSE_TOO_BIG,
                        reason: "frame too large".into(),
                    })));
                    break;
                }
                match classify_frame(&text, &peer_id, &room_id, now_ms()) {
                    FrameAction::Echo(frame) => {
                        let _ = tx.send(Message::Text(frame.to_string()));
                    }
                    FrameAction::ErrorFrame(message) => {
                        state.metrics.relay_dropped_total.inc();
                        let _ = tx.send(server_frame(
                            "error",
                            Some(json!({ "code": "BAD_MESSAGE", "message": message })),
                        ));
                    }
                    FrameAction::Drop => {
                        state.metrics.relay_dropped_total.inc();
                        debug!(room = %room_id, peer = %peer_id, "malformed frame dropped");
                    }
                    FrameAction::Relay { frame, to_peer } => {
                        state.metrics.relay_messages_total.inc();
                        let out = Message::Text(frame.to_string());
                        let sessions = state.sessions.lock().expect("sessions lock");
                        match to_peer {
                            Some(target) => {
                                if !sessions.send_to(&room_id, &target, out) {
                                    state.metrics.relay_dropped_total.inc();
                                }
                            }
                            None => sessions.broadcast_except(&room_id, &peer_id, out),
                        }
                    }
                }
            }
            // Frames are JSON text; binary input is dropped.
            Message::Binary(_) => {
                state.metrics.relay_dropped_total.inc();
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    {
        let mut rooms = state.rooms.lock().expect("rooms lock");
        rooms.remove_participant(&room_id, &peer_id);
    }
    {
        let mut sessions = state.sessions.lock().expect("sessions lock");
        sessions.remove(&room_id, &peer_id);
        sessions.broadcast_except(
            &room_id,
            &peer_id,
            server_frame("peer-left", Some(json!({ "role": role.as_str() }))),
        );
    }
    state.metrics.ws_sessions.dec();
    info!(room = %room_id, peer = %peer_id, "peer left");

    drop(tx);
    let _ = writer.await;
}
