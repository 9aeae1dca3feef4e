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

//! Room registry: two-peer rendezvous records with TTL eviction.
//!
//! A room holds at most one host and one guest. A room is active iff
//! `now < expires_at`; expired rooms are evicted on lookup and by the
//! periodic cleanup pass. One room's expiry never affects another room.

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Room id alphabet: lowercase letters and digits minus the visually
/// ambiguous `0 1 i l o`.
const ROOM_ID_ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

/// Random characters after the `meet-` prefix.
const ROOM_ID_RANDOM_LEN: usize = 14;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The system random source failed.
    #[error("random source unavailable")]
    Random,
}

/// Broker-side participant role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomRole {
    /// The room creator's side.
    Host,
    /// The second participant.
    Guest,
}

impl RoomRole {
    /// Coerce a query-string role. Anything but `host`/`guest` is invalid.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host" => Some(RoomRole::Host),
            "guest" => Some(RoomRole::Guest),
            _ => None,
        }
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomRole::Host => "host",
            RoomRole::Guest => "guest",
        }
    }
}

/// One rendezvous room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    /// Public identifier, `meet-` plus 14 unambiguous characters.
    pub room_id: String,
    /// Creation time, ms since UNIX epoch.
    pub created_at: u64,
    /// Expiry time, ms since UNIX epoch.
    pub expires_at: u64,
    /// Host slot.
    pub host_peer_id: Option<String>,
    /// Guest slot.
    pub guest_peer_id: Option<String>,
}

impl RoomRecord {
    /// Whether the room is still active at `now`.
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at
    }

    /// Occupied slots.
    pub fn participant_count(&self) -> usize {
        self.host_peer_id.iter().count() + self.guest_peer_id.iter().count()
    }

    fn slot(&self, role: RoomRole) -> &Option<String> {
        match role {
            RoomRole::Host => &self.host_peer_id,
            RoomRole::Guest => &self.guest_peer_id,
        }
    }

    fn slot_mut(&mut self, role: RoomRole) -> &mut Option<String> {
        match role {
            RoomRole::Host => &mut self.host_peer_id,
            RoomRole::Guest => &mut self.guest_peer_id,
        }
    }

    fn distinct_peers(&self) -> usize {
        match (&self.host_peer_id, &self.guest_peer_id) {
            (Some(h), Some(g)) if h == g => 1,
            (Some(_), Some(_)) => 2,
            (Some(_), None) | (None, Some(_)) => 1,
            (None, None) => 0,
        }
    }

    fn holds(&self, peer_id: &str) -> bool {
        self.host_peer_id.as_deref() == Some(peer_id)
            || self.guest_peer_id.as_deref() == Some(peer_id)
    }
}

/// Why a join was rejected. Maps to 404/410/409/400 at the HTTP boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinRejection {
    /// No such room.
    RoomNotFound,
    /// The room's TTL has passed.
    RoomExpired,
    /// Role was neither `host` nor `guest`.
    InvalidRole,
    /// The requested role slot is owned by a different peer.
    RoleTaken,
    /// Two distinct peers already occupy the room.
    RoomFull,
}

impl JoinRejection {
    /// Stable wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRejection::RoomNotFound => "ROOM_NOT_FOUND",
            JoinRejection::RoomExpired => "ROOM_EXPIRED",
            JoinRejection::InvalidRole => "INVALID_ROLE",
            JoinRejection::RoleTaken => "ROLE_TAKEN",
            JoinRejection::RoomFull => "ROOM_FULL",
        }
    }
}

/// The two-peer room registry. Exclusively owned by the broker process;
/// all mutation is lock-serialized by the caller.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: BTreeMap<String, RoomRecord>,
    ttl_ms: u64,
}

impl RoomRegistry {
    /// Registry with the given room TTL.
    pub fn new(ttl_ms: u64) -> Self {
        Self { rooms: BTreeMap::new(), ttl_ms }
    }

    /// Active room count (including expired rooms not yet evicted).
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether the registry holds no rooms.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn mint_room_id(&self) -> Result<String, RoomError> {
        let rng = SystemRandom::new();
        // Collisions are vanishingly rare at 31^14; retry a few times anyway.
        for _ in 0..8 {
            let mut raw = [0u8; ROOM_ID_RANDOM_LEN];
            rng.fill(&mut raw).map_err(|_| RoomError::Random)?;
            let suffix: String = raw
                .iter()
                .map(|b| ROOM_ID_ALPHABET[*b as usize % ROOM_ID_ALPHABET.len()] as char)
                .collect();
            let id = format!("meet-{suffix}");
            if !self.rooms.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(RoomError::Random)
    }

    /// Mint a unique identifier and insert a fresh room.
    pub fn create_room(&mut self, now_ms: u64) -> Result<RoomRecord, RoomError> {
        let room_id = self.mint_room_id()?;
        let record = RoomRecord {
            room_id: room_id.clone(),
            created_at: now_ms,
            expires_at: now_ms + self.ttl_ms,
            host_peer_id: None,
            guest_peer_id: None,
        };
        self.rooms.insert(room_id, record.clone());
        Ok(record)
    }

    /// Return the room only if still active, evicting it on expiry.
    pub fn get_active(&mut self, room_id: &str, now_ms: u64) -> Option<RoomRecord> {
        match self.rooms.get(room_id) {
            Some(room) if room.is_active(now_ms) => Some(room.clone()),
            Some(_) => {
                self.rooms.remove(room_id);
                None
            }
            None => None,
        }
    }

    /// Admission check. Rejoining an already-held slot is allowed.
    pub fn validate_join(
        &mut self,
        room_id: &str,
        peer_id: &str,
        role: RoomRole,
        now_ms: u64,
    ) -> Result<RoomRecord, JoinRejection> {
        let room = match self.rooms.get(room_id) {
            None => return Err(JoinRejection::RoomNotFound),
            Some(r) => r,
        };
        if !room.is_active(now_ms) {
            self.rooms.remove(room_id);
            return Err(JoinRejection::RoomExpired);
        }
        if room.distinct_peers() >= 2 && !room.holds(peer_id) {
            return Err(JoinRejection::RoomFull);
        }
        match room.slot(role) {
            Some(owner) if owner != peer_id => Err(JoinRejection::RoleTaken),
            _ => Ok(room.clone()),
        }
    }

    /// Occupy a role slot. A role is never silently swapped between
    /// peers; the slot must be free or already held by this peer.
    pub fn add_participant(&mut self, room_id: &str, peer_id: &str, role: RoomRole) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        match room.slot(role) {
            Some(owner) if owner != peer_id => false,
            _ => {
                *room.slot_mut(role) = Some(peer_id.to_string());
                true
            }
        }
    }

    /// Free whichever slot the peer holds.
    pub fn remove_participant(&mut self, room_id: &str, peer_id: &str) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let mut removed = false;
        if room.host_peer_id.as_deref() == Some(peer_id) {
            room.host_peer_id = None;
            removed = true;
        }
        if room.guest_peer_id.as_deref() == Some(peer_id) {
            room.guest_peer_id = None;
            removed = true;
        }
        removed
    }

    /// Evict every expired room, returning the evicted identifiers.
    pub fn cleanup_expired(&mut self, now_ms: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, r)| !r.is_active(now_ms))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.rooms.remove(id);
        }
        expired
    }
}
