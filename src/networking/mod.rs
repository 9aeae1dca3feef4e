#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: rendezvous broker (rooms, relay, admission, TURN).

pub mod config;
pub mod http;
pub mod ratelimit;
pub mod relay;
pub mod rooms;
pub mod turn;
