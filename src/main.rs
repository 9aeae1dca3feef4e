#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Meetlink rendezvous broker entrypoint (systemd-friendly).
//! Serves the REST + WS surface and runs the room cleanup timer.

use std::net::SocketAddr;

use meetlink::core::types::now_ms;
use meetlink::networking::config::BrokerConfig;
use meetlink::networking::http::{build_router, BrokerState, SharedState};
use tracing::{info, warn};

async fn cleanup_pass(state: &SharedState) {
    let now = now_ms();
    let (expired, open) = {
        let mut rooms = state.rooms.lock().expect("rooms lock");
        let expired = rooms.cleanup_expired(now);
        (expired, rooms.len())
    };
    state.metrics.rooms_open.set(open as i64);
    if !expired.is_empty() {
        let mut sessions = state.sessions.lock().expect("sessions lock");
        for room_id in &expired {
            let closed = sessions.close_room(room_id, "ROOM_EXPIRED", "room expired");
            state.metrics.rooms_expired_total.inc();
            info!(room = %room_id, closed, "expired room evicted");
        }
    }
    state.rest_limiter.lock().expect("rest limiter lock").prune(now);
    state.ws_limiter.lock().expect("ws limiter lock").prune(now);
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    let cfg = BrokerConfig::from_env();
    let addr: SocketAddr = match format!("{}:{}", cfg.host, cfg.port).parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("bad HOST/PORT: {e}");
            std::process::exit(1);
        }
    };

    let state = match BrokerState::new(cfg.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("metrics init failed: {e}");
            std::process::exit(1);
        }
    };

    let cleanup_state = state.clone();
    let cleanup_every = std::time::Duration::from_millis(cfg.cleanup_interval_ms.max(1_000));
    let cleanup_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_every);
        loop {
            ticker.tick().await;
            cleanup_pass(&cleanup_state).await;
        }
    });

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("bind {addr} failed: {e}");
            std::process::exit(1);
        }
    };
    info!(%addr, ttl_s = cfg.room_ttl_seconds, "meetlink broker starting");

    let app = build_router(state.clone());
    let shutdown_state = state.clone();
    let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            warn!("shutdown signal received");
            let closed = shutdown_state
                .sessions
                .lock()
                .expect("sessions lock")
                .close_all("SHUTTING_DOWN", "broker shutting down");
            info!(closed, "sessions closed");
        });

    if let Err(e) = serve.await {
        eprintln!("server error: {e}");
    }
    cleanup_task.abort();
}
