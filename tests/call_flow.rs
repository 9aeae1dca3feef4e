// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Drives the call controller against an in-memory fake transport:
//! offer/answer flows, gathering settle, the connect watchdog, the stats
//! loop with quality adaptation, chat, media toggles, and close.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use meetlink::core::call::controller::{CallConfig, CallController, CallError, CallEvents};
use meetlink::core::call::media::LocalMediaSource;
use meetlink::core::call::quality::{QualityLevel, QualityState};
use meetlink::core::call::transport::{
    ConnectionState, GatheringState, InboundAudioStats, OutboundVideoStats, PeerEvent,
    RemoteInboundVideoStats, StatsReport, TransportError, TransportPeer,
};
use meetlink::core::errors::FailureCode;
use meetlink::core::types::{ChannelFrame, ChannelKind, ClientInfo, OfferPayload};
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Clone, Default)]
struct FakeShared {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    accepted_candidates: Arc<Mutex<Vec<String>>>,
    channels: Arc<Mutex<Vec<String>>>,
    max_bitrate: Arc<Mutex<Option<u32>>>,
    stats: Arc<Mutex<StatsReport>>,
    reject_candidates_containing: Arc<Mutex<Option<String>>>,
    closed: Arc<Mutex<bool>>,
}

struct FakeTransport {
    shared: FakeShared,
    events_rx: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    local_description: Option<String>,
    remote_description: Option<String>,
}

#[derive(Clone)]
struct FakeHandle {
    events: mpsc::UnboundedSender<PeerEvent>,
    shared: FakeShared,
}

fn fake_peer() -> (FakeTransport, FakeHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = FakeShared::default();
    (
        FakeTransport {
            shared: shared.clone(),
            events_rx: Some(rx),
            local_description: None,
            remote_description: None,
        },
        FakeHandle { events: tx, shared },
    )
}

#[async_trait]
impl TransportPeer for FakeTransport {
    async fn attach_media(&mut self, _source: Arc<LocalMediaSource>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<String, TransportError> {
        Ok("v=0\r\nfake-offer".to_string())
    }

    async fn create_answer(&mut self) -> Result<String, TransportError> {
        if self.remote_description.is_none() {
            return Err(TransportError::Negotiation);
        }
        Ok("v=0\r\nfake-answer".to_string())
    }

    async fn set_local_description(&mut self, sdp: &str) -> Result<(), TransportError> {
        self.local_description = Some(sdp.to_string());
        Ok(())
    }

    async fn set_remote_description(&mut self, sdp: &str) -> Result<(), TransportError> {
        self.remote_description = Some(sdp.to_string());
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: &str) -> Result<(), TransportError> {
        let reject = self.shared.reject_candidates_containing.lock().unwrap().clone();
        if matches!(reject, Some(pat) if candidate.contains(&pat)) {
            return Err(TransportError::Candidate);
        }
        self.shared.accepted_candidates.lock().unwrap().push(candidate.to_string());
        Ok(())
    }

    fn local_description(&self) -> Option<String> {
        self.local_description.clone()
    }

    fn gathering_state(&self) -> GatheringState {
        GatheringState::Gathering
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::New
    }

    async fn create_data_channel(&mut self, label: &str) -> Result<(), TransportError> {
        self.shared.channels.lock().unwrap().push(label.to_string());
        Ok(())
    }

    async fn send_text(&mut self, label: &str, text: &str) -> Result<(), TransportError> {
        self.shared.sent.lock().unwrap().push((label.to_string(), text.to_string()));
        Ok(())
    }

    async fn close_channel(&mut self, _label: &str) {}

    async fn collect_stats(&mut self) -> Result<StatsReport, TransportError> {
        Ok(*self.shared.stats.lock().unwrap())
    }

    fn set_video_max_bitrate(&mut self, kbps: u32) -> Result<(), TransportError> {
        *self.shared.max_bitrate.lock().unwrap() = Some(kbps);
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<PeerEvent>> {
        self.events_rx.take()
    }

    async fn close(&mut self) {
        *self.shared.closed.lock().unwrap() = true;
    }
}

fn test_config() -> CallConfig {
    CallConfig {
        connect_timeout: Duration::from_millis(150),
        stats_interval: Duration::from_millis(25),
        ice_settle: Duration::from_millis(40),
        ice_gather_cap: Duration::from_millis(250),
        chat_min_interval: Duration::from_millis(100),
        ..CallConfig::default()
    }
}

fn bad_stats() -> StatsReport {
    StatsReport {
        outbound_video: Some(OutboundVideoStats {
            bytes_sent: 0,
            frame_width: 1920,
            frame_height: 1080,
            fps: 30.0,
        }),
        remote_inbound_video: Some(RemoteInboundVideoStats {
            packets_lost: 10,
            packets_received: 90,
            round_trip_time: 0.300,
        }),
        inbound_audio: Some(InboundAudioStats { jitter: 0.040 }),
        candidate_pair: None,
        audio_source_level: Some(0.5),
    }
}

fn good_stats() -> StatsReport {
    StatsReport {
        outbound_video: Some(OutboundVideoStats {
            bytes_sent: 0,
            frame_width: 854,
            frame_height: 480,
            fps: 30.0,
        }),
        remote_inbound_video: Some(RemoteInboundVideoStats {
            packets_lost: 0,
            packets_received: 100,
            round_trip_time: 0.050,
        }),
        inbound_audio: Some(InboundAudioStats { jitter: 0.005 }),
        candidate_pair: None,
        audio_source_level: Some(0.5),
    }
}

fn sample_offer(session_id: &str) -> OfferPayload {
    OfferPayload {
        session_id: session_id.to_string(),
        sdp_offer: "v=0\r\nremote-offer".to_string(),
        ice_candidates: vec!["cand-good-1".to_string(), "cand-bad-2".to_string()],
        media_target: "1080p30".to_string(),
        client_info: ClientInfo { user_agent: "test".into(), app_version: "1".into() },
    }
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let end = tokio::time::Instant::now() + deadline;
    while tokio::time::Instant::now() < end {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn host_offer_flow_collects_candidates() {
    let (peer, handle) = fake_peer();
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), CallEvents::default())
            .await
            .unwrap();
    assert_eq!(*handle.shared.channels.lock().unwrap(), vec!["chat", "diag"]);

    let events = handle.events.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        let _ = events.send(PeerEvent::Candidate(Some("cand-1".to_string())));
        sleep(Duration::from_millis(10)).await;
        let _ = events.send(PeerEvent::Candidate(Some("cand-2".to_string())));
        let _ = events.send(PeerEvent::Candidate(None));
    });

    let payload = controller.create_offer_payload().await.unwrap();
    assert_eq!(payload.sdp_offer, "v=0\r\nfake-offer");
    assert_eq!(payload.ice_candidates, vec!["cand-1", "cand-2"]);
    assert!(payload.session_id.starts_with("session-"));
    assert_eq!(payload.media_target, "1080p30");
    assert_eq!(controller.session_id().as_deref(), Some(payload.session_id.as_str()));
    controller.close().await;
}

#[tokio::test]
async fn gathering_respects_the_hard_cap_under_a_candidate_flood() {
    let (peer, handle) = fake_peer();
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), CallEvents::default())
            .await
            .unwrap();

    let events = handle.events.clone();
    let flood = tokio::spawn(async move {
        let mut i = 0u32;
        loop {
            i += 1;
            if events.send(PeerEvent::Candidate(Some(format!("cand-{i}")))).is_err() {
                break;
            }
            sleep(Duration::from_millis(15)).await;
        }
    });

    let started = tokio::time::Instant::now();
    let payload = tokio::time::timeout(Duration::from_secs(1), controller.create_offer_payload())
        .await
        .expect("must settle by the hard cap")
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(600));
    assert!(!payload.ice_candidates.is_empty());
    flood.abort();
    controller.close().await;
}

#[tokio::test]
async fn joiner_answer_flow_adopts_session_and_tolerates_bad_candidates() {
    let (peer, handle) = fake_peer();
    *handle.shared.reject_candidates_containing.lock().unwrap() = Some("bad".to_string());
    let controller =
        CallController::joiner(peer, Arc::new(LocalMediaSource::new()), test_config(), CallEvents::default())
            .await
            .unwrap();

    let events = handle.events.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        let _ = events.send(PeerEvent::Candidate(Some("local-cand".to_string())));
        let _ = events.send(PeerEvent::Candidate(None));
    });

    let answer = controller.accept_offer(&sample_offer("session-123")).await.unwrap();
    assert_eq!(answer.session_id, "session-123");
    assert_eq!(answer.sdp_answer, "v=0\r\nfake-answer");
    assert_eq!(answer.accepted_media_target, "1080p30");
    assert_eq!(answer.ice_candidates, vec!["local-cand"]);
    // The rejected candidate was skipped, the good one ingested.
    assert_eq!(*handle.shared.accepted_candidates.lock().unwrap(), vec!["cand-good-1"]);
    controller.close().await;
}

#[tokio::test]
async fn apply_answer_rejects_a_mismatched_session() {
    let (peer, handle) = fake_peer();
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), CallEvents::default())
            .await
            .unwrap();
    let events = handle.events.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(5)).await;
        let _ = events.send(PeerEvent::Candidate(None));
    });
    let offer = controller.create_offer_payload().await.unwrap();

    let answer = meetlink::core::types::AnswerPayload {
        session_id: "session-other".to_string(),
        sdp_answer: "v=0\r\n".to_string(),
        ice_candidates: vec![],
        accepted_media_target: "1080p30".to_string(),
        client_info: ClientInfo { user_agent: "t".into(), app_version: "1".into() },
    };
    assert!(matches!(
        controller.apply_answer(&answer).await.unwrap_err(),
        CallError::SessionMismatch
    ));

    let mut good = answer.clone();
    good.session_id = offer.session_id;
    controller.apply_answer(&good).await.unwrap();
    controller.close().await;
}

#[tokio::test]
async fn watchdog_reports_connection_timeout() {
    let (peer, handle) = fake_peer();
    let failures: Arc<Mutex<Vec<FailureCode>>> = Arc::default();
    let sink = failures.clone();
    let events = CallEvents {
        on_failure: Box::new(move |f| sink.lock().unwrap().push(f.code)),
        ..CallEvents::default()
    };
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), events)
            .await
            .unwrap();
    let tx = handle.events.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(5)).await;
        let _ = tx.send(PeerEvent::Candidate(None));
    });
    let _ = controller.create_offer_payload().await.unwrap();

    assert!(
        wait_until(Duration::from_millis(500), || {
            failures.lock().unwrap().contains(&FailureCode::ConnectionTimeout)
        })
        .await
    );
    controller.close().await;
}

#[tokio::test]
async fn connected_cancels_the_watchdog() {
    let (peer, handle) = fake_peer();
    let failures: Arc<Mutex<Vec<FailureCode>>> = Arc::default();
    let sink = failures.clone();
    let events = CallEvents {
        on_failure: Box::new(move |f| sink.lock().unwrap().push(f.code)),
        ..CallEvents::default()
    };
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), events)
            .await
            .unwrap();
    let tx = handle.events.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(5)).await;
        let _ = tx.send(PeerEvent::Candidate(None));
    });
    let _ = controller.create_offer_payload().await.unwrap();
    handle.events.send(PeerEvent::ConnectionState(ConnectionState::Connected)).unwrap();

    sleep(Duration::from_millis(300)).await;
    assert!(!failures.lock().unwrap().contains(&FailureCode::ConnectionTimeout));
    controller.close().await;
}

#[tokio::test]
async fn transport_failure_surfaces_nat_blocked() {
    let (peer, handle) = fake_peer();
    let failures: Arc<Mutex<Vec<FailureCode>>> = Arc::default();
    let sink = failures.clone();
    let events = CallEvents {
        on_failure: Box::new(move |f| sink.lock().unwrap().push(f.code)),
        ..CallEvents::default()
    };
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), events)
            .await
            .unwrap();
    handle.events.send(PeerEvent::ConnectionState(ConnectionState::Failed)).unwrap();

    assert!(
        wait_until(Duration::from_millis(300), || {
            failures.lock().unwrap().contains(&FailureCode::NatBlocked)
        })
        .await
    );
    controller.close().await;
}

#[tokio::test]
async fn stats_loop_degrades_quality_and_sends_diag_frames() {
    let (peer, handle) = fake_peer();
    *handle.shared.stats.lock().unwrap() = bad_stats();
    let changes: Arc<Mutex<Vec<QualityState>>> = Arc::default();
    let sink = changes.clone();
    let events = CallEvents {
        on_quality_change: Box::new(move |s| sink.lock().unwrap().push(s)),
        ..CallEvents::default()
    };
    let media = Arc::new(LocalMediaSource::new());
    let controller = CallController::host(peer, media.clone(), test_config(), events).await.unwrap();
    handle.events.send(PeerEvent::ConnectionState(ConnectionState::Connected)).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            *handle.shared.max_bitrate.lock().unwrap() == Some(900)
        })
        .await,
        "ladder never reached the floor"
    );
    {
        let seen = changes.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                QualityState::Active(QualityLevel::Hd720),
                QualityState::Active(QualityLevel::Sd480)
            ]
        );
    }
    // Constraints follow the rung.
    let constraints = media.video().constraints().expect("constraints applied");
    assert_eq!((constraints.width, constraints.height), (854, 480));

    // Each tick emitted a diag frame and appended a local event.
    let diag_frames = handle
        .shared
        .sent
        .lock()
        .unwrap()
        .iter()
        .filter(|(label, _)| label == "diag")
        .count();
    assert!(diag_frames >= 2, "expected diag traffic, saw {diag_frames}");
    assert!(!controller.diagnostics_events().is_empty());
    controller.close().await;
}

#[tokio::test]
async fn sustained_good_telemetry_steps_back_up() {
    let (peer, handle) = fake_peer();
    *handle.shared.stats.lock().unwrap() = bad_stats();
    let media = Arc::new(LocalMediaSource::new());
    let controller =
        CallController::host(peer, media.clone(), test_config(), CallEvents::default())
            .await
            .unwrap();
    handle.events.send(PeerEvent::ConnectionState(ConnectionState::Connected)).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            *handle.shared.max_bitrate.lock().unwrap() == Some(900)
        })
        .await
    );

    *handle.shared.stats.lock().unwrap() = good_stats();
    // Eight good samples per rung climb the ladder back to the top.
    assert!(
        wait_until(Duration::from_secs(3), || {
            *handle.shared.max_bitrate.lock().unwrap() == Some(3500)
        })
        .await,
        "recovery never reached the top rung"
    );
    controller.close().await;
}

#[tokio::test]
async fn chat_is_throttled_and_sanitized() {
    let (peer, handle) = fake_peer();
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), CallEvents::default())
            .await
            .unwrap();

    controller.send_chat("  hello\u{0007}   world ").await.unwrap();
    assert!(matches!(
        controller.send_chat("too soon").await.unwrap_err(),
        CallError::ChatThrottled
    ));
    sleep(Duration::from_millis(150)).await;
    controller.send_chat("second").await.unwrap();

    assert!(matches!(
        controller.send_chat("\u{0000}\u{0001}").await.unwrap_err(),
        CallError::InvalidChat
    ));

    let sent = handle.shared.sent.lock().unwrap();
    let chat: Vec<&(String, String)> = sent.iter().filter(|(l, _)| l == "chat").collect();
    assert_eq!(chat.len(), 2);
    let frame: ChannelFrame = serde_json::from_str(&chat[0].1).unwrap();
    assert_eq!(frame.kind, ChannelKind::Chat);
    assert_eq!(frame.payload["text"], "hello world");
    drop(sent);
    controller.close().await;
}

#[tokio::test]
async fn media_toggles_broadcast_control_state() {
    let (peer, handle) = fake_peer();
    let media = Arc::new(LocalMediaSource::new());
    let controller =
        CallController::host(peer, media.clone(), test_config(), CallEvents::default())
            .await
            .unwrap();

    controller.toggle_microphone_enabled(false).await.unwrap();
    assert!(!media.audio().enabled());
    controller.toggle_camera_enabled(false).await.unwrap();
    assert!(!media.video().enabled());

    let sent = handle.shared.sent.lock().unwrap();
    let frames: Vec<ChannelFrame> =
        sent.iter().map(|(_, t)| serde_json::from_str(t).unwrap()).collect();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.kind == ChannelKind::Control));
    assert_eq!(frames[0].payload["audioEnabled"], false);
    assert_eq!(frames[0].payload["videoEnabled"], true);
    assert_eq!(frames[1].payload["videoEnabled"], false);
    drop(sent);
    controller.close().await;
}

#[tokio::test]
async fn incoming_frames_are_dispatched_and_bounded() {
    let (peer, handle) = fake_peer();
    let chats: Arc<Mutex<Vec<String>>> = Arc::default();
    let states: Arc<Mutex<Vec<bool>>> = Arc::default();
    let chat_sink = chats.clone();
    let state_sink = states.clone();
    let events = CallEvents {
        on_chat_message: Box::new(move |t| chat_sink.lock().unwrap().push(t)),
        on_remote_media_state: Box::new(move |s| state_sink.lock().unwrap().push(s.audio_enabled)),
        ..CallEvents::default()
    };
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), events)
            .await
            .unwrap();

    let send = |text: String| {
        handle
            .events
            .send(PeerEvent::ChannelMessage { label: "chat".to_string(), text })
            .unwrap()
    };
    send(r#"{"type":"chat","payload":{"text":"hi   there"}}"#.to_string());
    send(r#"{"type":"control","payload":{"audioEnabled":false,"videoEnabled":true,"timestamp":5}}"#.to_string());
    send(format!(
        r#"{{"type":"diag","payload":{{"timestamp":{},"peerId":"remote","rttMs":40,"jitterMs":3,"packetLossPct":0.1,"bitrateKbps":1800,"frameWidth":1280,"frameHeight":720,"fps":30.0,"audioLevel":0.2,"eventType":"stats","message":""}}}}"#,
        meetlink::core::types::now_ms()
    ));
    // Oversized and unknown frames vanish silently.
    send(format!(r#"{{"type":"chat","payload":{{"text":"{}"}}}}"#, "x".repeat(16_000)));
    send(r#"{"type":"mystery","payload":{}}"#.to_string());
    send("not json".to_string());

    assert!(
        wait_until(Duration::from_millis(500), || {
            chats.lock().unwrap().len() == 1
                && states.lock().unwrap().len() == 1
                && !controller.diagnostics_events().is_empty()
        })
        .await
    );
    assert_eq!(chats.lock().unwrap()[0], "hi there");
    assert_eq!(states.lock().unwrap()[0], false);
    let remote_events = controller.diagnostics_events();
    assert_eq!(remote_events[0].peer_id, "remote");
    controller.close().await;
}

#[tokio::test]
async fn close_is_idempotent_and_terminal() {
    let (peer, handle) = fake_peer();
    let controller =
        CallController::host(peer, Arc::new(LocalMediaSource::new()), test_config(), CallEvents::default())
            .await
            .unwrap();
    controller.close().await;
    assert!(*handle.shared.closed.lock().unwrap());
    controller.close().await;

    assert!(matches!(controller.send_chat("late").await.unwrap_err(), CallError::Closed));
    assert!(matches!(
        controller.create_offer_payload().await.unwrap_err(),
        CallError::Closed
    ));
    assert_eq!(controller.connection_state(), ConnectionState::Closed);
}
