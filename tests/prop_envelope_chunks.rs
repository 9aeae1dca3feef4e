// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;

use meetlink::core::codec::envelope::{decode_packet, encode_offer, EnvelopeError};
use meetlink::core::types::{ClientInfo, OfferPayload};

fn payload_with_sdp(sdp_lines: usize) -> OfferPayload {
    OfferPayload {
        session_id: "session-prop".to_string(),
        sdp_offer: format!("v=0\r\n{}", "a=rtpmap:111 opus/48000/2\r\n".repeat(sdp_lines)),
        ice_candidates: vec!["candidate:0 1 udp 1 192.0.2.1 4000 typ host".to_string()],
        media_target: "1080p30".to_string(),
        client_info: ClientInfo { user_agent: "prop".into(), app_version: "1".into() },
    }
}

proptest! {
    // Chunk order and duplication are transport noise; the decoded envelope
    // is invariant under both.
    #[test]
    fn decode_is_invariant_under_reorder_and_duplication(
        sdp_lines in 1usize..800,
        seed in any::<u64>(),
    ) {
        let text = encode_offer(&payload_with_sdp(sdp_lines), "room-prop", "prop-passphrase", 1_000_000)
            .expect("encode");
        let reference = decode_packet(&text).expect("decode");

        let mut lines: Vec<&str> = text.lines().collect();
        // Deterministic pseudo-shuffle from the seed.
        let mut s = seed;
        for i in (1..lines.len()).rev() {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (s >> 33) as usize % (i + 1);
            lines.swap(i, j);
        }
        // Duplicate a pseudo-random line.
        let dup = (s >> 7) as usize % lines.len();
        lines.push(lines[dup]);

        let reshuffled = decode_packet(&lines.join("\n")).expect("decode shuffled");
        prop_assert_eq!(reshuffled, reference);
    }

    #[test]
    fn removing_any_chunk_is_structural_not_crypto(
        sdp_lines in 200usize..800,
        which in any::<prop::sample::Index>(),
    ) {
        let text = encode_offer(&payload_with_sdp(sdp_lines), "room-prop", "prop-passphrase", 1_000_000)
            .expect("encode");
        let lines: Vec<&str> = text.lines().collect();
        prop_assume!(lines.len() > 1);

        let skip = which.index(lines.len());
        let partial: Vec<&str> = lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, l)| *l)
            .collect();
        let err = decode_packet(&partial.join("\n")).expect_err("must fail");
        prop_assert!(matches!(err, EnvelopeError::MissingChunks));
    }

    // Garbage never panics the decoder and never yields an envelope with a
    // violated time window.
    #[test]
    fn arbitrary_text_never_panics(text in "\\PC{0,2000}") {
        if let Ok(env) = decode_packet(&text) {
            prop_assert!(env.created_at < env.expires_at);
        }
    }
}
