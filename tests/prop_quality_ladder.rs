// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;

use meetlink::core::call::quality::{
    QualityController, QualityLevel, QualityState, RECOVERY_SAMPLES,
};
use meetlink::core::types::TelemetrySample;

fn sample(loss: f64, rtt: u32, jitter: u32) -> TelemetrySample {
    TelemetrySample {
        rtt_ms: rtt,
        jitter_ms: jitter,
        packet_loss_pct: loss,
        bitrate_kbps: 1500,
        frame_width: 1280,
        frame_height: 720,
        fps: 30.0,
        audio_level: 0.3,
    }
}

fn rung(level: QualityLevel) -> i32 {
    match level {
        QualityLevel::Hd1080 => 2,
        QualityLevel::Hd720 => 1,
        QualityLevel::Sd480 => 0,
    }
}

fn arb_sample() -> impl Strategy<Value = TelemetrySample> {
    (0.0f64..20.0, 0u32..400, 0u32..60).prop_map(|(loss, rtt, jitter)| sample(loss, rtt, jitter))
}

proptest! {
    // A single sample never moves the ladder by more than one rung, and
    // downward moves only happen on bad samples.
    #[test]
    fn never_skips_a_rung(samples in prop::collection::vec(arb_sample(), 1..200)) {
        let mut q = QualityController::new(QualityLevel::Hd1080);
        let mut prev = q.active();
        for s in &samples {
            let change = q.on_sample(s);
            let cur = q.active();
            prop_assert!((rung(prev) - rung(cur)).abs() <= 1, "jumped {prev:?} -> {cur:?}");
            if rung(cur) < rung(prev) {
                let bad = s.packet_loss_pct >= 5.0 || s.rtt_ms >= 220 || s.jitter_ms >= 30;
                prop_assert!(bad, "stepped down on a non-bad sample: {s:?}");
                prop_assert_eq!(change, Some(QualityState::Active(cur)));
            }
            prev = cur;
        }
    }

    // Recovery is only ever signaled after at least RECOVERY_SAMPLES
    // consecutive good samples.
    #[test]
    fn recovery_needs_a_full_good_streak(samples in prop::collection::vec(arb_sample(), 1..200)) {
        let mut q = QualityController::new(QualityLevel::Hd1080);
        q.force_state(QualityLevel::Sd480);
        let mut streak = 0u32;
        for s in &samples {
            let good = s.packet_loss_pct <= 2.0 && s.rtt_ms <= 130 && s.jitter_ms <= 16;
            let change = q.on_sample(s);
            streak = if good { streak + 1 } else { 0 };
            if change == Some(QualityState::Recovering) {
                prop_assert!(streak >= RECOVERY_SAMPLES, "recovered after {streak} good samples");
                streak = 0;
            }
        }
    }

    // Bad streaks drive the ladder monotonically down to the floor and
    // never report a change once there.
    #[test]
    fn bad_streak_is_monotone_to_the_floor(n in 1usize..20) {
        let mut q = QualityController::new(QualityLevel::Hd1080);
        let bad = sample(10.0, 300, 40);
        let mut rungs = vec![rung(q.active())];
        for _ in 0..n {
            q.on_sample(&bad);
            rungs.push(rung(q.active()));
        }
        prop_assert!(rungs.windows(2).all(|w| w[1] <= w[0]));
        if n >= 2 {
            prop_assert_eq!(q.active(), QualityLevel::Sd480);
        }
    }
}
