// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Quality ladder controller.
//! Deterministic, integer-threshold hysteresis over telemetry samples.

use crate::core::types::TelemetrySample;
use serde::{Deserialize, Serialize};

/// Consecutive good samples required before recovery is signaled.
pub const RECOVERY_SAMPLES: u32 = 8;

/// Active rungs of the quality ladder, best first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityLevel {
    /// 1920x1080 @ 3500 kbps.
    #[serde(rename = "HD_1080")]
    Hd1080,
    /// 1280x720 @ 2000 kbps.
    #[serde(rename = "HD_720")]
    Hd720,
    /// 854x480 @ 900 kbps.
    #[serde(rename = "SD_480")]
    Sd480,
}

/// Encoder profile carried by an active rung.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityProfile {
    /// Frame width, pixels.
    pub width: u32,
    /// Frame height, pixels.
    pub height: u32,
    /// Encoder bitrate ceiling, kbit/s.
    pub max_bitrate_kbps: u32,
}

impl QualityLevel {
    /// The profile for this rung.
    pub fn profile(&self) -> QualityProfile {
        match self {
            QualityLevel::Hd1080 => QualityProfile { width: 1920, height: 1080, max_bitrate_kbps: 3500 },
            QualityLevel::Hd720 => QualityProfile { width: 1280, height: 720, max_bitrate_kbps: 2000 },
            QualityLevel::Sd480 => QualityProfile { width: 854, height: 480, max_bitrate_kbps: 900 },
        }
    }

    /// One rung worse; `None` at the bottom.
    pub fn down(&self) -> Option<QualityLevel> {
        match self {
            QualityLevel::Hd1080 => Some(QualityLevel::Hd720),
            QualityLevel::Hd720 => Some(QualityLevel::Sd480),
            QualityLevel::Sd480 => None,
        }
    }

    /// One rung better; `None` at the top.
    pub fn up(&self) -> Option<QualityLevel> {
        match self {
            QualityLevel::Hd1080 => None,
            QualityLevel::Hd720 => Some(QualityLevel::Hd1080),
            QualityLevel::Sd480 => Some(QualityLevel::Hd720),
        }
    }
}

/// A reported quality state: an active rung, or the transient recovery
/// sentinel. `Recovering` is an in-band signal to step up, never a state
/// the call should park in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityState {
    /// An active rung.
    Active(QualityLevel),
    /// Sustained good telemetry; the caller should step one rung up.
    Recovering,
}

/// Sample classification thresholds.
#[derive(Clone, Copy, Debug)]
pub struct QualityThresholds {
    /// Loss percentage at or above which a sample is bad.
    pub bad_loss_pct: f64,
    /// RTT at or above which a sample is bad, ms.
    pub bad_rtt_ms: u32,
    /// Jitter at or above which a sample is bad, ms.
    pub bad_jitter_ms: u32,
    /// Loss percentage at or below which a sample is good.
    pub good_loss_pct: f64,
    /// RTT at or below which a sample is good, ms.
    pub good_rtt_ms: u32,
    /// Jitter at or below which a sample is good, ms.
    pub good_jitter_ms: u32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            bad_loss_pct: 5.0,
            bad_rtt_ms: 220,
            bad_jitter_ms: 30,
            good_loss_pct: 2.0,
            good_rtt_ms: 130,
            good_jitter_ms: 16,
        }
    }
}

/// The ladder controller: current active rung plus a stable-sample counter.
#[derive(Debug)]
pub struct QualityController {
    thresholds: QualityThresholds,
    active: QualityLevel,
    recovering: bool,
    stable_samples: u32,
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new(QualityLevel::Hd1080)
    }
}

impl QualityController {
    /// Start at `initial` with default thresholds.
    pub fn new(initial: QualityLevel) -> Self {
        Self {
            thresholds: QualityThresholds::default(),
            active: initial,
            recovering: false,
            stable_samples: 0,
        }
    }

    /// The current active rung.
    pub fn active(&self) -> QualityLevel {
        self.active
    }

    /// The currently reported state.
    pub fn state(&self) -> QualityState {
        if self.recovering {
            QualityState::Recovering
        } else {
            QualityState::Active(self.active)
        }
    }

    /// Consecutive good samples observed.
    pub fn stable_samples(&self) -> u32 {
        self.stable_samples
    }

    fn is_bad(&self, s: &TelemetrySample) -> bool {
        s.packet_loss_pct >= self.thresholds.bad_loss_pct
            || s.rtt_ms >= self.thresholds.bad_rtt_ms
            || s.jitter_ms >= self.thresholds.bad_jitter_ms
    }

    fn is_good(&self, s: &TelemetrySample) -> bool {
        s.packet_loss_pct <= self.thresholds.good_loss_pct
            && s.rtt_ms <= self.thresholds.good_rtt_ms
            && s.jitter_ms <= self.thresholds.good_jitter_ms
    }

    /// Feed one sample. Returns the new state when it changed.
    pub fn on_sample(&mut self, sample: &TelemetrySample) -> Option<QualityState> {
        if self.is_bad(sample) {
            self.stable_samples = 0;
            self.recovering = false;
            if let Some(lower) = self.active.down() {
                self.active = lower;
                return Some(QualityState::Active(self.active));
            }
            return None;
        }
        if !self.is_good(sample) {
            self.stable_samples = 0;
            return None;
        }
        self.stable_samples += 1;
        if self.stable_samples >= RECOVERY_SAMPLES {
            self.stable_samples = 0;
            if !self.recovering && self.active != QualityLevel::Hd1080 {
                self.recovering = true;
                return Some(QualityState::Recovering);
            }
        }
        None
    }

    /// Override the active rung and reset the counter.
    pub fn force_state(&mut self, level: QualityLevel) {
        self.active = level;
        self.recovering = false;
        self.stable_samples = 0;
    }

    /// Resolve the recovery sentinel straight to the top rung.
    pub fn complete_recovery(&mut self) {
        if self.recovering {
            self.recovering = false;
            self.active = QualityLevel::Hd1080;
        }
    }
}
