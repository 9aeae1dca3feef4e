// Copyright (c) 2026 Meetlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Local media source contract.
//!
//! Capture itself is out of scope; this models the opaque producer the UI
//! hands to the controller. The source is shared by reference between the
//! UI and the controller, and only the controller flips track `enabled`
//! flags or applies constraints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Media-source failure, surfaced as `DEVICE_DENIED`/`MEDIA_UNSUPPORTED`
/// at the boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaError {
    /// The platform rejected the requested constraints.
    #[error("constraints not supported")]
    Unsupported,
}

/// Constraints applied to the local video track when quality changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackConstraints {
    /// Target width, pixels.
    pub width: u32,
    /// Target height, pixels.
    pub height: u32,
    /// Target frame rate.
    pub frame_rate: f64,
}

/// One local track: an enabled flag plus the last applied constraints.
#[derive(Debug)]
pub struct MediaTrack {
    enabled: AtomicBool,
    constraints: Mutex<Option<TrackConstraints>>,
}

impl MediaTrack {
    fn new() -> Self {
        Self { enabled: AtomicBool::new(true), constraints: Mutex::new(None) }
    }

    /// Whether the track is currently producing media.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Relaxed);
    }

    /// The last constraints applied to this track.
    pub fn constraints(&self) -> Option<TrackConstraints> {
        *self.constraints.lock().expect("constraints lock")
    }
}

/// The shared local media source: one audio and one video track.
#[derive(Debug)]
pub struct LocalMediaSource {
    audio: MediaTrack,
    video: MediaTrack,
}

impl Default for LocalMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMediaSource {
    /// A source with both tracks enabled and no constraints applied.
    pub fn new() -> Self {
        Self { audio: MediaTrack::new(), video: MediaTrack::new() }
    }

    /// The audio track.
    pub fn audio(&self) -> &MediaTrack {
        &self.audio
    }

    /// The video track.
    pub fn video(&self) -> &MediaTrack {
        &self.video
    }

    /// Flip the audio track's enabled flag. Controller-only.
    pub fn set_audio_enabled(&self, on: bool) {
        self.audio.set_enabled(on);
    }

    /// Flip the video track's enabled flag. Controller-only.
    pub fn set_video_enabled(&self, on: bool) {
        self.video.set_enabled(on);
    }

    /// Apply width/height/frame-rate constraints to the video track.
    pub fn apply_video_constraints(&self, c: TrackConstraints) -> Result<(), MediaError> {
        if c.width == 0 || c.height == 0 || c.frame_rate <= 0.0 {
            return Err(MediaError::Unsupported);
        }
        *self.video.constraints.lock().expect("constraints lock") = Some(c);
        Ok(())
    }
}
