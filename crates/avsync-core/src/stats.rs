//! Playback counters and the statistics snapshot.
//!
//! Counters are lock-free atomics updated from the decode threads, the
//! refresh step and the audio callback. [`Statistics`] is a plain snapshot
//! assembled by [`crate::Player::statistics`] together with clock and queue
//! readings.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use crate::options::SyncMaster;

/// Drift beyond this is counted as out of sync (milliseconds).
pub const SYNC_DRIFT_THRESHOLD_MS: i64 = 100;

/// Drift beyond this is logged (milliseconds).
pub const SYNC_DRIFT_WARNING_MS: i64 = 150;

/// Shared playback counters.
#[derive(Clone, Default)]
pub struct PlaybackMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    /// Frames discarded by the decode thread before queueing
    frame_drops_early: AtomicU64,
    /// Frames skipped by the refresh step to catch up
    frame_drops_late: AtomicU64,
    /// Frames handed to the presentation layer
    frames_displayed: AtomicU64,
    /// Audio frames consumed by the callback
    audio_frames_played: AtomicU64,
    /// Callback buffers filled with silence
    silence_buffers: AtomicU64,
    resampler_errors: AtomicU64,
    /// Signed video-vs-master drift at the last shown frame, in microseconds
    current_drift_us: AtomicI64,
    max_drift_ahead_us: AtomicI64,
    max_drift_behind_us: AtomicI64,
    out_of_sync_count: AtomicU64,
    sample_count: AtomicU64,
}

impl PlaybackMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_early_drop(&self) {
        self.inner.frame_drops_early.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_drop(&self) {
        self.inner.frame_drops_late.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_display(&self) {
        self.inner.frames_displayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_frame(&self) {
        self.inner
            .audio_frames_played
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_silence(&self) {
        self.inner.silence_buffers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resampler_error(&self) {
        self.inner.resampler_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the gap between a shown video frame and the master clock.
    pub fn record_drift(&self, drift_secs: f64) {
        let drift_us = (drift_secs * 1_000_000.0) as i64;
        self.inner
            .current_drift_us
            .store(drift_us, Ordering::Relaxed);
        if drift_us > 0 {
            self.inner
                .max_drift_ahead_us
                .fetch_max(drift_us, Ordering::Relaxed);
        } else {
            self.inner
                .max_drift_behind_us
                .fetch_min(drift_us, Ordering::Relaxed);
        }
        self.inner.sample_count.fetch_add(1, Ordering::Relaxed);

        let drift_ms = drift_us.abs() / 1000;
        if drift_ms > SYNC_DRIFT_THRESHOLD_MS {
            self.inner.out_of_sync_count.fetch_add(1, Ordering::Relaxed);
            if drift_ms > SYNC_DRIFT_WARNING_MS {
                let direction = if drift_us > 0 { "ahead of" } else { "behind" };
                tracing::debug!("A/V sync: video {}ms {} master", drift_ms, direction);
            }
        }
    }

    pub fn frame_drops_early(&self) -> u64 {
        self.inner.frame_drops_early.load(Ordering::Relaxed)
    }

    pub fn frame_drops_late(&self) -> u64 {
        self.inner.frame_drops_late.load(Ordering::Relaxed)
    }

    pub fn frames_displayed(&self) -> u64 {
        self.inner.frames_displayed.load(Ordering::Relaxed)
    }

    pub fn audio_frames_played(&self) -> u64 {
        self.inner.audio_frames_played.load(Ordering::Relaxed)
    }

    pub fn silence_buffers(&self) -> u64 {
        self.inner.silence_buffers.load(Ordering::Relaxed)
    }

    pub fn resampler_errors(&self) -> u64 {
        self.inner.resampler_errors.load(Ordering::Relaxed)
    }

    pub fn current_drift_ms(&self) -> i64 {
        self.inner.current_drift_us.load(Ordering::Relaxed) / 1000
    }

    pub fn max_drift_ms(&self) -> i64 {
        let ahead = self.inner.max_drift_ahead_us.load(Ordering::Relaxed);
        let behind = self.inner.max_drift_behind_us.load(Ordering::Relaxed);
        ahead.max(behind.abs()) / 1000
    }

    /// Share of shown frames that were out of sync, in percent.
    pub fn out_of_sync_percentage(&self) -> f64 {
        let samples = self.inner.sample_count.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        self.inner.out_of_sync_count.load(Ordering::Relaxed) as f64 * 100.0 / samples as f64
    }

    /// Clears drift tracking, e.g. after a seek.
    pub fn reset_drift(&self) {
        self.inner.current_drift_us.store(0, Ordering::Relaxed);
        self.inner.max_drift_ahead_us.store(0, Ordering::Relaxed);
        self.inner.max_drift_behind_us.store(0, Ordering::Relaxed);
        self.inner.out_of_sync_count.store(0, Ordering::Relaxed);
        self.inner.sample_count.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for PlaybackMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackMetrics")
            .field("frame_drops_early", &self.frame_drops_early())
            .field("frame_drops_late", &self.frame_drops_late())
            .field("frames_displayed", &self.frames_displayed())
            .field("max_drift_ms", &self.max_drift_ms())
            .finish()
    }
}

/// Point-in-time view of a playback session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    pub frame_drops_early: u64,
    pub frame_drops_late: u64,
    pub frames_displayed: u64,
    pub audio_frames_played: u64,
    pub silence_buffers: u64,
    /// Effective sync master.
    pub master: SyncMaster,
    pub master_clock_ms: Option<i64>,
    pub audio_clock_ms: Option<i64>,
    pub video_clock_ms: Option<i64>,
    /// `audio - video` when both are valid, else `master - video` or
    /// `master - audio`, in milliseconds.
    pub av_diff_ms: Option<i64>,
    pub max_drift_ms: i64,
    pub has_audio: bool,
    pub has_video: bool,
    pub audio_queue_bytes: usize,
    pub video_queue_bytes: usize,
    pub audio_frames_queued: usize,
    pub video_frames_queued: usize,
    /// Bytes per second received since the stream was opened.
    pub audio_bandwidth: f64,
    pub video_bandwidth: f64,
    pub frame_rate: Option<f64>,
    pub video_serial: Option<u64>,
    /// Seconds on the engine's time source.
    pub frame_timer: f64,
    pub eof: bool,
    pub paused: bool,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn clock(ms: Option<i64>) -> String {
            ms.map_or_else(|| "--".to_string(), |ms| format!("{:.3}", ms as f64 / 1000.0))
        }
        write!(
            f,
            "M-{:?} {} A:{} V:{} diff:{}ms aq={}KB vq={}KB fd={}/{}",
            self.master,
            clock(self.master_clock_ms),
            clock(self.audio_clock_ms),
            clock(self.video_clock_ms),
            self.av_diff_ms.map_or_else(|| "--".to_string(), |d| d.to_string()),
            self.audio_queue_bytes / 1024,
            self.video_queue_bytes / 1024,
            self.frame_drops_early,
            self.frame_drops_late,
        )
    }
}
