//! A/V synchronization arithmetic.
//!
//! Pure functions and small state machines used by the refresh step and the
//! audio path. Nothing here touches threads or queues, which keeps the
//! decisions testable with synthetic inputs.

use crate::frame::FrameTiming;
use crate::options::SyncMaster;

/// No correction below this gap, in seconds.
pub const AV_SYNC_THRESHOLD_MIN: f64 = 0.04;
/// Correction always kicks in above this gap, in seconds.
pub const AV_SYNC_THRESHOLD_MAX: f64 = 0.1;
/// Frames longer than this are not duplicated for sync.
pub const AV_SYNC_FRAMEDUP_THRESHOLD: f64 = 0.1;
/// Gaps larger than this are treated as discontinuities, not drift.
pub const AV_NOSYNC_THRESHOLD: f64 = 10.0;
/// Maximum audio speed change, in percent.
pub const SAMPLE_CORRECTION_PERCENT_MAX: usize = 10;
/// Samples in the audio drift average.
pub const AUDIO_DIFF_AVG_NB: u32 = 20;
/// Longest believable frame for sources with timestamp discontinuities.
pub const MAX_FRAME_DURATION_DISCONTINUOUS: f64 = 10.0;
/// Longest believable frame otherwise.
pub const MAX_FRAME_DURATION: f64 = 3600.0;

/// Duration of `last` as implied by the next frame's timestamp.
///
/// Falls back to the frame's nominal duration when the gap is missing, not
/// positive or larger than `max_frame_duration`; frames from different epochs
/// have no meaningful gap and yield zero.
pub fn frame_duration(last: &FrameTiming, next: &FrameTiming, max_frame_duration: f64) -> f64 {
    if last.serial != next.serial {
        return 0.0;
    }
    match (last.pts, next.pts) {
        (Some(a), Some(b)) => {
            let gap = b - a;
            if gap.is_nan() || gap <= 0.0 || gap > max_frame_duration {
                last.duration
            } else {
                gap
            }
        }
        _ => last.duration,
    }
}

/// Adjusts the nominal frame delay so video follows the master clock.
///
/// `diff` is `video_clock - master_clock` (`None` if either is invalid).
/// Behind the master the delay shrinks, ahead of it the delay grows. Video
/// master leaves the delay untouched. The result is never negative.
pub fn compute_target_delay(
    delay: f64,
    master: SyncMaster,
    diff: Option<f64>,
    max_frame_duration: f64,
) -> f64 {
    let mut delay = delay.max(0.0);
    if master == SyncMaster::Video {
        return delay;
    }
    let Some(diff) = diff else {
        return delay;
    };
    let sync_threshold = delay.clamp(AV_SYNC_THRESHOLD_MIN, AV_SYNC_THRESHOLD_MAX);
    if diff.is_finite() && diff.abs() < max_frame_duration {
        if diff <= -sync_threshold {
            delay = (delay + diff).max(0.0);
        } else if diff >= sync_threshold && delay > AV_SYNC_FRAMEDUP_THRESHOLD {
            delay += diff;
        } else if diff >= sync_threshold {
            delay *= 2.0;
        }
    }
    tracing::trace!(delay, diff, "target delay");
    delay
}

/// Queued packets below which a realtime source's external clock slows down.
pub const EXTERNAL_CLOCK_MIN_FRAMES: usize = 2;
/// Queued packets above which it speeds up.
pub const EXTERNAL_CLOCK_MAX_FRAMES: usize = 10;
pub const EXTERNAL_CLOCK_SPEED_MIN: f64 = 0.900;
pub const EXTERNAL_CLOCK_SPEED_MAX: f64 = 1.010;
pub const EXTERNAL_CLOCK_SPEED_STEP: f64 = 0.001;

/// Next external clock speed for a realtime source, from queue fill.
///
/// `min_queued` is the smallest packet count across open streams: any stream
/// running dry slows the clock, every stream well fed speeds it up.
pub fn external_clock_speed(speed: f64, min_queued: usize) -> f64 {
    if min_queued <= EXTERNAL_CLOCK_MIN_FRAMES {
        (speed - EXTERNAL_CLOCK_SPEED_STEP).max(EXTERNAL_CLOCK_SPEED_MIN)
    } else if min_queued > EXTERNAL_CLOCK_MAX_FRAMES {
        (speed + EXTERNAL_CLOCK_SPEED_STEP).min(EXTERNAL_CLOCK_SPEED_MAX)
    } else if speed != 1.0 {
        speed + EXTERNAL_CLOCK_SPEED_STEP * (1.0 - speed) / (1.0 - speed).abs()
    } else {
        speed
    }
}

/// Exponential moving average of audio drift against the master clock.
///
/// Produces a wanted sample count for the next audio block once enough
/// measurements have accumulated, clamped to ±10% of the natural count.
#[derive(Debug, Clone)]
pub struct AudioDriftCorrector {
    cum: f64,
    coef: f64,
    count: u32,
    /// Drift below this (seconds) is left alone.
    threshold: f64,
}

impl AudioDriftCorrector {
    /// `threshold` is the output hardware buffer expressed in seconds.
    pub fn new(threshold: f64) -> Self {
        Self {
            cum: 0.0,
            coef: (0.01f64.ln() / AUDIO_DIFF_AVG_NB as f64).exp(),
            count: 0,
            threshold,
        }
    }

    /// Forgets accumulated drift.
    pub fn reset(&mut self) {
        self.cum = 0.0;
        self.count = 0;
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Returns the number of samples to play for a block of `nb_samples`.
    ///
    /// `diff` is `audio_clock - master_clock`; `None` or a gap beyond
    /// [`AV_NOSYNC_THRESHOLD`] resets the average.
    pub fn wanted_samples(&mut self, nb_samples: usize, diff: Option<f64>, sample_rate: u32) -> usize {
        let Some(diff) = diff.filter(|d| d.is_finite() && d.abs() < AV_NOSYNC_THRESHOLD) else {
            self.reset();
            return nb_samples;
        };

        self.cum = diff + self.coef * self.cum;
        if self.count < AUDIO_DIFF_AVG_NB {
            self.count += 1;
            return nb_samples;
        }

        let avg = self.cum * (1.0 - self.coef);
        if avg.abs() < self.threshold {
            return nb_samples;
        }

        let wanted = nb_samples as f64 + diff * sample_rate as f64;
        let min = nb_samples * (100 - SAMPLE_CORRECTION_PERCENT_MAX) / 100;
        let max = nb_samples * (100 + SAMPLE_CORRECTION_PERCENT_MAX) / 100;
        let wanted = (wanted.round().max(0.0) as usize).clamp(min, max);
        tracing::trace!(diff, avg, wanted, nb_samples, "audio drift correction");
        wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(pts: Option<f64>, serial: u64) -> FrameTiming {
        FrameTiming {
            pts,
            duration: 0.04,
            serial,
            pos: None,
        }
    }

    #[test]
    fn test_frame_duration() {
        let max = MAX_FRAME_DURATION;
        assert!((frame_duration(&timing(Some(1.0), 1), &timing(Some(1.05), 1), max) - 0.05).abs() < 1e-9);
        // Backwards jump falls back to the nominal duration.
        assert_eq!(frame_duration(&timing(Some(2.0), 1), &timing(Some(1.0), 1), max), 0.04);
        // Gap above the ceiling.
        assert_eq!(
            frame_duration(&timing(Some(0.0), 1), &timing(Some(20.0), 1), MAX_FRAME_DURATION_DISCONTINUOUS),
            0.04
        );
        assert_eq!(frame_duration(&timing(None, 1), &timing(Some(1.0), 1), max), 0.04);
        assert_eq!(frame_duration(&timing(Some(0.0), 1), &timing(Some(0.04), 2), max), 0.0);
    }

    #[test]
    fn test_video_master_is_untouched() {
        for diff in [-5.0, -0.2, 0.0, 0.2, 5.0] {
            assert_eq!(compute_target_delay(0.04, SyncMaster::Video, Some(diff), 10.0), 0.04);
        }
    }

    #[test]
    fn test_target_delay_corrections() {
        // Behind the master: catch up.
        let d = compute_target_delay(0.2, SyncMaster::Audio, Some(-0.15), 10.0);
        assert!((d - 0.05).abs() < 1e-9);
        assert_eq!(compute_target_delay(0.04, SyncMaster::Audio, Some(-1.0), 10.0), 0.0);

        // Slightly ahead: duplicate.
        let d = compute_target_delay(0.04, SyncMaster::Audio, Some(0.05), 10.0);
        assert!((d - 0.08).abs() < 1e-9);

        // Long frame ahead: stretch by the gap.
        let d = compute_target_delay(0.2, SyncMaster::Audio, Some(0.15), 10.0);
        assert!((d - 0.35).abs() < 1e-9);

        // Inside the threshold, invalid, or beyond max frame duration: untouched.
        assert_eq!(compute_target_delay(0.04, SyncMaster::External, Some(0.01), 10.0), 0.04);
        assert_eq!(compute_target_delay(0.04, SyncMaster::Audio, None, 10.0), 0.04);
        assert_eq!(compute_target_delay(0.04, SyncMaster::Audio, Some(-20.0), 10.0), 0.04);
    }

    #[test]
    fn test_external_clock_speed() {
        assert!((external_clock_speed(1.0, 1) - 0.999).abs() < 1e-12);
        assert_eq!(external_clock_speed(0.9, 0), EXTERNAL_CLOCK_SPEED_MIN);
        assert!((external_clock_speed(1.0, 20) - 1.001).abs() < 1e-12);
        assert_eq!(external_clock_speed(1.01, 20), EXTERNAL_CLOCK_SPEED_MAX);
        assert!((external_clock_speed(0.95, 5) - 0.951).abs() < 1e-12);
        assert_eq!(external_clock_speed(1.0, 5), 1.0);
    }

    #[test]
    fn test_drift_corrector_waits_for_average() {
        let mut corrector = AudioDriftCorrector::new(0.02);
        for _ in 0..AUDIO_DIFF_AVG_NB {
            assert_eq!(corrector.wanted_samples(1000, Some(0.05), 48_000), 1000);
        }
        // Audio ahead of master: play more samples, clamped to +10%.
        assert_eq!(corrector.wanted_samples(1000, Some(0.05), 48_000), 1100);

        let mut behind = AudioDriftCorrector::new(0.02);
        for _ in 0..=AUDIO_DIFF_AVG_NB {
            behind.wanted_samples(1000, Some(-0.001), 48_000);
        }
        // Below threshold: untouched.
        assert_eq!(behind.wanted_samples(1000, Some(-0.001), 48_000), 1000);
    }

    #[test]
    fn test_drift_corrector_resets_on_invalid() {
        let mut corrector = AudioDriftCorrector::new(0.0);
        for _ in 0..AUDIO_DIFF_AVG_NB {
            corrector.wanted_samples(1000, Some(-0.05), 48_000);
        }
        assert_eq!(corrector.wanted_samples(1000, None, 48_000), 1000);
        // Average restarts.
        assert_eq!(corrector.wanted_samples(1000, Some(-0.05), 48_000), 1000);
    }
}
