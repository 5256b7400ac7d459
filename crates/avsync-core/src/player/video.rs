//! Video decode thread and the display refresh step.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::codec::DecodedPicture;
use crate::decoder::{DecodeOutput, DecodedFrame, Decoder};
use crate::error::PlaybackError;
use crate::frame::VideoFrame;
use crate::options::SyncMaster;
use crate::sync::{
    compute_target_delay, external_clock_speed, frame_duration, AV_NOSYNC_THRESHOLD,
    AV_SYNC_THRESHOLD_MAX,
};

use super::{RefreshState, Shared, VideoStream};

pub(super) fn run_decoder(
    shared: Arc<Shared>,
    stream: Arc<VideoStream>,
    mut decoder: Decoder<DecodedPicture>,
) {
    tracing::debug!(index = stream.index(), "video decoder started");
    loop {
        let decoded = match decoder.decode_next() {
            Ok(DecodeOutput::Frame(decoded)) => decoded,
            Ok(DecodeOutput::Finished) => continue,
            Err(e) if e.is_abort() => break,
            Err(e) => {
                shared.drop_failed_video(&stream, &e);
                break;
            }
        };

        if should_drop_early(&shared, &stream, &decoded) {
            shared.metrics.record_early_drop();
            tracing::trace!(pts = ?decoded.pts, "dropping late frame before queueing");
            continue;
        }

        let mut frame = VideoFrame {
            picture: decoded.frame.picture,
            pts: decoded.pts,
            duration: decoded.duration,
            pos: decoded.pos,
            serial: decoded.serial,
            sample_aspect_ratio: decoded.frame.sample_aspect_ratio,
            allocated: false,
        };
        if !shared.handler.on_allocate_video_buffer(&frame) {
            tracing::warn!("{}", PlaybackError::AllocationTimeout);
            stream.abort();
            break;
        }
        frame.allocated = true;

        match stream.frames().peek_writable() {
            Ok(slot) => slot.push(frame),
            Err(_) => break,
        }
    }
    tracing::debug!(index = stream.index(), "video decoder exiting");
}

/// A frame already behind the master clock is dropped before it reaches
/// the ring, as long as more packets are waiting to replace it.
fn should_drop_early(
    shared: &Shared,
    stream: &VideoStream,
    decoded: &DecodedFrame<DecodedPicture>,
) -> bool {
    let master = shared.master();
    if master == SyncMaster::Video || !shared.options.frame_drop.allows(master) {
        return false;
    }
    let Some(pts) = decoded.pts else {
        return false;
    };
    let Some(master) = shared.master_clock() else {
        return false;
    };
    let diff = pts - master;
    !diff.is_nan()
        && diff.abs() < AV_NOSYNC_THRESHOLD
        && diff < 0.0
        && decoded.serial == stream.clock().serial()
        && stream.packets().nb_packets() > 0
}

impl Shared {
    /// Advances the video ring according to the clocks.
    ///
    /// Returns the time in seconds until the next call is useful.
    pub(crate) fn refresh(&self) -> f64 {
        let mut remaining = self.options.refresh_rate;
        let mut state = self.refresh.lock();

        if !self.is_paused() && self.master() == SyncMaster::External && self.source.realtime {
            self.adjust_external_clock_speed();
        }

        if let Some(video) = self.video_stream() {
            self.advance_video(&video, &mut state, &mut remaining);

            if self.force_refresh.load(Ordering::Acquire) && video.frames().rindex_shown() {
                self.display_pending.store(true, Ordering::Release);
                self.metrics.record_display();
                if let (Some(v), Some(m)) = (video.clock().get(), self.master_clock()) {
                    self.metrics.record_drift(v - m);
                }
            }
        }
        self.force_refresh.store(false, Ordering::Release);
        remaining
    }

    fn advance_video(&self, video: &VideoStream, state: &mut RefreshState, remaining: &mut f64) {
        let frames = video.frames();
        loop {
            if frames.nb_remaining() == 0 {
                return;
            }
            let (Some(last), Some(current)) = (frames.peek_last_timing(), frames.peek_timing())
            else {
                return;
            };

            if current.serial != video.packets().serial() {
                frames.move_to_next();
                continue;
            }

            let now = self.time.now();
            if last.serial != current.serial {
                state.frame_timer = now;
            }
            if self.is_paused() {
                return;
            }

            let max_frame_duration = self.source.max_frame_duration;
            let last_duration = frame_duration(&last, &current, max_frame_duration);
            let diff = video
                .clock()
                .get()
                .zip(self.master_clock())
                .map(|(v, m)| v - m);
            let delay = compute_target_delay(last_duration, self.master(), diff, max_frame_duration);

            if now < state.frame_timer + delay {
                *remaining = (state.frame_timer + delay - now).min(*remaining);
                return;
            }

            state.frame_timer += delay;
            if delay > 0.0 && now - state.frame_timer > AV_SYNC_THRESHOLD_MAX {
                state.frame_timer = now;
            }

            if let Some(pts) = current.pts {
                video.clock().set(pts, current.serial);
                self.external_clock.sync_to(video.clock(), AV_NOSYNC_THRESHOLD);
            }

            if frames.nb_remaining() > 1 {
                if let Some(next) = frames.peek_next_timing() {
                    let duration = frame_duration(&current, &next, max_frame_duration);
                    if !self.step.load(Ordering::Acquire)
                        && self.options.frame_drop.allows(self.master())
                        && now > state.frame_timer + duration
                    {
                        self.metrics.record_late_drop();
                        tracing::trace!(pts = ?current.pts, "dropping late frame");
                        frames.move_to_next();
                        continue;
                    }
                }
            }

            frames.move_to_next();
            self.force_refresh.store(true, Ordering::Release);

            if self.step.load(Ordering::Acquire) && !self.is_paused() {
                self.toggle_pause_locked(state);
            }
            return;
        }
    }

    /// Keeps a realtime source's buffers from draining or overflowing.
    fn adjust_external_clock_speed(&self) {
        let queued = [
            self.video_stream().map(|v| v.packets().nb_packets()),
            self.audio_stream().map(|a| a.packets().nb_packets()),
        ];
        let Some(min_queued) = queued.into_iter().flatten().min() else {
            return;
        };
        let speed = external_clock_speed(self.external_clock.speed(), min_queued);
        self.external_clock.set_speed(speed);
    }

    /// Returns the frame on screen if the last refresh advanced one.
    pub(crate) fn take_display_frame(&self) -> Option<VideoFrame> {
        if !self.display_pending.swap(false, Ordering::AcqRel) {
            return None;
        }
        let video = self.video_stream()?;
        let frame = video.frames().peek_last().map(|frame| (*frame).clone());
        frame
    }
}
