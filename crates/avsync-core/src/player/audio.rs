//! Audio decode thread and the device callback side.

use std::sync::Arc;
use std::time::Duration;

use crate::codec::DecodedAudio;
use crate::decoder::{DecodeOutput, Decoder};
use crate::frame::AudioFrame;
use crate::options::SyncMaster;
use crate::presentation::AudioSpec;
use crate::resample::{apply_volume, Resampler};
use crate::sync::{AudioDriftCorrector, AV_NOSYNC_THRESHOLD};

use super::{AudioStream, Shared};

/// Size of a silence block when no samples are available.
const SILENCE_BYTES: usize = 512;

/// Output-side audio state, owned by the device callback.
#[derive(Debug)]
pub(crate) struct AudioOutput {
    spec: AudioSpec,
    resampler: Resampler,
    corrector: AudioDriftCorrector,
    buf: Vec<u8>,
    index: usize,
    /// Pts at the end of the last block taken from the ring.
    clock: Option<f64>,
    clock_serial: u64,
}

impl AudioOutput {
    pub fn new(spec: AudioSpec) -> Self {
        let threshold = spec.hw_buffer_size as f64 / spec.bytes_per_sec().max(1) as f64;
        Self {
            spec,
            resampler: Resampler::new(spec),
            corrector: AudioDriftCorrector::new(threshold),
            buf: Vec::new(),
            index: 0,
            clock: None,
            clock_serial: 0,
        }
    }

    fn silence(&self, len: usize) -> Vec<u8> {
        let frame_size = self.spec.frame_size().max(1);
        vec![0; (len / frame_size).max(1) * frame_size]
    }
}

pub(super) fn run_decoder(
    shared: Arc<Shared>,
    stream: Arc<AudioStream>,
    mut decoder: Decoder<DecodedAudio>,
) {
    tracing::debug!(index = stream.index(), "audio decoder started");
    loop {
        let decoded = match decoder.decode_next() {
            Ok(DecodeOutput::Frame(decoded)) => decoded,
            Ok(DecodeOutput::Finished) => continue,
            Err(e) if e.is_abort() => break,
            Err(e) => {
                shared.drop_failed_audio(&stream, &e);
                break;
            }
        };
        let frame = AudioFrame {
            samples: decoded.frame.samples,
            pts: decoded.pts,
            duration: decoded.duration,
            pos: decoded.pos,
            serial: decoded.serial,
        };
        match stream.frames().peek_writable() {
            Ok(slot) => slot.push(frame),
            Err(_) => break,
        }
    }
    tracing::debug!(index = stream.index(), "audio decoder exiting");
}

impl Shared {
    /// Fills `dest` with converted samples, or silence when none are ready.
    pub(crate) fn fill_audio_buffer(&self, dest: &mut [u8], volume: u8) {
        let callback_time = self.time.now();
        let mut guard = self.audio_out.lock();
        let Some(out) = guard.as_mut() else {
            dest.fill(0);
            return;
        };
        let stream = self.audio_stream();

        let mut written = 0;
        while written < dest.len() {
            if out.index >= out.buf.len() {
                out.buf = match self.next_audio_block(out, stream.as_deref()) {
                    Some(block) => block,
                    None => {
                        self.metrics.record_silence();
                        out.silence(SILENCE_BYTES)
                    }
                };
                out.index = 0;
            }
            let n = (dest.len() - written).min(out.buf.len() - out.index);
            dest[written..written + n].copy_from_slice(&out.buf[out.index..out.index + n]);
            written += n;
            out.index += n;
        }
        apply_volume(dest, out.spec.format, volume);

        // A paused clock is frozen at its pause point.
        if self.is_paused() {
            return;
        }
        // What the device holds plus what is still buffered here has not
        // been heard yet.
        if let (Some(stream), Some(clock)) = (stream, out.clock) {
            let unread = out.buf.len() - out.index;
            let pending = (2 * out.spec.hw_buffer_size + unread) as f64;
            let bps = out.spec.bytes_per_sec().max(1) as f64;
            stream
                .clock()
                .set_at(clock - pending / bps, out.clock_serial, callback_time);
            self.external_clock.sync_to(stream.clock(), AV_NOSYNC_THRESHOLD);
        }
    }

    /// Takes the next current-epoch block off the ring and converts it.
    fn next_audio_block(&self, out: &mut AudioOutput, stream: Option<&AudioStream>) -> Option<Vec<u8>> {
        let stream = stream?;
        if self.is_paused() {
            return None;
        }

        let half_buffer = out.spec.hw_buffer_size as f64 / out.spec.bytes_per_sec().max(1) as f64 / 2.0;
        let wait = Duration::from_secs_f64(half_buffer.clamp(0.001, 0.05));
        let frames = stream.frames();
        let frame = loop {
            let candidate = frames.wait_readable_for(wait)?;
            let current = candidate.serial == stream.packets().serial();
            let frame = current.then(|| (*candidate).clone());
            drop(candidate);
            frames.move_to_next();
            if let Some(frame) = frame {
                break frame;
            }
        };

        let samples = &frame.samples;
        let wanted = if self.master() == SyncMaster::Audio {
            samples.nb_samples
        } else {
            let diff = stream
                .clock()
                .get()
                .zip(self.master_clock())
                .map(|(a, m)| a - m);
            out.corrector
                .wanted_samples(samples.nb_samples, diff, samples.sample_rate)
        };

        let block = match out.resampler.convert(samples, wanted) {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!("audio conversion failed: {}", e);
                self.metrics.record_resampler_error();
                let out_samples = if samples.sample_rate > 0 {
                    samples.nb_samples as u64 * out.spec.sample_rate as u64
                        / samples.sample_rate as u64
                } else {
                    0
                };
                out.silence(out_samples as usize * out.spec.frame_size())
            }
        };

        out.clock = frame
            .pts
            .filter(|_| samples.sample_rate > 0)
            .map(|pts| pts + samples.nb_samples as f64 / samples.sample_rate as f64);
        out.clock_serial = frame.serial;
        self.metrics.record_audio_frame();
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{default_channel_layout, SampleFormat};

    #[test]
    fn test_output_threshold_and_silence() {
        let spec = AudioSpec {
            sample_rate: 48_000,
            channels: 2,
            channel_layout: default_channel_layout(2),
            format: SampleFormat::S16,
            hw_buffer_size: 4096,
        };
        let out = AudioOutput::new(spec);
        assert!((out.corrector.threshold() - 4096.0 / 192_000.0).abs() < 1e-12);
        assert_eq!(out.silence(SILENCE_BYTES).len(), 512);
        // Rounded to whole sample frames, never empty.
        assert_eq!(out.silence(6).len(), 4);
        assert_eq!(out.silence(0).len(), 4);
    }
}
