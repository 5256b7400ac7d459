//! Audio conversion to the negotiated output format.
//!
//! The resampler converts decoded blocks to the output sample rate, channel
//! count and sample format, and can stretch or squeeze a block to a wanted
//! sample count. The stretch is how drift correction changes audio speed
//! without jumping the clock.
//!
//! Interpolation is linear, which is adequate for the small ratio changes
//! drift correction asks for.

use crate::codec::{AudioSamples, SampleFormat};
use crate::error::ResamplerError;
use crate::presentation::AudioSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceFormat {
    sample_rate: u32,
    channels: u16,
    channel_layout: u64,
    format: SampleFormat,
}

impl SourceFormat {
    fn of(samples: &AudioSamples) -> Self {
        Self {
            sample_rate: samples.sample_rate,
            channels: samples.channels,
            channel_layout: samples.channel_layout,
            format: samples.format,
        }
    }
}

/// Converts decoded audio to the output format.
#[derive(Debug, Clone)]
pub struct Resampler {
    target: AudioSpec,
    source: Option<SourceFormat>,
}

impl Resampler {
    pub fn new(target: AudioSpec) -> Self {
        Self {
            target,
            source: None,
        }
    }

    pub fn target(&self) -> &AudioSpec {
        &self.target
    }

    /// Converts `samples`, producing `wanted_nb_samples` input-rate samples'
    /// worth of output.
    ///
    /// Returns interleaved bytes in the target format.
    pub fn convert(
        &mut self,
        samples: &AudioSamples,
        wanted_nb_samples: usize,
    ) -> Result<Vec<u8>, ResamplerError> {
        let source = SourceFormat::of(samples);
        if source.sample_rate == 0 || source.channels == 0 {
            return Err(ResamplerError::Unsupported {
                from: format!("{}Hz/{}ch/{}", source.sample_rate, source.channels, source.format),
                to: format!(
                    "{}Hz/{}ch/{}",
                    self.target.sample_rate, self.target.channels, self.target.format
                ),
            });
        }
        let expected = samples.nb_samples * samples.frame_size();
        if samples.data.len() < expected {
            return Err(ResamplerError::MalformedInput(format!(
                "{} bytes for {} samples of {} bytes",
                samples.data.len(),
                samples.nb_samples,
                samples.frame_size()
            )));
        }

        if self.source != Some(source) {
            if self.source.is_some() {
                tracing::warn!(
                    "Audio source format changed to {}Hz/{}ch/{}, reinitialising resampler",
                    source.sample_rate,
                    source.channels,
                    source.format
                );
            }
            self.source = Some(source);
        }

        if self.is_passthrough(source) && wanted_nb_samples == samples.nb_samples {
            return Ok(samples.data[..expected].to_vec());
        }

        let input = decode_samples(samples);
        let mapped = map_channels(&input, source.channels as usize, self.target.channels as usize);

        let out_count = if samples.nb_samples == 0 {
            0
        } else {
            (wanted_nb_samples as u64 * self.target.sample_rate as u64)
                .div_ceil(source.sample_rate as u64) as usize
        };
        let stretched = interpolate(
            &mapped,
            self.target.channels as usize,
            samples.nb_samples,
            out_count,
        );
        Ok(encode_samples(&stretched, self.target.format))
    }

    fn is_passthrough(&self, source: SourceFormat) -> bool {
        source.sample_rate == self.target.sample_rate
            && source.channels == self.target.channels
            && source.format == self.target.format
    }
}

fn decode_samples(samples: &AudioSamples) -> Vec<f32> {
    let count = samples.nb_samples * samples.channels as usize;
    match samples.format {
        SampleFormat::S16 => samples.data[..count * 2]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect(),
        SampleFormat::F32 => samples.data[..count * 4]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}

fn encode_samples(samples: &[f32], format: SampleFormat) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * format.bytes_per_sample());
    match format {
        SampleFormat::S16 => {
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleFormat::F32 => {
            for &s in samples {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
    }
    out
}

/// Remaps interleaved frames from `from` to `to` channels.
///
/// Mono is duplicated on upmix; downmix to mono averages. Other layouts keep
/// the common leading channels and zero the rest.
fn map_channels(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to {
        return input.to_vec();
    }
    let frames = input.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in input.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else {
            for c in 0..to {
                out.push(frame.get(c).copied().unwrap_or(0.0));
            }
        }
    }
    out
}

/// Linearly resamples `in_count` interleaved frames to `out_count`.
fn interpolate(input: &[f32], channels: usize, in_count: usize, out_count: usize) -> Vec<f32> {
    if in_count == out_count || in_count == 0 {
        return input.to_vec();
    }
    let mut out = Vec::with_capacity(out_count * channels);
    let step = if out_count > 1 {
        (in_count - 1) as f64 / (out_count - 1) as f64
    } else {
        0.0
    };
    for i in 0..out_count {
        let pos = i as f64 * step;
        let base = pos.floor() as usize;
        let next = (base + 1).min(in_count - 1);
        let frac = (pos - base as f64) as f32;
        for c in 0..channels {
            let a = input[base * channels + c];
            let b = input[next * channels + c];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

/// Scales samples in place; `volume` is 0–100.
pub fn apply_volume(buf: &mut [u8], format: SampleFormat, volume: u8) {
    let volume = volume.min(100);
    if volume == 100 {
        return;
    }
    if volume == 0 {
        buf.fill(0);
        return;
    }
    let gain = volume as f32 / 100.0;
    match format {
        SampleFormat::S16 => {
            for b in buf.chunks_exact_mut(2) {
                let v = i16::from_le_bytes([b[0], b[1]]) as f32 * gain;
                b.copy_from_slice(&(v as i16).to_le_bytes());
            }
        }
        SampleFormat::F32 => {
            for b in buf.chunks_exact_mut(4) {
                let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]) * gain;
                b.copy_from_slice(&v.to_le_bytes());
            }
        }
    }
}
