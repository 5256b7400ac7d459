//! Media primitives and the collaborator interfaces the engine consumes.
//!
//! The engine never parses containers or decodes bitstreams itself. A host
//! supplies a [`MediaBackend`] that opens a [`Container`] for a URI and a
//! [`CodecEngine`] per elementary stream; everything downstream of that is
//! timing and buffering.

use std::fmt;

use bytes::Bytes;

use crate::error::{CodecError, SourceError};

/// Kind of elementary stream handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// A rational number, used for time bases, frame rates and aspect ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Returns the value as a float, or 0 when the denominator is zero.
    pub fn as_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Returns true if both terms are non-zero.
    pub fn is_valid(self) -> bool {
        self.num != 0 && self.den != 0
    }

    /// Converts a tick count in this time base to seconds.
    pub fn ticks_to_secs(self, ticks: i64) -> f64 {
        ticks as f64 * self.as_f64()
    }

    /// Converts seconds to a tick count in this time base.
    pub fn secs_to_ticks(self, secs: f64) -> i64 {
        let unit = self.as_f64();
        if unit == 0.0 {
            0
        } else {
            (secs / unit).round() as i64
        }
    }
}

/// Parameters of one elementary stream in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamParams {
    /// Index of the stream inside the container; packets carry it.
    pub index: usize,
    pub kind: MediaKind,
    pub time_base: Rational,
    pub codec_name: String,
    pub bit_rate: u64,
    /// Start time in stream ticks, if known.
    pub start_time: Option<i64>,

    // Video
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<Rational>,
    pub sample_aspect_ratio: Rational,
    /// Cover art carried as a single packet.
    pub attached_pic: bool,

    // Audio
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: u64,
}

impl StreamParams {
    /// Creates video stream parameters with the common fields filled in.
    pub fn video(index: usize, time_base: Rational, width: u32, height: u32, frame_rate: Rational) -> Self {
        Self {
            index,
            kind: MediaKind::Video,
            time_base,
            codec_name: String::new(),
            bit_rate: 0,
            start_time: None,
            width,
            height,
            frame_rate: Some(frame_rate),
            sample_aspect_ratio: Rational::new(1, 1),
            attached_pic: false,
            sample_rate: 0,
            channels: 0,
            channel_layout: 0,
        }
    }

    /// Creates audio stream parameters with the common fields filled in.
    pub fn audio(index: usize, time_base: Rational, sample_rate: u32, channels: u16) -> Self {
        Self {
            index,
            kind: MediaKind::Audio,
            time_base,
            codec_name: String::new(),
            bit_rate: 0,
            start_time: None,
            width: 0,
            height: 0,
            frame_rate: None,
            sample_aspect_ratio: Rational::new(0, 1),
            attached_pic: false,
            sample_rate,
            channels,
            channel_layout: default_channel_layout(channels),
        }
    }
}

/// Default channel mask for a channel count (front left/right/center order).
pub fn default_channel_layout(channels: u16) -> u64 {
    match channels {
        0 => 0,
        1 => 0x4,
        2 => 0x3,
        n if n >= 64 => u64::MAX,
        n => (1u64 << n) - 1,
    }
}

/// A chapter of the source, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub start: f64,
    pub end: f64,
    pub title: String,
}

/// A compressed packet of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream_index: usize,
    /// Presentation timestamp in stream ticks.
    pub pts: Option<i64>,
    /// Decode timestamp in stream ticks.
    pub dts: Option<i64>,
    /// Duration in stream ticks (0 if unknown).
    pub duration: i64,
    /// Byte position in the source.
    pub pos: Option<i64>,
    pub key: bool,
    pub data: Bytes,
}

impl Packet {
    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Pixel layout of a decoded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420p,
    Rgba,
}

/// One plane of a picture.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub data: Bytes,
    pub stride: usize,
}

/// A decoded picture.
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Plane>,
}

/// Sample encoding of interleaved PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    S16,
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::F32 => 4,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::S16 => f.write_str("s16"),
            SampleFormat::F32 => f.write_str("f32"),
        }
    }
}

/// Interleaved PCM samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: u64,
    pub format: SampleFormat,
    /// Samples per channel.
    pub nb_samples: usize,
    pub data: Bytes,
}

impl AudioSamples {
    /// Bytes of one sample across all channels.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

/// Output of a video codec. Timestamps are in the stream's time base.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPicture {
    pub picture: Picture,
    pub pts: Option<i64>,
    /// Duration in stream ticks (0 if unknown).
    pub duration: i64,
    pub pos: Option<i64>,
    pub sample_aspect_ratio: Rational,
}

/// Output of an audio codec. Timestamps are in the stream's time base.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: AudioSamples,
    pub pts: Option<i64>,
    pub pos: Option<i64>,
}

/// Timing accessors the decoder needs from codec output.
pub trait CodecFrame: Send + 'static {
    /// Presentation timestamp in stream ticks.
    fn pts(&self) -> Option<i64>;

    /// Byte position of the packet that produced this frame.
    fn pos(&self) -> Option<i64>;

    /// Duration in seconds, when the frame itself knows it.
    fn duration(&self, time_base: Rational) -> Option<f64>;
}

impl CodecFrame for DecodedPicture {
    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn pos(&self) -> Option<i64> {
        self.pos
    }

    fn duration(&self, time_base: Rational) -> Option<f64> {
        (self.duration > 0).then(|| time_base.ticks_to_secs(self.duration))
    }
}

impl CodecFrame for DecodedAudio {
    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn pos(&self) -> Option<i64> {
        self.pos
    }

    fn duration(&self, _time_base: Rational) -> Option<f64> {
        (self.samples.sample_rate > 0)
            .then(|| self.samples.nb_samples as f64 / self.samples.sample_rate as f64)
    }
}

/// A synchronous decoder for one stream.
///
/// Called from a dedicated decode thread; may return zero, one or several
/// frames per packet. Dropping the engine closes it.
pub trait CodecEngine<F>: Send {
    /// Feeds one packet and returns the frames it completed.
    fn decode(&mut self, packet: &Packet) -> Result<Vec<F>, CodecError>;

    /// Returns the frames still buffered after end of stream.
    fn drain(&mut self) -> Result<Vec<F>, CodecError>;

    /// Discards all internal state (on seek).
    fn flush(&mut self);
}

/// Result of reading from a container.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Packet(Packet),
    EndOfFile,
}

/// A seek request handed to a container.
///
/// In time mode positions are microseconds; in byte mode they are offsets.
/// The container may land anywhere within `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRange {
    pub target: i64,
    pub min: i64,
    pub max: i64,
    pub by_bytes: bool,
}

/// A demuxer opened on one source.
pub trait Container: Send {
    /// Parameters of every stream in the source.
    fn streams(&self) -> &[StreamParams];

    /// Chapters, sorted by start time.
    fn chapters(&self) -> &[Chapter] {
        &[]
    }

    /// Overall bit rate in bits per second, if known.
    fn bit_rate(&self) -> Option<u64> {
        None
    }

    /// Start time of the source in seconds.
    fn start_time(&self) -> Option<f64> {
        None
    }

    /// Duration of the source in seconds.
    fn duration(&self) -> Option<f64> {
        None
    }

    /// Live sources (no backpressure by default).
    fn is_realtime(&self) -> bool {
        false
    }

    /// Sources whose timestamps may jump (transport streams and the like).
    fn has_discontinuous_timestamps(&self) -> bool {
        false
    }

    /// The cover-art packet of an attached-picture stream.
    fn attached_picture(&self, _stream_index: usize) -> Option<Packet> {
        None
    }

    /// Reads the next packet.
    fn read_packet(&mut self) -> Result<ReadOutcome, SourceError>;

    /// Repositions the source.
    fn seek(&mut self, range: SeekRange) -> Result<(), SourceError>;

    /// Pauses or resumes network I/O. Local sources ignore it.
    fn set_paused(&mut self, _paused: bool) {}
}

/// Factory for containers and codecs.
pub trait MediaBackend: Send + Sync {
    fn open_container(&self, uri: &str) -> Result<Box<dyn Container>, SourceError>;

    fn open_video_codec(
        &self,
        params: &StreamParams,
    ) -> Result<Box<dyn CodecEngine<DecodedPicture>>, CodecError>;

    fn open_audio_codec(
        &self,
        params: &StreamParams,
    ) -> Result<Box<dyn CodecEngine<DecodedAudio>>, CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_conversions() {
        let tb = Rational::new(1, 90_000);
        assert!((tb.ticks_to_secs(45_000) - 0.5).abs() < 1e-9);
        assert_eq!(tb.secs_to_ticks(2.0), 180_000);
        assert_eq!(Rational::new(1, 0).as_f64(), 0.0);
        assert!(!Rational::new(0, 1).is_valid());
    }

    #[test]
    fn test_codec_frame_durations() {
        let audio = DecodedAudio {
            samples: AudioSamples {
                sample_rate: 48_000,
                channels: 2,
                channel_layout: default_channel_layout(2),
                format: SampleFormat::S16,
                nb_samples: 1024,
                data: Bytes::from(vec![0u8; 4096]),
            },
            pts: Some(0),
            pos: None,
        };
        let d = audio.duration(Rational::new(1, 48_000)).unwrap();
        assert!((d - 1024.0 / 48_000.0).abs() < 1e-12);
        assert_eq!(audio.samples.frame_size(), 4);

        let picture = DecodedPicture {
            picture: Picture {
                width: 2,
                height: 2,
                format: PixelFormat::Rgba,
                planes: Vec::new(),
            },
            pts: Some(3),
            duration: 0,
            pos: Some(10),
            sample_aspect_ratio: Rational::new(1, 1),
        };
        assert!(picture.duration(Rational::new(1, 25)).is_none());
    }

    #[test]
    fn test_media_kind_display() {
        assert_eq!(MediaKind::Audio.to_string(), "audio");
        assert_eq!(MediaKind::Video.to_string(), "video");
        assert_eq!(default_channel_layout(2), 0x3);
    }
}
