//! A deterministic in-memory media backend.
//!
//! Generates interleaved audio and video packets for a configured duration,
//! and decodes them into gray pictures and an S16 tone. Used to drive the
//! engine without a real demuxer or codec, in the demo and in tests.
//!
//! URIs must start with `synthetic:`; the rest is ignored.
//!
//! A video decode stall can be configured: packets fed to the video codec
//! while the shared time source is inside the stall window produce no
//! frames, and come out together with the first frame decoded after it.
//! With `stall_recovery` set, the container then holds video packets back
//! for that long, so the released backlog reaches the frame ring while the
//! video packet queue is empty.

use std::f64::consts::TAU;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::clock::SharedTimeSource;
use crate::codec::{
    AudioSamples, Chapter, CodecEngine, Container, DecodedAudio, DecodedPicture, MediaBackend,
    Packet, Picture, PixelFormat, Plane, ReadOutcome, Rational, SampleFormat, SeekRange,
    StreamParams,
};
use crate::error::{CodecError, SourceError};

/// URI scheme accepted by [`SyntheticBackend`].
pub const URI_PREFIX: &str = "synthetic:";

/// Shape of the generated source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Length of the source in seconds.
    pub duration: f64,
    pub video: Option<SyntheticVideo>,
    pub audio: Option<SyntheticAudio>,
    /// Splits the source into chapters of this length.
    pub chapter_length: Option<f64>,
    /// Adds a cover-art stream carrying one picture.
    pub cover_art: bool,
    pub realtime: bool,
    pub discontinuous_timestamps: bool,
    /// Payload size of every packet in bytes.
    pub packet_size: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            duration: 10.0,
            video: Some(SyntheticVideo::default()),
            audio: Some(SyntheticAudio::default()),
            chapter_length: None,
            cover_art: false,
            realtime: false,
            discontinuous_timestamps: false,
            packet_size: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyntheticVideo {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Start of the decode stall, in seconds on the time source.
    pub stall_start: Option<f64>,
    /// Length of the decode stall in seconds.
    pub stall_length: f64,
    /// Seconds the container withholds video after the decoder releases
    /// the frames it held during the stall.
    pub stall_recovery: f64,
    /// Every n-th packet carries no timestamp.
    pub missing_pts_every: Option<u64>,
}

impl Default for SyntheticVideo {
    fn default() -> Self {
        Self {
            width: 64,
            height: 36,
            fps: 25,
            stall_start: None,
            stall_length: 0.0,
            stall_recovery: 0.0,
            missing_pts_every: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyntheticAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples_per_packet: u32,
    /// Shifts audio timestamps relative to video, in seconds.
    pub pts_offset: f64,
    pub tone_hz: f64,
}

impl Default for SyntheticAudio {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            samples_per_packet: 1024,
            pts_offset: 0.0,
            tone_hz: 440.0,
        }
    }
}

/// Decode stall window, shared by a backend's container and video codec.
#[derive(Debug)]
struct StallWindow {
    start: f64,
    end: f64,
    recovery: f64,
    time: SharedTimeSource,
    /// When the codec handed back its held frames.
    released_at: Mutex<Option<f64>>,
}

impl StallWindow {
    fn from_config(config: &SyntheticConfig, time: SharedTimeSource) -> Option<Arc<Self>> {
        let video = config.video.as_ref()?;
        let start = video.stall_start?;
        Some(Arc::new(Self {
            start,
            end: start + video.stall_length.max(0.0),
            recovery: video.stall_recovery.max(0.0),
            time,
            released_at: Mutex::new(None),
        }))
    }

    fn contains(&self, now: f64) -> bool {
        now >= self.start && now < self.end
    }

    fn mark_released(&self, now: f64) {
        let mut released = self.released_at.lock();
        if released.is_none() {
            *released = Some(now);
        }
    }
}

#[derive(Debug, Clone)]
struct Layout {
    streams: Vec<StreamParams>,
    video_index: Option<usize>,
    audio_index: Option<usize>,
    cover_index: Option<usize>,
    chapters: Vec<Chapter>,
    video_frames: u64,
    audio_packets: u64,
    packets_per_sec: f64,
}

impl Layout {
    fn new(config: &SyntheticConfig) -> Self {
        let mut streams = Vec::new();
        let mut packets_per_sec = 0.0;

        let video_index = config.video.as_ref().map(|v| {
            let index = streams.len();
            let mut params = StreamParams::video(
                index,
                Rational::new(1, v.fps.max(1) as i32),
                v.width,
                v.height,
                Rational::new(v.fps.max(1) as i32, 1),
            );
            params.codec_name = "synthetic-gray".to_string();
            streams.push(params);
            packets_per_sec += v.fps.max(1) as f64;
            index
        });
        let audio_index = config.audio.as_ref().map(|a| {
            let index = streams.len();
            let mut params = StreamParams::audio(
                index,
                Rational::new(1, a.sample_rate.max(1) as i32),
                a.sample_rate,
                a.channels,
            );
            params.codec_name = "synthetic-tone".to_string();
            streams.push(params);
            packets_per_sec += a.sample_rate as f64 / a.samples_per_packet.max(1) as f64;
            index
        });
        let cover_index = config.cover_art.then(|| {
            let index = streams.len();
            let mut params = StreamParams::video(index, Rational::new(1, 90_000), 32, 32, Rational::new(0, 1));
            params.frame_rate = None;
            params.attached_pic = true;
            params.codec_name = "synthetic-cover".to_string();
            streams.push(params);
            index
        });

        let bytes_per_sec = packets_per_sec * config.packet_size as f64;
        for params in &mut streams {
            params.bit_rate = (bytes_per_sec * 8.0) as u64;
        }

        let chapters = match config.chapter_length {
            Some(length) if length > 0.0 => {
                let count = (config.duration / length).ceil() as usize;
                (0..count)
                    .map(|i| Chapter {
                        start: i as f64 * length,
                        end: ((i + 1) as f64 * length).min(config.duration),
                        title: format!("Chapter {}", i + 1),
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        let video_frames = config
            .video
            .as_ref()
            .map_or(0, |v| (config.duration * v.fps as f64).ceil() as u64);
        let audio_packets = config.audio.as_ref().map_or(0, |a| {
            (config.duration * a.sample_rate as f64 / a.samples_per_packet.max(1) as f64).ceil() as u64
        });

        Self {
            streams,
            video_index,
            audio_index,
            cover_index,
            chapters,
            video_frames,
            audio_packets,
            packets_per_sec,
        }
    }
}

/// Container over a generated source.
#[derive(Debug)]
pub struct SyntheticContainer {
    config: SyntheticConfig,
    layout: Layout,
    next_video: u64,
    next_audio: u64,
    stall: Option<Arc<StallWindow>>,
    /// A video packet went out after the stall to wake the decoder.
    wake_sent: bool,
}

impl SyntheticContainer {
    pub fn new(config: SyntheticConfig) -> Self {
        let layout = Layout::new(&config);
        Self {
            config,
            layout,
            next_video: 0,
            next_audio: 0,
            stall: None,
            wake_sent: false,
        }
    }

    fn with_stall(config: SyntheticConfig, stall: Option<Arc<StallWindow>>) -> Self {
        Self {
            stall,
            ..Self::new(config)
        }
    }

    /// Whether video is held back while the decoder recovers from a stall.
    /// One packet still goes out after the window to wake the decoder.
    fn video_held_back(&mut self) -> bool {
        let Some(stall) = &self.stall else {
            return false;
        };
        let now = stall.time.now();
        if now < stall.end {
            return false;
        }
        let released = *stall.released_at.lock();
        if released.is_none() && !self.wake_sent {
            self.wake_sent = true;
            return false;
        }
        now < released.unwrap_or(stall.end) + stall.recovery
    }

    fn video_time(&self, n: u64) -> Option<f64> {
        let video = self.config.video.as_ref()?;
        (n < self.layout.video_frames).then(|| n as f64 / video.fps.max(1) as f64)
    }

    fn audio_time(&self, n: u64) -> Option<f64> {
        let audio = self.config.audio.as_ref()?;
        (n < self.layout.audio_packets)
            .then(|| n as f64 * audio.samples_per_packet as f64 / audio.sample_rate.max(1) as f64)
    }

    fn payload(&self, seed: u64) -> Bytes {
        Bytes::from(vec![(seed % 251) as u8; self.config.packet_size.max(1)])
    }

    fn position(&self) -> i64 {
        ((self.next_video + self.next_audio) * self.config.packet_size as u64) as i64
    }

    fn video_packet(&mut self, index: usize) -> Packet {
        let n = self.next_video;
        let missing = self
            .config
            .video
            .as_ref()
            .and_then(|v| v.missing_pts_every)
            .is_some_and(|every| every > 0 && n % every == every - 1);
        let packet = Packet {
            stream_index: index,
            pts: (!missing).then_some(n as i64),
            dts: Some(n as i64),
            duration: 1,
            pos: Some(self.position()),
            key: true,
            data: self.payload(n),
        };
        self.next_video += 1;
        packet
    }

    fn audio_packet(&mut self, index: usize) -> Packet {
        let n = self.next_audio;
        let (samples, offset) = self.config.audio.as_ref().map_or((0, 0), |a| {
            let offset = (a.pts_offset * a.sample_rate as f64).round() as i64;
            (a.samples_per_packet as i64, offset)
        });
        let pts = n as i64 * samples + offset;
        let packet = Packet {
            stream_index: index,
            pts: Some(pts),
            dts: Some(pts),
            duration: samples,
            pos: Some(self.position()),
            key: true,
            data: self.payload(n),
        };
        self.next_audio += 1;
        packet
    }

    /// Positions both streams at the last unit starting at or before `secs`.
    fn seek_to_time(&mut self, secs: f64) {
        let secs = secs.clamp(0.0, self.config.duration);
        if let Some(video) = &self.config.video {
            self.next_video = (secs * video.fps as f64).floor() as u64;
        }
        if let Some(audio) = &self.config.audio {
            self.next_audio =
                (secs * audio.sample_rate as f64 / audio.samples_per_packet.max(1) as f64).floor() as u64;
        }
    }
}

impl Container for SyntheticContainer {
    fn streams(&self) -> &[StreamParams] {
        &self.layout.streams
    }

    fn chapters(&self) -> &[Chapter] {
        &self.layout.chapters
    }

    fn bit_rate(&self) -> Option<u64> {
        let bits = self.layout.packets_per_sec * self.config.packet_size as f64 * 8.0;
        (bits > 0.0).then_some(bits as u64)
    }

    fn start_time(&self) -> Option<f64> {
        Some(0.0)
    }

    fn duration(&self) -> Option<f64> {
        Some(self.config.duration)
    }

    fn is_realtime(&self) -> bool {
        self.config.realtime
    }

    fn has_discontinuous_timestamps(&self) -> bool {
        self.config.discontinuous_timestamps
    }

    fn attached_picture(&self, stream_index: usize) -> Option<Packet> {
        (self.layout.cover_index == Some(stream_index)).then(|| Packet {
            stream_index,
            pts: Some(0),
            dts: Some(0),
            duration: 0,
            pos: None,
            key: true,
            data: self.payload(0),
        })
    }

    fn read_packet(&mut self) -> Result<ReadOutcome, SourceError> {
        let video = self.video_time(self.next_video).zip(self.layout.video_index);
        let audio = self.audio_time(self.next_audio).zip(self.layout.audio_index);
        let packet = match (video, audio) {
            (Some((vt, vi)), Some((at, ai))) => {
                if vt <= at && !self.video_held_back() {
                    self.video_packet(vi)
                } else {
                    self.audio_packet(ai)
                }
            }
            (Some((_, vi)), None) => self.video_packet(vi),
            (None, Some((_, ai))) => self.audio_packet(ai),
            (None, None) => return Ok(ReadOutcome::EndOfFile),
        };
        Ok(ReadOutcome::Packet(packet))
    }

    fn seek(&mut self, range: SeekRange) -> Result<(), SourceError> {
        if range.min > range.max {
            return Err(SourceError::Seek(format!(
                "empty range [{}, {}]",
                range.min, range.max
            )));
        }
        let secs = if range.by_bytes {
            let bytes_per_sec = self.layout.packets_per_sec * self.config.packet_size as f64;
            if bytes_per_sec <= 0.0 {
                return Err(SourceError::Seek("source has no data".to_string()));
            }
            range.target.max(0) as f64 / bytes_per_sec
        } else {
            range.target as f64 / 1_000_000.0
        };
        self.seek_to_time(secs);
        tracing::debug!(secs, video = self.next_video, audio = self.next_audio, "synthetic seek");
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) {
        tracing::debug!(paused, "synthetic source pause state");
    }
}

/// Video codec producing gray pictures.
pub struct SyntheticVideoCodec {
    width: u32,
    height: u32,
    stall: Option<Arc<StallWindow>>,
    held: Vec<DecodedPicture>,
}

impl SyntheticVideoCodec {
    /// Reports whether decoding is stalled, and marks the stall as released
    /// on the first call after the window.
    fn stalled(&self) -> bool {
        let Some(stall) = &self.stall else {
            return false;
        };
        let now = stall.time.now();
        if stall.contains(now) {
            return true;
        }
        if now >= stall.end {
            stall.mark_released(now);
        }
        false
    }

    fn picture(&self, shade: u8) -> Picture {
        let (w, h) = (self.width as usize, self.height as usize);
        let chroma = (w / 2) * (h / 2);
        Picture {
            width: self.width,
            height: self.height,
            format: PixelFormat::Yuv420p,
            planes: vec![
                Plane {
                    data: Bytes::from(vec![shade; w * h]),
                    stride: w,
                },
                Plane {
                    data: Bytes::from(vec![128; chroma]),
                    stride: w / 2,
                },
                Plane {
                    data: Bytes::from(vec![128; chroma]),
                    stride: w / 2,
                },
            ],
        }
    }
}

impl CodecEngine<DecodedPicture> for SyntheticVideoCodec {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedPicture>, CodecError> {
        let Some(&shade) = packet.data.first() else {
            return Err(CodecError::Decode("empty video packet".to_string()));
        };
        let frame = DecodedPicture {
            picture: self.picture(shade),
            pts: packet.pts,
            duration: packet.duration,
            pos: packet.pos,
            sample_aspect_ratio: Rational::new(1, 1),
        };
        if self.stalled() {
            if self.held.is_empty() {
                tracing::debug!("synthetic video decoder stalling");
            }
            self.held.push(frame);
            return Ok(Vec::new());
        }
        let mut frames = std::mem::take(&mut self.held);
        frames.push(frame);
        Ok(frames)
    }

    fn drain(&mut self) -> Result<Vec<DecodedPicture>, CodecError> {
        Ok(std::mem::take(&mut self.held))
    }

    fn flush(&mut self) {
        self.held.clear();
    }
}

/// Audio codec producing an S16 sine tone.
pub struct SyntheticAudioCodec {
    sample_rate: u32,
    channels: u16,
    channel_layout: u64,
    tone_hz: f64,
}

impl CodecEngine<DecodedAudio> for SyntheticAudioCodec {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedAudio>, CodecError> {
        if packet.data.is_empty() || packet.duration <= 0 {
            return Err(CodecError::Decode("empty audio packet".to_string()));
        }
        let nb_samples = packet.duration as usize;
        let first = packet.pts.unwrap_or(0);
        let channels = self.channels as usize;
        let mut data = Vec::with_capacity(nb_samples * channels * 2);
        for i in 0..nb_samples {
            let t = (first + i as i64) as f64 / self.sample_rate as f64;
            let value = ((TAU * self.tone_hz * t).sin() * 0.2 * i16::MAX as f64) as i16;
            for _ in 0..channels {
                data.extend_from_slice(&value.to_le_bytes());
            }
        }
        Ok(vec![DecodedAudio {
            samples: AudioSamples {
                sample_rate: self.sample_rate,
                channels: self.channels,
                channel_layout: self.channel_layout,
                format: SampleFormat::S16,
                nb_samples,
                data: Bytes::from(data),
            },
            pts: packet.pts,
            pos: packet.pos,
        }])
    }

    fn drain(&mut self) -> Result<Vec<DecodedAudio>, CodecError> {
        Ok(Vec::new())
    }

    fn flush(&mut self) {}
}

/// Backend serving [`SyntheticContainer`]s.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    config: SyntheticConfig,
    stall: Option<Arc<StallWindow>>,
}

impl SyntheticBackend {
    /// `time` is the clock the stall window is measured on.
    pub fn new(config: SyntheticConfig, time: SharedTimeSource) -> Self {
        let stall = StallWindow::from_config(&config, time);
        Self { config, stall }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

impl MediaBackend for SyntheticBackend {
    fn open_container(&self, uri: &str) -> Result<Box<dyn Container>, SourceError> {
        if !uri.starts_with(URI_PREFIX) {
            return Err(SourceError::Open {
                uri: uri.to_string(),
                reason: format!("expected a {URI_PREFIX} uri"),
            });
        }
        if self.config.duration <= 0.0 || (self.config.video.is_none() && self.config.audio.is_none()) {
            return Err(SourceError::Open {
                uri: uri.to_string(),
                reason: "empty source".to_string(),
            });
        }
        Ok(Box::new(SyntheticContainer::with_stall(
            self.config.clone(),
            self.stall.clone(),
        )))
    }

    fn open_video_codec(
        &self,
        params: &StreamParams,
    ) -> Result<Box<dyn CodecEngine<DecodedPicture>>, CodecError> {
        if params.width == 0 || params.height == 0 {
            return Err(CodecError::Open(format!(
                "invalid picture size {}x{}",
                params.width, params.height
            )));
        }
        let stall = if params.attached_pic {
            None
        } else {
            self.stall.clone()
        };
        Ok(Box::new(SyntheticVideoCodec {
            width: params.width,
            height: params.height,
            stall,
            held: Vec::new(),
        }))
    }

    fn open_audio_codec(
        &self,
        params: &StreamParams,
    ) -> Result<Box<dyn CodecEngine<DecodedAudio>>, CodecError> {
        if params.sample_rate == 0 || params.channels == 0 {
            return Err(CodecError::Open("audio stream without format".to_string()));
        }
        let tone_hz = self.config.audio.as_ref().map_or(440.0, |a| a.tone_hz);
        Ok(Box::new(SyntheticAudioCodec {
            sample_rate: params.sample_rate,
            channels: params.channels,
            channel_layout: params.channel_layout,
            tone_hz,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualTime;

    fn read_all(container: &mut dyn Container) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(ReadOutcome::Packet(packet)) = container.read_packet() {
            packets.push(packet);
        }
        packets
    }

    #[test]
    fn test_packets_interleave_by_time() {
        let config = SyntheticConfig {
            duration: 1.0,
            ..Default::default()
        };
        let mut container = SyntheticContainer::new(config);
        let packets = read_all(&mut container);
        // 25 video frames plus ceil(48000 / 1024) audio packets.
        assert_eq!(packets.len(), 25 + 47);

        let streams = container.streams().to_vec();
        let mut last = f64::MIN;
        for packet in &packets {
            let tb = streams[packet.stream_index].time_base;
            let t = tb.ticks_to_secs(packet.pts.unwrap());
            assert!(t >= last, "packet at {t} after {last}");
            last = t;
        }
        assert_eq!(container.read_packet().unwrap(), ReadOutcome::EndOfFile);
    }

    #[test]
    fn test_seek_lands_at_or_before_target() {
        let mut container = SyntheticContainer::new(SyntheticConfig::default());
        container
            .seek(SeekRange {
                target: 2_030_000,
                min: i64::MIN,
                max: i64::MAX,
                by_bytes: false,
            })
            .unwrap();
        let packet = read_all(&mut container).into_iter().find(|p| p.stream_index == 0).unwrap();
        assert_eq!(packet.pts, Some(50));

        let err = container.seek(SeekRange {
            target: 0,
            min: 10,
            max: 5,
            by_bytes: false,
        });
        assert!(matches!(err, Err(SourceError::Seek(_))));
    }

    #[test]
    fn test_missing_pts_and_chapters() {
        let config = SyntheticConfig {
            duration: 2.5,
            audio: None,
            chapter_length: Some(1.0),
            video: Some(SyntheticVideo {
                missing_pts_every: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut container = SyntheticContainer::new(config);
        assert_eq!(container.chapters().len(), 3);
        assert_eq!(container.chapters()[2].end, 2.5);
        let packets = read_all(&mut container);
        assert_eq!(packets[3].pts, None);
        assert_eq!(packets[4].pts, Some(4));
    }

    #[test]
    fn test_video_stall_holds_frames() {
        let time = ManualTime::shared(0.0);
        let config = SyntheticConfig {
            video: Some(SyntheticVideo {
                stall_start: Some(1.0),
                stall_length: 2.0,
                ..Default::default()
            }),
            ..Default::default()
        };
        let backend = SyntheticBackend::new(config, time.clone());
        let mut container = backend.open_container("synthetic:stall").unwrap();
        let params = container.streams()[0].clone();
        let mut codec = backend.open_video_codec(&params).unwrap();

        let mut next_video = || loop {
            if let Ok(ReadOutcome::Packet(p)) = container.read_packet() {
                if p.stream_index == 0 {
                    return p;
                }
            }
        };
        assert_eq!(codec.decode(&next_video()).unwrap().len(), 1);
        time.advance(Duration::from_millis(1500));
        assert!(codec.decode(&next_video()).unwrap().is_empty());
        assert!(codec.decode(&next_video()).unwrap().is_empty());
        time.advance(Duration::from_secs(2));
        let burst = codec.decode(&next_video()).unwrap();
        assert_eq!(burst.len(), 3);
        assert_eq!(burst[0].pts, Some(1));
        assert_eq!(burst[0].picture.planes.len(), 3);
    }

    #[test]
    fn test_stall_recovery_withholds_video() {
        let time = ManualTime::shared(0.0);
        let config = SyntheticConfig {
            video: Some(SyntheticVideo {
                stall_start: Some(1.0),
                stall_length: 2.0,
                stall_recovery: 0.5,
                ..Default::default()
            }),
            ..Default::default()
        };
        let backend = SyntheticBackend::new(config, time.clone());
        let mut container = backend.open_container("synthetic:recovery").unwrap();
        let params = container.streams()[0].clone();
        let mut codec = backend.open_video_codec(&params).unwrap();
        let mut read = || match container.read_packet().unwrap() {
            ReadOutcome::Packet(p) => p,
            ReadOutcome::EndOfFile => panic!("source ended early"),
        };

        time.advance(Duration::from_millis(1500));
        let first = loop {
            let p = read();
            if p.stream_index == 0 {
                break p;
            }
        };
        assert!(codec.decode(&first).unwrap().is_empty());

        // After the window a single video packet goes out to wake the decoder.
        time.advance(Duration::from_millis(1700));
        let wake = loop {
            let p = read();
            if p.stream_index == 0 {
                break p;
            }
        };
        assert!((0..20).all(|_| read().stream_index == 1));
        let burst = codec.decode(&wake).unwrap();
        assert!(burst.len() > 1);
        assert_eq!(burst[0].pts, first.pts);
        assert!((0..20).all(|_| read().stream_index == 1));

        time.advance(Duration::from_millis(600));
        assert_eq!(read().stream_index, 0);
    }

    #[test]
    fn test_audio_codec_output() {
        let backend = SyntheticBackend::new(SyntheticConfig::default(), ManualTime::shared(0.0));
        let mut container = backend.open_container("synthetic:tone").unwrap();
        let params = container.streams()[1].clone();
        let mut codec = backend.open_audio_codec(&params).unwrap();
        let packet = loop {
            if let Ok(ReadOutcome::Packet(p)) = container.read_packet() {
                if p.stream_index == 1 {
                    break p;
                }
            }
        };
        let frames = codec.decode(&packet).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples.nb_samples, 1024);
        assert_eq!(frames[0].samples.data.len(), 1024 * 2 * 2);
    }

    #[test]
    fn test_backend_rejects_foreign_uri() {
        let backend = SyntheticBackend::new(SyntheticConfig::default(), ManualTime::shared(0.0));
        let err = backend.open_container("file:///movie.mkv").err().unwrap();
        assert_eq!(err.code(), -2);
        let cover = SyntheticContainer::new(SyntheticConfig {
            cover_art: true,
            ..Default::default()
        });
        assert!(cover.streams()[2].attached_pic);
        assert!(cover.attached_picture(2).is_some());
        assert!(cover.attached_picture(0).is_none());
        let _: Arc<dyn MediaBackend> = Arc::new(backend);
    }
}
