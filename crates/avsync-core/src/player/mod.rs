//! The playback orchestrator.
//!
//! [`Player`] owns the read thread, one decode thread per opened stream and
//! the state they share: transport flags, the seek request, the external
//! clock and the refresh timer. The presentation layer drives the remaining
//! two steps itself, from its own threads:
//!
//! - [`Player::refresh`] on a steady tick, followed by
//!   [`Player::try_get_video_frame`] to fetch the frame to display;
//! - [`Player::fill_audio_buffer`] from the audio-device callback.
//!
//! # Threads
//!
//! ```text
//!   read thread ──► PacketQueue (video) ──► video decode thread ──► FrameQueue ──► refresh()
//!               └─► PacketQueue (audio) ──► audio decode thread ──► FrameQueue ──► fill_audio_buffer()
//! ```
//!
//! Streams sit behind their own `RwLock` slot. Callers clone the `Arc` out
//! and release the lock before blocking; no thread is joined while a slot
//! lock is held.

mod audio;
mod read;
mod video;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::clock::{Clock, SharedTimeSource, SystemTime};
use crate::codec::{Chapter, Container, MediaBackend, MediaKind, StreamParams};
use crate::decoder::Decoder;
use crate::error::{CodecError, PlaybackError, Result, SourceError};
use crate::frame::{AudioFrame, VideoFrame};
use crate::frame_queue::{SAMPLE_QUEUE_SIZE, VIDEO_PICTURE_QUEUE_SIZE};
use crate::options::{PlayerOptions, SyncMaster};
use crate::packet_queue::PacketQueue;
use crate::presentation::{PresentationHandler, QuitStatus};
use crate::stats::{PlaybackMetrics, Statistics};
use crate::stream::Stream;
use crate::sync::{MAX_FRAME_DURATION, MAX_FRAME_DURATION_DISCONTINUOUS};

use self::audio::AudioOutput;

/// An opened video stream.
pub type VideoStream = Stream<VideoFrame>;
/// An opened audio stream.
pub type AudioStream = Stream<AudioFrame>;

/// Byte rate assumed for byte seeks when the source reports no bit rate.
const DEFAULT_BYTE_RATE: f64 = 180_000.0;
/// Relative seek used by chunk navigation when the source has no chapters.
const CHUNK_SEEK_MS: i64 = 60_000;

/// A pending seek. Positions are microseconds, or bytes in byte mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SeekRequest {
    pub target: i64,
    pub rel: i64,
    pub by_bytes: bool,
}

/// Facts about the source captured at open time.
#[derive(Debug, Clone)]
pub(crate) struct SourceInfo {
    pub streams: Vec<StreamParams>,
    pub chapters: Vec<Chapter>,
    pub bit_rate: Option<u64>,
    pub start_time: Option<f64>,
    pub realtime: bool,
    pub max_frame_duration: f64,
    pub seek_by_bytes: bool,
    pub infinite_buffer: bool,
}

#[derive(Debug, Default)]
pub(crate) struct RefreshState {
    /// Time (on the engine's time source) the current frame became due.
    pub frame_timer: f64,
}

/// State shared by the player handle and its threads.
pub(crate) struct Shared {
    pub options: PlayerOptions,
    pub backend: Arc<dyn MediaBackend>,
    pub handler: Arc<dyn PresentationHandler>,
    pub time: SharedTimeSource,
    pub source: SourceInfo,

    pub video: RwLock<Option<Arc<VideoStream>>>,
    pub audio: RwLock<Option<Arc<AudioStream>>>,
    /// Free-running clock; persists across stream switches.
    pub external_clock: Clock,

    pub abort: AtomicBool,
    pub paused: AtomicBool,
    pub step: AtomicBool,
    pub eof: AtomicBool,
    pub force_refresh: AtomicBool,
    pub display_pending: AtomicBool,
    pub queue_attachments: AtomicBool,
    quit_sent: AtomicBool,

    pub seek: Mutex<Option<SeekRequest>>,
    /// Target of the last seek request (-1 if none).
    pub last_seek_target: AtomicI64,
    /// Byte position of the last packet read (-1 if unknown).
    pub last_packet_pos: AtomicI64,

    /// Wakes the read thread out of its backpressure wait.
    pub wake_tx: Sender<()>,
    pub wake_rx: Receiver<()>,

    pub refresh: Mutex<RefreshState>,
    pub audio_out: Mutex<Option<AudioOutput>>,
    pub metrics: PlaybackMetrics,
}

impl Shared {
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    pub fn video_stream(&self) -> Option<Arc<VideoStream>> {
        self.video.read().clone().filter(|s| !s.is_failed())
    }

    pub fn audio_stream(&self) -> Option<Arc<AudioStream>> {
        self.audio.read().clone().filter(|s| !s.is_failed())
    }

    /// The effective sync master, given which streams are open.
    pub fn master(&self) -> SyncMaster {
        let has_video = self.video_stream().is_some();
        let has_audio = self.audio_stream().is_some();
        match self.options.sync_master {
            SyncMaster::Video if has_video => SyncMaster::Video,
            SyncMaster::Video | SyncMaster::Audio if has_audio => SyncMaster::Audio,
            _ => SyncMaster::External,
        }
    }

    /// Current value of the master clock.
    pub fn master_clock(&self) -> Option<f64> {
        match self.master() {
            SyncMaster::Video => self.video.read().as_ref().and_then(|s| s.clock().get()),
            SyncMaster::Audio => self.audio.read().as_ref().and_then(|s| s.clock().get()),
            SyncMaster::External => self.external_clock.get(),
        }
    }

    /// Reports the end of playback to the presentation layer, once.
    pub fn quit(&self, status: QuitStatus) {
        if self.quit_sent.swap(true, Ordering::AcqRel) {
            return;
        }
        match &status {
            QuitStatus::EndOfStream => tracing::info!("playback finished"),
            QuitStatus::Error { code, message } => {
                tracing::error!(code, "playback stopped: {}", message)
            }
        }
        self.handler.on_quit(status);
    }

    /// Queues a seek unless one is already pending.
    pub fn request_seek(&self, target: i64, rel: i64, by_bytes: bool) {
        let mut seek = self.seek.lock();
        if seek.is_some() {
            tracing::debug!(target, "seek already pending, ignoring request");
            return;
        }
        *seek = Some(SeekRequest {
            target,
            rel,
            by_bytes,
        });
        drop(seek);
        self.last_seek_target.store(target, Ordering::Release);
        tracing::debug!(target, rel, by_bytes, "seek requested");
        self.wake();
    }

    /// Relative seek by `incr` seconds.
    pub fn seek_relative(&self, incr: f64) {
        if self.source.seek_by_bytes {
            let mut pos = self
                .video_stream()
                .and_then(|v| v.frames().last_shown_pos(v.packets().serial()));
            if pos.is_none() {
                pos = self
                    .audio_stream()
                    .and_then(|a| a.frames().last_shown_pos(a.packets().serial()));
            }
            let pos = pos.unwrap_or_else(|| self.last_packet_pos.load(Ordering::Acquire).max(0));
            let byte_rate = match self.source.bit_rate {
                Some(bits) if bits > 0 => bits as f64 / 8.0,
                _ => DEFAULT_BYTE_RATE,
            };
            let incr_bytes = (incr * byte_rate) as i64;
            self.request_seek(pos + incr_bytes, incr_bytes, true);
        } else {
            let mut pos = self.master_clock().unwrap_or_else(|| {
                self.last_seek_target.load(Ordering::Acquire).max(0) as f64 / 1_000_000.0
            });
            pos += incr;
            if let Some(start) = self.source.start_time {
                if pos < start {
                    pos = start;
                }
            }
            self.request_seek(
                (pos * 1_000_000.0) as i64,
                (incr * 1_000_000.0) as i64,
                false,
            );
        }
    }

    /// Seeks to the chapter `incr` steps away from the current one.
    pub fn seek_chapter(&self, incr: i32) {
        let chapters = &self.source.chapters;
        if chapters.is_empty() {
            return;
        }
        let pos = self.master_clock().unwrap_or(0.0);
        let current = chapters
            .iter()
            .rposition(|c| c.start <= pos)
            .map_or(-1, |i| i as i64);
        let target = (current + incr as i64).max(0);
        let Some(chapter) = chapters.get(target as usize) else {
            return;
        };
        tracing::info!(chapter = target, title = %chapter.title, "seeking to chapter");
        self.request_seek((chapter.start * 1_000_000.0) as i64, 0, false);
    }

    /// Pauses or resumes every clock.
    ///
    /// On resume the frame timer is pushed forward by the time the video clock
    /// spent frozen, so the next refresh does not see an enormous delay.
    pub fn toggle_pause_locked(&self, refresh: &mut RefreshState) {
        let paused = self.is_paused();
        let now = self.time.now();
        let video = self.video_stream();
        let audio = self.audio_stream();

        if paused {
            if let Some(video) = &video {
                refresh.frame_timer += now - video.clock().last_updated();
            }
        }
        let paused = !paused;
        if let Some(video) = &video {
            video.clock().set_paused(paused);
        }
        if let Some(audio) = &audio {
            audio.clock().set_paused(paused);
        }
        self.external_clock.set_paused(paused);
        self.paused.store(paused, Ordering::Release);
        tracing::debug!(paused, frame_timer = refresh.frame_timer, "pause toggled");
    }

    pub fn toggle_pause(&self) {
        let mut refresh = self.refresh.lock();
        self.toggle_pause_locked(&mut refresh);
        self.step.store(false, Ordering::Release);
    }

    pub fn step_to_next_frame(&self) {
        if self.is_paused() {
            let mut refresh = self.refresh.lock();
            self.toggle_pause_locked(&mut refresh);
        }
        self.step.store(true, Ordering::Release);
    }

    pub fn open_stream(self: &Arc<Self>, params: &StreamParams) -> Result<()> {
        match params.kind {
            MediaKind::Video => self.open_video(params),
            MediaKind::Audio => self.open_audio(params),
        }
    }

    fn open_video(self: &Arc<Self>, params: &StreamParams) -> Result<()> {
        let codec = self
            .backend
            .open_video_codec(params)
            .map_err(|source| PlaybackError::Decode {
                kind: MediaKind::Video,
                source,
            })?;
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let fallback_duration = params
            .frame_rate
            .filter(|r| r.is_valid())
            .map_or(0.0, |r| 1.0 / r.as_f64());
        let decoder = Decoder::new(
            MediaKind::Video,
            codec,
            Arc::clone(&packets),
            params.time_base,
            fallback_duration,
        )
        .with_empty_queue_signal(self.wake_tx.clone());
        let stream = Arc::new(VideoStream::new(
            params.clone(),
            VIDEO_PICTURE_QUEUE_SIZE,
            true,
            decoder.status(),
            packets,
            Arc::clone(&self.time),
        ));

        let sar = if params.sample_aspect_ratio.is_valid() {
            params.sample_aspect_ratio.as_f64()
        } else {
            1.0
        };
        let aspect = if params.height > 0 {
            sar * params.width as f64 / params.height as f64
        } else {
            0.0
        };
        self.handler
            .on_window_size_needed(params.width, params.height, aspect);

        let shared = Arc::clone(self);
        let worker = Arc::clone(&stream);
        stream
            .spawn_decoder("avsync-video", move || video::run_decoder(shared, worker, decoder))
            .map_err(|e| spawn_error(MediaKind::Video, e))?;
        *self.video.write() = Some(stream);
        self.queue_attachments.store(true, Ordering::Release);
        tracing::info!(
            index = params.index,
            width = params.width,
            height = params.height,
            attached_pic = params.attached_pic,
            "video stream opened"
        );
        Ok(())
    }

    fn open_audio(self: &Arc<Self>, params: &StreamParams) -> Result<()> {
        let spec = self
            .handler
            .on_negotiate_audio_format(params.channels, params.sample_rate, params.channel_layout)
            .ok_or_else(|| PlaybackError::Decode {
                kind: MediaKind::Audio,
                source: CodecError::Open("audio output format refused".to_string()),
            })?;
        let codec = self
            .backend
            .open_audio_codec(params)
            .map_err(|source| PlaybackError::Decode {
                kind: MediaKind::Audio,
                source,
            })?;
        let packets = Arc::new(PacketQueue::new());
        packets.start();
        let decoder = Decoder::new(
            MediaKind::Audio,
            codec,
            Arc::clone(&packets),
            params.time_base,
            0.0,
        )
        .with_empty_queue_signal(self.wake_tx.clone());
        let stream = Arc::new(AudioStream::new(
            params.clone(),
            SAMPLE_QUEUE_SIZE,
            false,
            decoder.status(),
            packets,
            Arc::clone(&self.time),
        ));

        *self.audio_out.lock() = Some(AudioOutput::new(spec));

        let shared = Arc::clone(self);
        let worker = Arc::clone(&stream);
        stream
            .spawn_decoder("avsync-audio", move || audio::run_decoder(shared, worker, decoder))
            .map_err(|e| spawn_error(MediaKind::Audio, e))?;
        *self.audio.write() = Some(stream);
        tracing::info!(
            index = params.index,
            sample_rate = params.sample_rate,
            channels = params.channels,
            out_rate = spec.sample_rate,
            out_channels = spec.channels,
            out_format = %spec.format,
            "audio stream opened"
        );
        Ok(())
    }

    /// Closes the open stream of `kind`, joining its decode thread.
    pub fn close_stream(&self, kind: MediaKind) {
        match kind {
            MediaKind::Video => {
                let taken = self.video.write().take();
                if let Some(stream) = taken {
                    stream.close();
                    self.display_pending.store(false, Ordering::Release);
                    tracing::info!(index = stream.index(), "video stream closed");
                }
            }
            MediaKind::Audio => {
                let taken = self.audio.write().take();
                if let Some(stream) = taken {
                    stream.close();
                    *self.audio_out.lock() = None;
                    tracing::info!(index = stream.index(), "audio stream closed");
                }
            }
        }
    }

    /// Removes a stream whose decoder gave up, keeping the other one alive.
    pub fn drop_failed_video(&self, stream: &Arc<VideoStream>, error: &PlaybackError) {
        stream.fail();
        tracing::warn!("dropping video stream {}: {}", stream.index(), error);
        let mut slot = self.video.write();
        if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, stream)) {
            slot.take();
        }
    }

    pub fn drop_failed_audio(&self, stream: &Arc<AudioStream>, error: &PlaybackError) {
        stream.fail();
        tracing::warn!("dropping audio stream {}: {}", stream.index(), error);
        let mut slot = self.audio.write();
        if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, stream)) {
            slot.take();
        }
    }

    /// Switches to the next stream of `kind` after the current one.
    pub fn cycle_stream(self: &Arc<Self>, kind: MediaKind) -> Result<()> {
        let current = match kind {
            MediaKind::Video => self.video_stream().map(|s| s.index()),
            MediaKind::Audio => self.audio_stream().map(|s| s.index()),
        };
        let Some(start) = current else {
            return Ok(());
        };
        let streams = &self.source.streams;
        let Some(pos) = streams.iter().position(|p| p.index == start) else {
            return Ok(());
        };
        let usable = |p: &StreamParams| {
            p.kind == kind
                && (kind == MediaKind::Video || (p.sample_rate > 0 && p.channels > 0))
        };
        // Walk positions, not indices: a container may number its streams
        // sparsely.
        let Some(next) = (1..streams.len())
            .map(|k| &streams[(pos + k) % streams.len()])
            .find(|p| usable(p))
            .cloned()
        else {
            return Ok(());
        };

        tracing::info!(%kind, from = start, to = next.index, "switching stream");
        self.close_stream(kind);
        self.open_stream(&next)
    }
}

fn spawn_error(kind: MediaKind, e: std::io::Error) -> PlaybackError {
    PlaybackError::Decode {
        kind,
        source: CodecError::Open(format!("cannot start decode thread: {e}")),
    }
}

fn secs_to_ms(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

fn pick_stream(streams: &[StreamParams], kind: MediaKind, wanted: Option<usize>) -> Option<&StreamParams> {
    let usable = |p: &&StreamParams| {
        p.kind == kind && (kind == MediaKind::Video || (p.sample_rate > 0 && p.channels > 0))
    };
    wanted
        .and_then(|index| streams.iter().filter(usable).find(|p| p.index == index))
        .or_else(|| streams.iter().find(usable))
}

/// A playback session for one source.
pub struct Player {
    shared: Arc<Shared>,
    container: Mutex<Option<Box<dyn Container>>>,
    read_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Opens `uri` and its streams. Playback starts with [`Player::exec`].
    pub fn open_source(
        uri: &str,
        options: PlayerOptions,
        backend: Arc<dyn MediaBackend>,
        handler: Arc<dyn PresentationHandler>,
    ) -> Result<Self> {
        Self::open_source_with_time(uri, options, backend, handler, SystemTime::shared())
    }

    /// Like [`Player::open_source`] with an explicit time source.
    pub fn open_source_with_time(
        uri: &str,
        options: PlayerOptions,
        backend: Arc<dyn MediaBackend>,
        handler: Arc<dyn PresentationHandler>,
        time: SharedTimeSource,
    ) -> Result<Self> {
        let mut container = backend.open_container(uri)?;
        let discontinuous = container.has_discontinuous_timestamps();
        let source = SourceInfo {
            streams: container.streams().to_vec(),
            chapters: container.chapters().to_vec(),
            bit_rate: container.bit_rate(),
            start_time: container.start_time(),
            realtime: container.is_realtime(),
            max_frame_duration: if discontinuous {
                MAX_FRAME_DURATION_DISCONTINUOUS
            } else {
                MAX_FRAME_DURATION
            },
            seek_by_bytes: options.seek_by_bytes.unwrap_or(discontinuous),
            infinite_buffer: options.infinite_buffer.unwrap_or(container.is_realtime()),
        };
        tracing::info!(
            uri,
            streams = source.streams.len(),
            chapters = source.chapters.len(),
            realtime = source.realtime,
            "source opened"
        );

        if let Some(start) = options.start_time {
            let mut target = start;
            if let Some(source_start) = source.start_time {
                target += source_start;
            }
            let target = (target * 1_000_000.0) as i64;
            let range = crate::codec::SeekRange {
                target,
                min: i64::MIN,
                max: target,
                by_bytes: false,
            };
            if let Err(e) = container.seek(range) {
                tracing::warn!("could not seek to start position {start}: {e}");
            }
        }

        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::new(Shared {
            external_clock: Clock::new(Arc::clone(&time)),
            options,
            backend,
            handler,
            time,
            source,
            video: RwLock::new(None),
            audio: RwLock::new(None),
            abort: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            step: AtomicBool::new(false),
            eof: AtomicBool::new(false),
            force_refresh: AtomicBool::new(false),
            display_pending: AtomicBool::new(false),
            queue_attachments: AtomicBool::new(false),
            quit_sent: AtomicBool::new(false),
            seek: Mutex::new(None),
            last_seek_target: AtomicI64::new(-1),
            last_packet_pos: AtomicI64::new(-1),
            wake_tx,
            wake_rx,
            refresh: Mutex::new(RefreshState::default()),
            audio_out: Mutex::new(None),
            metrics: PlaybackMetrics::new(),
        });

        let player = Self {
            shared,
            container: Mutex::new(Some(container)),
            read_thread: Mutex::new(None),
        };

        let streams = &player.shared.source.streams;
        let options = &player.shared.options;
        if !options.disable_audio {
            if let Some(params) = pick_stream(streams, MediaKind::Audio, options.wanted_audio_stream) {
                if let Err(e) = player.shared.open_stream(params) {
                    tracing::warn!("could not open audio stream {}: {}", params.index, e);
                }
            }
        }
        if !options.disable_video {
            if let Some(params) = pick_stream(streams, MediaKind::Video, options.wanted_video_stream) {
                if let Err(e) = player.shared.open_stream(params) {
                    tracing::warn!("could not open video stream {}: {}", params.index, e);
                }
            }
        }

        if player.shared.video_stream().is_none() && player.shared.audio_stream().is_none() {
            player.close();
            return Err(SourceError::NoStreams.into());
        }
        tracing::debug!(master = ?player.shared.master(), "sync master selected");
        Ok(player)
    }

    /// Starts the read thread. Calling it again has no effect.
    pub fn exec(&self) -> Result<()> {
        let Some(container) = self.container.lock().take() else {
            return Ok(());
        };
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("avsync-read".to_string())
            .spawn(move || read::run(shared, container))
            .map_err(|e| SourceError::Read(format!("cannot start read thread: {e}")))?;
        *self.read_thread.lock() = Some(handle);
        Ok(())
    }

    /// Requests shutdown of every thread without waiting for them.
    pub fn abort(&self) {
        self.shared.abort.store(true, Ordering::Release);
        if let Some(video) = self.shared.video.read().as_ref() {
            video.abort();
        }
        if let Some(audio) = self.shared.audio.read().as_ref() {
            audio.abort();
        }
        self.shared.wake();
    }

    /// Stops playback and joins every thread.
    pub fn close(&self) {
        self.abort();
        let handle = self.read_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("read thread panicked");
            }
        }
        self.shared.close_stream(MediaKind::Audio);
        self.shared.close_stream(MediaKind::Video);
        self.container.lock().take();
    }

    pub fn toggle_pause(&self) {
        self.shared.toggle_pause();
    }

    /// Shows the next frame and pauses again.
    pub fn step_to_next_frame(&self) {
        self.shared.step_to_next_frame();
    }

    /// Seeks by `delta_ms` relative to the current position.
    pub fn seek(&self, delta_ms: i64) {
        self.shared.seek_relative(delta_ms as f64 / 1000.0);
    }

    /// Seeks to the next (`1`) or previous (`-1`) chapter.
    pub fn seek_to_chapter(&self, incr: i32) {
        self.shared.seek_chapter(incr);
    }

    /// Next chapter, or a minute forward when the source has no chapters.
    pub fn seek_next_chunk(&self) {
        if self.shared.source.chapters.len() > 1 {
            self.seek_to_chapter(1);
        } else {
            self.seek(CHUNK_SEEK_MS);
        }
    }

    /// Previous chapter, or a minute back when the source has no chapters.
    pub fn seek_prev_chunk(&self) {
        if self.shared.source.chapters.len() > 1 {
            self.seek_to_chapter(-1);
        } else {
            self.seek(-CHUNK_SEEK_MS);
        }
    }

    /// Switches to the next stream of `kind`.
    pub fn cycle_stream(&self, kind: MediaKind) -> Result<()> {
        self.shared.cycle_stream(kind)
    }

    /// Runs one refresh step and returns seconds until the next one is due.
    pub fn refresh(&self) -> f64 {
        self.shared.refresh()
    }

    /// Returns the frame to display if the last refresh advanced one.
    pub fn try_get_video_frame(&self) -> Option<VideoFrame> {
        self.shared.take_display_frame()
    }

    /// Fills `dest` with output audio; `volume` is 0–100.
    pub fn fill_audio_buffer(&self, dest: &mut [u8], volume: u8) {
        self.shared.fill_audio_buffer(dest, volume);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    pub fn is_eof(&self) -> bool {
        self.shared.eof.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    /// True when every stream that should be playing is open.
    pub fn is_stream_ready(&self) -> bool {
        let shared = &self.shared;
        let has_kind = |kind| shared.source.streams.iter().any(|p| p.kind == kind);
        let audio_ready = shared.audio_stream().is_some()
            || shared.options.disable_audio
            || !has_kind(MediaKind::Audio);
        let video_ready = shared.video_stream().is_some()
            || shared.options.disable_video
            || !has_kind(MediaKind::Video);
        audio_ready && video_ready && !shared.is_aborted()
    }

    /// The effective sync master.
    pub fn sync_master(&self) -> SyncMaster {
        self.shared.master()
    }

    /// Current value of the master clock, in seconds.
    pub fn master_clock(&self) -> Option<f64> {
        self.shared.master_clock()
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.shared.source.chapters
    }

    pub fn metrics(&self) -> &PlaybackMetrics {
        &self.shared.metrics
    }

    pub fn statistics(&self) -> Statistics {
        let shared = &self.shared;
        let video = shared.video_stream();
        let audio = shared.audio_stream();
        let metrics = &shared.metrics;

        let audio_clock = audio.as_ref().and_then(|a| a.clock().get());
        let video_clock = video.as_ref().and_then(|v| v.clock().get());
        let master_clock = shared.master_clock();
        let av_diff = match (&audio, &video) {
            (Some(_), Some(_)) => audio_clock.zip(video_clock).map(|(a, v)| a - v),
            (None, Some(_)) => master_clock.zip(video_clock).map(|(m, v)| m - v),
            (Some(_), None) => master_clock.zip(audio_clock).map(|(m, a)| m - a),
            (None, None) => None,
        };

        Statistics {
            frame_drops_early: metrics.frame_drops_early(),
            frame_drops_late: metrics.frame_drops_late(),
            frames_displayed: metrics.frames_displayed(),
            audio_frames_played: metrics.audio_frames_played(),
            silence_buffers: metrics.silence_buffers(),
            master: shared.master(),
            master_clock_ms: master_clock.map(secs_to_ms),
            audio_clock_ms: audio_clock.map(secs_to_ms),
            video_clock_ms: video_clock.map(secs_to_ms),
            av_diff_ms: av_diff.map(secs_to_ms),
            max_drift_ms: metrics.max_drift_ms(),
            has_audio: audio.is_some(),
            has_video: video.is_some(),
            audio_queue_bytes: audio.as_ref().map_or(0, |a| a.packets().size()),
            video_queue_bytes: video.as_ref().map_or(0, |v| v.packets().size()),
            audio_frames_queued: audio.as_ref().map_or(0, |a| a.frames().nb_remaining()),
            video_frames_queued: video.as_ref().map_or(0, |v| v.frames().nb_remaining()),
            audio_bandwidth: audio.as_ref().map_or(0.0, |a| a.bandwidth()),
            video_bandwidth: video.as_ref().map_or(0.0, |v| v.bandwidth()),
            frame_rate: video
                .as_ref()
                .and_then(|v| v.params().frame_rate)
                .filter(|r| r.is_valid())
                .map(|r| r.as_f64()),
            video_serial: video.as_ref().map(|v| v.packets().serial()),
            frame_timer: shared.refresh.lock().frame_timer,
            eof: self.is_eof(),
            paused: self.is_paused(),
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}
