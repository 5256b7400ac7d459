//! A/V synchronization integration tests.
//!
//! These tests run the full player (read thread, decode threads, refresh
//! step and audio callback) against the synthetic backend. Time is a
//! `ManualTime` advanced in 10 ms steps; each step runs one refresh and one
//! audio callback worth 10 ms of output, then yields briefly so the worker
//! threads can keep their queues filled.
//!
//! ```bash
//! RUST_LOG=avsync_core=debug cargo test --package avsync-core --test av_sync_test -- --nocapture
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use avsync_core::codec::{CodecEngine, Container, DecodedAudio, DecodedPicture, MediaBackend, Packet, StreamParams};
use avsync_core::synthetic::{SyntheticAudio, SyntheticVideo};
use avsync_core::{
    AudioSpec, CodecError, ManualTime, Player, PlayerOptions, PresentationHandler, QuitStatus,
    SampleFormat, SourceError, Statistics, SyncMaster, SyntheticBackend, SyntheticConfig,
    VideoFrame,
};
use parking_lot::Mutex;

const STEP: Duration = Duration::from_millis(10);
/// 10 ms of 48 kHz stereo S16.
const HW_BUFFER: usize = 1920;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct Handler {
    quits: Mutex<Vec<QuitStatus>>,
}

impl PresentationHandler for Handler {
    fn on_negotiate_audio_format(
        &self,
        channels: u16,
        sample_rate: u32,
        channel_layout: u64,
    ) -> Option<AudioSpec> {
        Some(AudioSpec {
            sample_rate,
            channels,
            channel_layout,
            format: SampleFormat::S16,
            hw_buffer_size: HW_BUFFER,
        })
    }

    fn on_quit(&self, status: QuitStatus) {
        self.quits.lock().push(status);
    }
}

struct Harness {
    player: Player,
    time: Arc<ManualTime>,
    handler: Arc<Handler>,
    shown: Vec<VideoFrame>,
    audio: Vec<u8>,
}

impl Harness {
    fn open(backend: Arc<dyn MediaBackend>, time: Arc<ManualTime>, options: PlayerOptions) -> Self {
        init_tracing();
        let handler = Arc::new(Handler::default());
        let player = Player::open_source_with_time(
            "synthetic:test",
            options,
            backend,
            handler.clone(),
            time.clone(),
        )
        .unwrap();
        player.exec().unwrap();
        // Let the pipeline prime its queues.
        thread::sleep(Duration::from_millis(100));
        Self {
            player,
            time,
            handler,
            shown: Vec::new(),
            audio: vec![0; HW_BUFFER],
        }
    }

    fn synthetic(config: SyntheticConfig, options: PlayerOptions) -> Self {
        let time = ManualTime::shared(0.0);
        let backend = Arc::new(SyntheticBackend::new(config, time.clone()));
        Self::open(backend, time, options)
    }

    fn step(&mut self) {
        self.time.advance(STEP);
        self.player.refresh();
        if let Some(frame) = self.player.try_get_video_frame() {
            self.shown.push(frame);
        }
        self.player.fill_audio_buffer(&mut self.audio, 100);
        thread::sleep(Duration::from_millis(2));
    }

    fn run_for(&mut self, secs: f64) {
        let steps = (secs / STEP.as_secs_f64()).round() as usize;
        for _ in 0..steps {
            self.step();
        }
    }

    fn stats(&self) -> Statistics {
        self.player.statistics()
    }
}

#[test]
fn test_video_converges_to_delayed_audio() {
    let config = SyntheticConfig {
        duration: 10.0,
        audio: Some(SyntheticAudio {
            pts_offset: 0.2,
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut harness = Harness::synthetic(config, PlayerOptions::default());
    harness.run_for(2.0);

    let stats = harness.stats();
    assert_eq!(stats.master, SyncMaster::Audio);
    assert!(stats.has_audio && stats.has_video);
    assert_eq!(stats.master_clock_ms, stats.audio_clock_ms);
    let diff = stats.av_diff_ms.expect("both clocks running");
    assert!(diff.abs() < 100, "video still {diff} ms off audio: {stats}");
    assert!(stats.frames_displayed > 0);
    assert!(!harness.player.is_aborted());
}

#[derive(Debug, Clone, PartialEq)]
enum CodecEvent {
    Flush,
    Packet(Option<i64>),
}

struct RecordingCodec {
    inner: Box<dyn CodecEngine<DecodedPicture>>,
    log: Arc<Mutex<Vec<CodecEvent>>>,
}

impl CodecEngine<DecodedPicture> for RecordingCodec {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<DecodedPicture>, CodecError> {
        self.log.lock().push(CodecEvent::Packet(packet.pts));
        self.inner.decode(packet)
    }

    fn drain(&mut self) -> Result<Vec<DecodedPicture>, CodecError> {
        self.inner.drain()
    }

    fn flush(&mut self) {
        self.log.lock().push(CodecEvent::Flush);
        self.inner.flush();
    }
}

/// Synthetic backend that records what the video codec sees.
struct RecordingBackend {
    inner: SyntheticBackend,
    log: Arc<Mutex<Vec<CodecEvent>>>,
}

impl MediaBackend for RecordingBackend {
    fn open_container(&self, uri: &str) -> Result<Box<dyn Container>, SourceError> {
        self.inner.open_container(uri)
    }

    fn open_video_codec(
        &self,
        params: &StreamParams,
    ) -> Result<Box<dyn CodecEngine<DecodedPicture>>, CodecError> {
        Ok(Box::new(RecordingCodec {
            inner: self.inner.open_video_codec(params)?,
            log: self.log.clone(),
        }))
    }

    fn open_audio_codec(
        &self,
        params: &StreamParams,
    ) -> Result<Box<dyn CodecEngine<DecodedAudio>>, CodecError> {
        self.inner.open_audio_codec(params)
    }
}

#[test]
fn test_seek_flushes_and_skips_stale_frames() {
    let time = ManualTime::shared(0.0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let config = SyntheticConfig {
        duration: 120.0,
        ..Default::default()
    };
    let backend = Arc::new(RecordingBackend {
        inner: SyntheticBackend::new(config, time.clone()),
        log: log.clone(),
    });
    let mut harness = Harness::open(backend, time, PlayerOptions::default());
    harness.run_for(1.0);
    assert_eq!(harness.stats().video_serial, Some(1));

    harness.player.seek(60_000);
    harness.run_for(1.0);

    let stats = harness.stats();
    assert_eq!(stats.video_serial, Some(2));
    assert!(!harness.player.is_eof());
    assert!(stats.master_clock_ms.unwrap() > 60_000);

    // 60 s at 25 fps.
    let boundary = 1500;
    let events = log.lock().clone();
    let flush = events
        .iter()
        .rposition(|e| *e == CodecEvent::Flush)
        .expect("seek flush reached the codec");
    assert!(flush > 0);
    for event in &events[..flush] {
        if let CodecEvent::Packet(Some(pts)) = event {
            assert!(*pts < boundary, "post-seek packet {pts} before flush");
        }
    }
    let after: Vec<_> = events[flush + 1..].to_vec();
    assert!(!after.is_empty());
    for event in &after {
        match event {
            CodecEvent::Packet(Some(pts)) => assert!(*pts >= boundary, "stale packet {pts} after flush"),
            other => panic!("unexpected event after flush: {other:?}"),
        }
    }

    let first_new = harness
        .shown
        .iter()
        .position(|f| f.serial == 2)
        .expect("frames shown after seek");
    assert!(harness.shown[..first_new].iter().all(|f| f.serial == 1));
    for frame in &harness.shown[first_new..] {
        assert_eq!(frame.serial, 2);
        assert!(frame.pts.unwrap() >= 60.0);
    }
}

#[test]
fn test_video_stall_does_not_block_audio() {
    let config = SyntheticConfig {
        duration: 30.0,
        video: Some(SyntheticVideo {
            stall_start: Some(1.0),
            stall_length: 5.0,
            stall_recovery: 1.0,
            ..Default::default()
        }),
        ..Default::default()
    };
    let options = PlayerOptions {
        max_queue_size: 32 * 1024,
        ..Default::default()
    };
    let mut harness = Harness::synthetic(config, options);
    harness.run_for(1.5);
    let before = harness.stats();

    harness.run_for(4.0);
    let during = harness.stats();
    let played = during.audio_frames_played - before.audio_frames_played;
    // Four seconds is about 187 blocks of 1024 samples.
    assert!(played > 150, "only {played} audio blocks played during stall");
    assert!(during.silence_buffers - before.silence_buffers < 50);
    let shown_in_stall = harness
        .shown
        .iter()
        .filter(|f| f.pts.is_some_and(|pts| pts > 1.6 && pts < 5.4))
        .count();
    assert_eq!(shown_in_stall, 0);

    harness.run_for(2.5);
    let after = harness.stats();
    // The backlog reaches the ring with no video packets queued, so the
    // refresh path has to catch up by dropping late frames.
    assert!(after.frame_drops_late > 0, "stalled frames were not dropped late: {after}");
    assert!(harness.shown.iter().any(|f| f.pts.is_some_and(|pts| pts > 6.0)));
    assert!(after.audio_frames_played > during.audio_frames_played);
    assert!(!harness.player.is_aborted());
}

#[test]
fn test_resume_does_not_produce_huge_delay() {
    let mut harness = Harness::synthetic(SyntheticConfig::default(), PlayerOptions::default());
    harness.run_for(1.0);
    let before = harness.stats();

    harness.player.toggle_pause();
    assert!(harness.player.is_paused());
    harness.run_for(3.0);
    let paused = harness.stats();
    assert!(paused.paused);
    assert_eq!(paused.frames_displayed, before.frames_displayed);

    harness.player.toggle_pause();
    let resumed = harness.stats();
    assert!(
        (resumed.frame_timer - before.frame_timer - 3.0).abs() < 1e-6,
        "frame timer {} not shifted by the pause from {}",
        resumed.frame_timer,
        before.frame_timer
    );

    let remaining = harness.player.refresh();
    assert!(remaining > 0.0 && remaining <= 0.01 + 1e-9);
    harness.run_for(0.5);
    let after = harness.stats();
    assert!(after.frames_displayed > before.frames_displayed);
    assert_eq!(after.frame_drops_late, before.frame_drops_late);
}

#[test]
fn test_auto_exit_reports_end_of_stream() {
    let config = SyntheticConfig {
        duration: 1.0,
        ..Default::default()
    };
    let options = PlayerOptions {
        auto_exit: true,
        ..Default::default()
    };
    let mut harness = Harness::synthetic(config, options);
    for _ in 0..400 {
        if !harness.handler.quits.lock().is_empty() {
            break;
        }
        harness.step();
    }
    assert!(harness.player.is_eof());
    assert_eq!(*harness.handler.quits.lock(), vec![QuitStatus::EndOfStream]);
}

#[test]
fn test_cover_art_is_shown_once() {
    let config = SyntheticConfig {
        duration: 2.0,
        video: None,
        cover_art: true,
        ..Default::default()
    };
    let mut harness = Harness::synthetic(config, PlayerOptions::default());
    harness.run_for(1.0);
    let stats = harness.stats();
    assert!(stats.has_video && stats.has_audio);
    assert_eq!(harness.shown.len(), 1);
    assert_eq!(harness.shown[0].width(), 32);
    harness.player.close();
    assert!(harness.player.is_aborted());
}
