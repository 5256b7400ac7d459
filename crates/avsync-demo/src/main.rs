//! avsync Demo Application
//!
//! Plays a synthetic source through the engine without a window or audio
//! device: the main loop stands in for the UI refresh tick and a second
//! thread pulls audio the way a hardware callback would.
//!
//! ```bash
//! RUST_LOG=avsync_core=info cargo run -p avsync-demo -- demo-configs/seek.yaml
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use avsync_core::synthetic::URI_PREFIX;
use avsync_core::{
    AudioSpec, MediaKind, Player, PlayerOptions, PresentationHandler, QuitStatus, SampleFormat,
    SyntheticBackend, SyntheticConfig, SystemTime, VideoFrame,
};
use serde::Deserialize;

/// Device buffer length the simulated audio callback asks for.
const AUDIO_CALLBACK: Duration = Duration::from_millis(20);
const STATS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DemoConfig {
    player: PlayerOptions,
    source: SyntheticConfig,
    /// Stop after this many seconds of wall time. Defaults to the source
    /// duration plus a grace period.
    run_for: Option<f64>,
    /// Output volume, 0 to 100.
    volume: Option<u8>,
    script: Vec<ScriptStep>,
}

/// A user action replayed at a fixed wall-clock offset.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ScriptStep {
    Seek { at: f64, delta_ms: i64 },
    Chapter { at: f64, incr: i32 },
    NextChunk { at: f64 },
    PrevChunk { at: f64 },
    Pause { at: f64 },
    Step { at: f64 },
    CycleAudio { at: f64 },
    CycleVideo { at: f64 },
}

impl ScriptStep {
    fn at(&self) -> f64 {
        match *self {
            ScriptStep::Seek { at, .. }
            | ScriptStep::Chapter { at, .. }
            | ScriptStep::NextChunk { at }
            | ScriptStep::PrevChunk { at }
            | ScriptStep::Pause { at }
            | ScriptStep::Step { at }
            | ScriptStep::CycleAudio { at }
            | ScriptStep::CycleVideo { at } => at,
        }
    }

    fn apply(&self, player: &Player) -> anyhow::Result<()> {
        tracing::info!(step = ?self, "script");
        match *self {
            ScriptStep::Seek { delta_ms, .. } => player.seek(delta_ms),
            ScriptStep::Chapter { incr, .. } => player.seek_to_chapter(incr),
            ScriptStep::NextChunk { .. } => player.seek_next_chunk(),
            ScriptStep::PrevChunk { .. } => player.seek_prev_chunk(),
            ScriptStep::Pause { .. } => player.toggle_pause(),
            ScriptStep::Step { .. } => player.step_to_next_frame(),
            ScriptStep::CycleAudio { .. } => player.cycle_stream(MediaKind::Audio)?,
            ScriptStep::CycleVideo { .. } => player.cycle_stream(MediaKind::Video)?,
        }
        Ok(())
    }
}

/// Presentation side of the demo: accepts any audio format as S16 and
/// forwards the quit notification to the main loop.
struct HeadlessPresenter {
    audio_spec: Mutex<Option<AudioSpec>>,
    quit_tx: Mutex<mpsc::Sender<QuitStatus>>,
}

impl PresentationHandler for HeadlessPresenter {
    fn on_window_size_needed(&self, width: u32, height: u32, aspect: f64) {
        tracing::info!(width, height, aspect, "video size");
    }

    fn on_negotiate_audio_format(
        &self,
        channels: u16,
        sample_rate: u32,
        channel_layout: u64,
    ) -> Option<AudioSpec> {
        let format = SampleFormat::S16;
        let frame_size = channels as usize * format.bytes_per_sample();
        let samples = (sample_rate as u128 * AUDIO_CALLBACK.as_millis() / 1000) as usize;
        let spec = AudioSpec {
            sample_rate,
            channels,
            channel_layout,
            format,
            hw_buffer_size: samples * frame_size,
        };
        tracing::info!(?spec, "audio output");
        if let Ok(mut slot) = self.audio_spec.lock() {
            *slot = Some(spec);
        }
        Some(spec)
    }

    fn on_quit(&self, status: QuitStatus) {
        if let Ok(tx) = self.quit_tx.lock() {
            let _ = tx.send(status);
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DemoConfig> {
    let Some(path) = path else {
        return Ok(DemoConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml_ng::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Pulls one device buffer per callback period until `stop` is set.
fn spawn_audio_callback(
    player: Arc<Player>,
    spec: AudioSpec,
    volume: u8,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("avsync-audio-callback".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; spec.hw_buffer_size];
            let mut next = Instant::now();
            while !stop.load(Ordering::Acquire) {
                player.fill_audio_buffer(&mut buf, volume);
                next += AUDIO_CALLBACK;
                thread::sleep(next.saturating_duration_since(Instant::now()));
            }
        })?;
    Ok(handle)
}

fn log_frame(frame: &VideoFrame) {
    tracing::trace!(
        pts = frame.pts,
        serial = frame.serial,
        width = frame.width(),
        height = frame.height(),
        "present"
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avsync_core=debug,avsync_demo=debug".into()),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref().map(Path::new))?;
    tracing::info!(?config, "starting avsync demo");

    let (quit_tx, quit_rx) = mpsc::channel();
    let presenter = Arc::new(HeadlessPresenter {
        audio_spec: Mutex::new(None),
        quit_tx: Mutex::new(quit_tx),
    });
    let time = SystemTime::shared();
    let backend = Arc::new(SyntheticBackend::new(config.source.clone(), time.clone()));
    let uri = format!("{URI_PREFIX}demo");

    let player = Arc::new(
        Player::open_source_with_time(&uri, config.player.clone(), backend, presenter.clone(), time)
            .context("opening synthetic source")?,
    );
    for chapter in player.chapters() {
        tracing::debug!(?chapter, "chapter");
    }
    player.exec()?;

    let stop = Arc::new(AtomicBool::new(false));
    let spec = presenter.audio_spec.lock().ok().and_then(|s| *s);
    let audio_thread = match spec {
        Some(spec) => Some(spawn_audio_callback(
            player.clone(),
            spec,
            config.volume.unwrap_or(100),
            stop.clone(),
        )?),
        None => None,
    };

    let run_for = config
        .run_for
        .unwrap_or(config.source.duration + 2.0)
        .max(0.0);
    let run_for = Duration::from_secs_f64(run_for);
    let mut script = config.script.clone();
    script.sort_by(|a, b| a.at().total_cmp(&b.at()));
    let mut script = script.into_iter().peekable();

    let started = Instant::now();
    let mut last_stats = started;
    let mut presented = 0u64;
    let status = loop {
        if let Ok(status) = quit_rx.try_recv() {
            break Some(status);
        }
        let elapsed = started.elapsed();
        if elapsed >= run_for {
            break None;
        }

        while let Some(step) = script.next_if(|s| s.at() <= elapsed.as_secs_f64()) {
            if let Err(e) = step.apply(&player) {
                tracing::warn!("script step failed: {e:#}");
            }
        }

        let remaining = player.refresh();
        if let Some(frame) = player.try_get_video_frame() {
            presented += 1;
            log_frame(&frame);
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            last_stats = Instant::now();
            tracing::info!("{}", player.statistics());
        }

        let wait = remaining.clamp(0.001, config.player.refresh_rate.max(0.001));
        thread::sleep(Duration::from_secs_f64(wait));
    };

    stop.store(true, Ordering::Release);
    if let Some(handle) = audio_thread {
        let _ = handle.join();
    }
    player.close();

    tracing::info!(presented, "final: {}", player.statistics());
    match status {
        Some(QuitStatus::Error { code, message }) => {
            anyhow::bail!("playback failed ({code}): {message}")
        }
        Some(QuitStatus::EndOfStream) => tracing::info!("end of stream"),
        None => tracing::info!("run time elapsed"),
    }
    Ok(())
}
