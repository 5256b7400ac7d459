//! Player configuration.

use serde::Deserialize;

/// Total bytes buffered across all packet queues before the reader stops.
pub const MAX_QUEUE_SIZE: usize = 15 * 1024 * 1024;
/// Packets a stream must buffer (with at least one second of duration) to
/// count as having enough.
pub const MIN_FRAMES: usize = 25;

/// Stream whose clock the others follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMaster {
    #[default]
    Audio,
    Video,
    External,
}

/// When the video path may drop frames to keep up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDropPolicy {
    /// Drop when video is not the sync master.
    #[default]
    Auto,
    On,
    Off,
}

impl FrameDropPolicy {
    /// Whether dropping is allowed under the effective master.
    pub fn allows(self, master: SyncMaster) -> bool {
        match self {
            FrameDropPolicy::On => true,
            FrameDropPolicy::Auto => master != SyncMaster::Video,
            FrameDropPolicy::Off => false,
        }
    }
}

/// Options for one playback session.
///
/// Every field has a default, so a host configuration only needs to name the
/// fields it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    pub sync_master: SyncMaster,
    pub frame_drop: FrameDropPolicy,
    /// Disable backpressure. `None` enables it for realtime sources only.
    pub infinite_buffer: Option<bool>,
    /// Quit once every stream has played out.
    pub auto_exit: bool,
    /// Seek by byte offset. `None` uses byte seeks for sources with
    /// discontinuous timestamps.
    pub seek_by_bytes: Option<bool>,
    pub disable_audio: bool,
    pub disable_video: bool,
    /// Preferred stream index per kind.
    pub wanted_video_stream: Option<usize>,
    pub wanted_audio_stream: Option<usize>,
    pub max_queue_size: usize,
    pub min_frames: usize,
    /// Refresh interval when nothing is due, in seconds.
    pub refresh_rate: f64,
    /// Start position in seconds.
    pub start_time: Option<f64>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            sync_master: SyncMaster::Audio,
            frame_drop: FrameDropPolicy::Auto,
            infinite_buffer: None,
            auto_exit: false,
            seek_by_bytes: None,
            disable_audio: false,
            disable_video: false,
            wanted_video_stream: None,
            wanted_audio_stream: None,
            max_queue_size: MAX_QUEUE_SIZE,
            min_frames: MIN_FRAMES,
            refresh_rate: 0.01,
            start_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_policy() {
        assert!(FrameDropPolicy::On.allows(SyncMaster::Video));
        assert!(FrameDropPolicy::Auto.allows(SyncMaster::Audio));
        assert!(FrameDropPolicy::Auto.allows(SyncMaster::External));
        assert!(!FrameDropPolicy::Auto.allows(SyncMaster::Video));
        assert!(!FrameDropPolicy::Off.allows(SyncMaster::Audio));
    }

    #[test]
    fn test_defaults() {
        let options = PlayerOptions::default();
        assert_eq!(options.sync_master, SyncMaster::Audio);
        assert_eq!(options.max_queue_size, 15 * 1024 * 1024);
        assert_eq!(options.min_frames, 25);
        assert!((options.refresh_rate - 0.01).abs() < 1e-12);
    }
}
