//! Interface to the presentation layer (window, audio device, UI loop).

use crate::codec::SampleFormat;
use crate::frame::VideoFrame;

/// Output audio format chosen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: u64,
    pub format: SampleFormat,
    /// Size of the device buffer in bytes.
    pub hw_buffer_size: usize,
}

impl AudioSpec {
    /// Bytes of one sample across all channels.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    pub fn bytes_per_sec(&self) -> usize {
        self.sample_rate as usize * self.frame_size()
    }
}

/// Why playback stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitStatus {
    /// Played to the end with auto-exit enabled.
    EndOfStream,
    /// Fatal source failure.
    Error { code: i32, message: String },
}

/// Callbacks the engine makes into the presentation layer.
///
/// Called from engine threads; implementations must be thread-safe and must
/// not call back into the [`crate::Player`] synchronously.
pub trait PresentationHandler: Send + Sync {
    /// A video stream was opened with this size and display aspect.
    fn on_window_size_needed(&self, _width: u32, _height: u32, _aspect: f64) {}

    /// A decoded picture needs a display buffer. Returning false drops the
    /// frame and stops the video pipeline.
    fn on_allocate_video_buffer(&self, _frame: &VideoFrame) -> bool {
        true
    }

    /// Picks the output format for an audio stream with the given input
    /// parameters. `None` refuses audio output.
    fn on_negotiate_audio_format(
        &self,
        channels: u16,
        sample_rate: u32,
        channel_layout: u64,
    ) -> Option<AudioSpec>;

    /// Playback ended.
    fn on_quit(&self, _status: QuitStatus) {}
}
