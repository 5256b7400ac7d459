//! Decoded frames as they sit in the frame queues.

use crate::codec::{AudioSamples, Picture, Rational};

/// Timing summary of a queued frame, copied out of the ring so the caller
/// does not keep a slot locked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Presentation time in seconds.
    pub pts: Option<f64>,
    /// Nominal duration in seconds.
    pub duration: f64,
    pub serial: u64,
    /// Byte position of the source packet.
    pub pos: Option<i64>,
}

/// Frames that can live in a [`crate::FrameQueue`].
pub trait QueuedFrame: Send {
    fn timing(&self) -> FrameTiming;
}

/// A decoded picture ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub picture: Picture,
    pub pts: Option<f64>,
    pub duration: f64,
    pub pos: Option<i64>,
    pub serial: u64,
    pub sample_aspect_ratio: Rational,
    /// The presentation layer accepted the frame's buffer.
    pub allocated: bool,
}

impl VideoFrame {
    pub fn width(&self) -> u32 {
        self.picture.width
    }

    pub fn height(&self) -> u32 {
        self.picture.height
    }

    /// Display aspect ratio, honouring the sample aspect ratio.
    pub fn display_aspect(&self) -> f64 {
        let sar = if self.sample_aspect_ratio.is_valid() {
            self.sample_aspect_ratio.as_f64()
        } else {
            1.0
        };
        if self.picture.height == 0 {
            return 0.0;
        }
        sar * self.picture.width as f64 / self.picture.height as f64
    }
}

impl QueuedFrame for VideoFrame {
    fn timing(&self) -> FrameTiming {
        FrameTiming {
            pts: self.pts,
            duration: self.duration,
            serial: self.serial,
            pos: self.pos,
        }
    }
}

/// A decoded block of audio samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: AudioSamples,
    pub pts: Option<f64>,
    pub duration: f64,
    pub pos: Option<i64>,
    pub serial: u64,
}

impl QueuedFrame for AudioFrame {
    fn timing(&self) -> FrameTiming {
        FrameTiming {
            pts: self.pts,
            duration: self.duration,
            serial: self.serial,
            pos: self.pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PixelFormat;

    #[test]
    fn test_display_aspect() {
        let frame = VideoFrame {
            picture: Picture {
                width: 720,
                height: 576,
                format: PixelFormat::Yuv420p,
                planes: Vec::new(),
            },
            pts: Some(0.0),
            duration: 0.04,
            pos: None,
            serial: 1,
            sample_aspect_ratio: Rational::new(16, 15),
            allocated: false,
        };
        assert!((frame.display_aspect() - 4.0 / 3.0).abs() < 1e-9);
        assert_eq!(frame.timing().serial, 1);
    }
}
