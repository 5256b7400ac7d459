//! avsync-core: audio/video playback synchronization engine.
//!
//! The engine sits between a demuxer/decoder backend and a presentation
//! layer. It contains:
//!
//! - Queues: [`packet_queue`] (compressed packets tagged with seek epochs)
//!   and [`frame_queue`] (fixed rings of decoded frames)
//! - Timing: [`clock`] (drifting presentation clocks) and [`sync`] (the
//!   delay, frame-drop and audio drift decisions)
//! - Pipeline: [`decoder`], [`stream`] and the [`player`] orchestrator
//! - Collaborator traits: [`codec`] (backend) and [`presentation`] (UI side)
//! - A generated source for tests and demos: [`synthetic`]
//!
//! Time is expressed in seconds as `f64` throughout.

pub mod clock;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod frame_queue;
pub mod options;
pub mod packet_queue;
pub mod player;
pub mod presentation;
pub mod resample;
pub mod stats;
pub mod stream;
pub mod sync;
pub mod synthetic;

pub use clock::{Clock, ManualTime, SharedTimeSource, SystemTime, TimeSource};
pub use codec::{
    AudioSamples, Chapter, CodecEngine, Container, MediaBackend, MediaKind, Packet, Rational,
    SampleFormat, StreamParams,
};
pub use error::{CodecError, PlaybackError, QueueAborted, ResamplerError, Result, SourceError};
pub use frame::{AudioFrame, VideoFrame};
pub use frame_queue::FrameQueue;
pub use options::{FrameDropPolicy, PlayerOptions, SyncMaster};
pub use packet_queue::PacketQueue;
pub use player::Player;
pub use presentation::{AudioSpec, PresentationHandler, QuitStatus};
pub use stats::{PlaybackMetrics, Statistics};
pub use synthetic::{SyntheticBackend, SyntheticConfig};
