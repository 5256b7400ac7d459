//! Error types for the playback engine.
//!
//! Errors are split by where they originate:
//!
//! - [`QueueAborted`]: cooperative shutdown of a packet or frame queue. Not a
//!   user-facing failure; threads that see it simply unwind.
//! - [`CodecError`]: the codec engine rejected data. Ends decoding of that
//!   stream only.
//! - [`SourceError`]: open/read/seek failure in the container layer. Fatal,
//!   reported to the presentation layer as a quit event.
//! - [`ResamplerError`]: audio conversion failed. The affected buffer is
//!   replaced by silence.
//!
//! [`PlaybackError`] is the umbrella type surfaced by [`crate::Player`].

use thiserror::Error;

use crate::codec::MediaKind;

/// Result type alias for engine operations.
pub type Result<T, E = PlaybackError> = std::result::Result<T, E>;

/// A queue was aborted while a caller was waiting on it (or before the call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue aborted")]
pub struct QueueAborted;

/// Failure reported by a codec engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The codec could not be opened for the stream parameters.
    #[error("codec open failed: {0}")]
    Open(String),
    /// The codec rejected a packet.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Failure reported by the container / demux layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source could not be opened.
    #[error("failed to open source {uri}: {reason}")]
    Open { uri: String, reason: String },
    /// Reading the next packet failed.
    #[error("read failed: {0}")]
    Read(String),
    /// A seek request failed.
    #[error("seek failed: {0}")]
    Seek(String),
    /// The source has no stream that could be opened.
    #[error("no playable stream in source")]
    NoStreams,
    /// End of file reached with auto-exit enabled.
    #[error("end of file")]
    EndOfFile,
}

impl SourceError {
    /// Numeric code reported alongside quit events.
    pub fn code(&self) -> i32 {
        match self {
            SourceError::Open { .. } => -2,
            SourceError::Read(_) => -5,
            SourceError::Seek(_) => -22,
            SourceError::NoStreams => -1,
            SourceError::EndOfFile => -541_478_725,
        }
    }
}

/// Audio format conversion failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResamplerError {
    /// Source or target parameters cannot be converted.
    #[error("unsupported conversion from {from} to {to}")]
    Unsupported { from: String, to: String },
    /// The input buffer does not match its declared layout.
    #[error("malformed input: {0}")]
    MalformedInput(String),
}

/// Umbrella error surfaced by the orchestrator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    /// Cooperative shutdown.
    #[error(transparent)]
    QueueAborted(#[from] QueueAborted),
    /// A stream's decoder failed; the other stream may continue.
    #[error("{kind} decode error: {source}")]
    Decode {
        kind: MediaKind,
        #[source]
        source: CodecError,
    },
    /// Fatal source failure.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Audio conversion failure.
    #[error(transparent)]
    Resampler(#[from] ResamplerError),
    /// The presentation handler never provided a video buffer.
    #[error("presentation handler did not allocate a video buffer")]
    AllocationTimeout,
}

impl PlaybackError {
    /// Returns true for errors that only signal shutdown.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            PlaybackError::QueueAborted(_) | PlaybackError::AllocationTimeout
        )
    }
}
