//! Error types for the `gopseek` crate.
//!
//! [`GopseekError`] is the single error type returned by every fallible
//! operation. Variants are split so callers can tell a transient failure
//! (a [`Timeout`](GopseekError::Timeout), which may succeed with a larger
//! budget) from an input that will never decode
//! ([`UnsupportedFormat`](GopseekError::UnsupportedFormat),
//! [`CorruptStream`](GopseekError::CorruptStream)).

use std::{fmt, io::Error as IoError, time::Duration};

use thiserror::Error;

/// The point of a call at which a deadline was observed to have expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Opening the source or probing the container.
    Open,
    /// Reading bytes from the source.
    Read,
    /// Scanning packets to build the container index.
    Scan,
    /// Seeking to a keyframe or timestamp.
    Seek,
    /// Decoding frames forward from a seek point.
    Decode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Open => "open",
            Stage::Read => "read",
            Stage::Scan => "scan",
            Stage::Seek => "seek",
            Stage::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// The unified error type for all `gopseek` operations.
///
/// Every call aborts on its first error; a partial set of frames is never
/// returned alongside one of these.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GopseekError {
    /// The locator could not be opened (missing file, refused connection,
    /// unknown protocol).
    #[error("Source unavailable at {locator}: {reason}")]
    SourceUnavailable {
        /// The locator that was passed in.
        locator: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// Reading from an already-open source failed mid-stream.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The call's deadline expired.
    #[error("Timed out during {stage} after {elapsed:?} (budget {budget:?})")]
    Timeout {
        /// Where the expiry was observed.
        stage: Stage,
        /// The configured wall-clock budget.
        budget: Duration,
        /// Time spent in the call when the expiry was observed.
        elapsed: Duration,
    },

    /// The container or codec is not recognised, or there is no video stream.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The container parses but its structure is invalid (no keyframes,
    /// empty stream, inconsistent index).
    #[error("Corrupt stream: {0}")]
    CorruptStream(String),

    /// A requested frame number is negative or past the last frame.
    #[error("Frame {frame_number} is out of range (video has {total_frames} frames)")]
    FrameIndexOutOfRange {
        /// The frame number that was requested.
        frame_number: i64,
        /// The total number of frames in the video.
        total_frames: u64,
    },

    /// A GOP-relative request named a GOP that does not exist.
    #[error("GOP {gop} is out of range (video has {gop_count} GOPs)")]
    GopOutOfRange {
        /// The requested GOP ordinal.
        gop: usize,
        /// Number of GOPs in the video.
        gop_count: u64,
    },

    /// A GOP-relative request pointed past the end of its GOP.
    #[error("Offset {offset} is out of range for GOP {gop} ({gop_length} frames)")]
    GopOffsetOutOfRange {
        /// The requested GOP ordinal.
        gop: usize,
        /// The requested offset inside the GOP.
        offset: u64,
        /// Number of frames in that GOP.
        gop_length: u64,
    },

    /// The codec failed to produce a requested frame.
    #[error("Failed to decode video frame: {0}")]
    DecodeError(String),

    /// The arguments of a call are inconsistent (zero sizes, zero counts).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The call was cancelled through a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl GopseekError {
    /// Returns `true` for [`Timeout`](GopseekError::Timeout).
    ///
    /// A timed-out call may succeed when retried with a larger budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, GopseekError::Timeout { .. })
    }

    /// Returns `true` when retrying the same call cannot succeed: the input
    /// is malformed or the request does not fit the video.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            GopseekError::UnsupportedFormat(_)
                | GopseekError::CorruptStream(_)
                | GopseekError::FrameIndexOutOfRange { .. }
                | GopseekError::GopOutOfRange { .. }
                | GopseekError::GopOffsetOutOfRange { .. }
                | GopseekError::InvalidRequest(_)
        )
    }
}
