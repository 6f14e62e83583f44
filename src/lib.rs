//! # gopseek
//!
//! Selective video frame extraction: return a small, caller-chosen set of
//! decoded frames from a video as fixed-size RGB buffers, without decoding
//! the whole stream.
//!
//! A packet scan indexes the video's keyframes once. Each requested frame
//! is then reached by seeking to the keyframe (start of its Group of
//! Pictures) at or before it and decoding forward; frames sharing a GOP
//! share one seek. Every call runs under a wall-clock deadline that also
//! bounds FFmpeg's own I/O, so a slow remote source fails with a timeout
//! instead of hanging.
//!
//! ## Quick Start
//!
//! ### Decode Specific Frames
//!
//! ```no_run
//! use gopseek::{ExtractOptions, OutputSize, decode_by_frame_numbers};
//!
//! let options = ExtractOptions::new().with_output_size(OutputSize::Exact { width: 224, height: 224 });
//! let batch = decode_by_frame_numbers("input.mp4", &[90, 0, 45], &options)?;
//! assert_eq!(batch.shape(), [3, 224, 224, 3]);
//! # Ok::<(), gopseek::GopseekError>(())
//! ```
//!
//! ### Sample a Clip
//!
//! ```no_run
//! use gopseek::{ExtractOptions, sample_frames};
//!
//! // Eight frames spread over the video.
//! let uniform = sample_frames("input.mp4", 8, false, &ExtractOptions::default())?;
//! // Sixteen consecutive frames from a random keyframe, reproducibly.
//! let clip = sample_frames("input.mp4", 16, true, &ExtractOptions::new().with_seed(3))?;
//! # Ok::<(), gopseek::GopseekError>(())
//! ```
//!
//! ### Reuse a Handle
//!
//! ```no_run
//! use gopseek::{ExtractOptions, VideoHandle};
//!
//! let mut handle = VideoHandle::open("https://example.com/clip.mp4", ExtractOptions::default())?;
//! let total = handle.frame_count()?;
//! let last = handle.decode_frame_numbers(&[total as i64 - 1])?;
//! println!("{:?}", handle.last_stats());
//! # Ok::<(), gopseek::GopseekError>(())
//! ```
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `spawn_blocking`-backed futures in [`asynchronous`] |
//! | `rayon` | [`decode_many`] decodes independent requests in parallel |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

#[cfg(feature = "async")]
pub mod asynchronous;
mod avio;
pub mod batch;
pub mod configuration;
pub mod conversion;
pub mod deadline;
pub mod decode;
pub mod demux;
pub mod error;
pub mod extract;
pub mod ffmpeg;
pub mod handle;
pub mod index;
pub mod locate;
pub mod metadata;
#[cfg(feature = "rayon")]
mod rayon;
pub mod sampler;
pub mod source;

pub use batch::{DecodedFrame, FrameBatch};
pub use configuration::{DEFAULT_TIMEOUT, ExtractOptions};
pub use conversion::{FrameConverter, OutputSize};
pub use deadline::{CancellationToken, Deadline, with_deadline};
pub use decode::{DecodePlan, DecodeStats, FrameSource, decode_frames};
pub use error::{GopseekError, Stage};
pub use extract::{
    decode_by_frame_index, decode_by_frame_numbers, frame_count, gop_count, sample_frames,
    sample_with_policy,
};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use handle::VideoHandle;
pub use index::{ContainerIndex, Keyframe, PacketRecord};
pub use locate::{GopFrameIndex, SeekMode, SeekPoint, SeekTarget, locate};
pub use metadata::VideoMetadata;
#[cfg(feature = "rayon")]
pub use crate::rayon::{DecodeRequest, decode_many};
pub use sampler::{SamplingPolicy, sample, uniform_indices};
pub use source::{ByteSource, FileSource, Locator, RemoteSource};
