//! One-shot entry points.
//!
//! Each function opens the source, does its work and closes it again, all
//! under a single deadline built from the [`ExtractOptions`]: the timeout
//! covers the open and the index scan as well as decoding. Use a
//! [`VideoHandle`] to amortise the open and the scan over several calls.

use crate::batch::FrameBatch;
use crate::configuration::ExtractOptions;
use crate::deadline::supervise;
use crate::error::GopseekError;
use crate::handle::VideoHandle;
use crate::locate::GopFrameIndex;
use crate::sampler::SamplingPolicy;
use crate::source::Locator;

/// Exact number of frames in the video.
///
/// ```no_run
/// let frames = gopseek::frame_count("input.mp4", &gopseek::ExtractOptions::default())?;
/// # Ok::<(), gopseek::GopseekError>(())
/// ```
pub fn frame_count(
    locator: impl Into<Locator>,
    options: &ExtractOptions,
) -> Result<u64, GopseekError> {
    let locator = locator.into();
    supervise(options.deadline(), |deadline| {
        VideoHandle::open_within(locator, options.clone(), deadline)?.frame_count_within(deadline)
    })
}

/// Number of GOPs (keyframes) in the video.
pub fn gop_count(
    locator: impl Into<Locator>,
    options: &ExtractOptions,
) -> Result<u64, GopseekError> {
    let locator = locator.into();
    supervise(options.deadline(), |deadline| {
        VideoHandle::open_within(locator, options.clone(), deadline)?.gop_count_within(deadline)
    })
}

/// Decode `frame_numbers` in the given order, duplicates included.
///
/// Frames are resized per [`ExtractOptions::with_output_size`] and reached
/// per [`ExtractOptions::with_seek_mode`].
pub fn decode_by_frame_numbers(
    locator: impl Into<Locator>,
    frame_numbers: &[i64],
    options: &ExtractOptions,
) -> Result<FrameBatch, GopseekError> {
    let locator = locator.into();
    supervise(options.deadline(), |deadline| {
        VideoHandle::open_within(locator, options.clone(), deadline)?
            .decode_within(frame_numbers, deadline)
    })
}

/// Decode frames addressed as `(gop, offset)` pairs.
pub fn decode_by_frame_index(
    locator: impl Into<Locator>,
    addresses: &[GopFrameIndex],
    options: &ExtractOptions,
) -> Result<FrameBatch, GopseekError> {
    let locator = locator.into();
    supervise(options.deadline(), |deadline| {
        VideoHandle::open_within(locator, options.clone(), deadline)?
            .decode_gop_frames_within(addresses, deadline)
    })
}

/// Decode `count` frames: evenly spread over the video, or a contiguous
/// clip from a random keyframe when `random_seek` is set.
///
/// Random seeks are reproducible with [`ExtractOptions::with_seed`].
pub fn sample_frames(
    locator: impl Into<Locator>,
    count: usize,
    random_seek: bool,
    options: &ExtractOptions,
) -> Result<FrameBatch, GopseekError> {
    let policy = if random_seek {
        SamplingPolicy::random_clip(count)
    } else {
        SamplingPolicy::Uniform(count)
    };
    sample_with_policy(locator, &policy, options)
}

/// Decode the frames chosen by `policy`.
pub fn sample_with_policy(
    locator: impl Into<Locator>,
    policy: &SamplingPolicy,
    options: &ExtractOptions,
) -> Result<FrameBatch, GopseekError> {
    let locator = locator.into();
    supervise(options.deadline(), |deadline| {
        VideoHandle::open_within(locator, options.clone(), deadline)?
            .sample_within(policy, deadline)
    })
}
