//! Selective decoding of a set of frames.
//!
//! Requested frame numbers are grouped by the GOP that holds them. Each
//! group costs one seek followed by forward decoding until its last target
//! has been seen, so frames sharing a GOP never trigger a second seek.
//! Groups run in ascending order and only requested frames go through pixel
//! conversion.
//!
//! A decoded frame is mapped back to its frame number through its
//! presentation timestamp; streams without timestamps fall back to counting
//! frames from the seek point.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ffmpeg_next::frame::Video as VideoFrame;

use crate::batch::{DecodedFrame, FrameBatch};
use crate::conversion::FrameConverter;
use crate::deadline::Deadline;
use crate::error::GopseekError;
use crate::index::ContainerIndex;
use crate::locate::{SeekMode, SeekPoint, locate};

/// Something that can be positioned and decoded forward.
///
/// Implemented by the FFmpeg-backed [`Demuxer`](crate::demux::Demuxer);
/// other implementations can drive [`decode_frames`] without a container.
pub trait FrameSource {
    /// Position the source so the next frame returned is at or before
    /// `point.frame_number`.
    fn seek(&mut self, point: &SeekPoint, deadline: &Deadline) -> Result<(), GopseekError>;

    /// The next frame in presentation order, or `None` at end of stream.
    fn next_frame(&mut self, deadline: &Deadline) -> Result<Option<VideoFrame>, GopseekError>;
}

/// Counters describing the work done by one decode call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// GOP groups the request was split into.
    pub groups: usize,
    /// Seeks issued, including retries.
    pub seeks: usize,
    /// Frames pulled from the decoder, requested or not.
    pub frames_decoded: usize,
    /// Frames converted to output pixels.
    pub frames_converted: usize,
    /// Nearest-mode seeks that landed after their target and were retried
    /// from the keyframe.
    pub retries: usize,
}

/// Validated targets grouped by GOP.
#[derive(Debug, Clone)]
pub struct DecodePlan {
    order: Vec<u64>,
    groups: BTreeMap<Option<usize>, BTreeSet<u64>>,
}

impl DecodePlan {
    /// Validate `targets` against `index` and group them.
    ///
    /// # Errors
    ///
    /// [`GopseekError::FrameIndexOutOfRange`] for the first target that is
    /// negative or past the last frame.
    pub fn new(index: &ContainerIndex, targets: &[i64]) -> Result<Self, GopseekError> {
        let order = targets
            .iter()
            .map(|&target| index.check_frame_number(target))
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: BTreeMap<Option<usize>, BTreeSet<u64>> = BTreeMap::new();
        for &frame_number in &order {
            groups
                .entry(index.keyframe_at_or_before(frame_number))
                .or_default()
                .insert(frame_number);
        }
        Ok(Self { order, groups })
    }

    /// Frame numbers in request order, duplicates included.
    pub fn order(&self) -> &[u64] {
        &self.order
    }

    /// Number of distinct GOPs touched, i.e. the number of seeks needed.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Distinct frame numbers per GOP, in ascending GOP order.
    pub fn groups(&self) -> impl Iterator<Item = (Option<usize>, &BTreeSet<u64>)> + '_ {
        self.groups.iter().map(|(gop, frames)| (*gop, frames))
    }
}

enum GroupOutcome {
    Complete,
    /// The first frame after the seek was already past a pending target.
    Overshot { landed_at: u64, target: u64 },
}

/// Decode `targets` from `source` and return them in request order.
///
/// All returned frames have the converter's dimensions. The call fails
/// without partial output if any target cannot be produced or `deadline`
/// expires.
pub fn decode_frames<S: FrameSource + ?Sized>(
    source: &mut S,
    index: &ContainerIndex,
    targets: &[i64],
    mode: SeekMode,
    converter: &mut FrameConverter,
    deadline: &Deadline,
) -> Result<(FrameBatch, DecodeStats), GopseekError> {
    let plan = DecodePlan::new(index, targets)?;
    let mut stats = DecodeStats {
        groups: plan.group_count(),
        ..DecodeStats::default()
    };
    let mut decoded: HashMap<u64, DecodedFrame> = HashMap::new();

    for (gop, wanted) in plan.groups() {
        let Some(&first) = wanted.first() else {
            continue;
        };
        let point = locate(index, first as i64, mode)?;
        let mut outcome =
            decode_group(source, index, &point, wanted, converter, deadline, &mut decoded, &mut stats)?;

        if let GroupOutcome::Overshot { landed_at, target } = outcome {
            let exact = SeekPoint::exact(index, gop);
            if exact == point {
                return Err(overshoot_error(landed_at, target));
            }
            log::debug!(
                "Seek for frame {target} landed on frame {landed_at}, retrying from keyframe {}",
                exact.frame_number
            );
            stats.retries += 1;
            outcome =
                decode_group(source, index, &exact, wanted, converter, deadline, &mut decoded, &mut stats)?;
            if let GroupOutcome::Overshot { landed_at, target } = outcome {
                return Err(overshoot_error(landed_at, target));
            }
        }
    }

    let (width, height) = converter.dimensions();
    let batch = FrameBatch::assemble(width, height, plan.order(), &decoded)?;
    log::debug!(
        "Decoded {} requested frames with {} seeks and {} decoded frames",
        batch.len(),
        stats.seeks,
        stats.frames_decoded
    );
    Ok((batch, stats))
}

#[allow(clippy::too_many_arguments)]
fn decode_group<S: FrameSource + ?Sized>(
    source: &mut S,
    index: &ContainerIndex,
    point: &SeekPoint,
    wanted: &BTreeSet<u64>,
    converter: &mut FrameConverter,
    deadline: &Deadline,
    decoded: &mut HashMap<u64, DecodedFrame>,
    stats: &mut DecodeStats,
) -> Result<GroupOutcome, GopseekError> {
    let mut pending: BTreeSet<u64> = wanted
        .iter()
        .filter(|&&frame_number| !decoded.contains_key(&frame_number))
        .copied()
        .collect();
    if pending.is_empty() {
        return Ok(GroupOutcome::Complete);
    }

    source.seek(point, deadline)?;
    stats.seeks += 1;

    let mut next_counted = point.frame_number;
    let mut first_frame = true;
    while let Some(frame) = source.next_frame(deadline)? {
        stats.frames_decoded += 1;
        let frame_number = frame
            .timestamp()
            .or_else(|| frame.pts())
            .and_then(|timestamp| index.frame_number_for_timestamp(timestamp))
            .unwrap_or(next_counted);
        next_counted = frame_number + 1;

        if let Some(&earliest) = pending.first() {
            if frame_number > earliest {
                if first_frame {
                    return Ok(GroupOutcome::Overshot {
                        landed_at: frame_number,
                        target: earliest,
                    });
                }
                return Err(GopseekError::DecodeError(format!(
                    "frame {earliest} was skipped by the decoder (reached frame {frame_number})"
                )));
            }
        }
        first_frame = false;

        if pending.remove(&frame_number) {
            decoded.insert(frame_number, converter.convert(&frame)?);
            stats.frames_converted += 1;
            if pending.is_empty() {
                return Ok(GroupOutcome::Complete);
            }
        }
    }

    let missing: Vec<u64> = pending.into_iter().collect();
    Err(GopseekError::DecodeError(format!(
        "stream ended before frames {missing:?} were decoded"
    )))
}

fn overshoot_error(landed_at: u64, target: u64) -> GopseekError {
    GopseekError::DecodeError(format!(
        "seek for frame {target} landed on later frame {landed_at}"
    ))
}
