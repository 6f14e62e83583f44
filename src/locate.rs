//! Mapping target frames to seek points.
//!
//! Every target is reached by seeking to a point at or before it and
//! decoding forward, so the decoder never has to go backwards. Two seek
//! strategies are offered:
//!
//! - [`SeekMode::Keyframe`] seeks the video stream to the indexed keyframe
//!   at or immediately before the target.
//! - [`SeekMode::Nearest`] asks the container to seek backwards from the
//!   target's own timestamp and lets the demuxer choose the closest seekable
//!   point. It may land earlier than the indexed keyframe, never after the
//!   target.

use crate::error::GopseekError;
use crate::index::ContainerIndex;

/// How to position the demuxer before decoding a group of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum SeekMode {
    /// Seek the stream to the exact keyframe at or before the target.
    Keyframe,
    /// Seek the container backwards from the target timestamp.
    #[default]
    Nearest,
}

/// The position handed to the demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    /// Rewind to the very beginning of the stream.
    StreamStart,
    /// A keyframe timestamp in the stream's time base.
    Keyframe(i64),
    /// A target frame timestamp in the stream's time base; the container
    /// resolves it to a preceding seekable point.
    Timestamp(i64),
}

/// Where forward decoding of a target starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// Ordinal of the GOP holding the target, `None` for frames that
    /// precede the first keyframe.
    pub gop: Option<usize>,
    /// First frame number decoding from this point is guaranteed to reach.
    pub frame_number: u64,
    /// What to seek to.
    pub target: SeekTarget,
}

impl SeekPoint {
    /// The same point, forced to the indexed keyframe.
    ///
    /// Used when a [`SeekMode::Nearest`] seek overshoots its target.
    pub fn exact(index: &ContainerIndex, gop: Option<usize>) -> Self {
        let keyframe = gop.and_then(|ordinal| index.keyframes().get(ordinal));
        match keyframe {
            Some(keyframe) if gop != Some(0) && index.has_timestamps() => SeekPoint {
                gop,
                frame_number: keyframe.frame_number,
                target: keyframe
                    .timestamp
                    .map_or(SeekTarget::StreamStart, SeekTarget::Keyframe),
            },
            _ => SeekPoint {
                gop,
                frame_number: 0,
                target: SeekTarget::StreamStart,
            },
        }
    }
}

/// Find the seek point for `target`.
///
/// Frames before the first keyframe, frames of the first GOP, and every
/// frame of a stream without timestamps are reached from the stream start.
///
/// # Errors
///
/// [`GopseekError::FrameIndexOutOfRange`] if `target` is negative or not
/// below the total frame count.
pub fn locate(
    index: &ContainerIndex,
    target: i64,
    mode: SeekMode,
) -> Result<SeekPoint, GopseekError> {
    let frame_number = index.check_frame_number(target)?;
    let gop = index.keyframe_at_or_before(frame_number);

    let point = match mode {
        SeekMode::Keyframe => SeekPoint::exact(index, gop),
        SeekMode::Nearest => {
            let exact = SeekPoint::exact(index, gop);
            match (exact.target, index.timestamp_for_frame(frame_number)) {
                (SeekTarget::StreamStart, _) | (_, None) => exact,
                (_, Some(timestamp)) => SeekPoint {
                    target: SeekTarget::Timestamp(timestamp),
                    ..exact
                },
            }
        }
    };
    log::trace!("Frame {frame_number} -> {point:?}");
    Ok(point)
}

/// A frame addressed as `offset` frames into GOP `gop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GopFrameIndex {
    /// Zero-based GOP ordinal.
    pub gop: usize,
    /// Offset from the GOP's keyframe, in presentation order.
    pub offset: u64,
}

impl GopFrameIndex {
    pub fn new(gop: usize, offset: u64) -> Self {
        Self { gop, offset }
    }

    /// The absolute frame number this address refers to.
    ///
    /// # Errors
    ///
    /// [`GopseekError::GopOutOfRange`] or
    /// [`GopseekError::GopOffsetOutOfRange`].
    pub fn resolve(&self, index: &ContainerIndex) -> Result<u64, GopseekError> {
        let frames = index.gop_frames(self.gop).ok_or(GopseekError::GopOutOfRange {
            gop: self.gop,
            gop_count: index.gop_count(),
        })?;
        let gop_length = frames.end - frames.start;
        if self.offset >= gop_length {
            return Err(GopseekError::GopOffsetOutOfRange {
                gop: self.gop,
                offset: self.offset,
                gop_length,
            });
        }
        Ok(frames.start + self.offset)
    }
}

impl From<(usize, u64)> for GopFrameIndex {
    fn from((gop, offset): (usize, u64)) -> Self {
        Self { gop, offset }
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::Rational;

    use super::*;
    use crate::index::PacketRecord;

    /// 20 frames, keyframes at 2, 8 and 14, timestamps ten ticks apart.
    fn index() -> ContainerIndex {
        let packets = (0..20).map(|i| PacketRecord {
            timestamp: Some(i * 10),
            position: Some(i as u64 * 100),
            is_key: matches!(i, 2 | 8 | 14),
        });
        ContainerIndex::from_packets(packets, Rational::new(1, 300)).unwrap()
    }

    #[test]
    fn keyframe_mode_picks_preceding_keyframe() {
        let index = index();
        let point = locate(&index, 11, SeekMode::Keyframe).unwrap();
        assert_eq!(point.gop, Some(1));
        assert_eq!(point.frame_number, 8);
        assert_eq!(point.target, SeekTarget::Keyframe(80));

        // A keyframe target maps onto itself.
        let point = locate(&index, 14, SeekMode::Keyframe).unwrap();
        assert_eq!(point.frame_number, 14);
    }

    #[test]
    fn nearest_mode_seeks_by_target_timestamp() {
        let index = index();
        let point = locate(&index, 11, SeekMode::Nearest).unwrap();
        assert_eq!(point.gop, Some(1));
        assert_eq!(point.frame_number, 8);
        assert_eq!(point.target, SeekTarget::Timestamp(110));
    }

    #[test]
    fn first_gop_and_leading_frames_rewind() {
        let index = index();
        for target in [0, 1, 2, 7] {
            let point = locate(&index, target, SeekMode::Nearest).unwrap();
            assert_eq!(point.target, SeekTarget::StreamStart, "target {target}");
            assert_eq!(point.frame_number, 0);
        }
        assert_eq!(locate(&index, 1, SeekMode::Keyframe).unwrap().gop, None);
    }

    #[test]
    fn out_of_range_targets_fail() {
        let index = index();
        for target in [-1, 20, 1_000] {
            assert!(matches!(
                locate(&index, target, SeekMode::Keyframe),
                Err(GopseekError::FrameIndexOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn streams_without_timestamps_always_rewind() {
        let packets = (0..6).map(|i| PacketRecord {
            timestamp: None,
            position: None,
            is_key: i % 2 == 0,
        });
        let index = ContainerIndex::from_packets(packets, Rational::new(1, 25)).unwrap();
        let point = locate(&index, 5, SeekMode::Keyframe).unwrap();
        assert_eq!(point.gop, Some(2));
        assert_eq!(point.target, SeekTarget::StreamStart);
    }

    #[test]
    fn gop_addresses_resolve_within_their_group() {
        let index = index();
        assert_eq!(GopFrameIndex::new(0, 0).resolve(&index).unwrap(), 2);
        assert_eq!(GopFrameIndex::new(1, 5).resolve(&index).unwrap(), 13);
        assert_eq!(GopFrameIndex::from((2, 5)).resolve(&index).unwrap(), 19);

        assert!(matches!(
            GopFrameIndex::new(1, 6).resolve(&index),
            Err(GopseekError::GopOffsetOutOfRange { gop: 1, offset: 6, gop_length: 6 })
        ));
        assert!(matches!(
            GopFrameIndex::new(3, 0).resolve(&index),
            Err(GopseekError::GopOutOfRange { gop: 3, gop_count: 3 })
        ));
    }
}
