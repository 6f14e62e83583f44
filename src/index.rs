//! Container-level frame and keyframe index.
//!
//! A [`ContainerIndex`] is built by reading the packets of the video stream
//! once, without decoding any of them: every packet is one frame, key
//! packets mark the start of a Group of Pictures (GOP). The index maps each
//! keyframe to its frame number in presentation order and keeps the sorted
//! presentation timestamps so decoded frames can be mapped back to frame
//! numbers.
//!
//! # Example
//!
//! ```no_run
//! use gopseek::{ExtractOptions, VideoHandle};
//!
//! let mut handle = VideoHandle::open("input.mp4", ExtractOptions::new())?;
//! let index = handle.index()?;
//! println!("{} frames in {} GOPs", index.total_frame_count(), index.gop_count());
//! for keyframe in index.keyframes() {
//!     println!("keyframe at frame {}", keyframe.frame_number);
//! }
//! # Ok::<(), gopseek::GopseekError>(())
//! ```

use std::ops::Range;

use ffmpeg_next::Rational;

use crate::deadline::Deadline;
use crate::demux::Demuxer;
use crate::error::{GopseekError, Stage};

/// What the scan records about one video packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    /// Presentation timestamp, or decode timestamp when the container has
    /// no presentation timestamps.
    pub timestamp: Option<i64>,
    /// Byte offset of the packet in the container, if known.
    pub position: Option<u64>,
    /// Whether the packet starts a GOP.
    pub is_key: bool,
}

/// A keyframe (seek point) in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyframe {
    /// Zero-based frame number in presentation order.
    pub frame_number: u64,
    /// Timestamp in the stream's time base.
    pub timestamp: Option<i64>,
    /// Byte offset of the keyframe packet in the container.
    pub position: Option<u64>,
}

/// Frame count, keyframe positions, and timestamp map of one video stream.
#[derive(Debug, Clone)]
pub struct ContainerIndex {
    total_frame_count: u64,
    keyframes: Vec<Keyframe>,
    timestamps: Option<Vec<i64>>,
    time_base: Rational,
}

impl ContainerIndex {
    /// Build an index from packet records given in decode (file) order.
    ///
    /// # Errors
    ///
    /// [`GopseekError::CorruptStream`] when there are no packets, no
    /// keyframes, or keyframes whose byte positions go backwards.
    pub fn from_packets<I>(packets: I, time_base: Rational) -> Result<Self, GopseekError>
    where
        I: IntoIterator<Item = PacketRecord>,
    {
        let packets: Vec<PacketRecord> = packets.into_iter().collect();
        if packets.is_empty() {
            return Err(GopseekError::CorruptStream(
                "video stream contains no packets".to_string(),
            ));
        }

        // Presentation order is only recoverable when every packet is stamped.
        let timestamps = packets
            .iter()
            .map(|packet| packet.timestamp)
            .collect::<Option<Vec<i64>>>()
            .map(|mut timestamps| {
                timestamps.sort_unstable();
                timestamps
            });

        let mut keyframes: Vec<Keyframe> = packets
            .iter()
            .enumerate()
            .filter(|(_, packet)| packet.is_key)
            .map(|(decode_index, packet)| {
                let frame_number = match (&timestamps, packet.timestamp) {
                    (Some(sorted), Some(timestamp)) => {
                        sorted.partition_point(|&t| t < timestamp) as u64
                    }
                    _ => decode_index as u64,
                };
                Keyframe {
                    frame_number,
                    timestamp: packet.timestamp,
                    position: packet.position,
                }
            })
            .collect();

        if keyframes.is_empty() {
            return Err(GopseekError::CorruptStream(
                "video stream contains no keyframes".to_string(),
            ));
        }

        keyframes.sort_by_key(|keyframe| keyframe.frame_number);
        keyframes.dedup_by_key(|keyframe| keyframe.frame_number);

        let mut previous_position: Option<u64> = None;
        for keyframe in &keyframes {
            if let Some(position) = keyframe.position {
                if previous_position.is_some_and(|previous| position <= previous) {
                    return Err(GopseekError::CorruptStream(format!(
                        "keyframe at frame {} is stored before the preceding keyframe",
                        keyframe.frame_number
                    )));
                }
                previous_position = Some(position);
            }
        }

        Ok(Self {
            total_frame_count: packets.len() as u64,
            keyframes,
            timestamps,
            time_base,
        })
    }

    /// Total number of frames in the video stream.
    pub fn total_frame_count(&self) -> u64 {
        self.total_frame_count
    }

    /// Number of keyframe-delimited groups.
    pub fn gop_count(&self) -> u64 {
        self.keyframes.len() as u64
    }

    /// All keyframes, strictly increasing in frame number.
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Time base of the stream's timestamps.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Whether every frame carries a timestamp.
    pub fn has_timestamps(&self) -> bool {
        self.timestamps.is_some()
    }

    /// Validate a caller-supplied frame number.
    pub fn check_frame_number(&self, frame_number: i64) -> Result<u64, GopseekError> {
        match u64::try_from(frame_number) {
            Ok(number) if number < self.total_frame_count => Ok(number),
            _ => Err(GopseekError::FrameIndexOutOfRange {
                frame_number,
                total_frames: self.total_frame_count,
            }),
        }
    }

    /// Ordinal of the last keyframe at or before `frame_number`, or `None`
    /// if the frame precedes the first keyframe.
    pub fn keyframe_at_or_before(&self, frame_number: u64) -> Option<usize> {
        self.keyframes
            .partition_point(|keyframe| keyframe.frame_number <= frame_number)
            .checked_sub(1)
    }

    /// The frame numbers belonging to GOP `ordinal`.
    pub fn gop_frames(&self, ordinal: usize) -> Option<Range<u64>> {
        let start = self.keyframes.get(ordinal)?.frame_number;
        let end = self
            .keyframes
            .get(ordinal + 1)
            .map_or(self.total_frame_count, |next| next.frame_number);
        Some(start..end)
    }

    /// Presentation timestamp of `frame_number`.
    pub fn timestamp_for_frame(&self, frame_number: u64) -> Option<i64> {
        self.timestamps
            .as_ref()?
            .get(usize::try_from(frame_number).ok()?)
            .copied()
    }

    /// Map a decoded frame's timestamp back to its frame number.
    ///
    /// Timestamps not present in the index resolve to the nearest indexed
    /// one, the earlier on a tie.
    pub fn frame_number_for_timestamp(&self, timestamp: i64) -> Option<u64> {
        let sorted = self.timestamps.as_ref()?;
        let next = sorted.partition_point(|&t| t < timestamp);
        if sorted.get(next) == Some(&timestamp) {
            return Some(next as u64);
        }
        let before = next.checked_sub(1).map(|i| (i, timestamp.abs_diff(sorted[i])));
        let after = sorted.get(next).map(|&t| (next, t.abs_diff(timestamp)));
        match (before, after) {
            (Some((i, d_before)), Some((j, d_after))) => {
                let nearest = if d_before <= d_after { i } else { j };
                Some(nearest as u64)
            }
            (Some((i, _)), None) => Some(i as u64),
            (None, Some((j, _))) => Some(j as u64),
            (None, None) => None,
        }
    }
}

/// Scan the demuxer's video stream and build its index.
///
/// Reads packets without decoding them; the deadline is checked per
/// packet.
pub(crate) fn scan(demuxer: &mut Demuxer, deadline: &Deadline) -> Result<ContainerIndex, GopseekError> {
    log::debug!("Scanning video stream {} for keyframes", demuxer.stream_index());
    demuxer.rewind(deadline)?;

    let mut packets = Vec::new();
    while let Some(record) = demuxer.next_video_packet(deadline)? {
        deadline.check(Stage::Scan)?;
        packets.push(record);
    }

    let index = ContainerIndex::from_packets(packets, demuxer.time_base())?;
    log::info!(
        "Indexed {} frames in {} GOPs (timestamps: {})",
        index.total_frame_count(),
        index.gop_count(),
        index.has_timestamps(),
    );
    Ok(index)
}
