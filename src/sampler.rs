//! Choosing which frames to extract.
//!
//! A [`SamplingPolicy`] turns the indexed frame count into a list of frame
//! numbers for the decode engine. Uniform sampling is deterministic; random
//! seek sampling draws its start from a caller-provided RNG so a seeded RNG
//! reproduces the same frames.

use rand::Rng;

use crate::error::GopseekError;
use crate::index::ContainerIndex;

/// How to pick frames from a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SamplingPolicy {
    /// `n` frames spread evenly over the whole video: the midpoint of each of
    /// `n` equal segments.
    Uniform(usize),
    /// `count` frames, `stride` apart, starting at a randomly chosen keyframe
    /// from which they all fit before the end of the stream.
    RandomSeek {
        /// Number of frames to take.
        count: usize,
        /// Distance between consecutive frames; `1` takes a contiguous clip.
        stride: u64,
    },
    /// Exactly these frame numbers, in this order.
    Explicit(Vec<i64>),
}

impl SamplingPolicy {
    /// `count` consecutive frames from a random keyframe.
    pub fn random_clip(count: usize) -> Self {
        SamplingPolicy::RandomSeek { count, stride: 1 }
    }
}

/// Resolve `policy` to frame numbers within `[0, total_frame_count)`.
///
/// # Errors
///
/// [`GopseekError::InvalidRequest`] for a zero count or stride,
/// [`GopseekError::FrameIndexOutOfRange`] for an explicit frame outside the
/// video.
pub fn sample<R: Rng + ?Sized>(
    index: &ContainerIndex,
    policy: &SamplingPolicy,
    rng: &mut R,
) -> Result<Vec<u64>, GopseekError> {
    match policy {
        SamplingPolicy::Uniform(count) => {
            if *count == 0 {
                return Err(GopseekError::InvalidRequest(
                    "cannot sample zero frames".to_string(),
                ));
            }
            Ok(uniform_indices(index.total_frame_count(), *count))
        }
        SamplingPolicy::Explicit(frames) => frames
            .iter()
            .map(|&frame| index.check_frame_number(frame))
            .collect(),
        SamplingPolicy::RandomSeek { count, stride } => {
            random_seek(index, *count, *stride, rng)
        }
    }
}

/// `count` evenly spaced frame numbers in `[0, total)`, or every frame when
/// there are no more than `count`.
///
/// The video is cut into `count` segments of `total / count` frames and the
/// middle frame of each is taken; the remainder frames at the end are never
/// sampled.
///
/// ```
/// assert_eq!(gopseek::uniform_indices(100, 4), vec![12, 37, 62, 87]);
/// assert_eq!(gopseek::uniform_indices(3, 5), vec![0, 1, 2]);
/// ```
pub fn uniform_indices(total: u64, count: usize) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    if total <= count as u64 {
        return (0..total).collect();
    }
    let segment = total / count as u64;
    (0..count as u64)
        .map(|i| segment / 2 + i * segment)
        .collect()
}

fn random_seek<R: Rng + ?Sized>(
    index: &ContainerIndex,
    count: usize,
    stride: u64,
    rng: &mut R,
) -> Result<Vec<u64>, GopseekError> {
    if count == 0 {
        return Err(GopseekError::InvalidRequest(
            "cannot sample zero frames".to_string(),
        ));
    }
    if stride == 0 {
        return Err(GopseekError::InvalidRequest(
            "sampling stride must be at least one frame".to_string(),
        ));
    }

    let total = index.total_frame_count();
    let span = (count as u64 - 1).saturating_mul(stride).saturating_add(1);
    let candidates: Vec<u64> = index
        .keyframes()
        .iter()
        .map(|keyframe| keyframe.frame_number)
        .filter(|&start| start.saturating_add(span) <= total)
        .collect();

    let start = if candidates.is_empty() {
        log::debug!("No keyframe leaves room for {count} frames at stride {stride}, starting at 0");
        0
    } else {
        candidates[rng.gen_range(0..candidates.len())]
    };
    log::debug!(
        "Random seek to frame {start} ({:.3} of the stream)",
        start as f64 / total.max(1) as f64
    );

    Ok((0..count as u64)
        .map(|i| start + i * stride)
        .take_while(|&frame| frame < total)
        .collect())
}

#[cfg(test)]
mod tests {
    use ffmpeg_next::Rational;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::index::PacketRecord;

    fn index(total: i64, gop: i64) -> ContainerIndex {
        let packets = (0..total).map(|i| PacketRecord {
            timestamp: Some(i),
            position: Some(i as u64),
            is_key: i % gop == 0,
        });
        ContainerIndex::from_packets(packets, Rational::new(1, 30)).unwrap()
    }

    #[test]
    fn uniform_is_strictly_increasing_and_in_range() {
        for (total, count) in [(150, 8), (10, 10), (1000, 7), (31, 30)] {
            let frames = uniform_indices(total, count);
            assert_eq!(frames.len(), count);
            assert!(frames.windows(2).all(|pair| pair[0] < pair[1]), "{frames:?}");
            assert!(frames.iter().all(|&frame| frame < total));
        }
    }

    #[test]
    fn uniform_takes_midpoints() {
        assert_eq!(uniform_indices(150, 5), vec![15, 45, 75, 105, 135]);
    }

    #[test]
    fn uniform_uses_whole_frame_segments() {
        assert_eq!(uniform_indices(10, 4), vec![1, 3, 5, 7]);
        let frames = uniform_indices(100, 7);
        assert_eq!(frames, vec![7, 21, 35, 49, 63, 77, 91]);
        // The last segment still ends within the final `total / count`
        // frames, so the sample spans the video.
        assert!(100 - frames[6] <= 100 / 7);
    }

    #[test]
    fn uniform_zero_is_rejected() {
        let index = index(20, 5);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            sample(&index, &SamplingPolicy::Uniform(0), &mut rng),
            Err(GopseekError::InvalidRequest(_))
        ));
    }

    #[test]
    fn explicit_keeps_order_and_validates() {
        let index = index(20, 5);
        let mut rng = StdRng::seed_from_u64(0);
        let frames = sample(&index, &SamplingPolicy::Explicit(vec![9, 2, 9]), &mut rng).unwrap();
        assert_eq!(frames, vec![9, 2, 9]);
        assert!(matches!(
            sample(&index, &SamplingPolicy::Explicit(vec![3, 20]), &mut rng),
            Err(GopseekError::FrameIndexOutOfRange { frame_number: 20, .. })
        ));
    }

    #[test]
    fn random_seek_starts_on_a_keyframe_that_fits() {
        let index = index(100, 10);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let frames = sample(
                &index,
                &SamplingPolicy::RandomSeek { count: 8, stride: 2 },
                &mut rng,
            )
            .unwrap();
            assert_eq!(frames.len(), 8);
            assert_eq!(frames[0] % 10, 0);
            assert!(*frames.last().unwrap() < 100);
            assert!(frames.windows(2).all(|pair| pair[1] - pair[0] == 2));
        }
    }

    #[test]
    fn random_seek_is_reproducible_with_a_seed() {
        let index = index(300, 30);
        let policy = SamplingPolicy::random_clip(16);
        let first = sample(&index, &policy, &mut StdRng::seed_from_u64(9)).unwrap();
        let second = sample(&index, &policy, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn random_seek_truncates_short_streams() {
        let index = index(12, 6);
        let mut rng = StdRng::seed_from_u64(1);
        let frames = sample(&index, &SamplingPolicy::random_clip(20), &mut rng).unwrap();
        assert_eq!(frames, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn random_seek_rejects_zero_stride() {
        let index = index(12, 6);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            sample(&index, &SamplingPolicy::RandomSeek { count: 2, stride: 0 }, &mut rng),
            Err(GopseekError::InvalidRequest(_))
        ));
    }
}
