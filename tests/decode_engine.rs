//! Decode engine integration tests against synthetic frame sources.
//!
//! These run without any fixture: each source fabricates solid-colour RGB
//! frames whose first byte and timestamp both equal the frame number, and
//! records every seek it receives.

use std::{thread, time::Duration};

use ffmpeg_next::{Rational, format::Pixel, frame::Video as VideoFrame};
use gopseek::{
    CancellationToken, ContainerIndex, Deadline, FrameConverter, FrameSource, GopseekError,
    OutputSize, PacketRecord, SeekMode, SeekPoint, SeekTarget, Stage, decode_frames,
};

const WIDTH: u32 = 32;
const HEIGHT: u32 = 24;

struct CountingSource {
    total: u64,
    gop: u64,
    cursor: u64,
    with_timestamps: bool,
    frame_delay: Duration,
    cancel_after: Option<(u64, CancellationToken)>,
    seeks: Vec<SeekTarget>,
    decoded: u64,
}

impl CountingSource {
    fn new(total: u64, gop: u64) -> Self {
        Self {
            total,
            gop,
            cursor: 0,
            with_timestamps: true,
            frame_delay: Duration::ZERO,
            cancel_after: None,
            seeks: Vec::new(),
            decoded: 0,
        }
    }

    fn index(&self) -> ContainerIndex {
        let with_timestamps = self.with_timestamps;
        let gop = self.gop;
        let packets = (0..self.total).map(move |n| PacketRecord {
            timestamp: with_timestamps.then_some(n as i64 * 512),
            position: Some(n * 4096),
            is_key: n % gop == 0,
        });
        ContainerIndex::from_packets(packets, Rational::new(1, 15360))
            .expect("Failed to build synthetic index")
    }
}

impl FrameSource for CountingSource {
    fn seek(&mut self, point: &SeekPoint, deadline: &Deadline) -> Result<(), GopseekError> {
        deadline.check(Stage::Seek)?;
        self.seeks.push(point.target);
        self.cursor = match point.target {
            SeekTarget::StreamStart => 0,
            SeekTarget::Keyframe(ts) => ts as u64 / 512,
            SeekTarget::Timestamp(ts) => (ts as u64 / 512 / self.gop) * self.gop,
        };
        Ok(())
    }

    fn next_frame(&mut self, deadline: &Deadline) -> Result<Option<VideoFrame>, GopseekError> {
        deadline.check(Stage::Decode)?;
        if self.cursor >= self.total {
            return Ok(None);
        }
        if !self.frame_delay.is_zero() {
            thread::sleep(self.frame_delay);
        }
        if let Some((after, token)) = &self.cancel_after {
            if self.decoded >= *after {
                token.cancel();
            }
        }

        let mut frame = VideoFrame::new(Pixel::RGB24, WIDTH, HEIGHT);
        frame.data_mut(0).fill(self.cursor as u8);
        if self.with_timestamps {
            frame.set_pts(Some(self.cursor as i64 * 512));
        }
        self.cursor += 1;
        self.decoded += 1;
        Ok(Some(frame))
    }
}

fn native_converter() -> FrameConverter {
    FrameConverter::new(WIDTH, HEIGHT).expect("Failed to create converter")
}

fn first_bytes(batch: &gopseek::FrameBatch) -> Vec<u8> {
    batch.frames().map(|pixels| pixels[0]).collect()
}

// ── Ordering ───────────────────────────────────────────────────────

#[test]
fn unsorted_targets_with_duplicates_keep_request_order() {
    let mut source = CountingSource::new(120, 30);
    let index = source.index();
    let targets = [95, 3, 61, 3, 30, 95];

    for mode in [SeekMode::Keyframe, SeekMode::Nearest] {
        let (batch, _) = decode_frames(
            &mut source,
            &index,
            &targets,
            mode,
            &mut native_converter(),
            &Deadline::unbounded(),
        )
        .expect("decode failed");

        assert_eq!(batch.len(), targets.len());
        assert_eq!(first_bytes(&batch), vec![95, 3, 61, 3, 30, 95]);
        assert_eq!(batch.frame(1), batch.frame(3));
        assert_eq!(
            batch.as_bytes().len(),
            targets.len() * WIDTH as usize * HEIGHT as usize * 3
        );
    }
}

// ── Seek minimisation ──────────────────────────────────────────────

#[test]
fn seeks_equal_distinct_gops() {
    let mut source = CountingSource::new(300, 30);
    let index = source.index();
    // GOPs 1, 1, 1, 4, 9, 9.
    let targets = [31, 45, 59, 120, 299, 270];

    let (_, stats) = decode_frames(
        &mut source,
        &index,
        &targets,
        SeekMode::Keyframe,
        &mut native_converter(),
        &Deadline::unbounded(),
    )
    .expect("decode failed");

    assert_eq!(stats.groups, 3);
    assert_eq!(stats.seeks, 3);
    assert_eq!(stats.retries, 0);
    assert_eq!(
        source.seeks,
        vec![
            SeekTarget::Keyframe(30 * 512),
            SeekTarget::Keyframe(120 * 512),
            SeekTarget::Keyframe(270 * 512),
        ]
    );
    // 29 frames into GOP 1, one keyframe, then the whole of GOP 9.
    assert_eq!(stats.frames_decoded, 30 + 1 + 30);
    assert_eq!(stats.frames_converted, 6);
}

#[test]
fn first_gop_is_reached_from_stream_start() {
    let mut source = CountingSource::new(60, 30);
    let index = source.index();
    decode_frames(
        &mut source,
        &index,
        &[7],
        SeekMode::Nearest,
        &mut native_converter(),
        &Deadline::unbounded(),
    )
    .expect("decode failed");
    assert_eq!(source.seeks, vec![SeekTarget::StreamStart]);
}

#[test]
fn streams_without_timestamps_count_frames() {
    let mut source = CountingSource::new(90, 30);
    source.with_timestamps = false;
    let index = source.index();
    assert!(!index.has_timestamps());

    let (batch, stats) = decode_frames(
        &mut source,
        &index,
        &[75, 12],
        SeekMode::Keyframe,
        &mut native_converter(),
        &Deadline::unbounded(),
    )
    .expect("decode failed");

    assert_eq!(first_bytes(&batch), vec![75, 12]);
    assert!(source.seeks.iter().all(|target| *target == SeekTarget::StreamStart));
    assert_eq!(stats.seeks, 2);
}

// ── Resizing ───────────────────────────────────────────────────────

#[test]
fn every_frame_is_resized_to_the_target() {
    let mut source = CountingSource::new(60, 30);
    let index = source.index();
    let mut converter = FrameConverter::for_source(
        OutputSize::Exact {
            width: 224,
            height: 224,
        },
        WIDTH,
        HEIGHT,
    )
    .expect("Failed to create converter");

    let (batch, _) = decode_frames(
        &mut source,
        &index,
        &[0, 40, 59],
        SeekMode::Nearest,
        &mut converter,
        &Deadline::unbounded(),
    )
    .expect("decode failed");

    assert_eq!(batch.shape(), [3, 224, 224, 3]);
    assert_eq!(batch.as_bytes().len(), 3 * 224 * 224 * 3);
    // A solid frame stays (nearly) solid through bilinear scaling.
    let frame = batch.frame(1).expect("second frame");
    assert!(frame.iter().all(|&byte| byte.abs_diff(40) <= 3));
}

// ── Deadlines ──────────────────────────────────────────────────────

#[test]
fn slow_source_times_out_without_partial_output() {
    let mut source = CountingSource::new(1_000, 1_000);
    source.frame_delay = Duration::from_millis(5);
    let index = source.index();

    let result = decode_frames(
        &mut source,
        &index,
        &[0, 900],
        SeekMode::Keyframe,
        &mut native_converter(),
        &Deadline::after(Duration::from_millis(50)),
    );

    match result {
        Err(GopseekError::Timeout { stage, budget, elapsed }) => {
            assert_eq!(stage, Stage::Decode);
            assert_eq!(budget, Duration::from_millis(50));
            assert!(elapsed >= budget);
        }
        other => panic!("expected Timeout, got {:?}", other.map(|(batch, _)| batch.len())),
    }
    assert!(source.decoded < 900, "decoding should stop early");
}

#[test]
fn cancellation_mid_decode() {
    let token = CancellationToken::new();
    let mut source = CountingSource::new(200, 200);
    source.cancel_after = Some((10, token.clone()));
    let index = source.index();

    let result = decode_frames(
        &mut source,
        &index,
        &[150],
        SeekMode::Keyframe,
        &mut native_converter(),
        &Deadline::unbounded().with_cancellation(token),
    );
    assert!(matches!(result, Err(GopseekError::Cancelled)));
    assert!(source.decoded <= 12);
}

#[test]
fn repeated_decodes_are_identical() {
    let mut source = CountingSource::new(90, 15);
    let index = source.index();
    let mut decode = |targets: &[i64]| {
        decode_frames(
            &mut source,
            &index,
            targets,
            SeekMode::Nearest,
            &mut native_converter(),
            &Deadline::unbounded(),
        )
        .expect("decode failed")
        .0
    };
    let first = decode(&[88, 1, 44]);
    let second = decode(&[88, 1, 44]);
    assert_eq!(first, second);
}
