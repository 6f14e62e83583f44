//! Frame and GOP counting integration tests.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`:
//! 150 frames at 30 fps with a keyframe every 30 frames.

use std::path::Path;

use gopseek::{ExtractOptions, VideoHandle, frame_count, gop_count};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const SAMPLE_MKV: &str = "tests/fixtures/sample_video.mkv";

#[test]
fn counts_match_the_encoding() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let options = ExtractOptions::default();
    assert_eq!(frame_count(SAMPLE_VIDEO, &options).expect("frame count"), 150);
    assert_eq!(gop_count(SAMPLE_VIDEO, &options).expect("gop count"), 5);
}

#[test]
fn counts_are_idempotent() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let options = ExtractOptions::default();
    let first = frame_count(SAMPLE_VIDEO, &options).expect("frame count");
    let second = frame_count(SAMPLE_VIDEO, &options).expect("frame count");
    assert_eq!(first, second);
}

#[test]
fn keyframes_start_each_gop() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut handle = VideoHandle::open(SAMPLE_VIDEO, ExtractOptions::default()).expect("open");
    let index = handle.index().expect("index");

    let keyframe_numbers: Vec<u64> = index
        .keyframes()
        .iter()
        .map(|keyframe| keyframe.frame_number)
        .collect();
    assert_eq!(keyframe_numbers, vec![0, 30, 60, 90, 120]);
    assert!(index.has_timestamps());
    assert_eq!(index.gop_frames(4), Some(120..150));
    assert!(
        index
            .keyframes()
            .windows(2)
            .all(|pair| pair[0].position < pair[1].position),
        "keyframe positions should increase"
    );
}

#[test]
fn metadata_estimates_agree_with_scan() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut handle = VideoHandle::open(SAMPLE_VIDEO, ExtractOptions::default()).expect("open");
    let metadata = handle.metadata().clone();
    assert_eq!((metadata.width, metadata.height), (320, 240));
    assert!((metadata.frames_per_second - 30.0).abs() < 0.01);
    assert_eq!(metadata.codec, "h264");
    assert_eq!(metadata.estimated_frame_count, handle.frame_count().expect("count"));
}

#[test]
fn matroska_counts_match_mp4() {
    if !Path::new(SAMPLE_VIDEO).exists() || !Path::new(SAMPLE_MKV).exists() {
        return;
    }

    let options = ExtractOptions::default();
    assert_eq!(
        frame_count(SAMPLE_MKV, &options).expect("mkv frame count"),
        frame_count(SAMPLE_VIDEO, &options).expect("mp4 frame count"),
    );
    assert_eq!(
        gop_count(SAMPLE_MKV, &options).expect("mkv gop count"),
        gop_count(SAMPLE_VIDEO, &options).expect("mp4 gop count"),
    );
}

#[test]
fn file_urls_are_local_paths() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let absolute = std::fs::canonicalize(SAMPLE_VIDEO).expect("canonicalize");
    let url = format!("file://{}", absolute.display());
    assert_eq!(
        frame_count(url.as_str(), &ExtractOptions::default()).expect("frame count"),
        150
    );
}
