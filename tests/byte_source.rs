//! Demuxing through caller-provided byte sources.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`.

use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use gopseek::{
    ByteSource, Deadline, ExtractOptions, FileSource, GopseekError, VideoHandle,
    decode_by_frame_numbers,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn fixture_available() -> bool {
    Path::new(SAMPLE_VIDEO).exists()
}

/// Wraps the fixture file, counting reads and optionally stalling each one.
struct ThrottledSource {
    inner: FileSource,
    delay: Duration,
    stalled: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl ThrottledSource {
    fn new(delay: Duration) -> Self {
        Self {
            inner: FileSource::open(SAMPLE_VIDEO).expect("Failed to open fixture"),
            delay,
            stalled: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ByteSource for ThrottledSource {
    fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    fn read_range(
        &mut self,
        offset: u64,
        length: usize,
        deadline: &Deadline,
    ) -> Result<Vec<u8>, GopseekError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.stalled.load(Ordering::Relaxed) {
            thread::sleep(self.delay);
        }
        self.inner.read_range(offset, length, deadline)
    }
}

#[test]
fn every_byte_comes_from_the_source() {
    if !fixture_available() {
        return;
    }

    let source = ThrottledSource::new(Duration::ZERO);
    let reads = Arc::clone(&source.reads);
    let mut handle = VideoHandle::from_source(source, SAMPLE_VIDEO, ExtractOptions::default())
        .expect("Failed to open byte source");
    let opened_after = reads.load(Ordering::Relaxed);
    assert!(opened_after > 0);

    let batch = handle.decode_frame_numbers(&[0, 75, 149]).expect("Failed to decode frames");
    assert!(reads.load(Ordering::Relaxed) > opened_after);

    let expected = decode_by_frame_numbers(SAMPLE_VIDEO, &[0, 75, 149], &ExtractOptions::default())
        .expect("Failed to decode frames from path");
    assert_eq!(batch.as_bytes(), expected.as_bytes());
}

#[test]
fn stalled_source_times_out_decoding() {
    if !fixture_available() {
        return;
    }

    let source = ThrottledSource::new(Duration::from_millis(300));
    let stalled = Arc::clone(&source.stalled);
    let mut handle = VideoHandle::from_source(source, SAMPLE_VIDEO, ExtractOptions::default())
        .expect("Failed to open byte source");

    handle.set_options(ExtractOptions::new().with_timeout(Duration::from_millis(100)));
    stalled.store(true, Ordering::Relaxed);

    let started = Instant::now();
    let result = handle.decode_frame_numbers(&[0, 75, 149]);
    match result {
        Err(error) => assert!(error.is_timeout(), "expected a timeout, got {error}"),
        Ok(batch) => panic!("stalled source produced {} frames", batch.len()),
    }
    assert!(handle.last_stats().is_none());
    // One stalled read, not one per remaining packet.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn stalled_source_times_out_opening() {
    if !fixture_available() {
        return;
    }

    let source = ThrottledSource::new(Duration::from_millis(300));
    source.stalled.store(true, Ordering::Relaxed);
    let options = ExtractOptions::new().with_timeout(Duration::from_millis(100));

    let result = VideoHandle::from_source(source, SAMPLE_VIDEO, options);
    assert!(matches!(result, Err(GopseekError::Timeout { .. })));
}
