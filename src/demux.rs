//! Container demuxing and video decoding through FFmpeg.
//!
//! The format context is opened by hand rather than through
//! `ffmpeg_next::format::input`: it reads from a [`ByteSource`] through a
//! custom AVIO context, and the interrupt callback is in place before the
//! first byte is read, so probing a stalled URL is bounded by the same
//! deadline as every later read.

use std::ffi::{CString, c_int};
use std::ptr;

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::{context::Context as CodecContext, decoder, threading},
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    util::error::EAGAIN,
};
use ffmpeg_sys_next::{
    AVFormatContext, AVSEEK_FLAG_BACKWARD, av_seek_frame, avformat_alloc_context,
    avformat_close_input, avformat_find_stream_info, avformat_open_input, avformat_seek_file,
};

use crate::avio::SourceIo;
use crate::deadline::Deadline;
use crate::decode::FrameSource;
use crate::error::{GopseekError, Stage};
use crate::index::PacketRecord;
use crate::locate::{SeekPoint, SeekTarget};
use crate::metadata::VideoMetadata;
use crate::source::{self, ByteSource, Locator};

/// An opened container with a decoder for its best video stream.
pub struct Demuxer {
    // Field order is drop order: the format context must be closed before
    // the I/O context it reads through is freed.
    input: Input,
    decoder: decoder::Video,
    stream_index: usize,
    time_base: Rational,
    start_time: Option<i64>,
    metadata: VideoMetadata,
    draining: bool,
    io: SourceIo,
}

impl Demuxer {
    /// Open `locator`, probe the container, and set up a decoder for its
    /// best video stream.
    ///
    /// `decoder_threads` of `None` lets FFmpeg pick a thread count.
    pub fn open(
        locator: &Locator,
        decoder_threads: Option<usize>,
        deadline: &Deadline,
    ) -> Result<Self, GopseekError> {
        crate::ffmpeg::initialize()?;
        let source = source::open(locator, deadline)?;
        Self::from_source(source, locator, decoder_threads, deadline)
    }

    /// Demux the container read from `source`.
    ///
    /// `locator` only names the source in errors and logs, and serves FFmpeg
    /// as a format hint.
    pub fn from_source(
        source: Box<dyn ByteSource>,
        locator: &Locator,
        decoder_threads: Option<usize>,
        deadline: &Deadline,
    ) -> Result<Self, GopseekError> {
        crate::ffmpeg::initialize()?;
        deadline.check(Stage::Open)?;
        if source.size() == Some(0) {
            return Err(GopseekError::CorruptStream(format!("{locator} is empty")));
        }
        log::debug!("Opening container {locator}");

        let mut io = SourceIo::new(source, deadline)?;
        let input = open_input(locator, &mut io, deadline)?;

        let stream = input.streams().best(Type::Video).ok_or_else(|| {
            GopseekError::UnsupportedFormat(format!("{locator} has no video stream"))
        })?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_time = Some(stream.start_time()).filter(|&ts| ts != ffmpeg_sys_next::AV_NOPTS_VALUE);

        let mut codec_context = CodecContext::from_parameters(stream.parameters()).map_err(|error| {
            GopseekError::UnsupportedFormat(format!(
                "cannot read codec parameters of stream {stream_index}: {error}"
            ))
        })?;
        codec_context.set_threading(threading::Config {
            kind: threading::Type::Frame,
            count: decoder_threads.unwrap_or(0),
            ..Default::default()
        });
        let decoder = codec_context.decoder().video().map_err(|error| {
            GopseekError::UnsupportedFormat(format!(
                "no decoder for video stream {stream_index}: {error}"
            ))
        })?;

        let metadata =
            VideoMetadata::describe(&stream, &decoder, input.duration(), input.format().name());
        log::debug!(
            "Selected video stream {stream_index}: {} {}x{}, time base {time_base}",
            metadata.codec,
            metadata.width,
            metadata.height,
        );

        Ok(Self {
            input,
            decoder,
            stream_index,
            time_base,
            start_time,
            metadata,
            draining: false,
            io,
        })
    }

    /// Bind FFmpeg's blocking I/O to `deadline` for the following calls.
    pub fn arm(&self, deadline: &Deadline) {
        self.io.arm(deadline);
    }

    /// Size of the underlying byte source, when known.
    pub fn source_size(&self) -> Option<u64> {
        self.io.source_size()
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Return to the first packet of the container.
    pub fn rewind(&mut self, deadline: &Deadline) -> Result<(), GopseekError> {
        self.arm(deadline);
        deadline.check(Stage::Seek)?;

        let start = self.start_time.unwrap_or(0);
        // SAFETY: the format context is owned by `self.input` and open.
        let status = unsafe {
            avformat_seek_file(
                self.input.as_mut_ptr(),
                self.stream_index as i32,
                i64::MIN,
                start,
                i64::MAX,
                0,
            )
        };
        self.finish_seek(status, start, deadline)
    }

    /// Read the next packet of the video stream without decoding it.
    ///
    /// Returns `Ok(None)` at the end of the container.
    pub fn next_video_packet(
        &mut self,
        deadline: &Deadline,
    ) -> Result<Option<PacketRecord>, GopseekError> {
        Ok(self.read_packet(deadline)?.map(|packet| PacketRecord {
            timestamp: packet.pts().or(packet.dts()),
            position: u64::try_from(packet.position()).ok(),
            is_key: packet.is_key(),
        }))
    }

    fn read_packet(&mut self, deadline: &Deadline) -> Result<Option<Packet>, GopseekError> {
        self.arm(deadline);
        let mut packet = Packet::empty();
        loop {
            deadline.check(Stage::Read)?;
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => return Ok(Some(packet)),
                Ok(()) => continue,
                // A failed read callback can surface as a plain end of file.
                Err(FfmpegError::Eof) => return self.io.take_failure().map_or(Ok(None), Err),
                Err(error) => return Err(self.read_failure(error, deadline)),
            }
        }
    }

    fn read_failure(&mut self, error: FfmpegError, deadline: &Deadline) -> GopseekError {
        if let Some(failure) = self.io.take_failure() {
            return failure;
        }
        if deadline.is_expired() || error == FfmpegError::Exit {
            return deadline.timeout_error(Stage::Read);
        }
        match error {
            FfmpegError::InvalidData => {
                GopseekError::CorruptStream(format!("unreadable packet: {error}"))
            }
            other => GopseekError::Io(std::io::Error::other(other)),
        }
    }

    /// Position the video stream on the keyframe at or before `timestamp`.
    fn seek_stream(&mut self, timestamp: i64, deadline: &Deadline) -> Result<(), GopseekError> {
        self.arm(deadline);
        deadline.check(Stage::Seek)?;

        // SAFETY: the format context is owned by `self.input` and open.
        let status = unsafe {
            av_seek_frame(
                self.input.as_mut_ptr(),
                self.stream_index as i32,
                timestamp,
                AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        self.finish_seek(status, timestamp, deadline)
    }

    /// Let the container pick the closest seekable point at or before
    /// `timestamp`, given in the video stream's time base.
    fn seek_container(&mut self, timestamp: i64, deadline: &Deadline) -> Result<(), GopseekError> {
        self.arm(deadline);
        deadline.check(Stage::Seek)?;

        let microseconds = to_microseconds_floor(timestamp, self.time_base);
        // SAFETY: as in `seek_stream`.
        let status = unsafe {
            avformat_seek_file(self.input.as_mut_ptr(), -1, i64::MIN, microseconds, microseconds, 0)
        };
        self.finish_seek(status, timestamp, deadline)
    }

    fn finish_seek(
        &mut self,
        status: c_int,
        timestamp: i64,
        deadline: &Deadline,
    ) -> Result<(), GopseekError> {
        if status < 0 {
            if let Some(failure) = self.io.take_failure() {
                return Err(failure);
            }
            if deadline.is_expired() {
                return Err(deadline.timeout_error(Stage::Seek));
            }
            return Err(GopseekError::DecodeError(format!(
                "seek to timestamp {timestamp} failed: {}",
                FfmpegError::from(status)
            )));
        }
        if let Some(failure) = self.io.take_failure() {
            return Err(failure);
        }
        self.decoder.flush();
        self.draining = false;
        Ok(())
    }
}

/// Convert a stream timestamp to `AV_TIME_BASE` units, rounding down so a
/// container seek never targets a point after the frame.
fn to_microseconds_floor(timestamp: i64, time_base: Rational) -> i64 {
    let numerator = i128::from(timestamp) * i128::from(time_base.numerator()) * 1_000_000;
    let denominator = i128::from(time_base.denominator()).max(1);
    numerator.div_euclid(denominator).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

impl FrameSource for Demuxer {
    fn seek(&mut self, point: &SeekPoint, deadline: &Deadline) -> Result<(), GopseekError> {
        log::trace!("Seeking to {:?} for frame {}", point.target, point.frame_number);
        match point.target {
            SeekTarget::StreamStart => self.rewind(deadline),
            SeekTarget::Keyframe(timestamp) => self.seek_stream(timestamp, deadline),
            SeekTarget::Timestamp(timestamp) => self.seek_container(timestamp, deadline),
        }
    }

    fn next_frame(&mut self, deadline: &Deadline) -> Result<Option<VideoFrame>, GopseekError> {
        let mut frame = VideoFrame::empty();
        loop {
            deadline.check(Stage::Decode)?;
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(Some(frame)),
                Err(FfmpegError::Eof) => return Ok(None),
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => {}
                Err(error) => {
                    return Err(GopseekError::DecodeError(format!(
                        "decoder rejected frame: {error}"
                    )));
                }
            }
            if self.draining {
                return Ok(None);
            }

            match self.read_packet(deadline)? {
                Some(packet) => self.decoder.send_packet(&packet).map_err(|error| {
                    GopseekError::DecodeError(format!("decoder rejected packet: {error}"))
                })?,
                None => {
                    self.decoder.send_eof().map_err(|error| {
                        GopseekError::DecodeError(format!("failed to drain decoder: {error}"))
                    })?;
                    self.draining = true;
                }
            }
        }
    }
}

fn open_input(
    locator: &Locator,
    io: &mut SourceIo,
    deadline: &Deadline,
) -> Result<Input, GopseekError> {
    let url = CString::new(locator.to_ffmpeg_url()).map_err(|_| {
        GopseekError::SourceUnavailable {
            locator: locator.to_string(),
            reason: "locator contains a NUL byte".to_string(),
        }
    })?;

    // SAFETY: the context is allocated here and either handed to `Input`,
    // which closes it on drop, or closed before returning. The I/O context
    // and the interrupt flag behind the callback belong to `io`, which the
    // caller keeps alive for as long as the `Input`. With a caller-supplied
    // `pb` FFmpeg never frees it.
    unsafe {
        let mut context: *mut AVFormatContext = avformat_alloc_context();
        if context.is_null() {
            return Err(GopseekError::SourceUnavailable {
                locator: locator.to_string(),
                reason: "cannot allocate format context".to_string(),
            });
        }
        (*context).pb = io.as_mut_ptr();
        (*context).interrupt_callback = io.interrupt_callback();

        // On failure FFmpeg frees the context and nulls the pointer.
        let status = avformat_open_input(&mut context, url.as_ptr(), ptr::null(), ptr::null_mut());
        if status < 0 {
            if let Some(failure) = io.take_failure() {
                return Err(failure);
            }
            return Err(open_failure(locator, FfmpegError::from(status), deadline));
        }

        let status = avformat_find_stream_info(context, ptr::null_mut());
        if status < 0 {
            avformat_close_input(&mut context);
            if let Some(failure) = io.take_failure() {
                return Err(failure);
            }
            if deadline.is_expired() {
                return Err(deadline.timeout_error(Stage::Open));
            }
            return Err(GopseekError::CorruptStream(format!(
                "cannot read stream information: {}",
                FfmpegError::from(status)
            )));
        }

        if let Some(failure) = io.take_failure() {
            avformat_close_input(&mut context);
            return Err(failure);
        }

        Ok(Input::wrap(context))
    }
}

fn open_failure(locator: &Locator, error: FfmpegError, deadline: &Deadline) -> GopseekError {
    if deadline.is_expired() || error == FfmpegError::Exit {
        return deadline.timeout_error(Stage::Open);
    }
    match error {
        FfmpegError::InvalidData => {
            GopseekError::UnsupportedFormat(format!("{locator} is not a recognised container"))
        }
        other => GopseekError::SourceUnavailable {
            locator: locator.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microsecond_conversion_rounds_down() {
        assert_eq!(to_microseconds_floor(1, Rational::new(1, 30)), 33_333);
        assert_eq!(to_microseconds_floor(-1, Rational::new(1, 30)), -33_334);
        assert_eq!(to_microseconds_floor(90_000, Rational::new(1, 90_000)), 1_000_000);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let locator = Locator::parse("/nonexistent/clip.mp4");
        let result = Demuxer::open(&locator, None, &Deadline::unbounded());
        assert!(matches!(result, Err(GopseekError::SourceUnavailable { .. })));
    }
}
