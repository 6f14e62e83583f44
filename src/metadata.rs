//! Stream metadata.
//!
//! [`VideoMetadata`] is read from the container header when a
//! [`VideoHandle`](crate::VideoHandle) is opened and cached for its
//! lifetime. Nothing here requires a packet scan, so the values are
//! container claims: use [`VideoHandle::frame_count`](crate::VideoHandle::frame_count)
//! for the exact frame count.

use std::time::Duration;

use ffmpeg_next::{codec::decoder, format::stream::Stream};

/// Header-level description of the selected video stream.
///
/// # Example
///
/// ```no_run
/// use gopseek::{ExtractOptions, VideoHandle};
///
/// let handle = VideoHandle::open("input.mp4", ExtractOptions::default())?;
/// let metadata = handle.metadata();
/// println!("{}x{} {} @ {:.2} fps", metadata.width, metadata.height, metadata.codec, metadata.frames_per_second);
/// # Ok::<(), gopseek::GopseekError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Native frame width in pixels.
    pub width: u32,
    /// Native frame height in pixels.
    pub height: u32,
    /// Average frame rate; `0.0` when the container does not declare one.
    pub frames_per_second: f64,
    /// Frame count declared by the container, or duration times frame rate
    /// when it declares none. May differ from the scanned count.
    pub estimated_frame_count: u64,
    /// Codec name (e.g. `"h264"`, `"hevc"`, `"vp9"`).
    pub codec: String,
    /// Decoder pixel format, if known before decoding.
    pub pixel_format: Option<String>,
    /// Index of the video stream inside the container.
    pub stream_index: usize,
    /// Stream duration, falling back to the container duration.
    pub duration: Duration,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format: String,
}

impl VideoMetadata {
    pub(crate) fn describe(
        stream: &Stream<'_>,
        decoder: &decoder::Video,
        container_duration_us: i64,
        format: &str,
    ) -> Self {
        let frames_per_second = rate_to_f64(stream.avg_frame_rate())
            .or_else(|| rate_to_f64(stream.rate()))
            .unwrap_or(0.0);

        let stream_duration = stream.duration();
        let time_base = stream.time_base();
        let duration = if stream_duration > 0 && time_base.denominator() > 0 {
            Duration::from_secs_f64(
                stream_duration as f64 * f64::from(time_base.numerator())
                    / f64::from(time_base.denominator()),
            )
        } else if container_duration_us > 0 {
            Duration::from_micros(container_duration_us as u64)
        } else {
            Duration::ZERO
        };

        let estimated_frame_count = match u64::try_from(stream.frames()) {
            Ok(frames) if frames > 0 => frames,
            _ => (duration.as_secs_f64() * frames_per_second).round() as u64,
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let pixel_format = {
            let name = format!("{:?}", decoder.format());
            if name == "None" { None } else { Some(name) }
        };

        Self {
            width: decoder.width(),
            height: decoder.height(),
            frames_per_second,
            estimated_frame_count,
            codec,
            pixel_format,
            stream_index: stream.index(),
            duration,
            format: format.to_string(),
        }
    }
}

fn rate_to_f64(rate: ffmpeg_next::Rational) -> Option<f64> {
    (rate.numerator() > 0 && rate.denominator() > 0)
        .then(|| f64::from(rate.numerator()) / f64::from(rate.denominator()))
}
