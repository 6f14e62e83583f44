//! Resizing and pixel-format conversion of decoded frames.
//!
//! Every frame leaving the engine is packed RGB24 at one fixed size per
//! call. [`OutputSize`] picks that size from the stream's native
//! dimensions; [`FrameConverter`] applies it with a single swscale
//! configuration so frames of one batch are directly comparable.

use ffmpeg_next::{
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};

use crate::batch::DecodedFrame;
use crate::error::GopseekError;

/// Bytes per pixel of the output layout.
pub const CHANNELS: usize = 3;

/// Target dimensions for decoded frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum OutputSize {
    /// Keep the stream's native width and height.
    #[default]
    Native,
    /// Resize every frame to exactly this size.
    Exact {
        /// Output width in pixels.
        width: u32,
        /// Output height in pixels.
        height: u32,
    },
    /// Scale so the shorter side equals this value, preserving aspect
    /// ratio (the longer side is rounded down).
    ShorterSide(u32),
}

impl OutputSize {
    /// Resolve to `(width, height)` for a source of the given size.
    ///
    /// # Errors
    ///
    /// [`GopseekError::InvalidRequest`] for zero target dimensions,
    /// [`GopseekError::CorruptStream`] for a zero-sized source.
    ///
    /// ```
    /// use gopseek::OutputSize;
    ///
    /// assert_eq!(OutputSize::ShorterSide(256).resolve(1920, 1080).unwrap(), (455, 256));
    /// assert_eq!(OutputSize::ShorterSide(256).resolve(540, 964).unwrap(), (256, 457));
    /// ```
    pub fn resolve(self, source_width: u32, source_height: u32) -> Result<(u32, u32), GopseekError> {
        if source_width == 0 || source_height == 0 {
            return Err(GopseekError::CorruptStream(format!(
                "video stream reports a {source_width}x{source_height} picture"
            )));
        }
        match self {
            OutputSize::Native => Ok((source_width, source_height)),
            OutputSize::Exact { width, height } => {
                if width == 0 || height == 0 {
                    return Err(GopseekError::InvalidRequest(format!(
                        "output size {width}x{height} has a zero dimension"
                    )));
                }
                Ok((width, height))
            }
            OutputSize::ShorterSide(side) => {
                if side == 0 {
                    return Err(GopseekError::InvalidRequest(
                        "shorter side must be greater than zero".to_string(),
                    ));
                }
                let scale = |long: u32, short: u32| {
                    ((u64::from(side) * u64::from(long)) / u64::from(short)).max(1) as u32
                };
                if source_width < source_height {
                    Ok((side, scale(source_height, source_width)))
                } else {
                    Ok((scale(source_width, source_height), side))
                }
            }
        }
    }
}

struct CachedScaler {
    format: Pixel,
    width: u32,
    height: u32,
    context: ScalingContext,
}

/// Converts decoded frames of any pixel format to packed RGB24 at a fixed
/// size.
///
/// The swscale context is rebuilt only when the source format or size
/// changes, so a stream that switches resolution mid-way still yields
/// frames of the configured size.
pub struct FrameConverter {
    width: u32,
    height: u32,
    scaler: Option<CachedScaler>,
}

impl FrameConverter {
    /// A converter producing `width` x `height` frames.
    pub fn new(width: u32, height: u32) -> Result<Self, GopseekError> {
        if width == 0 || height == 0 {
            return Err(GopseekError::InvalidRequest(format!(
                "output size {width}x{height} has a zero dimension"
            )));
        }
        Ok(Self {
            width,
            height,
            scaler: None,
        })
    }

    /// A converter for a source of the given native size.
    pub fn for_source(
        size: OutputSize,
        source_width: u32,
        source_height: u32,
    ) -> Result<Self, GopseekError> {
        let (width, height) = size.resolve(source_width, source_height)?;
        Self::new(width, height)
    }

    /// Output `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Convert one decoded frame.
    pub fn convert(&mut self, frame: &VideoFrame) -> Result<DecodedFrame, GopseekError> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        if format == Pixel::None || width == 0 || height == 0 {
            return Err(GopseekError::DecodeError(
                "decoded frame carries no picture".to_string(),
            ));
        }

        if format == Pixel::RGB24 && (width, height) == (self.width, self.height) {
            let pixels = frame_to_buffer(frame, width, height, CHANNELS);
            return Ok(DecodedFrame::from_parts(width, height, pixels));
        }

        let mut scaler = match self.scaler.take() {
            Some(cached)
                if cached.format == format && cached.width == width && cached.height == height =>
            {
                cached
            }
            _ => {
                log::debug!(
                    "Building scaler {format:?} {width}x{height} -> RGB24 {}x{}",
                    self.width,
                    self.height
                );
                let context = ScalingContext::get(
                    format,
                    width,
                    height,
                    Pixel::RGB24,
                    self.width,
                    self.height,
                    ScalingFlags::BILINEAR | ScalingFlags::ACCURATE_RND | ScalingFlags::BITEXACT,
                )
                .map_err(|error| {
                    GopseekError::UnsupportedFormat(format!(
                        "cannot convert {format:?} frames to RGB24: {error}"
                    ))
                })?;
                CachedScaler {
                    format,
                    width,
                    height,
                    context,
                }
            }
        };

        let mut rgb_frame = VideoFrame::empty();
        let result = scaler.context.run(frame, &mut rgb_frame);
        self.scaler = Some(scaler);
        result.map_err(|error| {
            GopseekError::DecodeError(format!("pixel conversion failed: {error}"))
        })?;

        let pixels = frame_to_buffer(&rgb_frame, self.width, self.height, CHANNELS);
        Ok(DecodedFrame::from_parts(self.width, self.height, pixels))
    }
}

/// Copy plane 0 of a packed frame into a tightly-packed buffer.
///
/// FFmpeg rows are often padded (stride > width * bytes per pixel); the
/// padding is dropped.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = width as usize * bytes_per_pixel;
    let rows = height as usize;
    let data = video_frame.data(0);

    if stride == row_bytes {
        return data[..row_bytes * rows].to_vec();
    }
    let mut buffer = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        buffer.extend_from_slice(&data[start..start + row_bytes]);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_frame(format: Pixel, width: u32, height: u32, value: u8) -> VideoFrame {
        let mut frame = VideoFrame::new(format, width, height);
        frame.data_mut(0).fill(value);
        frame
    }

    #[test]
    fn native_size_keeps_source() {
        assert_eq!(OutputSize::Native.resolve(640, 360).unwrap(), (640, 360));
    }

    #[test]
    fn shorter_side_matches_integer_scaling() {
        // Portrait: width is the shorter side.
        assert_eq!(OutputSize::ShorterSide(128).resolve(360, 640).unwrap(), (128, 227));
        // Square sources scale both sides.
        assert_eq!(OutputSize::ShorterSide(64).resolve(100, 100).unwrap(), (64, 64));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(matches!(
            OutputSize::Exact { width: 0, height: 10 }.resolve(10, 10),
            Err(GopseekError::InvalidRequest(_))
        ));
        assert!(matches!(
            OutputSize::ShorterSide(0).resolve(10, 10),
            Err(GopseekError::InvalidRequest(_))
        ));
        assert!(matches!(
            OutputSize::Native.resolve(0, 10),
            Err(GopseekError::CorruptStream(_))
        ));
    }

    #[test]
    fn rgb_at_target_size_is_copied_verbatim() {
        let mut converter = FrameConverter::new(6, 4).unwrap();
        let frame = filled_frame(Pixel::RGB24, 6, 4, 77);
        let decoded = converter.convert(&frame).unwrap();
        assert_eq!(decoded.pixels().len(), 6 * 4 * 3);
        assert!(decoded.pixels().iter().all(|&byte| byte == 77));
    }

    #[test]
    fn resize_produces_exact_buffer_size() {
        let mut converter =
            FrameConverter::for_source(OutputSize::Exact { width: 224, height: 224 }, 320, 240)
                .unwrap();
        let decoded = converter.convert(&filled_frame(Pixel::RGB24, 320, 240, 10)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (224, 224));
        assert_eq!(decoded.pixels().len(), 224 * 224 * 3);

        // A resolution change mid-stream still yields the configured size.
        let decoded = converter.convert(&filled_frame(Pixel::RGB24, 160, 120, 10)).unwrap();
        assert_eq!(decoded.pixels().len(), 224 * 224 * 3);
    }

    #[test]
    fn single_and_four_channel_sources_become_rgb() {
        let mut converter = FrameConverter::new(8, 8).unwrap();

        let gray = converter.convert(&filled_frame(Pixel::GRAY8, 8, 8, 128)).unwrap();
        assert_eq!(gray.pixels().len(), 8 * 8 * 3);
        for pixel in gray.pixels().chunks_exact(3) {
            assert!(pixel[0].abs_diff(pixel[1]) <= 2);
            assert!(pixel[1].abs_diff(pixel[2]) <= 2);
        }

        let rgba = converter.convert(&filled_frame(Pixel::RGBA, 8, 8, 200)).unwrap();
        assert_eq!(rgba.pixels().len(), 8 * 8 * 3);
    }

    #[test]
    fn conversion_is_deterministic() {
        let mut first = FrameConverter::new(50, 30).unwrap();
        let mut second = FrameConverter::new(50, 30).unwrap();
        let mut frame = VideoFrame::new(Pixel::RGB24, 97, 61);
        for (i, byte) in frame.data_mut(0).iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        assert_eq!(
            first.convert(&frame).unwrap(),
            second.convert(&frame).unwrap()
        );
    }
}
