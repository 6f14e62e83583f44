//! Decoded frame containers.

use std::collections::HashMap;

use image::RgbImage;

use crate::conversion::CHANNELS;
use crate::error::GopseekError;

/// One decoded frame as tightly-packed RGB24 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedFrame {
    pub(crate) fn from_parts(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * CHANNELS);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major `height x width x 3` bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Copy into an [`RgbImage`].
    pub fn to_image(&self) -> Result<RgbImage, GopseekError> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(|| {
            GopseekError::DecodeError(format!(
                "{} bytes do not form a {}x{} RGB image",
                self.pixels.len(),
                self.width,
                self.height
            ))
        })
    }
}

/// The result of one extraction: `N` frames of identical size stored as a
/// single contiguous `N x H x W x 3` buffer, in request order.
///
/// ```no_run
/// use gopseek::{ExtractOptions, decode_by_frame_numbers};
///
/// let batch = decode_by_frame_numbers("input.mp4", &[0, 30, 30], &ExtractOptions::default())?;
/// let [count, height, width, channels] = batch.shape();
/// assert_eq!((count, channels), (3, 3));
/// assert_eq!(batch.as_bytes().len(), count * height * width * channels);
/// # Ok::<(), gopseek::GopseekError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBatch {
    data: Vec<u8>,
    width: u32,
    height: u32,
    frame_numbers: Vec<u64>,
}

impl FrameBatch {
    /// Lay out `order` by looking each frame number up in `decoded`.
    /// Repeated frame numbers copy the same pixels.
    pub(crate) fn assemble(
        width: u32,
        height: u32,
        order: &[u64],
        decoded: &HashMap<u64, DecodedFrame>,
    ) -> Result<Self, GopseekError> {
        let frame_size = width as usize * height as usize * CHANNELS;
        let mut data = Vec::with_capacity(frame_size * order.len());
        for &frame_number in order {
            let frame = decoded.get(&frame_number).ok_or_else(|| {
                GopseekError::DecodeError(format!("frame {frame_number} was never decoded"))
            })?;
            if frame.pixels.len() != frame_size {
                return Err(GopseekError::DecodeError(format!(
                    "frame {frame_number} is {}x{}, batch is {width}x{height}",
                    frame.width, frame.height
                )));
            }
            data.extend_from_slice(&frame.pixels);
        }
        Ok(Self {
            data,
            width,
            height,
            frame_numbers: order.to_vec(),
        })
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frame_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_numbers.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `[frames, height, width, channels]`.
    pub fn shape(&self) -> [usize; 4] {
        [self.len(), self.height as usize, self.width as usize, CHANNELS]
    }

    /// Bytes occupied by one frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    /// Absolute frame number of each entry, in output order.
    pub fn frame_numbers(&self) -> &[u64] {
        &self.frame_numbers
    }

    /// Pixels of the `position`-th frame.
    pub fn frame(&self, position: usize) -> Option<&[u8]> {
        let size = self.frame_size();
        let start = position.checked_mul(size)?;
        self.data.get(start..start + size)
    }

    pub fn frames(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.len()).filter_map(move |position| self.frame(position))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the batch, returning `(data, width, height)`.
    pub fn into_parts(self) -> (Vec<u8>, u32, u32) {
        (self.data, self.width, self.height)
    }

    /// Copy every frame into its own [`RgbImage`].
    pub fn to_images(&self) -> Result<Vec<RgbImage>, GopseekError> {
        self.frames()
            .map(|pixels| {
                RgbImage::from_raw(self.width, self.height, pixels.to_vec()).ok_or_else(|| {
                    GopseekError::DecodeError("batch buffer is truncated".to_string())
                })
            })
            .collect()
    }
}
