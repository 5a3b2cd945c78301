//! Frame and bitmap containers.
//!
//! - `Frame`: one captured multi-plane luma/chroma buffer. Not `Clone`; the
//!   capture pipeline owns it until conversion and drops it right after.
//! - `Bitmap`: interleaved raster produced by conversion and consumed by the
//!   classifier and the display layer.

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::geometry::{Rect, Size};

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One plane of a frame. `row_stride` is the distance in bytes between rows,
/// `pixel_stride` the distance between horizontally adjacent samples.
#[derive(Debug)]
pub struct Plane {
    data: Vec<u8>,
    row_stride: usize,
    pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride: pixel_stride.max(1),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }
}

/// Captured sensor frame in a 4:2:0 luma/chroma layout.
///
/// Plane 0 is luma, planes 1 and 2 are the U and V chroma planes. Additional
/// planes are carried but ignored by conversion.
#[derive(Debug)]
pub struct Frame {
    planes: Vec<Plane>,
    size: Size,
    crop: Rect,
    timestamp: Duration,
    sequence: u64,
}

// Explicitly NOT implementing Clone: a frame is released exactly once.

impl Frame {
    /// Build a frame whose crop covers the full `size`.
    pub fn new(size: Size, planes: Vec<Plane>, timestamp: Duration, sequence: u64) -> Self {
        Self {
            planes,
            size,
            crop: Rect::of_size(size),
            timestamp,
            sequence,
        }
    }

    /// Build a frame from a contiguous I420 buffer (Y, then U, then V, all
    /// with pixel stride 1).
    pub fn from_i420(size: Size, data: &[u8], timestamp: Duration, sequence: u64) -> Result<Self> {
        let w = size.width as usize;
        let h = size.height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        let luma = w * h;
        let chroma = cw * ch;
        if data.len() < luma + 2 * chroma {
            return Err(anyhow!(
                "I420 frame length mismatch: expected {}, got {}",
                luma + 2 * chroma,
                data.len()
            ));
        }
        let planes = vec![
            Plane::new(data[..luma].to_vec(), w, 1),
            Plane::new(data[luma..luma + chroma].to_vec(), cw, 1),
            Plane::new(data[luma + chroma..luma + 2 * chroma].to_vec(), cw, 1),
        ];
        Ok(Self::new(size, planes, timestamp, sequence))
    }

    /// Build a frame from a contiguous NV21 buffer (Y, then interleaved V/U).
    ///
    /// The chroma planes alias one interleaved row layout the way camera HALs
    /// expose semi-planar buffers: both have pixel stride 2, V starts at the
    /// first chroma byte and U at the second.
    pub fn from_nv21(size: Size, data: &[u8], timestamp: Duration, sequence: u64) -> Result<Self> {
        let w = size.width as usize;
        let h = size.height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);
        let luma = w * h;
        let chroma = cw * ch * 2;
        if data.len() < luma + chroma {
            return Err(anyhow!(
                "NV21 frame length mismatch: expected {}, got {}",
                luma + chroma,
                data.len()
            ));
        }
        let vu = &data[luma..luma + chroma];
        let planes = vec![
            Plane::new(data[..luma].to_vec(), w, 1),
            Plane::new(vu[1..].to_vec(), cw * 2, 2),
            Plane::new(vu.to_vec(), cw * 2, 2),
        ];
        Ok(Self::new(size, planes, timestamp, sequence))
    }

    /// Restrict the visible region. The crop must lie inside the frame.
    pub fn with_crop(mut self, crop: Rect) -> Result<Self> {
        if !crop.fits_within(self.size) {
            return Err(anyhow!(
                "crop {:?} does not fit frame {}",
                crop,
                self.size
            ));
        }
        self.crop = crop;
        Ok(self)
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn crop(&self) -> Rect {
        self.crop
    }

    /// Acquisition time relative to the start of the stream.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

// ----------------------------------------------------------------------------
// Bitmap
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitmapFormat {
    /// R, G, B, A byte order.
    Rgba8888,
    /// R, G, B byte order.
    Rgb888,
}

impl BitmapFormat {
    pub fn channels(&self) -> usize {
        match self {
            BitmapFormat::Rgba8888 => 4,
            BitmapFormat::Rgb888 => 3,
        }
    }
}

/// Fixed-size interleaved raster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    format: BitmapFormat,
    data: Vec<u8>,
}

impl Bitmap {
    /// Zeroed RGBA bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    /// RGBA bitmap filled with a single pixel value.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * 4);
        for _ in 0..count {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            format: BitmapFormat::Rgba8888,
            data,
        }
    }

    pub fn from_raw(width: u32, height: u32, format: BitmapFormat, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(format.channels()))
            .ok_or_else(|| anyhow!("bitmap dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "{:?} bitmap length mismatch: expected {}, got {}",
                format,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::from_raw(width, height, BitmapFormat::Rgba8888, data)
    }

    /// Unchecked constructor for callers that computed `data` from the
    /// dimensions themselves.
    pub(crate) fn from_parts(width: u32, height: u32, format: BitmapFormat, data: Vec<u8>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * format.channels()
        );
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn format(&self) -> BitmapFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel at `(x, y)` widened to RGBA. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let channels = self.format.channels();
        let idx = (y as usize * self.width as usize + x as usize) * channels;
        match self.format {
            BitmapFormat::Rgba8888 => [
                self.data[idx],
                self.data[idx + 1],
                self.data[idx + 2],
                self.data[idx + 3],
            ],
            BitmapFormat::Rgb888 => [self.data[idx], self.data[idx + 1], self.data[idx + 2], 255],
        }
    }

    /// Copy into RGBA layout. Already-RGBA bitmaps are cloned.
    pub fn to_rgba(&self) -> Bitmap {
        match self.format {
            BitmapFormat::Rgba8888 => self.clone(),
            BitmapFormat::Rgb888 => {
                let mut data = Vec::with_capacity(self.data.len() / 3 * 4);
                for px in self.data.chunks_exact(3) {
                    data.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                Bitmap {
                    width: self.width,
                    height: self.height,
                    format: BitmapFormat::Rgba8888,
                    data,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i420_frame_splits_planes() -> Result<()> {
        let size = Size::new(4, 2);
        let data: Vec<u8> = (0..12).collect();
        let frame = Frame::from_i420(size, &data, Duration::ZERO, 7)?;
        assert_eq!(frame.planes().len(), 3);
        assert_eq!(frame.planes()[0].data(), &data[..8]);
        assert_eq!(frame.planes()[1].data(), &[8, 9]);
        assert_eq!(frame.planes()[2].data(), &[10, 11]);
        assert_eq!(frame.planes()[1].row_stride(), 2);
        assert_eq!(frame.sequence(), 7);
        Ok(())
    }

    #[test]
    fn i420_frame_rejects_short_buffer() {
        assert!(Frame::from_i420(Size::new(4, 4), &[0u8; 10], Duration::ZERO, 0).is_err());
    }

    #[test]
    fn crop_must_fit() -> Result<()> {
        let frame = Frame::from_i420(Size::new(4, 4), &[0u8; 24], Duration::ZERO, 0)?;
        assert!(frame.with_crop(Rect::new(0, 0, 5, 4)).is_err());
        Ok(())
    }

    #[test]
    fn rgb_bitmap_widens_to_rgba() -> Result<()> {
        let bitmap = Bitmap::from_raw(2, 1, BitmapFormat::Rgb888, vec![1, 2, 3, 4, 5, 6])?;
        let rgba = bitmap.to_rgba();
        assert_eq!(rgba.format(), BitmapFormat::Rgba8888);
        assert_eq!(rgba.as_bytes(), &[1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!(bitmap.pixel(1, 0), [4, 5, 6, 255]);
        Ok(())
    }

    #[test]
    fn bitmap_length_is_validated() {
        assert!(Bitmap::from_rgba(2, 2, vec![0; 15]).is_err());
    }
}
