//! Luma/chroma to RGBA conversion.
//!
//! A frame is first packed into an NV21 buffer (full luma plane followed by
//! interleaved V/U samples at quarter resolution), honoring each plane's row
//! and pixel strides and the frame crop. The packed buffer is then expanded to
//! RGBA with full-range BT.601 coefficients:
//! - R = Y + 1.402 * (V - 128)
//! - G = Y - 0.344 * (U - 128) - 0.714 * (V - 128)
//! - B = Y + 1.772 * (U - 128)
//!
//! Everything here is a free function; callers own all buffers.

use anyhow::{anyhow, Result};

use crate::frame::{Bitmap, BitmapFormat, Frame};
use crate::geometry::{Rect, Size};

const NEUTRAL_CHROMA: u8 = 128;

/// Dimensions of a packed NV21 buffer derived from a luma crop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nv21Layout {
    pub width: usize,
    pub height: usize,
    pub chroma_width: usize,
    pub chroma_height: usize,
}

impl Nv21Layout {
    pub fn for_crop(crop: Rect) -> Self {
        let chroma = crop.halved();
        Self {
            width: crop.width() as usize,
            height: crop.height() as usize,
            chroma_width: chroma.width() as usize,
            chroma_height: chroma.height() as usize,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Total packed length in bytes.
    pub fn len(&self) -> usize {
        self.pixel_count() + 2 * self.chroma_width * self.chroma_height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Length of the NV21 buffer needed for `crop`.
pub fn nv21_len(crop: Rect) -> usize {
    Nv21Layout::for_crop(crop).len()
}

/// Pack the cropped region of `frame` into `out` as NV21.
///
/// `out` must hold at least `Nv21Layout::for_crop(frame.crop()).len()` bytes.
/// Planes past index 2 are ignored. A luma-only frame gets neutral chroma.
pub fn image_to_nv21(frame: &Frame, out: &mut [u8]) -> Result<()> {
    let crop = frame.crop();
    let layout = Nv21Layout::for_crop(crop);
    let pixel_count = layout.pixel_count();
    if out.len() < layout.len() {
        return Err(anyhow!(
            "NV21 output too small: need {}, got {}",
            layout.len(),
            out.len()
        ));
    }

    let planes = frame.planes();
    if planes.is_empty() {
        return Err(anyhow!("frame has no planes"));
    }
    if planes.len() < 3 {
        out[pixel_count..layout.len()].fill(NEUTRAL_CHROMA);
    }

    for (index, plane) in planes.iter().enumerate().take(3) {
        let (output_stride, mut output_offset) = match index {
            0 => (1, 0),
            1 => (2, pixel_count + 1),
            _ => (2, pixel_count),
        };

        let plane_crop = if index == 0 { crop } else { crop.halved() };
        let plane_width = plane_crop.width() as usize;
        let plane_height = plane_crop.height() as usize;
        if plane_width == 0 || plane_height == 0 {
            continue;
        }

        let row_stride = plane.row_stride();
        let pixel_stride = plane.pixel_stride();
        let contiguous = pixel_stride == 1 && output_stride == 1;
        // The last row of a strided plane may stop right after its final sample.
        let row_length = if contiguous {
            plane_width
        } else {
            (plane_width - 1) * pixel_stride + 1
        };

        let data = plane.data();
        for row in 0..plane_height {
            let start = (row + plane_crop.top as usize) * row_stride
                + plane_crop.left as usize * pixel_stride;
            let src = data.get(start..start + row_length).ok_or_else(|| {
                anyhow!(
                    "plane {} too short: row {} needs bytes {}..{}, plane has {}",
                    index,
                    row,
                    start,
                    start + row_length,
                    data.len()
                )
            })?;
            if contiguous {
                out[output_offset..output_offset + row_length].copy_from_slice(src);
                output_offset += row_length;
            } else {
                for col in 0..plane_width {
                    out[output_offset] = src[col * pixel_stride];
                    output_offset += output_stride;
                }
            }
        }
    }

    Ok(())
}

/// Expand a packed NV21 buffer into interleaved RGBA (alpha 255).
pub fn nv21_to_rgba(nv21: &[u8], layout: Nv21Layout, out: &mut [u8]) -> Result<()> {
    if nv21.len() < layout.len() {
        return Err(anyhow!(
            "NV21 length mismatch: expected {}, got {}",
            layout.len(),
            nv21.len()
        ));
    }
    let pixel_count = layout.pixel_count();
    if out.len() != pixel_count * 4 {
        return Err(anyhow!(
            "RGBA output length mismatch: expected {}, got {}",
            pixel_count * 4,
            out.len()
        ));
    }

    let has_chroma = layout.chroma_width > 0 && layout.chroma_height > 0;
    for j in 0..layout.height {
        for i in 0..layout.width {
            let y = nv21[j * layout.width + i] as f32;
            let (u, v) = if has_chroma {
                // Indexed from the halved crop origin, as the packed NV21 buffer is laid out.
                let cj = (j / 2).min(layout.chroma_height - 1);
                let ci = (i / 2).min(layout.chroma_width - 1);
                let uv_index = pixel_count + (cj * layout.chroma_width + ci) * 2;
                (nv21[uv_index + 1] as f32 - 128.0, nv21[uv_index] as f32 - 128.0)
            } else {
                (0.0, 0.0)
            };

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * layout.width + i) * 4;
            out[offset] = clamp_to_u8(r);
            out[offset + 1] = clamp_to_u8(g);
            out[offset + 2] = clamp_to_u8(b);
            out[offset + 3] = 255;
        }
    }
    Ok(())
}

/// Convert `frame` into the caller-supplied RGBA `output`, using `scratch` for
/// the packed intermediate. `output` must match the crop size.
pub fn yuv_to_rgb_into(frame: &Frame, scratch: &mut Vec<u8>, output: &mut Bitmap) -> Result<()> {
    let crop_size = frame.crop().size();
    if output.format() != BitmapFormat::Rgba8888 {
        return Err(anyhow!("output bitmap must be RGBA, got {:?}", output.format()));
    }
    if output.size() != crop_size {
        return Err(anyhow!(
            "output bitmap is {}, frame crop is {}",
            output.size(),
            crop_size
        ));
    }

    let layout = Nv21Layout::for_crop(frame.crop());
    scratch.clear();
    scratch.resize(layout.len(), 0);
    image_to_nv21(frame, scratch)?;
    nv21_to_rgba(scratch, layout, output.as_bytes_mut())
}

/// Convert `frame` into the caller-supplied RGBA `output`.
pub fn yuv_to_rgb(frame: &Frame, output: &mut Bitmap) -> Result<()> {
    let mut scratch = Vec::new();
    yuv_to_rgb_into(frame, &mut scratch, output)
}

/// Convert `frame` into a fresh RGBA bitmap the size of its crop.
pub fn convert(frame: &Frame) -> Result<Bitmap> {
    let Size { width, height } = frame.crop().size();
    let mut output = Bitmap::new(width, height);
    yuv_to_rgb(frame, &mut output)?;
    Ok(output)
}

/// Forward full-range BT.601 transform, the inverse of the decoder above.
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
    (clamp_to_u8(y), clamp_to_u8(u), clamp_to_u8(v))
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
