//! Bitmap preparation for model input.
//!
//! Order: center-crop to a square, nearest-neighbor resize, rotate
//! counter-clockwise in quarter turns, normalize to `[0, 1]`.

use crate::frame::{Bitmap, BitmapFormat};

use super::backend::{InputSpec, TensorLayout};

/// Largest centered square of `bitmap`.
pub fn crop_center_square(bitmap: &Bitmap) -> Bitmap {
    let side = bitmap.width().min(bitmap.height());
    let left = (bitmap.width() - side) / 2;
    let top = (bitmap.height() - side) / 2;
    let channels = bitmap.format().channels();
    let stride = bitmap.width() as usize * channels;
    let row_len = side as usize * channels;

    let src = bitmap.as_bytes();
    let mut data = Vec::with_capacity(row_len * side as usize);
    for y in top..top + side {
        let start = y as usize * stride + left as usize * channels;
        data.extend_from_slice(&src[start..start + row_len]);
    }
    Bitmap::from_parts(side, side, bitmap.format(), data)
}

/// Nearest-neighbor resize to `width` x `height`.
pub fn resize_nearest(bitmap: &Bitmap, width: u32, height: u32) -> Bitmap {
    let channels = bitmap.format().channels();
    let (sw, sh) = (bitmap.width() as usize, bitmap.height() as usize);
    let (dw, dh) = (width as usize, height as usize);
    let src = bitmap.as_bytes();
    let mut data = Vec::with_capacity(dw * dh * channels);
    if sw == 0 || sh == 0 {
        data.resize(dw * dh * channels, 0);
        return Bitmap::from_parts(width, height, bitmap.format(), data);
    }
    for y in 0..dh {
        let sy = y * sh / dh;
        for x in 0..dw {
            let sx = x * sw / dw;
            let idx = (sy * sw + sx) * channels;
            data.extend_from_slice(&src[idx..idx + channels]);
        }
    }
    Bitmap::from_parts(width, height, bitmap.format(), data)
}

/// Rotate counter-clockwise by `turns` quarter turns.
pub fn rotate_ccw(bitmap: &Bitmap, turns: u32) -> Bitmap {
    let turns = turns % 4;
    if turns == 0 {
        return bitmap.clone();
    }
    let channels = bitmap.format().channels();
    let (w, h) = (bitmap.width() as usize, bitmap.height() as usize);
    let (dw, dh) = if turns % 2 == 1 { (h, w) } else { (w, h) };
    let src = bitmap.as_bytes();
    let mut data = Vec::with_capacity(src.len());
    for y in 0..dh {
        for x in 0..dw {
            let (sx, sy) = match turns {
                1 => (w - 1 - y, x),
                2 => (w - 1 - x, h - 1 - y),
                _ => (y, h - 1 - x),
            };
            let idx = (sy * w + sx) * channels;
            data.extend_from_slice(&src[idx..idx + channels]);
        }
    }
    Bitmap::from_parts(dw as u32, dh as u32, bitmap.format(), data)
}

/// RGB channels scaled from `[0, 255]` to `[0, 1]`; alpha is dropped.
pub fn normalize(bitmap: &Bitmap, layout: TensorLayout) -> Vec<f32> {
    let channels = bitmap.format().channels();
    let pixels = bitmap.width() as usize * bitmap.height() as usize;
    let src = bitmap.as_bytes();
    let mut out = vec![0.0f32; pixels * 3];
    for (i, px) in src.chunks_exact(channels).enumerate() {
        for c in 0..3 {
            let value = f32::from(px[c]) / 255.0;
            match layout {
                TensorLayout::Nhwc => out[i * 3 + c] = value,
                TensorLayout::Nchw => out[c * pixels + i] = value,
            }
        }
    }
    out
}

/// Full preparation of `bitmap` for a model with input `spec`.
///
/// For odd quarter turns the resize target is transposed so the rotated
/// result matches the model input exactly.
pub fn prepare_input(bitmap: &Bitmap, spec: InputSpec, rotation_degrees: i32) -> Vec<f32> {
    let rgba;
    let source = if bitmap.format() == BitmapFormat::Rgba8888 {
        bitmap
    } else {
        rgba = bitmap.to_rgba();
        &rgba
    };
    let turns = (rotation_degrees.rem_euclid(360) / 90) as u32;
    let (width, height) = if turns % 2 == 1 {
        (spec.height, spec.width)
    } else {
        (spec.width, spec.height)
    };
    let square = crop_center_square(source);
    let resized = resize_nearest(&square, width, height);
    let rotated = rotate_ccw(&resized, turns);
    normalize(&rotated, spec.layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    /// RGBA bitmap whose red channel encodes the pixel index.
    fn indexed(width: u32, height: u32) -> Result<Bitmap> {
        let mut data = Vec::new();
        for i in 0..width * height {
            data.extend_from_slice(&[i as u8, 0, 0, 255]);
        }
        Bitmap::from_rgba(width, height, data)
    }

    fn reds(bitmap: &Bitmap) -> Vec<u8> {
        bitmap.as_bytes().chunks_exact(4).map(|px| px[0]).collect()
    }

    #[test]
    fn crop_keeps_center() -> Result<()> {
        // 0 1 2 3
        // 4 5 6 7
        let square = crop_center_square(&indexed(4, 2)?);
        assert_eq!(square.size(), crate::geometry::Size::new(2, 2));
        assert_eq!(reds(&square), vec![1, 2, 5, 6]);
        Ok(())
    }

    #[test]
    fn quarter_turn_is_counter_clockwise() -> Result<()> {
        // 0 1 2      2 5
        // 3 4 5  ->  1 4
        //            0 3
        let rotated = rotate_ccw(&indexed(3, 2)?, 1);
        assert_eq!((rotated.width(), rotated.height()), (2, 3));
        assert_eq!(reds(&rotated), vec![2, 5, 1, 4, 0, 3]);

        let back = rotate_ccw(&rotated, 3);
        assert_eq!(reds(&back), vec![0, 1, 2, 3, 4, 5]);

        let half = rotate_ccw(&indexed(3, 2)?, 2);
        assert_eq!(reds(&half), vec![5, 4, 3, 2, 1, 0]);
        Ok(())
    }

    #[test]
    fn nearest_resize_samples_source_grid() -> Result<()> {
        let resized = resize_nearest(&indexed(2, 2)?, 4, 4);
        assert_eq!(
            reds(&resized),
            vec![0, 0, 1, 1, 0, 0, 1, 1, 2, 2, 3, 3, 2, 2, 3, 3]
        );
        Ok(())
    }

    #[test]
    fn prepared_tensor_matches_model_input() -> Result<()> {
        let spec = InputSpec {
            width: 4,
            height: 2,
            layout: TensorLayout::Nchw,
        };
        let bitmap = Bitmap::filled(10, 6, [255, 0, 51, 255]);
        for rotation in [0, 90, 180, 270] {
            let tensor = prepare_input(&bitmap, spec, rotation);
            assert_eq!(tensor.len(), spec.len());
            assert!(tensor[..8].iter().all(|v| (*v - 1.0).abs() < 1e-6));
            assert!(tensor[8..16].iter().all(|v| *v == 0.0));
            assert!(tensor[16..].iter().all(|v| (*v - 0.2).abs() < 1e-6));
        }
        Ok(())
    }
}
