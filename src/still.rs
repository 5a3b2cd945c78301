#![cfg(feature = "still-image")]

use anyhow::{Context, Result};
use std::path::Path;

use crate::frame::Bitmap;

/// Decode a PNG or JPEG file into an RGBA bitmap.
pub fn load_bitmap(path: &Path) -> Result<Bitmap> {
    let image = image::open(path).with_context(|| format!("decode image {}", path.display()))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Bitmap::from_rgba(width, height, rgba.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("swatch.png");
        image::RgbImage::from_pixel(3, 2, image::Rgb([200, 10, 10])).save(&path)?;

        let bitmap = load_bitmap(&path)?;
        assert_eq!((bitmap.width(), bitmap.height()), (3, 2));
        assert_eq!(bitmap.pixel(2, 1), [200, 10, 10, 255]);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_bitmap(Path::new("does/not/exist.png")).is_err());
    }
}
