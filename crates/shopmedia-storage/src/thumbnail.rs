//! Thumbnail derivation
//!
//! Decode-validate an uploaded raster image and derive its thumbnail. The
//! thumbnail is always produced from a committed original, preserves aspect
//! ratio within a square bounding box, and is re-encoded in the source
//! format.

use image::{ImageFormat, ImageReader};
use shopmedia_core::AppError;
use std::io::Cursor;

/// Sniff the raster format of uploaded bytes, rejecting anything that is not
/// a decodable image of a supported format.
pub fn sniff_format(data: &[u8]) -> Result<ImageFormat, AppError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::InvalidImage(format!("Unreadable image data: {}", e)))?;

    let format = reader
        .format()
        .ok_or_else(|| AppError::InvalidImage("Unknown image format".to_string()))?;

    match format {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif => Ok(format),
        other => Err(AppError::InvalidImage(format!(
            "Unsupported image format: {:?}",
            other
        ))),
    }
}

/// Canonical file extension for a supported format.
pub fn extension_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        other => other.extensions_str().first().copied().unwrap_or("img"),
    }
}

/// Fully decode the bytes, proving they are a valid raster image.
pub fn validate_image(data: &[u8]) -> Result<(), AppError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::InvalidImage(format!("Unreadable image data: {}", e)))?;
    reader
        .decode()
        .map_err(|e| AppError::InvalidImage(format!("Undecodable image data: {}", e)))?;
    Ok(())
}

/// Derive a thumbnail bounded by `max_dim` pixels on the longest edge,
/// re-encoded in the source format.
pub fn derive_thumbnail(data: &[u8], max_dim: u32) -> Result<Vec<u8>, AppError> {
    let format = sniff_format(data)?;

    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::InvalidImage(format!("Unreadable image data: {}", e)))?
        .decode()
        .map_err(|e| AppError::InvalidImage(format!("Undecodable image data: {}", e)))?;

    let thumb = img.thumbnail(max_dim, max_dim);

    let mut buffer = Vec::new();
    thumb
        .write_to(&mut Cursor::new(&mut buffer), format)
        .map_err(|e| AppError::Internal(format!("Thumbnail encode failed: {}", e)))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn png_image(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 128, 255, 255]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_sniff_format_png() {
        let data = png_image(10, 10);
        assert_eq!(sniff_format(&data).unwrap(), ImageFormat::Png);
        assert_eq!(extension_for(ImageFormat::Png), "png");
    }

    #[test]
    fn test_sniff_format_rejects_non_image() {
        let result = sniff_format(b"definitely not an image");
        assert!(matches!(result, Err(AppError::InvalidImage(_))));
    }

    #[test]
    fn test_derive_thumbnail_bounds_dimensions() {
        let data = png_image(800, 200);
        let thumb_bytes = derive_thumbnail(&data, 320).unwrap();

        let thumb = image::load_from_memory(&thumb_bytes).unwrap();
        let (w, h) = thumb.dimensions();
        assert!(w <= 320 && h <= 320);
        // aspect ratio preserved: 4:1
        assert_eq!(w, 320);
        assert_eq!(h, 80);
    }

    #[test]
    fn test_derive_thumbnail_keeps_format() {
        let data = png_image(64, 64);
        let thumb_bytes = derive_thumbnail(&data, 32).unwrap();
        assert_eq!(sniff_format(&thumb_bytes).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_validate_image_rejects_truncated() {
        let mut data = png_image(32, 32);
        data.truncate(data.len() / 2);
        assert!(matches!(
            validate_image(&data),
            Err(AppError::InvalidImage(_))
        ));
    }
}
