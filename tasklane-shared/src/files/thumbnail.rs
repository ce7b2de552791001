//! PNG thumbnails for raster image uploads

use std::io::Cursor;

use bytes::Bytes;
use image::ImageOutputFormat;

/// Longest side of a generated thumbnail in pixels
pub const THUMBNAIL_SIZE: u32 = 256;

/// MIME types the thumbnailer can decode
pub fn is_raster_image(mime: &str) -> bool {
    matches!(
        mime,
        "image/png" | "image/jpeg" | "image/gif" | "image/webp" | "image/bmp"
    )
}

/// Decodes an image and renders a PNG that fits in a
/// [`THUMBNAIL_SIZE`] square, keeping the aspect ratio. Images already
/// smaller than the box are not upscaled.
///
/// CPU-bound; run it on a blocking thread.
pub fn generate_thumbnail(data: &[u8]) -> Result<Bytes, image::ImageError> {
    let img = image::load_from_memory(data)?;

    let thumb = if img.width() > THUMBNAIL_SIZE || img.height() > THUMBNAIL_SIZE {
        img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
    } else {
        img
    };

    let mut out = Vec::new();
    thumb.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)?;

    Ok(Bytes::from(out))
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_fits_box() {
        let thumb = generate_thumbnail(&sample_png(1024, 512)).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();

        assert_eq!(decoded.width(), 256);
        assert_eq!(decoded.height(), 128);
    }

    #[test]
    fn test_thumbnail_portrait() {
        let thumb = generate_thumbnail(&sample_png(300, 900)).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();

        assert!(decoded.width() <= THUMBNAIL_SIZE);
        assert_eq!(decoded.height(), THUMBNAIL_SIZE);
    }

    #[test]
    fn test_small_image_not_upscaled() {
        let thumb = generate_thumbnail(&sample_png(40, 30)).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();

        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn test_thumbnail_output_is_png() {
        let thumb = generate_thumbnail(&sample_png(10, 10)).unwrap();
        assert_eq!(&thumb[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_invalid_image_errors() {
        assert!(generate_thumbnail(b"definitely not an image").is_err());
    }

    #[test]
    fn test_is_raster_image() {
        assert!(is_raster_image("image/png"));
        assert!(is_raster_image("image/jpeg"));
        assert!(!is_raster_image("image/svg+xml"));
        assert!(!is_raster_image("application/pdf"));
    }
}
