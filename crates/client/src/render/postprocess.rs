//! Screenshot normalisation into a full-size JPEG and a thumbnail.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use memento_core::Error;

/// Rows kept when cropping.
pub const CROP_HEIGHT: u32 = 640;
pub const THUMBNAIL_WIDTH: u32 = 300;
pub const JPEG_QUALITY: u8 = 95;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Both JPEG forms of one screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub full: Vec<u8>,
    pub thumbnail: Vec<u8>,
}

/// Decode `raw`, flatten it onto white, optionally keep the top
/// [`CROP_HEIGHT`] rows, and encode the full image and a
/// [`THUMBNAIL_WIDTH`]-wide thumbnail.
pub fn normalize(raw: &[u8], crop: bool) -> Result<NormalizedImage, Error> {
    let decoded = image::load_from_memory(raw).map_err(|e| Error::DecodeFailure(format!("undecodable image: {e}")))?;

    let mut img = flatten_onto_white(&decoded.to_rgba8());
    let (width, height) = img.dimensions();
    if crop && height > CROP_HEIGHT {
        img = imageops::crop_imm(&img, 0, 0, width, CROP_HEIGHT).to_image();
    }

    let full = encode_jpeg(&img)?;

    let (width, height) = img.dimensions();
    let thumb_height = thumbnail_height(width, height);
    let thumb = imageops::resize(&img, THUMBNAIL_WIDTH, thumb_height, FilterType::Lanczos3);
    let thumbnail = encode_jpeg(&thumb)?;

    tracing::debug!(width, height, crop, full = full.len(), thumbnail = thumbnail.len(), "screenshot normalised");
    Ok(NormalizedImage { full, thumbnail })
}

/// Height that keeps the aspect ratio at [`THUMBNAIL_WIDTH`], never zero.
pub fn thumbnail_height(width: u32, height: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let scaled = (u64::from(height) * u64::from(THUMBNAIL_WIDTH) * 2 + u64::from(width)) / (u64::from(width) * 2);
    scaled.max(1) as u32
}

fn flatten_onto_white(rgba: &image::RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(img)
        .map_err(|e| Error::DecodeFailure(format!("jpeg encoding failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32, pixel: Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, pixel);
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn decode(jpeg: &[u8]) -> RgbImage {
        let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg).unwrap();
        img.to_rgb8()
    }

    fn close(a: u8, b: u8) -> bool {
        a.abs_diff(b) <= 8
    }

    #[test]
    fn test_opaque_pixels_kept() {
        let out = normalize(&png(600, 400, Rgba([200, 40, 40, 255])), false).unwrap();
        let full = decode(&out.full);
        assert_eq!(full.dimensions(), (600, 400));
        let [r, g, b] = full.get_pixel(300, 200).0;
        assert!(close(r, 200) && close(g, 40) && close(b, 40));
    }

    #[test]
    fn test_thumbnail_keeps_aspect_ratio() {
        let out = normalize(&png(600, 400, Rgba([10, 10, 10, 255])), false).unwrap();
        assert_eq!(decode(&out.thumbnail).dimensions(), (300, 200));
    }

    #[test]
    fn test_crop_keeps_top_rows() {
        let out = normalize(&png(1000, 2000, Rgba([0, 0, 255, 255])), true).unwrap();
        assert_eq!(decode(&out.full).dimensions(), (1000, CROP_HEIGHT));
        assert_eq!(decode(&out.thumbnail).dimensions(), (300, 192));
    }

    #[test]
    fn test_short_image_not_cropped() {
        let out = normalize(&png(100, 50, Rgba([0, 0, 0, 255])), true).unwrap();
        assert_eq!(decode(&out.full).dimensions(), (100, 50));
        assert_eq!(decode(&out.thumbnail).dimensions(), (300, 150));
    }

    #[test]
    fn test_transparency_flattened_onto_white() {
        let out = normalize(&png(64, 64, Rgba([0, 0, 0, 0])), false).unwrap();
        let [r, g, b] = decode(&out.full).get_pixel(32, 32).0;
        assert!(close(r, 255) && close(g, 255) && close(b, 255));
    }

    #[test]
    fn test_thumbnail_height() {
        assert_eq!(thumbnail_height(600, 400), 200);
        assert_eq!(thumbnail_height(1000, 1), 1);
        assert_eq!(thumbnail_height(900, 1001), 334);
        assert_eq!(thumbnail_height(0, 10), 1);
    }

    #[test]
    fn test_undecodable_input() {
        assert!(matches!(normalize(b"not an image", false), Err(Error::DecodeFailure(_))));
    }
}
