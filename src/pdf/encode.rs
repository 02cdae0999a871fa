use image::RgbImage;
use image::imageops;

use crate::error::Error;

/// Flate-compressed 8-bit RGB pixels, ready for an image XObject.
pub(crate) struct EncodedImage {
    pub(crate) data: Vec<u8>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

/// Cut rows `[y_start, y_end)` out of the surface and compress them.
pub(crate) fn encode_rows(surface: &RgbImage, y_start: u32, y_end: u32) -> Result<EncodedImage, Error> {
    if y_end <= y_start {
        return Err(Error::Encoding(format!("empty pixel range {y_start}..{y_end}")));
    }
    if y_end > surface.height() {
        return Err(Error::Encoding(format!(
            "pixel range {y_start}..{y_end} outside {}px surface",
            surface.height()
        )));
    }
    if surface.width() == 0 {
        return Err(Error::Encoding("surface has zero width".into()));
    }

    let height = y_end - y_start;
    let rows = imageops::crop_imm(surface, 0, y_start, surface.width(), height).to_image();
    let raw = rows.as_raw();
    let expected = surface.width() as usize * height as usize * 3;
    if raw.len() != expected {
        return Err(Error::Encoding(format!(
            "cropped {} bytes, expected {expected}",
            raw.len()
        )));
    }

    Ok(EncodedImage {
        data: miniz_oxide::deflate::compress_to_vec_zlib(raw, 6),
        width: surface.width(),
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_out_of_range_rows() {
        let surface = RgbImage::new(4, 10);
        assert!(matches!(encode_rows(&surface, 5, 5), Err(Error::Encoding(_))));
        assert!(matches!(encode_rows(&surface, 6, 2), Err(Error::Encoding(_))));
        assert!(matches!(encode_rows(&surface, 3, 11), Err(Error::Encoding(_))));
        assert!(matches!(
            encode_rows(&RgbImage::new(0, 10), 0, 5),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn encodes_only_the_requested_rows() {
        let mut surface = RgbImage::new(4, 10);
        for y in 2..6 {
            for x in 0..4 {
                surface.put_pixel(x, y, image::Rgb([200, 10, y as u8]));
            }
        }

        let encoded = encode_rows(&surface, 2, 6).unwrap();

        assert_eq!((encoded.width, encoded.height), (4, 4));
        let raw = miniz_oxide::inflate::decompress_to_vec_zlib(&encoded.data).unwrap();
        assert_eq!(raw.len(), 4 * 4 * 3);
        assert_eq!(&raw[..3], &[200, 10, 2]);
        assert_eq!(&raw[raw.len() - 3..], &[200, 10, 5]);
    }
}
