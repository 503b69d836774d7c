//! Image transcoding between the canonical image flavor and encoded image
//! formats, built on the `image` crate.
//!
//! Codecs are registered per MIME type and tried in order; when every codec
//! fails, the first error is the one reported.

use std::collections::HashMap;
use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use tracing::trace;

use crate::error::{TransferError, TransferResult};

/// Decodes encoded image bytes into a raster image.
pub type DecodeFn = fn(&[u8]) -> TransferResult<DynamicImage>;

/// Encodes a raster image into an image format's bytes.
pub type EncodeFn = fn(&DynamicImage) -> TransferResult<Vec<u8>>;

fn decode_with(bytes: &[u8], format: ImageFormat) -> TransferResult<DynamicImage> {
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| TransferError::ImageDecode(e.to_string()))
}

fn encode_with(image: &DynamicImage, format: ImageFormat) -> TransferResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, format)
        .map_err(|e| TransferError::ImageEncode(e.to_string()))?;
    Ok(out.into_inner())
}

fn decode_png(bytes: &[u8]) -> TransferResult<DynamicImage> {
    decode_with(bytes, ImageFormat::Png)
}

fn encode_png(image: &DynamicImage) -> TransferResult<Vec<u8>> {
    encode_with(image, ImageFormat::Png)
}

fn decode_jpeg(bytes: &[u8]) -> TransferResult<DynamicImage> {
    decode_with(bytes, ImageFormat::Jpeg)
}

fn encode_jpeg(image: &DynamicImage) -> TransferResult<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    encode_with(&rgb, ImageFormat::Jpeg)
}

fn decode_bmp(bytes: &[u8]) -> TransferResult<DynamicImage> {
    decode_with(bytes, ImageFormat::Bmp)
}

fn encode_bmp(image: &DynamicImage) -> TransferResult<Vec<u8>> {
    encode_with(image, ImageFormat::Bmp)
}

fn decode_gif(bytes: &[u8]) -> TransferResult<DynamicImage> {
    decode_with(bytes, ImageFormat::Gif)
}

fn encode_gif(image: &DynamicImage) -> TransferResult<Vec<u8>> {
    encode_with(image, ImageFormat::Gif)
}

/// Per-MIME-type image codec registry.
pub struct ImageCodecRegistry {
    readers: HashMap<String, Vec<DecodeFn>>,
    writers: HashMap<String, Vec<EncodeFn>>,
}

impl ImageCodecRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            readers: HashMap::new(),
            writers: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in PNG, JPEG, BMP and GIF codecs.
    pub fn with_standard_codecs() -> Self {
        let mut registry = Self::new();
        registry.register_reader("image/png", decode_png);
        registry.register_writer("image/png", encode_png);
        registry.register_reader("image/jpeg", decode_jpeg);
        registry.register_writer("image/jpeg", encode_jpeg);
        registry.register_reader("image/bmp", decode_bmp);
        registry.register_writer("image/bmp", encode_bmp);
        registry.register_reader("image/gif", decode_gif);
        registry.register_writer("image/gif", encode_gif);
        registry
    }

    /// Adds a decoder for a MIME type, after any existing ones.
    pub fn register_reader(&mut self, mime: &str, decode: DecodeFn) {
        self.readers.entry(mime.to_string()).or_default().push(decode);
    }

    /// Adds an encoder for a MIME type, after any existing ones.
    pub fn register_writer(&mut self, mime: &str, encode: EncodeFn) {
        self.writers.entry(mime.to_string()).or_default().push(encode);
    }

    /// The decoders registered for a MIME type, in registration order.
    pub fn readers_for(&self, mime: &str) -> &[DecodeFn] {
        self.readers.get(mime).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The encoders registered for a MIME type, in registration order.
    pub fn writers_for(&self, mime: &str) -> &[EncodeFn] {
        self.writers.get(mime).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decodes bytes of the given MIME type, trying codecs in order.
    pub fn decode(&self, bytes: &[u8], mime: &str) -> TransferResult<DynamicImage> {
        let mut first_error = None;
        for decode in self.readers_for(mime) {
            match decode(bytes) {
                Ok(image) => return Ok(image),
                Err(e) => {
                    trace!(mime, error = %e, "image decoder failed, trying next");
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error
            .unwrap_or_else(|| TransferError::ImageDecode(format!("no decoder for {mime}"))))
    }

    /// Encodes an image to the given MIME type, trying codecs in order.
    pub fn encode(&self, image: &DynamicImage, mime: &str) -> TransferResult<Vec<u8>> {
        let mut first_error = None;
        for encode in self.writers_for(mime) {
            match encode(image) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error
            .unwrap_or_else(|| TransferError::ImageEncode(format!("no encoder for {mime}"))))
    }
}

impl Default for ImageCodecRegistry {
    fn default() -> Self {
        Self::with_standard_codecs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn test_image() -> DynamicImage {
        let mut img = RgbaImage::new(4, 4);
        for pixel in img.pixels_mut() {
            *pixel = Rgba([255, 0, 0, 255]);
        }
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_png_round_trip() {
        let registry = ImageCodecRegistry::with_standard_codecs();
        let bytes = registry.encode(&test_image(), "image/png").expect("encode");
        let decoded = registry.decode(&bytes, "image/png").expect("decode");
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.height(), 4);
    }

    #[test]
    fn test_jpeg_encode_drops_alpha() {
        let registry = ImageCodecRegistry::with_standard_codecs();
        let bytes = registry
            .encode(&test_image(), "image/jpeg")
            .expect("encode");
        let decoded = registry.decode(&bytes, "image/jpeg").expect("decode");
        assert_eq!(decoded.width(), 4);
    }

    #[test]
    fn test_unknown_mime_reports_missing_codec() {
        let registry = ImageCodecRegistry::with_standard_codecs();
        assert!(matches!(
            registry.decode(&[], "image/x-unknown"),
            Err(TransferError::ImageDecode(_))
        ));
        assert!(matches!(
            registry.encode(&test_image(), "image/x-unknown"),
            Err(TransferError::ImageEncode(_))
        ));
    }

    #[test]
    fn test_first_decode_error_preserved() {
        fn always_fails(_bytes: &[u8]) -> TransferResult<DynamicImage> {
            Err(TransferError::ImageDecode("primary failed".into()))
        }
        let mut registry = ImageCodecRegistry::new();
        registry.register_reader("image/png", always_fails);
        registry.register_reader("image/png", decode_png);

        // Invalid bytes: both fail, the first codec's error wins
        match registry.decode(b"not a png", "image/png") {
            Err(TransferError::ImageDecode(msg)) => assert_eq!(msg, "primary failed"),
            other => panic!("unexpected result: {other:?}"),
        }

        // Valid bytes: fallback succeeds
        let bytes = ImageCodecRegistry::with_standard_codecs()
            .encode(&test_image(), "image/png")
            .expect("encode");
        assert!(registry.decode(&bytes, "image/png").is_ok());
    }
}
