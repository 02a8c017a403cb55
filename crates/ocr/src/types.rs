use image::{DynamicImage, GrayImage, RgbImage};
use serde::Serialize;
use std::io::Cursor;
use zooscan_core::MetricsRecord;

/// An uploaded image as received, before any decoding.
#[derive(Debug, Clone, Copy)]
pub struct RawImage<'a> {
    pub bytes: &'a [u8],
    /// Declared MIME type (e.g. `image/jpeg`). Only a hint; the bytes are sniffed
    /// when it is missing or wrong.
    pub media_type: Option<&'a str>,
}

impl<'a> RawImage<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, media_type: None }
    }

    pub fn with_media_type(bytes: &'a [u8], media_type: &'a str) -> Self {
        Self { bytes, media_type: Some(media_type) }
    }
}

/// Binarized single-channel image handed to the recognition engines.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage(GrayImage);

impl PreprocessedImage {
    pub fn new(image: GrayImage) -> Self {
        Self(image)
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Three-channel copy for engines that only accept RGB input.
    pub fn to_rgb(&self) -> RgbImage {
        DynamicImage::ImageLuma8(self.0.clone()).to_rgb8()
    }

    /// Lossless PNG encoding for engines that take an encoded buffer.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        self.0.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        Ok(buf)
    }

    pub fn into_inner(self) -> GrayImage {
        self.0
    }
}

/// Text produced by one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub engine: &'static str,
    pub text: String,
}

/// What the upload handler gets back for one sheet.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub metrics: MetricsRecord,
    /// Normalized recognized text (same as `metrics.provenance_text`).
    pub text: String,
    /// Whether the chosen text passed the quality gate.
    pub accepted: bool,
}
