use image::{DynamicImage, GrayImage, ImageFormat};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::median_filter;
use thiserror::Error;
use zooscan_core::PreprocessConfig;

use crate::types::{PreprocessedImage, RawImage};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Image buffer is empty")]
    Empty,
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Grayscale → contrast boost → median denoise → Otsu binarization.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    contrast_factor: f32,
    median_radius: u32,
    max_dimension: Option<u32>,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(&PreprocessConfig::default())
    }
}

impl Preprocessor {
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            contrast_factor: config.contrast_factor,
            median_radius: config.median_radius,
            max_dimension: config.max_dimension,
        }
    }

    /// Decode raw upload bytes and produce the two-level image the engines read.
    pub fn prepare(&self, raw: &RawImage<'_>) -> Result<PreprocessedImage, DecodeError> {
        let img = decode(raw)?;
        let img = match self.max_dimension {
            Some(max) if img.width() > max || img.height() > max => {
                img.resize(max, max, image::imageops::FilterType::Lanczos3)
            }
            _ => img,
        };

        let gray = img.to_luma8();
        let contrasted = enhance_contrast(gray, self.contrast_factor);
        let denoised = median_filter(&contrasted, self.median_radius, self.median_radius);
        Ok(PreprocessedImage::new(binarize(&denoised)))
    }
}

fn decode(raw: &RawImage<'_>) -> Result<DynamicImage, DecodeError> {
    if raw.bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    // A wrong declared type should not sink an otherwise readable upload.
    let declared = raw.media_type.and_then(ImageFormat::from_mime_type);
    let img = match declared {
        Some(format) => image::load_from_memory_with_format(raw.bytes, format)
            .or_else(|_| image::load_from_memory(raw.bytes))?,
        None => image::load_from_memory(raw.bytes)?,
    };
    Ok(img)
}

/// Push every pixel away from the image's mean gray level by `factor`.
fn enhance_contrast(mut gray: GrayImage, factor: f32) -> GrayImage {
    let count = u64::from(gray.width()) * u64::from(gray.height());
    if count == 0 {
        return gray;
    }
    let sum: u64 = gray.pixels().map(|p| u64::from(p[0])).sum();
    let mean = (sum as f64 / count as f64).round() as f32;

    let lut: [u8; 256] = std::array::from_fn(|v| {
        (mean + factor * (v as f32 - mean)).round().clamp(0.0, 255.0) as u8
    });
    for p in gray.pixels_mut() {
        p[0] = lut[usize::from(p[0])];
    }
    gray
}

fn binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    threshold(gray, level, ThresholdType::Binary)
}
