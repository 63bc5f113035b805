//! The Transform Invoker: a thin, testable seam over an external image
//! codec, treated as a pure `(bytes, params) -> bytes` function.
//!
//! The trait/mock split is the teacher's own pattern in this exact file
//! (`ImageBackend` + `MockBackend`, `Mutex`-wrapped so the mock stays
//! `Sync`); the real implementation's resize/encode calls are adapted
//! from `imaging/rust_backend.rs`'s `DynamicImage::resize` with
//! `FilterType::Lanczos3` and its `webp::Encoder` usage.

use super::calculations::resolve_dimensions;
use crate::params::{OutputFormat, TransformParams};
use image::imageops::FilterType;
use image::ImageFormat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("input does not look like a supported image (no matching magic number)")]
    InvalidImage,
    #[error("dimension {0} is out of the valid 10-4000 (or 0) range")]
    InvalidDimensions(u32),
    #[error("quality {0} is out of the valid 1-100 range")]
    InvalidQuality(u8),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// The format actually detected in the input bytes, independent of the
/// format the caller asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Jpeg,
    Png,
    Webp,
}

/// Sniff the input for one of the three magic numbers this service
/// understands. Does not trust file extensions.
pub fn detect_format(bytes: &[u8]) -> Option<DetectedFormat> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(DetectedFormat::Jpeg);
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(DetectedFormat::Png);
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(DetectedFormat::Webp);
    }
    None
}

const MIN_DIMENSION: u32 = 10;
const MAX_DIMENSION: u32 = 4000;
const MIN_QUALITY: u8 = 1;
const MAX_QUALITY: u8 = 100;

fn validate_dimension(value: u32) -> Result<(), TransformError> {
    if value == 0 || (MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
        Ok(())
    } else {
        Err(TransformError::InvalidDimensions(value))
    }
}

fn validate_params(params: &TransformParams) -> Result<(), TransformError> {
    validate_dimension(params.width)?;
    validate_dimension(params.height)?;
    if !(MIN_QUALITY..=MAX_QUALITY).contains(&params.quality) {
        return Err(TransformError::InvalidQuality(params.quality));
    }
    Ok(())
}

/// A codec capable of validating and transforming raw image bytes.
///
/// Implementations execute the actual pixel work; this allows a real,
/// `image`-crate-backed implementation to sit next to a deterministic
/// mock for testing the request pipeline without decoding real images.
pub trait Codec: Sync {
    fn validate(&self, bytes: &[u8]) -> Result<DetectedFormat, TransformError>;
    fn transform(&self, bytes: &[u8], params: &TransformParams) -> Result<Vec<u8>, TransformError>;
}

/// `image`-crate-backed codec: decodes JPEG/PNG/WebP, resizes with
/// Lanczos3, and re-encodes to the requested output format.
pub struct RealCodec;

impl RealCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RealCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for RealCodec {
    fn validate(&self, bytes: &[u8]) -> Result<DetectedFormat, TransformError> {
        detect_format(bytes).ok_or(TransformError::InvalidImage)
    }

    fn transform(&self, bytes: &[u8], params: &TransformParams) -> Result<Vec<u8>, TransformError> {
        validate_params(params)?;
        self.validate(bytes)?;

        let img = image::load_from_memory(bytes).map_err(|e| TransformError::Decode(e.to_string()))?;
        let (target_w, target_h) = resolve_dimensions((img.width(), img.height()), params);

        let resized = if (target_w, target_h) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(target_w.max(1), target_h.max(1), FilterType::Lanczos3)
        };

        encode(&resized, params)
    }
}

fn encode(img: &image::DynamicImage, params: &TransformParams) -> Result<Vec<u8>, TransformError> {
    match params.format {
        OutputFormat::Webp => {
            let encoder = webp::Encoder::from_image(img)
                .map_err(|e| TransformError::Encode(e.to_string()))?;
            Ok(encoder.encode(params.quality as f32).to_vec())
        }
        OutputFormat::Jpeg | OutputFormat::Jpg => {
            let mut out = Vec::new();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, params.quality);
            encoder
                .encode_image(img)
                .map_err(|e| TransformError::Encode(e.to_string()))?;
            Ok(out)
        }
        OutputFormat::Png => {
            let mut out = Vec::new();
            img.write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
                .map_err(|e| TransformError::Encode(e.to_string()))?;
            Ok(out)
        }
    }
}
