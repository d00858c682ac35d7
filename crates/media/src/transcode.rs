//! Decode, crop, downscale, and re-encode a single image.
//!
//! The engine races a lossy WebP encode against a baseline JPEG for opaque
//! images and keeps the smaller; images with transparency only go to WebP so
//! the alpha channel survives. Whatever happens, the output for an image is
//! never larger than its input: if no candidate beats the original bytes,
//! the original bytes win.

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use slimdeck_core::{Error, Result, TranscodePolicy};

use crate::crop::CropRect;

/// Format a replaced image was encoded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    WebP,
    Jpeg,
}

/// Outcome of transcoding one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutput {
    /// Re-encode was strictly smaller; replace the entry with these bytes.
    Replaced { bytes: Vec<u8>, format: OutputFormat },

    /// No candidate beat the original; keep the entry untouched.
    KeptOriginal,
}

impl TranscodeOutput {
    /// Byte length of the replacement, if any.
    pub fn replaced_len(&self) -> Option<usize> {
        match self {
            TranscodeOutput::Replaced { bytes, .. } => Some(bytes.len()),
            TranscodeOutput::KeptOriginal => None,
        }
    }
}

/// Fit dimensions within a bounding box, preserving aspect ratio.
///
/// Never upscales: if the image already fits, dimensions are unchanged.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    if ratio >= 1.0 {
        return (width, height);
    }
    let new_width = ((width as f64 * ratio).round() as u32).max(1);
    let new_height = ((height as f64 * ratio).round() as u32).max(1);
    (new_width, new_height)
}

/// Whether the image carries any partially or fully transparent pixel.
pub fn has_transparency(img: &DynamicImage) -> bool {
    if !img.color().has_alpha() {
        return false;
    }
    img.to_rgba8().pixels().any(|p| p.0[3] < 255)
}

/// Transcode one image per policy, applying an optional crop first.
///
/// `path` is only used for log and error messages. Any failure leaves the
/// caller free to keep the original bytes; nothing here touches shared state.
pub fn transcode(
    path: &str,
    original: &[u8],
    crop: Option<CropRect>,
    policy: &TranscodePolicy,
) -> Result<TranscodeOutput> {
    let mut img =
        image::load_from_memory(original).map_err(|e| Error::DecodeError(format!("{path}: {e}")))?;

    if let Some(rect) = crop.filter(|c| !c.is_empty()) {
        let (w, h) = img.dimensions();
        let px = rect.to_pixels(path, w, h)?;
        img = img.crop_imm(px.x, px.y, px.width, px.height);
    }

    let (w, h) = img.dimensions();
    let (target_w, target_h) = fit_within(w, h, policy.max_width, policy.max_height);
    if (target_w, target_h) != (w, h) {
        img = img.resize_exact(target_w, target_h, FilterType::Lanczos3);
    }

    let candidate = if has_transparency(&img) {
        // Alpha must survive, so the only candidate is lossy WebP.
        let bytes = encode_webp(path, &img, policy.alpha_quality, true)?;
        (bytes, OutputFormat::WebP)
    } else {
        let webp = encode_webp(path, &img, policy.opaque_quality, false)?;
        let jpeg = encode_jpeg(path, &img, policy.opaque_quality)?;
        if webp.len() <= jpeg.len() {
            (webp, OutputFormat::WebP)
        } else {
            (jpeg, OutputFormat::Jpeg)
        }
    };

    if candidate.0.len() < original.len() {
        Ok(TranscodeOutput::Replaced {
            bytes: candidate.0,
            format: candidate.1,
        })
    } else {
        log::debug!(
            "{path}: re-encode ({} bytes) not smaller than original ({} bytes), keeping original",
            candidate.0.len(),
            original.len()
        );
        Ok(TranscodeOutput::KeptOriginal)
    }
}

/// Lossy WebP encode at quality 0.0-1.0.
fn encode_webp(path: &str, img: &DynamicImage, quality: f32, keep_alpha: bool) -> Result<Vec<u8>> {
    // The webp encoder only accepts RGB8/RGBA8 buffers.
    let normalized = if keep_alpha {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&normalized)
        .map_err(|e| Error::EncodeError(format!("{path}: webp: {e}")))?;
    Ok(encoder.encode(quality * 100.0).to_vec())
}

/// Baseline JPEG encode at quality 0.0-1.0.
fn encode_jpeg(path: &str, img: &DynamicImage, quality: f32) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, (quality * 100.0).round() as u8);
    encoder
        .encode_image(&rgb)
        .map_err(|e| Error::EncodeError(format!("{path}: jpeg: {e}")))?;
    Ok(out)
}
