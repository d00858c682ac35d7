//! Crop rectangle math.
//!
//! OOXML expresses crops as `srcRect` edge insets in parts-per-100,000 of
//! the image's full bounds. We carry them as fractions and convert to pixel
//! bounds against the original decoded dimensions just before cropping.

use serde::{Deserialize, Serialize};
use slimdeck_core::{Error, Result};

/// English Metric Units per pixel at 96 DPI.
pub const EMU_PER_PIXEL: i64 = 9525;

/// English Metric Units per inch.
pub const EMU_PER_INCH: i64 = 914_400;

/// Denominator of `srcRect` attribute values.
pub const SRC_RECT_DENOMINATOR: f64 = 100_000.0;

/// Convert an EMU length to pixels.
pub fn emu_to_pixels(emu: i64) -> i64 {
    (emu as f64 / EMU_PER_PIXEL as f64).round() as i64
}

/// A crop directive as edge insets, each a fraction (0.0-1.0) of the
/// original image's width or height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl CropRect {
    /// Build from raw `srcRect` attribute values (parts-per-100,000).
    pub fn from_src_rect(l: i64, t: i64, r: i64, b: i64) -> Self {
        Self {
            left: l as f64 / SRC_RECT_DENOMINATOR,
            top: t as f64 / SRC_RECT_DENOMINATOR,
            right: r as f64 / SRC_RECT_DENOMINATOR,
            bottom: b as f64 / SRC_RECT_DENOMINATOR,
        }
    }

    /// Whether this crop keeps the full image.
    pub fn is_empty(&self) -> bool {
        self.left == 0.0 && self.top == 0.0 && self.right == 0.0 && self.bottom == 0.0
    }

    /// Resolve to pixel bounds against the original decoded dimensions.
    ///
    /// Fails with `CropOutOfBounds` when the insets leave a non-positive
    /// region or fall outside the image; the caller keeps the image
    /// unmodified in that case.
    pub fn to_pixels(&self, path: &str, image_width: u32, image_height: u32) -> Result<PixelRect> {
        let w = image_width as f64;
        let h = image_height as f64;

        let x = (self.left * w).round() as i64;
        let y = (self.top * h).round() as i64;
        let inset_right = (self.right * w).round() as i64;
        let inset_bottom = (self.bottom * h).round() as i64;

        let width = image_width as i64 - (x + inset_right);
        let height = image_height as i64 - (y + inset_bottom);

        let in_bounds = x >= 0
            && y >= 0
            && width > 0
            && height > 0
            && x + width <= image_width as i64
            && y + height <= image_height as i64;

        if !in_bounds {
            return Err(Error::CropOutOfBounds {
                path: path.to_string(),
                x,
                y,
                width,
                height,
                image_width,
                image_height,
            });
        }

        Ok(PixelRect {
            x: x as u32,
            y: y as u32,
            width: width as u32,
            height: height as u32,
        })
    }
}

/// Pixel-space crop bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_src_rect() {
        let rect = CropRect::from_src_rect(10_000, 25_000, 0, 50_000);
        assert!((rect.left - 0.1).abs() < 1e-9);
        assert!((rect.top - 0.25).abs() < 1e-9);
        assert_eq!(rect.right, 0.0);
        assert!((rect.bottom - 0.5).abs() < 1e-9);
        assert!(!rect.is_empty());
        assert!(CropRect::from_src_rect(0, 0, 0, 0).is_empty());
    }

    #[test]
    fn test_ten_percent_crop() {
        let rect = CropRect::from_src_rect(10_000, 10_000, 10_000, 10_000);
        let px = rect.to_pixels("image1.png", 1000, 500).unwrap();
        assert_eq!(px, PixelRect { x: 100, y: 50, width: 800, height: 400 });
    }

    #[test]
    fn test_overlapping_insets_rejected() {
        // left 60% + right 60% leaves a negative width
        let rect = CropRect::from_src_rect(60_000, 0, 60_000, 0);
        let err = rect.to_pixels("image1.png", 100, 100).unwrap_err();
        match err {
            Error::CropOutOfBounds { width, .. } => assert!(width <= 0),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_full_height_inset_rejected() {
        let rect = CropRect::from_src_rect(0, 100_000, 0, 0);
        assert!(rect.to_pixels("image1.png", 10, 10).is_err());
    }

    #[test]
    fn test_zero_crop_is_full_image() {
        let rect = CropRect::from_src_rect(0, 0, 0, 0);
        let px = rect.to_pixels("image1.png", 320, 240).unwrap();
        assert_eq!(px, PixelRect { x: 0, y: 0, width: 320, height: 240 });
    }

    #[test]
    fn test_emu_to_pixels() {
        assert_eq!(emu_to_pixels(EMU_PER_PIXEL), 1);
        assert_eq!(emu_to_pixels(EMU_PER_INCH), 96);
    }
}
