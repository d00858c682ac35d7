//! Image transcode engine for PPTX recompression.
//!
//! Turns embedded raster media into smaller bytes: bakes in slide crops,
//! downscales to a projector-sized bounding box, and re-encodes to WebP or
//! JPEG, keeping the original bytes whenever re-encoding does not strictly
//! shrink them.

pub mod crop;
pub mod transcode;

pub use crop::{emu_to_pixels, CropRect, PixelRect, EMU_PER_INCH, EMU_PER_PIXEL};
pub use transcode::{fit_within, has_transparency, transcode, OutputFormat, TranscodeOutput};
