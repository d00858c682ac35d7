//! Per-run outcome counters.

use serde::{Deserialize, Serialize};

/// Summary of what a compression run did to a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Input package size in bytes.
    pub original_size: u64,

    /// Output package size in bytes.
    pub compressed_size: u64,

    /// Media entries deleted as unreferenced.
    pub media_swept: usize,

    /// Crop rectangles baked into their images.
    pub crops_applied: usize,

    /// Images replaced with a smaller re-encode.
    pub images_replaced: usize,

    /// Images kept as-is because the re-encode was not smaller.
    pub images_kept: usize,

    /// Images kept as-is because their transcode failed.
    pub images_failed: usize,
}

impl RunSummary {
    /// Bytes saved by the whole run. Zero if the output did not shrink.
    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }

    /// Saved fraction of the original size, 0.0-1.0.
    pub fn savings_ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.bytes_saved() as f64 / self.original_size as f64
    }
}
