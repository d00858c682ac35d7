//! Compression policy knobs.
//!
//! Defaults mirror what works well for projector decks: images are fitted
//! into a 1366x768 box, opaque images race WebP against JPEG at quality 0.7,
//! and transparent images go to WebP at quality 0.8.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum width any re-encoded image may have, in pixels.
pub const DEFAULT_MAX_WIDTH: u32 = 1366;

/// Maximum height any re-encoded image may have, in pixels.
pub const DEFAULT_MAX_HEIGHT: u32 = 768;

/// Quality for the lossy alpha-preserving encode of transparent images.
pub const DEFAULT_ALPHA_QUALITY: f32 = 0.8;

/// Quality for both candidate encodes of opaque images.
pub const DEFAULT_OPAQUE_QUALITY: f32 = 0.7;

/// Policy for a single image transcode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TranscodePolicy {
    /// Bounding box width images are downscaled to fit (never upscaled).
    pub max_width: u32,

    /// Bounding box height images are downscaled to fit (never upscaled).
    pub max_height: u32,

    /// Quality (0.0-1.0) for alpha-bearing images.
    pub alpha_quality: f32,

    /// Quality (0.0-1.0) for opaque images.
    pub opaque_quality: f32,
}

impl Default for TranscodePolicy {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            alpha_quality: DEFAULT_ALPHA_QUALITY,
            opaque_quality: DEFAULT_OPAQUE_QUALITY,
        }
    }
}

impl TranscodePolicy {
    /// Policy with a custom bounding box.
    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = width.max(1);
        self.max_height = height.max(1);
        self
    }

    /// Policy with a custom opaque quality, clamped to 0.1-1.0.
    pub fn with_opaque_quality(mut self, quality: f32) -> Self {
        self.opaque_quality = quality.clamp(0.1, 1.0);
        self
    }

    /// Policy with a custom alpha quality, clamped to 0.1-1.0.
    pub fn with_alpha_quality(mut self, quality: f32) -> Self {
        self.alpha_quality = quality.clamp(0.1, 1.0);
        self
    }
}

/// Batch scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of tasks admitted per batch.
    pub batch_size: usize,

    /// Maximum concurrently running transcodes.
    pub max_concurrent: usize,

    /// In-flight buffer pressure (0.0-1.0) above which a cooldown is inserted.
    pub memory_threshold: f64,

    /// Cooldown pause inserted when over the memory threshold.
    #[serde(skip, default = "default_cooldown")]
    pub cooldown: Duration,

    /// Usable buffer budget in bytes that pressure is measured against.
    pub memory_budget_bytes: u64,
}

fn default_cooldown() -> Duration {
    Duration::from_millis(1000)
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_concurrent: 2,
            memory_threshold: 0.8,
            cooldown: default_cooldown(),
            memory_budget_bytes: 512 * 1024 * 1024,
        }
    }
}

impl BatchConfig {
    /// Config with a custom concurrency cap (at least 1).
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Config with a custom batch size (at least 1).
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Config with a custom memory budget in bytes.
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget_bytes = bytes.max(1);
        self
    }
}

/// Top-level options for one compression run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressionOptions {
    /// Image transcode policy.
    pub transcode: TranscodePolicy,

    /// Batch scheduler configuration.
    pub batch: BatchConfig,
}

impl CompressionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcode(mut self, policy: TranscodePolicy) -> Self {
        self.transcode = policy;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }
}
