//! PPTX recompression: package model, unused-media sweep, crop baking,
//! and the batched compression pipeline.
//!
//! A .pptx file is a ZIP archive of XML parts and binary media. This crate
//! opens the package in memory, deletes media nothing references, bakes
//! slide crops into their images, re-encodes every raster image that can be
//! made smaller, and writes the package back out, never growing an image
//! and never producing an invalid archive.

pub mod crop;
pub mod package;
pub mod pipeline;
pub mod rels;
pub mod scheduler;

#[cfg(test)]
mod testutil;

pub use crop::{CropPlan, CropReference, PlannedCrop};
pub use package::PptxPackage;
pub use pipeline::{compress_stream, AbortHandle, CompressionEvent, Compressor};
pub use rels::{MediaReachability, SweepReport};
pub use scheduler::{ImageTask, SchedulerStats, TaskOutcome, TaskResult, TaskState};
