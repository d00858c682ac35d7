//! The compression pipeline.
//!
//! Phases run strictly in sequence: open and validate the archive, sweep
//! unreferenced media, resolve crops, transcode images in batches, strip
//! baked `srcRect` elements, and re-serialize. Per-image failures keep the
//! original bytes and never abort the run; only archive open and final
//! serialization are fatal. Whatever happens, the output is a valid
//! package; in the worst case it equals the cleaned input.

use crate::crop::{self, CropPlan};
use crate::package::PptxPackage;
use crate::rels;
use crate::scheduler::{self, ImageTask, TaskOutcome, TaskResult};
use slimdeck_core::{
    CompressionOptions, Error, Phase, ProgressEvent, ProgressReporter, ProgressSink, Result,
    RunSummary,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Handle for requesting cancellation of a running compression.
///
/// Aborts take effect at phase and batch boundaries; in-flight transcodes
/// are awaited before the run reports `Aborted`.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One terminal event closes the stream produced by [`compress_stream`].
#[derive(Debug)]
pub enum CompressionEvent {
    /// An intermediate progress update.
    Progress(ProgressEvent),

    /// The run finished; carries the package bytes and counters.
    Done { bytes: Vec<u8>, summary: RunSummary },

    /// The run failed; no partial output exists.
    Failed { message: String },
}

/// The document-aware recompressor.
#[derive(Debug, Clone)]
pub struct Compressor {
    options: CompressionOptions,
    abort: Arc<AtomicBool>,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressionOptions::default())
    }
}

impl Compressor {
    pub fn new(options: CompressionOptions) -> Self {
        Self {
            options,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that cancels this compressor's runs.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            flag: Arc::clone(&self.abort),
        }
    }

    /// Compress a presentation, returning the finished package bytes.
    pub async fn compress(
        &self,
        bytes: &[u8],
        file_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        self.compress_with_summary(bytes, file_name, sink)
            .await
            .map(|(bytes, _)| bytes)
    }

    /// Compress a presentation, returning the bytes and run counters.
    ///
    /// The file name is checked before any progress is emitted: anything
    /// not ending in `.pptx` (case-insensitive) fails with
    /// `UnsupportedFileType` and produces zero events.
    pub async fn compress_with_summary(
        &self,
        bytes: &[u8],
        file_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(Vec<u8>, RunSummary)> {
        if !file_name.to_lowercase().ends_with(".pptx") {
            return Err(Error::UnsupportedFileType(file_name.to_string()));
        }

        let reporter = ProgressReporter::new(sink);
        let mut summary = RunSummary {
            original_size: bytes.len() as u64,
            ..Default::default()
        };

        // Phase 1: open and validate.
        reporter.phase(Phase::Open, "Starting compression...");
        let mut package = PptxPackage::open(bytes)?;
        log::info!("{file_name}: opened package with {} entries", package.len());
        reporter.phase_done(Phase::Open, "Analyzing file structure...");
        self.ensure_not_aborted()?;

        // Phase 2: sweep unreferenced media.
        let sweep = rels::sweep_unused_media(&mut package);
        summary.media_swept = sweep.removed.len();
        log::info!("{file_name}: removed {} unused media entries", sweep.removed.len());
        reporter.phase_done(Phase::Cleanup, "Cleaned unused media");
        self.ensure_not_aborted()?;

        // Phase 3: resolve crops.
        let plan = crop::extract_crop_plan(&package);
        log::info!(
            "{file_name}: planned {} crops ({} conflicting paths left uncropped)",
            plan.crops.len(),
            plan.conflicting.len()
        );
        reporter.phase_done(Phase::CropResolve, "Resolved image crops");
        self.ensure_not_aborted()?;

        // Phase 4: batched transcoding.
        let tasks = self.build_tasks(&package, &plan)?;
        let total = tasks.len();
        reporter.within(Phase::Transcode, 0, total.max(1), "Processing images...");

        let mut processed = 0usize;
        let mut replacements: Vec<TaskResult> = Vec::new();
        let stats = scheduler::run_batches(
            tasks,
            self.options.transcode,
            &self.options.batch,
            &self.abort,
            |result| {
                processed += 1;
                reporter.within(
                    Phase::Transcode,
                    processed,
                    total,
                    format!("Processing image {processed} of {total}"),
                );
                if matches!(result.outcome, TaskOutcome::Replaced { .. }) {
                    replacements.push(result);
                }
            },
        )
        .await?;
        summary.images_kept = stats.kept;
        summary.images_failed = stats.failed;

        // Phase 4b: strip baked srcRects, then apply replacements. A slide
        // that cannot be rewritten disqualifies its crops so the package
        // never ends up with a baked crop the XML still re-applies.
        let dropped = self.strip_baked_crops(&mut package, &plan, &mut replacements, &mut summary);
        summary.images_kept += dropped;

        for result in replacements {
            if let TaskOutcome::Replaced { bytes, .. } = result.outcome {
                package.replace(&result.path, bytes)?;
                summary.images_replaced += 1;
            }
        }

        // Phase 5: re-serialize.
        reporter.phase(Phase::Serialize, "Finalizing compression...");
        let output = package.serialize(|done, entries| {
            reporter.within(Phase::Serialize, done, entries, "Generating compressed file...");
        })?;
        summary.compressed_size = output.len() as u64;
        reporter.report(100, "Compression complete!");
        log::info!(
            "{file_name}: {} -> {} bytes ({} replaced, {} kept, {} failed)",
            summary.original_size,
            summary.compressed_size,
            summary.images_replaced,
            summary.images_kept,
            summary.images_failed
        );

        Ok((output, summary))
    }

    /// Collect a task for every processable raster entry, attaching the
    /// planned crop where one exists.
    fn build_tasks(&self, package: &PptxPackage, plan: &CropPlan) -> Result<Vec<ImageTask>> {
        let paths = package.paths_where(rels::is_raster_media);
        let mut tasks = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = package.read(&path)?.to_vec();
            let crop = plan.crop_for(&path).map(|c| c.rect);
            tasks.push(ImageTask { path, bytes, crop });
        }
        Ok(tasks)
    }

    /// Strip `srcRect` elements for successfully baked crops.
    ///
    /// Returns the number of replacements dropped because their slide XML
    /// could not be rewritten.
    fn strip_baked_crops(
        &self,
        package: &mut PptxPackage,
        plan: &CropPlan,
        replacements: &mut Vec<TaskResult>,
        summary: &mut RunSummary,
    ) -> usize {
        let baked: HashSet<&str> = replacements
            .iter()
            .filter(|r| r.crop_baked)
            .map(|r| r.path.as_str())
            .collect();
        if baked.is_empty() {
            return 0;
        }

        // slide part -> relationship ids whose srcRect must go
        let mut per_slide: HashMap<String, HashSet<String>> = HashMap::new();
        for planned in plan.crops.iter().filter(|c| baked.contains(c.image_path.as_str())) {
            for reference in &planned.refs {
                per_slide
                    .entry(reference.slide_path.clone())
                    .or_default()
                    .insert(reference.rel_id.clone());
            }
        }

        // Snapshot every touched slide so a failed rewrite can roll the
        // whole strip back. A slide whose srcRect is gone while the image
        // kept its original bytes would show the full uncropped image.
        let mut originals: HashMap<&str, Vec<u8>> = HashMap::new();
        for slide_path in per_slide.keys() {
            if let Ok(bytes) = package.read(slide_path) {
                originals.insert(slide_path.as_str(), bytes.to_vec());
            }
        }

        let mut applied = 0usize;
        let mut failed = false;
        for (slide_path, rel_ids) in &per_slide {
            match crop::strip_src_rects(package, slide_path, rel_ids) {
                Ok(stripped) => applied += stripped,
                Err(e) => {
                    log::warn!("could not strip srcRect from {slide_path}: {e}");
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            summary.crops_applied += applied;
            return 0;
        }

        // Roll back: restore every snapshotted slide and keep the original
        // bytes for all crop-baked images.
        for (slide_path, bytes) in originals {
            if let Err(e) = package.replace(slide_path, bytes) {
                log::warn!("could not restore {slide_path}: {e}");
            }
        }
        let before = replacements.len();
        replacements.retain(|r| !r.crop_baked);
        before - replacements.len()
    }

    fn ensure_not_aborted(&self) -> Result<()> {
        if self.abort.load(Ordering::SeqCst) {
            Err(Error::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Progress sink backed by an unbounded channel.
struct ChannelSink {
    sender: mpsc::UnboundedSender<CompressionEvent>,
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.sender.send(CompressionEvent::Progress(event));
    }
}

/// Run a compression on a background task, streaming progress events and
/// exactly one terminal `Done` or `Failed` event.
///
/// Must be called within a tokio runtime. Returns the event receiver and
/// an abort handle for cancellation.
pub fn compress_stream(
    options: CompressionOptions,
    bytes: Vec<u8>,
    file_name: String,
) -> (mpsc::UnboundedReceiver<CompressionEvent>, AbortHandle) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let compressor = Compressor::new(options);
    let abort = compressor.abort_handle();

    tokio::spawn(async move {
        let sink = ChannelSink {
            sender: sender.clone(),
        };
        let terminal = match compressor
            .compress_with_summary(&bytes, &file_name, &sink)
            .await
        {
            Ok((bytes, summary)) => CompressionEvent::Done { bytes, summary },
            Err(e) => CompressionEvent::Failed {
                message: e.to_string(),
            },
        };
        let _ = sender.send(terminal);
    });

    (receiver, abort)
}
