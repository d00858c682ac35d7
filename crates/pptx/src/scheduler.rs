//! Bounded-concurrency batch driver for image transcodes.
//!
//! Tasks are admitted in small batches; within a batch, transcodes run on
//! blocking worker threads gated by a semaphore. Each batch is fully drained
//! before the next is admitted, so completions are applied by the single
//! coordinating task and no two tasks ever touch the package concurrently.
//! Before admitting a batch the scheduler samples buffer pressure against a
//! byte budget and inserts a cooldown when over the threshold, a soft
//! brake rather than a failure.

use slimdeck_core::{BatchConfig, Error, Result, TranscodePolicy};
use slimdeck_media::{transcode, CropRect, OutputFormat, TranscodeOutput};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Unit of work: one image entry with its bytes and optional crop.
#[derive(Debug, Clone)]
pub struct ImageTask {
    /// Entry path inside the package.
    pub path: String,

    /// Original entry bytes.
    pub bytes: Vec<u8>,

    /// Crop to bake before re-encoding, if the slide XML carried one.
    pub crop: Option<CropRect>,
}

/// Lifecycle of a task. `Failed` is terminal and resolves to keeping the
/// original bytes; failed tasks are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
}

/// Terminal result of one task.
#[derive(Debug)]
pub struct TaskResult {
    pub path: String,

    /// Whether the task carried a crop that was baked into the output.
    pub crop_baked: bool,

    pub outcome: TaskOutcome,
}

/// What happened to the image.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Re-encode was strictly smaller; these bytes replace the entry.
    Replaced { bytes: Vec<u8>, format: OutputFormat },

    /// Re-encode did not shrink the image; entry stays untouched.
    KeptOriginal,

    /// Transcode failed; entry stays untouched.
    Failed(Error),
}

impl TaskResult {
    pub fn state(&self) -> TaskState {
        match self.outcome {
            TaskOutcome::Failed(_) => TaskState::Failed,
            _ => TaskState::Done,
        }
    }
}

/// Aggregate counts across a scheduler run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub replaced: usize,
    pub kept: usize,
    pub failed: usize,
}

/// Drive all tasks to a terminal state, invoking `on_done` for each
/// completion from the coordinating task.
///
/// Returns `Aborted` when the abort flag is raised at a batch boundary;
/// in-flight tasks of the current batch are always awaited first.
pub async fn run_batches<F>(
    tasks: Vec<ImageTask>,
    policy: TranscodePolicy,
    config: &BatchConfig,
    abort: &Arc<AtomicBool>,
    mut on_done: F,
) -> Result<SchedulerStats>
where
    F: FnMut(TaskResult),
{
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
    let in_flight_bytes = Arc::new(AtomicU64::new(0));
    let mut stats = SchedulerStats::default();

    let mut pending = tasks.into_iter().peekable();
    while pending.peek().is_some() {
        if abort.load(Ordering::SeqCst) {
            log::info!("abort requested; no further batches admitted");
            return Err(Error::Aborted);
        }

        let batch: Vec<ImageTask> = pending.by_ref().take(config.batch_size).collect();
        cool_down_if_pressured(&batch, config, &in_flight_bytes).await;

        let mut join_set = JoinSet::new();
        for task in batch {
            let semaphore = Arc::clone(&semaphore);
            let gauge = Arc::clone(&in_flight_bytes);
            let task_bytes = task.bytes.len() as u64;
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        // The semaphore is never closed while batches run.
                        return TaskResult {
                            path: task.path,
                            crop_baked: false,
                            outcome: TaskOutcome::Failed(Error::EncodeError(format!(
                                "worker pool unavailable: {e}"
                            ))),
                        };
                    }
                };
                gauge.fetch_add(task_bytes, Ordering::SeqCst);
                log::debug!("{}: pending -> running", task.path);
                let path = task.path.clone();
                let result = tokio::task::spawn_blocking(move || run_task(task, &policy))
                    .await
                    .unwrap_or_else(|e| TaskResult {
                        path,
                        crop_baked: false,
                        outcome: TaskOutcome::Failed(Error::EncodeError(format!(
                            "transcode worker panicked: {e}"
                        ))),
                    });
                gauge.fetch_sub(task_bytes, Ordering::SeqCst);
                result
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    match result.state() {
                        TaskState::Failed => stats.failed += 1,
                        _ => match result.outcome {
                            TaskOutcome::Replaced { .. } => stats.replaced += 1,
                            _ => stats.kept += 1,
                        },
                    }
                    on_done(result);
                }
                Err(e) => {
                    // Only reachable if the coordinating future itself
                    // panicked; the task's entry stays untouched.
                    log::error!("batch task join failed: {e}");
                    stats.failed += 1;
                }
            }
        }
    }

    Ok(stats)
}

/// Soft memory brake: if admitting this batch would push buffered bytes
/// over the threshold share of the budget, pause once before continuing.
async fn cool_down_if_pressured(
    batch: &[ImageTask],
    config: &BatchConfig,
    in_flight_bytes: &AtomicU64,
) {
    let incoming: u64 = batch.iter().map(|t| t.bytes.len() as u64).sum();
    let projected = in_flight_bytes.load(Ordering::SeqCst).saturating_add(incoming);
    let pressure = projected as f64 / config.memory_budget_bytes as f64;
    if pressure > config.memory_threshold {
        log::debug!(
            "buffer pressure {:.2} over threshold {:.2}; cooling down for {:?}",
            pressure,
            config.memory_threshold,
            config.cooldown
        );
        tokio::time::sleep(config.cooldown).await;
    }
}

/// Run one task to a terminal state on a worker thread.
fn run_task(task: ImageTask, policy: &TranscodePolicy) -> TaskResult {
    let ImageTask { path, bytes, crop } = task;
    match transcode(&path, &bytes, crop, policy) {
        Ok(TranscodeOutput::Replaced { bytes, format }) => {
            log::debug!("{path}: running -> done (replaced, {format:?})");
            TaskResult {
                path,
                crop_baked: crop.is_some(),
                outcome: TaskOutcome::Replaced { bytes, format },
            }
        }
        Ok(TranscodeOutput::KeptOriginal) => {
            log::debug!("{path}: running -> done (kept original)");
            TaskResult {
                path,
                crop_baked: false,
                outcome: TaskOutcome::KeptOriginal,
            }
        }
        Err(error) => {
            log::warn!("{path}: running -> failed, keeping original bytes: {error}");
            TaskResult {
                path,
                crop_baked: false,
                outcome: TaskOutcome::Failed(error),
            }
        }
    }
}
