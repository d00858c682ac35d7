//! Phase-weighted progress reporting.
//!
//! A run moves through five sequential phases, each owning a fixed slice of
//! the 0-100 range. Reported percentages are monotonically non-decreasing;
//! the reporter clamps anything that would regress or overshoot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Percentage complete, 0-100.
    pub percent: u8,

    /// Human-readable status line.
    pub status: String,
}

/// Sequential phases of a compression run with their percentage spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Opening and validating the archive.
    Open,
    /// Sweeping unreferenced media.
    Cleanup,
    /// Resolving crop rectangles from slide XML.
    CropResolve,
    /// Transcoding images in batches.
    Transcode,
    /// Re-serializing the package.
    Serialize,
}

impl Phase {
    /// Percentage span (start, end) owned by this phase.
    pub fn span(self) -> (u8, u8) {
        match self {
            Phase::Open => (0, 10),
            Phase::Cleanup => (10, 20),
            Phase::CropResolve => (20, 30),
            Phase::Transcode => (30, 80),
            Phase::Serialize => (80, 100),
        }
    }

    /// Percentage at which this phase begins.
    pub fn start(self) -> u8 {
        self.span().0
    }

    /// Percentage at which this phase ends.
    pub fn end(self) -> u8 {
        self.span().1
    }

    /// Map a done/total ratio into this phase's span.
    pub fn at(self, done: usize, total: usize) -> u8 {
        let (start, end) = self.span();
        if total == 0 {
            return end;
        }
        let done = done.min(total);
        let width = (end - start) as f64;
        start + (width * done as f64 / total as f64).round() as u8
    }
}

/// Destination for progress events.
///
/// Injected into the pipeline rather than living in process-wide state, so
/// one process can run independent compressions with independent observers.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that records events for inspection in tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events emitted so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("sink poisoned").clone()
    }

    /// Just the percentages, in emission order.
    pub fn percents(&self) -> Vec<u8> {
        self.events().iter().map(|e| e.percent).collect()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().expect("sink poisoned").push(event);
    }
}

/// Monotonic wrapper around a sink.
///
/// Tracks the highest percentage reported so far and never lets a later
/// event fall below it or exceed 100.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    last: AtomicU8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
        }
    }

    /// Report raw percentage with a status line.
    pub fn report(&self, percent: u8, status: impl Into<String>) {
        let clamped = percent.min(100);
        let last = self.last.fetch_max(clamped, Ordering::SeqCst);
        let percent = clamped.max(last);
        self.sink.emit(ProgressEvent {
            percent,
            status: status.into(),
        });
    }

    /// Report entry into a phase.
    pub fn phase(&self, phase: Phase, status: impl Into<String>) {
        self.report(phase.start(), status);
    }

    /// Report completion of a phase.
    pub fn phase_done(&self, phase: Phase, status: impl Into<String>) {
        self.report(phase.end(), status);
    }

    /// Report fractional progress within a phase.
    pub fn within(&self, phase: Phase, done: usize, total: usize, status: impl Into<String>) {
        self.report(phase.at(done, total), status);
    }
}
