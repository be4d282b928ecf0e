//! Explicit run context shared by the pipeline, the crawler and the caller.
//!
//! The caller owns the lifecycle: create one context at process start, hand
//! it to every run, and flip the interrupt flag (e.g. from a Ctrl-C handler)
//! to stop at the next stage or round boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Atomic counters describing the run in progress.
///
/// Updated from concurrent fetch tasks; read by progress displays.
#[derive(Debug, Default)]
pub struct RunProgress {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl RunProgress {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes every counter at the start of a run.
    pub fn reset(&self) {
        self.total.store(0, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
    }

    /// Adds `count` pages to the expected total.
    pub fn add_total(&self, count: usize) {
        self.total.fetch_add(count, Ordering::SeqCst);
    }

    /// Records one successfully fetched page.
    pub fn record_success(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Records one page that could not be fetched.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Pages expected so far.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Pages fetched successfully.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Pages that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Pages finished either way.
    #[must_use]
    pub fn done(&self) -> usize {
        self.completed() + self.failed()
    }
}

/// Context passed to every pipeline run and crawl.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    interrupted: Arc<AtomicBool>,
    progress: Arc<RunProgress>,
}

impl RunContext {
    /// Creates a context with a fresh interrupt flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context observing an existing interrupt flag.
    #[must_use]
    pub fn with_interrupt_flag(interrupted: Arc<AtomicBool>) -> Self {
        Self {
            interrupted,
            progress: Arc::new(RunProgress::new()),
        }
    }

    /// Whether the caller asked the current run to stop.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Requests a stop at the next boundary.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// The shared interrupt flag.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Progress counters for the current run.
    #[must_use]
    pub fn progress(&self) -> &Arc<RunProgress> {
        &self.progress
    }
}
