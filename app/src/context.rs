//! Progress reporting and cancellation shared by the workflows

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::RunError;

pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Per-run control handle.
///
/// The progress callback receives `(done, total)` once when a run starts and
/// once per settled file; it may be called from worker threads. Cancellation
/// is checked between files, so a run stops after the files already in flight.
#[derive(Default)]
pub struct RunContext {
    cancel_flag: Arc<AtomicBool>,
    progress: Option<Box<ProgressFn>>,
    done: AtomicUsize,
    total: AtomicUsize,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Flag that cancels this run when set, usable from another thread.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    pub fn check_cancelled(&self) -> Result<(), RunError> {
        if self.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub(crate) fn start(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        self.report(0, total);
    }

    pub(crate) fn advance(&self) {
        let total = self.total.load(Ordering::Relaxed);
        let done = (self.done.fetch_add(1, Ordering::Relaxed) + 1).min(total);
        self.report(done, total);
    }

    fn report(&self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        if let Some(progress) = &self.progress {
            progress(done, total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_reports_start_and_each_step() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let ctx = RunContext::new().with_progress(move |done, total| sink.lock().unwrap().push((done, total)));

        ctx.start(2);
        ctx.advance();
        ctx.advance();
        ctx.advance();

        assert_eq!(*calls.lock().unwrap(), vec![(0, 2), (1, 2), (2, 2), (2, 2)]);
        assert_eq!(ctx.completed(), 3);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let ctx = RunContext::new();
        assert!(ctx.check_cancelled().is_ok());

        ctx.cancel_flag().store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check_cancelled(), Err(RunError::Cancelled)));
    }

    #[test]
    fn test_zero_total_is_silent() {
        let calls = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&calls);
        let ctx = RunContext::new().with_progress(move |_, _| *sink.lock().unwrap() += 1);
        ctx.start(0);
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
