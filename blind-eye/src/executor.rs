//! Single background executor with keep-only-latest backpressure

use crate::analyzer::FrameAnalyzer;
use crate::error::AnalyzerError;
use crate::frame::CameraFrame;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Result of handing a frame to the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The frame is waiting for the worker
    Queued,
    /// The frame replaced an older one that had not started yet
    Replaced,
    /// The executor is shutting down
    Rejected,
}

/// Snapshot of executor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub submitted: u64,
    pub dropped: u64,
    pub analysed: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    analysed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Default)]
struct Slot {
    pending: Option<CameraFrame>,
    shutdown: bool,
}

struct Shared {
    slot: Mutex<Slot>,
    ready: Condvar,
    counters: Counters,
}

/// Runs a [`FrameAnalyzer`] on one dedicated thread.
///
/// At most one frame waits for the worker; submitting while a frame is
/// pending replaces it. Frames are processed strictly one at a time.
pub struct AnalysisExecutor {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl AnalysisExecutor {
    /// Start the worker thread
    pub fn spawn(analyzer: FrameAnalyzer) -> Result<Self, AnalyzerError> {
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::default()),
            ready: Condvar::new(),
            counters: Counters::default(),
        });

        let worker_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("frame-analyzer".to_string())
            .spawn(move || worker_loop(analyzer, worker_shared))?;

        info!("Frame analysis executor started");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Hand a frame to the worker without blocking
    pub fn submit(&self, frame: CameraFrame) -> Submission {
        let mut slot = self.shared.slot.lock();
        if slot.shutdown {
            return Submission::Rejected;
        }

        self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let replaced = slot.pending.replace(frame).is_some();
        drop(slot);
        self.shared.ready.notify_one();

        if replaced {
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Dropped stale frame in favour of the latest one");
            Submission::Replaced
        } else {
            Submission::Queued
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        let c = &self.shared.counters;
        ExecutorStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            analysed: c.analysed.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Whether the worker thread is alive and accepting frames
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Stop accepting frames, let the in-flight frame finish and join the worker.
    /// A pending frame that has not started is dropped.
    pub fn shutdown(&mut self) -> ExecutorStats {
        {
            let mut slot = self.shared.slot.lock();
            slot.shutdown = true;
        }
        self.shared.ready.notify_all();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Frame analysis worker panicked");
            }
            info!("Frame analysis executor stopped");
        }
        self.stats()
    }
}

impl Drop for AnalysisExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(mut analyzer: FrameAnalyzer, shared: Arc<Shared>) {
    loop {
        let frame = {
            let mut slot = shared.slot.lock();
            while slot.pending.is_none() && !slot.shutdown {
                shared.ready.wait(&mut slot);
            }
            if slot.shutdown {
                if slot.pending.take().is_some() {
                    shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
                break;
            }
            match slot.pending.take() {
                Some(frame) => frame,
                None => continue,
            }
        };

        // A panicking backend or sink costs one frame, not the worker
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(&frame)));
        match outcome {
            Ok(Ok(Some(_))) => {
                shared.counters.analysed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Ok(None)) => {
                shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("Frame analysis failed: {}", e);
            }
            Err(_) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("Frame analysis panicked, frame discarded");
            }
        }
    }
}
