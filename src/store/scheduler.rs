//! View-Notification Scheduling
//!
//! The store batches view refreshes onto the "next tick" instead of emitting
//! one per mutation. The tick source is pluggable: production code uses the
//! Tokio runtime, tests use a manual scheduler and drive ticks explicitly.

use std::sync::{Arc, Mutex};

/// A pluggable "next tick" source
pub trait TickScheduler: Send + Sync {
    /// Run `f` after the current callback turn completes
    fn schedule(&self, f: Box<dyn FnOnce() + Send>);
}

/// Schedules callbacks onto the next poll of the current Tokio runtime
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl TickScheduler for TokioScheduler {
    fn schedule(&self, f: Box<dyn FnOnce() + Send>) {
        tokio::spawn(async move {
            f();
        });
    }
}

/// Test scheduler that collects callbacks until `run_pending` is called
#[derive(Default, Clone)]
pub struct ManualScheduler {
    pending: Arc<Mutex<Vec<Box<dyn FnOnce() + Send>>>>,
}

impl ManualScheduler {
    /// Create an empty manual scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every scheduled callback, returning how many ran
    pub fn run_pending(&self) -> usize {
        let callbacks: Vec<_> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain(..).collect()
        };
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }

    /// Number of callbacks waiting for a tick
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl TickScheduler for ManualScheduler {
    fn schedule(&self, f: Box<dyn FnOnce() + Send>) {
        self.pending.lock().unwrap().push(f);
    }
}
