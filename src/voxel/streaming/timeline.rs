//! Monotonic timeline counters shared by the world and the tracer
//!
//! A timeline has two values: the highest value *submitted* (a signal is
//! enqueued and will eventually complete) and the highest value
//! *completed*. CPU waits block on `completed`; GPU-side waits are
//! satisfied by queue submission order, so they only check that the
//! awaited value has been submitted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::error::Error;
use crate::core::types::Result;

/// Poll interval while waiting for device progress
const WAIT_SLICE: Duration = Duration::from_millis(1);

struct Inner {
    name: &'static str,
    submitted: AtomicU64,
    completed: Mutex<u64>,
    cond: Condvar,
}

/// Cloneable handle to one timeline
#[derive(Clone)]
pub struct Timeline {
    inner: Arc<Inner>,
}

impl Timeline {
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                submitted: AtomicU64::new(0),
                completed: Mutex::new(0),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn submitted(&self) -> u64 {
        self.inner.submitted.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        *self.inner.completed.lock()
    }

    /// A signal of `value` has been enqueued behind submitted work
    pub fn mark_submitted(&self, value: u64) {
        self.inner.submitted.fetch_max(value, Ordering::AcqRel);
    }

    /// The work guarded by `value` has finished. Safe to call from device
    /// callbacks on any thread.
    pub fn complete(&self, value: u64) {
        self.mark_submitted(value);
        let mut completed = self.inner.completed.lock();
        if value > *completed {
            *completed = value;
            self.inner.cond.notify_all();
        }
    }

    /// Signal from the host with nothing to wait on
    pub fn signal_host(&self, value: u64) {
        log::trace!("timeline {}: host signal {}", self.inner.name, value);
        self.complete(value);
    }

    /// Check a GPU-side wait: the awaited value must already be submitted,
    /// otherwise the waiting submission could never run.
    pub fn gpu_wait(&self, value: u64) -> Result<()> {
        let submitted = self.submitted();
        if submitted < value {
            return Err(Error::Sync(format!(
                "GPU wait on {} timeline value {} but only {} was submitted",
                self.inner.name, value, submitted
            )));
        }
        Ok(())
    }

    /// Block until `completed >= value`, calling `poll` between waits so a
    /// device can make progress. Fails instead of hanging when `value` has
    /// never been submitted.
    pub fn wait_with<F: FnMut()>(&self, value: u64, mut poll: F) -> Result<()> {
        loop {
            {
                let mut completed = self.inner.completed.lock();
                if *completed >= value {
                    return Ok(());
                }
                if self.submitted() < value {
                    return Err(Error::Sync(format!(
                        "{} timeline wait on {} can never complete (submitted {})",
                        self.inner.name, value, self.submitted()
                    )));
                }
                self.inner.cond.wait_for(&mut completed, WAIT_SLICE);
                if *completed >= value {
                    return Ok(());
                }
            }
            poll();
        }
    }

    /// Block until `completed >= value`
    pub fn wait(&self, value: u64) -> Result<()> {
        self.wait_with(value, || {})
    }
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("name", &self.inner.name)
            .field("submitted", &self.submitted())
            .field("completed", &self.completed())
            .finish()
    }
}

/// The three timelines coupling the world and the tracer
#[derive(Clone, Debug)]
pub struct SyncPoints {
    /// Signalled by the tracer once its frame (and load-queue writes) are submitted
    pub halt: Timeline,
    /// Signalled when a tick's staged bricks are uploaded
    pub load: Timeline,
    /// Signalled when a tick's bricks and indices are scattered into place
    pub processed: Timeline,
}

impl SyncPoints {
    pub fn new() -> Self {
        Self {
            halt: Timeline::new("halt"),
            load: Timeline::new("load"),
            processed: Timeline::new("processed"),
        }
    }
}

impl Default for SyncPoints {
    fn default() -> Self {
        Self::new()
    }
}
