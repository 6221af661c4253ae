//! Scheduler backed by the tokio runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use super::frame::{frame_interval, next_frame_deadline, DEFAULT_FPS};
use super::{Scheduler, Task, TimerId};
use crate::error::{CadenceError, Result};

/// A scheduler that runs each callback in its own tokio task.
///
/// Cancelling aborts the task. Frames are boundaries of a fixed-rate
/// frame clock that starts when the scheduler is created.
pub struct TokioScheduler {
    /// Runtime the timer tasks are spawned on
    handle: Handle,
    /// Live timer tasks, removed once their callback returns or on cancel
    timers: Arc<DashMap<TimerId, JoinHandle<()>>>,
    next_id: AtomicU64,
    /// Origin of the frame clock
    epoch: tokio::time::Instant,
    frame_interval: Duration,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            timers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            epoch: tokio::time::Instant::now(),
            frame_interval: frame_interval(DEFAULT_FPS),
        }
    }

    /// Create a scheduler on the runtime of the calling thread.
    pub fn try_current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| CadenceError::NoRuntime)
    }

    /// Set the frame clock interval.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Interval of the frame clock.
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Number of timer and frame tasks that are waiting or still running
    /// their callback.
    ///
    /// Zero means every callback scheduled so far has returned or was
    /// cancelled.
    pub fn live_timers(&self) -> usize {
        self.timers.len()
    }

    fn spawn_at(&self, deadline: tokio::time::Instant, task: Task) -> TimerId {
        let id = TimerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));

        // The shard stays locked until the handle is stored, so the task's own
        // removal below cannot run before the insert.
        let slot = self.timers.entry(id);

        let timers = Arc::clone(&self.timers);
        let join = self.handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            trace!(timer = %id, "Timer fired");
            task(id);
            timers.remove(&id);
        });
        slot.insert(join);
        id
    }

    fn abort(&self, id: TimerId) -> bool {
        match self.timers.remove(&id) {
            Some((_, join)) => {
                join.abort();
                trace!(timer = %id, "Timer aborted");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("live_timers", &self.live_timers())
            .field("frame_interval", &self.frame_interval)
            .finish()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        self.spawn_at(tokio::time::Instant::now() + delay, task)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.abort(id)
    }

    fn request_frame(&self, task: Task) -> TimerId {
        let deadline = next_frame_deadline(
            self.epoch.into_std(),
            tokio::time::Instant::now().into_std(),
            self.frame_interval,
        );
        self.spawn_at(tokio::time::Instant::from_std(deadline), task)
    }

    fn cancel_frame(&self, id: TimerId) -> bool {
        self.abort(id)
    }
}
