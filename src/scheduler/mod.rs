//! Deferred-callback primitives the rate controllers are built on.
//!
//! A [`Scheduler`] can run a task after a delay or on the next frame, and
//! can revoke either before it runs. Two implementations are provided:
//! [`TokioScheduler`] for real time and [`ManualScheduler`] for a virtual
//! clock that the embedder advances explicitly.

mod frame;
mod manual;
mod runtime;

use std::fmt;
use std::time::{Duration, Instant};

pub use frame::{frame_interval, next_frame_deadline, DEFAULT_FPS};
pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

/// Identifies a scheduled timer or frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// A deferred callback. It receives the id it was scheduled under.
pub type Task = Box<dyn FnOnce(TimerId) + Send + 'static>;

/// A platform scheduler capable of delayed and per-frame callbacks.
///
/// Callbacks always run after the scheduling call has returned, never
/// inline, even for a zero delay.
pub trait Scheduler: Send + Sync {
    /// Current time as seen by this scheduler.
    fn now(&self) -> Instant;

    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Revoke a scheduled timer. Returns `false` if it already ran or was
    /// already cancelled.
    fn cancel(&self, id: TimerId) -> bool;

    /// Run `task` at the next frame.
    fn request_frame(&self, task: Task) -> TimerId;

    /// Revoke a frame callback. Returns `false` if it already ran or was
    /// already cancelled.
    fn cancel_frame(&self, id: TimerId) -> bool;
}
