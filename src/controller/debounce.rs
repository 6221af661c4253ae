//! Debounce controller.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::slot::TimerSlot;
use super::Action;
use crate::error::{CadenceError, Result};
use crate::scheduler::{Scheduler, TimerId};

/// Options for a [`Debounced`] controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceOptions {
    /// Deliver the first call of a burst immediately
    pub leading: bool,
    /// Deliver the last call of a burst once it has gone quiet
    pub trailing: bool,
    /// Upper bound on how long a burst may delay its delivery
    pub max_wait: Option<Duration>,
}

impl Default for DebounceOptions {
    fn default() -> Self {
        Self {
            leading: false,
            trailing: true,
            max_wait: None,
        }
    }
}

impl DebounceOptions {
    /// Deliver the first call of a burst immediately.
    pub fn leading(mut self, leading: bool) -> Self {
        self.leading = leading;
        self
    }

    /// Deliver the last call of a burst once the wait has elapsed quietly.
    pub fn trailing(mut self, trailing: bool) -> Self {
        self.trailing = trailing;
        self
    }

    /// Upper bound on how long a call may stay pending during a
    /// continuous burst.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Reject combinations that can never deliver.
    pub fn validate(&self) -> Result<()> {
        if !self.leading && !self.trailing {
            return Err(CadenceError::InvalidOptions(
                "debounce needs a leading or a trailing edge".to_string(),
            ));
        }
        Ok(())
    }
}

/// Collapses bursts of calls into a single delivery of the latest call.
///
/// Every call pushes the trailing deadline back by `wait`. An optional
/// `max_wait` bounds how long a continuous burst can hold delivery off.
/// Clones share the same controller.
pub struct Debounced<A: Send + 'static> {
    shared: Arc<Shared<A>>,
}

struct Shared<A> {
    action: Action<A>,
    wait: Duration,
    options: DebounceOptions,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<State<A>>,
}

struct State<A> {
    /// Latest call not yet delivered
    pending: Option<A>,
    last_call: Option<Instant>,
    /// Trailing-edge timer; live for the whole burst
    primary: TimerSlot,
    max_wait: TimerSlot,
}

impl<A: Send + 'static> Debounced<A> {
    /// Wrap `action` so calls are debounced by `wait` on `scheduler`.
    pub fn new<F>(
        action: F,
        wait: Duration,
        options: DebounceOptions,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        options.validate()?;

        debug!(
            wait_ms = wait.as_millis() as u64,
            leading = options.leading,
            trailing = options.trailing,
            max_wait = ?options.max_wait,
            "Creating debounced controller"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                action: Box::new(action),
                wait,
                options,
                scheduler,
                state: Mutex::new(State {
                    pending: None,
                    last_call: None,
                    primary: TimerSlot::timer(),
                    max_wait: TimerSlot::timer(),
                }),
            }),
        })
    }

    /// Record a call. Delivers synchronously only on a leading edge.
    pub fn invoke(&self, args: A) {
        Shared::invoke(&self.shared, args);
    }

    /// Drop the pending call and every live timer.
    pub fn cancel(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        let had_timer = state.primary.disarm(&*shared.scheduler);
        state.max_wait.disarm(&*shared.scheduler);
        let dropped = state.pending.take().is_some();
        state.last_call = None;

        if had_timer || dropped {
            debug!(dropped_call = dropped, "Debounce cancelled");
        }
    }

    /// Deliver the pending call now, if one is due to be delivered later.
    ///
    /// With `trailing` off, a pending call is only delivered when a max-wait
    /// timer is running; otherwise it is left for the burst to drop and
    /// nothing changes. Returns whether a delivery happened.
    pub fn flush(&self) -> bool {
        let shared = &self.shared;
        let due = {
            let mut state = shared.state.lock();
            if !shared.options.trailing && !state.max_wait.is_live() {
                return false;
            }
            let due = state.pending.take();
            if due.is_some() {
                state.primary.disarm(&*shared.scheduler);
                state.max_wait.disarm(&*shared.scheduler);
            }
            due
        };

        match due {
            Some(args) => {
                debug!("Debounce flushed");
                (shared.action)(args);
                true
            }
            None => false,
        }
    }

    /// Whether a trailing timer is scheduled.
    pub fn pending(&self) -> bool {
        self.shared.state.lock().primary.is_live()
    }

    /// Quiet period that ends a burst.
    pub fn wait(&self) -> Duration {
        self.shared.wait
    }

    /// Edge and max-wait settings the controller was built with.
    pub fn options(&self) -> DebounceOptions {
        self.shared.options
    }

    /// Scheduler time of the most recent call in the current burst.
    pub fn last_call(&self) -> Option<Instant> {
        self.shared.state.lock().last_call
    }
}

impl<A: Send + 'static> Shared<A> {
    fn invoke(this: &Arc<Self>, args: A) {
        let leading = {
            let mut state = this.state.lock();
            let burst_start = !state.primary.is_live();
            state.last_call = Some(this.scheduler.now());

            let leading = if this.options.leading && burst_start {
                Some(args)
            } else {
                state.pending = Some(args);
                None
            };

            let weak = Arc::downgrade(this);
            state.primary.arm(
                &*this.scheduler,
                this.wait,
                Box::new(move |id| Self::fire(&weak, id, Self::on_primary)),
            );

            if let Some(max_wait) = this.options.max_wait {
                if !state.max_wait.is_live() {
                    let weak = Arc::downgrade(this);
                    state.max_wait.arm(
                        &*this.scheduler,
                        max_wait,
                        Box::new(move |id| Self::fire(&weak, id, Self::on_max_wait)),
                    );
                }
            }

            trace!(burst_start, "Debounce invoked");
            leading
        };

        if let Some(args) = leading {
            debug!("Debounce delivering leading edge");
            (this.action)(args);
        }
    }

    fn fire(weak: &Weak<Self>, id: TimerId, handler: fn(&Self, TimerId)) {
        if let Some(this) = weak.upgrade() {
            handler(&this, id);
        }
    }

    fn on_primary(&self, id: TimerId) {
        let due = {
            let mut state = self.state.lock();
            if !state.primary.release(id) {
                return;
            }
            state.max_wait.disarm(&*self.scheduler);
            let pending = state.pending.take();
            if self.options.trailing {
                pending
            } else {
                None
            }
        };

        if let Some(args) = due {
            debug!(timer = %id, "Debounce delivering trailing edge");
            (self.action)(args);
        }
    }

    fn on_max_wait(&self, id: TimerId) {
        let due = {
            let mut state = self.state.lock();
            if !state.max_wait.release(id) {
                return;
            }
            state.primary.disarm(&*self.scheduler);
            state.pending.take()
        };

        if let Some(args) = due {
            debug!(timer = %id, "Debounce max wait reached, delivering");
            (self.action)(args);
        }
    }
}

impl<A> Drop for Shared<A> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.primary.disarm(&*self.scheduler);
        state.max_wait.disarm(&*self.scheduler);
    }
}

impl<A: Send + 'static> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Send + 'static> std::fmt::Debug for Debounced<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debounced")
            .field("wait", &self.shared.wait)
            .field("options", &self.shared.options)
            .field("pending", &self.pending())
            .finish()
    }
}
