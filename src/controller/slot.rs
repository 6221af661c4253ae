//! Single-timer ownership shared by every controller.

use std::time::Duration;

use crate::scheduler::{Scheduler, Task, TimerId};

/// Which scheduler primitive a slot uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Timer,
    Frame,
}

/// Owns at most one scheduled callback.
///
/// Arming replaces (and cancels) the previous callback. A firing callback
/// must call [`release`](Self::release) with its own id and bail out when
/// that returns `false`: the slot has since been disarmed or re-armed.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    kind: SlotKind,
    id: Option<TimerId>,
}

impl TimerSlot {
    pub(crate) fn timer() -> Self {
        Self {
            kind: SlotKind::Timer,
            id: None,
        }
    }

    pub(crate) fn frame() -> Self {
        Self {
            kind: SlotKind::Frame,
            id: None,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.id.is_some()
    }

    /// Schedule `task`, cancelling whatever the slot held before.
    ///
    /// `delay` is ignored for frame slots.
    pub(crate) fn arm(&mut self, scheduler: &dyn Scheduler, delay: Duration, task: Task) {
        self.disarm(scheduler);
        self.id = Some(match self.kind {
            SlotKind::Timer => scheduler.schedule(delay, task),
            SlotKind::Frame => scheduler.request_frame(task),
        });
    }

    /// Cancel the held callback, if any. Returns whether one was held.
    pub(crate) fn disarm(&mut self, scheduler: &dyn Scheduler) -> bool {
        match self.id.take() {
            Some(id) => {
                match self.kind {
                    SlotKind::Timer => scheduler.cancel(id),
                    SlotKind::Frame => scheduler.cancel_frame(id),
                };
                true
            }
            None => false,
        }
    }

    /// Clear the slot on behalf of the firing callback `id`.
    pub(crate) fn release(&mut self, id: TimerId) -> bool {
        if self.id == Some(id) {
            self.id = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    fn noop() -> Task {
        Box::new(|_| {})
    }

    #[test]
    fn test_arm_replaces_previous_timer() {
        let sched = ManualScheduler::new();
        let mut slot = TimerSlot::timer();

        slot.arm(&sched, Duration::from_millis(10), noop());
        slot.arm(&sched, Duration::from_millis(20), noop());

        assert!(slot.is_live());
        assert_eq!(sched.pending_timers(), 1);
    }

    #[test]
    fn test_disarm_is_idempotent() {
        let sched = ManualScheduler::new();
        let mut slot = TimerSlot::timer();

        slot.arm(&sched, Duration::from_millis(10), noop());
        assert!(slot.disarm(&sched));
        assert!(!slot.disarm(&sched));
        assert_eq!(sched.pending_timers(), 0);
    }

    #[test]
    fn test_release_only_matches_current_id() {
        let sched = ManualScheduler::new();
        let mut slot = TimerSlot::frame();

        slot.arm(&sched, Duration::ZERO, noop());
        let stale = TimerId::new(u64::MAX);
        assert!(!slot.release(stale));
        assert!(slot.is_live());
        assert_eq!(sched.pending_frames(), 1);
    }
}
