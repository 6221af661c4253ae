//! Throttle controllers: fixed cooldown windows and frame-synchronized.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::slot::TimerSlot;
use super::Action;
use crate::scheduler::{Scheduler, TimerId};

/// Runs an action at most once per window, replaying the latest
/// suppressed call when the window closes.
///
/// Built either on a millisecond cooldown ([`Throttled::new`]) or on the
/// scheduler's frame clock ([`Throttled::frame`]). Clones share the same
/// controller.
pub struct Throttled<A: Send + 'static> {
    pace: Pace<A>,
}

enum Pace<A> {
    Window(Arc<Window<A>>),
    Frame(Arc<Frame<A>>),
}

/// Cooldown-window throttle.
struct Window<A> {
    action: Action<A>,
    wait: Duration,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<WindowState<A>>,
}

struct WindowState<A> {
    in_cooldown: bool,
    cooldown: TimerSlot,
    /// Latest call suppressed during the current window
    pending: Option<A>,
}

/// Frame-synchronized throttle.
struct Frame<A> {
    action: Action<A>,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<FrameState<A>>,
}

struct FrameState<A> {
    frame: TimerSlot,
    pending: Option<A>,
}

impl<A: Send + 'static> Throttled<A> {
    /// Wrap `action` so it runs at most once per `wait`.
    pub fn new<F>(action: F, wait: Duration, scheduler: Arc<dyn Scheduler>) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        debug!(wait_ms = wait.as_millis() as u64, "Creating throttled controller");

        Self {
            pace: Pace::Window(Arc::new(Window {
                action: Box::new(action),
                wait,
                scheduler,
                state: Mutex::new(WindowState {
                    in_cooldown: false,
                    cooldown: TimerSlot::timer(),
                    pending: None,
                }),
            })),
        }
    }

    /// Wrap `action` so it runs at most once per frame, on the frame
    /// following the first call.
    pub fn frame<F>(action: F, scheduler: Arc<dyn Scheduler>) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        debug!("Creating frame-throttled controller");

        Self {
            pace: Pace::Frame(Arc::new(Frame {
                action: Box::new(action),
                scheduler,
                state: Mutex::new(FrameState {
                    frame: TimerSlot::frame(),
                    pending: None,
                }),
            })),
        }
    }

    /// Record a call.
    ///
    /// A window throttle outside its cooldown delivers synchronously. A
    /// frame throttle always delivers on a later frame.
    pub fn invoke(&self, args: A) {
        match &self.pace {
            Pace::Window(window) => Window::invoke(window, args),
            Pace::Frame(frame) => Frame::invoke(frame, args),
        }
    }

    /// Drop any queued call and revoke the outstanding timer or frame.
    pub fn cancel(&self) {
        match &self.pace {
            Pace::Window(window) => window.cancel(),
            Pace::Frame(frame) => frame.cancel(),
        }
    }

    /// Whether the current window (or frame request) is still open.
    pub fn in_cooldown(&self) -> bool {
        match &self.pace {
            Pace::Window(window) => window.state.lock().in_cooldown,
            Pace::Frame(frame) => frame.state.lock().frame.is_live(),
        }
    }

    /// Whether a call is waiting for the window or frame to end.
    pub fn has_pending(&self) -> bool {
        match &self.pace {
            Pace::Window(window) => window.state.lock().pending.is_some(),
            Pace::Frame(frame) => frame.state.lock().pending.is_some(),
        }
    }

    /// The cooldown window, or `None` for a frame throttle.
    pub fn wait(&self) -> Option<Duration> {
        match &self.pace {
            Pace::Window(window) => Some(window.wait),
            Pace::Frame(_) => None,
        }
    }
}

impl<A: Send + 'static> Window<A> {
    fn invoke(this: &Arc<Self>, args: A) {
        {
            let mut state = this.state.lock();
            if state.in_cooldown {
                state.pending = Some(args);
                trace!("Throttle in cooldown, call queued");
                return;
            }

            state.in_cooldown = true;
            let weak = Arc::downgrade(this);
            state.cooldown.arm(
                &*this.scheduler,
                this.wait,
                Box::new(move |id| Self::on_cooldown_end(&weak, id)),
            );
        }

        debug!("Throttle delivering");
        (this.action)(args);
    }

    fn on_cooldown_end(weak: &Weak<Self>, id: TimerId) {
        let Some(this) = weak.upgrade() else { return };

        let trailing = {
            let mut state = this.state.lock();
            if !state.cooldown.release(id) {
                return;
            }
            state.in_cooldown = false;
            state.pending.take()
        };

        trace!(timer = %id, trailing = trailing.is_some(), "Throttle cooldown ended");

        // Opens a fresh window with the trailing call as its leading call
        if let Some(args) = trailing {
            Self::invoke(&this, args);
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        let had_timer = state.cooldown.disarm(&*self.scheduler);
        state.in_cooldown = false;
        let dropped = state.pending.take().is_some();

        if had_timer || dropped {
            debug!(dropped_call = dropped, "Throttle cancelled");
        }
    }
}

impl<A: Send + 'static> Frame<A> {
    fn invoke(this: &Arc<Self>, args: A) {
        let mut state = this.state.lock();
        state.pending = Some(args);

        if !state.frame.is_live() {
            let weak = Arc::downgrade(this);
            state.frame.arm(
                &*this.scheduler,
                Duration::ZERO,
                Box::new(move |id| Self::on_frame(&weak, id)),
            );
            trace!("Frame requested");
        }
    }

    fn on_frame(weak: &Weak<Self>, id: TimerId) {
        let Some(this) = weak.upgrade() else { return };

        let due = {
            let mut state = this.state.lock();
            if !state.frame.release(id) {
                return;
            }
            state.pending.take()
        };

        if let Some(args) = due {
            debug!(timer = %id, "Frame throttle delivering");
            (this.action)(args);
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        if state.frame.disarm(&*self.scheduler) {
            debug!("Frame throttle cancelled");
        }
        state.pending = None;
    }
}

impl<A> Drop for Window<A> {
    fn drop(&mut self) {
        self.state.get_mut().cooldown.disarm(&*self.scheduler);
    }
}

impl<A> Drop for Frame<A> {
    fn drop(&mut self) {
        self.state.get_mut().frame.disarm(&*self.scheduler);
    }
}

impl<A: Send + 'static> Clone for Throttled<A> {
    fn clone(&self) -> Self {
        let pace = match &self.pace {
            Pace::Window(window) => Pace::Window(Arc::clone(window)),
            Pace::Frame(frame) => Pace::Frame(Arc::clone(frame)),
        };
        Self { pace }
    }
}

impl<A: Send + 'static> std::fmt::Debug for Throttled<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.pace {
            Pace::Window(_) => "window",
            Pace::Frame(_) => "frame",
        };
        f.debug_struct("Throttled")
            .field("mode", &mode)
            .field("wait", &self.wait())
            .field("in_cooldown", &self.in_cooldown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    type Log<T> = Arc<Mutex<Vec<(u64, T)>>>;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn throttled(sched: &Arc<ManualScheduler>, wait: u64) -> (Log<u32>, Throttled<u32>) {
        let log: Log<u32> = Arc::default();
        let sink = Arc::clone(&log);
        let clock = Arc::clone(sched);
        let throttled = Throttled::new(
            move |n: u32| sink.lock().push((clock.elapsed().as_millis() as u64, n)),
            ms(wait),
            sched.clone(),
        );
        (log, throttled)
    }

    fn frame_throttled(sched: &Arc<ManualScheduler>) -> (Log<u32>, Throttled<u32>) {
        let log: Log<u32> = Arc::default();
        let sink = Arc::clone(&log);
        let clock = Arc::clone(sched);
        let throttled = Throttled::frame(
            move |n: u32| sink.lock().push((clock.frame_count(), n)),
            sched.clone(),
        );
        (log, throttled)
    }

    #[test]
    fn test_leading_edge_then_one_trailing_per_window() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = throttled(&sched, 100);

        t.invoke(0);
        assert_eq!(*log.lock(), vec![(0, 0)]);

        sched.advance(ms(10));
        t.invoke(10);
        sched.advance(ms(10));
        t.invoke(20);
        sched.advance(ms(70));
        t.invoke(90);

        sched.advance(ms(10));
        assert_eq!(*log.lock(), vec![(0, 0), (100, 90)]);

        // The trailing call opened a new window with nothing queued in it
        sched.advance(ms(500));
        assert_eq!(log.lock().len(), 2);
        assert!(!t.in_cooldown());
    }

    #[test]
    fn test_trailing_call_restarts_window() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = throttled(&sched, 100);

        t.invoke(1);
        t.invoke(2);
        sched.advance(ms(100));
        assert!(t.in_cooldown());

        t.invoke(3);
        sched.advance(ms(99));
        assert_eq!(*log.lock(), vec![(0, 1), (100, 2)]);

        sched.advance(ms(1));
        assert_eq!(*log.lock(), vec![(0, 1), (100, 2), (200, 3)]);
        assert_eq!(sched.pending_timers(), 1);
    }

    #[test]
    fn test_call_after_window_delivers_immediately() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = throttled(&sched, 50);

        t.invoke(1);
        sched.advance(ms(80));
        assert!(!t.in_cooldown());

        t.invoke(2);
        assert_eq!(*log.lock(), vec![(0, 1), (80, 2)]);
    }

    #[test]
    fn test_cancel_drops_queued_call() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = throttled(&sched, 100);

        t.invoke(1);
        t.invoke(2);
        assert!(t.has_pending());
        t.cancel();

        assert!(!t.in_cooldown());
        assert!(!t.has_pending());
        sched.advance(ms(1_000));
        assert_eq!(*log.lock(), vec![(0, 1)]);

        // Cancel exits cooldown, so the next call leads again
        t.invoke(3);
        assert_eq!(*log.lock(), vec![(0, 1), (1_000, 3)]);
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = throttled(&sched, 100);

        t.cancel();
        t.cancel();
        assert!(log.lock().is_empty());
        assert!(!t.in_cooldown());
    }

    #[test]
    fn test_zero_wait_collapses_synchronous_burst_to_two() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = throttled(&sched, 0);

        for n in 0..10 {
            t.invoke(n);
        }
        assert_eq!(*log.lock(), vec![(0, 0)]);

        sched.advance(Duration::ZERO);
        assert_eq!(*log.lock(), vec![(0, 0), (0, 9)]);
    }

    #[test]
    fn test_frame_throttle_delivers_latest_on_next_frame() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = frame_throttled(&sched);

        t.invoke(1);
        t.invoke(2);
        t.invoke(3);
        assert!(log.lock().is_empty());
        assert_eq!(sched.pending_frames(), 1);

        sched.run_frame();
        assert_eq!(*log.lock(), vec![(1, 3)]);

        sched.run_frame();
        assert_eq!(log.lock().len(), 1);

        t.invoke(4);
        sched.run_frame();
        assert_eq!(*log.lock(), vec![(1, 3), (3, 4)]);
    }

    #[test]
    fn test_frame_throttle_cancel_revokes_frame() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = frame_throttled(&sched);

        t.invoke(1);
        assert!(t.in_cooldown());
        t.cancel();

        assert_eq!(sched.pending_frames(), 0);
        assert!(!t.has_pending());
        sched.run_frame();
        assert!(log.lock().is_empty());
        assert_eq!(t.wait(), None);
    }

    #[test]
    fn test_dropping_last_handle_cancels_cooldown() {
        let sched = Arc::new(ManualScheduler::new());
        let (log, t) = throttled(&sched, 100);

        t.invoke(1);
        t.invoke(2);
        let clone = t.clone();
        drop(t);
        assert_eq!(sched.pending_timers(), 1);

        drop(clone);
        assert_eq!(sched.pending_timers(), 0);
        sched.advance(ms(200));
        assert_eq!(*log.lock(), vec![(0, 1)]);
    }
}
