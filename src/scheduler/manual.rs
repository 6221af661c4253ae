//! A virtual-clock scheduler driven by the caller.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use super::{Scheduler, Task, TimerId};

/// A scheduler whose clock only moves when [`advance`](Self::advance) is
/// called and whose frames only happen on [`run_frame`](Self::run_frame).
///
/// Callbacks run on the thread calling `advance`/`run_frame`, with no
/// internal lock held, so they may schedule or cancel further work.
pub struct ManualScheduler {
    /// Real instant the virtual clock is anchored to
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    /// Virtual time since `origin`
    elapsed: Duration,
    next_id: u64,
    /// Timers ordered by deadline, then by scheduling order
    timers: BTreeMap<(Duration, u64), Task>,
    /// Deadline of each live timer, for cancellation
    deadlines: HashMap<u64, Duration>,
    /// Frame callbacks in request order
    frames: BTreeMap<u64, Task>,
    frame_count: u64,
}

impl ManualScheduler {
    /// Create a scheduler with its virtual clock at zero.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Number of frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.state.lock().frame_count
    }

    /// Number of live timers.
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Number of outstanding frame callbacks.
    pub fn pending_frames(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Move the clock forward by `by`, running every timer that falls due
    /// in order of deadline. Timers scheduled by those callbacks run too
    /// if they fall due before the new time.
    ///
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().elapsed + by;
        let mut fired = 0;

        loop {
            let due = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                match state.timers.first_entry() {
                    Some(entry) if entry.key().0 <= target => {
                        let ((deadline, raw), task) = entry.remove_entry();
                        state.deadlines.remove(&raw);
                        state.elapsed = state.elapsed.max(deadline);
                        Some((TimerId::new(raw), task))
                    }
                    _ => None,
                }
            };

            let Some((id, task)) = due else { break };
            trace!(timer = %id, "Running due timer");
            task(id);
            fired += 1;
        }

        self.state.lock().elapsed = target;
        fired
    }

    /// Run every frame callback requested before this call.
    ///
    /// Callbacks requested while the frame runs wait for the next frame.
    /// Returns the number of callbacks run.
    pub fn run_frame(&self) -> usize {
        let frames = {
            let mut state = self.state.lock();
            state.frame_count += 1;
            std::mem::take(&mut state.frames)
        };

        let count = frames.len();
        for (raw, task) in frames {
            task(TimerId::new(raw));
        }
        count
    }

    fn next_id(state: &mut ManualState) -> u64 {
        let raw = state.next_id;
        state.next_id += 1;
        raw
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("elapsed", &state.elapsed)
            .field("timers", &state.timers.len())
            .field("frames", &state.frames.len())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.lock();
        let raw = Self::next_id(&mut state);
        let deadline = state.elapsed + delay;
        state.timers.insert((deadline, raw), task);
        state.deadlines.insert(raw, deadline);
        TimerId::new(raw)
    }

    fn cancel(&self, id: TimerId) -> bool {
        let mut state = self.state.lock();
        match state.deadlines.remove(&id.0) {
            Some(deadline) => state.timers.remove(&(deadline, id.0)).is_some(),
            None => false,
        }
    }

    fn request_frame(&self, task: Task) -> TimerId {
        let mut state = self.state.lock();
        let raw = Self::next_id(&mut state);
        state.frames.insert(raw, task);
        TimerId::new(raw)
    }

    fn cancel_frame(&self, id: TimerId) -> bool {
        self.state.lock().frames.remove(&id.0).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn log_task(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Task {
        let log = Arc::clone(log);
        Box::new(move |_| log.lock().push(name))
    }

    #[test]
    fn test_timers_run_in_deadline_order() {
        let sched = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        sched.schedule(ms(30), log_task(&log, "late"));
        sched.schedule(ms(10), log_task(&log, "early"));
        sched.schedule(ms(10), log_task(&log, "early-second"));

        assert_eq!(sched.advance(ms(9)), 0);
        assert_eq!(sched.advance(ms(1)), 2);
        assert_eq!(*log.lock(), vec!["early", "early-second"]);

        assert_eq!(sched.advance(ms(100)), 1);
        assert_eq!(*log.lock(), vec!["early", "early-second", "late"]);
        assert_eq!(sched.elapsed(), ms(110));
    }

    #[test]
    fn test_zero_delay_is_deferred() {
        let sched = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        sched.schedule(Duration::ZERO, log_task(&log, "zero"));
        assert!(log.lock().is_empty());

        assert_eq!(sched.advance(Duration::ZERO), 1);
        assert_eq!(*log.lock(), vec!["zero"]);
    }

    #[test]
    fn test_cancel_prevents_run() {
        let sched = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let id = sched.schedule(ms(10), log_task(&log, "cancelled"));
        assert!(sched.cancel(id));
        assert!(!sched.cancel(id));

        sched.advance(ms(50));
        assert!(log.lock().is_empty());
        assert_eq!(sched.pending_timers(), 0);
    }

    #[test]
    fn test_clock_is_at_deadline_inside_callback() {
        let sched = Arc::new(ManualScheduler::new());
        let seen = Arc::new(Mutex::new(None));

        let clock = Arc::clone(&sched);
        let sink = Arc::clone(&seen);
        sched.schedule(
            ms(25),
            Box::new(move |_| *sink.lock() = Some(clock.elapsed())),
        );

        sched.advance(ms(100));
        assert_eq!(*seen.lock(), Some(ms(25)));
        assert_eq!(sched.elapsed(), ms(100));
    }

    #[test]
    fn test_callbacks_can_schedule_more_work() {
        let sched = Arc::new(ManualScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_sched = Arc::clone(&sched);
        let inner_log = Arc::clone(&log);
        sched.schedule(
            ms(10),
            Box::new(move |_| {
                inner_log.lock().push("outer");
                inner_sched.schedule(ms(10), log_task(&inner_log, "inner"));
            }),
        );

        assert_eq!(sched.advance(ms(20)), 2);
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_frames_run_once_per_request() {
        let sched = Arc::new(ManualScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        sched.request_frame(log_task(&log, "a"));
        let cancelled = sched.request_frame(log_task(&log, "b"));
        assert!(sched.cancel_frame(cancelled));

        let inner_sched = Arc::clone(&sched);
        let inner_log = Arc::clone(&log);
        sched.request_frame(Box::new(move |_| {
            inner_sched.request_frame(log_task(&inner_log, "next-frame"));
        }));

        assert_eq!(sched.run_frame(), 2);
        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(sched.pending_frames(), 1);

        assert_eq!(sched.run_frame(), 1);
        assert_eq!(*log.lock(), vec!["a", "next-frame"]);
        assert_eq!(sched.frame_count(), 2);
    }
}
