//! Frame clock arithmetic.

use std::time::{Duration, Instant};

/// Frame rate used when none is configured.
pub const DEFAULT_FPS: u32 = 60;

/// Interval between frames at `fps` frames per second.
///
/// A rate of zero is treated as one frame per second.
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1)))
}

/// The first frame boundary strictly after `now`, counting frames of
/// `interval` from `epoch`.
pub fn next_frame_deadline(epoch: Instant, now: Instant, interval: Duration) -> Instant {
    if interval.is_zero() {
        return now;
    }
    let elapsed = now.saturating_duration_since(epoch).as_nanos();
    let step = interval.as_nanos();
    let frames = elapsed / step + 1;
    let offset = u64::try_from(frames * step).unwrap_or(u64::MAX);
    epoch + Duration::from_nanos(offset)
}
