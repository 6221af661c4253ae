//! Rate controllers deciding when a wrapped action fires.

mod debounce;
mod slot;
mod throttle;

use std::sync::Arc;
use std::time::Duration;

pub use debounce::{DebounceOptions, Debounced};
pub use throttle::Throttled;

use crate::error::Result;
use crate::scheduler::TokioScheduler;

/// The wrapped operation, called with the arguments of the delivered call.
pub(crate) type Action<A> = Box<dyn Fn(A) + Send + Sync>;

/// Debounce `action` on the tokio runtime of the calling thread.
pub fn debounce<A, F>(action: F, wait: Duration, options: DebounceOptions) -> Result<Debounced<A>>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    let scheduler = Arc::new(TokioScheduler::try_current()?);
    Debounced::new(action, wait, options, scheduler)
}

/// Throttle `action` on the tokio runtime of the calling thread.
pub fn throttle<A, F>(action: F, wait: Duration) -> Result<Throttled<A>>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    let scheduler = Arc::new(TokioScheduler::try_current()?);
    Ok(Throttled::new(action, wait, scheduler))
}

/// Frame-throttle `action` on the tokio runtime of the calling thread,
/// using the default 60 fps frame clock.
pub fn frame_throttle<A, F>(action: F) -> Result<Throttled<A>>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    let scheduler = Arc::new(TokioScheduler::try_current()?);
    Ok(Throttled::frame(action, scheduler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CadenceError;
    use parking_lot::Mutex;

    #[test]
    fn test_constructors_need_a_runtime() {
        let result = debounce(|_: ()| {}, Duration::from_millis(10), DebounceOptions::default());
        assert!(matches!(result, Err(CadenceError::NoRuntime)));
        assert!(matches!(throttle(|_: ()| {}, Duration::from_millis(10)), Err(CadenceError::NoRuntime)));
        assert!(matches!(frame_throttle(|_: ()| {}), Err(CadenceError::NoRuntime)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_on_tokio() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let d = debounce(
            move |s: &'static str| sink.lock().push(s),
            Duration::from_millis(100),
            DebounceOptions::default(),
        )
        .unwrap();

        d.invoke("a");
        tokio::time::sleep(Duration::from_millis(30)).await;
        d.invoke("b");
        assert!(d.pending());

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(log.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(*log.lock(), vec!["b"]);
        assert!(!d.pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_cancel_on_tokio() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let d = debounce(
            move |n: u32| sink.lock().push(n),
            Duration::from_millis(50),
            DebounceOptions::default().max_wait(Duration::from_millis(80)),
        )
        .unwrap();

        d.invoke(1);
        d.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_on_tokio() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let t = throttle(move |n: u32| sink.lock().push(n), Duration::from_millis(100)).unwrap();

        t.invoke(0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        t.invoke(10);
        tokio::time::sleep(Duration::from_millis(80)).await;
        t.invoke(90);
        assert_eq!(*log.lock(), vec![0]);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*log.lock(), vec![0, 90]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_throttle_on_tokio() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let t = frame_throttle(move |n: u32| sink.lock().push(n)).unwrap();

        t.invoke(1);
        t.invoke(2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*log.lock(), vec![2]);
    }
}
