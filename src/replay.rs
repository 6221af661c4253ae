//! Replaying timed trigger scripts through a controller.
//!
//! A script holds one trigger per line, `<offset_ms> <payload>`. Each
//! trigger invokes the controller with its payload at its offset from
//! the start of the replay, and every delivery is handed to a sink with
//! the time it happened.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{CadenceConfig, ControllerConfig};
use crate::controller::{Debounced, Throttled};
use crate::error::{CadenceError, Result};
use crate::scheduler::{Scheduler, TokioScheduler};

/// Slack added after the last window, and the idle polling period.
const SETTLE_MARGIN: Duration = Duration::from_millis(1);

/// One scripted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Offset from the start of the replay
    pub at: Duration,
    /// Argument passed to the controller
    pub payload: String,
}

/// One delivery observed during a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Milliseconds since the start of the replay
    pub at_ms: u64,
    /// Argument the action received
    pub payload: String,
}

/// Parse a trigger script.
///
/// Blank lines and lines starting with `#` are skipped. Offsets must not
/// decrease.
pub fn parse_script(text: &str) -> Result<Vec<Trigger>> {
    let mut triggers: Vec<Trigger> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (offset, payload) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let offset_ms: u64 = offset.parse().map_err(|_| CadenceError::Script {
            line: index + 1,
            message: format!("invalid offset '{}'", offset),
        })?;
        let at = Duration::from_millis(offset_ms);

        if let Some(previous) = triggers.last() {
            if at < previous.at {
                return Err(CadenceError::Script {
                    line: index + 1,
                    message: format!(
                        "offset {}ms is earlier than the previous trigger",
                        offset_ms
                    ),
                });
            }
        }

        triggers.push(Trigger {
            at,
            payload: payload.trim().to_string(),
        });
    }

    Ok(triggers)
}

/// A controller built from a [`ControllerConfig`].
pub enum Controller {
    Debounced(Debounced<String>),
    Throttled(Throttled<String>),
}

impl Controller {
    /// Build the configured controller around `action`.
    pub fn build<F>(
        config: &ControllerConfig,
        action: F,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let wait = config.wait()?;
        let controller = match (config, wait) {
            (ControllerConfig::Debounce { .. }, Some(wait)) => {
                let options = config.debounce_options()?.unwrap_or_default();
                Controller::Debounced(Debounced::new(action, wait, options, scheduler)?)
            }
            (ControllerConfig::Throttle { .. }, Some(wait)) => {
                Controller::Throttled(Throttled::new(action, wait, scheduler))
            }
            (ControllerConfig::Frame, _) => {
                Controller::Throttled(Throttled::frame(action, scheduler))
            }
            (ControllerConfig::Debounce { .. } | ControllerConfig::Throttle { .. }, None) => {
                return Err(CadenceError::Config(format!(
                    "{} mode needs a wait",
                    config.mode()
                )));
            }
        };
        Ok(controller)
    }

    /// Pass one call to the controller.
    pub fn invoke(&self, payload: String) {
        match self {
            Controller::Debounced(debounced) => debounced.invoke(payload),
            Controller::Throttled(throttled) => throttled.invoke(payload),
        }
    }

    /// Drop any queued call and revoke the controller's timers.
    pub fn cancel(&self) {
        match self {
            Controller::Debounced(debounced) => debounced.cancel(),
            Controller::Throttled(throttled) => throttled.cancel(),
        }
    }

    /// Whether no timer, frame or queued call is outstanding.
    pub fn is_idle(&self) -> bool {
        match self {
            Controller::Debounced(debounced) => !debounced.pending(),
            Controller::Throttled(throttled) => {
                !throttled.in_cooldown() && !throttled.has_pending()
            }
        }
    }
}

/// Length of one controller window: the wait, or a frame.
fn window(config: &CadenceConfig) -> Result<Duration> {
    Ok(match config.controller.wait()? {
        Some(wait) => wait,
        None => config.frame.interval(),
    })
}

/// Replay `triggers` on the current tokio runtime, passing each delivery
/// to `sink`. Returns once every delivery the script can cause has
/// happened.
pub async fn replay<S>(config: &CadenceConfig, triggers: &[Trigger], sink: S) -> Result<usize>
where
    S: Fn(Delivery) + Send + Sync + 'static,
{
    let scheduler =
        Arc::new(TokioScheduler::try_current()?.with_frame_interval(config.frame.interval()));
    let start = tokio::time::Instant::now();
    let delivered = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let counter = Arc::clone(&delivered);
    let controller = Controller::build(
        &config.controller,
        move |payload| {
            counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let at_ms = start.elapsed().as_millis() as u64;
            sink(Delivery { at_ms, payload });
        },
        scheduler.clone(),
    )?;

    info!(
        mode = config.controller.mode(),
        triggers = triggers.len(),
        "Starting replay"
    );

    let mut last_invoke = start;
    for trigger in triggers {
        tokio::time::sleep_until(start + trigger.at).await;
        debug!(at_ms = trigger.at.as_millis() as u64, payload = %trigger.payload, "Trigger");
        last_invoke = tokio::time::Instant::now();
        controller.invoke(trigger.payload.clone());
    }

    // Timers are armed from when each invoke actually ran, so settle from
    // there and then wait out whatever window is still open. A callback
    // stays counted by the scheduler until its delivery has returned.
    tokio::time::sleep_until(last_invoke + window(config)? + SETTLE_MARGIN).await;
    while !controller.is_idle() || scheduler.live_timers() > 0 {
        tokio::time::sleep(SETTLE_MARGIN).await;
    }

    let count = delivered.load(std::sync::atomic::Ordering::Relaxed);
    info!(deliveries = count, "Replay finished");
    Ok(count)
}
