//! Cadence - Debounce and Throttle Rate Controllers
//!
//! This crate wraps an action in a controller that decides when the action
//! actually runs, given a stream of calls: debouncing collapses bursts into
//! one delivery, throttling caps deliveries to one per window or frame.
//! Controllers run on a pluggable [`scheduler::Scheduler`], either the tokio
//! runtime or a manually advanced virtual clock.

pub mod config;
pub mod controller;
pub mod error;
pub mod replay;
pub mod scheduler;

pub use controller::{debounce, frame_throttle, throttle, DebounceOptions, Debounced, Throttled};
pub use error::{CadenceError, Result};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
