//! Configuration management for Cadence.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::controller::DebounceOptions;
use crate::error::{wait_from_millis, CadenceError, Result};
use crate::scheduler::{frame_interval, DEFAULT_FPS};

/// Main configuration for Cadence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Controller preset
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Frame clock configuration
    #[serde(default)]
    pub frame: FrameConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which controller to build and how.
///
/// Millisecond values are signed so that negative input reaches
/// validation instead of failing as a type mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ControllerConfig {
    Debounce {
        #[serde(default = "default_wait_ms")]
        wait_ms: i64,
        #[serde(default)]
        leading: bool,
        #[serde(default = "default_trailing")]
        trailing: bool,
        #[serde(default)]
        max_wait_ms: Option<i64>,
    },
    Throttle {
        #[serde(default = "default_wait_ms")]
        wait_ms: i64,
    },
    Frame,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig::Debounce {
            wait_ms: default_wait_ms(),
            leading: false,
            trailing: default_trailing(),
            max_wait_ms: None,
        }
    }
}

fn default_wait_ms() -> i64 {
    100
}

fn default_trailing() -> bool {
    true
}

impl ControllerConfig {
    /// Name of the controller mode.
    pub fn mode(&self) -> &'static str {
        match self {
            ControllerConfig::Debounce { .. } => "debounce",
            ControllerConfig::Throttle { .. } => "throttle",
            ControllerConfig::Frame => "frame",
        }
    }

    /// The wait as a duration, or `None` for the frame mode.
    pub fn wait(&self) -> Result<Option<Duration>> {
        match self {
            ControllerConfig::Debounce { wait_ms, .. } | ControllerConfig::Throttle { wait_ms } => {
                wait_from_millis("wait_ms", *wait_ms).map(Some)
            }
            ControllerConfig::Frame => Ok(None),
        }
    }

    /// Debounce options, or `None` for the other modes.
    pub fn debounce_options(&self) -> Result<Option<DebounceOptions>> {
        let ControllerConfig::Debounce {
            leading,
            trailing,
            max_wait_ms,
            ..
        } = self
        else {
            return Ok(None);
        };

        let options = DebounceOptions {
            leading: *leading,
            trailing: *trailing,
            max_wait: max_wait_ms
                .map(|ms| wait_from_millis("max_wait_ms", ms))
                .transpose()?,
        };
        options.validate()?;
        Ok(Some(options))
    }

    /// Check the preset can build a controller.
    pub fn validate(&self) -> Result<()> {
        self.wait()?;
        self.debounce_options()?;
        Ok(())
    }
}

/// Frame clock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

impl FrameConfig {
    /// Interval between frames.
    pub fn interval(&self) -> Duration {
        frame_interval(self.fps)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CadenceConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CadenceConfig = serde_yaml::from_str(yaml)
            .map_err(|e| CadenceError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on values no controller can run with.
    pub fn validate(&self) -> Result<()> {
        if self.frame.fps == 0 {
            return Err(CadenceError::Config("frame.fps must be at least 1".to_string()));
        }
        self.controller.validate()
    }
}
