use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::io::AsyncReadExt;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cadence::config::{CadenceConfig, ControllerConfig};
use cadence::replay::{parse_script, replay, Delivery};

/// Replay a timed trigger script through a debounce or throttle controller.
#[derive(Debug, Parser)]
#[command(name = "cadence", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Controller mode, overriding the configuration
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Wait in milliseconds
    #[arg(short, long, allow_negative_numbers = true)]
    wait_ms: Option<i64>,

    /// Debounce max wait in milliseconds
    #[arg(long, allow_negative_numbers = true)]
    max_wait_ms: Option<i64>,

    /// Debounce on the leading edge
    #[arg(long)]
    leading: bool,

    /// Disable the debounce trailing edge
    #[arg(long)]
    no_trailing: bool,

    /// Frame rate of the frame clock
    #[arg(long)]
    fps: Option<u32>,

    /// Output format for deliveries
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Script file; reads stdin when omitted
    script: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Debounce,
    Throttle,
    Frame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CadenceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CadenceConfig::default(),
    };
    let config = apply_overrides(config, &cli)?;

    init_tracing(&config);
    info!("Starting Cadence replay");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let script = read_script(cli.script.as_ref()).await?;
    let triggers = parse_script(&script)?;
    info!(mode = config.controller.mode(), triggers = triggers.len(), "Script loaded");

    let format = cli.format;
    let run = replay(&config, &triggers, move |delivery| print_delivery(format, &delivery));

    tokio::select! {
        result = run => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("Replay interrupted");
        }
    }

    Ok(())
}

/// Fold command-line flags over the loaded configuration.
fn apply_overrides(mut config: CadenceConfig, cli: &Cli) -> cadence::Result<CadenceConfig> {
    if let Some(mode) = cli.mode {
        let wait_ms = match &config.controller {
            ControllerConfig::Debounce { wait_ms, .. } | ControllerConfig::Throttle { wait_ms } => {
                *wait_ms
            }
            ControllerConfig::Frame => 100,
        };
        config.controller = match (mode, config.controller) {
            (Mode::Debounce, current @ ControllerConfig::Debounce { .. }) => current,
            (Mode::Debounce, _) => ControllerConfig::Debounce {
                wait_ms,
                leading: false,
                trailing: true,
                max_wait_ms: None,
            },
            (Mode::Throttle, _) => ControllerConfig::Throttle { wait_ms },
            (Mode::Frame, _) => ControllerConfig::Frame,
        };
    }

    match &mut config.controller {
        ControllerConfig::Debounce {
            wait_ms,
            leading,
            trailing,
            max_wait_ms,
        } => {
            if let Some(ms) = cli.wait_ms {
                *wait_ms = ms;
            }
            if cli.max_wait_ms.is_some() {
                *max_wait_ms = cli.max_wait_ms;
            }
            *leading |= cli.leading;
            if cli.no_trailing {
                *trailing = false;
            }
        }
        ControllerConfig::Throttle { wait_ms } => {
            if let Some(ms) = cli.wait_ms {
                *wait_ms = ms;
            }
        }
        ControllerConfig::Frame => {}
    }

    if let Some(fps) = cli.fps {
        config.frame.fps = fps;
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &CadenceConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn read_script(path: Option<&PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading script {}", path.display())),
        None => {
            let mut script = String::new();
            tokio::io::stdin()
                .read_to_string(&mut script)
                .await
                .context("reading script from stdin")?;
            Ok(script)
        }
    }
}

fn print_delivery(format: Format, delivery: &Delivery) {
    match format {
        Format::Text => println!("{} {}", delivery.at_ms, delivery.payload),
        Format::Json => match serde_json::to_string(delivery) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to encode delivery"),
        },
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping replay");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping replay");
        }
    }
}
