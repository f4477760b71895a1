//! Top-level CLI definition and dispatch.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::control;

use capture_session_recorder::core::config::Config;
use capture_session_recorder::core::errors::{CsrError, Result};
use capture_session_recorder::device::DeviceProvider;
use capture_session_recorder::device::bias::BiasConfiguration;
use capture_session_recorder::device::synthetic::SyntheticProvider;
use capture_session_recorder::gate::PhysicalGate;
use capture_session_recorder::logger::RunLog;
use capture_session_recorder::platform::pal::detect_platform;
use capture_session_recorder::scheduler::signals::ShutdownFlag;
use capture_session_recorder::scheduler::{SchedulerDeps, SessionScheduler, Termination};
use capture_session_recorder::session::SystemClock;

/// Capture Session Recorder — budget-bounded sensor recording.
#[derive(Debug, Parser)]
#[command(
    name = "csr",
    author,
    version,
    about = "Capture Session Recorder - bounded recording under a storage budget",
    long_about = None
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Bias file applied to the device before the first session.
    #[arg(short = 'b', long, value_name = "PATH")]
    biases: Option<PathBuf>,
    /// Stop for good once this many megabytes have been recorded.
    #[arg(short = 'd', long, value_name = "MB")]
    data_limit_mb: Option<f64>,
    /// Staging tier root (fast, usually volatile; default /dev/shm).
    #[arg(long, value_name = "DIR")]
    staging_root: Option<PathBuf>,
    /// Durable tier root; skips removable-media discovery.
    #[arg(long, value_name = "DIR")]
    durable_root: Option<PathBuf>,
    /// Hold each session until the physical gate condition is met.
    #[arg(long)]
    gate: bool,
    /// Mirror every log line to stdout.
    #[arg(long)]
    print_logs: bool,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

/// Load config, wire the collaborators, and run the scheduler to completion.
pub fn run(cli: &Cli) -> Result<()> {
    if cli.no_color {
        control::set_override(false);
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(mb) = cli.data_limit_mb {
        config.capture.data_limit_mb = Some(mb);
    }
    if let Some(root) = &cli.staging_root {
        config.storage.staging_root = root.clone();
    }
    if let Some(root) = &cli.durable_root {
        config.storage.durable_root = Some(root.clone());
    }
    if cli.gate {
        config.gate.enabled = true;
    }

    let start_label = RunLog::timestamp_label();
    let mut log = RunLog::open(&config.paths.log_dir, &start_label, cli.print_logs);

    let biases = match &cli.biases {
        Some(path) => {
            let parsed = BiasConfiguration::from_file(path)?;
            log.info(&format!(
                "Loaded {} bias setting(s) from {}",
                parsed.len(),
                path.display()
            ));
            Some(parsed)
        }
        None => None,
    };

    let platform = detect_platform()?;
    let provider = build_provider(&config)?;
    let gate = build_gate(&config)?;

    let deps = SchedulerDeps {
        provider,
        platform,
        gate,
        biases,
        shutdown: ShutdownFlag::registered(),
        clock: Box::new(SystemClock),
        log,
        start_label,
    };

    let mut scheduler = SessionScheduler::init(config, deps)?;
    let summary = scheduler.run()?;

    let reason = match summary.termination {
        Termination::Interrupted => "interrupted",
        Termination::StorageExhausted => "free space exhausted",
        Termination::DataBudgetReached => "data budget reached",
    };
    println!("Recorded {} session(s), stopped: {reason}", summary.sessions);
    Ok(())
}

fn build_provider(config: &Config) -> Result<Box<dyn DeviceProvider>> {
    match config.device.backend.as_str() {
        "synthetic" => Ok(Box::new(SyntheticProvider::new(config.device.clone()))),
        other => Err(CsrError::InvalidConfig {
            details: format!("unknown device backend {other:?}"),
        }),
    }
}

#[cfg(all(unix, feature = "gate"))]
fn build_gate(config: &Config) -> Result<Option<PhysicalGate>> {
    if !config.gate.enabled {
        return Ok(None);
    }
    let line = capture_session_recorder::gate::SysfsGateLine::new(config.gate.line);
    Ok(Some(PhysicalGate::new(
        Box::new(line),
        Duration::from_millis(config.gate.settle_delay_ms),
        Duration::from_secs(config.gate.busy_retry_backoff_secs),
    )))
}

#[cfg(not(all(unix, feature = "gate")))]
fn build_gate(config: &Config) -> Result<Option<PhysicalGate>> {
    if !config.gate.enabled {
        return Ok(None);
    }
    Err(CsrError::InvalidConfig {
        details: "gate.enabled requires the \"gate\" feature on a unix target".to_string(),
    })
}
