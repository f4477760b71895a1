//! Outer control loop: gate → session → migration → termination decisions.
//!
//! One sequential loop, no worker threads. Each cycle acquires the physical
//! gate (when configured), runs one bounded [`RecordingSession`], migrates
//! the staging tier to durable media, and then decides whether the program
//! continues. The two storage policy signals and an external interrupt are
//! the only ways the loop ends itself; all of them exit cleanly.

pub mod signals;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::device::DeviceProvider;
use crate::device::bias::BiasConfiguration;
use crate::gate::PhysicalGate;
use crate::logger::RunLog;
use crate::migrate::TierMigrator;
use crate::monitor::probe::StorageProbe;
use crate::platform::pal::Platform;
use crate::session::{
    Clock, RecordingSession, SessionBudgets, SessionOutcome, SessionSpec, check_limits,
};
use signals::ShutdownFlag;

/// Slice size for interruptible sleeps; bounds shutdown latency while idle.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Why the program ended. All three are orderly exits (code 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupted,
    StorageExhausted,
    DataBudgetReached,
}

/// Final accounting handed back to `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of sessions that ran to completion.
    pub sessions: u64,
    pub termination: Termination,
}

/// Collaborators injected into the scheduler. Tests swap in scripted
/// devices, platforms, gates, and clocks.
pub struct SchedulerDeps {
    pub provider: Box<dyn DeviceProvider>,
    pub platform: Arc<dyn Platform>,
    pub gate: Option<PhysicalGate>,
    pub biases: Option<BiasConfiguration>,
    pub shutdown: ShutdownFlag,
    pub clock: Box<dyn Clock>,
    pub log: RunLog,
    /// Process start timestamp label; names the session directories.
    pub start_label: String,
}

/// The recorder's outer loop.
pub struct SessionScheduler {
    config: Config,
    staging_session_dir: PathBuf,
    durable_session_dir: PathBuf,
    provider: Box<dyn DeviceProvider>,
    probe: StorageProbe,
    migrator: TierMigrator,
    gate: Option<PhysicalGate>,
    biases: Option<BiasConfiguration>,
    shutdown: ShutdownFlag,
    clock: Box<dyn Clock>,
    log: RunLog,
}

impl SessionScheduler {
    /// Build the scheduler: resolve the durable root, create both session
    /// directories, and wire the collaborators.
    pub fn init(config: Config, mut deps: SchedulerDeps) -> Result<Self> {
        let staging_session_dir = config
            .storage
            .staging_root
            .join("recordings")
            .join(format!("recording_{}", deps.start_label));

        let durable_base = resolve_durable_root(
            config.storage.durable_root.as_deref(),
            deps.platform.as_ref(),
            &mut deps.log,
        );
        let durable_session_dir = durable_base.join(format!("recording_{}", deps.start_label));

        std::fs::create_dir_all(&staging_session_dir)
            .map_err(|source| crate::core::errors::CsrError::io(&staging_session_dir, source))?;
        std::fs::create_dir_all(&durable_session_dir)
            .map_err(|source| crate::core::errors::CsrError::io(&durable_session_dir, source))?;

        let probe = StorageProbe::new(Arc::clone(&deps.platform));

        Ok(Self {
            config,
            staging_session_dir,
            durable_session_dir,
            provider: deps.provider,
            probe,
            migrator: TierMigrator::default(),
            gate: deps.gate,
            biases: deps.biases,
            shutdown: deps.shutdown,
            clock: deps.clock,
            log: deps.log,
        })
    }

    /// Staging directory receiving the raw files of this process.
    #[must_use]
    pub fn staging_session_dir(&self) -> &Path {
        &self.staging_session_dir
    }

    /// Durable directory receiving migrated recordings.
    #[must_use]
    pub fn durable_session_dir(&self) -> &Path {
        &self.durable_session_dir
    }

    /// Run cycles until a policy signal or an interrupt ends the program.
    pub fn run(&mut self) -> Result<RunSummary> {
        if let Ok(hash) = self.config.stable_hash() {
            self.log.info(&format!("Recorder started, config {hash}"));
        }
        self.log.info(&format!(
            "Recording sessions to {}",
            self.staging_session_dir.display()
        ));

        let mut sessions = 0_u64;
        let mut narrate_biases = true;
        let termination;

        loop {
            if self.shutdown.is_set() {
                termination = Termination::Interrupted;
                break;
            }

            if !self.wait_for_gate()? {
                termination = Termination::Interrupted;
                break;
            }

            let index = sessions + 1;
            let spec = SessionSpec {
                index,
                output_path: self.staging_session_dir.join(format!("{index}.raw")),
                monitor_dir: self.staging_session_dir.clone(),
                budgets: SessionBudgets {
                    time_limit: self.config.capture.recording_time(),
                    data_limit_mb: self.config.capture.data_limit_mb,
                },
                probe_interval: self.config.capture.probe_interval(),
                min_free_space_gb: self.config.capture.min_free_space_gb,
                event_rate_limit: self.config.capture.event_rate_limit,
            };

            let session = RecordingSession::new(spec);
            let outcome = match session.run(
                self.provider.as_ref(),
                self.biases.as_ref(),
                narrate_biases,
                &self.probe,
                self.clock.as_ref(),
                &self.shutdown,
                &mut self.log,
            ) {
                Ok(outcome) => outcome,
                Err(err) if err.is_retryable() => {
                    // A failed probe or transient IO loses this cycle, not
                    // the program.
                    self.log.warn(&format!("Recording cycle failed: {err}"));
                    SessionOutcome::Continue
                }
                Err(err) => return Err(err),
            };
            sessions = index;
            narrate_biases = false;

            self.migrate_staging();

            match outcome {
                SessionOutcome::StopStorageExhausted => {
                    self.log.warn(&format!(
                        "Free space is below the limit ({} GB). Stopping the program.",
                        self.config.capture.min_free_space_gb
                    ));
                    termination = Termination::StorageExhausted;
                    break;
                }
                SessionOutcome::StopDataBudgetReached => {
                    self.log
                        .info("Data size limit reached. Stopping further recordings.");
                    termination = Termination::DataBudgetReached;
                    break;
                }
                SessionOutcome::Continue => {}
            }

            // The durable tier is under write pressure from migration; a
            // nearly-full card ends the program the same way staging does.
            if self.durable_tier_exhausted() {
                termination = Termination::StorageExhausted;
                break;
            }

            self.log.info(&format!(
                "Waiting for {} seconds...",
                self.config.capture.waiting_time_secs
            ));
            sleep_interruptible(self.config.capture.waiting_time(), &self.shutdown);
        }

        if termination == Termination::Interrupted {
            self.log.info("Stopping the program...");
            // Whatever the last session staged still deserves durability.
            self.migrate_staging();
        }
        self.log.flush();

        Ok(RunSummary {
            sessions,
            termination,
        })
    }

    /// Poll the gate until it opens. Returns `false` when a shutdown
    /// arrived while waiting.
    fn wait_for_gate(&mut self) -> Result<bool> {
        let Some(gate) = self.gate.as_mut() else {
            return Ok(true);
        };
        let poll_interval = Duration::from_secs(self.config.gate.poll_interval_secs);

        loop {
            if self.shutdown.is_set() {
                return Ok(false);
            }
            match gate.is_condition_met() {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    self.log.info("Gate condition not met, holding off");
                }
                Err(err) if err.is_retryable() => {
                    // Line still contended after its bounded retry; try
                    // again next poll.
                    self.log.warn(&format!("Gate poll failed: {err}"));
                }
                Err(err) => return Err(err),
            }
            sleep_interruptible(poll_interval, &self.shutdown);
        }
    }

    fn migrate_staging(&mut self) {
        match self
            .migrator
            .migrate(&self.staging_session_dir, &self.durable_session_dir)
        {
            Ok(report) => {
                for file in &report.migrated {
                    self.log.info(&format!(
                        "Copied {} from staging to durable storage and deleted from staging",
                        file.name
                    ));
                }
                for failure in &report.failed {
                    self.log.warn(&format!(
                        "Failed to migrate {}: {} (left in staging)",
                        failure.name, failure.details
                    ));
                }
                self.log.info(&format!("Migration complete: {}", report.describe()));
            }
            Err(err) => {
                self.log.warn(&format!("Migration pass failed: {err}"));
            }
        }
    }

    fn durable_tier_exhausted(&mut self) -> bool {
        match self.probe.probe(&self.durable_session_dir) {
            Ok(sample) => {
                if check_limits(&sample, self.config.capture.min_free_space_gb, None).is_some() {
                    self.log.warn(&format!(
                        "Durable storage low: {}. Stopping the program.",
                        sample.describe()
                    ));
                    return true;
                }
                false
            }
            Err(err) => {
                self.log.warn(&format!("Durable storage probe failed: {err}"));
                false
            }
        }
    }
}

/// Pick the base directory of the durable tier.
///
/// An explicitly configured root wins. Otherwise the mount table is scanned
/// for removable media under `/media/`; with none present, recordings land
/// in `recordings/` under the working directory.
pub fn resolve_durable_root(
    configured: Option<&Path>,
    platform: &dyn Platform,
    log: &mut RunLog,
) -> PathBuf {
    if let Some(root) = configured {
        log.info(&format!("Using configured durable root: {}", root.display()));
        return root.join("recordings");
    }

    match platform.mount_points() {
        Ok(mounts) => {
            if let Some(mount) = mounts.iter().find(|m| m.path.starts_with("/media")) {
                log.info(&format!("External storage found: {}", mount.path.display()));
                return mount.path.join("recordings");
            }
        }
        Err(err) => {
            log.warn(&format!("Could not read mount table: {err}"));
        }
    }

    log.warn("No external storage found, using local directory.");
    PathBuf::from("recordings")
}

/// Sleep `total`, waking early if shutdown is requested.
pub fn sleep_interruptible(total: Duration, shutdown: &ShutdownFlag) {
    let mut remaining = total;
    while !shutdown.is_set() && remaining > Duration::ZERO {
        let nap = remaining.min(SLEEP_SLICE);
        thread::sleep(nap);
        remaining -= nap;
    }
}
