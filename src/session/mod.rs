//! One bounded recording session against a capture device.
//!
//! Lifecycle: Idle → Initializing (acquire device, apply biases, rate
//! limiter, open raw log, start stream) → Recording ⇄ CheckingLimits →
//! Stopping → Closed. Exactly one device handle and one raw log are open for
//! the session's lifetime, and `end_log` runs exactly once on every exit
//! path: normal stop, policy stop, stream-start failure, probe failure,
//! interrupt.
//!
//! Limit checks are tied to feed polls rather than a separate timer thread.
//! Because a poll is bounded (`FeedPoll::Idle` after `FEED_POLL_WAIT`), a
//! quiescent or disconnected feed still gets its time limit honored; only a
//! device that blocks forever inside a single poll can stall the loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::core::errors::Result;
use crate::device::bias::{BiasApplier, BiasConfiguration};
use crate::device::{Device, DeviceProvider, FeedPoll};
use crate::logger::RunLog;
use crate::monitor::probe::{StorageProbe, StorageSample};
use crate::scheduler::signals::ShutdownFlag;

/// Bounded wait for one feed poll. Also the ceiling on how stale the
/// shutdown/time-limit checks can get under a silent feed.
const FEED_POLL_WAIT: Duration = Duration::from_millis(100);

/// Time source seam; sessions never call `Instant::now` directly.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Clone)]
pub struct ManualClock {
    base: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        #[allow(clippy::cast_possible_truncation)]
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Budgets for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionBudgets {
    pub time_limit: Duration,
    /// `None` means the data-budget stop never fires.
    pub data_limit_mb: Option<f64>,
}

/// Why a session ended, as reported back to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Time limit hit or feed ended; the scheduler may start another cycle.
    Continue,
    /// Free space fell to the floor; terminal for the whole program.
    StopStorageExhausted,
    /// The configured data cap was reached; terminal for the whole program.
    StopDataBudgetReached,
}

/// Backpressure policy: pure function of a fresh sample and the budgets.
///
/// The free-space threshold is inclusive (`<=`): a reading exactly at the
/// floor stops the session.
#[must_use]
pub fn check_limits(
    sample: &StorageSample,
    min_free_space_gb: f64,
    data_limit_mb: Option<f64>,
) -> Option<SessionOutcome> {
    if sample.free_space_gb() <= min_free_space_gb {
        return Some(SessionOutcome::StopStorageExhausted);
    }
    if let Some(limit) = data_limit_mb
        && sample.folder_size_mb() >= limit
    {
        return Some(SessionOutcome::StopDataBudgetReached);
    }
    None
}

/// Static description of one session: where it writes, what it monitors,
/// and the limits it runs under.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    /// Per-process monotonic counter; names the output file `<index>.raw`.
    pub index: u64,
    pub output_path: PathBuf,
    /// Directory probed by the periodic storage check. Normally the staging
    /// session directory; a gated deployment may monitor a different mount.
    pub monitor_dir: PathBuf,
    pub budgets: SessionBudgets,
    pub probe_interval: Duration,
    pub min_free_space_gb: f64,
    pub event_rate_limit: u64,
}

/// One bounded capture attempt. Created fresh by the scheduler each cycle;
/// its device handle never outlives it.
pub struct RecordingSession {
    spec: SessionSpec,
}

impl RecordingSession {
    #[must_use]
    pub fn new(spec: SessionSpec) -> Self {
        Self { spec }
    }

    /// Run the session to completion.
    ///
    /// Device acquisition failure propagates immediately (fatal, no raw log
    /// was opened). After `begin_log` succeeds, `end_log` is guaranteed to
    /// run exactly once no matter how the pump exits.
    pub fn run(
        &self,
        provider: &dyn DeviceProvider,
        biases: Option<&BiasConfiguration>,
        narrate_biases: bool,
        probe: &StorageProbe,
        clock: &dyn Clock,
        shutdown: &ShutdownFlag,
        log: &mut RunLog,
    ) -> Result<SessionOutcome> {
        let mut device = provider.open()?;

        if let Some(biases) = biases {
            BiasApplier::apply(device.as_mut(), biases, log, narrate_biases);
        }

        if device.rate_limiter_available() {
            log.info("Event rate control is available");
            device.enable_rate_limiter(true)?;
            device.set_rate_limit(self.spec.event_rate_limit)?;
        }

        log.info(&format!(
            "Recording to {}",
            self.spec.output_path.display()
        ));
        device.begin_log(&self.spec.output_path)?;

        let pumped = match device.start_stream() {
            Ok(()) => self.pump(device.as_mut(), probe, clock, shutdown, log),
            Err(err) => Err(err),
        };

        // The raw log closes exactly once, whatever the stream did.
        let closed = device.end_log();
        let outcome = pumped?;
        closed?;
        Ok(outcome)
    }

    fn pump(
        &self,
        device: &mut dyn Device,
        probe: &StorageProbe,
        clock: &dyn Clock,
        shutdown: &ShutdownFlag,
        log: &mut RunLog,
    ) -> Result<SessionOutcome> {
        let start = clock.now();
        let mut last_check = start;
        let mut stream_stopped = false;
        let mut outcome = SessionOutcome::Continue;

        loop {
            if shutdown.is_set() {
                if !stream_stopped {
                    device.stop_stream()?;
                }
                break;
            }

            if matches!(device.poll_batch(FEED_POLL_WAIT)?, FeedPoll::Ended) {
                break;
            }

            // Time budget: stop producing, keep draining until the feed ends.
            if !stream_stopped
                && clock.now().duration_since(start) >= self.spec.budgets.time_limit
            {
                device.stop_stream()?;
                stream_stopped = true;
            }

            // Periodic storage check, throttled to the probe interval.
            if outcome == SessionOutcome::Continue
                && clock.now().duration_since(last_check) >= self.spec.probe_interval
            {
                let sample = probe.probe(&self.spec.monitor_dir)?;
                log.info(&sample.describe());
                last_check = clock.now();

                if let Some(stop) = check_limits(
                    &sample,
                    self.spec.min_free_space_gb,
                    self.spec.budgets.data_limit_mb,
                ) {
                    log.warn(&format!("Stopping recording: {}", sample.describe()));
                    outcome = stop;
                    if !stream_stopped {
                        device.stop_stream()?;
                        stream_stopped = true;
                    }
                }
            }
        }

        Ok(outcome)
    }
}
