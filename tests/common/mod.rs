//! Shared scripted collaborators for the integration scenarios.
//!
//! The device advances a shared [`ManualClock`] on every delivered batch, so
//! scenarios covering multi-second budgets run in milliseconds of real time.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use capture_session_recorder::core::errors::{CsrError, Result};
use capture_session_recorder::device::{BiasError, Device, DeviceProvider, EventBatch, FeedPoll};
use capture_session_recorder::gate::{GateLine, GateLineError};
use capture_session_recorder::platform::pal::{FsStats, MountPoint, Platform};
use capture_session_recorder::session::ManualClock;

/// How a scripted device behaves for one run.
#[derive(Debug, Clone)]
pub struct DeviceScript {
    /// Bytes written to the raw log per delivered batch.
    pub batch_bytes: u64,
    /// Simulated time consumed by each delivered batch.
    pub advance_per_poll: Duration,
    /// Feed dries up on its own after this many batches. `None` keeps
    /// producing until `stop_stream`.
    pub max_batches: Option<u64>,
    /// `start_stream` fails with a device stream error.
    pub fail_start_stream: bool,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            batch_bytes: 4096,
            advance_per_poll: Duration::from_secs(1),
            max_batches: None,
            fail_start_stream: false,
        }
    }
}

/// Everything the scripted devices observed, shared across sessions.
#[derive(Debug, Default)]
pub struct DeviceTrace {
    pub opens: u64,
    pub begin_log_calls: u64,
    pub end_log_calls: u64,
    pub polls: u64,
    /// Session-relative elapsed time at each `stop_stream`, in clock time.
    pub stop_elapsed: Vec<Duration>,
    pub biases: Vec<(String, i64)>,
}

/// Opens one [`ScriptedDevice`] per session; all share a trace.
pub struct ScriptedProvider {
    script: DeviceScript,
    clock: ManualClock,
    pub trace: Arc<Mutex<DeviceTrace>>,
}

impl ScriptedProvider {
    pub fn new(script: DeviceScript, clock: ManualClock) -> Self {
        Self {
            script,
            clock,
            trace: Arc::new(Mutex::new(DeviceTrace::default())),
        }
    }

    pub fn trace(&self) -> Arc<Mutex<DeviceTrace>> {
        Arc::clone(&self.trace)
    }
}

impl DeviceProvider for ScriptedProvider {
    fn open(&self) -> Result<Box<dyn Device>> {
        self.trace.lock().unwrap().opens += 1;
        Ok(Box::new(ScriptedDevice {
            script: self.script.clone(),
            clock: self.clock.clone(),
            trace: Arc::clone(&self.trace),
            streaming: false,
            started_at: None,
            emitted: 0,
            out: None,
        }))
    }
}

pub struct ScriptedDevice {
    script: DeviceScript,
    clock: ManualClock,
    trace: Arc<Mutex<DeviceTrace>>,
    streaming: bool,
    started_at: Option<Instant>,
    emitted: u64,
    out: Option<File>,
}

impl Device for ScriptedDevice {
    fn set_bias(&mut self, name: &str, value: i64) -> std::result::Result<(), BiasError> {
        self.trace
            .lock()
            .unwrap()
            .biases
            .push((name.to_string(), value));
        Ok(())
    }

    fn rate_limiter_available(&self) -> bool {
        false
    }

    fn enable_rate_limiter(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn set_rate_limit(&mut self, _events_per_sec: u64) -> Result<()> {
        Ok(())
    }

    fn start_stream(&mut self) -> Result<()> {
        if self.script.fail_start_stream {
            return Err(CsrError::DeviceIo {
                operation: "start_stream",
                details: "scripted stream failure".to_string(),
            });
        }
        self.streaming = true;
        self.started_at = Some(capture_session_recorder::session::Clock::now(&self.clock));
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        if let Some(started) = self.started_at {
            let now = capture_session_recorder::session::Clock::now(&self.clock);
            self.trace
                .lock()
                .unwrap()
                .stop_elapsed
                .push(now.duration_since(started));
        }
        self.streaming = false;
        Ok(())
    }

    fn begin_log(&mut self, path: &Path) -> Result<()> {
        self.trace.lock().unwrap().begin_log_calls += 1;
        self.out = Some(File::create(path).map_err(|source| CsrError::io(path, source))?);
        Ok(())
    }

    fn end_log(&mut self) -> Result<()> {
        if self.out.take().is_some() {
            self.trace.lock().unwrap().end_log_calls += 1;
        }
        Ok(())
    }

    fn poll_batch(&mut self, _max_wait: Duration) -> Result<FeedPoll> {
        self.trace.lock().unwrap().polls += 1;
        if !self.streaming {
            return Ok(FeedPoll::Ended);
        }
        if let Some(max) = self.script.max_batches
            && self.emitted >= max
        {
            self.streaming = false;
            return Ok(FeedPoll::Ended);
        }

        self.clock.advance(self.script.advance_per_poll);
        self.emitted += 1;
        if let Some(f) = self.out.as_mut() {
            let payload = vec![0_u8; usize::try_from(self.script.batch_bytes).unwrap()];
            f.write_all(&payload)
                .map_err(|source| CsrError::io("scripted raw log", source))?;
            f.flush()
                .map_err(|source| CsrError::io("scripted raw log", source))?;
        }
        Ok(FeedPoll::Batch(EventBatch {
            bytes: self.script.batch_bytes,
            events: self.script.batch_bytes / 8,
        }))
    }
}

/// Platform whose free-space readings follow a script; the last value
/// repeats once the script is exhausted.
pub struct ScriptedPlatform {
    free_script: Mutex<VecDeque<u64>>,
    mounts: Vec<MountPoint>,
    stats_calls: Mutex<u64>,
    /// 1-based `fs_stats` call that fails with a retryable stats error.
    fail_on_call: Option<u64>,
}

impl ScriptedPlatform {
    pub fn with_free_bytes(script: &[u64]) -> Self {
        assert!(!script.is_empty(), "free-space script must not be empty");
        Self {
            free_script: Mutex::new(script.iter().copied().collect()),
            mounts: Vec::new(),
            stats_calls: Mutex::new(0),
            fail_on_call: None,
        }
    }

    pub fn failing_on_call(mut self, call: u64) -> Self {
        self.fail_on_call = Some(call);
        self
    }
}

impl Platform for ScriptedPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let mut calls = self.stats_calls.lock().unwrap();
        *calls += 1;
        if self.fail_on_call == Some(*calls) {
            return Err(CsrError::FsStats {
                path: path.to_path_buf(),
                details: "scripted stats failure".to_string(),
            });
        }
        drop(calls);

        let mut script = self.free_script.lock().unwrap();
        let free = if script.len() > 1 {
            script.pop_front().unwrap_or(0)
        } else {
            *script.front().unwrap_or(&0)
        };
        Ok(FsStats {
            total_bytes: 64 * GB,
            free_bytes: free,
            available_bytes: free,
        })
    }

    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        Ok(self.mounts.clone())
    }
}

/// Digital line answering a fixed sequence of levels, then holding the last.
pub struct ScriptedGateLine {
    reads: VecDeque<u8>,
    pub claims: Arc<Mutex<u64>>,
}

impl ScriptedGateLine {
    pub fn new(reads: &[u8]) -> Self {
        Self {
            reads: reads.iter().copied().collect(),
            claims: Arc::new(Mutex::new(0)),
        }
    }

    pub fn claim_counter(&self) -> Arc<Mutex<u64>> {
        Arc::clone(&self.claims)
    }
}

impl GateLine for ScriptedGateLine {
    fn name(&self) -> String {
        "scripted-line".to_string()
    }

    fn claim(&mut self) -> std::result::Result<(), GateLineError> {
        *self.claims.lock().unwrap() += 1;
        Ok(())
    }

    fn read(&mut self) -> std::result::Result<u8, GateLineError> {
        if self.reads.len() > 1 {
            Ok(self.reads.pop_front().unwrap_or(1))
        } else {
            Ok(*self.reads.front().unwrap_or(&1))
        }
    }

    fn release(&mut self) {}
}

pub const GB: u64 = 1024 * 1024 * 1024;
pub const MB: u64 = 1024 * 1024;

/// Quiet run log in a temp dir.
pub fn test_log(dir: &Path) -> capture_session_recorder::logger::RunLog {
    capture_session_recorder::logger::RunLog::open(dir, "250101_000000", false)
}

pub fn raw_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "raw"))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}
