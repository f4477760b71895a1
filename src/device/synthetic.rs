//! Synthetic capture backend: timed dummy batches, no hardware required.
//!
//! Emits a fixed-size byte batch at a fixed cadence and appends it to the raw
//! log, which makes the full session/migration pipeline runnable on a bench
//! machine and gives the integration suite a real feed to drive.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::DeviceConfig;
use crate::core::errors::{CsrError, Result};
use crate::device::{BiasError, Device, DeviceProvider, EventBatch, FeedPoll};

/// Synthetic device handle. One per session, like any other backend.
pub struct SyntheticDevice {
    batch_bytes: u64,
    batch_interval: Duration,
    payload: Vec<u8>,
    streaming: bool,
    raw_log: Option<BufWriter<File>>,
    last_emit: Instant,
    rate_limiter_enabled: bool,
    rate_limit: Option<u64>,
    biases: Vec<(String, i64)>,
}

impl SyntheticDevice {
    #[must_use]
    pub fn new(batch_bytes: u64, batch_interval: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let payload = vec![0xA5_u8; batch_bytes as usize];
        Self {
            batch_bytes,
            batch_interval,
            payload,
            streaming: false,
            raw_log: None,
            last_emit: Instant::now(),
            rate_limiter_enabled: false,
            rate_limit: None,
            biases: Vec::new(),
        }
    }

    /// Biases accepted so far, in application order.
    #[must_use]
    pub fn applied_biases(&self) -> &[(String, i64)] {
        &self.biases
    }

    /// Effective rate limit, when the limiter has been enabled and set.
    #[must_use]
    pub fn effective_rate_limit(&self) -> Option<u64> {
        self.rate_limiter_enabled.then_some(self.rate_limit).flatten()
    }
}

impl Device for SyntheticDevice {
    fn set_bias(&mut self, name: &str, value: i64) -> std::result::Result<(), BiasError> {
        // The synthetic sensor accepts any register name.
        self.biases.push((name.to_string(), value));
        Ok(())
    }

    fn rate_limiter_available(&self) -> bool {
        true
    }

    fn enable_rate_limiter(&mut self, enabled: bool) -> Result<()> {
        self.rate_limiter_enabled = enabled;
        Ok(())
    }

    fn set_rate_limit(&mut self, events_per_sec: u64) -> Result<()> {
        if !self.rate_limiter_enabled {
            return Err(CsrError::DeviceIo {
                operation: "set_rate_limit",
                details: "rate limiter not enabled".to_string(),
            });
        }
        self.rate_limit = Some(events_per_sec);
        Ok(())
    }

    fn start_stream(&mut self) -> Result<()> {
        self.streaming = true;
        self.last_emit = Instant::now();
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.streaming = false;
        Ok(())
    }

    fn begin_log(&mut self, path: &Path) -> Result<()> {
        if self.raw_log.is_some() {
            return Err(CsrError::DeviceIo {
                operation: "begin_log",
                details: "raw log already open".to_string(),
            });
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| CsrError::io(path, source))?;
        self.raw_log = Some(BufWriter::new(file));
        Ok(())
    }

    fn end_log(&mut self) -> Result<()> {
        if let Some(mut writer) = self.raw_log.take() {
            writer.flush().map_err(|source| CsrError::DeviceIo {
                operation: "end_log",
                details: source.to_string(),
            })?;
        }
        Ok(())
    }

    fn poll_batch(&mut self, max_wait: Duration) -> Result<FeedPoll> {
        if !self.streaming {
            // A stopped stream drains immediately; a never-started one too.
            return Ok(FeedPoll::Ended);
        }

        let due = self.last_emit + self.batch_interval;
        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > max_wait {
                thread::sleep(max_wait);
                return Ok(FeedPoll::Idle);
            }
            thread::sleep(wait);
        }

        self.last_emit = Instant::now();
        if let Some(writer) = self.raw_log.as_mut() {
            writer
                .write_all(&self.payload)
                .map_err(|source| CsrError::DeviceIo {
                    operation: "poll_batch",
                    details: source.to_string(),
                })?;
            // Keep the on-disk size current for the storage probe.
            writer.flush().map_err(|source| CsrError::DeviceIo {
                operation: "poll_batch",
                details: source.to_string(),
            })?;
        }
        Ok(FeedPoll::Batch(EventBatch {
            bytes: self.batch_bytes,
            events: self.batch_bytes / 8,
        }))
    }
}

/// Opens synthetic devices from the `[device]` config section.
pub struct SyntheticProvider {
    config: DeviceConfig,
}

impl SyntheticProvider {
    #[must_use]
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }
}

impl DeviceProvider for SyntheticProvider {
    fn open(&self) -> Result<Box<dyn Device>> {
        Ok(Box::new(SyntheticDevice::new(
            self.config.synthetic_batch_bytes,
            Duration::from_millis(self.config.synthetic_batch_interval_ms),
        )))
    }
}
