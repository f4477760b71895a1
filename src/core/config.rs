//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{CsrError, Result};

/// Full recorder configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub device: DeviceConfig,
    pub gate: GateConfig,
    pub paths: PathsConfig,
}

/// Session budgets and the storage backpressure policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Wall-clock budget of a single recording session, in seconds.
    pub recording_time_secs: u64,
    /// Pause between scheduler cycles, in seconds.
    pub waiting_time_secs: u64,
    /// Cadence of the in-session storage probe, in seconds.
    pub probe_interval_secs: u64,
    /// Free-space floor; at or below this the program stops for good.
    pub min_free_space_gb: f64,
    /// Optional cap on total recorded data, in MB. `None` never fires.
    pub data_limit_mb: Option<f64>,
    /// Ceiling handed to the device's event-rate limiter when it has one.
    pub event_rate_limit: u64,
}

/// Tier roots. Staging is the fast/volatile recording target; durable
/// receives migrated recordings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub staging_root: PathBuf,
    /// When unset, the scheduler scans the mount table for removable media
    /// and falls back to `recordings/` under the working directory.
    pub durable_root: Option<PathBuf>,
}

/// Capture backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Backend name; `"synthetic"` is the only one built in. Camera backends
    /// implement the `Device` trait and register under their own name.
    pub backend: String,
    /// Synthetic backend: bytes per emitted batch.
    pub synthetic_batch_bytes: u64,
    /// Synthetic backend: interval between batches, in milliseconds.
    pub synthetic_batch_interval_ms: u64,
}

/// Physical gate (external boolean precondition, e.g. a depth switch).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    pub enabled: bool,
    /// GPIO line number on the default chip.
    pub line: u32,
    /// Delay between claiming the line and reading it, in milliseconds.
    pub settle_delay_ms: u64,
    /// Poll cadence while the gate is closed, in seconds.
    pub poll_interval_secs: u64,
    /// Backoff before the single retry on a busy line, in seconds.
    pub busy_retry_backoff_secs: u64,
}

/// Filesystem paths used by the recorder itself (not the tiers).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Directory receiving the per-process run log.
    pub log_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            recording_time_secs: 10,
            waiting_time_secs: 5,
            probe_interval_secs: 1,
            min_free_space_gb: 1.0,
            data_limit_mb: None,
            event_rate_limit: 10_000_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_root: PathBuf::from("/dev/shm"),
            durable_root: None,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: "synthetic".to_string(),
            synthetic_batch_bytes: 64 * 1024,
            synthetic_batch_interval_ms: 20,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            line: 17,
            settle_delay_ms: 100,
            poll_interval_secs: 5,
            busy_retry_backoff_secs: 1,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[CSR-CONFIG] WARNING: HOME not set, falling back to /tmp for paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("csr").join("config.toml"),
            log_dir: PathBuf::from("."),
        }
    }
}

impl CaptureConfig {
    #[must_use]
    pub fn recording_time(&self) -> Duration {
        Duration::from_secs(self.recording_time_secs)
    }

    #[must_use]
    pub fn waiting_time(&self) -> Duration {
        Duration::from_secs(self.waiting_time_secs)
    }

    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| CsrError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(CsrError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the run log.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // capture
        set_env_u64(
            "CSR_CAPTURE_RECORDING_TIME_SECS",
            &mut self.capture.recording_time_secs,
        )?;
        set_env_u64(
            "CSR_CAPTURE_WAITING_TIME_SECS",
            &mut self.capture.waiting_time_secs,
        )?;
        set_env_u64(
            "CSR_CAPTURE_PROBE_INTERVAL_SECS",
            &mut self.capture.probe_interval_secs,
        )?;
        set_env_f64(
            "CSR_CAPTURE_MIN_FREE_SPACE_GB",
            &mut self.capture.min_free_space_gb,
        )?;
        set_env_u64(
            "CSR_CAPTURE_EVENT_RATE_LIMIT",
            &mut self.capture.event_rate_limit,
        )?;
        if let Some(raw) = env_var("CSR_CAPTURE_DATA_LIMIT_MB") {
            let parsed = raw.parse::<f64>().map_err(|error| CsrError::ConfigParse {
                context: "env",
                details: format!("CSR_CAPTURE_DATA_LIMIT_MB={raw:?}: {error}"),
            })?;
            self.capture.data_limit_mb = Some(parsed);
        }

        // storage
        if let Some(raw) = env_var("CSR_STORAGE_STAGING_ROOT") {
            self.storage.staging_root = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("CSR_STORAGE_DURABLE_ROOT") {
            self.storage.durable_root = Some(PathBuf::from(raw));
        }

        // gate
        set_env_bool("CSR_GATE_ENABLED", &mut self.gate.enabled)?;
        set_env_u64("CSR_GATE_SETTLE_DELAY_MS", &mut self.gate.settle_delay_ms)?;
        set_env_u64(
            "CSR_GATE_POLL_INTERVAL_SECS",
            &mut self.gate.poll_interval_secs,
        )?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.capture.recording_time_secs == 0 {
            return Err(CsrError::InvalidConfig {
                details: "capture.recording_time_secs must be >= 1".to_string(),
            });
        }
        if self.capture.probe_interval_secs == 0 {
            return Err(CsrError::InvalidConfig {
                details: "capture.probe_interval_secs must be >= 1".to_string(),
            });
        }
        if self.capture.min_free_space_gb < 0.0 {
            return Err(CsrError::InvalidConfig {
                details: format!(
                    "capture.min_free_space_gb must be >= 0, got {}",
                    self.capture.min_free_space_gb
                ),
            });
        }
        if let Some(limit) = self.capture.data_limit_mb
            && limit <= 0.0
        {
            return Err(CsrError::InvalidConfig {
                details: format!("capture.data_limit_mb must be > 0, got {limit}"),
            });
        }
        if self.capture.event_rate_limit == 0 {
            return Err(CsrError::InvalidConfig {
                details: "capture.event_rate_limit must be >= 1".to_string(),
            });
        }
        if self.storage.staging_root.as_os_str().is_empty() {
            return Err(CsrError::InvalidConfig {
                details: "storage.staging_root must not be empty".to_string(),
            });
        }
        if self.device.backend.trim().is_empty() {
            return Err(CsrError::InvalidConfig {
                details: "device.backend must not be empty".to_string(),
            });
        }
        if self.gate.enabled && self.gate.poll_interval_secs == 0 {
            return Err(CsrError::InvalidConfig {
                details: "gate.poll_interval_secs must be >= 1 when the gate is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_f64(name: &str, slot: &mut f64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<f64>().map_err(|error| CsrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| CsrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| CsrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
