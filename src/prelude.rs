//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use capture_session_recorder::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{CsrError, Result};

// Platform
pub use crate::platform::pal::{FsStats, MountPoint, Platform, detect_platform};

// Device
pub use crate::device::bias::{BiasApplier, BiasConfiguration};
pub use crate::device::synthetic::{SyntheticDevice, SyntheticProvider};
pub use crate::device::{Device, DeviceProvider, EventBatch, FeedPoll};

// Monitor
pub use crate::monitor::probe::{StorageProbe, StorageSample};

// Session
pub use crate::session::{
    Clock, RecordingSession, SessionBudgets, SessionOutcome, SessionSpec, SystemClock,
    check_limits,
};

// Migration
pub use crate::migrate::{MigrationReport, TierMigrator, migrate};

// Gate
pub use crate::gate::{GateLine, GateLineError, PhysicalGate};

// Scheduler
pub use crate::scheduler::signals::ShutdownFlag;
pub use crate::scheduler::{RunSummary, SchedulerDeps, SessionScheduler, Termination};

// Logger
pub use crate::logger::RunLog;
