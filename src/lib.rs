#![forbid(unsafe_code)]

//! Capture Session Recorder (csr) — budget-bounded sensor recording under a
//! hard storage ceiling.
//!
//! The recorder runs back-to-back capture sessions, each bounded by a time
//! budget and an optional data budget, while a periodic storage probe keeps
//! free space above a configured floor. Finished recordings migrate from a
//! fast staging tier (typically `/dev/shm`) to durable media with a
//! copy-verify-delete pass. An optional GPIO gate holds sessions back until
//! an external condition is met.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use capture_session_recorder::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use capture_session_recorder::core::config::Config;
//! use capture_session_recorder::migrate::TierMigrator;
//! ```

pub mod prelude;

pub mod core;
pub mod device;
pub mod gate;
pub mod logger;
pub mod migrate;
pub mod monitor;
pub mod platform;
pub mod scheduler;
pub mod session;
