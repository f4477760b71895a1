//! Configuration and error types shared by every component.

pub mod config;
pub mod errors;
