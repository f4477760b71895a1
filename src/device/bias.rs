//! Bias file parsing and best-effort application.
//!
//! The bias file is line-oriented text: blank lines and `#` comments are
//! skipped; data lines are `<int value> <ignored token> <name>`, whitespace
//! delimited. Parsed once at process start, immutable thereafter, shared by
//! every session.

use std::fs;
use std::path::Path;

use crate::core::errors::{CsrError, Result};
use crate::device::{BiasError, Device};
use crate::logger::RunLog;

/// Ordered register-name → value mapping. Order matters: application stops
/// at the first failing key, so earlier registers win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BiasConfiguration {
    settings: Vec<(String, i64)>,
}

impl BiasConfiguration {
    /// Parse a bias file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| CsrError::io(path, source))?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self> {
        let mut settings = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return Err(CsrError::BiasParse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    details: format!("expected `<value> <token> <name>`, got {line:?}"),
                });
            }
            let value = parts[0]
                .parse::<i64>()
                .map_err(|error| CsrError::BiasParse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    details: format!("bad value {:?}: {error}", parts[0]),
                })?;
            settings.push((parts[2].to_string(), value));
        }
        Ok(Self { settings })
    }

    /// Registers in file order.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.settings.iter().map(|(name, v)| (name.as_str(), *v))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.settings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.settings.len()
    }
}

/// Outcome of applying one bias register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiasResult {
    pub name: String,
    pub value: i64,
    pub outcome: std::result::Result<(), BiasError>,
}

/// Applies a bias configuration to a device, best-effort.
///
/// Policy: apply pairs in insertion order; on the first per-key failure,
/// record it, warn that hardware defaults will be used, and skip the
/// remaining keys. Never fatal to the session. The `narrate` flag suppresses
/// the operator messages after the first session.
pub struct BiasApplier;

impl BiasApplier {
    pub fn apply(
        device: &mut dyn Device,
        biases: &BiasConfiguration,
        log: &mut RunLog,
        narrate: bool,
    ) -> Vec<BiasResult> {
        let mut results = Vec::with_capacity(biases.len());
        for (name, value) in biases.iter() {
            match device.set_bias(name, value) {
                Ok(()) => {
                    if narrate {
                        log.info(&format!("Successfully set {name} to {value}"));
                    }
                    results.push(BiasResult {
                        name: name.to_string(),
                        value,
                        outcome: Ok(()),
                    });
                }
                Err(BiasError::Unsupported) => {
                    if narrate {
                        log.warn("Failed to access biases interface, using default biases");
                    }
                    results.push(BiasResult {
                        name: name.to_string(),
                        value,
                        outcome: Err(BiasError::Unsupported),
                    });
                    break;
                }
                Err(err) => {
                    if narrate {
                        log.warn(&format!("Failed to set {name}: {err}"));
                        log.warn("Using default biases instead");
                    }
                    results.push(BiasResult {
                        name: name.to_string(),
                        value,
                        outcome: Err(err),
                    });
                    break;
                }
            }
        }
        results
    }
}
