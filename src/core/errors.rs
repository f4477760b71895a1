//! CSR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, CsrError>;

/// Top-level error type for the capture session recorder.
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("[CSR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[CSR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[CSR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[CSR-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[CSR-1201] bias file parse failure at {path}:{line}: {details}")]
    BiasParse {
        path: PathBuf,
        line: usize,
        details: String,
    },

    #[error("[CSR-2001] filesystem stats failure for {path}: {details}")]
    FsStats { path: PathBuf, details: String },

    #[error("[CSR-2002] storage probe failure for {path}: {details}")]
    Probe { path: PathBuf, details: String },

    #[error("[CSR-3001] device could not be acquired: {details}")]
    DeviceInit { details: String },

    #[error("[CSR-3002] device stream failure during {operation}: {details}")]
    DeviceIo {
        operation: &'static str,
        details: String,
    },

    #[error("[CSR-4001] gate line busy: {line}")]
    GateBusy { line: String },

    #[error("[CSR-4002] gate failure on {line}: {details}")]
    Gate { line: String, details: String },

    #[error("[CSR-5001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CSR-5900] runtime failure: {details}")]
    Runtime { details: String },
}

impl CsrError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "CSR-1001",
            Self::MissingConfig { .. } => "CSR-1002",
            Self::ConfigParse { .. } => "CSR-1003",
            Self::UnsupportedPlatform { .. } => "CSR-1101",
            Self::BiasParse { .. } => "CSR-1201",
            Self::FsStats { .. } => "CSR-2001",
            Self::Probe { .. } => "CSR-2002",
            Self::DeviceInit { .. } => "CSR-3001",
            Self::DeviceIo { .. } => "CSR-3002",
            Self::GateBusy { .. } => "CSR-4001",
            Self::Gate { .. } => "CSR-4002",
            Self::Io { .. } => "CSR-5001",
            Self::Runtime { .. } => "CSR-5900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Device acquisition is deliberately not retryable: a camera that cannot
    /// be opened is a hard dependency failure and aborts the process.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::FsStats { .. }
                | Self::Probe { .. }
                | Self::GateBusy { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for CsrError {
    fn from(value: serde_json::Error) -> Self {
        Self::ConfigParse {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for CsrError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_errors() -> Vec<CsrError> {
        vec![
            CsrError::InvalidConfig {
                details: String::new(),
            },
            CsrError::MissingConfig {
                path: PathBuf::new(),
            },
            CsrError::ConfigParse {
                context: "",
                details: String::new(),
            },
            CsrError::UnsupportedPlatform {
                details: String::new(),
            },
            CsrError::BiasParse {
                path: PathBuf::new(),
                line: 0,
                details: String::new(),
            },
            CsrError::FsStats {
                path: PathBuf::new(),
                details: String::new(),
            },
            CsrError::Probe {
                path: PathBuf::new(),
                details: String::new(),
            },
            CsrError::DeviceInit {
                details: String::new(),
            },
            CsrError::DeviceIo {
                operation: "",
                details: String::new(),
            },
            CsrError::GateBusy {
                line: String::new(),
            },
            CsrError::Gate {
                line: String::new(),
                details: String::new(),
            },
            CsrError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            CsrError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = sample_errors();
        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_csr_prefix() {
        for err in &sample_errors() {
            assert!(
                err.code().starts_with("CSR-"),
                "code {} must start with CSR-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = CsrError::DeviceInit {
            details: "no camera on bus".to_string(),
        };
        let msg = err.to_string();
        assert!(
            msg.contains("CSR-3001"),
            "display should contain error code: {msg}"
        );
        assert!(
            msg.contains("no camera on bus"),
            "display should contain details: {msg}"
        );
    }

    #[test]
    fn device_init_is_not_retryable() {
        assert!(
            !CsrError::DeviceInit {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn busy_gate_is_retryable_other_gate_errors_are_not() {
        assert!(
            CsrError::GateBusy {
                line: "gpio17".to_string()
            }
            .is_retryable()
        );
        assert!(
            !CsrError::Gate {
                line: "gpio17".to_string(),
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = CsrError::io(
            "/dev/shm/recordings/1.raw",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "CSR-5001");
        assert!(err.to_string().contains("/dev/shm/recordings/1.raw"));
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: CsrError = toml_err.into();
        assert_eq!(err.code(), "CSR-1003");
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: CsrError = json_err.into();
        assert_eq!(err.code(), "CSR-1003");
    }
}
