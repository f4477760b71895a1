//! Physical gate: an external boolean precondition for recording.
//!
//! One poll is a full acquire/release cycle on the digital input line:
//! claim, wait the settle delay, read, release. The line is released on
//! every path, including read failure. A busy line gets exactly one retry
//! after a fixed backoff; any other failure propagates. The reading is
//! never cached — the scheduler derives a fresh `GateState` per poll.

use std::thread;
use std::time::Duration;

use crate::core::errors::{CsrError, Result};

/// Failure modes of the underlying digital line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateLineError {
    /// The line is claimed by another process; worth one retry.
    Busy,
    /// Anything else; fatal to the caller.
    Other(String),
}

/// A claimable digital input line.
pub trait GateLine {
    /// Human-readable line identifier for error messages and the run log.
    fn name(&self) -> String;

    fn claim(&mut self) -> std::result::Result<(), GateLineError>;

    /// Read the current level. Only valid between `claim` and `release`.
    fn read(&mut self) -> std::result::Result<u8, GateLineError>;

    /// Release the line. Must be safe to call after a failed read.
    fn release(&mut self);
}

/// Polls the gate condition via a [`GateLine`].
pub struct PhysicalGate {
    line: Box<dyn GateLine>,
    settle_delay: Duration,
    busy_backoff: Duration,
}

impl PhysicalGate {
    #[must_use]
    pub fn new(line: Box<dyn GateLine>, settle_delay: Duration, busy_backoff: Duration) -> Self {
        Self {
            line,
            settle_delay,
            busy_backoff,
        }
    }

    /// Perform one full poll of the external condition.
    pub fn is_condition_met(&mut self) -> Result<bool> {
        self.claim_with_retry()?;
        thread::sleep(self.settle_delay);
        let level = self.line.read();
        // Release unconditionally before inspecting the read result.
        self.line.release();
        match level {
            Ok(value) => Ok(value != 0),
            Err(GateLineError::Busy) => Err(CsrError::GateBusy {
                line: self.line.name(),
            }),
            Err(GateLineError::Other(details)) => Err(CsrError::Gate {
                line: self.line.name(),
                details,
            }),
        }
    }

    fn claim_with_retry(&mut self) -> Result<()> {
        match self.line.claim() {
            Ok(()) => return Ok(()),
            Err(GateLineError::Busy) => {}
            Err(GateLineError::Other(details)) => {
                return Err(CsrError::Gate {
                    line: self.line.name(),
                    details,
                });
            }
        }

        // One bounded retry for a contended line.
        thread::sleep(self.busy_backoff);
        match self.line.claim() {
            Ok(()) => Ok(()),
            Err(GateLineError::Busy) => Err(CsrError::GateBusy {
                line: self.line.name(),
            }),
            Err(GateLineError::Other(details)) => Err(CsrError::Gate {
                line: self.line.name(),
                details,
            }),
        }
    }
}

#[cfg(all(unix, feature = "gate"))]
pub use sysfs::SysfsGateLine;

#[cfg(all(unix, feature = "gate"))]
mod sysfs {
    use std::fs;
    use std::path::PathBuf;

    use super::{GateLine, GateLineError};

    /// Digital input via the sysfs GPIO interface.
    pub struct SysfsGateLine {
        line: u32,
        base: PathBuf,
    }

    impl SysfsGateLine {
        #[must_use]
        pub fn new(line: u32) -> Self {
            Self::with_base(line, PathBuf::from("/sys/class/gpio"))
        }

        fn with_base(line: u32, base: PathBuf) -> Self {
            Self { line, base }
        }

        fn gpio_dir(&self) -> PathBuf {
            self.base.join(format!("gpio{}", self.line))
        }

        fn classify(error: &std::io::Error) -> GateLineError {
            if error.raw_os_error() == Some(libc::EBUSY) {
                GateLineError::Busy
            } else {
                GateLineError::Other(error.to_string())
            }
        }
    }

    impl GateLine for SysfsGateLine {
        fn name(&self) -> String {
            format!("gpio{}", self.line)
        }

        fn claim(&mut self) -> Result<(), GateLineError> {
            fs::write(self.base.join("export"), self.line.to_string())
                .map_err(|e| Self::classify(&e))?;
            fs::write(self.gpio_dir().join("direction"), "in").map_err(|e| Self::classify(&e))
        }

        fn read(&mut self) -> Result<u8, GateLineError> {
            let raw =
                fs::read_to_string(self.gpio_dir().join("value")).map_err(|e| Self::classify(&e))?;
            match raw.trim() {
                "0" => Ok(0),
                "1" => Ok(1),
                other => Err(GateLineError::Other(format!("unexpected level {other:?}"))),
            }
        }

        fn release(&mut self) {
            let _ = fs::write(self.base.join("unexport"), self.line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct LineState {
        claim_script: Vec<std::result::Result<(), GateLineError>>,
        read_script: Vec<std::result::Result<u8, GateLineError>>,
        claims: usize,
        reads: usize,
        releases: usize,
    }

    #[derive(Clone)]
    struct ScriptedLine(Rc<RefCell<LineState>>);

    impl ScriptedLine {
        fn new(
            claim_script: Vec<std::result::Result<(), GateLineError>>,
            read_script: Vec<std::result::Result<u8, GateLineError>>,
        ) -> Self {
            Self(Rc::new(RefCell::new(LineState {
                claim_script,
                read_script,
                ..LineState::default()
            })))
        }
    }

    impl GateLine for ScriptedLine {
        fn name(&self) -> String {
            "scripted".to_string()
        }

        fn claim(&mut self) -> std::result::Result<(), GateLineError> {
            let mut state = self.0.borrow_mut();
            state.claims += 1;
            if state.claim_script.is_empty() {
                Ok(())
            } else {
                state.claim_script.remove(0)
            }
        }

        fn read(&mut self) -> std::result::Result<u8, GateLineError> {
            let mut state = self.0.borrow_mut();
            state.reads += 1;
            if state.read_script.is_empty() {
                Ok(0)
            } else {
                state.read_script.remove(0)
            }
        }

        fn release(&mut self) {
            self.0.borrow_mut().releases += 1;
        }
    }

    fn gate(line: ScriptedLine) -> PhysicalGate {
        PhysicalGate::new(Box::new(line), Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn high_level_means_condition_met() {
        let line = ScriptedLine::new(vec![], vec![Ok(1)]);
        assert!(gate(line.clone()).is_condition_met().unwrap());
        assert_eq!(line.0.borrow().releases, 1);
    }

    #[test]
    fn low_level_means_condition_not_met() {
        let line = ScriptedLine::new(vec![], vec![Ok(0)]);
        assert!(!gate(line.clone()).is_condition_met().unwrap());
    }

    #[test]
    fn busy_claim_is_retried_once() {
        let line = ScriptedLine::new(vec![Err(GateLineError::Busy), Ok(())], vec![Ok(1)]);
        assert!(gate(line.clone()).is_condition_met().unwrap());
        assert_eq!(line.0.borrow().claims, 2);
    }

    #[test]
    fn busy_twice_gives_up() {
        let line = ScriptedLine::new(
            vec![Err(GateLineError::Busy), Err(GateLineError::Busy)],
            vec![],
        );
        let err = gate(line.clone()).is_condition_met().unwrap_err();
        assert_eq!(err.code(), "CSR-4001");
        assert_eq!(line.0.borrow().claims, 2);
        assert_eq!(line.0.borrow().reads, 0);
    }

    #[test]
    fn non_busy_claim_error_is_fatal_without_retry() {
        let line = ScriptedLine::new(
            vec![Err(GateLineError::Other("permission denied".to_string()))],
            vec![],
        );
        let err = gate(line.clone()).is_condition_met().unwrap_err();
        assert_eq!(err.code(), "CSR-4002");
        assert_eq!(line.0.borrow().claims, 1);
    }

    #[test]
    fn line_is_released_even_when_read_fails() {
        let line = ScriptedLine::new(
            vec![Ok(())],
            vec![Err(GateLineError::Other("wire fell off".to_string()))],
        );
        let err = gate(line.clone()).is_condition_met().unwrap_err();
        assert_eq!(err.code(), "CSR-4002");
        assert_eq!(line.0.borrow().releases, 1);
    }

    #[test]
    fn fresh_reading_per_poll() {
        let line = ScriptedLine::new(vec![], vec![Ok(0), Ok(1)]);
        let mut g = gate(line.clone());
        assert!(!g.is_condition_met().unwrap());
        assert!(g.is_condition_met().unwrap());
        assert_eq!(line.0.borrow().releases, 2);
    }
}
