//! Platform abstraction: statvfs wrapper and mount-table access.
//!
//! The recorder only needs two things from the OS: free/used space for the
//! filesystem containing a path, and the mount table (to discover removable
//! durable media). Everything else is plain `std::fs`.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::{CsrError, Result};

/// Filesystem statistics for the mount containing a path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

/// Mount-point metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountPoint {
    pub path: PathBuf,
    pub device: String,
    pub fs_type: String,
}

/// OS abstraction used by the storage probe and durable-media discovery.
pub trait Platform: Send + Sync {
    fn fs_stats(&self, path: &Path) -> Result<FsStats>;
    fn mount_points(&self) -> Result<Vec<MountPoint>>;
}

/// Linux implementation using `statvfs` and `/proc/self/mounts`.
#[derive(Debug, Default)]
pub struct LinuxPlatform;

#[cfg(unix)]
impl Platform for LinuxPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| CsrError::FsStats {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;
        let fragment = stat.fragment_size();
        Ok(FsStats {
            total_bytes: stat.blocks().saturating_mul(fragment),
            free_bytes: stat.blocks_free().saturating_mul(fragment),
            available_bytes: stat.blocks_available().saturating_mul(fragment),
        })
    }

    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        let raw =
            std::fs::read_to_string("/proc/self/mounts").map_err(|source| CsrError::Io {
                path: PathBuf::from("/proc/self/mounts"),
                source,
            })?;
        Ok(parse_proc_mounts(&raw))
    }
}

#[cfg(not(unix))]
impl Platform for LinuxPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        Err(CsrError::UnsupportedPlatform {
            details: format!("statvfs unavailable for {}", path.display()),
        })
    }

    fn mount_points(&self) -> Result<Vec<MountPoint>> {
        Err(CsrError::UnsupportedPlatform {
            details: "mount table unavailable".to_string(),
        })
    }
}

/// Detect the current platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(CsrError::UnsupportedPlatform {
            details: "only Linux is currently implemented".to_string(),
        })
    }
}

fn parse_proc_mounts(raw: &str) -> Vec<MountPoint> {
    let mut mounts = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        mounts.push(MountPoint {
            path: unescape_mount_path(fields[1]),
            device: fields[0].to_string(),
            fs_type: fields[2].to_string(),
        });
    }
    mounts
}

/// `/proc/self/mounts` octal-escapes spaces, tabs, newlines, and backslashes.
fn unescape_mount_path(raw: &str) -> PathBuf {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let digits: String = chars.clone().take(3).collect();
            if digits.len() == 3
                && let Ok(code) = u8::from_str_radix(&digits, 8)
            {
                out.push(code as char);
                chars.nth(2);
                continue;
            }
        }
        out.push(c);
    }
    PathBuf::from(out)
}
