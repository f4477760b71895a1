//! Storage probe: directory size walk + filesystem free space.
//!
//! Each probe is a fresh point-in-time measurement consumed immediately by
//! the limit policy. Nothing is cached: a stale reading must never back a
//! stop/continue decision. Cost is O(files under the path), which is
//! acceptable only because the session throttles probes to its configured
//! interval.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::core::errors::{CsrError, Result};
use crate::platform::pal::Platform;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Point-in-time `(used, free)` measurement for one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageSample {
    /// Sum of file sizes under the probed directory.
    pub used_bytes: u64,
    /// Free bytes on the filesystem containing the probed directory.
    pub free_bytes: u64,
}

impl StorageSample {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn folder_size_mb(&self) -> f64 {
        self.used_bytes as f64 / BYTES_PER_MB
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn free_space_gb(&self) -> f64 {
        self.free_bytes as f64 / BYTES_PER_GB
    }

    /// Run-log line in the historical format.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "Folder size: {:.2} MB, Free space: {:.2} GB",
            self.folder_size_mb(),
            self.free_space_gb()
        )
    }
}

/// Measures directory size and filesystem free space.
pub struct StorageProbe {
    platform: Arc<dyn Platform>,
}

impl StorageProbe {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Probe `path`: walk its tree summing file sizes and query free space
    /// for its filesystem.
    ///
    /// Individually unreadable files are skipped (a file may vanish between
    /// listing and stat while the device is writing); an inaccessible root
    /// is a hard error.
    pub fn probe(&self, path: &Path) -> Result<StorageSample> {
        let used_bytes = directory_size(path)?;
        let stats = self.platform.fs_stats(path)?;
        Ok(StorageSample {
            used_bytes,
            free_bytes: stats.free_bytes,
        })
    }
}

fn directory_size(root: &Path) -> Result<u64> {
    let entries = fs::read_dir(root).map_err(|source| CsrError::Probe {
        path: root.to_path_buf(),
        details: source.to_string(),
    })?;

    let mut total = 0_u64;
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let Ok(meta) = entry.path().symlink_metadata() else {
            continue;
        };
        if meta.is_symlink() {
            // Files only; never follow links (and never loop through them).
            continue;
        }
        if meta.is_dir() {
            // Subdirectory vanishing mid-walk is the same transient case as
            // an unreadable file: skip it, keep summing.
            total += directory_size(&entry.path()).unwrap_or(0);
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::pal::{FsStats, MountPoint};

    struct FixedPlatform {
        free_bytes: u64,
    }

    impl Platform for FixedPlatform {
        fn fs_stats(&self, _path: &Path) -> Result<FsStats> {
            Ok(FsStats {
                total_bytes: 100 * 1024 * 1024 * 1024,
                free_bytes: self.free_bytes,
                available_bytes: self.free_bytes,
            })
        }

        fn mount_points(&self) -> Result<Vec<MountPoint>> {
            Ok(Vec::new())
        }
    }

    fn probe_with_free(free_bytes: u64) -> StorageProbe {
        StorageProbe::new(Arc::new(FixedPlatform { free_bytes }))
    }

    #[test]
    fn sums_files_across_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.raw"), vec![0_u8; 1000]).unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("b.raw"), vec![0_u8; 500]).unwrap();

        let sample = probe_with_free(0).probe(dir.path()).unwrap();
        assert_eq!(sample.used_bytes, 1500);
    }

    #[test]
    fn repeated_probes_on_unchanged_tree_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.raw"), vec![0_u8; 4096]).unwrap();

        let probe = probe_with_free(2 * 1024 * 1024 * 1024);
        let first = probe.probe(dir.path()).unwrap();
        let second = probe.probe(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_directory_is_zero_used() {
        let dir = tempfile::tempdir().unwrap();
        let sample = probe_with_free(0).probe(dir.path()).unwrap();
        assert_eq!(sample.used_bytes, 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.raw"), vec![0_u8; 100]).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.raw"), dir.path().join("link.raw"))
            .unwrap();

        let sample = probe_with_free(0).probe(dir.path()).unwrap();
        assert_eq!(sample.used_bytes, 100);
    }

    #[test]
    fn inaccessible_root_is_a_hard_error() {
        let err = probe_with_free(0)
            .probe(Path::new("/nonexistent_csr_probe_root"))
            .unwrap_err();
        assert_eq!(err.code(), "CSR-2002");
    }

    #[test]
    fn unit_conversions() {
        let sample = StorageSample {
            used_bytes: 3 * 1024 * 1024,
            free_bytes: 2 * 1024 * 1024 * 1024,
        };
        assert!((sample.folder_size_mb() - 3.0).abs() < 1e-9);
        assert!((sample.free_space_gb() - 2.0).abs() < 1e-9);
        assert_eq!(
            sample.describe(),
            "Folder size: 3.00 MB, Free space: 2.00 GB"
        );
    }

}
