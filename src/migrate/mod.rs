//! Tier migration: staging (RAM-backed) → durable (persistent media).
//!
//! Copy-then-delete, never rename: the tiers usually live on different
//! filesystems, so an atomic rename is not available. The invariant is that
//! durable data is never deleted here, and a staging file is deleted only
//! after its copy has been written, flushed, and length-verified on the
//! durable side. A crash between copy and delete leaves a duplicate in
//! staging, never a loss.
//!
//! The migrator runs strictly between sessions; it never touches a file the
//! active session still has open.

use std::fs;
use std::path::Path;

use crate::core::errors::{CsrError, Result};

/// One successfully migrated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedFile {
    pub name: String,
    pub bytes: u64,
}

/// One file left behind in staging after a failed copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMigration {
    pub name: String,
    pub details: String,
}

/// Batch outcome. A failed file never aborts the rest of the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: Vec<MigratedFile>,
    pub failed: Vec<FailedMigration>,
}

impl MigrationReport {
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.migrated.iter().map(|f| f.bytes).sum()
    }

    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "migrated {} file(s), {} byte(s), {} failure(s)",
            self.migrated.len(),
            self.total_bytes(),
            self.failed.len()
        )
    }
}

/// Whole-file copy seam. Production uses [`FsCopier`]; tests inject failures.
pub trait FileCopier {
    /// Copy `from` to `to` completely and durably (data flushed to media).
    /// Returns the number of bytes copied.
    fn copy(&self, from: &Path, to: &Path) -> std::io::Result<u64>;
}

/// `std::fs` copier with an fsync before the copy is considered complete.
#[derive(Debug, Default)]
pub struct FsCopier;

impl FileCopier for FsCopier {
    fn copy(&self, from: &Path, to: &Path) -> std::io::Result<u64> {
        let bytes = fs::copy(from, to)?;
        // The staging original is deleted on the strength of this copy, so
        // it must actually be on the durable medium, not in the page cache.
        let copied = fs::File::open(to)?;
        copied.sync_all()?;
        Ok(bytes)
    }
}

/// Moves completed files from the staging tier to the durable tier.
pub struct TierMigrator {
    copier: Box<dyn FileCopier>,
}

impl Default for TierMigrator {
    fn default() -> Self {
        Self::new(Box::new(FsCopier))
    }
}

impl TierMigrator {
    #[must_use]
    pub fn new(copier: Box<dyn FileCopier>) -> Self {
        Self { copier }
    }

    /// Migrate every regular file directly under `staging_dir` into
    /// `durable_dir`.
    ///
    /// Hard error only when the staging directory itself cannot be listed or
    /// the durable directory cannot be created; per-file copy failures are
    /// reported and the batch continues.
    pub fn migrate(&self, staging_dir: &Path, durable_dir: &Path) -> Result<MigrationReport> {
        fs::create_dir_all(durable_dir).map_err(|source| CsrError::io(durable_dir, source))?;
        let entries =
            fs::read_dir(staging_dir).map_err(|source| CsrError::io(staging_dir, source))?;

        let mut report = MigrationReport::default();
        for entry in entries {
            let entry = entry.map_err(|source| CsrError::io(staging_dir, source))?;
            let staging_path = entry.path();
            if !staging_path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let durable_path = durable_dir.join(entry.file_name());

            match self.migrate_one(&staging_path, &durable_path) {
                Ok(bytes) => report.migrated.push(MigratedFile { name, bytes }),
                Err(details) => report.failed.push(FailedMigration { name, details }),
            }
        }
        Ok(report)
    }

    fn migrate_one(
        &self,
        staging_path: &Path,
        durable_path: &Path,
    ) -> std::result::Result<u64, String> {
        let expected = fs::metadata(staging_path)
            .map_err(|e| format!("stat staging copy: {e}"))?
            .len();

        let copied = self
            .copier
            .copy(staging_path, durable_path)
            .map_err(|e| format!("copy to durable tier: {e}"))?;

        let on_durable = fs::metadata(durable_path)
            .map_err(|e| format!("verify durable copy: {e}"))?
            .len();
        if copied != expected || on_durable != expected {
            return Err(format!(
                "durable copy incomplete: expected {expected} bytes, copied {copied}, on disk {on_durable}"
            ));
        }

        // Only now is the staging original expendable.
        fs::remove_file(staging_path).map_err(|e| format!("remove staging copy: {e}"))?;
        Ok(expected)
    }
}

/// Convenience for callers that do not need copier injection.
pub fn migrate(staging_dir: &Path, durable_dir: &Path) -> Result<MigrationReport> {
    TierMigrator::default().migrate(staging_dir, durable_dir)
}
