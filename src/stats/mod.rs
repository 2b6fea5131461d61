//! Durable accidental-quit counter
//!
//! The guard only ever asks for an increment; it never reads the count
//! back. The running total is exposed for the IPC status surface.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tracing::warn;

/// Durable count of prevented accidental quits
pub trait QuitLedger: Send + Sync {
    /// Record one prevented quit; returns the updated total
    fn record_prevented(&self) -> u64;

    /// Current total, for the status surface
    fn prevented(&self) -> u64;
}

/// Ledger backed by a plain count file under the daemon data directory
pub struct FileLedger {
    path: PathBuf,
    count: AtomicU64,
}

impl FileLedger {
    /// Load the ledger, starting from zero if the file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        let count = match std::fs::read_to_string(path) {
            Ok(contents) => contents
                .trim()
                .parse::<u64>()
                .with_context(|| format!("corrupt quit count in {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e).context("failed to read quit count"),
        };

        Ok(Self {
            path: path.to_owned(),
            count: AtomicU64::new(count),
        })
    }
}

impl QuitLedger for FileLedger {
    fn record_prevented(&self) -> u64 {
        let total = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        // A failed write loses at most this increment on restart; the next
        // successful write catches the file up.
        if let Err(e) = std::fs::write(&self.path, total.to_string()) {
            warn!(?e, path = %self.path.display(), "failed to persist quit count");
        }
        total
    }

    fn prevented(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::load(&dir.path().join("quits")).unwrap();
        assert_eq!(ledger.prevented(), 0);
    }

    #[test]
    fn test_record_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quits");

        let ledger = FileLedger::load(&path).unwrap();
        assert_eq!(ledger.record_prevented(), 1);
        assert_eq!(ledger.record_prevented(), 2);
        assert_eq!(ledger.prevented(), 2);

        let reloaded = FileLedger::load(&path).unwrap();
        assert_eq!(reloaded.prevented(), 2);
    }

    #[test]
    fn test_corrupt_count_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quits");
        std::fs::write(&path, "not a number").unwrap();

        assert!(FileLedger::load(&path).is_err());
    }
}
