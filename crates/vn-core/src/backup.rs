//! Bounded on-disk backup history for the active configuration and the
//! subscription cache. Oldest entries are pruned first.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::types::{ActiveConfig, SubscriptionRecord};
use crate::util::fs_atomic::write_atomic;

/// Retained history depth.
pub const DEFAULT_KEEP: usize = 3;

/// One snapshot taken before a mutation. Configuration swaps carry
/// `active` + `engine_config`; subscription refreshes carry `subscription`
/// alongside whatever was active at the time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub created_at: DateTime<Utc>,
    /// Version of the active config at snapshot time (0 before first apply).
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveConfig>,
    /// Exact bytes of the engine config file at snapshot time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionRecord>,
}

/// Ordered, bounded snapshot history under `<state>/backups/`.
/// File names sort chronologically: `<timestamp>-v<version>.json`.
#[derive(Debug)]
pub struct BackupSet {
    dir: PathBuf,
    keep: usize,
}

impl BackupSet {
    pub fn open(dir: impl Into<PathBuf>, keep: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, keep })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Persist a snapshot and prune history beyond the retention bound.
    /// Returns the backup file name.
    pub fn push(&self, entry: &BackupEntry) -> Result<String> {
        let name = format!(
            "{}-v{:06}.json",
            entry.created_at.format("%Y%m%dT%H%M%S%f"),
            entry.version
        );
        write_atomic(self.dir.join(&name), &serde_json::to_vec_pretty(entry)?)?;
        debug!(backup = %name, "snapshot written");
        self.prune()?;
        Ok(name)
    }

    /// Backup file names, oldest first.
    pub fn file_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.ends_with(".json"))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn load(&self, name: &str) -> Result<BackupEntry> {
        let bytes = fs::read(self.dir.join(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Newest entry that carries a full configuration snapshot, i.e. one the
    /// config writer can restore from.
    pub fn latest_restorable(&self) -> Result<Option<(String, BackupEntry)>> {
        for name in self.file_names()?.into_iter().rev() {
            let entry = self.load(&name)?;
            if entry.active.is_some() && entry.engine_config.is_some() {
                return Ok(Some((name, entry)));
            }
        }
        Ok(None)
    }

    fn prune(&self) -> Result<()> {
        let names = self.file_names()?;
        if names.len() > self.keep {
            for name in &names[..names.len() - self.keep] {
                fs::remove_file(self.dir.join(name))?;
                debug!(backup = %name, "pruned");
            }
        }
        Ok(())
    }
}
