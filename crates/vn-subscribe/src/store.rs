//! Durable cache of the most recent subscription refresh.

use std::fs;
use std::path::PathBuf;

use vn_core::types::SubscriptionRecord;
use vn_core::util::fs_atomic::write_atomic;
use vn_core::Result;

pub struct SubscriptionStore {
    path: PathBuf,
}

impl SubscriptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `None` when no subscription has ever been fetched.
    pub fn load(&self) -> Result<Option<SubscriptionRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&fs::read(&self.path)?)?))
    }

    pub fn save(&self, record: &SubscriptionRecord) -> Result<()> {
        write_atomic(&self.path, &serde_json::to_vec_pretty(record)?)?;
        Ok(())
    }
}
