//! Optional local settings. Absence of the file (or of any field) is not an
//! error, only a reduction in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use vn_core::types::{ListenPorts, StaticProxy};
use vn_core::Result;

pub const SETTINGS_FILE: &str = "settings.json";

/// State directory holding the engine config, subscription cache, backups
/// and settings. `VNODE_DIR` overrides the default, which keeps tests and
/// unprivileged runs away from /etc.
pub fn state_dir() -> PathBuf {
    std::env::var("VNODE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/vnode"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default subscription URL used when `sub update` gets no --url.
    pub subscription_url: Option<String>,
    /// Static second hop for chained mode.
    pub static_proxy: Option<StaticProxy>,
    pub ports: ListenPorts,
    /// Maximum age of a probe result still accepted as switch evidence.
    pub freshness_window_secs: u64,
    /// Name of the OS service unit running the proxy engine.
    pub service_unit: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subscription_url: None,
            static_proxy: None,
            ports: ListenPorts::default(),
            freshness_window_secs: 60,
            service_unit: "v2ray".to_string(),
        }
    }
}

impl Settings {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}
