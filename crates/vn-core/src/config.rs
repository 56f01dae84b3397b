//! Config writer: the sole owner of `ActiveConfig` and the engine config
//! file. Every mutation snapshots the current state into the backup set
//! first, then commits with a write-to-temp-then-rename swap.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::backup::{BackupEntry, BackupSet, DEFAULT_KEEP};
use crate::error::{Error, Result};
use crate::types::{
    ActiveConfig, ListenPorts, Node, ProxyMode, StaticProxy, SubscriptionRecord,
};
use crate::util::fs_atomic::write_atomic;

const ENGINE_CONFIG_FILE: &str = "config.json";
const ACTIVE_FILE: &str = "active.json";
const SUBSCRIPTION_FILE: &str = "subscription.json";
const BACKUP_DIR: &str = "backups";

#[derive(Debug)]
pub struct ConfigWriter {
    dir: PathBuf,
    ports: ListenPorts,
    backups: BackupSet,
    active: Option<ActiveConfig>,
}

impl ConfigWriter {
    /// Open the state directory, loading the persisted active config if one
    /// exists from a previous run.
    pub fn open(dir: impl Into<PathBuf>, ports: ListenPorts) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let backups = BackupSet::open(dir.join(BACKUP_DIR), DEFAULT_KEEP)?;

        let active_path = dir.join(ACTIVE_FILE);
        let active = if active_path.exists() {
            Some(serde_json::from_slice(&fs::read(&active_path)?)?)
        } else {
            None
        };

        Ok(Self {
            dir,
            ports,
            backups,
            active,
        })
    }

    pub fn active(&self) -> Option<&ActiveConfig> {
        self.active.as_ref()
    }

    pub fn backups(&self) -> &BackupSet {
        &self.backups
    }

    pub fn engine_config_path(&self) -> PathBuf {
        self.dir.join(ENGINE_CONFIG_FILE)
    }

    pub fn subscription_path(&self) -> PathBuf {
        self.dir.join(SUBSCRIPTION_FILE)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(ACTIVE_FILE)
    }

    fn next_version(&self) -> u64 {
        self.active.as_ref().map_or(1, |a| a.version + 1)
    }

    /// Serialize `node` (+ mode) into the engine outbound document and swap
    /// it in. Does not restart the daemon; activation is observed separately
    /// by the rollback supervisor.
    pub fn apply(
        &mut self,
        node: &Node,
        mode: ProxyMode,
        static_proxy: Option<&StaticProxy>,
    ) -> Result<ActiveConfig> {
        if mode == ProxyMode::Chained && static_proxy.is_none() {
            return Err(Error::MissingStaticProxy);
        }

        let backup_ref = self.snapshot()?;
        let doc = build_engine_config(node, mode, static_proxy, self.ports);
        let next = ActiveConfig {
            current_node_id: node.id.clone(),
            mode,
            static_proxy: static_proxy.cloned(),
            version: self.next_version(),
            backup_ref,
            applied_at: Utc::now(),
        };
        self.commit(&serde_json::to_vec_pretty(&doc)?, next)
    }

    /// Restore the most recent full snapshot. The restored state is a new
    /// version whose content equals the prior backup; versions never go
    /// backwards, including here.
    pub fn restore_latest_backup(&mut self) -> Result<ActiveConfig> {
        let (name, entry) = self
            .backups
            .latest_restorable()?
            .ok_or(Error::NoBackup)?;
        // Both present per latest_restorable.
        let (restored, engine_bytes) = match (entry.active, entry.engine_config) {
            (Some(a), Some(c)) => (a, c),
            _ => unreachable!("latest_restorable only returns full snapshots"),
        };

        let next = ActiveConfig {
            current_node_id: restored.current_node_id,
            mode: restored.mode,
            static_proxy: restored.static_proxy,
            version: self.next_version(),
            backup_ref: Some(name),
            applied_at: Utc::now(),
        };
        self.commit(engine_bytes.as_bytes(), next)
    }

    /// Snapshot current state before a subscription refresh replaces the
    /// cache. Pairs the outgoing subscription record with whatever is active.
    pub fn snapshot_subscription(
        &self,
        previous: SubscriptionRecord,
    ) -> Result<String> {
        let entry = BackupEntry {
            created_at: Utc::now(),
            version: self.active.as_ref().map_or(0, |a| a.version),
            active: self.active.clone(),
            engine_config: self.read_engine_config()?,
            subscription: Some(previous),
        };
        self.backups.push(&entry)
    }

    /// Pre-swap snapshot of active config + engine config file. Returns the
    /// backup file name, or `None` when there is nothing to back up yet.
    fn snapshot(&mut self) -> Result<Option<String>> {
        let engine_config = self.read_engine_config()?;
        if self.active.is_none() && engine_config.is_none() {
            return Ok(None);
        }
        let entry = BackupEntry {
            created_at: Utc::now(),
            version: self.active.as_ref().map_or(0, |a| a.version),
            active: self.active.clone(),
            engine_config,
            subscription: None,
        };
        Ok(Some(self.backups.push(&entry)?))
    }

    fn read_engine_config(&self) -> Result<Option<String>> {
        let path = self.engine_config_path();
        if path.exists() {
            Ok(Some(fs::read_to_string(path)?))
        } else {
            Ok(None)
        }
    }

    /// Commit both files, or neither: if the active record cannot be
    /// written, the previous engine document is put back so a daemon
    /// restart never picks up a half-committed configuration.
    fn commit(&mut self, engine_bytes: &[u8], next: ActiveConfig) -> Result<ActiveConfig> {
        let active_bytes = serde_json::to_vec_pretty(&next)?;
        let previous_engine = self.read_engine_config()?;

        write_atomic(self.engine_config_path(), engine_bytes)?;
        if let Err(e) = write_atomic(self.active_path(), &active_bytes) {
            match previous_engine {
                Some(bytes) => write_atomic(self.engine_config_path(), bytes.as_bytes())?,
                None => fs::remove_file(self.engine_config_path())?,
            }
            return Err(e.into());
        }
        info!(
            node = %next.current_node_id,
            mode = ?next.mode,
            version = next.version,
            "configuration committed"
        );
        self.active = Some(next.clone());
        Ok(next)
    }
}

/// Build the engine outbound graph. In direct mode the sole outbound is the
/// node; in chained mode the node's traffic is forwarded through the static
/// second hop.
fn build_engine_config(
    node: &Node,
    mode: ProxyMode,
    static_proxy: Option<&StaticProxy>,
    ports: ListenPorts,
) -> serde_json::Value {
    let mut node_outbound = node.outbound();
    let mut outbounds = Vec::new();

    if mode == ProxyMode::Chained {
        if let Some(sp) = static_proxy {
            node_outbound["proxySettings"] = json!({ "tag": "chain" });
            outbounds.push(node_outbound);
            outbounds.push(sp.outbound());
        }
    } else {
        outbounds.push(node_outbound);
    }

    json!({
        "log": { "loglevel": "warning" },
        "inbounds": [
            {
                "tag": "socks-in",
                "port": ports.socks,
                "protocol": "socks",
                "settings": { "auth": "noauth", "udp": true }
            },
            {
                "tag": "http-in",
                "port": ports.http,
                "protocol": "http",
                "settings": {}
            }
        ],
        "outbounds": outbounds,
        "routing": { "rules": [] }
    })
}
