//! Rollback supervisor: the only path through which a node switch (or mode
//! change) reaches the daemon. Serializes switches, enforces the probe
//! freshness precondition, and reverts to the last backup when activation
//! fails. A failed rollback is `Fatal` and is never retried automatically.

use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ConfigWriter;
use crate::error::{Error, Result};
use crate::probe;
use crate::service::{ServiceControl, ServiceState};
use crate::types::{ActiveConfig, Node, ProbeOutcome, ProbeResult, ProxyMode, StaticProxy};

#[derive(Debug, Clone)]
pub struct SwitchOptions {
    /// Maximum age of a successful probe still accepted as switch evidence.
    pub freshness_window: Duration,
    /// Probe the node on the spot when the last evidence is absent or stale.
    /// When disabled, a stale probe rejects the switch outright.
    pub reprobe_if_stale: bool,
    pub restart_poll_attempts: u32,
    /// Base delay between state polls; grows linearly per attempt.
    pub restart_poll_delay: Duration,
    /// Re-probe the node after activation to confirm reachability.
    pub post_switch_check: bool,
    pub probe_timeout: Duration,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(60),
            reprobe_if_stale: true,
            restart_poll_attempts: 10,
            restart_poll_delay: Duration::from_millis(500),
            post_switch_check: true,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Supervisor<S: ServiceControl> {
    service: S,
    writer: Mutex<ConfigWriter>,
    opts: SwitchOptions,
    /// Most recent probe batch, kept for freshness checks and status display.
    last_batch: RwLock<Vec<ProbeResult>>,
    /// Read-only mirror of the writer-owned active config, so status reads
    /// never contend with an in-flight switch.
    active_cache: RwLock<Option<ActiveConfig>>,
}

impl<S: ServiceControl> Supervisor<S> {
    pub fn new(writer: ConfigWriter, service: S, opts: SwitchOptions) -> Self {
        let active = writer.active().cloned();
        Self {
            service,
            writer: Mutex::new(writer),
            opts,
            last_batch: RwLock::new(Vec::new()),
            active_cache: RwLock::new(active),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn options(&self) -> &SwitchOptions {
        &self.opts
    }

    pub fn active(&self) -> Option<ActiveConfig> {
        self.active_cache.read().clone()
    }

    pub fn last_batch(&self) -> Vec<ProbeResult> {
        self.last_batch.read().clone()
    }

    /// Remember a probe batch as switch evidence for the freshness window.
    pub fn record_batch(&self, batch: Vec<ProbeResult>) {
        *self.last_batch.write() = batch;
    }

    /// Borrow the config writer for maintenance work such as subscription
    /// snapshots. Contends with an in-flight switch; rejected with `Busy`
    /// instead of waiting.
    pub fn try_writer(&self) -> Result<tokio::sync::MutexGuard<'_, ConfigWriter>> {
        self.writer.try_lock().map_err(|_| Error::Busy)
    }

    /// Switch the daemon to `node`. Exactly one switch may be in flight;
    /// a concurrent request is rejected with `Busy`. On activation failure
    /// the previous configuration is restored and `RolledBack` is returned;
    /// if restoring fails too, `Fatal`.
    pub async fn switch_to(
        &self,
        node: &Node,
        mode: ProxyMode,
        static_proxy: Option<StaticProxy>,
    ) -> Result<ActiveConfig> {
        let mut writer = self.writer.try_lock().map_err(|_| Error::Busy)?;

        if mode == ProxyMode::Chained && static_proxy.is_none() {
            return Err(Error::MissingStaticProxy);
        }
        self.ensure_fresh_probe(node).await?;

        let applied = writer.apply(node, mode, static_proxy.as_ref())?;
        self.active_cache.write().replace(applied.clone());

        match self.activate(node).await {
            Ok(()) => {
                info!(node = %node.id, version = applied.version, "switch succeeded");
                Ok(applied)
            }
            Err(reason) => self.rollback(&mut writer, reason).await,
        }
    }

    /// Operator-initiated return to the most recent full snapshot: restore
    /// the files, restart the daemon, and wait for it to come up. Rejected
    /// with `Busy` while a switch is in flight and with `NoBackup` when the
    /// history is empty; in both cases nothing is mutated.
    pub async fn restore_backup(&self) -> Result<ActiveConfig> {
        let mut writer = self.writer.try_lock().map_err(|_| Error::Busy)?;

        let restored = writer.restore_latest_backup()?;
        self.active_cache.write().replace(restored.clone());

        self.service.restart().await?;
        self.await_running()
            .await
            .map_err(|e| Error::Fatal(format!("daemon down after restore: {e}")))?;

        info!(version = restored.version, "snapshot restored");
        Ok(restored)
    }

    /// A switch needs a successful probe within the freshness window.
    async fn ensure_fresh_probe(&self, node: &Node) -> Result<()> {
        let last_success_age = self.last_batch.read().iter().find_map(|r| {
            (r.node_id == node.id && r.outcome.is_success()).then(|| r.measured_at.elapsed())
        });

        if let Some(age) = last_success_age {
            if age <= self.opts.freshness_window {
                return Ok(());
            }
        }

        if !self.opts.reprobe_if_stale {
            return Err(Error::StaleProbe {
                id: node.id.clone(),
                age_ms: last_success_age.map_or(u64::MAX, |a| a.as_millis() as u64),
                window_ms: self.opts.freshness_window.as_millis() as u64,
            });
        }

        let result = probe::probe_one(node, self.opts.probe_timeout).await;
        let fresh = result.outcome.is_success();
        let mut batch = self.last_batch.write();
        batch.retain(|r| r.node_id != node.id);
        batch.push(result);
        if fresh {
            Ok(())
        } else {
            Err(Error::NoReachableNode)
        }
    }

    /// Restart the daemon and wait for it to come up; then optionally
    /// confirm the node is still reachable.
    async fn activate(&self, node: &Node) -> std::result::Result<(), String> {
        self.service
            .restart()
            .await
            .map_err(|e| format!("restart failed: {e}"))?;

        self.await_running()
            .await
            .map_err(|e| format!("daemon did not reach running state: {e}"))?;

        if self.opts.post_switch_check {
            let check = probe::probe_one(node, self.opts.probe_timeout).await;
            if let ProbeOutcome::Failure { reason } = check.outcome {
                return Err(format!("post-switch probe failed: {reason}"));
            }
        }
        Ok(())
    }

    /// Bounded poll with linear backoff. Not an unbounded wait: after the
    /// attempt budget the activation is treated as failed.
    async fn await_running(&self) -> std::result::Result<(), String> {
        let mut last = String::from("no state observed");
        for attempt in 1..=self.opts.restart_poll_attempts {
            match self.service.current_state().await {
                Ok(ServiceState::Running) => return Ok(()),
                Ok(state) => last = state.to_string(),
                Err(e) => last = e.to_string(),
            }
            tokio::time::sleep(self.opts.restart_poll_delay * attempt).await;
        }
        Err(format!(
            "last state '{last}' after {} attempts",
            self.opts.restart_poll_attempts
        ))
    }

    async fn rollback(&self, writer: &mut ConfigWriter, reason: String) -> Result<ActiveConfig> {
        warn!(%reason, "activation failed, rolling back");

        let restored = writer
            .restore_latest_backup()
            .map_err(|e| Error::Fatal(format!("{reason}; restore failed: {e}")))?;
        self.active_cache.write().replace(restored.clone());

        self.service
            .restart()
            .await
            .map_err(|e| Error::Fatal(format!("{reason}; rollback restart failed: {e}")))?;
        self.await_running()
            .await
            .map_err(|e| Error::Fatal(format!("{reason}; daemon down after rollback: {e}")))?;

        warn!(version = restored.version, "previous configuration restored");
        Err(Error::RolledBack(reason))
    }
}
