//! systemd-backed implementation of the daemon control seam.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use vn_core::service::{ServiceControl, ServiceState};
use vn_core::{Error, Result};

pub struct SystemdControl {
    unit: String,
}

impl SystemdControl {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    async fn systemctl(&self, verb: &str) -> Result<std::process::Output> {
        debug!(verb, unit = %self.unit, "systemctl");
        Command::new("systemctl")
            .arg(verb)
            .arg(&self.unit)
            .output()
            .await
            .map_err(Error::Io)
    }

    async fn run(&self, verb: &str) -> Result<()> {
        let out = self.systemctl(verb).await?;
        if out.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr);
            Err(Error::Io(std::io::Error::other(format!(
                "systemctl {verb} {} failed: {}",
                self.unit,
                stderr.trim()
            ))))
        }
    }
}

#[async_trait]
impl ServiceControl for SystemdControl {
    async fn start(&self) -> Result<()> {
        self.run("start").await
    }

    async fn stop(&self) -> Result<()> {
        self.run("stop").await
    }

    async fn restart(&self) -> Result<()> {
        self.run("restart").await
    }

    async fn current_state(&self) -> Result<ServiceState> {
        // `is-active` exits nonzero for anything but active; the state is in
        // stdout either way.
        let out = self.systemctl("is-active").await?;
        Ok(parse_is_active(&String::from_utf8_lossy(&out.stdout)))
    }
}

fn parse_is_active(stdout: &str) -> ServiceState {
    match stdout.trim() {
        "active" | "activating" | "reloading" => ServiceState::Running,
        "inactive" => ServiceState::Stopped,
        _ => ServiceState::Error,
    }
}
