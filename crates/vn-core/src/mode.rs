//! Proxy topology state machine: `Direct` (single hop) or `Chained`
//! (node then static second hop). Every transition re-applies the current
//! node through the rollback supervisor, so a bad static-proxy config can
//! never leave the daemon half-applied. A mode change only re-validates the
//! current node; it never triggers a full probe batch.

use crate::error::{Error, Result};
use crate::registry::NodeRegistry;
use crate::service::ServiceControl;
use crate::switch::Supervisor;
use crate::types::{ActiveConfig, Node, ProxyMode, StaticProxy};

pub struct ModeMachine<'a, S: ServiceControl> {
    supervisor: &'a Supervisor<S>,
    registry: &'a NodeRegistry,
}

impl<'a, S: ServiceControl> ModeMachine<'a, S> {
    pub fn new(supervisor: &'a Supervisor<S>, registry: &'a NodeRegistry) -> Self {
        Self {
            supervisor,
            registry,
        }
    }

    /// Current mode; `Direct` before any configuration has been applied.
    pub fn current(&self) -> ProxyMode {
        self.supervisor
            .active()
            .map(|a| a.mode)
            .unwrap_or_default()
    }

    /// Drop the second hop, keep the current node.
    pub async fn to_direct(&self) -> Result<ActiveConfig> {
        let node = self.current_node()?;
        self.supervisor
            .switch_to(&node, ProxyMode::Direct, None)
            .await
    }

    /// Route the current node through `static_proxy`.
    pub async fn to_chained(&self, static_proxy: StaticProxy) -> Result<ActiveConfig> {
        let node = self.current_node()?;
        self.supervisor
            .switch_to(&node, ProxyMode::Chained, Some(static_proxy))
            .await
    }

    /// Flip to the other mode. Entering chained mode requires a configured
    /// static proxy; without one the toggle is rejected and the state is
    /// unchanged.
    pub async fn toggle(&self, configured: Option<StaticProxy>) -> Result<ActiveConfig> {
        match self.current() {
            ProxyMode::Direct => {
                let sp = configured.ok_or(Error::MissingStaticProxy)?;
                self.to_chained(sp).await
            }
            ProxyMode::Chained => self.to_direct().await,
        }
    }

    fn current_node(&self) -> Result<Node> {
        let active = self.supervisor.active().ok_or(Error::NoActiveConfig)?;
        self.registry.get(&active.current_node_id)
    }
}
