//! Process-wide wiring: state directory, settings, registry, supervisor.

use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use vn_config::{builtin_nodes, state_dir, Settings};
use vn_core::config::ConfigWriter;
use vn_core::registry::NodeRegistry;
use vn_core::switch::{Supervisor, SwitchOptions};
use vn_core::types::SubscriptionRecord;
use vn_subscribe::store::SubscriptionStore;

use crate::systemd::SystemdControl;

pub struct App {
    pub settings: Settings,
    pub registry: NodeRegistry,
    pub supervisor: Supervisor<SystemdControl>,
    pub store: SubscriptionStore,
    pub subscription: Option<SubscriptionRecord>,
}

impl App {
    pub fn bootstrap() -> anyhow::Result<Self> {
        let dir = state_dir();
        let settings = Settings::load(&dir)
            .with_context(|| format!("loading settings from {}", dir.display()))?;

        let registry = NodeRegistry::new();
        registry
            .upsert_builtins(builtin_nodes())
            .context("loading builtin node table")?;

        let writer = ConfigWriter::open(&dir, settings.ports)
            .with_context(|| format!("opening state directory {}", dir.display()))?;
        let store = SubscriptionStore::new(writer.subscription_path());

        // A broken cache only costs the subscription set for this run.
        let subscription = match vn_subscribe::restore_cached(&registry, &store) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "subscription cache unreadable, continuing with builtins");
                None
            }
        };

        let opts = SwitchOptions {
            freshness_window: Duration::from_secs(settings.freshness_window_secs),
            ..Default::default()
        };
        let service = SystemdControl::new(settings.service_unit.clone());
        let supervisor = Supervisor::new(writer, service, opts);

        info!(
            dir = %dir.display(),
            nodes = registry.len(),
            unit = %settings.service_unit,
            "context ready"
        );
        Ok(Self {
            settings,
            registry,
            supervisor,
            store,
            subscription,
        })
    }
}
