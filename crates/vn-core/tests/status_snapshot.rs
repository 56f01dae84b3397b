//! Status reporter degrades to partial data instead of hanging.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpListener;

use vn_core::config::ConfigWriter;
use vn_core::registry::NodeRegistry;
use vn_core::service::{ServiceControl, ServiceState};
use vn_core::status::{self, StatusOptions};
use vn_core::switch::{Supervisor, SwitchOptions};
use vn_core::types::{
    ListenPorts, Node, NodeSource, Protocol, ProxyMode, SubscriptionRecord, Transport,
};

/// Collaborator that answers promptly.
struct HealthyDaemon;

#[async_trait]
impl ServiceControl for HealthyDaemon {
    async fn start(&self) -> vn_core::Result<()> {
        Ok(())
    }
    async fn stop(&self) -> vn_core::Result<()> {
        Ok(())
    }
    async fn restart(&self) -> vn_core::Result<()> {
        Ok(())
    }
    async fn current_state(&self) -> vn_core::Result<ServiceState> {
        Ok(ServiceState::Running)
    }
}

/// Collaborator that never answers within any reasonable timeout.
struct WedgedDaemon;

#[async_trait]
impl ServiceControl for WedgedDaemon {
    async fn start(&self) -> vn_core::Result<()> {
        Ok(())
    }
    async fn stop(&self) -> vn_core::Result<()> {
        Ok(())
    }
    async fn restart(&self) -> vn_core::Result<()> {
        Ok(())
    }
    async fn current_state(&self) -> vn_core::Result<ServiceState> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ServiceState::Running)
    }
}

fn node(id: &str, port: u16) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        region: "Other".into(),
        server: "127.0.0.1".into(),
        port,
        protocol: Protocol::Vmess {
            uuid: "u".into(),
            alter_id: 0,
            security: "auto".into(),
            transport: Transport::default(),
        },
        source: NodeSource::Builtin,
        added_at: Utc::now(),
    }
}

#[tokio::test]
async fn snapshot_aggregates_all_sources() {
    let dir = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let registry = NodeRegistry::new();
    let n = node("n1", port);
    registry.upsert_builtins(vec![n.clone()]).unwrap();

    let sup = Supervisor::new(
        ConfigWriter::open(dir.path(), ListenPorts::default()).unwrap(),
        HealthyDaemon,
        SwitchOptions {
            restart_poll_attempts: 2,
            restart_poll_delay: Duration::from_millis(10),
            ..Default::default()
        },
    );
    sup.switch_to(&n, ProxyMode::Direct, None).await.unwrap();

    let sub = SubscriptionRecord {
        url: "https://sub.example/feed".into(),
        raw_payload: String::new(),
        fetched_at: Utc::now() - chrono::Duration::seconds(120),
        parsed_node_ids: vec!["n1".into()],
        dropped_entries: 0,
    };

    let snap = status::snapshot(&sup, &registry, Some(&sub), &StatusOptions::default()).await;
    assert_eq!(snap.service_state, Some(ServiceState::Running));
    assert_eq!(snap.active.unwrap().current_node_id, "n1");
    assert_eq!(snap.current_node.unwrap().id, "n1");
    assert!(snap.current_probe.unwrap().is_success());
    assert!(snap.subscription_age_secs.unwrap() >= 120);
    assert_eq!(snap.node_count, 1);
}

#[tokio::test]
async fn wedged_daemon_yields_partial_snapshot_quickly() {
    let dir = tempfile::tempdir().unwrap();
    let registry = NodeRegistry::new();
    let sup = Supervisor::new(
        ConfigWriter::open(dir.path(), ListenPorts::default()).unwrap(),
        WedgedDaemon,
        SwitchOptions::default(),
    );

    let opts = StatusOptions {
        service_timeout: Duration::from_millis(100),
        probe_timeout: Duration::from_millis(100),
        check_current_node: true,
    };

    let started = std::time::Instant::now();
    let snap = status::snapshot(&sup, &registry, None, &opts).await;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(snap.service_state, None);
    assert!(snap.active.is_none());
    assert!(snap.current_probe.is_none());
    assert_eq!(snap.subscription_age_secs, None);
}
