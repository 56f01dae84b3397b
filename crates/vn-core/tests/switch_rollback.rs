//! End-to-end supervisor scenarios against a scripted daemon double:
//! successful switches, automatic rollback, fatal rollback failure, probe
//! freshness enforcement, and mode transitions.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use vn_core::config::ConfigWriter;
use vn_core::error::Error;
use vn_core::mode::ModeMachine;
use vn_core::probe::{self, ProbeOptions};
use vn_core::registry::NodeRegistry;
use vn_core::select::select_best;
use vn_core::service::{ServiceControl, ServiceState};
use vn_core::switch::{Supervisor, SwitchOptions};
use vn_core::types::{
    ChainProtocol, ListenPorts, Node, NodeSource, ProbeOutcome, ProbeResult, Protocol, ProxyMode,
    StaticProxy, Transport,
};

/// Daemon double: restarts succeed unless scripted to fail, and the service
/// reports `Running` after a successful restart.
struct MockDaemon {
    state: Mutex<ServiceState>,
    /// Fail this many restarts before succeeding again.
    fail_restarts: AtomicUsize,
    restart_count: AtomicUsize,
}

impl MockDaemon {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServiceState::Stopped),
            fail_restarts: AtomicUsize::new(0),
            restart_count: AtomicUsize::new(0),
        })
    }

    fn fail_next_restarts(&self, n: usize) {
        self.fail_restarts.store(n, Ordering::SeqCst);
    }

    fn restarts(&self) -> usize {
        self.restart_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceControl for MockDaemon {
    async fn start(&self) -> vn_core::Result<()> {
        *self.state.lock() = ServiceState::Running;
        Ok(())
    }

    async fn stop(&self) -> vn_core::Result<()> {
        *self.state.lock() = ServiceState::Stopped;
        Ok(())
    }

    async fn restart(&self) -> vn_core::Result<()> {
        self.restart_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_restarts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_restarts.store(remaining - 1, Ordering::SeqCst);
            *self.state.lock() = ServiceState::Error;
            return Err(Error::Io(std::io::Error::other("scripted restart failure")));
        }
        *self.state.lock() = ServiceState::Running;
        Ok(())
    }

    async fn current_state(&self) -> vn_core::Result<ServiceState> {
        Ok(*self.state.lock())
    }
}

/// Orphan-rule workaround: a foreign trait cannot be implemented for
/// `Arc<MockDaemon>` from an integration-test crate, so wrap the handle in a
/// local newtype that forwards to the shared daemon.
#[derive(Clone)]
struct SharedDaemon(Arc<MockDaemon>);

#[async_trait]
impl ServiceControl for SharedDaemon {
    async fn start(&self) -> vn_core::Result<()> {
        self.0.start().await
    }

    async fn stop(&self) -> vn_core::Result<()> {
        self.0.stop().await
    }

    async fn restart(&self) -> vn_core::Result<()> {
        self.0.restart().await
    }

    async fn current_state(&self) -> vn_core::Result<ServiceState> {
        self.0.current_state().await
    }
}

/// Daemon double whose restart takes a while, holding a switch in flight.
struct SlowDaemon {
    restart_delay: Duration,
}

#[async_trait]
impl ServiceControl for SlowDaemon {
    async fn start(&self) -> vn_core::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> vn_core::Result<()> {
        Ok(())
    }

    async fn restart(&self) -> vn_core::Result<()> {
        tokio::time::sleep(self.restart_delay).await;
        Ok(())
    }

    async fn current_state(&self) -> vn_core::Result<ServiceState> {
        Ok(ServiceState::Running)
    }
}

fn node(id: &str, server: &str, port: u16) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        region: "Other".into(),
        server: server.to_string(),
        port,
        protocol: Protocol::Vless {
            uuid: "u".into(),
            flow: String::new(),
            transport: Transport::default(),
        },
        source: NodeSource::Subscription,
        added_at: Utc::now(),
    }
}

fn fast_opts() -> SwitchOptions {
    SwitchOptions {
        freshness_window: Duration::from_secs(60),
        reprobe_if_stale: true,
        restart_poll_attempts: 2,
        restart_poll_delay: Duration::from_millis(10),
        post_switch_check: true,
        probe_timeout: Duration::from_secs(2),
    }
}

fn supervisor(
    dir: &std::path::Path,
    daemon: Arc<MockDaemon>,
    opts: SwitchOptions,
) -> Supervisor<SharedDaemon> {
    let writer = ConfigWriter::open(dir, ListenPorts::default()).unwrap();
    Supervisor::new(writer, SharedDaemon(daemon), opts)
}

async fn local_listener() -> (TcpListener, u16) {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = l.local_addr().unwrap().port();
    (l, port)
}

fn success_result(id: &str, latency_ms: u64) -> ProbeResult {
    ProbeResult {
        node_id: id.to_string(),
        outcome: ProbeOutcome::Success { latency_ms },
        measured_at: Instant::now(),
    }
}

#[tokio::test]
async fn probe_select_switch_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let sup = supervisor(dir.path(), Arc::clone(&daemon), fast_opts());

    let (_l, port) = local_listener().await;
    let b = node("b", "127.0.0.1", port);

    // Batch as in: A success 40ms, B success 25ms, C failure.
    let batch = vec![
        success_result("a", 40),
        success_result("b", 25),
        ProbeResult {
            node_id: "c".into(),
            outcome: ProbeOutcome::Failure {
                reason: "refused".into(),
            },
            measured_at: Instant::now(),
        },
    ];
    let best = select_best(&batch).unwrap();
    assert_eq!(best.node_id, "b");
    sup.record_batch(batch);

    let active = sup.switch_to(&b, ProxyMode::Direct, None).await.unwrap();
    assert_eq!(active.current_node_id, "b");
    assert_eq!(active.version, 1);
    assert_eq!(daemon.restarts(), 1);
    assert_eq!(
        daemon.current_state().await.unwrap(),
        ServiceState::Running
    );
}

#[tokio::test]
async fn failed_restart_rolls_back_to_previous_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let sup = supervisor(dir.path(), Arc::clone(&daemon), fast_opts());

    let (_l, port) = local_listener().await;
    let good = node("good", "127.0.0.1", port);
    let other = node("other", "127.0.0.1", port);

    sup.switch_to(&good, ProxyMode::Direct, None).await.unwrap();
    let good_bytes = fs::read_to_string(dir.path().join("config.json")).unwrap();
    let pre = sup.active().unwrap();

    // Forward restart fails; rollback restart succeeds.
    daemon.fail_next_restarts(1);
    let err = sup
        .switch_to(&other, ProxyMode::Direct, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RolledBack(_)));

    let after = sup.active().unwrap();
    assert_eq!(after.current_node_id, pre.current_node_id);
    assert_eq!(after.mode, pre.mode);
    // Forward swap and its reversal each commit a version.
    assert_eq!(after.version, pre.version + 2);
    assert_eq!(
        fs::read_to_string(dir.path().join("config.json")).unwrap(),
        good_bytes
    );
}

#[tokio::test]
async fn unreachable_node_after_activation_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let sup = supervisor(dir.path(), Arc::clone(&daemon), fast_opts());

    let (_l, open_port) = local_listener().await;
    let closed_port = {
        let (l, p) = local_listener().await;
        drop(l);
        p
    };
    let good = node("good", "127.0.0.1", open_port);
    let dead = node("dead", "127.0.0.1", closed_port);

    sup.switch_to(&good, ProxyMode::Direct, None).await.unwrap();

    // Fake fresh evidence so the pre-switch gate passes; the post-switch
    // probe then finds the node unreachable.
    sup.record_batch(vec![success_result("dead", 10)]);
    let err = sup
        .switch_to(&dead, ProxyMode::Direct, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RolledBack(_)));
    assert_eq!(sup.active().unwrap().current_node_id, "good");
}

#[tokio::test]
async fn failed_rollback_restart_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let sup = supervisor(dir.path(), Arc::clone(&daemon), fast_opts());

    let (_l, port) = local_listener().await;
    let good = node("good", "127.0.0.1", port);
    let other = node("other", "127.0.0.1", port);

    sup.switch_to(&good, ProxyMode::Direct, None).await.unwrap();

    // Both the forward restart and the rollback restart fail.
    daemon.fail_next_restarts(2);
    let err = sup
        .switch_to(&other, ProxyMode::Direct, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Fatal(_)));
}

#[tokio::test]
async fn stale_probe_is_rejected_without_version_change() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let opts = SwitchOptions {
        reprobe_if_stale: false,
        freshness_window: Duration::from_millis(500),
        ..fast_opts()
    };
    let sup = supervisor(dir.path(), Arc::clone(&daemon), opts);

    let (_l, port) = local_listener().await;
    let good = node("good", "127.0.0.1", port);
    let target = node("target", "127.0.0.1", port);

    // Seed with a fresh probe for the first switch.
    sup.record_batch(vec![success_result("good", 10)]);
    sup.switch_to(&good, ProxyMode::Direct, None).await.unwrap();
    let pre_version = sup.active().unwrap().version;

    // Evidence for `target` aged past the freshness window.
    let stale = ProbeResult {
        node_id: "target".into(),
        outcome: ProbeOutcome::Success { latency_ms: 30 },
        measured_at: Instant::now()
            .checked_sub(Duration::from_secs(2))
            .expect("process uptime exceeds two seconds"),
    };
    sup.record_batch(vec![stale]);

    let err = sup
        .switch_to(&target, ProxyMode::Direct, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StaleProbe { .. }));
    assert_eq!(sup.active().unwrap().version, pre_version);
    assert_eq!(sup.active().unwrap().current_node_id, "good");
}

#[tokio::test]
async fn never_probed_node_is_rejected_when_reprobe_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let opts = SwitchOptions {
        reprobe_if_stale: false,
        ..fast_opts()
    };
    let sup = supervisor(dir.path(), Arc::clone(&daemon), opts);

    let (_l, port) = local_listener().await;
    let target = node("target", "127.0.0.1", port);
    let err = sup
        .switch_to(&target, ProxyMode::Direct, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StaleProbe { .. }));
    assert!(sup.active().is_none());
}

#[tokio::test]
async fn concurrent_switch_is_rejected_as_busy() {
    let dir = tempfile::tempdir().unwrap();
    let writer = ConfigWriter::open(dir.path(), ListenPorts::default()).unwrap();
    let daemon = SlowDaemon {
        restart_delay: Duration::from_millis(500),
    };
    let sup = Arc::new(Supervisor::new(writer, daemon, fast_opts()));

    let (_l, port) = local_listener().await;
    let first = node("first", "127.0.0.1", port);
    let second = node("second", "127.0.0.1", port);

    let in_flight = {
        let sup = Arc::clone(&sup);
        let first = first.clone();
        tokio::spawn(async move { sup.switch_to(&first, ProxyMode::Direct, None).await })
    };
    // Let the first switch take the lock; its restart then blocks for 500ms.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = sup
        .switch_to(&second, ProxyMode::Direct, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Busy));
    assert!(matches!(sup.try_writer().unwrap_err(), Error::Busy));

    let applied = in_flight.await.unwrap().unwrap();
    assert_eq!(applied.current_node_id, "first");
    // The rejected switch committed nothing.
    assert_eq!(sup.active().unwrap().current_node_id, "first");
    assert_eq!(sup.active().unwrap().version, 1);
}

#[tokio::test]
async fn operator_restore_returns_to_latest_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let sup = supervisor(dir.path(), Arc::clone(&daemon), fast_opts());

    let (_l, port) = local_listener().await;
    let good = node("good", "127.0.0.1", port);
    let other = node("other", "127.0.0.1", port);

    sup.switch_to(&good, ProxyMode::Direct, None).await.unwrap();
    let good_bytes = fs::read_to_string(dir.path().join("config.json")).unwrap();
    sup.switch_to(&other, ProxyMode::Direct, None).await.unwrap();

    let restored = sup.restore_backup().await.unwrap();
    assert_eq!(restored.current_node_id, "good");
    assert_eq!(restored.version, 3); // versions never go backwards
    assert_eq!(
        fs::read_to_string(dir.path().join("config.json")).unwrap(),
        good_bytes
    );
    // Restore restarts the daemon once on top of the two switches.
    assert_eq!(daemon.restarts(), 3);
}

#[tokio::test]
async fn operator_restore_without_history_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let sup = supervisor(dir.path(), Arc::clone(&daemon), fast_opts());

    let err = sup.restore_backup().await.unwrap_err();
    assert!(matches!(err, Error::NoBackup));
    assert!(sup.active().is_none());
    assert_eq!(daemon.restarts(), 0);
}

#[tokio::test]
async fn toggle_without_static_proxy_keeps_direct_mode() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let sup = supervisor(dir.path(), Arc::clone(&daemon), fast_opts());
    let registry = NodeRegistry::new();

    let (_l, port) = local_listener().await;
    let n = node("n", "127.0.0.1", port);
    registry
        .replace_subscription_nodes(vec![n.clone()])
        .unwrap();
    sup.switch_to(&n, ProxyMode::Direct, None).await.unwrap();
    let pre_version = sup.active().unwrap().version;

    let machine = ModeMachine::new(&sup, &registry);
    assert_eq!(machine.current(), ProxyMode::Direct);

    let err = machine.toggle(None).await.unwrap_err();
    assert!(matches!(err, Error::MissingStaticProxy));
    assert_eq!(machine.current(), ProxyMode::Direct);
    assert_eq!(sup.active().unwrap().version, pre_version);
}

#[tokio::test]
async fn toggle_round_trip_direct_chained_direct() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let sup = supervisor(dir.path(), Arc::clone(&daemon), fast_opts());
    let registry = NodeRegistry::new();

    let (_l, port) = local_listener().await;
    let n = node("n", "127.0.0.1", port);
    registry
        .replace_subscription_nodes(vec![n.clone()])
        .unwrap();
    sup.switch_to(&n, ProxyMode::Direct, None).await.unwrap();

    let sp = StaticProxy {
        server: "127.0.0.1".into(),
        port: 1080,
        protocol: ChainProtocol::Socks,
        username: None,
        password: None,
    };
    let machine = ModeMachine::new(&sup, &registry);

    let chained = machine.toggle(Some(sp)).await.unwrap();
    assert_eq!(chained.mode, ProxyMode::Chained);
    assert_eq!(chained.current_node_id, "n");

    let direct = machine.toggle(None).await.unwrap();
    assert_eq!(direct.mode, ProxyMode::Direct);
    assert!(direct.static_proxy.is_none());
}

#[tokio::test]
async fn full_batch_probe_feeds_freshness_gate() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = MockDaemon::new();
    let opts = SwitchOptions {
        reprobe_if_stale: false,
        ..fast_opts()
    };
    let sup = supervisor(dir.path(), Arc::clone(&daemon), opts);

    let (_l, port) = local_listener().await;
    let nodes = vec![node("n1", "127.0.0.1", port), node("n2", "127.0.0.1", port)];
    let probe_opts = ProbeOptions {
        attempts: 1,
        ..Default::default()
    };
    let batch = probe::probe(&nodes, &probe_opts).await;
    let best_id = select_best(&batch).unwrap().node_id.clone();
    sup.record_batch(batch);

    let target = nodes.iter().find(|n| n.id == best_id).unwrap();
    let active = sup
        .switch_to(target, ProxyMode::Direct, None)
        .await
        .unwrap();
    assert_eq!(active.current_node_id, best_id);
}
