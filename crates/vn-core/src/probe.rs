//! Bounded-concurrency reachability and latency probing.
//!
//! Each node is measured by a TCP connect round-trip, averaged over a few
//! attempts; no payload is transferred. Completion order is irrelevant: the
//! returned batch is sorted by node id so downstream ranking is reproducible.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::types::{Node, ProbeOutcome, ProbeResult};

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout_per_node: Duration,
    pub overall_deadline: Duration,
    pub max_concurrency: usize,
    /// Connect attempts per node; successful round-trips are averaged.
    pub attempts: u32,
    /// Pause between attempts against the same node.
    pub attempt_gap: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout_per_node: Duration::from_secs(5),
            overall_deadline: Duration::from_secs(30),
            max_concurrency: 8,
            attempts: 3,
            attempt_gap: Duration::from_millis(200),
        }
    }
}

/// Probe a batch of nodes. Runs up to `max_concurrency` probes at once; when
/// `overall_deadline` elapses, in-flight probes are cancelled and unresolved
/// nodes are reported as timeout failures. Always returns one result per
/// input node, sorted by node id.
pub async fn probe(nodes: &[Node], opts: &ProbeOptions) -> Vec<ProbeResult> {
    let sem = Arc::new(Semaphore::new(opts.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for node in nodes {
        let sem = Arc::clone(&sem);
        let id = node.id.clone();
        let server = node.server.clone();
        let port = node.port;
        let opts = opts.clone();
        tasks.spawn(async move {
            // Closed semaphore is unreachable: we hold an Arc for the whole batch.
            let _permit = sem.acquire_owned().await;
            let outcome = probe_endpoint(&server, port, &opts).await;
            (id, outcome, Instant::now())
        });
    }

    let mut finished: HashMap<String, (ProbeOutcome, Instant)> = HashMap::new();
    let deadline = tokio::time::sleep(opts.overall_deadline);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                debug!(unresolved = nodes.len() - finished.len(), "probe deadline elapsed, cancelling");
                tasks.abort_all();
                break;
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok((id, outcome, at))) => {
                    finished.insert(id, (outcome, at));
                }
                Some(Err(_)) => {} // aborted or panicked task; node stays unresolved
            }
        }
    }

    let now = Instant::now();
    let mut results: Vec<ProbeResult> = nodes
        .iter()
        .map(|node| {
            let (outcome, measured_at) = finished.remove(&node.id).unwrap_or((
                ProbeOutcome::Failure {
                    reason: "overall deadline exceeded".to_string(),
                },
                now,
            ));
            ProbeResult {
                node_id: node.id.clone(),
                outcome,
                measured_at,
            }
        })
        .collect();
    results.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    results
}

/// Single quick reachability check of one node, used by the status reporter
/// and the supervisor's post-switch verification.
pub async fn probe_one(node: &Node, timeout: Duration) -> ProbeResult {
    let opts = ProbeOptions {
        timeout_per_node: timeout,
        attempts: 1,
        ..Default::default()
    };
    let outcome = probe_endpoint(&node.server, node.port, &opts).await;
    ProbeResult {
        node_id: node.id.clone(),
        outcome,
        measured_at: Instant::now(),
    }
}

async fn probe_endpoint(server: &str, port: u16, opts: &ProbeOptions) -> ProbeOutcome {
    let mut latencies: Vec<u64> = Vec::new();
    let mut last_error = String::from("no attempts");

    for attempt in 0..opts.attempts.max(1) {
        if attempt > 0 {
            tokio::time::sleep(opts.attempt_gap).await;
        }
        let started = Instant::now();
        match tokio::time::timeout(
            opts.timeout_per_node,
            TcpStream::connect((server, port)),
        )
        .await
        {
            Ok(Ok(_stream)) => {
                latencies.push(started.elapsed().as_millis() as u64);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("connect timeout after {:?}", opts.timeout_per_node),
        }
    }

    if latencies.is_empty() {
        ProbeOutcome::Failure { reason: last_error }
    } else {
        let avg = latencies.iter().sum::<u64>() / latencies.len() as u64;
        ProbeOutcome::Success { latency_ms: avg }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeSource, Protocol, Transport};
    use chrono::Utc;
    use tokio::net::TcpListener;

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

    fn quick_opts() -> ProbeOptions {
        ProbeOptions {
            timeout_per_node: Duration::from_secs(2),
            overall_deadline: Duration::from_secs(10),
            max_concurrency: 4,
            attempts: 1,
            attempt_gap: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn reachable_and_unreachable_in_one_batch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        // Bind then drop to get a port that refuses connections.
        let closed_port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let nodes = vec![
            node("b-open", "127.0.0.1", open_port),
            node("a-closed", "127.0.0.1", closed_port),
        ];
        let results = probe(&nodes, &quick_opts()).await;

        assert_eq!(results.len(), 2);
        // Sorted by node id regardless of completion order.
        assert_eq!(results[0].node_id, "a-closed");
        assert_eq!(results[1].node_id, "b-open");
        assert!(!results[0].outcome.is_success());
        assert!(results[1].outcome.is_success());
    }

    #[tokio::test]
    async fn deadline_marks_unresolved_as_timeout_failures() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Two attempts with a long gap keep every task in flight well past
        // the 100ms overall deadline.
        let opts = ProbeOptions {
            timeout_per_node: Duration::from_secs(1),
            overall_deadline: Duration::from_millis(100),
            max_concurrency: 4,
            attempts: 2,
            attempt_gap: Duration::from_secs(30),
        };
        let nodes = vec![node("n1", "127.0.0.1", port), node("n2", "127.0.0.1", port)];

        let started = Instant::now();
        let results = probe(&nodes, &opts).await;
        assert!(started.elapsed() < Duration::from_secs(5));

        assert_eq!(results.len(), 2);
        for r in &results {
            match &r.outcome {
                ProbeOutcome::Failure { reason } => assert!(reason.contains("deadline")),
                ProbeOutcome::Success { .. } => panic!("probe should not have resolved"),
            }
        }
    }

    #[tokio::test]
    async fn probe_one_reports_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let r = probe_one(&node("x", "127.0.0.1", port), Duration::from_secs(2)).await;
        assert!(r.outcome.is_success());
    }
}
