//! Read-only status aggregation. Every external call is individually
//! time-bounded so a wedged daemon or dead network degrades the snapshot to
//! partial information instead of hanging the caller.

use std::time::Duration;

use tokio::time::timeout;

use crate::probe;
use crate::registry::NodeRegistry;
use crate::service::{ServiceControl, ServiceState};
use crate::switch::Supervisor;
use crate::types::{ActiveConfig, Node, ProbeOutcome, ProbeResult, SubscriptionRecord};

#[derive(Debug, Clone)]
pub struct StatusOptions {
    pub service_timeout: Duration,
    pub probe_timeout: Duration,
    /// Run one lightweight reachability check of the current node only;
    /// never a full batch.
    pub check_current_node: bool,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            service_timeout: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            check_current_node: true,
        }
    }
}

/// Aggregated point-in-time view for CLI/TUI consumers. Fields are `None`
/// when the underlying source was unavailable within its timeout.
#[derive(Debug)]
pub struct StatusSnapshot {
    pub service_state: Option<ServiceState>,
    pub active: Option<ActiveConfig>,
    pub current_node: Option<Node>,
    pub current_probe: Option<ProbeOutcome>,
    pub last_batch: Vec<ProbeResult>,
    pub subscription_age_secs: Option<i64>,
    pub node_count: usize,
}

/// Pure aggregation over the supervisor's read-side caches plus two bounded
/// external calls. Holds no locks across awaits and mutates nothing.
pub async fn snapshot<S: ServiceControl>(
    supervisor: &Supervisor<S>,
    registry: &NodeRegistry,
    subscription: Option<&SubscriptionRecord>,
    opts: &StatusOptions,
) -> StatusSnapshot {
    let active = supervisor.active();

    let service_state = match timeout(
        opts.service_timeout,
        supervisor.service().current_state(),
    )
    .await
    {
        Ok(Ok(state)) => Some(state),
        Ok(Err(_)) | Err(_) => None,
    };

    let current_node = active
        .as_ref()
        .and_then(|a| registry.get(&a.current_node_id).ok());

    let current_probe = match (&current_node, opts.check_current_node) {
        (Some(node), true) => {
            // probe_one bounds itself with probe_timeout; the outer timeout
            // guards name resolution as well.
            match timeout(
                opts.probe_timeout + Duration::from_millis(500),
                probe::probe_one(node, opts.probe_timeout),
            )
            .await
            {
                Ok(result) => Some(result.outcome),
                Err(_) => Some(ProbeOutcome::Failure {
                    reason: "status probe timed out".to_string(),
                }),
            }
        }
        _ => None,
    };

    let subscription_age_secs =
        subscription.map(|rec| (chrono::Utc::now() - rec.fetched_at).num_seconds());

    StatusSnapshot {
        service_state,
        active,
        current_node,
        current_probe,
        last_batch: supervisor.last_batch(),
        subscription_age_secs,
        node_count: registry.len(),
    }
}
