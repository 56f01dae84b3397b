//! Deterministic ranking over a probe batch.

use crate::error::{Error, Result};
use crate::types::{ProbeOutcome, ProbeResult};

/// Pick the best result: minimum latency among successes, ties broken by
/// ascending node id. Reproducible for identical input batches. Returns
/// `NoReachableNode` when the success set is empty; callers must not fall
/// back to a stale choice silently.
pub fn select_best(results: &[ProbeResult]) -> Result<&ProbeResult> {
    results
        .iter()
        .filter_map(|r| match r.outcome {
            ProbeOutcome::Success { latency_ms } => Some((latency_ms, r)),
            ProbeOutcome::Failure { .. } => None,
        })
        .min_by(|(la, a), (lb, b)| la.cmp(lb).then_with(|| a.node_id.cmp(&b.node_id)))
        .map(|(_, r)| r)
        .ok_or(Error::NoReachableNode)
}
