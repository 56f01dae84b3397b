//! Subscription ingestion: fetch a remote node list, normalize it into
//! `Node` records, and swap it into the registry with a backup of the
//! previous state.

pub mod http;
pub mod model;
pub mod parse;
pub mod region;
pub mod store;

use std::time::Duration;

use chrono::Utc;
use tracing::info;

use vn_core::config::ConfigWriter;
use vn_core::registry::NodeRegistry;
use vn_core::types::SubscriptionRecord;
use vn_core::Result;

use crate::store::SubscriptionStore;

/// Fetch + normalize + swap-in. On total fetch/parse failure the registry
/// and the on-disk cache are left untouched; the previous subscription set
/// is snapshotted into the backup history before being replaced.
pub async fn refresh(
    url: &str,
    timeout: Duration,
    registry: &NodeRegistry,
    store: &SubscriptionStore,
    writer: &ConfigWriter,
) -> Result<SubscriptionRecord> {
    let raw = http::fetch_text(url, timeout)
        .await
        .map_err(vn_core::Error::from)?;
    let report = parse::parse_payload(&raw).map_err(vn_core::Error::from)?;

    if let Some(previous) = store.load()? {
        writer.snapshot_subscription(previous)?;
    }

    let record = SubscriptionRecord {
        url: url.to_string(),
        raw_payload: raw,
        fetched_at: Utc::now(),
        parsed_node_ids: report.nodes.iter().map(|n| n.id.clone()).collect(),
        dropped_entries: report.dropped,
    };

    registry.replace_subscription_nodes(report.nodes)?;
    store.save(&record)?;

    info!(
        url,
        nodes = record.parsed_node_ids.len(),
        dropped = record.dropped_entries,
        "subscription refreshed"
    );
    Ok(record)
}

/// Rebuild the subscription-origin node set from the on-disk cache, e.g. at
/// process start. A stale or unparsable cache is not fatal; the registry
/// then simply holds builtins only.
pub fn restore_cached(
    registry: &NodeRegistry,
    store: &SubscriptionStore,
) -> Result<Option<SubscriptionRecord>> {
    let Some(record) = store.load()? else {
        return Ok(None);
    };
    match parse::parse_payload(&record.raw_payload) {
        Ok(report) => {
            registry.replace_subscription_nodes(report.nodes)?;
        }
        Err(e) => {
            tracing::warn!(error = %e, "cached subscription payload unusable, keeping builtins only");
        }
    }
    Ok(Some(record))
}
