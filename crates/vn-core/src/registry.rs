//! In-memory node table: builtin set plus the subscription-derived set.
//!
//! Read-heavy. Readers take the shared lock; the only writers are the
//! builtin loader and the subscription normalizer, both infrequent.

use parking_lot::RwLock;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{Node, NodeSource};

#[derive(Default)]
struct Inner {
    builtin: Vec<Node>,
    subscription: Vec<Node>,
}

/// Table of candidate endpoints. Node ids are unique across both sets at
/// any instant.
#[derive(Default)]
pub struct NodeRegistry {
    inner: RwLock<Inner>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All known nodes, builtin first, each set in insertion order.
    pub fn list(&self) -> Vec<Node> {
        let inner = self.inner.read();
        let mut out = Vec::with_capacity(inner.builtin.len() + inner.subscription.len());
        out.extend(inner.builtin.iter().cloned());
        out.extend(inner.subscription.iter().cloned());
        out
    }

    pub fn get(&self, id: &str) -> Result<Node> {
        let inner = self.inner.read();
        inner
            .builtin
            .iter()
            .chain(inner.subscription.iter())
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.builtin.len() + inner.subscription.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the builtin set. Rejects ids that collide with each other or
    /// with the current subscription set.
    pub fn upsert_builtins(&self, nodes: Vec<Node>) -> Result<()> {
        debug_assert!(nodes.iter().all(|n| n.source == NodeSource::Builtin));
        let mut inner = self.inner.write();
        check_unique(&nodes, &inner.subscription)?;
        inner.builtin = nodes;
        Ok(())
    }

    /// Replace the subscription-origin set wholesale; builtin nodes persist.
    /// Returns the previous subscription set so the caller can snapshot it.
    pub fn replace_subscription_nodes(&self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        debug_assert!(nodes.iter().all(|n| n.source == NodeSource::Subscription));
        let mut inner = self.inner.write();
        check_unique(&nodes, &inner.builtin)?;
        Ok(std::mem::replace(&mut inner.subscription, nodes))
    }
}

fn check_unique(incoming: &[Node], existing: &[Node]) -> Result<()> {
    let mut seen: HashSet<&str> = existing.iter().map(|n| n.id.as_str()).collect();
    for node in incoming {
        if !seen.insert(&node.id) {
            return Err(Error::DuplicateId(node.id.clone()));
        }
    }
    Ok(())
}
