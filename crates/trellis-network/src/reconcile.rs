//! Downline reconciliation.
//!
//! The attach path only ever nudges cached downlines by one and never repairs
//! them after a failed walk. This recount is the repair path: it walks every
//! reachable descendant and overwrites the cache. It is meant for admin or
//! scheduled use, never for the attach path.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use trellis_store::{FieldUpdate, ProviderId, ProviderStore};

/// Outcome of one recount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recount {
    /// Cached downline before the recount
    pub previous: u64,
    /// Number of distinct descendants actually reachable
    pub recomputed: u64,
}

impl Recount {
    pub fn drifted(&self) -> bool {
        self.previous != self.recomputed
    }
}

/// Recomputes cached downlines from the stored relation.
pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ProviderStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Count descendants of `id`, write the count back, report the drift.
    pub fn recompute(&self, id: &ProviderId) -> Result<Recount> {
        let root = self
            .store
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("provider {}", id)))?;

        let mut visited = HashSet::from([root.id.clone()]);
        let mut frontier: Vec<ProviderId> = root.referred.clone();
        let mut descendants: u64 = 0;

        while !frontier.is_empty() {
            frontier.retain(|child| child.is_valid() && visited.insert(child.clone()));
            let nodes = self.store.get_many(&frontier)?;
            descendants += nodes.len() as u64;
            frontier = nodes
                .into_iter()
                .flat_map(|node| node.referred)
                .filter(|child| !visited.contains(child))
                .collect();
        }

        let recount = Recount {
            previous: root.downline,
            recomputed: descendants,
        };
        if recount.drifted() {
            self.store
                .update_fields(id, &[FieldUpdate::SetDownline(descendants)])?;
            tracing::info!(
                provider = %id,
                previous = recount.previous,
                recomputed = recount.recomputed,
                "Repaired downline"
            );
        }
        Ok(recount)
    }
}
