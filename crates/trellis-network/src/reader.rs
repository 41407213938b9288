//! Bounded network traversal for visualization.
//!
//! Two query shapes:
//!
//! - [`NetworkReader::fetch_subtree`] - depth-first, pre-order, driven by a
//!   [`PopulatePlan`] built before the walk starts.
//! - [`NetworkReader::fetch_network`] - breadth-first, one batch lookup per
//!   frontier.
//!
//! Neither trusts the stored relation to be acyclic. Both keep a visited set
//! keyed by provider id, so a provider is emitted at most once even when the
//! graph loops back or lists a child twice.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use trellis_store::{ProviderId, ProviderNode, ProviderStore};

/// Hard bounds applied on top of what callers ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderLimits {
    /// Largest depth honoured for either query
    pub max_depth: usize,
    /// Largest number of nodes returned by one query
    pub max_nodes: usize,
}

impl Default for ReaderLimits {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_nodes: 1000,
        }
    }
}

/// One provider in a traversal result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkNode {
    pub id: ProviderId,
    /// Provider this one was reached from; `None` for the traversal root
    #[serde(rename = "pid")]
    pub parent_id: Option<ProviderId>,
    pub name: String,
    pub title: String,
    pub level: u32,
    /// Cached downline of the provider
    pub total_referrals: u64,
    pub join_date: DateTime<Utc>,
}

impl NetworkNode {
    fn from_provider(node: &ProviderNode, parent_id: Option<ProviderId>) -> Self {
        Self {
            id: node.id.clone(),
            parent_id,
            name: node.name.clone(),
            title: node.title.clone(),
            level: node.level,
            total_referrals: node.downline,
            join_date: node.created_at,
        }
    }
}

/// Nested description of how many `referred` levels to expand.
///
/// A plan of depth N expands the children of the node it is attached to and
/// hands a plan of depth N-1 to each child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulatePlan {
    nested: Option<Box<PopulatePlan>>,
}

impl PopulatePlan {
    /// Plan expanding `depth` levels, or `None` for depth zero.
    pub fn levels(depth: usize) -> Option<Self> {
        let mut plan = None;
        for _ in 0..depth {
            plan = Some(PopulatePlan {
                nested: plan.map(Box::new),
            });
        }
        plan
    }

    /// Plan for the children's children.
    pub fn nested(&self) -> Option<&PopulatePlan> {
        self.nested.as_deref()
    }
}

/// Read-only traversal queries.
pub struct NetworkReader<S: ?Sized> {
    store: Arc<S>,
    limits: ReaderLimits,
}

impl<S: ProviderStore + ?Sized> NetworkReader<S> {
    pub fn new(store: Arc<S>, limits: ReaderLimits) -> Self {
        Self { store, limits }
    }

    /// Pre-order walk of `root` and `depth` levels of referrals below it.
    ///
    /// Missing or blank child ids are skipped. Fails only if `root` itself is
    /// absent or the store errors.
    pub fn fetch_subtree(&self, root: &ProviderId, depth: usize) -> Result<Vec<NetworkNode>> {
        let depth = depth.min(self.limits.max_depth);
        let root_node = self
            .store
            .get(root)?
            .ok_or_else(|| Error::NotFound(format!("provider {}", root)))?;

        let plan = PopulatePlan::levels(depth);
        let mut visited = HashSet::from([root_node.id.clone()]);
        let mut out = vec![NetworkNode::from_provider(&root_node, None)];
        let mut stack: Vec<(ProviderId, ProviderId, Option<&PopulatePlan>)> = Vec::new();

        if let Some(plan) = &plan {
            push_children(&mut stack, &root_node, plan);
        }

        while let Some((id, parent, plan)) = stack.pop() {
            if out.len() >= self.limits.max_nodes {
                tracing::warn!(root = %root, limit = self.limits.max_nodes, "Subtree truncated");
                break;
            }
            if !id.is_valid() || visited.contains(&id) {
                continue;
            }
            let Some(node) = self.store.get(&id)? else {
                tracing::debug!(provider = %id, "Skipping missing provider in subtree");
                continue;
            };

            visited.insert(id);
            if let Some(plan) = plan {
                push_children(&mut stack, &node, plan);
            }
            out.push(NetworkNode::from_provider(&node, Some(parent)));
        }

        Ok(out)
    }

    /// Level-order walk of at most `max_depth` frontiers starting at `root`.
    ///
    /// Fails with `NotFound` if `root` is absent, whatever `max_depth` is.
    pub fn fetch_network(&self, root: &ProviderId, max_depth: usize) -> Result<Vec<NetworkNode>> {
        if self.store.get(root)?.is_none() {
            return Err(Error::NotFound(format!("provider {}", root)));
        }

        let max_depth = max_depth.min(self.limits.max_depth);
        let mut frontier: Vec<(ProviderId, Option<ProviderId>)> = vec![(root.clone(), None)];
        let mut visited: HashSet<ProviderId> = HashSet::new();
        let mut out = Vec::new();

        for depth in 0..max_depth {
            if frontier.is_empty() {
                break;
            }

            let mut ids: Vec<ProviderId> = frontier.iter().map(|(id, _)| id.clone()).collect();
            ids.sort();
            ids.dedup();
            let mut fetched: HashMap<ProviderId, ProviderNode> = self
                .store
                .get_many(&ids)?
                .into_iter()
                .map(|node| (node.id.clone(), node))
                .collect();

            let mut next = Vec::new();
            for (id, parent) in frontier {
                if visited.contains(&id) {
                    continue;
                }
                let Some(node) = fetched.remove(&id) else {
                    tracing::debug!(provider = %id, "Skipping missing provider in network");
                    continue;
                };
                if out.len() >= self.limits.max_nodes {
                    tracing::warn!(root = %root, limit = self.limits.max_nodes, "Network truncated");
                    return Ok(out);
                }

                for child in &node.referred {
                    if child.is_valid() && !visited.contains(child) {
                        next.push((child.clone(), Some(node.id.clone())));
                    }
                }
                out.push(NetworkNode::from_provider(&node, parent));
                visited.insert(id);
            }

            tracing::debug!(root = %root, depth, emitted = out.len(), next = next.len(), "Frontier done");
            frontier = next;
        }

        Ok(out)
    }
}

fn push_children<'p>(
    stack: &mut Vec<(ProviderId, ProviderId, Option<&'p PopulatePlan>)>,
    node: &ProviderNode,
    plan: &'p PopulatePlan,
) {
    // Reversed so the first referral is popped first.
    for child in node.referred.iter().rev() {
        stack.push((child.clone(), node.id.clone(), plan.nested()));
    }
}
