//! Network mutation: attaching providers and repairing aggregates.
//!
//! Attaching a provider touches the ancestor path twice:
//!
//! 1. Downline propagation adds the delta to every ancestor's cached
//!    descendant count, up to [`MAX_ANCESTOR_HOPS`] hops.
//! 2. When the attach fills the owner's last slot, level promotion walks up
//!    from the new node, bumping referrers whose level does not exceed the
//!    level below them.
//!
//! Both walks are plain loops with one store round-trip per hop. Nothing is
//! rolled back: a store failure mid-walk leaves earlier hops applied, and the
//! cached aggregates stay understated until reconciliation recounts them.
//!
//! Concurrent attaches racing on the same code can both pass validation and
//! overfill the owner. Callers must serialize attaches per owner.

use crate::error::{Error, Result};
use crate::registry::{normalize_code, CodeRegistry, MAX_REFERRALS};
use serde::Serialize;
use std::sync::Arc;
use trellis_store::{FieldUpdate, ProviderId, ProviderNode, ProviderStore};

/// Upper bound on ancestor hops for both upward walks.
pub const MAX_ANCESTOR_HOPS: usize = 10;

/// Levels above this trip the promotion circuit breaker.
pub const LEVEL_CEILING: u32 = 10;

/// How a promotion walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "provider", rename_all = "snake_case")]
pub enum Promotion {
    /// Walked up to a provider with no referrer
    ReachedRoot,
    /// Stopped by the hop bound
    DepthGuard,
    /// A referrer already outranked the node below it
    Settled,
    /// A provider above [`LEVEL_CEILING`] was reset and cut loose from its referrer
    Detached(ProviderId),
}

/// Result of a successful attach.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachReport {
    pub referrer: ProviderId,
    pub provider: ProviderId,
    /// 1-based referral slot the provider took
    pub slot: usize,
    /// Ancestors whose downline was incremented
    pub ancestors_updated: usize,
    /// Present when this attach used the referrer's last slot
    pub promotion: Option<Promotion>,
    /// Set when an aggregate walk failed after the link was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_error: Option<String>,
}

/// Attaches providers under referral codes and maintains aggregates.
pub struct NetworkMutator<S: ?Sized> {
    store: Arc<S>,
    registry: Arc<CodeRegistry<S>>,
}

impl<S: ProviderStore + ?Sized> NetworkMutator<S> {
    pub fn new(registry: Arc<CodeRegistry<S>>) -> Self {
        Self {
            store: registry.store(),
            registry,
        }
    }

    /// Link `provider` under the owner of `code`.
    ///
    /// Validation and link-write errors come back unchanged. Once the link is
    /// written the attach succeeds: a store failure during aggregate repair is
    /// logged and reported in [`AttachReport::aggregate_error`].
    pub fn attach(&self, code: &str, provider: &ProviderId) -> Result<AttachReport> {
        let owner = self.registry.validate(code)?;
        let new_node = self.load(provider)?;

        if new_node.id == owner.owner_id {
            return Err(Error::InvalidInput(format!(
                "provider {} cannot use its own referral code",
                provider
            )));
        }
        if let Some(existing) = &new_node.referrer {
            return Err(Error::InvalidInput(format!(
                "provider {} was already referred by {}",
                provider, existing
            )));
        }

        let used_before = owner.referred_so_far.len();
        self.store.update_fields(
            &owner.owner_id,
            &[FieldUpdate::AppendReferred(provider.clone())],
        )?;
        self.store
            .update_fields(provider, &[FieldUpdate::Referrer(Some(owner.owner_id.clone()))])?;

        let mut aggregate_error = None;
        let ancestors_updated = match self.propagate_downline(provider, 1) {
            Ok(hops) => hops,
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Downline propagation interrupted");
                aggregate_error = Some(e.to_string());
                0
            }
        };

        let promotion = if used_before == MAX_REFERRALS - 1 {
            match self.promote_level(provider) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::warn!(provider = %provider, error = %e, "Level promotion interrupted");
                    aggregate_error.get_or_insert_with(|| e.to_string());
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            referrer = %owner.owner_id,
            provider = %provider,
            code = %normalize_code(code),
            slot = used_before + 1,
            "Attached provider to referral network"
        );

        Ok(AttachReport {
            referrer: owner.owner_id,
            provider: provider.clone(),
            slot: used_before + 1,
            ancestors_updated,
            promotion,
            aggregate_error,
        })
    }

    /// Add `delta` to the downline of each ancestor of `start`.
    ///
    /// Returns the number of ancestors updated.
    pub fn propagate_downline(&self, start: &ProviderId, delta: i64) -> Result<usize> {
        let mut current = self.load(start)?;
        let mut hops = 0;

        while let Some(parent) = current.referrer.take() {
            self.store
                .update_fields(&parent, &[FieldUpdate::IncrementDownline(delta)])?;
            hops += 1;
            tracing::debug!(ancestor = %parent, delta, hop = hops, "Propagated downline");

            if hops == MAX_ANCESTOR_HOPS {
                break;
            }
            current = self.load(&parent)?;
        }

        Ok(hops)
    }

    /// Promote referrers upward from `start`, at most [`MAX_ANCESTOR_HOPS`] hops.
    pub fn promote_level(&self, start: &ProviderId) -> Result<Promotion> {
        self.promote_level_bounded(start, MAX_ANCESTOR_HOPS)
    }

    /// Promote referrers upward from `start`, at most `max_depth` hops.
    pub fn promote_level_bounded(&self, start: &ProviderId, max_depth: usize) -> Result<Promotion> {
        let mut node_id = start.clone();

        for depth in 0..max_depth {
            let node = self.load(&node_id)?;
            let Some(referrer_id) = node.referrer.clone() else {
                return Ok(Promotion::ReachedRoot);
            };

            if node.level > LEVEL_CEILING {
                tracing::warn!(
                    provider = %node.id,
                    level = node.level,
                    "Level above ceiling, detaching provider from network"
                );
                self.store.update_fields(
                    &node.id,
                    &[
                        FieldUpdate::Level(0),
                        FieldUpdate::Referrer(None),
                        FieldUpdate::SetDownline(0),
                        FieldUpdate::ClearReferred,
                    ],
                )?;
                return Ok(Promotion::Detached(node.id));
            }

            let referrer = self.load(&referrer_id)?;
            if referrer.level > node.level {
                return Ok(Promotion::Settled);
            }

            let level = node.level + 1;
            self.store
                .update_fields(&referrer_id, &[FieldUpdate::Level(level)])?;
            tracing::debug!(provider = %referrer_id, level, depth, "Promoted referrer");
            node_id = referrer_id;
        }

        Ok(Promotion::DepthGuard)
    }

    fn load(&self, id: &ProviderId) -> Result<ProviderNode> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("provider {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::registry::RegistryConfig;
    use crate::test_support::{chain, fixture, join, FlakyStore};
    use proptest::prelude::*;
    use trellis_store::MemoryStore;

    fn mutator(store: Arc<MemoryStore>, clock: Arc<crate::ManualClock>) -> NetworkMutator<MemoryStore> {
        let registry = CodeRegistry::new(store, clock, RegistryConfig::default());
        NetworkMutator::new(Arc::new(registry))
    }

    fn downline(store: &MemoryStore, id: &str) -> u64 {
        store.get(&id.into()).unwrap().unwrap().downline
    }

    fn level(store: &MemoryStore, id: &str) -> u32 {
        store.get(&id.into()).unwrap().unwrap().level
    }

    #[test]
    fn attach_links_both_sides() {
        let (store, clock) = fixture();
        join(&store, "alice", clock.now());
        join(&store, "bob", clock.now());
        let m = mutator(store.clone(), clock);
        m.registry.issue(&"alice".into(), Some("ALICE")).unwrap();

        let report = m.attach("alice", &"bob".into()).unwrap();
        assert_eq!(report.referrer, ProviderId::from("alice"));
        assert_eq!(report.slot, 1);
        assert_eq!(report.ancestors_updated, 1);
        assert!(report.promotion.is_none());

        let alice = store.get(&"alice".into()).unwrap().unwrap();
        let bob = store.get(&"bob".into()).unwrap().unwrap();
        assert_eq!(alice.referred, vec![ProviderId::from("bob")]);
        assert_eq!(alice.downline, 1);
        assert_eq!(bob.referrer, Some(ProviderId::from("alice")));
    }

    #[test]
    fn attach_propagates_through_chain() {
        let (store, clock) = fixture();
        chain(&store, &["root", "mid", "leaf"], clock.now());
        join(&store, "new", clock.now());
        let m = mutator(store.clone(), clock);
        m.registry.issue(&"leaf".into(), Some("LEAF")).unwrap();

        let report = m.attach("LEAF", &"new".into()).unwrap();
        assert_eq!(report.ancestors_updated, 3);
        assert_eq!(downline(&store, "leaf"), 1);
        assert_eq!(downline(&store, "mid"), 2);
        assert_eq!(downline(&store, "root"), 3);
    }

    #[test]
    fn third_referral_promotes_owner() {
        let (store, clock) = fixture();
        for id in ["alice", "b", "c", "d"] {
            join(&store, id, clock.now());
        }
        let m = mutator(store.clone(), clock);
        m.registry.issue(&"alice".into(), Some("ALICE")).unwrap();

        assert!(m.attach("ALICE", &"b".into()).unwrap().promotion.is_none());
        assert!(m.attach("ALICE", &"c".into()).unwrap().promotion.is_none());
        assert_eq!(level(&store, "alice"), 0);

        let report = m.attach("ALICE", &"d".into()).unwrap();
        assert_eq!(report.slot, 3);
        assert_eq!(report.promotion, Some(Promotion::ReachedRoot));
        assert_eq!(level(&store, "alice"), 1);

        assert!(matches!(
            m.attach("ALICE", &"b".into()),
            Err(Error::LimitExceeded { used: 3, .. })
        ));
    }

    #[test]
    fn attach_rejects_self_and_relinking() {
        let (store, clock) = fixture();
        join(&store, "alice", clock.now());
        join(&store, "bob", clock.now());
        join(&store, "carol", clock.now());
        let m = mutator(store.clone(), clock);
        m.registry.issue(&"alice".into(), Some("ALICE")).unwrap();
        m.registry.issue(&"carol".into(), Some("CAROL")).unwrap();

        assert!(matches!(
            m.attach("ALICE", &"alice".into()),
            Err(Error::InvalidInput(_))
        ));
        m.attach("ALICE", &"bob".into()).unwrap();
        assert!(matches!(
            m.attach("CAROL", &"bob".into()),
            Err(Error::InvalidInput(_))
        ));
        assert!(store.get(&"carol".into()).unwrap().unwrap().referred.is_empty());
    }

    #[test]
    fn attach_unknown_provider_writes_nothing() {
        let (store, clock) = fixture();
        join(&store, "alice", clock.now());
        let m = mutator(store.clone(), clock);
        m.registry.issue(&"alice".into(), Some("ALICE")).unwrap();

        assert!(matches!(
            m.attach("ALICE", &"ghost".into()),
            Err(Error::NotFound(_))
        ));
        assert!(store.get(&"alice".into()).unwrap().unwrap().referred.is_empty());
    }

    #[test]
    fn propagation_stops_after_hop_bound() {
        let (store, clock) = fixture();
        let ids: Vec<String> = (0..15).map(|i| format!("n{}", i)).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        chain(&store, &refs, clock.now());
        let m = mutator(store.clone(), clock);

        let hops = m.propagate_downline(&"n14".into(), 1).unwrap();
        assert_eq!(hops, MAX_ANCESTOR_HOPS);
        assert_eq!(downline(&store, "n14"), 0);
        assert_eq!(downline(&store, "n13"), 2);
        assert_eq!(downline(&store, "n4"), 11);
        assert_eq!(downline(&store, "n3"), 11);
    }

    #[test]
    fn promotion_settles_under_higher_referrer() {
        let (store, clock) = fixture();
        chain(&store, &["top", "mid", "low"], clock.now());
        store
            .update_fields(&"top".into(), &[FieldUpdate::Level(5)])
            .unwrap();
        let m = mutator(store.clone(), clock);

        assert_eq!(m.promote_level(&"low".into()).unwrap(), Promotion::Settled);
        assert_eq!(level(&store, "mid"), 1);
        assert_eq!(level(&store, "top"), 5);
    }

    #[test]
    fn promotion_climbs_equal_levels() {
        let (store, clock) = fixture();
        chain(&store, &["top", "mid", "low"], clock.now());
        let m = mutator(store.clone(), clock);

        assert_eq!(m.promote_level(&"low".into()).unwrap(), Promotion::ReachedRoot);
        assert_eq!(level(&store, "mid"), 1);
        assert_eq!(level(&store, "top"), 2);
    }

    #[test]
    fn promotion_respects_depth_guard() {
        let (store, clock) = fixture();
        chain(&store, &["a", "b", "c", "d"], clock.now());
        let m = mutator(store.clone(), clock);

        assert_eq!(
            m.promote_level_bounded(&"d".into(), 2).unwrap(),
            Promotion::DepthGuard
        );
        assert_eq!(level(&store, "c"), 1);
        assert_eq!(level(&store, "b"), 2);
        assert_eq!(level(&store, "a"), 0);
        assert_eq!(
            m.promote_level_bounded(&"d".into(), 0).unwrap(),
            Promotion::DepthGuard
        );
    }

    #[test]
    fn runaway_level_detaches_provider() {
        let (store, clock) = fixture();
        chain(&store, &["top", "bad", "kid"], clock.now());
        store
            .update_fields(
                &"bad".into(),
                &[FieldUpdate::Level(LEVEL_CEILING + 1), FieldUpdate::SetDownline(1)],
            )
            .unwrap();
        let m = mutator(store.clone(), clock);

        assert_eq!(
            m.promote_level(&"bad".into()).unwrap(),
            Promotion::Detached("bad".into())
        );
        let bad = store.get(&"bad".into()).unwrap().unwrap();
        assert_eq!(bad.level, 0);
        assert_eq!(bad.downline, 0);
        assert!(bad.referrer.is_none());
        assert!(bad.referred.is_empty());
    }

    #[test]
    fn interrupted_propagation_is_not_rolled_back() {
        let (store, clock) = fixture();
        chain(&store, &["a", "b", "c", "d"], clock.now());
        let flaky = Arc::new(FlakyStore::new(store.clone(), 2));
        let registry = CodeRegistry::new(flaky, clock, RegistryConfig::default());
        let m = NetworkMutator::new(Arc::new(registry));

        assert!(matches!(
            m.propagate_downline(&"d".into(), 1),
            Err(Error::Store(_))
        ));
        assert_eq!(downline(&store, "c"), 2);
        assert_eq!(downline(&store, "b"), 3);
        assert_eq!(downline(&store, "a"), 3);
    }

    #[test]
    fn failed_walk_keeps_the_link() {
        let (store, clock) = fixture();
        chain(&store, &["root", "alice"], clock.now());
        join(&store, "bob", clock.now());
        // issue + two link writes succeed, the first downline hop fails
        let flaky = Arc::new(FlakyStore::new(store.clone(), 3));
        let registry = CodeRegistry::new(flaky, clock, RegistryConfig::default());
        registry.issue(&"alice".into(), Some("ALICE")).unwrap();
        let m = NetworkMutator::new(Arc::new(registry));

        let report = m.attach("ALICE", &"bob".into()).unwrap();
        assert_eq!(report.referrer, ProviderId::from("alice"));
        assert_eq!(report.ancestors_updated, 0);
        assert!(report.aggregate_error.is_some());

        let alice = store.get(&"alice".into()).unwrap().unwrap();
        let bob = store.get(&"bob".into()).unwrap().unwrap();
        assert_eq!(alice.referred, vec![ProviderId::from("bob")]);
        assert_eq!(alice.downline, 0);
        assert_eq!(bob.referrer, Some(ProviderId::from("alice")));
    }

    proptest! {
        #[test]
        fn propagate_then_revert_restores_downlines(len in 1usize..16, start in 0u64..5) {
            let (store, clock) = fixture();
            let ids: Vec<String> = (0..len).map(|i| format!("p{}", i)).collect();
            let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
            chain(&store, &refs, clock.now());
            for id in &refs {
                store.update_fields(&(*id).into(), &[FieldUpdate::SetDownline(start)]).unwrap();
            }
            let m = mutator(store.clone(), clock);
            let leaf = ProviderId::new(ids[len - 1].clone());

            let before: Vec<u64> = refs.iter().map(|id| downline(&store, id)).collect();
            let up = m.propagate_downline(&leaf, 1).unwrap();
            let down = m.propagate_downline(&leaf, -1).unwrap();
            let after: Vec<u64> = refs.iter().map(|id| downline(&store, id)).collect();

            prop_assert_eq!(up, down);
            prop_assert_eq!(up, (len - 1).min(MAX_ANCESTOR_HOPS));
            prop_assert_eq!(before, after);
        }
    }
}
