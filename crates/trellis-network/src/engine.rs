//! Engine facade over one shared store.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::mutator::{AttachReport, NetworkMutator, Promotion};
use crate::reader::{NetworkNode, NetworkReader, ReaderLimits};
use crate::reconcile::{Reconciler, Recount};
use crate::registry::{CodeOwner, CodeRegistry, IssuedCode, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trellis_store::{ProviderId, ProviderNode, ProviderStore};

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub registry: RegistryConfig,
    pub limits: ReaderLimits,
}

/// A provider signing up.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProvider {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<ProviderId>,
    pub name: String,
    #[serde(default)]
    pub title: String,
}

/// What happened to the referral part of a registration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReferralOutcome {
    /// No code was supplied
    NotRequested,
    /// Linked under `referrer`. `aggregate_error` is set when the cached
    /// counts could not be fully updated.
    Applied {
        referrer: ProviderId,
        promotion: Option<Promotion>,
        #[serde(skip_serializing_if = "Option::is_none")]
        aggregate_error: Option<String>,
    },
    /// Code was supplied but the link was not made
    NotApplied { kind: String, reason: String },
}

/// Result of a registration. Registration succeeds whatever the referral outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub provider: ProviderNode,
    pub referral: ReferralOutcome,
}

/// Code registry, mutator, reader and reconciler sharing one store.
pub struct ReferralEngine<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    registry: Arc<CodeRegistry<S>>,
    mutator: NetworkMutator<S>,
    reader: NetworkReader<S>,
    reconciler: Reconciler<S>,
}

impl<S: ProviderStore + ?Sized> ReferralEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let registry = CodeRegistry::new(store, clock, config.registry);
        Self::from_registry(registry, config.limits)
    }

    /// Build around an already configured registry (e.g. a custom code source).
    pub fn from_registry(registry: CodeRegistry<S>, limits: ReaderLimits) -> Self {
        let store = registry.store();
        let clock = registry.clock();
        let registry = Arc::new(registry);
        Self {
            mutator: NetworkMutator::new(Arc::clone(&registry)),
            reader: NetworkReader::new(Arc::clone(&store), limits),
            reconciler: Reconciler::new(Arc::clone(&store)),
            registry,
            store,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn provider(&self, id: &ProviderId) -> Result<ProviderNode> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("provider {}", id)))
    }

    pub fn validate(&self, code: &str) -> Result<CodeOwner> {
        self.registry.validate(code)
    }

    pub fn issue(&self, owner: &ProviderId, custom_code: Option<&str>) -> Result<IssuedCode> {
        self.registry.issue(owner, custom_code)
    }

    pub fn revoke(&self, code: &str) -> Result<ProviderId> {
        self.registry.revoke(code)
    }

    pub fn attach(&self, code: &str, provider: &ProviderId) -> Result<AttachReport> {
        self.mutator.attach(code, provider)
    }

    pub fn fetch_subtree(&self, root: &ProviderId, depth: usize) -> Result<Vec<NetworkNode>> {
        self.reader.fetch_subtree(root, depth)
    }

    pub fn fetch_network(&self, root: &ProviderId, max_depth: usize) -> Result<Vec<NetworkNode>> {
        self.reader.fetch_network(root, max_depth)
    }

    pub fn recompute(&self, id: &ProviderId) -> Result<Recount> {
        self.reconciler.recompute(id)
    }

    /// Create a provider, then try to apply `referral_code`.
    ///
    /// Only the insert can fail the registration. A rejected or failed referral
    /// is reported in [`Registration::referral`].
    pub fn register(&self, new: NewProvider, referral_code: Option<&str>) -> Result<Registration> {
        let id = new
            .id
            .filter(ProviderId::is_valid)
            .unwrap_or_else(|| ProviderId::new(uuid::Uuid::new_v4().to_string()));
        let node = ProviderNode::new(id.clone(), new.name, new.title, self.clock.now());
        self.store.insert(&node)?;
        tracing::info!(provider = %id, "Registered provider");

        let referral = match referral_code.map(str::trim).filter(|c| !c.is_empty()) {
            None => ReferralOutcome::NotRequested,
            Some(code) => match self.mutator.attach(code, &id) {
                Ok(report) => ReferralOutcome::Applied {
                    referrer: report.referrer,
                    promotion: report.promotion,
                    aggregate_error: report.aggregate_error,
                },
                Err(e) => {
                    tracing::info!(provider = %id, code, error = %e, "Referral not applied");
                    ReferralOutcome::NotApplied {
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    }
                }
            },
        };

        let provider = self.store.get(&id)?.unwrap_or(node);
        Ok(Registration { provider, referral })
    }
}
