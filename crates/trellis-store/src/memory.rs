//! In-memory store.

use crate::error::{Result, StoreError};
use crate::model::{FieldUpdate, ProviderId, ProviderNode};
use crate::store::ProviderStore;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<ProviderId, ProviderNode>,
    /// Referral code -> owning provider
    codes: HashMap<String, ProviderId>,
}

/// Provider store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Storage("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Storage("memory store lock poisoned".into()))
    }
}

impl ProviderStore for MemoryStore {
    fn get(&self, id: &ProviderId) -> Result<Option<ProviderNode>> {
        Ok(self.read()?.nodes.get(id).cloned())
    }

    fn get_by_code(&self, code: &str) -> Result<Option<ProviderNode>> {
        let inner = self.read()?;
        Ok(inner
            .codes
            .get(code)
            .and_then(|id| inner.nodes.get(id))
            .cloned())
    }

    fn get_many(&self, ids: &[ProviderId]) -> Result<Vec<ProviderNode>> {
        let inner = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.nodes.get(id).cloned())
            .collect())
    }

    fn update_fields(&self, id: &ProviderId, updates: &[FieldUpdate]) -> Result<()> {
        let mut inner = self.write()?;
        let Inner { nodes, codes } = &mut *inner;
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let old_code = node.referral_code.clone();
        for update in updates {
            node.apply(update);
        }

        if node.referral_code != old_code {
            // Only drop the index entry if it still names this provider
            if let Some(old) = old_code {
                if codes.get(&old) == Some(id) {
                    codes.remove(&old);
                }
            }
            if let Some(new) = &node.referral_code {
                codes.insert(new.clone(), id.clone());
            }
        }
        Ok(())
    }

    fn insert(&self, node: &ProviderNode) -> Result<()> {
        let mut inner = self.write()?;
        if inner.nodes.contains_key(&node.id) {
            return Err(StoreError::AlreadyExists(node.id.to_string()));
        }
        if let Some(code) = &node.referral_code {
            inner.codes.insert(code.clone(), node.id.clone());
        }
        inner.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }
}
