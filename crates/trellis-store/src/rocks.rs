//! Persistent storage using RocksDB.
//!
//! Layout:
//! - `provider:{id}` -> JSON-encoded [`ProviderNode`]
//! - `code:{CODE}` -> owning provider id

use crate::error::{Result, StoreError};
use crate::model::{FieldUpdate, ProviderId, ProviderNode};
use crate::store::ProviderStore;
use rocksdb::{Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Mutex;

/// RocksDB-backed provider store.
pub struct RocksStore {
    db: DB,
    /// Serializes read-modify-write cycles so each update lands atomically.
    write_lock: Mutex<()>,
}

fn provider_key(id: &ProviderId) -> String {
    format!("provider:{}", id)
}

fn code_key(code: &str) -> String {
    format!("code:{}", code)
}

impl RocksStore {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Storage("write lock poisoned".into()))
    }
}

impl ProviderStore for RocksStore {
    fn get(&self, id: &ProviderId) -> Result<Option<ProviderNode>> {
        match self.db.get(provider_key(id).as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn get_by_code(&self, code: &str) -> Result<Option<ProviderNode>> {
        match self.db.get(code_key(code).as_bytes())? {
            Some(owner) => {
                let id = ProviderId(String::from_utf8_lossy(&owner).into_owned());
                self.get(&id)
            }
            None => Ok(None),
        }
    }

    fn get_many(&self, ids: &[ProviderId]) -> Result<Vec<ProviderNode>> {
        let keys: Vec<String> = ids.iter().map(provider_key).collect();
        let mut nodes = Vec::with_capacity(ids.len());
        for value in self.db.multi_get(keys.iter().map(|k| k.as_bytes())) {
            if let Some(data) = value? {
                nodes.push(serde_json::from_slice(&data)?);
            }
        }
        Ok(nodes)
    }

    fn update_fields(&self, id: &ProviderId, updates: &[FieldUpdate]) -> Result<()> {
        let _guard = self.lock()?;

        let mut node = self
            .get(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let old_code = node.referral_code.clone();
        for update in updates {
            node.apply(update);
        }

        let mut batch = WriteBatch::default();
        batch.put(provider_key(id).as_bytes(), serde_json::to_vec(&node)?);
        if node.referral_code != old_code {
            if let Some(old) = &old_code {
                let indexed = self.db.get(code_key(old).as_bytes())?;
                if indexed.as_deref() == Some(id.as_str().as_bytes()) {
                    batch.delete(code_key(old).as_bytes());
                }
            }
            if let Some(new) = &node.referral_code {
                batch.put(code_key(new).as_bytes(), id.as_str().as_bytes());
            }
        }
        self.db.write(batch)?;

        tracing::trace!(provider = %id, fields = updates.len(), "Updated provider");
        Ok(())
    }

    fn insert(&self, node: &ProviderNode) -> Result<()> {
        let _guard = self.lock()?;

        let key = provider_key(&node.id);
        if self.db.get(key.as_bytes())?.is_some() {
            return Err(StoreError::AlreadyExists(node.id.to_string()));
        }

        let mut batch = WriteBatch::default();
        batch.put(key.as_bytes(), serde_json::to_vec(node)?);
        if let Some(code) = &node.referral_code {
            batch.put(code_key(code).as_bytes(), node.id.as_str().as_bytes());
        }
        self.db.write(batch)?;
        Ok(())
    }
}
