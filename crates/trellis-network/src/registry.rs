//! Referral code registry.
//!
//! A referral code is not a separate record. It is the `referral_code` field
//! of its owner plus a uniqueness rule across every provider. A code is usable
//! while:
//!
//! - some provider holds it,
//! - that owner has used fewer than [`MAX_REFERRALS`] slots,
//! - fewer than [`CODE_VALIDITY_DAYS`] days have passed since the **owner**
//!   joined. The clock is the owner's, not the code's: re-issuing does not
//!   extend the window.
//!
//! Uniqueness is checked before writing rather than enforced by the store, so
//! a taken custom code is reported before anything changes.

use crate::clock::Clock;
use crate::error::{Error, Result};
use chrono::Duration;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use trellis_store::{FieldUpdate, ProviderId, ProviderStore};

/// Length of generated codes.
pub const CODE_LENGTH: usize = 6;

/// Characters generated codes are drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Referral slots per provider.
pub const MAX_REFERRALS: usize = 3;

/// Days after the owner joined during which its code can be used.
pub const CODE_VALIDITY_DAYS: i64 = 35;

/// Extra attempts after the first generated code collides.
pub const MAX_CODE_RETRIES: usize = 5;

/// Produces candidate referral codes.
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

/// Uniform random codes over [`CODE_ALPHABET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL that shareable links are built on
    pub link_base: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            link_base: "http://localhost:3000".to_string(),
        }
    }
}

/// Successful validation: who owns the code and whom they referred so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeOwner {
    pub owner_id: ProviderId,
    pub owner_name: String,
    pub referred_so_far: Vec<ProviderId>,
}

/// A freshly issued code and its shareable link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCode {
    pub code: String,
    pub link: String,
}

/// Issues, validates and revokes referral codes.
pub struct CodeRegistry<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    codes: Box<dyn CodeSource>,
    config: RegistryConfig,
}

/// Canonical form of a code as typed by a user.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

impl<S: ProviderStore + ?Sized> CodeRegistry<S> {
    /// Create a registry drawing random codes.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: RegistryConfig) -> Self {
        Self {
            store,
            clock,
            codes: Box::new(RandomCodes),
            config,
        }
    }

    /// Replace the code generator.
    pub fn with_code_source(mut self, codes: impl CodeSource + 'static) -> Self {
        self.codes = Box::new(codes);
        self
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Check that `code` can take another referral.
    ///
    /// Checks run in order: the code exists, the owner's window is open, the
    /// owner has a free slot.
    pub fn validate(&self, code: &str) -> Result<CodeOwner> {
        let code = normalize_code(code);
        let owner = self
            .store
            .get_by_code(&code)?
            .ok_or_else(|| Error::NotFound(format!("referral code {}", code)))?;

        let age = self.clock.now() - owner.created_at;
        if age > Duration::days(CODE_VALIDITY_DAYS) {
            return Err(Error::Expired {
                code,
                age_days: age.num_days(),
            });
        }

        if owner.referred.len() >= MAX_REFERRALS {
            return Err(Error::LimitExceeded {
                code,
                used: owner.referred.len(),
            });
        }

        Ok(CodeOwner {
            owner_id: owner.id,
            owner_name: owner.name,
            referred_so_far: owner.referred,
        })
    }

    /// Give `owner` a new active code, replacing any previous one.
    pub fn issue(&self, owner: &ProviderId, custom_code: Option<&str>) -> Result<IssuedCode> {
        if self.store.get(owner)?.is_none() {
            return Err(Error::NotFound(format!("provider {}", owner)));
        }

        let code = match custom_code {
            Some(custom) => self.claim_custom(custom)?,
            None => self.generate_unique()?,
        };

        self.store
            .update_fields(owner, &[FieldUpdate::ReferralCode(Some(code.clone()))])?;
        tracing::info!(provider = %owner, code = %code, "Issued referral code");

        Ok(IssuedCode {
            link: self.share_link(&code),
            code,
        })
    }

    /// Clear `code` from its owner. Links already made through it are kept.
    pub fn revoke(&self, code: &str) -> Result<ProviderId> {
        let code = normalize_code(code);
        let owner = self
            .store
            .get_by_code(&code)?
            .ok_or_else(|| Error::NotFound(format!("referral code {}", code)))?;

        self.store
            .update_fields(&owner.id, &[FieldUpdate::ReferralCode(None)])?;
        tracing::info!(provider = %owner.id, code = %code, "Revoked referral code");
        Ok(owner.id)
    }

    /// Shareable registration link embedding `code`.
    pub fn share_link(&self, code: &str) -> String {
        format!(
            "{}/register?ref={}",
            self.config.link_base.trim_end_matches('/'),
            code
        )
    }

    fn claim_custom(&self, custom: &str) -> Result<String> {
        let code = normalize_code(custom);
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(format!(
                "referral code must be letters and digits, got {:?}",
                custom
            )));
        }
        if self.store.get_by_code(&code)?.is_some() {
            return Err(Error::CodeTaken(code));
        }
        Ok(code)
    }

    fn generate_unique(&self) -> Result<String> {
        let attempts = MAX_CODE_RETRIES + 1;
        for attempt in 1..=attempts {
            let candidate = self.codes.next_code();
            if self.store.get_by_code(&candidate)?.is_none() {
                return Ok(candidate);
            }
            tracing::debug!(attempt, code = %candidate, "Generated referral code collided");
        }
        tracing::warn!(attempts, "Referral code generation exhausted");
        Err(Error::GenerationExhausted { attempts })
    }
}
