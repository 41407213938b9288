//! Provider record - one node of the referral tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a service provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids can be left behind by half-written records; traversals skip them.
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A service provider as seen by the referral network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderNode {
    /// Unique identifier
    pub id: ProviderId,

    /// Display name
    pub name: String,

    /// Professional title (e.g. "Plumber")
    #[serde(default)]
    pub title: String,

    /// Who referred this provider (absent for roots)
    #[serde(default)]
    pub referrer: Option<ProviderId>,

    /// Providers this one referred, in referral order
    #[serde(default)]
    pub referred: Vec<ProviderId>,

    /// Cached count of all transitive descendants. Best effort, see reconciliation.
    #[serde(default)]
    pub downline: u64,

    /// Promotion rank
    #[serde(default)]
    pub level: u32,

    /// Active referral code, if one is issued
    #[serde(default)]
    pub referral_code: Option<String>,

    /// Account creation time; also anchors referral code expiry
    pub created_at: DateTime<Utc>,
}

impl ProviderNode {
    /// Create a fresh root node with no referral links.
    pub fn new(id: ProviderId, name: String, title: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            title,
            referrer: None,
            referred: Vec::new(),
            downline: 0,
            level: 0,
            referral_code: None,
            created_at,
        }
    }

    /// Apply a single field update in place.
    pub fn apply(&mut self, update: &FieldUpdate) {
        match update {
            FieldUpdate::ReferralCode(code) => self.referral_code = code.clone(),
            FieldUpdate::Referrer(referrer) => self.referrer = referrer.clone(),
            FieldUpdate::AppendReferred(id) => self.referred.push(id.clone()),
            FieldUpdate::ClearReferred => self.referred.clear(),
            FieldUpdate::IncrementDownline(delta) => {
                self.downline = self.downline.saturating_add_signed(*delta)
            }
            FieldUpdate::SetDownline(value) => self.downline = *value,
            FieldUpdate::Level(level) => self.level = *level,
        }
    }
}

/// Partial update of a provider record.
///
/// A slice of these is applied atomically by [`crate::ProviderStore::update_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// Replace (or clear) the active referral code
    ReferralCode(Option<String>),
    /// Replace (or clear) the referrer link
    Referrer(Option<ProviderId>),
    /// Push onto the `referred` list
    AppendReferred(ProviderId),
    /// Empty the `referred` list
    ClearReferred,
    /// Add to `downline`, saturating at zero
    IncrementDownline(i64),
    /// Overwrite `downline`
    SetDownline(u64),
    /// Overwrite `level`
    Level(u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn node(id: &str) -> ProviderNode {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ProviderNode::new(id.into(), "Ada".into(), "Electrician".into(), created)
    }

    #[test]
    fn new_node_is_unlinked_root() {
        let n = node("a");
        assert!(n.referrer.is_none());
        assert!(n.referred.is_empty());
        assert_eq!(n.downline, 0);
        assert_eq!(n.level, 0);
        assert!(n.referral_code.is_none());
    }

    #[test]
    fn downline_increment_saturates_at_zero() {
        let mut n = node("a");
        n.apply(&FieldUpdate::IncrementDownline(2));
        assert_eq!(n.downline, 2);
        n.apply(&FieldUpdate::IncrementDownline(-5));
        assert_eq!(n.downline, 0);
    }

    #[test]
    fn append_preserves_referral_order() {
        let mut n = node("a");
        n.apply(&FieldUpdate::AppendReferred("b".into()));
        n.apply(&FieldUpdate::AppendReferred("c".into()));
        assert_eq!(n.referred, vec![ProviderId::from("b"), ProviderId::from("c")]);
        n.apply(&FieldUpdate::ClearReferred);
        assert!(n.referred.is_empty());
    }

    #[test]
    fn blank_ids_are_invalid() {
        assert!(ProviderId::from("p-1").is_valid());
        assert!(!ProviderId::from("").is_valid());
        assert!(!ProviderId::from("   ").is_valid());
    }

    #[test]
    fn serializes_camel_case() {
        let mut n = node("a");
        n.referral_code = Some("ABC123".into());
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["referralCode"], "ABC123");
        assert!(json.get("createdAt").is_some());
        let parsed: ProviderNode = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, n);
    }
}
