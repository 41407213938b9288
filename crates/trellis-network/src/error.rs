//! Error types for the referral engine.

use thiserror::Error;
use trellis_store::StoreError;

/// Result type for referral engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in referral engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Referral code or provider absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Owner's referral window has elapsed
    #[error("Referral code {code} expired ({age_days} days since owner joined)")]
    Expired { code: String, age_days: i64 },

    /// Owner has used every referral slot
    #[error("Referral code {code} has reached its limit ({used} referrals)")]
    LimitExceeded { code: String, used: usize },

    /// Custom code already held by some provider
    #[error("Referral code already taken: {0}")]
    CodeTaken(String),

    /// Random generation kept colliding
    #[error("Could not generate a unique referral code after {attempts} attempts")]
    GenerationExhausted { attempts: usize },

    /// Malformed request (bad custom code, self-referral, already linked provider)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persistence layer failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Stable machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Expired { .. } => "expired",
            Error::LimitExceeded { .. } => "limit_exceeded",
            Error::CodeTaken(_) => "code_taken",
            Error::GenerationExhausted { .. } => "generation_exhausted",
            Error::InvalidInput(_) => "invalid_input",
            Error::Store(_) => "store_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct() {
        let errors = [
            Error::NotFound("x".into()),
            Error::Expired { code: "A".into(), age_days: 36 },
            Error::LimitExceeded { code: "A".into(), used: 3 },
            Error::CodeTaken("A".into()),
            Error::GenerationExhausted { attempts: 6 },
            Error::InvalidInput("bad".into()),
            Error::Store(StoreError::Storage("down".into())),
        ];
        let mut kinds: Vec<_> = errors.iter().map(Error::kind).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn store_errors_stay_opaque() {
        let err: Error = StoreError::Storage("disk full".into()).into();
        assert_eq!(err.to_string(), "Storage error: disk full");
    }
}
