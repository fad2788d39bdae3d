//! Rate limiter errors.
//!
//! A rejection is not an error: it is a [`RateLimitDecision`](crate::RateLimitDecision)
//! with `allowed == false`. Errors here mean the limiter could not decide.

use octofhir_kv::KvError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    /// The store failed; the limiter could not decide.
    #[error("Rate limiter store error: {0}")]
    Store(#[from] KvError),

    /// A cost of zero, or one larger than the bucket can ever hold.
    #[error("Invalid cost {cost}: must be between 1 and {max}")]
    InvalidCost {
        /// Requested cost
        cost: u64,
        /// Largest admissible cost
        max: u64,
    },

    /// Limiter parameters are unusable.
    #[error("Invalid rate limit configuration: {message}")]
    Config {
        /// What is wrong
        message: String,
    },
}

impl RateLimitError {
    #[must_use]
    pub fn invalid_cost(cost: u64, max: u64) -> Self {
        Self::InvalidCost { cost, max }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True when the limiter's store failed, as opposed to bad input.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_distinguished() {
        assert!(RateLimitError::from(KvError::unavailable("down")).is_store());
        assert!(!RateLimitError::invalid_cost(0, 10).is_store());
        assert!(!RateLimitError::config("bad").is_store());
    }

    #[test]
    fn test_invalid_cost_message() {
        let err = RateLimitError::invalid_cost(11, 10);
        assert_eq!(err.to_string(), "Invalid cost 11: must be between 1 and 10");
    }
}
