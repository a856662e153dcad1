use std::time::Duration;

/// Broker-level error taxonomy. The transition layer and persistence
/// boundary return these; the presentation layer translates them into
/// user-facing messages. Pure scorers never produce them.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// Malformed input from the initiating actor (empty offer, bad
    /// quantity, unresolvable item name).
    Validation(String),
    /// The acting party is not allowed to drive this transition.
    Unauthorized(String),
    /// The trade/auction is no longer in a state that admits this action.
    StateConflict(String),
    /// Throttled; carries how long the caller should wait. Surfaced as a
    /// wait message, never as a failure.
    RateLimited { retry_after: Duration },
    /// Catalog or persistence dependency failed; retryable from outside.
    External(String),
    /// A programming defect surfaced at runtime (hash mismatch, score out
    /// of range). Logged loudly, fails the operation.
    Invariant(String),
    NotFound(String),
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::Validation(msg) => write!(f, "invalid request: {}", msg),
            BrokerError::Unauthorized(msg) => write!(f, "not allowed: {}", msg),
            BrokerError::StateConflict(msg) => {
                write!(f, "no longer in a valid state for this action: {}", msg)
            }
            BrokerError::RateLimited { retry_after } => {
                write!(f, "rate limited, retry in {}s", retry_after.as_secs())
            }
            BrokerError::External(msg) => write!(f, "upstream failure: {}", msg),
            BrokerError::Invariant(msg) => write!(f, "internal invariant violated: {}", msg),
            BrokerError::NotFound(msg) => write!(f, "not found: {}", msg),
        }
    }
}

impl std::error::Error for BrokerError {}

pub type BrokerResult<T> = Result<T, BrokerError>;
