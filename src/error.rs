//! Aggregation error taxonomy
//!
//! Every aggregation entry point is all-or-nothing: the first
//! non-recoverable error aborts the whole call and propagates to the caller
//! verbatim. The single exception is per-event tolerance inside the event
//! fold, which drops unrecognized or malformed individual log entries
//! instead of failing the ledger (see `events::fold`).

use crate::contracts::ProviderError;
use crate::quantity::QuantityError;
use std::fmt;

#[derive(Debug)]
pub enum AggregatorError {
    /// A raw numeric field from a contract read could not be parsed as a
    /// non-negative base-unit integer.
    MalformedQuantity(String),
    /// A subtraction invariant was violated (withdrawn exceeded winnings).
    /// This means the chain state and the folded ledger disagree; it is
    /// never clamped to zero.
    Underflow,
    /// The chain-access provider failed or rejected a call. No automatic
    /// retry; retry policy belongs to the caller.
    Provider(ProviderError),
    /// Aggregation was invoked with an empty caller-address list.
    NoAccounts,
}

impl fmt::Display for AggregatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregatorError::MalformedQuantity(field) => {
                write!(f, "Malformed quantity: {}", field)
            }
            AggregatorError::Underflow => {
                write!(f, "Amount underflow: withdrawn exceeds winnings")
            }
            AggregatorError::Provider(e) => write!(f, "Provider error: {}", e),
            AggregatorError::NoAccounts => write!(f, "No accounts supplied"),
        }
    }
}

impl std::error::Error for AggregatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AggregatorError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for AggregatorError {
    fn from(err: ProviderError) -> Self {
        AggregatorError::Provider(err)
    }
}

impl From<QuantityError> for AggregatorError {
    fn from(err: QuantityError) -> Self {
        match err {
            QuantityError::Malformed(raw) => AggregatorError::MalformedQuantity(raw),
            QuantityError::Underflow => AggregatorError::Underflow,
        }
    }
}
