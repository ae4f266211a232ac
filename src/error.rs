use std::path::PathBuf;

use thiserror::Error;

use crate::{Address, Amount};

/// Reasons a `fund`, `withdraw` or funder lookup call is rejected.
///
/// Every variant aborts the whole call; no state from a rejected call is kept.
#[derive(Debug, Error)]
pub enum FundError {
    /// Zero-value contribution.
    #[error("contribution must carry a non-zero amount")]
    InvalidAmount,

    /// Contribution priced below the minimum reference value.
    #[error("not sufficient amount: worth {reference_value}, minimum is {minimum}")]
    InsufficientAmount {
        reference_value: Amount,
        minimum: Amount,
    },

    /// The price feed could not produce a usable reading.
    #[error("price unavailable: {0}")]
    PriceUnavailable(#[from] OracleError),

    #[error("caller {caller} is not the owner")]
    NotAuthorized { caller: Address },

    #[error("transfer of {amount} to {to} failed: {reason}")]
    TransferFailed {
        to: Address,
        amount: Amount,
        reason: String,
    },

    #[error("funder index {index} out of range (funders: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("custody balance overflow")]
    BalanceOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("price feed unreachable: {0}")]
    Unreachable(String),

    #[error("price feed returned non-positive answer {0}")]
    NonPositiveAnswer(i128),

    #[error("price feed round was never updated")]
    NeverUpdated,

    #[error("price is stale: updated at {updated_at}, now {now}, max age {max_age}s")]
    Stale {
        updated_at: u64,
        now: u64,
        max_age: u64,
    },

    #[error("round {round_id} incomplete (answered in round {answered_in_round})")]
    IncompleteRound {
        round_id: u64,
        answered_in_round: u64,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
