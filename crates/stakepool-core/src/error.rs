//! Error types for staking pool operations

use crate::types::{Address, Amount, PoolId, Timestamp};
use thiserror::Error;

/// Result type alias for staking pool operations
pub type Result<T> = std::result::Result<T, StakingError>;

/// Rejection reported by a fungible asset collaborator.
///
/// A rejected transfer never moves any balance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient balance for {holder}: have {available}, need {requested}")]
    InsufficientBalance {
        holder: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("insufficient allowance from {owner} to {spender}: have {available}, need {requested}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("account {0} is frozen")]
    Frozen(Address),

    #[error("balance overflow crediting {0}")]
    Overflow(Address),
}

/// Errors that can occur in staking pool operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    // === Lifecycle ===
    /// Caller is not the pool owner
    #[error("Unauthorized: {caller} is not the pool owner")]
    Unauthorized { caller: Address },

    /// `initialize` was already called
    #[error("Pool already initialized")]
    AlreadyInitialized,

    /// Reward ramp denominator would be zero or negative
    #[error("Degenerate configuration: {0}")]
    DegenerateConfiguration(String),

    /// Static configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // === Staking ===
    /// Stake attempted before the window opened or after it closed
    #[error("Staking ended or not started (now {now})")]
    StakingWindowClosed { now: Timestamp },

    /// Sponsor, beneficiary or participant is the pool's own holding account
    #[error("Invalid participant: {0} is the pool's holding account")]
    InvalidParticipant(Address),

    /// Unstake amount exceeds the participant's stake
    #[error("Insufficient stake: requested {requested}, staked {available}")]
    InsufficientStake { requested: Amount, available: Amount },

    /// Leftover sweep attempted before pool expiration
    #[error("Too early: pool expires at {expiration}, now {now}")]
    TooEarly { now: Timestamp, expiration: Timestamp },

    // === Collaborators ===
    /// External asset rejected a debit or credit
    #[error("Transfer of token {token} failed: {source}")]
    TransferFailed {
        token: Address,
        #[source]
        source: TransferError,
    },

    // === Registry & Persistence ===
    #[error("Pool not found: {0}")]
    PoolNotFound(PoolId),

    #[error("Pool already exists: {0}")]
    PoolExists(PoolId),

    /// Restored state violates ledger invariants
    #[error("Inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StakingError {
    /// Stable numeric code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::Unauthorized { .. } => 2001,
            Self::AlreadyInitialized => 2002,
            Self::StakingWindowClosed { .. } => 2003,
            Self::InsufficientStake { .. } => 2004,
            Self::TooEarly { .. } => 2005,
            Self::TransferFailed { .. } => 2006,
            Self::DegenerateConfiguration(_) => 2007,
            Self::InvalidConfiguration(_) => 2008,
            Self::PoolNotFound(_) | Self::PoolExists(_) => 2009,
            Self::InconsistentSnapshot(_) | Self::Storage(_) => 2010,
            Self::InvalidParticipant(_) => 2011,
        }
    }

    /// Whether resubmitting the same call later can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TooEarly { .. } | Self::TransferFailed { .. } | Self::Storage(_)
        )
    }
}
