//! # Stakepool Economics - Reward Schedule & Staking Ledger
//!
//! Participants lock an LP token and earn a share of a fixed reward pool
//! that matures over a three-phase schedule.
//!
//! ## Key Features
//!
//! - **Blackout**: nothing is claimable during the 7-day staking window
//! - **Quadratic ramp**: the reward ratio grows as `e²/D²` until expiration
//! - **Linear penalty**: early withdrawals forfeit a share decaying over 113 days
//! - **Conservation**: payouts plus the leftover sweep never exceed the funded pool
//!
//! ## Payout Example
//!
//! | Pool | Stake | Withdraw at | Reward ratio | Penalty | Reward |
//! |------|-------|-------------|--------------|---------|--------|
//! | 1000 | 250 of 250 | day 60 | (53/193)² ≈ 0.0754 | ≈ 0.531 | 35 |
//! | 1000 | 250 of 250 | day 200 (expiry) | 1 | 0 | 1000 |

pub mod events;
pub mod ledger;
pub mod pool;
pub mod schedule;
pub mod token;

// Re-exports
pub use events::{LedgerEvent, LedgerEventKind};
pub use ledger::{
    prorated_reward, LedgerSnapshot, ParticipantAccount, PoolConfiguration, RewardProjection,
    StakeReceipt, StakingLedger, UnstakeReceipt, EVENT_LOG_CAPACITY,
};
pub use pool::{PoolRegistry, SharedPool};
pub use schedule::{RewardRatios, RewardSchedule, SchedulePhase};
pub use token::{FungibleAsset, InMemoryToken, TransferBatch};
