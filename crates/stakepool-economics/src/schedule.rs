//! # Reward Schedule
//!
//! Pure function of time yielding the `(reward, penalty)` ratio pair.
//!
//! ## Phases
//!
//! ```text
//! Staking   [start, start+7d)        reward 0          penalty 100%
//! Penalty   [start+7d, start+127d)   reward e²/D²      penalty 1 - e/113d (floored at 0)
//! Accrual   [start+127d, expiration) reward e²/D²      penalty 0
//! Expired   [expiration, ∞)          reward 100%       penalty 0
//!
//! e = now - start - 7d,  D = expiration - start - 7d
//! ```
//!
//! The linear penalty reaches zero at `start+120d`, seven days before the
//! penalty window formally closes; from there the ratio stays at zero.

use serde::{Deserialize, Serialize};
use stakepool_core::prelude::*;

/// Reward/penalty pair evaluated at one instant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRatios {
    /// Matured fraction of the theoretical full reward
    pub reward: Ratio,
    /// Fraction of the matured reward forfeited on withdrawal
    pub penalty: Ratio,
}

impl RewardRatios {
    /// Ratios before the pool starts paying anything
    pub const BLACKOUT: Self = Self {
        reward: Ratio::ZERO,
        penalty: Ratio::ONE,
    };

    /// Ratios once the pool has fully matured
    pub const MATURED: Self = Self {
        reward: Ratio::ONE,
        penalty: Ratio::ZERO,
    };

    /// Whether an unstake at these ratios pays nothing regardless of stake
    pub fn pays_nothing(&self) -> bool {
        self.reward.is_zero() || self.penalty.is_one()
    }
}

impl Default for RewardRatios {
    fn default() -> Self {
        Self::BLACKOUT
    }
}

/// Phase of the pool timeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePhase {
    /// Before the staking window opens
    NotStarted,
    /// Deposits accepted; no reward claimable
    Staking,
    /// Reward ramping, penalty decaying
    Penalty,
    /// Reward ramping, no penalty
    Accrual,
    /// Reward saturated at 100%
    Expired,
}

impl SchedulePhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Staking => "staking",
            Self::Penalty => "penalty",
            Self::Accrual => "accrual",
            Self::Expired => "expired",
        }
    }
}

/// Fixed timeline of a pool, established once at initialization
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    pub staking_window_start: Timestamp,
    pub staking_window_end: Timestamp,
    pub penalty_window_end: Timestamp,
    pub pool_expiration: Timestamp,
}

impl RewardSchedule {
    /// Build the timeline for a pool starting at `start`.
    ///
    /// Rejects expirations that leave no room for the reward ramp
    /// (`expiration - start <= 7 days`).
    pub fn new(start: Timestamp, pool_expiration: Timestamp) -> Result<Self> {
        let staking_window_end = start
            .checked_add(STAKING_PERIOD_SECS)
            .ok_or_else(|| StakingError::InvalidConfiguration(format!("start {start} out of range")))?;
        let penalty_window_end = staking_window_end
            .checked_add(PENALTY_PERIOD_SECS)
            .ok_or_else(|| StakingError::InvalidConfiguration(format!("start {start} out of range")))?;

        if pool_expiration <= staking_window_end {
            return Err(StakingError::DegenerateConfiguration(format!(
                "pool expiration {pool_expiration} must be later than staking window end {staking_window_end}"
            )));
        }

        Ok(Self {
            staking_window_start: start,
            staking_window_end,
            penalty_window_end,
            pool_expiration,
        })
    }

    /// Reward-ramp denominator `D = expiration - start - 7d` (always positive)
    fn ramp_span(&self) -> u64 {
        (self.pool_expiration - self.staking_window_end) as u64
    }

    /// Seconds elapsed since the staking window closed
    fn elapsed_since_window(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.staking_window_end).max(0) as u64
    }

    /// Quadratic reward ratio at `now`
    pub fn reward_ratio(&self, now: Timestamp) -> Ratio {
        if now < self.staking_window_end {
            return Ratio::ZERO;
        }
        if now >= self.pool_expiration {
            return Ratio::ONE;
        }
        Ratio::from_fraction_squared(self.elapsed_since_window(now), self.ramp_span())
    }

    /// Linearly decaying penalty ratio at `now`
    pub fn penalty_ratio(&self, now: Timestamp) -> Ratio {
        if now < self.staking_window_end {
            return Ratio::ONE;
        }
        if now >= self.penalty_window_end {
            return Ratio::ZERO;
        }
        let elapsed = self.elapsed_since_window(now) as u128;
        // from_fraction saturates at ONE once the decay span is used up
        Ratio::from_fraction(elapsed, PENALTY_DECAY_SECS as u128).complement()
    }

    pub fn ratios(&self, now: Timestamp) -> RewardRatios {
        RewardRatios {
            reward: self.reward_ratio(now),
            penalty: self.penalty_ratio(now),
        }
    }

    /// Stake is accepted in `[start, start + 7d)`
    pub fn is_staking_allowed(&self, now: Timestamp) -> bool {
        self.staking_window_start <= now && now < self.staking_window_end
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.pool_expiration
    }

    pub fn phase(&self, now: Timestamp) -> SchedulePhase {
        if now < self.staking_window_start {
            SchedulePhase::NotStarted
        } else if now < self.staking_window_end {
            SchedulePhase::Staking
        } else if now >= self.pool_expiration {
            SchedulePhase::Expired
        } else if now < self.penalty_window_end {
            SchedulePhase::Penalty
        } else {
            SchedulePhase::Accrual
        }
    }
}
