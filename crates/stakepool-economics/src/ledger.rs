//! # Staking Ledger
//!
//! Owns participant stakes and the pool's outstanding reward liability.
//!
//! ## Payout
//!
//! An unstake of `amount` pays
//!
//! ```text
//! reward = pool · amount · rewardRatio · (1 - penaltyRatio) / totalStaked
//! ```
//!
//! where `totalStaked` is the live aggregate read *before* the withdrawing
//! amount is removed. Payouts are therefore pro-rata to the capital still
//! staked at the moment of the call, and order-sensitive across participants.
//! Every payout is capped by the remaining pool, so the sum of all payouts and
//! the leftover sweep never exceeds the funded amount.
//!
//! All arguments carry `now` explicitly; a ledger method reads it once and
//! uses it for the whole operation.
//!
//! ## Events
//!
//! The event log is a process-local tail of at most [`EVENT_LOG_CAPACITY`]
//! entries. It is not part of [`LedgerSnapshot`]; a restored ledger starts
//! with an empty log and continues numbering at `next_sequence`.

use crate::events::{LedgerEvent, LedgerEventKind};
use crate::schedule::{RewardRatios, RewardSchedule};
use crate::token::{FungibleAsset, TransferBatch};
use serde::{Deserialize, Serialize};
use stakepool_core::fixed::mul_div;
use stakepool_core::prelude::*;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Most recent events kept in memory per ledger
pub const EVENT_LOG_CAPACITY: usize = 1024;

/// Immutable pool parameters fixed at deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfiguration {
    /// Asset participants lock (the LP token)
    pub staking_token: Address,

    /// Asset distributed as reward
    pub reward_token: Address,

    /// Identity allowed to initialize; receives the leftover sweep
    pub owner: Address,

    /// Account under which the ledger holds both assets
    pub ledger_address: Address,

    /// Reward committed to the pool in base units
    #[serde(with = "stakepool_core::amount_serde")]
    pub total_reward_pool: Amount,

    /// End of reward accrual
    pub pool_expiration: Timestamp,

    /// Delay between `initialize` and the opening of the staking window
    #[serde(default)]
    pub start_grace_secs: i64,
}

impl PoolConfiguration {
    pub fn new(
        staking_token: Address,
        reward_token: Address,
        owner: Address,
        ledger_address: Address,
        total_reward_pool: Amount,
        pool_expiration: Timestamp,
    ) -> Self {
        Self {
            staking_token,
            reward_token,
            owner,
            ledger_address,
            total_reward_pool,
            pool_expiration,
            start_grace_secs: 0,
        }
    }

    pub fn with_start_grace(mut self, secs: i64) -> Self {
        self.start_grace_secs = secs;
        self
    }

    /// Static checks that do not depend on the start time
    pub fn validate(&self) -> Result<()> {
        if self.staking_token == self.reward_token {
            return Err(StakingError::InvalidConfiguration(
                "staking and reward token must differ".into(),
            ));
        }
        if self.ledger_address == Address::ZERO {
            return Err(StakingError::InvalidConfiguration(
                "ledger address must not be zero".into(),
            ));
        }
        if self.ledger_address == self.owner {
            return Err(StakingError::InvalidConfiguration(
                "ledger address must differ from owner".into(),
            ));
        }
        if self.total_reward_pool == 0 {
            return Err(StakingError::InvalidConfiguration(
                "total reward pool must be positive".into(),
            ));
        }
        if self.start_grace_secs < 0 {
            return Err(StakingError::InvalidConfiguration(format!(
                "start grace must not be negative, got {}",
                self.start_grace_secs
            )));
        }
        Ok(())
    }
}

/// Per-participant record, created on first stake and never removed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAccount {
    /// Staking token currently locked
    pub staked_amount: Amount,

    /// Reward ratio at the most recent mutation (reporting only)
    pub last_reward_ratio: Ratio,

    /// Penalty ratio at the most recent mutation (reporting only)
    pub last_penalty_ratio: Ratio,

    /// Reward token paid out so far
    pub cumulative_reward_paid: Amount,

    /// Time of the most recent mutation
    pub last_updated: Timestamp,
}

impl ParticipantAccount {
    fn touch(&mut self, ratios: RewardRatios, now: Timestamp) {
        self.last_reward_ratio = ratios.reward;
        self.last_penalty_ratio = ratios.penalty;
        self.last_updated = now;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeReceipt {
    pub sponsor: Address,
    pub beneficiary: Address,
    pub amount: Amount,
    /// Beneficiary's stake after the call
    pub staked_amount: Amount,
    pub total_staked: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstakeReceipt {
    pub participant: Address,
    /// Staking token returned
    pub amount: Amount,
    /// Reward token paid
    pub reward: Amount,
    pub ratios: RewardRatios,
    /// Proration denominator used for the reward
    pub total_staked_before: Amount,
    pub total_staked: Amount,
}

/// Hypothetical full unstake evaluated without committing anything
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardProjection {
    pub timestamp: Timestamp,
    pub participant: Address,
    pub staked_amount: Amount,
    pub ratios: RewardRatios,
    pub reward: Amount,
}

/// Serializable image of a ledger, one record per pool plus one per participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub config: PoolConfiguration,
    pub schedule: Option<RewardSchedule>,
    pub accounts: BTreeMap<Address, ParticipantAccount>,
    pub total_staked: Amount,
    pub remaining_reward_pool: Amount,
    pub leftover_withdrawn: Amount,
    pub next_sequence: u64,
}

/// `floor(pool · amount · reward · (1 - penalty) / total_staked)`, never above `pool`.
///
/// Returns zero when nothing is staked or the ratios pay nothing.
pub fn prorated_reward(
    pool: Amount,
    amount: Amount,
    total_staked: Amount,
    ratios: RewardRatios,
) -> Amount {
    if amount == 0 || total_staked == 0 || ratios.pays_nothing() {
        return 0;
    }
    mul_div(
        [pool, amount, ratios.reward.raw(), ratios.penalty.complement().raw()],
        [WAD, WAD, total_staked],
    )
    .unwrap_or(pool)
    .min(pool)
}

/// Stateful accounting engine for one pool
#[derive(Debug)]
pub struct StakingLedger {
    config: PoolConfiguration,
    staking_token: Arc<dyn FungibleAsset>,
    reward_token: Arc<dyn FungibleAsset>,
    schedule: Option<RewardSchedule>,
    accounts: BTreeMap<Address, ParticipantAccount>,
    total_staked: Amount,
    remaining_reward_pool: Amount,
    leftover_withdrawn: Amount,
    events: VecDeque<LedgerEvent>,
    next_sequence: u64,
}

impl StakingLedger {
    /// Create an uninitialized ledger bound to its two assets
    pub fn new(
        config: PoolConfiguration,
        staking_token: Arc<dyn FungibleAsset>,
        reward_token: Arc<dyn FungibleAsset>,
    ) -> Result<Self> {
        config.validate()?;
        if staking_token.address() != config.staking_token {
            return Err(StakingError::InvalidConfiguration(format!(
                "staking asset {} does not match configured {}",
                staking_token.address(),
                config.staking_token
            )));
        }
        if reward_token.address() != config.reward_token {
            return Err(StakingError::InvalidConfiguration(format!(
                "reward asset {} does not match configured {}",
                reward_token.address(),
                config.reward_token
            )));
        }

        Ok(Self {
            config,
            staking_token,
            reward_token,
            schedule: None,
            accounts: BTreeMap::new(),
            total_staked: 0,
            remaining_reward_pool: 0,
            leftover_withdrawn: 0,
            events: VecDeque::new(),
            next_sequence: 0,
        })
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.config
    }

    pub fn schedule(&self) -> Option<&RewardSchedule> {
        self.schedule.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.schedule.is_some()
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Open the pool: fix the schedule and make sure the reward pool is funded.
    ///
    /// Any shortfall between the ledger's reward balance and the committed
    /// pool is pulled from the owner, which must have approved the ledger.
    pub fn initialize(&mut self, caller: Address, now: Timestamp) -> Result<RewardSchedule> {
        if caller != self.config.owner {
            tracing::warn!(%caller, "initialize rejected: not owner");
            return Err(StakingError::Unauthorized { caller });
        }
        if self.schedule.is_some() {
            return Err(StakingError::AlreadyInitialized);
        }

        let start = now.checked_add(self.config.start_grace_secs).ok_or_else(|| {
            StakingError::InvalidConfiguration(format!("start grace overflows at {now}"))
        })?;
        let schedule = RewardSchedule::new(start, self.config.pool_expiration)?;

        let ledger = self.config.ledger_address;
        let held = self.reward_token.balance_of(ledger);
        let shortfall = self.config.total_reward_pool.saturating_sub(held);
        if shortfall > 0 {
            self.reward_token
                .transfer_from(ledger, self.config.owner, ledger, shortfall)
                .map_err(|source| StakingError::TransferFailed {
                    token: self.config.reward_token,
                    source,
                })?;
        }

        self.schedule = Some(schedule);
        self.remaining_reward_pool = self.config.total_reward_pool;
        self.record(
            now,
            LedgerEventKind::Initialized {
                schedule,
                funded: shortfall,
            },
        );
        tracing::info!(
            start = schedule.staking_window_start,
            staking_end = schedule.staking_window_end,
            penalty_end = schedule.penalty_window_end,
            expiration = schedule.pool_expiration,
            pool = self.config.total_reward_pool,
            funded = shortfall,
            "staking pool initialized"
        );
        Ok(schedule)
    }

    /// Lock `amount` of the staking token for `participant`
    pub fn stake(&mut self, participant: Address, amount: Amount, now: Timestamp) -> Result<StakeReceipt> {
        self.stake_for(participant, participant, amount, now)
    }

    /// Lock `amount` debited from `sponsor` and credit it to `beneficiary`
    pub fn stake_for(
        &mut self,
        sponsor: Address,
        beneficiary: Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<StakeReceipt> {
        self.ensure_not_holding_account(sponsor)?;
        self.ensure_not_holding_account(beneficiary)?;
        if !self.is_staking_allowed(now) {
            tracing::warn!(%sponsor, %beneficiary, amount, now, "stake rejected: window closed");
            return Err(StakingError::StakingWindowClosed { now });
        }

        let ledger = self.config.ledger_address;
        let total_staked = self.total_staked.checked_add(amount).ok_or(StakingError::TransferFailed {
            token: self.config.staking_token,
            source: TransferError::Overflow(ledger),
        })?;

        if amount > 0 {
            self.staking_token
                .transfer_from(ledger, sponsor, ledger, amount)
                .map_err(|source| StakingError::TransferFailed {
                    token: self.config.staking_token,
                    source,
                })?;
        }

        let ratios = self.ratios_at(now);
        let account = self.accounts.entry(beneficiary).or_default();
        account.staked_amount += amount;
        account.touch(ratios, now);
        let staked_amount = account.staked_amount;
        self.total_staked = total_staked;

        self.record(
            now,
            LedgerEventKind::Staked {
                sponsor,
                beneficiary,
                amount,
                total_staked,
            },
        );
        tracing::info!(%sponsor, %beneficiary, amount, staked_amount, total_staked, "stake accepted");

        Ok(StakeReceipt {
            sponsor,
            beneficiary,
            amount,
            staked_amount,
            total_staked,
        })
    }

    /// Return `amount` of stake and pay the reward it has earned at `now`
    pub fn unstake(&mut self, participant: Address, amount: Amount, now: Timestamp) -> Result<UnstakeReceipt> {
        self.ensure_not_holding_account(participant)?;
        let available = self.total_staked_for(participant);
        if amount > available {
            tracing::warn!(%participant, amount, available, "unstake rejected: insufficient stake");
            return Err(StakingError::InsufficientStake {
                requested: amount,
                available,
            });
        }

        let ratios = self.ratios_at(now);
        let total_staked_before = self.total_staked;
        let reward = prorated_reward(self.config.total_reward_pool, amount, total_staked_before, ratios)
            .min(self.remaining_reward_pool);
        tracing::debug!(
            %participant,
            reward_ratio = %ratios.reward,
            penalty_ratio = %ratios.penalty,
            total_staked_before,
            reward,
            "unstake payout computed"
        );

        let ledger = self.config.ledger_address;
        let mut batch = TransferBatch::new();
        batch
            .push(&self.staking_token, ledger, participant, amount)
            .push(&self.reward_token, ledger, participant, reward);
        batch.execute()?;

        if let Some(account) = self.accounts.get_mut(&participant) {
            account.staked_amount -= amount;
            account.cumulative_reward_paid += reward;
            account.touch(ratios, now);
        }
        self.total_staked -= amount;
        self.remaining_reward_pool -= reward;
        let total_staked = self.total_staked;

        self.record(
            now,
            LedgerEventKind::Unstaked {
                participant,
                amount,
                reward,
                ratios,
                total_staked,
            },
        );
        tracing::info!(%participant, amount, reward, total_staked, "unstake settled");

        Ok(UnstakeReceipt {
            participant,
            amount,
            reward,
            ratios,
            total_staked_before,
            total_staked,
        })
    }

    /// Sweep the unclaimed reward to the owner once the pool has expired.
    ///
    /// Anyone may trigger the sweep; the funds always go to the owner. A
    /// second sweep moves nothing and succeeds.
    pub fn withdraw_leftover(&mut self, now: Timestamp) -> Result<Amount> {
        let expired = self.schedule.map(|s| s.is_expired(now)).unwrap_or(false);
        if !expired {
            return Err(StakingError::TooEarly {
                now,
                expiration: self.config.pool_expiration,
            });
        }

        let amount = self.remaining_reward_pool;
        if amount == 0 {
            tracing::debug!("leftover sweep found nothing to withdraw");
            return Ok(0);
        }

        let owner = self.config.owner;
        self.reward_token
            .transfer(self.config.ledger_address, owner, amount)
            .map_err(|source| StakingError::TransferFailed {
                token: self.config.reward_token,
                source,
            })?;

        self.remaining_reward_pool = 0;
        self.leftover_withdrawn += amount;
        self.record(now, LedgerEventKind::LeftoverWithdrawn { to: owner, amount });
        tracing::info!(%owner, amount, "leftover reward withdrawn");
        Ok(amount)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn total_staked(&self) -> Amount {
        self.total_staked
    }

    pub fn total_staked_for(&self, participant: Address) -> Amount {
        self.accounts
            .get(&participant)
            .map(|a| a.staked_amount)
            .unwrap_or(0)
    }

    pub fn remaining_reward_pool(&self) -> Amount {
        self.remaining_reward_pool
    }

    /// Reward token already swept to the owner
    pub fn leftover_withdrawn(&self) -> Amount {
        self.leftover_withdrawn
    }

    /// Reward token paid to participants so far
    pub fn total_reward_paid(&self) -> Amount {
        self.accounts.values().map(|a| a.cumulative_reward_paid).sum()
    }

    pub fn account(&self, participant: Address) -> Option<&ParticipantAccount> {
        self.accounts.get(&participant)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &ParticipantAccount)> {
        self.accounts.iter()
    }

    /// Ratios at `now`; [`RewardRatios::BLACKOUT`] until initialized
    pub fn ratios_at(&self, now: Timestamp) -> RewardRatios {
        self.schedule
            .map(|s| s.ratios(now))
            .unwrap_or(RewardRatios::BLACKOUT)
    }

    pub fn is_staking_allowed(&self, now: Timestamp) -> bool {
        self.schedule
            .map(|s| s.is_staking_allowed(now))
            .unwrap_or(false)
    }

    /// Project what a full unstake by `participant` would pay at `timestamp`
    /// given the current stake distribution
    pub fn rewards_at(&self, timestamp: Timestamp, participant: Address) -> RewardProjection {
        let staked_amount = self.total_staked_for(participant);
        let ratios = self.ratios_at(timestamp);
        let reward = prorated_reward(
            self.config.total_reward_pool,
            staked_amount,
            self.total_staked,
            ratios,
        )
        .min(self.remaining_reward_pool);

        RewardProjection {
            timestamp,
            participant,
            staked_amount,
            ratios,
            reward,
        }
    }

    /// Retained events, oldest first
    pub fn events(&self) -> impl DoubleEndedIterator<Item = &LedgerEvent> + ExactSizeIterator {
        self.events.iter()
    }

    /// Retained events with `sequence >= from`
    pub fn events_since(&self, from: u64) -> impl Iterator<Item = &LedgerEvent> {
        self.events.iter().filter(move |e| e.sequence >= from)
    }

    /// Sequence number the next committed mutation will carry
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Verify bookkeeping against itself and against the external balances.
    ///
    /// External balances may exceed the tracked amounts (direct donations),
    /// never fall below them.
    pub fn check_invariants(&self) -> Result<()> {
        let summed: Amount = self.accounts.values().map(|a| a.staked_amount).sum();
        if summed != self.total_staked {
            return Err(StakingError::InconsistentSnapshot(format!(
                "participant stakes sum to {summed}, total staked is {}",
                self.total_staked
            )));
        }

        if self.is_initialized() {
            let accounted = self
                .remaining_reward_pool
                .checked_add(self.total_reward_paid())
                .and_then(|v| v.checked_add(self.leftover_withdrawn));
            if accounted != Some(self.config.total_reward_pool) {
                return Err(StakingError::InconsistentSnapshot(format!(
                    "remaining {} + paid {} + swept {} != pool {}",
                    self.remaining_reward_pool,
                    self.total_reward_paid(),
                    self.leftover_withdrawn,
                    self.config.total_reward_pool
                )));
            }
        }

        let ledger = self.config.ledger_address;
        if self.staking_token.balance_of(ledger) < self.total_staked {
            return Err(StakingError::InconsistentSnapshot(
                "staking token balance below total staked".into(),
            ));
        }
        if self.reward_token.balance_of(ledger) < self.remaining_reward_pool {
            return Err(StakingError::InconsistentSnapshot(
                "reward token balance below remaining pool".into(),
            ));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            config: self.config.clone(),
            schedule: self.schedule,
            accounts: self.accounts.clone(),
            total_staked: self.total_staked,
            remaining_reward_pool: self.remaining_reward_pool,
            leftover_withdrawn: self.leftover_withdrawn,
            next_sequence: self.next_sequence,
        }
    }

    /// Rebuild a ledger from a snapshot, rejecting inconsistent state
    pub fn from_snapshot(
        snapshot: LedgerSnapshot,
        staking_token: Arc<dyn FungibleAsset>,
        reward_token: Arc<dyn FungibleAsset>,
    ) -> Result<Self> {
        let mut ledger = Self::new(snapshot.config, staking_token, reward_token)?;

        if let Some(schedule) = snapshot.schedule {
            let expected = RewardSchedule::new(schedule.staking_window_start, ledger.config.pool_expiration)?;
            if expected != schedule {
                return Err(StakingError::InconsistentSnapshot(
                    "schedule does not match configuration".into(),
                ));
            }
        } else if snapshot.remaining_reward_pool != 0 || snapshot.total_staked != 0 {
            return Err(StakingError::InconsistentSnapshot(
                "uninitialized pool cannot hold stake or reward".into(),
            ));
        }

        ledger.schedule = snapshot.schedule;
        ledger.accounts = snapshot.accounts;
        ledger.total_staked = snapshot.total_staked;
        ledger.remaining_reward_pool = snapshot.remaining_reward_pool;
        ledger.leftover_withdrawn = snapshot.leftover_withdrawn;
        ledger.next_sequence = snapshot.next_sequence;
        ledger.check_invariants()?;
        Ok(ledger)
    }

    /// The ledger's own account moves no tokens when it pays itself
    fn ensure_not_holding_account(&self, who: Address) -> Result<()> {
        if who == self.config.ledger_address {
            tracing::warn!(%who, "rejected: pool holding account cannot stake or unstake");
            return Err(StakingError::InvalidParticipant(who));
        }
        Ok(())
    }

    fn record(&mut self, timestamp: Timestamp, kind: LedgerEventKind) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(LedgerEvent {
            sequence: self.next_sequence,
            timestamp,
            kind,
        });
        self.next_sequence += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::InMemoryToken;

    const T: Timestamp = 1_700_000_000;
    const POOL: Amount = 1000;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    const OWNER: u8 = 0x01;
    const LEDGER: u8 = 0x5A;
    const ALICE: u8 = 0xA1;
    const BOB: u8 = 0xB0;

    struct Fixture {
        lp: Arc<InMemoryToken>,
        dom: Arc<InMemoryToken>,
        ledger: StakingLedger,
    }

    fn fixture(pool: Amount, expiration_days: i64) -> Fixture {
        let lp = InMemoryToken::shared(addr(0xAA), "LP");
        let dom = InMemoryToken::shared(addr(0xBB), "DOM");
        dom.mint(addr(LEDGER), pool).unwrap();
        for who in [ALICE, BOB] {
            lp.mint(addr(who), 250).unwrap();
            lp.approve(addr(who), addr(LEDGER), Amount::MAX);
        }

        let config = PoolConfiguration::new(
            addr(0xAA),
            addr(0xBB),
            addr(OWNER),
            addr(LEDGER),
            pool,
            T + days(expiration_days),
        );
        let ledger = StakingLedger::new(config, lp.clone(), dom.clone()).unwrap();
        Fixture { lp, dom, ledger }
    }

    fn initialized() -> Fixture {
        let mut f = fixture(POOL, 200);
        f.ledger.initialize(addr(OWNER), T).unwrap();
        f
    }

    #[test]
    fn test_prorated_reward_formula() {
        let ratios = RewardRatios {
            reward: Ratio::from_fraction(1, 2),
            penalty: Ratio::from_fraction(1, 4),
        };
        // 1000 * 100/400 * 0.5 * 0.75 = 93.75
        assert_eq!(prorated_reward(1000, 100, 400, ratios), 93);
        assert_eq!(prorated_reward(1000, 100, 0, ratios), 0);
        assert_eq!(prorated_reward(1000, 0, 400, ratios), 0);
        assert_eq!(prorated_reward(1000, 400, 400, RewardRatios::MATURED), 1000);
        assert_eq!(prorated_reward(1000, 400, 400, RewardRatios::BLACKOUT), 0);
    }

    #[test]
    fn test_only_owner_initializes() {
        let mut f = fixture(POOL, 200);
        let err = f.ledger.initialize(addr(ALICE), T).unwrap_err();
        assert_eq!(err, StakingError::Unauthorized { caller: addr(ALICE) });
        assert!(!f.ledger.is_initialized());

        f.ledger.initialize(addr(OWNER), T).unwrap();
        assert_eq!(
            f.ledger.initialize(addr(OWNER), T).unwrap_err(),
            StakingError::AlreadyInitialized
        );
        assert_eq!(f.ledger.remaining_reward_pool(), POOL);
    }

    #[test]
    fn test_degenerate_expiration_rejected_at_initialize() {
        let mut f = fixture(POOL, 7);
        let err = f.ledger.initialize(addr(OWNER), T).unwrap_err();
        assert!(matches!(err, StakingError::DegenerateConfiguration(_)));
        assert!(!f.ledger.is_initialized());
    }

    #[test]
    fn test_initialize_pulls_shortfall_from_owner() {
        let lp = InMemoryToken::shared(addr(0xAA), "LP");
        let dom = InMemoryToken::shared(addr(0xBB), "DOM");
        dom.mint(addr(OWNER), POOL).unwrap();
        let config = PoolConfiguration::new(addr(0xAA), addr(0xBB), addr(OWNER), addr(LEDGER), POOL, T + days(200));
        let mut ledger = StakingLedger::new(config, lp, dom.clone()).unwrap();

        let err = ledger.initialize(addr(OWNER), T).unwrap_err();
        assert!(matches!(err, StakingError::TransferFailed { .. }));
        assert!(!ledger.is_initialized());

        dom.approve(addr(OWNER), addr(LEDGER), POOL);
        ledger.initialize(addr(OWNER), T).unwrap();
        assert_eq!(dom.balance_of(addr(LEDGER)), POOL);
        assert_eq!(dom.balance_of(addr(OWNER)), 0);
    }

    #[test]
    fn test_start_grace_delays_window() {
        let mut f = fixture(POOL, 200);
        let mut config = f.ledger.config().clone();
        config.start_grace_secs = 20;
        f.ledger = StakingLedger::new(config, f.lp.clone(), f.dom.clone()).unwrap();
        let schedule = f.ledger.initialize(addr(OWNER), T).unwrap();

        assert_eq!(schedule.staking_window_start, T + 20);
        assert!(matches!(
            f.ledger.stake(addr(ALICE), 10, T),
            Err(StakingError::StakingWindowClosed { .. })
        ));
        assert!(f.ledger.stake(addr(ALICE), 10, T + 20).is_ok());
    }

    #[test]
    fn test_stake_before_initialize_rejected() {
        let mut f = fixture(POOL, 200);
        assert!(!f.ledger.is_staking_allowed(T));
        assert_eq!(f.ledger.ratios_at(T), RewardRatios::BLACKOUT);
        assert_eq!(
            f.ledger.stake(addr(ALICE), 10, T).unwrap_err(),
            StakingError::StakingWindowClosed { now: T }
        );
    }

    #[test]
    fn test_stake_window_edges() {
        let mut f = initialized();
        assert!(f.ledger.stake(addr(ALICE), 100, T).is_ok());
        assert!(f.ledger.stake(addr(ALICE), 100, T + days(7) - 1).is_ok());
        assert!(matches!(
            f.ledger.stake(addr(ALICE), 50, T + days(7)),
            Err(StakingError::StakingWindowClosed { .. })
        ));
        assert!(matches!(
            f.ledger.stake(addr(ALICE), 50, T - 1),
            Err(StakingError::StakingWindowClosed { .. })
        ));
        assert_eq!(f.ledger.total_staked_for(addr(ALICE)), 200);
        assert_eq!(f.lp.balance_of(addr(LEDGER)), 200);
    }

    #[test]
    fn test_failed_stake_changes_nothing() {
        let mut f = initialized();
        f.lp.approve(addr(ALICE), addr(LEDGER), 10);
        let err = f.ledger.stake(addr(ALICE), 100, T).unwrap_err();
        assert!(matches!(err, StakingError::TransferFailed { .. }));
        assert_eq!(f.ledger.total_staked(), 0);
        assert!(f.ledger.account(addr(ALICE)).is_none());
        assert_eq!(f.lp.balance_of(addr(ALICE)), 250);
    }

    #[test]
    fn test_stake_for_credits_beneficiary() {
        let mut f = initialized();
        let receipt = f.ledger.stake_for(addr(ALICE), addr(BOB), 100, T).unwrap();

        assert_eq!(receipt.beneficiary, addr(BOB));
        assert_eq!(f.ledger.total_staked_for(addr(BOB)), 100);
        assert_eq!(f.ledger.total_staked_for(addr(ALICE)), 0);
        assert_eq!(f.lp.balance_of(addr(ALICE)), 150);

        // only the beneficiary can withdraw
        assert!(f.ledger.unstake(addr(ALICE), 100, T).is_err());
        f.ledger.unstake(addr(BOB), 100, T).unwrap();
        assert_eq!(f.lp.balance_of(addr(BOB)), 350);
    }

    #[test]
    fn test_unstake_more_than_staked() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 100, T).unwrap();
        assert_eq!(
            f.ledger.unstake(addr(ALICE), 101, T + days(1)).unwrap_err(),
            StakingError::InsufficientStake {
                requested: 101,
                available: 100
            }
        );
        assert_eq!(
            f.ledger.unstake(addr(BOB), 1, T + days(1)).unwrap_err(),
            StakingError::InsufficientStake {
                requested: 1,
                available: 0
            }
        );
    }

    #[test]
    fn test_stake_unstake_symmetry_in_window() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        let receipt = f.ledger.unstake(addr(ALICE), 250, T + days(3)).unwrap();

        assert_eq!(receipt.amount, 250);
        assert_eq!(receipt.reward, 0);
        assert_eq!(f.lp.balance_of(addr(ALICE)), 250);
        assert_eq!(f.dom.balance_of(addr(ALICE)), 0);
        // account survives at zero balance
        assert_eq!(f.ledger.account(addr(ALICE)).unwrap().staked_amount, 0);
    }

    #[test]
    fn test_day_sixty_payout() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        let receipt = f.ledger.unstake(addr(ALICE), 250, T + days(60)).unwrap();

        // 1000 * (53/193)^2 * (53/113) = 35.37...
        assert_eq!(receipt.reward, 35);
        assert_eq!(f.dom.balance_of(addr(ALICE)), 35);
        assert_eq!(f.ledger.remaining_reward_pool(), POOL - 35);
        let account = f.ledger.account(addr(ALICE)).unwrap();
        assert_eq!(account.cumulative_reward_paid, 35);
        assert_eq!(account.last_reward_ratio, receipt.ratios.reward);
        assert_eq!(account.last_updated, T + days(60));
    }

    #[test]
    fn test_full_pool_at_expiration() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        let receipt = f.ledger.unstake(addr(ALICE), 250, T + days(200)).unwrap();
        assert_eq!(receipt.reward, POOL);
        assert_eq!(f.ledger.remaining_reward_pool(), 0);
        f.ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_denominator_read_before_subtraction() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        f.ledger.stake(addr(BOB), 250, T).unwrap();

        let first = f.ledger.unstake(addr(ALICE), 250, T + days(200)).unwrap();
        assert_eq!(first.total_staked_before, 500);
        assert_eq!(first.reward, 500);

        let second = f.ledger.unstake(addr(BOB), 250, T + days(200)).unwrap();
        assert_eq!(second.total_staked_before, 250);
        // pool-capped: the nominal share is the full pool, only 500 remain
        assert_eq!(second.reward, 500);
        assert_eq!(f.ledger.remaining_reward_pool(), 0);
        f.ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_reward_transfer_failure_rolls_back() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        f.dom.freeze(addr(ALICE));

        let err = f.ledger.unstake(addr(ALICE), 250, T + days(200)).unwrap_err();
        assert!(matches!(err, StakingError::TransferFailed { token, .. } if token == addr(0xBB)));
        assert_eq!(f.ledger.total_staked_for(addr(ALICE)), 250);
        assert_eq!(f.lp.balance_of(addr(ALICE)), 0);
        assert_eq!(f.ledger.remaining_reward_pool(), POOL);

        f.dom.unfreeze(addr(ALICE));
        assert_eq!(f.ledger.unstake(addr(ALICE), 250, T + days(200)).unwrap().reward, POOL);
    }

    #[test]
    fn test_withdraw_leftover() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        f.ledger.unstake(addr(ALICE), 250, T + days(60)).unwrap();

        assert_eq!(
            f.ledger.withdraw_leftover(T + days(199)).unwrap_err(),
            StakingError::TooEarly {
                now: T + days(199),
                expiration: T + days(200)
            }
        );

        let swept = f.ledger.withdraw_leftover(T + days(200)).unwrap();
        assert_eq!(swept, POOL - 35);
        assert_eq!(f.dom.balance_of(addr(OWNER)), POOL - 35);
        assert_eq!(f.ledger.withdraw_leftover(T + days(201)).unwrap(), 0);
        assert_eq!(f.ledger.leftover_withdrawn(), POOL - 35);
        f.ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_withdraw_leftover_before_initialize() {
        let mut f = fixture(POOL, 200);
        assert!(matches!(
            f.ledger.withdraw_leftover(T + days(400)),
            Err(StakingError::TooEarly { .. })
        ));
    }

    #[test]
    fn test_unstake_after_sweep_pays_nothing() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        f.ledger.withdraw_leftover(T + days(200)).unwrap();
        let receipt = f.ledger.unstake(addr(ALICE), 250, T + days(201)).unwrap();
        assert_eq!(receipt.reward, 0);
        assert_eq!(f.lp.balance_of(addr(ALICE)), 250);
        f.ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_rewards_at_is_read_only() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        let events = f.ledger.events().len();

        let projection = f.ledger.rewards_at(T + days(60), addr(ALICE));
        assert_eq!(projection.reward, 35);
        assert_eq!(projection.staked_amount, 250);
        assert_eq!(f.ledger.rewards_at(T + days(200), addr(ALICE)).reward, POOL);
        assert_eq!(f.ledger.rewards_at(T + days(200), addr(BOB)).reward, 0);

        assert_eq!(f.ledger.events().len(), events);
        assert_eq!(f.ledger.remaining_reward_pool(), POOL);
    }

    #[test]
    fn test_events_are_sequenced() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        f.ledger.unstake(addr(ALICE), 250, T + days(60)).unwrap();
        f.ledger.withdraw_leftover(T + days(200)).unwrap();

        let names: Vec<_> = f.ledger.events().map(|e| e.name()).collect();
        assert_eq!(names, ["initialized", "staked", "unstaked", "leftover_withdrawn"]);
        let sequences: Vec<_> = f.ledger.events().map(|e| e.sequence).collect();
        assert_eq!(sequences, [0, 1, 2, 3]);
        assert_eq!(f.ledger.events_since(2).count(), 2);
    }

    #[test]
    fn test_event_log_keeps_bounded_tail() {
        let mut f = initialized();
        let extra = EVENT_LOG_CAPACITY as u64 + 10;
        for _ in 0..extra {
            f.ledger.stake(addr(ALICE), 0, T).unwrap();
        }

        assert_eq!(f.ledger.events().len(), EVENT_LOG_CAPACITY);
        assert_eq!(f.ledger.next_sequence(), extra + 1);
        assert_eq!(f.ledger.events().next().unwrap().sequence, extra + 1 - EVENT_LOG_CAPACITY as u64);
        assert_eq!(f.ledger.events().last().unwrap().sequence, extra);
    }

    #[test]
    fn test_restored_ledger_continues_sequence() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        let snapshot = f.ledger.snapshot();
        assert_eq!(snapshot.next_sequence, 2);

        let mut restored = StakingLedger::from_snapshot(snapshot, f.lp.clone(), f.dom.clone()).unwrap();
        assert_eq!(restored.events().len(), 0);
        restored.stake(addr(BOB), 100, T + 1).unwrap();
        let sequences: Vec<_> = restored.events().map(|e| e.sequence).collect();
        assert_eq!(sequences, [2]);
    }

    #[test]
    fn test_holding_account_cannot_sponsor() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();

        assert_eq!(
            f.ledger.stake_for(addr(LEDGER), addr(BOB), 250, T).unwrap_err(),
            StakingError::InvalidParticipant(addr(LEDGER))
        );
        assert_eq!(f.ledger.total_staked(), 250);
        assert_eq!(f.ledger.total_staked_for(addr(BOB)), 0);
        assert_eq!(f.lp.balance_of(addr(LEDGER)), 250);
        f.ledger.check_invariants().unwrap();

        // alice still leaves with her own stake and the whole pool
        let receipt = f.ledger.unstake(addr(ALICE), 250, T + days(200)).unwrap();
        assert_eq!(receipt.reward, POOL);
        assert_eq!(f.lp.balance_of(addr(ALICE)), 250);
    }

    #[test]
    fn test_holding_account_cannot_be_beneficiary() {
        let mut f = initialized();
        assert_eq!(
            f.ledger.stake_for(addr(ALICE), addr(LEDGER), 100, T).unwrap_err(),
            StakingError::InvalidParticipant(addr(LEDGER))
        );
        assert_eq!(
            f.ledger.stake(addr(LEDGER), 100, T).unwrap_err(),
            StakingError::InvalidParticipant(addr(LEDGER))
        );
        assert!(f.ledger.account(addr(LEDGER)).is_none());
        assert_eq!(f.ledger.total_staked(), 0);
        assert_eq!(f.lp.balance_of(addr(ALICE)), 250);
        f.ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_holding_account_cannot_unstake() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();

        for amount in [0, 250] {
            assert_eq!(
                f.ledger.unstake(addr(LEDGER), amount, T + days(200)).unwrap_err(),
                StakingError::InvalidParticipant(addr(LEDGER))
            );
        }
        assert_eq!(f.ledger.remaining_reward_pool(), POOL);
        assert_eq!(f.dom.balance_of(addr(LEDGER)), POOL);
        f.ledger.check_invariants().unwrap();
    }

    #[test]
    fn test_snapshot_round_trip_and_tamper_detection() {
        let mut f = initialized();
        f.ledger.stake(addr(ALICE), 250, T).unwrap();
        f.ledger.stake(addr(BOB), 100, T + 5).unwrap();
        f.ledger.unstake(addr(BOB), 40, T + days(90)).unwrap();

        let snapshot = f.ledger.snapshot();
        let restored = StakingLedger::from_snapshot(snapshot.clone(), f.lp.clone(), f.dom.clone()).unwrap();
        assert_eq!(restored.snapshot(), snapshot);

        let mut tampered = snapshot.clone();
        tampered.total_staked += 1;
        assert!(matches!(
            StakingLedger::from_snapshot(tampered, f.lp.clone(), f.dom.clone()),
            Err(StakingError::InconsistentSnapshot(_))
        ));

        let mut tampered = snapshot;
        tampered.remaining_reward_pool += 1;
        assert!(StakingLedger::from_snapshot(tampered, f.lp.clone(), f.dom.clone()).is_err());
    }

    #[test]
    fn test_mismatched_assets_rejected() {
        let lp = InMemoryToken::shared(addr(0xAA), "LP");
        let dom = InMemoryToken::shared(addr(0xBB), "DOM");
        let config = PoolConfiguration::new(addr(0xAA), addr(0xBB), addr(OWNER), addr(LEDGER), POOL, T);
        let err = StakingLedger::new(config.clone(), dom.clone(), lp.clone()).unwrap_err();
        assert!(matches!(err, StakingError::InvalidConfiguration(_)));

        let mut same = config;
        same.reward_token = same.staking_token;
        assert!(StakingLedger::new(same, lp.clone(), lp).is_err());
    }
}
