//! # Shared Pools
//!
//! A [`SharedPool`] linearizes every mutation of one ledger behind a write
//! lock and samples the clock once per operation, inside the lock. Queries
//! take the read lock and only ever observe committed state.
//!
//! A [`PoolRegistry`] holds many pools, each independently locked.

use crate::ledger::{
    LedgerSnapshot, PoolConfiguration, RewardProjection, StakeReceipt, StakingLedger, UnstakeReceipt,
};
use crate::events::LedgerEvent;
use crate::schedule::{RewardRatios, RewardSchedule};
use crate::token::FungibleAsset;
use parking_lot::RwLock;
use stakepool_core::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Lock-guarded ledger bound to a clock
pub struct SharedPool {
    id: PoolId,
    ledger: RwLock<StakingLedger>,
    clock: Arc<dyn Clock>,
}

impl SharedPool {
    pub fn new(id: PoolId, ledger: StakingLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            id,
            ledger: RwLock::new(ledger),
            clock,
        }
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }

    /// Run a mutation under the write lock with `now` sampled once
    fn mutate<T>(&self, op: &'static str, f: impl FnOnce(&mut StakingLedger, Timestamp) -> Result<T>) -> Result<T> {
        let span = tracing::info_span!("pool", id = %self.id, op);
        let _entered = span.enter();
        let mut ledger = self.ledger.write();
        let now = self.clock.now();
        f(&mut ledger, now)
    }

    pub fn initialize(&self, caller: Address) -> Result<RewardSchedule> {
        self.mutate("initialize", |l, now| l.initialize(caller, now))
    }

    pub fn stake(&self, participant: Address, amount: Amount) -> Result<StakeReceipt> {
        self.mutate("stake", |l, now| l.stake(participant, amount, now))
    }

    pub fn stake_for(&self, sponsor: Address, beneficiary: Address, amount: Amount) -> Result<StakeReceipt> {
        self.mutate("stake_for", |l, now| l.stake_for(sponsor, beneficiary, amount, now))
    }

    pub fn unstake(&self, participant: Address, amount: Amount) -> Result<UnstakeReceipt> {
        self.mutate("unstake", |l, now| l.unstake(participant, amount, now))
    }

    pub fn withdraw_leftover(&self) -> Result<Amount> {
        self.mutate("withdraw_leftover", |l, now| l.withdraw_leftover(now))
    }

    pub fn total_staked(&self) -> Amount {
        self.ledger.read().total_staked()
    }

    pub fn total_staked_for(&self, participant: Address) -> Amount {
        self.ledger.read().total_staked_for(participant)
    }

    pub fn remaining_reward_pool(&self) -> Amount {
        self.ledger.read().remaining_reward_pool()
    }

    /// Current global ratios
    pub fn ratios(&self) -> RewardRatios {
        let ledger = self.ledger.read();
        ledger.ratios_at(self.clock.now())
    }

    pub fn is_staking_allowed(&self) -> bool {
        let ledger = self.ledger.read();
        ledger.is_staking_allowed(self.clock.now())
    }

    pub fn rewards_at(&self, timestamp: Timestamp, participant: Address) -> RewardProjection {
        self.ledger.read().rewards_at(timestamp, participant)
    }

    pub fn config(&self) -> PoolConfiguration {
        self.ledger.read().config().clone()
    }

    /// Retained events with `sequence >= from`
    pub fn events_since(&self, from: u64) -> Vec<LedgerEvent> {
        self.ledger.read().events_since(from).cloned().collect()
    }

    /// Consistent image of the last committed state
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.read().snapshot()
    }

    /// Run a read-only closure against committed state
    pub fn with_ledger<T>(&self, f: impl FnOnce(&StakingLedger) -> T) -> T {
        f(&self.ledger.read())
    }
}

/// Set of independently locked pools keyed by [`PoolId`]
pub struct PoolRegistry {
    pools: RwLock<BTreeMap<PoolId, Arc<SharedPool>>>,
    clock: Arc<dyn Clock>,
}

impl PoolRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            pools: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Register a fresh, uninitialized pool
    pub fn create_pool(
        &self,
        id: PoolId,
        config: PoolConfiguration,
        staking_token: Arc<dyn FungibleAsset>,
        reward_token: Arc<dyn FungibleAsset>,
    ) -> Result<Arc<SharedPool>> {
        let ledger = StakingLedger::new(config, staking_token, reward_token)?;
        self.insert(id, ledger)
    }

    /// Register a pool restored from a snapshot
    pub fn restore_pool(
        &self,
        id: PoolId,
        snapshot: LedgerSnapshot,
        staking_token: Arc<dyn FungibleAsset>,
        reward_token: Arc<dyn FungibleAsset>,
    ) -> Result<Arc<SharedPool>> {
        let ledger = StakingLedger::from_snapshot(snapshot, staking_token, reward_token)?;
        self.insert(id, ledger)
    }

    fn insert(&self, id: PoolId, ledger: StakingLedger) -> Result<Arc<SharedPool>> {
        let mut pools = self.pools.write();
        if pools.contains_key(&id) {
            return Err(StakingError::PoolExists(id));
        }
        let pool = Arc::new(SharedPool::new(id.clone(), ledger, Arc::clone(&self.clock)));
        pools.insert(id.clone(), Arc::clone(&pool));
        tracing::info!(pool = %id, "pool registered");
        Ok(pool)
    }

    pub fn get(&self, id: &PoolId) -> Result<Arc<SharedPool>> {
        self.pools
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StakingError::PoolNotFound(id.clone()))
    }

    pub fn ids(&self) -> Vec<PoolId> {
        self.pools.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    /// Snapshots of every pool, each taken under its own read lock
    pub fn snapshots(&self) -> Vec<(PoolId, LedgerSnapshot)> {
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        pools
            .into_iter()
            .map(|p| (p.id().clone(), p.snapshot()))
            .collect()
    }
}
