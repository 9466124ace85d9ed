//! # Fungible Asset Collaborator
//!
//! The ledger never owns balances itself; it asks an ERC-20-style asset to
//! move them. Every call either fully succeeds or leaves all balances intact.

use parking_lot::RwLock;
use stakepool_core::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// ERC-20-style fungible asset
pub trait FungibleAsset: Send + Sync + fmt::Debug {
    /// Identifier of this asset
    fn address(&self) -> Address;

    fn balance_of(&self, holder: Address) -> Amount;

    fn allowance(&self, owner: Address, spender: Address) -> Amount;

    /// Dry run of [`FungibleAsset::transfer`]; moves nothing
    fn check_transfer(&self, from: Address, to: Address, amount: Amount) -> std::result::Result<(), TransferError>;

    /// Move `amount` from `from` (acting as the sender) to `to`
    fn transfer(&self, from: Address, to: Address, amount: Amount) -> std::result::Result<(), TransferError>;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming allowance
    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> std::result::Result<(), TransferError>;
}

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    frozen: HashSet<Address>,
    total_supply: Amount,
}

impl TokenState {
    fn balance(&self, holder: &Address) -> Amount {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    fn check(&self, from: Address, to: Address, amount: Amount) -> std::result::Result<(), TransferError> {
        if self.frozen.contains(&from) {
            return Err(TransferError::Frozen(from));
        }
        if self.frozen.contains(&to) {
            return Err(TransferError::Frozen(to));
        }
        let available = self.balance(&from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                holder: from,
                available,
                requested: amount,
            });
        }
        if from != to && self.balance(&to).checked_add(amount).is_none() {
            return Err(TransferError::Overflow(to));
        }
        Ok(())
    }

    fn apply(&mut self, from: Address, to: Address, amount: Amount) {
        if from == to || amount == 0 {
            return;
        }
        *self.balances.entry(from).or_insert(0) -= amount;
        *self.balances.entry(to).or_insert(0) += amount;
    }
}

/// In-memory ERC-20 ledger used by simulations and tests.
///
/// Supports minting, allowances and freezing accounts to emulate an asset
/// that refuses to move funds.
#[derive(Debug)]
pub struct InMemoryToken {
    address: Address,
    symbol: String,
    state: RwLock<TokenState>,
}

impl InMemoryToken {
    pub fn new(address: Address, symbol: impl Into<String>) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            state: RwLock::new(TokenState::default()),
        }
    }

    /// Convenience constructor returning a shareable handle
    pub fn shared(address: Address, symbol: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(address, symbol))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> Amount {
        self.state.read().total_supply
    }

    /// Create `amount` new units for `to`
    pub fn mint(&self, to: Address, amount: Amount) -> std::result::Result<(), TransferError> {
        let mut state = self.state.write();
        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(TransferError::Overflow(to))?;
        state.total_supply = supply;
        *state.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }

    pub fn approve(&self, owner: Address, spender: Address, amount: Amount) {
        self.state.write().allowances.insert((owner, spender), amount);
    }

    /// Reject every transfer touching `holder`
    pub fn freeze(&self, holder: Address) {
        self.state.write().frozen.insert(holder);
    }

    pub fn unfreeze(&self, holder: Address) {
        self.state.write().frozen.remove(&holder);
    }
}

impl FungibleAsset for InMemoryToken {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, holder: Address) -> Amount {
        self.state.read().balance(&holder)
    }

    fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.state
            .read()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }

    fn check_transfer(&self, from: Address, to: Address, amount: Amount) -> std::result::Result<(), TransferError> {
        self.state.read().check(from, to, amount)
    }

    fn transfer(&self, from: Address, to: Address, amount: Amount) -> std::result::Result<(), TransferError> {
        let mut state = self.state.write();
        state.check(from, to, amount)?;
        state.apply(from, to, amount);
        Ok(())
    }

    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> std::result::Result<(), TransferError> {
        let mut state = self.state.write();
        let allowed = state.allowances.get(&(from, spender)).copied().unwrap_or(0);
        if from != spender && allowed < amount {
            return Err(TransferError::InsufficientAllowance {
                owner: from,
                spender,
                available: allowed,
                requested: amount,
            });
        }
        state.check(from, to, amount)?;
        if from != spender {
            state.allowances.insert((from, spender), allowed - amount);
        }
        state.apply(from, to, amount);
        Ok(())
    }
}

/// One outgoing movement within a [`TransferBatch`]
#[derive(Clone, Debug)]
struct Leg {
    asset: Arc<dyn FungibleAsset>,
    from: Address,
    to: Address,
    amount: Amount,
}

/// Group of direct transfers that commit together.
///
/// Every leg is dry-run before anything moves; if a leg still fails during
/// execution, the legs already executed are reversed in opposite order.
#[derive(Clone, Debug, Default)]
pub struct TransferBatch {
    legs: Vec<Leg>,
}

impl TransferBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a transfer; zero amounts are dropped
    pub fn push(&mut self, asset: &Arc<dyn FungibleAsset>, from: Address, to: Address, amount: Amount) -> &mut Self {
        if amount > 0 {
            self.legs.push(Leg {
                asset: Arc::clone(asset),
                from,
                to,
                amount,
            });
        }
        self
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn execute(self) -> Result<()> {
        for leg in &self.legs {
            leg.asset
                .check_transfer(leg.from, leg.to, leg.amount)
                .map_err(|source| StakingError::TransferFailed {
                    token: leg.asset.address(),
                    source,
                })?;
        }

        for (done, leg) in self.legs.iter().enumerate() {
            if let Err(source) = leg.asset.transfer(leg.from, leg.to, leg.amount) {
                for prior in self.legs[..done].iter().rev() {
                    if let Err(e) = prior.asset.transfer(prior.to, prior.from, prior.amount) {
                        tracing::error!(
                            token = %prior.asset.address(),
                            from = %prior.to,
                            to = %prior.from,
                            amount = prior.amount,
                            error = %e,
                            "failed to reverse transfer leg"
                        );
                    }
                }
                return Err(StakingError::TransferFailed {
                    token: leg.asset.address(),
                    source,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_mint_and_transfer() {
        let token = InMemoryToken::new(addr(0xAA), "LP");
        token.mint(addr(1), 100).unwrap();
        token.transfer(addr(1), addr(2), 40).unwrap();

        assert_eq!(token.balance_of(addr(1)), 60);
        assert_eq!(token.balance_of(addr(2)), 40);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_insufficient_balance_moves_nothing() {
        let token = InMemoryToken::new(addr(0xAA), "LP");
        token.mint(addr(1), 10).unwrap();

        let err = token.transfer(addr(1), addr(2), 11).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientBalance { available: 10, .. }));
        assert_eq!(token.balance_of(addr(1)), 10);
        assert_eq!(token.balance_of(addr(2)), 0);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let token = InMemoryToken::new(addr(0xAA), "LP");
        token.mint(addr(1), 100).unwrap();

        let err = token.transfer_from(addr(9), addr(1), addr(9), 50).unwrap_err();
        assert!(matches!(err, TransferError::InsufficientAllowance { .. }));

        token.approve(addr(1), addr(9), 70);
        token.transfer_from(addr(9), addr(1), addr(9), 50).unwrap();
        assert_eq!(token.allowance(addr(1), addr(9)), 20);
        assert_eq!(token.balance_of(addr(9)), 50);
    }

    #[test]
    fn test_frozen_account_rejected() {
        let token = InMemoryToken::new(addr(0xAA), "DOM");
        token.mint(addr(1), 100).unwrap();
        token.freeze(addr(2));

        assert_eq!(token.transfer(addr(1), addr(2), 1), Err(TransferError::Frozen(addr(2))));
        token.unfreeze(addr(2));
        assert!(token.transfer(addr(1), addr(2), 1).is_ok());
    }

    #[test]
    fn test_batch_reverses_on_failure() {
        let lp = InMemoryToken::shared(addr(0xAA), "LP");
        let dom = InMemoryToken::shared(addr(0xBB), "DOM");
        lp.mint(addr(1), 100).unwrap();
        dom.mint(addr(1), 5).unwrap();

        let lp_asset: Arc<dyn FungibleAsset> = lp.clone();
        let dom_asset: Arc<dyn FungibleAsset> = dom.clone();

        let mut batch = TransferBatch::new();
        batch
            .push(&lp_asset, addr(1), addr(2), 100)
            .push(&dom_asset, addr(1), addr(2), 6);
        let err = batch.execute().unwrap_err();

        assert!(matches!(err, StakingError::TransferFailed { token, .. } if token == addr(0xBB)));
        assert_eq!(lp.balance_of(addr(1)), 100);
        assert_eq!(dom.balance_of(addr(1)), 5);
    }

    #[test]
    fn test_batch_skips_zero_legs() {
        let lp = InMemoryToken::shared(addr(0xAA), "LP");
        let asset: Arc<dyn FungibleAsset> = lp;
        let mut batch = TransferBatch::new();
        batch.push(&asset, addr(1), addr(2), 0);
        assert!(batch.is_empty());
        assert!(batch.execute().is_ok());
    }
}
