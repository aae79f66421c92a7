//! # In-Memory Ledger Keepers
//!
//! Account, bank, staking and community-pool collaborators backed by maps.
//! Staking and the community pool move real balances through the shared
//! bank so tests can observe every transfer.

use crate::applier::module_accounts;
use crate::domain::entities::{LedgerAccount, Validator};
use crate::domain::services::{metadata_address, module_account_address, move_denom};
use crate::domain::value_objects::{AccountAddress, Coin, Coins, U256};
use crate::errors::KeeperError;
use crate::ports::outbound::{AccountKeeper, BankKeeper, CommunityPoolKeeper, StakingKeeper};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// ACCOUNTS
// =============================================================================

/// In-memory account store.
#[derive(Debug, Default)]
pub struct InMemoryAccountKeeper {
    accounts: RwLock<HashMap<AccountAddress, LedgerAccount>>,
    next_number: Mutex<u64>,
}

impl InMemoryAccountKeeper {
    /// Create an empty keeper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }
}

impl AccountKeeper for InMemoryAccountKeeper {
    fn get_account(&self, address: &AccountAddress) -> Result<Option<LedgerAccount>, KeeperError> {
        Ok(self.accounts.read().get(address).cloned())
    }

    fn set_account(&self, account: LedgerAccount) -> Result<(), KeeperError> {
        self.accounts.write().insert(account.address, account);
        Ok(())
    }

    fn next_account_number(&self) -> Result<u64, KeeperError> {
        let mut next = self.next_number.lock();
        let number = *next;
        *next += 1;
        Ok(number)
    }

    fn peek_account_number(&self) -> Result<u64, KeeperError> {
        Ok(*self.next_number.lock())
    }
}

// =============================================================================
// BANK
// =============================================================================

/// A recorded coin movement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Debited account.
    pub from: AccountAddress,
    /// Credited account.
    pub to: AccountAddress,
    /// Amount moved.
    pub amount: Coins,
}

/// In-memory balances with a transfer log.
#[derive(Debug, Default)]
pub struct InMemoryBankKeeper {
    balances: RwLock<HashMap<(AccountAddress, String), U256>>,
    denoms: RwLock<HashMap<AccountAddress, String>>,
    transfers: Mutex<Vec<Transfer>>,
}

impl InMemoryBankKeeper {
    /// Create an empty bank.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ledger-native denom and returns its metadata address.
    pub fn register_denom(&self, denom: &str) -> AccountAddress {
        let metadata = metadata_address(denom);
        self.denoms.write().insert(metadata, denom.to_string());
        metadata
    }

    /// Every `send_coins` so far, in order.
    #[must_use]
    pub fn transfers(&self) -> Vec<Transfer> {
        self.transfers.lock().clone()
    }

    fn debit(&self, from: &AccountAddress, amount: &Coins) -> Result<(), KeeperError> {
        let mut balances = self.balances.write();
        for coin in amount.iter() {
            let available = balances
                .get(&(*from, coin.denom.clone()))
                .copied()
                .unwrap_or_default();
            if available < coin.amount {
                return Err(KeeperError::InsufficientFunds {
                    address: *from,
                    denom: coin.denom.clone(),
                    required: coin.amount,
                    available,
                });
            }
        }
        for coin in amount.iter() {
            if let Some(balance) = balances.get_mut(&(*from, coin.denom.clone())) {
                *balance -= coin.amount;
            }
        }
        Ok(())
    }

    fn credit(&self, to: &AccountAddress, amount: &Coins) {
        let mut balances = self.balances.write();
        for coin in amount.iter() {
            let balance = balances.entry((*to, coin.denom.clone())).or_default();
            *balance = balance.saturating_add(coin.amount);
        }
    }
}

impl BankKeeper for InMemoryBankKeeper {
    fn send_coins(
        &self,
        from: &AccountAddress,
        to: &AccountAddress,
        amount: &Coins,
    ) -> Result<(), KeeperError> {
        self.debit(from, amount)?;
        self.credit(to, amount);
        self.transfers.lock().push(Transfer {
            from: *from,
            to: *to,
            amount: amount.clone(),
        });
        Ok(())
    }

    fn mint_coins(&self, to: &AccountAddress, amount: &Coins) -> Result<(), KeeperError> {
        self.credit(to, amount);
        Ok(())
    }

    fn burn_coins(&self, from: &AccountAddress, amount: &Coins) -> Result<(), KeeperError> {
        self.debit(from, amount)
    }

    fn balance(&self, address: &AccountAddress, denom: &str) -> Result<U256, KeeperError> {
        Ok(self
            .balances
            .read()
            .get(&(*address, denom.to_string()))
            .copied()
            .unwrap_or_default())
    }

    fn denom_from_metadata(&self, metadata: &AccountAddress) -> Result<String, KeeperError> {
        Ok(self
            .denoms
            .read()
            .get(metadata)
            .cloned()
            .unwrap_or_else(|| move_denom(metadata)))
    }
}

// =============================================================================
// STAKING
// =============================================================================

/// In-memory staking. Delegated coins sit in the bonded or not-bonded pool
/// account depending on validator status.
pub struct InMemoryStakingKeeper {
    bank: Arc<InMemoryBankKeeper>,
    bond_denoms: Vec<String>,
    validators: RwLock<HashMap<String, Validator>>,
    delegations: RwLock<HashMap<(AccountAddress, String), Coins>>,
}

impl InMemoryStakingKeeper {
    /// Create a keeper moving funds through `bank`.
    #[must_use]
    pub fn new(bank: Arc<InMemoryBankKeeper>, bond_denoms: Vec<String>) -> Self {
        Self {
            bank,
            bond_denoms,
            validators: RwLock::new(HashMap::new()),
            delegations: RwLock::new(HashMap::new()),
        }
    }

    /// Current delegation of `delegator` to `validator`.
    #[must_use]
    pub fn delegation(&self, delegator: &AccountAddress, validator: &str) -> Coins {
        self.delegations
            .read()
            .get(&(*delegator, validator.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn pool_address(validator: &Validator) -> AccountAddress {
        if validator.is_bonded() {
            module_account_address(module_accounts::BONDED_POOL)
        } else {
            module_account_address(module_accounts::NOT_BONDED_POOL)
        }
    }

    fn require_validator(&self, operator: &str) -> Result<Validator, KeeperError> {
        self.validators
            .read()
            .get(operator)
            .cloned()
            .ok_or_else(|| KeeperError::ValidatorNotFound(operator.to_string()))
    }
}

impl StakingKeeper for InMemoryStakingKeeper {
    fn bond_denoms(&self) -> Result<Vec<String>, KeeperError> {
        Ok(self.bond_denoms.clone())
    }

    fn get_validator(&self, operator: &str) -> Result<Option<Validator>, KeeperError> {
        Ok(self.validators.read().get(operator).cloned())
    }

    fn set_validator(&self, validator: Validator) -> Result<(), KeeperError> {
        self.validators
            .write()
            .insert(validator.operator.clone(), validator);
        Ok(())
    }

    fn delegate(
        &self,
        delegator: &AccountAddress,
        validator: &str,
        amount: &Coins,
    ) -> Result<(), KeeperError> {
        let validator = self.require_validator(validator)?;
        for coin in amount.iter() {
            if !self.bond_denoms.contains(&coin.denom) {
                return Err(KeeperError::UnknownDenom(coin.denom.clone()));
            }
        }
        self.bank
            .send_coins(delegator, &Self::pool_address(&validator), amount)?;

        let mut delegations = self.delegations.write();
        let entry = delegations
            .entry((*delegator, validator.operator))
            .or_default();
        for coin in amount.iter() {
            entry.add(coin.clone());
        }
        Ok(())
    }

    fn unbond_instant(
        &self,
        delegator: &AccountAddress,
        validator: &str,
        amount: &Coins,
    ) -> Result<Coins, KeeperError> {
        let validator = self.require_validator(validator)?;
        let mut delegations = self.delegations.write();
        let key = (*delegator, validator.operator.clone());
        let held = delegations.get(&key).cloned().unwrap_or_default();

        let mut remaining = Coins::new();
        for coin in held.iter() {
            let unbond = amount.amount_of(&coin.denom);
            remaining.add(Coin::new(coin.denom.clone(), coin.amount.saturating_sub(unbond)));
        }
        if amount.iter().any(|coin| held.amount_of(&coin.denom) < coin.amount) {
            return Err(KeeperError::InsufficientDelegation {
                delegator: *delegator,
                validator: validator.operator,
            });
        }
        delegations.insert(key, remaining);
        Ok(amount.clone())
    }
}

// =============================================================================
// COMMUNITY POOL
// =============================================================================

/// Module account holding community pool funds.
pub const COMMUNITY_POOL_ACCOUNT: &str = "distribution";

/// In-memory community pool.
pub struct InMemoryCommunityPoolKeeper {
    bank: Arc<InMemoryBankKeeper>,
    pool: RwLock<Coins>,
}

impl InMemoryCommunityPoolKeeper {
    /// Create a pool moving funds through `bank`.
    #[must_use]
    pub fn new(bank: Arc<InMemoryBankKeeper>) -> Self {
        Self {
            bank,
            pool: RwLock::new(Coins::new()),
        }
    }

    /// Funds held by the pool.
    #[must_use]
    pub fn funds(&self) -> Coins {
        self.pool.read().clone()
    }
}

impl CommunityPoolKeeper for InMemoryCommunityPoolKeeper {
    fn fund_community_pool(
        &self,
        depositor: &AccountAddress,
        amount: &Coins,
    ) -> Result<(), KeeperError> {
        self.bank.send_coins(
            depositor,
            &module_account_address(COMMUNITY_POOL_ACCOUNT),
            amount,
        )?;
        let mut pool = self.pool.write();
        for coin in amount.iter() {
            pool.add(coin.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AccountKind, BondStatus};

    fn addr(n: u8) -> AccountAddress {
        AccountAddress::new([n; 32])
    }

    fn uinit(amount: u64) -> Coins {
        Coins::from(Coin::new("uinit", amount))
    }

    #[test]
    fn test_account_numbers_are_sequential() {
        let keeper = InMemoryAccountKeeper::new();
        assert_eq!(keeper.peek_account_number().unwrap(), 0);
        assert_eq!(keeper.next_account_number().unwrap(), 0);
        assert_eq!(keeper.next_account_number().unwrap(), 1);
        assert_eq!(keeper.peek_account_number().unwrap(), 2);

        keeper
            .set_account(LedgerAccount {
                address: addr(1),
                account_number: 0,
                kind: AccountKind::Base,
            })
            .unwrap();
        assert!(keeper.has_account(&addr(1)).unwrap());
        assert!(!keeper.has_account(&addr(2)).unwrap());
    }

    #[test]
    fn test_send_requires_funds() {
        let bank = InMemoryBankKeeper::new();
        bank.mint_coins(&addr(1), &uinit(100)).unwrap();

        let err = bank.send_coins(&addr(1), &addr(2), &uinit(150)).unwrap_err();
        assert!(matches!(err, KeeperError::InsufficientFunds { .. }));
        assert_eq!(bank.balance(&addr(1), "uinit").unwrap(), U256::from(100));

        bank.send_coins(&addr(1), &addr(2), &uinit(40)).unwrap();
        assert_eq!(bank.balance(&addr(2), "uinit").unwrap(), U256::from(40));
        assert_eq!(bank.transfers().len(), 1);
    }

    #[test]
    fn test_denom_lookup() {
        let bank = InMemoryBankKeeper::new();
        let metadata = bank.register_denom("uinit");
        assert_eq!(bank.denom_from_metadata(&metadata).unwrap(), "uinit");
        assert!(bank
            .denom_from_metadata(&addr(9))
            .unwrap()
            .starts_with("move/"));
    }

    #[test]
    fn test_delegate_and_unbond() {
        let bank = Arc::new(InMemoryBankKeeper::new());
        let staking = InMemoryStakingKeeper::new(Arc::clone(&bank), vec!["uinit".into()]);
        staking
            .set_validator(Validator {
                operator: "val1".into(),
                status: BondStatus::Bonded,
            })
            .unwrap();
        bank.mint_coins(&addr(1), &uinit(100)).unwrap();

        staking.delegate(&addr(1), "val1", &uinit(60)).unwrap();
        let bonded = module_account_address(module_accounts::BONDED_POOL);
        assert_eq!(bank.balance(&bonded, "uinit").unwrap(), U256::from(60));

        assert!(staking.unbond_instant(&addr(1), "val1", &uinit(80)).is_err());
        let returned = staking.unbond_instant(&addr(1), "val1", &uinit(20)).unwrap();
        assert_eq!(returned, uinit(20));
        assert_eq!(staking.delegation(&addr(1), "val1"), uinit(40));
    }

    #[test]
    fn test_community_pool_funding() {
        let bank = Arc::new(InMemoryBankKeeper::new());
        let pool = InMemoryCommunityPoolKeeper::new(Arc::clone(&bank));
        bank.mint_coins(&addr(1), &uinit(10)).unwrap();

        pool.fund_community_pool(&addr(1), &uinit(10)).unwrap();
        assert_eq!(pool.funds(), uinit(10));
        assert!(bank.balance(&addr(1), "uinit").unwrap().is_zero());
    }
}
