//! # Driven Ports (SPI - Outbound)
//!
//! Interfaces the bridge depends on. Adapters implement these traits to
//! provide:
//! - The host gas meter
//! - The ledger key/value store
//! - The Move VM engine
//! - Ledger collaborators (accounts, bank, staking, community pool, router)
//!
//! Dependencies point INWARD: the service only ever sees these traits.

use crate::context::ExecutionContext;
use crate::domain::entities::{
    AuthenticationOutput, EntryFunction, ExecutionResult, LedgerAccount, Script, Validator,
    ViewFunction, ViewOutput, VmEnv, VmFailure,
};
use crate::domain::services::module_account_address;
use crate::domain::value_objects::{AccountAddress, Coins, U256};
use crate::errors::{BridgeError, GasError, KeeperError, StoreError};
use crate::events::LedgerEvent;
use crate::messages::LedgerMessage;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// GAS METER
// =============================================================================

/// The host ledger's gas meter.
///
/// A limit of zero means the meter is infinite.
pub trait GasMeter: Send {
    /// Gas limit, zero for an infinite meter.
    fn limit(&self) -> u64;

    /// Gas consumed so far.
    fn consumed(&self) -> u64;

    /// Consumes gas, failing once the limit would be exceeded.
    fn consume(&mut self, amount: u64, descriptor: &str) -> Result<(), GasError>;

    /// Returns true if the meter never runs out.
    fn is_infinite(&self) -> bool {
        self.limit() == 0
    }

    /// Gas left before the limit.
    fn remaining(&self) -> u64 {
        if self.is_infinite() {
            u64::MAX
        } else {
            self.limit().saturating_sub(self.consumed())
        }
    }
}

// =============================================================================
// KEY/VALUE STORE
// =============================================================================

/// Ordered byte-string key/value store scoped to the current transaction.
///
/// Rolling back a failed transaction is the host's job.
pub trait KvStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a value.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Deletes a value.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// The mutable key/value view handed to the VM for one call.
///
/// Keys are encoded resource keys.
pub trait VmStore {
    /// Reads a value.
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes a value.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Deletes a value.
    fn remove(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// All entries under `prefix`, in ascending key order.
    fn iter_prefix(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

// =============================================================================
// MOVE ENGINE
// =============================================================================

/// One Move VM instance with its bytecode loader cache.
///
/// Engines are symmetric: any engine can run any call. The only state kept
/// between calls is the loader cache.
pub trait MoveEngine: Send {
    /// Runs an entry function on behalf of `senders`.
    fn execute_entry_function(
        &mut self,
        store: &mut dyn VmStore,
        env: &VmEnv,
        gas_balance: u64,
        senders: &[AccountAddress],
        payload: &EntryFunction,
    ) -> Result<ExecutionResult, VmFailure>;

    /// Runs a script on behalf of `senders`.
    fn execute_script(
        &mut self,
        store: &mut dyn VmStore,
        env: &VmEnv,
        gas_balance: u64,
        senders: &[AccountAddress],
        payload: &Script,
    ) -> Result<ExecutionResult, VmFailure>;

    /// Runs a view function. Writes made through `store` are discarded.
    fn execute_view_function(
        &mut self,
        store: &mut dyn VmStore,
        env: &VmEnv,
        gas_balance: u64,
        payload: &ViewFunction,
    ) -> Result<ViewOutput, VmFailure>;

    /// Verifies an account-abstraction signature and resolves the signer.
    fn authenticate(
        &mut self,
        store: &mut dyn VmStore,
        env: &VmEnv,
        gas_balance: u64,
        sender: AccountAddress,
        signature: &[u8],
    ) -> Result<AuthenticationOutput, VmFailure>;

    /// Publishes the standard library bundle at genesis.
    fn initialize(
        &mut self,
        store: &mut dyn VmStore,
        env: &VmEnv,
        module_bundle: &[Vec<u8>],
        allow_arbitrary: bool,
        allowed_publishers: &[AccountAddress],
    ) -> Result<ExecutionResult, VmFailure>;

    /// Drops every cached module.
    fn flush_loader_cache(&mut self);
}

/// Builds fresh engines, for the pool and for isolated calls.
pub trait EngineFactory: Send + Sync {
    /// Creates an engine with a cold loader cache.
    fn create(&self) -> Box<dyn MoveEngine>;
}

// =============================================================================
// LEDGER COLLABORATORS
// =============================================================================

/// Ledger account store.
pub trait AccountKeeper: Send + Sync {
    /// Reads an account.
    fn get_account(&self, address: &AccountAddress) -> Result<Option<LedgerAccount>, KeeperError>;

    /// Writes an account.
    fn set_account(&self, account: LedgerAccount) -> Result<(), KeeperError>;

    /// Returns true if the account exists.
    fn has_account(&self, address: &AccountAddress) -> Result<bool, KeeperError> {
        Ok(self.get_account(address)?.is_some())
    }

    /// Allocates the next account number.
    fn next_account_number(&self) -> Result<u64, KeeperError>;

    /// Account number the next allocation will return, without allocating.
    fn peek_account_number(&self) -> Result<u64, KeeperError>;

    /// Address of a named module account.
    fn module_address(&self, name: &str) -> AccountAddress {
        module_account_address(name)
    }
}

/// Ledger balances.
pub trait BankKeeper: Send + Sync {
    /// Moves coins between accounts.
    fn send_coins(
        &self,
        from: &AccountAddress,
        to: &AccountAddress,
        amount: &Coins,
    ) -> Result<(), KeeperError>;

    /// Creates coins in `to`.
    fn mint_coins(&self, to: &AccountAddress, amount: &Coins) -> Result<(), KeeperError>;

    /// Destroys coins held by `from`.
    fn burn_coins(&self, from: &AccountAddress, amount: &Coins) -> Result<(), KeeperError>;

    /// Balance of `denom` held by `address`.
    fn balance(&self, address: &AccountAddress, denom: &str) -> Result<U256, KeeperError>;

    /// Ledger denom of a fungible asset metadata address.
    fn denom_from_metadata(&self, metadata: &AccountAddress) -> Result<String, KeeperError>;
}

/// Staking subsystem.
pub trait StakingKeeper: Send + Sync {
    /// Denoms that may be bonded.
    fn bond_denoms(&self) -> Result<Vec<String>, KeeperError>;

    /// Reads a validator.
    fn get_validator(&self, operator: &str) -> Result<Option<Validator>, KeeperError>;

    /// Writes a validator.
    fn set_validator(&self, validator: Validator) -> Result<(), KeeperError>;

    /// Delegates `amount` from `delegator` to `validator`.
    fn delegate(
        &self,
        delegator: &AccountAddress,
        validator: &str,
        amount: &Coins,
    ) -> Result<(), KeeperError>;

    /// Unbonds `amount` with instant settlement. The returned coins sit in
    /// the bonded or not-bonded pool, depending on validator status.
    fn unbond_instant(
        &self,
        delegator: &AccountAddress,
        validator: &str,
        amount: &Coins,
    ) -> Result<Coins, KeeperError>;
}

/// Community pool.
pub trait CommunityPoolKeeper: Send + Sync {
    /// Moves `amount` from `depositor` into the community pool.
    fn fund_community_pool(&self, depositor: &AccountAddress, amount: &Coins)
        -> Result<(), KeeperError>;
}

// =============================================================================
// MESSAGE ROUTING
// =============================================================================

/// Executes one concrete ledger message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Executes the message and returns the events it produced.
    async fn handle(
        &self,
        ctx: &mut ExecutionContext,
        msg: &LedgerMessage,
    ) -> Result<Vec<LedgerEvent>, BridgeError>;
}

/// Resolves ledger message types to handlers.
pub trait MessageRouter: Send + Sync {
    /// Handler registered for `type_url`, if any.
    fn handler(&self, type_url: &str) -> Option<Arc<dyn MessageHandler>>;
}
