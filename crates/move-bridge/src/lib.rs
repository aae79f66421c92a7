//! # Move Bridge - Move VM Execution Subsystem
//!
//! Connects a host ledger to a pool of Move virtual machines. The bridge
//! turns ledger requests into VM payloads, runs them against the ledger's
//! key-value store under the caller's gas budget, and applies what the VM
//! reports back: events, new accounts, contract revenue, staking changes and
//! outbound ledger messages.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | VM never reports more gas than it was given | `domain/invariants.rs` - `check_gas_budget_invariant()` |
//! | A new account appears once per result | `domain/invariants.rs` - `check_unique_new_accounts_invariant()` |
//! | Staking deltas are non-empty | `domain/invariants.rs` - `check_staking_delta_invariant()` |
//! | Gas is charged even when the VM fails | `service.rs` - `MoveBridge::settle()` |
//! | A failed tx that linked modules flushes every loader cache | `loader_guard.rs` |
//! | Simulation never touches pooled engines | `service.rs` - `MoveBridge::lease_engine()` |
//!
//! ## Components
//!
//! | Component | Location | Purpose |
//! |-----------|----------|---------|
//! | Engine pool | `pool.rs` | Fixed set of engines behind a semaphore |
//! | Gas delegation | `gas.rs` | Infinite meter during VM runs, settle afterwards |
//! | Resource store | `store/` | VM key layout over the host KV store, genesis |
//! | Payload builder | `payload.rs` | Name and type-argument checks, BCS encoding |
//! | Result applier | `applier.rs` | Commits VM side effects in a fixed order |
//! | Messages | `messages.rs` | VM messages to ledger messages |
//!
//! ## Usage Example
//!
//! ```ignore
//! use move_bridge::prelude::*;
//!
//! let bridge = MoveBridge::new(config, kv, engine_factory, keepers)?;
//! let mut ctx = ExecutionContext::new("chain-1", height, time, gas_limit);
//! let output = bridge
//!     .execute_entry_function(&mut ctx, ExecuteRequest::new(sender, addr, "coin", "transfer", args))
//!     .await?;
//! bridge.post_transaction(true).await;
//! ```

// Crate-level lints
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

// =============================================================================
// MODULES
// =============================================================================

pub mod adapters;
pub mod applier;
pub mod context;
pub mod domain;
pub mod errors;
pub mod events;
pub mod gas;
pub mod loader_guard;
pub mod messages;
pub mod payload;
pub mod pool;
pub mod ports;
pub mod service;
pub mod store;

// =============================================================================
// PRELUDE
// =============================================================================

/// Convenient re-exports for common usage.
pub mod prelude {
    // Domain entities
    pub use crate::domain::entities::{
        AccountKind, BridgeParams, EntryFunction, ExecutionResult, JsonEvent, NewAccount, Script,
        StakingDelta, UpgradePolicy, ViewFunction, ViewOutput, VmConfig, VmEnv, VmFailure,
    };

    // Value objects
    pub use crate::domain::value_objects::{
        AccountAddress, Coin, Coins, DecCoin, Decimal, Hash, Identifier, ModuleId, U256,
    };
    pub use crate::domain::type_tag::{StructTag, TypeTag};

    // Domain services
    pub use crate::domain::services::{
        delegator_address, metadata_address, move_denom, object_address, session_id,
    };

    // Invariants
    pub use crate::domain::invariants::{
        check_all_invariants, limits, InvariantCheckResult, InvariantViolation,
    };

    // Ports
    pub use crate::ports::inbound::{
        ExecuteOutput, ExecuteRequest, MoveBridgeApi, PublishRequest, ScriptRequest, ViewRequest,
    };
    pub use crate::ports::outbound::{
        AccountKeeper, BankKeeper, CommunityPoolKeeper, EngineFactory, GasMeter, KvStore,
        MessageHandler, MessageRouter, MoveEngine, StakingKeeper, VmStore,
    };

    // Context and events
    pub use crate::context::ExecutionContext;
    pub use crate::events::{EventManager, LedgerEvent};
    pub use crate::messages::{LedgerMessage, OutboundMessage};

    // Storage
    pub use crate::store::{GenesisState, ResourceStore};

    // Errors
    pub use crate::errors::{BridgeError, GasError, KeeperError, StoreError};

    // Service
    pub use crate::service::{Keepers, MoveBridge, ServiceConfig, ServiceStats};
}

// =============================================================================
// CRATE INFO
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_exports() {
        let _ = VmConfig::default();
        let _ = AccountAddress::ONE;
        assert!(!super::VERSION.is_empty());
    }
}
