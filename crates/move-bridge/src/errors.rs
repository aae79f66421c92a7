//! # Error Types
//!
//! All error types for the Move execution bridge.

use crate::domain::type_tag::TypeTagError;
use crate::domain::value_objects::{AccountAddress, U256};
use thiserror::Error;

// =============================================================================
// BRIDGE ERRORS
// =============================================================================

/// Errors surfaced by the execution pipeline to its caller.
///
/// No variant is ever retried by the bridge itself.
#[derive(Debug, Error, Clone)]
pub enum BridgeError {
    /// Malformed or oversized payload, rejected before any VM or store access.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Type tag or struct tag failed to parse.
    #[error("malformed type: {0}")]
    MalformedType(#[from] TypeTagError),

    /// Missing module, resource, table entry, account or validator.
    #[error("not found: {0}")]
    NotFound(String),

    /// The VM rejected or aborted the call. Gas was still charged.
    #[error("vm execution failed: {status} (gas used {gas_used})")]
    VmExecution {
        /// VM status payload, opaque to the host.
        status: String,
        /// Gas charged for the failed call.
        gas_used: u64,
    },

    /// Outbound VM message has no conversion or registered handler.
    #[error("unsupported message: {0}")]
    UnsupportedMessage(String),

    /// Declared sender does not match the authenticated caller, or the
    /// operation is disabled by params.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The VM reported a new account of an unknown kind.
    #[error("unsupported account kind: {0}")]
    UnsupportedAccountKind(u8),

    /// The host gas meter ran out.
    #[error(transparent)]
    OutOfGas(#[from] GasError),

    /// The caller's context was cancelled or its deadline passed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Resource store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Collaborator (keeper) failure.
    #[error("keeper error: {0}")]
    Keeper(#[from] KeeperError),

    /// Binary or JSON encoding failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// The VM returned a result that breaks a host-side invariant.
    #[error("invalid vm result: {0}")]
    InvalidVmResult(String),

    /// Invalid bridge configuration.
    #[error("invalid config: {0}")]
    Config(String),
}

impl BridgeError {
    /// Returns true for the expected "nothing there" outcome of read paths.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Keeper(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if the failure happened after gas was charged.
    #[must_use]
    pub fn charges_gas(&self) -> bool {
        matches!(self, Self::VmExecution { .. } | Self::OutOfGas(_))
    }

    /// Gas charged for a failed VM call, if any.
    #[must_use]
    pub fn gas_used(&self) -> Option<u64> {
        match self {
            Self::VmExecution { gas_used, .. } => Some(*gas_used),
            _ => None,
        }
    }
}

impl From<bcs::Error> for BridgeError {
    fn from(err: bcs::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

// =============================================================================
// STORE ERRORS
// =============================================================================

/// Errors from the key/value store and the resource store on top of it.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// A lock guarding in-memory state was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Key bytes do not decode into a resource key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Stored value failed to decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// Gas charged for a store access ran out.
    #[error(transparent)]
    Gas(#[from] GasError),

    /// Backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<bcs::Error> for StoreError {
    fn from(err: bcs::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

// =============================================================================
// KEEPER ERRORS
// =============================================================================

/// Errors from ledger collaborators.
#[derive(Debug, Error, Clone)]
pub enum KeeperError {
    /// Account does not exist.
    #[error("account not found: {0}")]
    AccountNotFound(AccountAddress),

    /// Validator does not exist.
    #[error("validator not found: {0}")]
    ValidatorNotFound(String),

    /// No ledger denom for the given asset.
    #[error("unknown denom: {0}")]
    UnknownDenom(String),

    /// Balance too low for a transfer.
    #[error("insufficient funds: {address} has {available}{denom}, needs {required}{denom}")]
    InsufficientFunds {
        /// Account being debited.
        address: AccountAddress,
        /// Denomination.
        denom: String,
        /// Amount needed.
        required: U256,
        /// Amount held.
        available: U256,
    },

    /// Delegation too small for the requested unbond.
    #[error("insufficient delegation from {delegator} to {validator}")]
    InsufficientDelegation {
        /// Delegator account.
        delegator: AccountAddress,
        /// Validator operator.
        validator: String,
    },

    /// Any other collaborator failure.
    #[error("{0}")]
    Other(String),
}

impl KeeperError {
    /// Returns true for missing-entity errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::AccountNotFound(_) | Self::ValidatorNotFound(_))
    }
}

// =============================================================================
// GAS ERRORS
// =============================================================================

/// Gas meter failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GasError {
    /// Consumption would exceed the limit.
    #[error("out of gas in {descriptor}: limit {limit}, consumed {consumed}, requested {requested}")]
    OutOfGas {
        /// What the gas was being charged for.
        descriptor: String,
        /// Meter limit.
        limit: u64,
        /// Consumed before the request.
        consumed: u64,
        /// Amount requested.
        requested: u64,
    },
}

// =============================================================================
// TESTS
// =============================================================================
