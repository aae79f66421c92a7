//! # Driving Ports (API - Inbound)
//!
//! The entry points transaction and query handlers call.

use crate::context::ExecutionContext;
use crate::domain::entities::{AuthenticationOutput, UpgradePolicy, ViewOutput};
use crate::domain::value_objects::AccountAddress;
use crate::errors::BridgeError;
use crate::store::GenesisState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// REQUESTS
// =============================================================================

/// Entry-function call request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Signers of the call.
    pub senders: Vec<AccountAddress>,
    /// Module address.
    pub module_address: AccountAddress,
    /// Module name.
    pub module_name: String,
    /// Function name.
    pub function_name: String,
    /// Type arguments, textual form.
    pub type_args: Vec<String>,
    /// BCS-encoded arguments.
    pub args: Vec<Vec<u8>>,
}

impl ExecuteRequest {
    /// Single-signer call with no type arguments.
    #[must_use]
    pub fn new(
        sender: AccountAddress,
        module_address: AccountAddress,
        module_name: impl Into<String>,
        function_name: impl Into<String>,
        args: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            senders: vec![sender],
            module_address,
            module_name: module_name.into(),
            function_name: function_name.into(),
            type_args: Vec::new(),
            args,
        }
    }

    /// Sets the type arguments.
    #[must_use]
    pub fn with_type_args(mut self, type_args: Vec<String>) -> Self {
        self.type_args = type_args;
        self
    }
}

/// Script call request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRequest {
    /// Signers of the call.
    pub senders: Vec<AccountAddress>,
    /// Script bytecode.
    pub code: Vec<u8>,
    /// Type arguments, textual form.
    pub type_args: Vec<String>,
    /// BCS-encoded arguments.
    pub args: Vec<Vec<u8>>,
}

/// View-function call request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRequest {
    /// Module address.
    pub module_address: AccountAddress,
    /// Module name.
    pub module_name: String,
    /// Function name.
    pub function_name: String,
    /// Type arguments, textual form.
    pub type_args: Vec<String>,
    /// BCS-encoded arguments.
    pub args: Vec<Vec<u8>>,
}

/// Module bundle publication request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Publishing account.
    pub sender: AccountAddress,
    /// Module bytecode bundle.
    pub modules: Vec<Vec<u8>>,
    /// Upgrade policy.
    pub upgrade_policy: UpgradePolicy,
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Outcome of a state-changing call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecuteOutput {
    /// Gas the VM reported and the host meter was charged.
    pub gas_used: u64,
    /// Number of VM events emitted.
    pub event_count: usize,
    /// Number of ledger messages dispatched.
    pub message_count: usize,
    /// Whether new bytecode was linked.
    pub loaded_new_modules: bool,
}

// =============================================================================
// API
// =============================================================================

/// Primary API for Move execution.
#[async_trait]
pub trait MoveBridgeApi: Send + Sync {
    /// Runs an entry function and applies its side effects.
    async fn execute_entry_function(
        &self,
        ctx: &mut ExecutionContext,
        request: ExecuteRequest,
    ) -> Result<ExecuteOutput, BridgeError>;

    /// Runs a script and applies its side effects.
    async fn execute_script(
        &self,
        ctx: &mut ExecutionContext,
        request: ScriptRequest,
    ) -> Result<ExecuteOutput, BridgeError>;

    /// Runs a view function. Nothing is written or dispatched.
    async fn execute_view_function(
        &self,
        ctx: &mut ExecutionContext,
        request: ViewRequest,
    ) -> Result<ViewOutput, BridgeError>;

    /// Resolves the signer of an account-abstraction signature.
    async fn execute_authenticate(
        &self,
        ctx: &mut ExecutionContext,
        sender: AccountAddress,
        signature: Vec<u8>,
    ) -> Result<AuthenticationOutput, BridgeError>;

    /// Publishes a module bundle.
    async fn publish(
        &self,
        ctx: &mut ExecutionContext,
        request: PublishRequest,
    ) -> Result<ExecuteOutput, BridgeError>;

    /// Publishes the standard library bundle if the store has no modules.
    async fn initialize(
        &self,
        ctx: &mut ExecutionContext,
        module_bundle: Vec<Vec<u8>>,
    ) -> Result<(), BridgeError>;

    /// Loads genesis state.
    async fn import_genesis(&self, state: &GenesisState) -> Result<(), BridgeError>;

    /// Dumps the VM store.
    async fn export_genesis(&self) -> Result<GenesisState, BridgeError>;

    /// Post-transaction hook. Returns true if loader caches were invalidated.
    async fn post_transaction(&self, success: bool) -> bool;
}
