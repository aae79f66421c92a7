//! # Core Domain Entities
//!
//! Main business entities for Move VM execution.
//! These represent the calls handed to the VM and everything it hands back.

use crate::domain::type_tag::TypeTag;
use crate::domain::value_objects::{AccountAddress, Decimal, Hash, Identifier, ModuleId};
use serde::{Deserialize, Serialize};

// =============================================================================
// CALL PAYLOADS
// =============================================================================

/// An entry-function call in the VM's calling convention.
///
/// Arguments are already BCS-encoded Move values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFunction {
    /// Module holding the function.
    pub module: ModuleId,
    /// Function name.
    pub function: Identifier,
    /// Type arguments.
    pub ty_args: Vec<TypeTag>,
    /// BCS-encoded arguments.
    pub args: Vec<Vec<u8>>,
}

impl EntryFunction {
    /// Serializes into the VM's binary call format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bcs::Error> {
        bcs::to_bytes(self)
    }

    /// Deserializes from the VM's binary call format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bcs::Error> {
        bcs::from_bytes(bytes)
    }
}

/// A view-function call. Same layout as an entry function, executed read-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFunction {
    /// Module holding the function.
    pub module: ModuleId,
    /// Function name.
    pub function: Identifier,
    /// Type arguments.
    pub ty_args: Vec<TypeTag>,
    /// BCS-encoded arguments.
    pub args: Vec<Vec<u8>>,
}

/// A script call: compiled script bytecode plus its arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Compiled script bytecode.
    pub code: Vec<u8>,
    /// Type arguments.
    pub ty_args: Vec<TypeTag>,
    /// BCS-encoded arguments.
    pub args: Vec<Vec<u8>>,
}

/// The kind of VM invocation, for logging and the summary event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// Entry function.
    EntryFunction,
    /// Script.
    Script,
    /// View function.
    ViewFunction,
    /// Account-abstraction authentication.
    Authenticate,
    /// Genesis initialization.
    Initialize,
}

impl CallKind {
    /// Short name used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EntryFunction => "entry_function",
            Self::Script => "script",
            Self::ViewFunction => "view_function",
            Self::Authenticate => "authenticate",
            Self::Initialize => "initialize",
        }
    }
}

// =============================================================================
// VM ENVIRONMENT
// =============================================================================

/// Deterministic environment handed to the VM for one call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmEnv {
    /// Chain identifier.
    pub chain_id: String,
    /// Current block height.
    pub block_height: u64,
    /// Current block time (unix seconds).
    pub block_timestamp: u64,
    /// Account number the next new account will receive.
    pub next_account_number: u64,
    /// Hash of the enclosing transaction.
    pub tx_hash: Hash,
    /// Per-call session id derived from the tx hash and execution counter.
    pub session_id: Hash,
}

// =============================================================================
// EXECUTION RESULT
// =============================================================================

/// A VM-emitted event: type tag plus JSON payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonEvent {
    /// Event struct type tag, textual form.
    pub type_tag: String,
    /// JSON-encoded event data.
    pub event_data: String,
}

impl JsonEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(type_tag: impl Into<String>, event_data: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            event_data: event_data.into(),
        }
    }
}

/// Account kinds the VM can ask the host to materialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    /// Plain user account.
    Base,
    /// Account backing a Move object.
    Object,
    /// Account backing a Move table.
    Table,
    /// Module-owned account.
    Module,
}

impl AccountKind {
    /// Decodes the VM's account-kind tag.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Base),
            1 => Some(Self::Object),
            2 => Some(Self::Table),
            3 => Some(Self::Module),
            _ => None,
        }
    }

    /// Encodes as the VM's account-kind tag.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Base => 0,
            Self::Object => 1,
            Self::Table => 2,
            Self::Module => 3,
        }
    }
}

/// A new account reported by the VM. The kind is kept raw until the
/// applier decodes it so unknown kinds become typed errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Address of the account.
    pub address: AccountAddress,
    /// Raw account-kind tag.
    pub account_kind: u8,
}

/// Net change in delegated stake requested by Move staking code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingDelta {
    /// Validator operator address.
    pub validator: String,
    /// Fungible asset metadata address identifying the staked asset.
    pub metadata: AccountAddress,
    /// Amount to delegate.
    pub delegation: u64,
    /// Amount to undelegate.
    pub undelegation: u64,
}

/// Gas attributed to one module during a call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasUsage {
    /// Module that consumed the gas.
    pub module_id: ModuleId,
    /// Gas consumed.
    pub gas_used: u64,
}

/// Result of a successful VM execution.
#[derive(Clone, Debug, Default)]
pub struct ExecutionResult {
    /// Events emitted.
    pub events: Vec<JsonEvent>,
    /// Accounts to materialize on the ledger.
    pub new_accounts: Vec<NewAccount>,
    /// Staking changes to apply.
    pub staking_deltas: Vec<StakingDelta>,
    /// Outbound ledger messages.
    pub messages: Vec<crate::messages::OutboundMessage>,
    /// Gas per module, for revenue distribution only.
    pub gas_usages: Vec<GasUsage>,
    /// Aggregate gas used.
    pub gas_used: u64,
    /// Whether new bytecode was linked into the loader cache.
    pub loaded_new_modules: bool,
}

impl ExecutionResult {
    /// Creates an empty result that consumed `gas_used`.
    #[must_use]
    pub fn with_gas(gas_used: u64) -> Self {
        Self {
            gas_used,
            ..Self::default()
        }
    }

    /// Returns true if the result carries any ledger side effect.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        !self.new_accounts.is_empty()
            || !self.staking_deltas.is_empty()
            || !self.messages.is_empty()
    }
}

/// Output of a view function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewOutput {
    /// JSON-encoded return value.
    pub ret: String,
    /// Events the function emitted (never committed).
    pub events: Vec<JsonEvent>,
    /// Gas used.
    pub gas_used: u64,
}

/// Output of an account-abstraction authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationOutput {
    /// Address that the signature authenticates.
    pub signer: AccountAddress,
    /// Gas used.
    pub gas_used: u64,
}

/// The VM rejected or aborted a call. The status is opaque to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmFailure {
    /// VM-provided status payload.
    pub status: String,
    /// Gas consumed before failing.
    pub gas_used: u64,
    /// Whether new bytecode was linked before failing.
    pub loaded_new_modules: bool,
}

impl VmFailure {
    /// Creates a failure.
    #[must_use]
    pub fn new(status: impl Into<String>, gas_used: u64) -> Self {
        Self {
            status: status.into(),
            gas_used,
            loaded_new_modules: false,
        }
    }
}

// =============================================================================
// MODULES
// =============================================================================

/// Upgrade policy of a published module, owned by VM-side metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradePolicy {
    /// Any upgrade allowed.
    Arbitrary,
    /// Only compatible upgrades.
    Compatible,
    /// No upgrades.
    Immutable,
}

impl UpgradePolicy {
    /// Decodes the VM's policy tag.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Arbitrary),
            1 => Some(Self::Compatible),
            2 => Some(Self::Immutable),
            _ => None,
        }
    }

    /// Encodes as the VM's policy tag.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Arbitrary => 0,
            Self::Compatible => 1,
            Self::Immutable => 2,
        }
    }
}

/// A published module as the store holds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    /// Publishing account.
    pub address: AccountAddress,
    /// Module name.
    pub name: Identifier,
    /// Raw bytecode.
    pub raw_bytes: Vec<u8>,
}

// =============================================================================
// LEDGER ACCOUNTS
// =============================================================================

/// A ledger account object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    /// Address.
    pub address: AccountAddress,
    /// Sequential account number.
    pub account_number: u64,
    /// Account kind.
    pub kind: AccountKind,
}

/// Validator bond status, as far as the bridge cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondStatus {
    /// In the active set.
    Bonded,
    /// Leaving the active set.
    Unbonding,
    /// Not in the active set.
    Unbonded,
}

/// A validator as seen through the staking collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Operator address.
    pub operator: String,
    /// Bond status.
    pub status: BondStatus,
}

impl Validator {
    /// Returns true if the validator is bonded.
    #[must_use]
    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Payload limits enforced before any VM or store interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Maximum module name length in bytes.
    pub max_module_name_length: usize,
    /// Maximum function name length in bytes.
    pub max_function_name_length: usize,
    /// Maximum number of type arguments.
    pub max_type_args: usize,
    /// Maximum module bytecode size in bytes.
    pub max_module_size: usize,
    /// Maximum script bytecode size in bytes.
    pub max_script_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_module_name_length: 128,
            max_function_name_length: 128,
            max_type_args: 16,
            max_module_size: 1024 * 1024, // 1 MiB
            max_script_size: 1024 * 1024, // 1 MiB
        }
    }
}

/// On-chain parameters of the Move module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeParams {
    /// Fee denomination.
    pub base_denom: String,
    /// Fraction of fees shared with the module owner that consumed the gas.
    pub contract_shared_revenue_ratio: Decimal,
    /// Whether script execution is enabled.
    pub script_enabled: bool,
    /// Whether arbitrary upgrade policy is allowed at genesis.
    pub allow_arbitrary: bool,
    /// Accounts allowed to publish (empty means everyone).
    pub allowed_publishers: Vec<AccountAddress>,
}

impl Default for BridgeParams {
    fn default() -> Self {
        Self {
            base_denom: "uinit".to_string(),
            contract_shared_revenue_ratio: Decimal::zero(),
            script_enabled: true,
            allow_arbitrary: false,
            allowed_publishers: Vec::new(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_kind_tags() {
        for kind in [
            AccountKind::Base,
            AccountKind::Object,
            AccountKind::Table,
            AccountKind::Module,
        ] {
            assert_eq!(AccountKind::from_u8(kind.as_u8()), Some(kind));
        }
        assert_eq!(AccountKind::from_u8(9), None);
    }

    #[test]
    fn test_upgrade_policy_tags() {
        assert_eq!(UpgradePolicy::from_u8(1), Some(UpgradePolicy::Compatible));
        assert_eq!(UpgradePolicy::Immutable.as_u8(), 2);
        assert_eq!(UpgradePolicy::from_u8(3), None);
    }

    #[test]
    fn test_entry_function_binary_roundtrip() {
        let entry = EntryFunction {
            module: ModuleId::new(AccountAddress::ONE, Identifier::new("coin").unwrap()),
            function: Identifier::new("transfer").unwrap(),
            ty_args: vec![TypeTag::parse("0x1::native_uinit::Token").unwrap()],
            args: vec![vec![1, 2, 3], 100u64.to_le_bytes().to_vec()],
        };
        let bytes = entry.to_bytes().unwrap();
        assert_eq!(EntryFunction::from_bytes(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_execution_result_side_effects() {
        let mut result = ExecutionResult::with_gas(10);
        assert!(!result.has_side_effects());
        result.new_accounts.push(NewAccount {
            address: AccountAddress::ONE,
            account_kind: 0,
        });
        assert!(result.has_side_effects());
    }

    #[test]
    fn test_vm_config_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.max_module_name_length, 128);
        assert_eq!(config.max_type_args, 16);
        assert_eq!(config.max_module_size, 1024 * 1024);
    }
}
