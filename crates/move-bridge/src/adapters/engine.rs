//! # Scripted Move Engine
//!
//! A `MoveEngine` whose functions are Rust closures registered per
//! `(module, function)`. It keeps a real loader cache (module bytes keyed by
//! module id) and implements `0x1::code::publish` natively against the VM
//! store, so publication, upgrade policy and stale-cache behaviour can be
//! exercised without a bytecode interpreter.
//!
//! Module blobs are `bcs((address, name, code))`.

use crate::domain::entities::{
    AuthenticationOutput, EntryFunction, ExecutionResult, GasUsage, JsonEvent, NewAccount, Script,
    StakingDelta, UpgradePolicy, ViewFunction, ViewOutput, VmEnv, VmFailure,
};
use crate::domain::services::object_address;
use crate::domain::type_tag::TypeTag;
use crate::domain::value_objects::{AccountAddress, Identifier, ModuleId};
use crate::messages::OutboundMessage;
use crate::payload::{CODE_MODULE, PUBLISH_FUNCTION};
use crate::ports::outbound::{EngineFactory, MoveEngine, VmStore};
use crate::store::keys::ResourceKey;
use crate::store::{metadata_store_tag, MetadataStore, ModuleMetadata, TableHandle};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Gas every call costs on top of what its handler reports.
pub const BASE_GAS: u64 = 1_000;

/// Gas per published module.
pub const PUBLISH_GAS_PER_MODULE: u64 = 5_000;

/// Encodes a module blob the scripted engine can publish.
pub fn encode_module(address: AccountAddress, name: &str, code: &[u8]) -> Result<Vec<u8>, bcs::Error> {
    bcs::to_bytes(&(address, name, code))
}

// =============================================================================
// CALL FRAME
// =============================================================================

/// Everything a scripted function sees and produces.
pub struct CallFrame<'a> {
    /// VM store view.
    pub store: &'a mut dyn VmStore,
    /// Call environment.
    pub env: &'a VmEnv,
    /// Signers, empty for views.
    pub senders: &'a [AccountAddress],
    /// Type arguments.
    pub ty_args: &'a [TypeTag],
    /// BCS arguments.
    pub args: &'a [Vec<u8>],
    /// Gas handed to the VM.
    pub gas_balance: u64,
    /// Gas consumed beyond [`BASE_GAS`].
    pub gas_used: u64,
    /// JSON return value, for views.
    pub ret: String,
    /// Events to emit.
    pub events: Vec<JsonEvent>,
    /// Accounts to create.
    pub new_accounts: Vec<NewAccount>,
    /// Staking deltas.
    pub staking_deltas: Vec<StakingDelta>,
    /// Ledger messages.
    pub messages: Vec<OutboundMessage>,
    /// Per-module gas; defaults to the whole call charged to the callee.
    pub gas_usages: Vec<GasUsage>,
}

impl<'a> CallFrame<'a> {
    fn new(
        store: &'a mut dyn VmStore,
        env: &'a VmEnv,
        senders: &'a [AccountAddress],
        ty_args: &'a [TypeTag],
        args: &'a [Vec<u8>],
        gas_balance: u64,
    ) -> Self {
        Self {
            store,
            env,
            senders,
            ty_args,
            args,
            gas_balance,
            gas_used: 0,
            ret: String::new(),
            events: Vec::new(),
            new_accounts: Vec::new(),
            staking_deltas: Vec::new(),
            messages: Vec::new(),
            gas_usages: Vec::new(),
        }
    }

    /// Decodes argument `idx`.
    pub fn arg<T: serde::de::DeserializeOwned>(&self, idx: usize) -> Result<T, String> {
        let raw = self
            .args
            .get(idx)
            .ok_or_else(|| format!("NUMBER_OF_ARGUMENTS_MISMATCH: no argument {idx}"))?;
        bcs::from_bytes(raw).map_err(|e| format!("FAILED_TO_DESERIALIZE_ARGUMENT: {e}"))
    }

    /// First signer.
    pub fn sender(&self) -> Result<AccountAddress, String> {
        self.senders
            .first()
            .copied()
            .ok_or_else(|| "NUMBER_OF_SIGNER_ARGUMENTS_MISMATCH".to_string())
    }

    fn into_result(
        self,
        outcome: Result<(), String>,
        callee: Option<&ModuleId>,
        loaded_new_modules: bool,
    ) -> Result<ExecutionResult, VmFailure> {
        let gas_used = BASE_GAS.saturating_add(self.gas_used);
        if gas_used > self.gas_balance {
            return Err(VmFailure {
                status: "OUT_OF_GAS".into(),
                gas_used: self.gas_balance,
                loaded_new_modules,
            });
        }
        if let Err(status) = outcome {
            return Err(VmFailure {
                status,
                gas_used,
                loaded_new_modules,
            });
        }
        let mut gas_usages = self.gas_usages;
        if gas_usages.is_empty() {
            if let Some(module_id) = callee {
                gas_usages.push(GasUsage {
                    module_id: module_id.clone(),
                    gas_used,
                });
            }
        }
        Ok(ExecutionResult {
            events: self.events,
            new_accounts: self.new_accounts,
            staking_deltas: self.staking_deltas,
            messages: self.messages,
            gas_usages,
            gas_used,
            loaded_new_modules,
        })
    }
}

type CallHandler = Arc<dyn Fn(&mut CallFrame<'_>) -> Result<(), String> + Send + Sync>;
type Authenticator = Arc<dyn Fn(AccountAddress, &[u8]) -> Result<AccountAddress, String> + Send + Sync>;

#[derive(Default)]
struct Registry {
    functions: RwLock<HashMap<(ModuleId, String), CallHandler>>,
    scripts: RwLock<HashMap<Vec<u8>, CallHandler>>,
    authenticator: RwLock<Option<Authenticator>>,
}

// =============================================================================
// LOADER PROBE
// =============================================================================

/// Counts loader activity across every engine of a factory.
#[derive(Debug, Default)]
pub struct LoaderProbe {
    loads: AtomicU64,
    flushes: AtomicU64,
}

impl LoaderProbe {
    /// Modules read from the store into a loader cache.
    #[must_use]
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Acquire)
    }

    /// Loader cache flushes.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Acquire)
    }
}

// =============================================================================
// FACTORY
// =============================================================================

/// Builds scripted engines sharing one function registry.
#[derive(Default)]
pub struct ScriptedEngineFactory {
    registry: Arc<Registry>,
    probe: Arc<LoaderProbe>,
}

impl ScriptedEngineFactory {
    /// Create a factory with no functions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the body of `module::function`, for entry and view calls.
    pub fn register(
        &self,
        module: ModuleId,
        function: &str,
        handler: impl Fn(&mut CallFrame<'_>) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.registry
            .functions
            .write()
            .insert((module, function.to_string()), Arc::new(handler));
    }

    /// Registers the body of the script whose bytecode is `code`.
    pub fn register_script(
        &self,
        code: Vec<u8>,
        handler: impl Fn(&mut CallFrame<'_>) -> Result<(), String> + Send + Sync + 'static,
    ) {
        self.registry.scripts.write().insert(code, Arc::new(handler));
    }

    /// Sets the account-abstraction verifier.
    pub fn set_authenticator(
        &self,
        authenticator: impl Fn(AccountAddress, &[u8]) -> Result<AccountAddress, String>
            + Send
            + Sync
            + 'static,
    ) {
        *self.registry.authenticator.write() = Some(Arc::new(authenticator));
    }

    /// Loader counters.
    #[must_use]
    pub fn probe(&self) -> &LoaderProbe {
        &self.probe
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(&self) -> Box<dyn MoveEngine> {
        Box::new(ScriptedEngine {
            registry: Arc::clone(&self.registry),
            probe: Arc::clone(&self.probe),
            cache: HashMap::new(),
        })
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// One scripted engine with its own loader cache.
pub struct ScriptedEngine {
    registry: Arc<Registry>,
    probe: Arc<LoaderProbe>,
    cache: HashMap<ModuleId, Vec<u8>>,
}

impl ScriptedEngine {
    /// Number of cached modules.
    #[must_use]
    pub fn cached_modules(&self) -> usize {
        self.cache.len()
    }

    fn load_module(&mut self, store: &mut dyn VmStore, module_id: &ModuleId) -> Result<(), String> {
        if self.cache.contains_key(module_id) {
            return Ok(());
        }
        let key = ResourceKey::Module {
            address: module_id.address,
            name: module_id.name.clone(),
        }
        .encode()
        .map_err(|e| format!("STORAGE_ERROR: {e}"))?;
        let code = store
            .get(&key)
            .map_err(|e| format!("STORAGE_ERROR: {e}"))?
            .ok_or_else(|| format!("LINKER_ERROR: module {module_id} not found"))?;
        self.cache.insert(module_id.clone(), code);
        self.probe.loads.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn resolve(&mut self, store: &mut dyn VmStore, module_id: &ModuleId, function: &Identifier) -> Result<CallHandler, String> {
        self.load_module(store, module_id)?;
        self.registry
            .functions
            .read()
            .get(&(module_id.clone(), function.as_str().to_string()))
            .cloned()
            .ok_or_else(|| format!("FUNCTION_RESOLUTION_FAILURE: {module_id}::{function}"))
    }

    /// `0x1::code::publish(bundle: vector<vector<u8>>, policy: u8)`.
    fn native_publish(&mut self, frame: &mut CallFrame<'_>) -> Result<(), String> {
        let bundle: Vec<Vec<u8>> = frame.arg(0)?;
        let policy_tag: u8 = frame.arg(1)?;
        let policy = UpgradePolicy::from_u8(policy_tag)
            .ok_or_else(|| format!("INVALID_UPGRADE_POLICY: {policy_tag}"))?;
        let sender = frame.sender()?;
        frame.gas_used = PUBLISH_GAS_PER_MODULE.saturating_mul(bundle.len() as u64);
        self.publish_bundle(&mut *frame.store, Some(sender), &bundle, policy)
    }

    /// Publishes a bundle on behalf of `sender`.
    ///
    /// The loader cache only sees the bundle once every module is written;
    /// a bundle that fails partway leaves the cache untouched.
    fn publish_bundle(
        &mut self,
        store: &mut dyn VmStore,
        sender: Option<AccountAddress>,
        bundle: &[Vec<u8>],
        policy: UpgradePolicy,
    ) -> Result<(), String> {
        let mut staged = Vec::with_capacity(bundle.len());
        for blob in bundle {
            let (address, name, code): (AccountAddress, String, Vec<u8>) =
                bcs::from_bytes(blob).map_err(|e| format!("CODE_DESERIALIZATION_ERROR: {e}"))?;
            if sender.is_some_and(|sender| sender != address) {
                return Err("MODULE_ADDRESS_DOES_NOT_MATCH_SENDER".into());
            }
            let name = Identifier::new(name.clone())
                .ok_or_else(|| format!("CODE_DESERIALIZATION_ERROR: bad module name {name}"))?;

            write_module(store, address, &name, &code, policy)?;
            staged.push((ModuleId::new(address, name), code));
        }
        self.cache.extend(staged);
        Ok(())
    }
}

fn is_publish(payload: &EntryFunction) -> bool {
    payload.module.address.is_std()
        && payload.module.name.as_str() == CODE_MODULE
        && payload.function.as_str() == PUBLISH_FUNCTION
}

fn storage_error(err: impl std::fmt::Display) -> String {
    format!("STORAGE_ERROR: {err}")
}

/// Writes module bytes and its metadata entry, enforcing the stored policy.
fn write_module(
    store: &mut dyn VmStore,
    address: AccountAddress,
    name: &Identifier,
    code: &[u8],
    policy: UpgradePolicy,
) -> Result<(), String> {
    let store_key = ResourceKey::Resource {
        address,
        struct_tag: metadata_store_tag().map_err(storage_error)?,
    }
    .encode()
    .map_err(storage_error)?;

    let mut metadata = match store.get(&store_key).map_err(storage_error)? {
        Some(raw) => bcs::from_bytes::<MetadataStore>(&raw).map_err(storage_error)?,
        None => {
            let handle = object_address(&address, b"code_metadata");
            let info_key = ResourceKey::TableInfo { table: handle }
                .encode()
                .map_err(storage_error)?;
            let info = bcs::to_bytes(&("vector<u8>", "0x1::code::ModuleMetadata")).map_err(storage_error)?;
            store.set(&info_key, &info).map_err(storage_error)?;
            MetadataStore {
                metadata: TableHandle { handle, length: 0 },
            }
        }
    };

    let entry_key = ResourceKey::TableEntry {
        table: metadata.metadata.handle,
        key: bcs::to_bytes(name.as_str()).map_err(storage_error)?,
    }
    .encode()
    .map_err(storage_error)?;

    match store.get(&entry_key).map_err(storage_error)? {
        Some(raw) => {
            let existing: ModuleMetadata = bcs::from_bytes(&raw).map_err(storage_error)?;
            if existing.upgrade_policy == UpgradePolicy::Immutable.as_u8() {
                return Err(format!("UPGRADE_POLICY_VIOLATION: {address}::{name} is immutable"));
            }
            if policy.as_u8() < existing.upgrade_policy {
                return Err(format!("UPGRADE_POLICY_VIOLATION: cannot weaken policy of {address}::{name}"));
            }
        }
        None => metadata.metadata.length += 1,
    }

    let entry = ModuleMetadata {
        upgrade_policy: policy.as_u8(),
    };
    store
        .set(&entry_key, &bcs::to_bytes(&entry).map_err(storage_error)?)
        .map_err(storage_error)?;
    store
        .set(&store_key, &bcs::to_bytes(&metadata).map_err(storage_error)?)
        .map_err(storage_error)?;

    let module_key = ResourceKey::Module {
        address,
        name: name.clone(),
    }
    .encode()
    .map_err(storage_error)?;
    store.set(&module_key, code).map_err(storage_error)
}

impl MoveEngine for ScriptedEngine {
    fn execute_entry_function(
        &mut self,
        store: &mut dyn VmStore,
        env: &VmEnv,
        gas_balance: u64,
        senders: &[AccountAddress],
        payload: &EntryFunction,
    ) -> Result<ExecutionResult, VmFailure> {
        if is_publish(payload) {
            let mut frame = CallFrame::new(store, env, senders, &payload.ty_args, &payload.args, gas_balance);
            let outcome = self.native_publish(&mut frame);
            let loaded = outcome.is_ok();
            return frame.into_result(outcome, Some(&payload.module), loaded);
        }

        let handler = match self.resolve(store, &payload.module, &payload.function) {
            Ok(handler) => handler,
            Err(status) => return Err(VmFailure::new(status, BASE_GAS.min(gas_balance))),
        };
        let mut frame = CallFrame::new(store, env, senders, &payload.ty_args, &payload.args, gas_balance);
        let outcome = handler(&mut frame);
        frame.into_result(outcome, Some(&payload.module), false)
    }

    fn execute_script(
        &mut self,
        store: &mut dyn VmStore,
        env: &VmEnv,
        gas_balance: u64,
        senders: &[AccountAddress],
        payload: &Script,
    ) -> Result<ExecutionResult, VmFailure> {
        let Some(handler) = self.registry.scripts.read().get(&payload.code).cloned() else {
            return Err(VmFailure::new(
                "CODE_DESERIALIZATION_ERROR: unknown script",
                BASE_GAS.min(gas_balance),
            ));
        };
        let mut frame = CallFrame::new(store, env, senders, &payload.ty_args, &payload.args, gas_balance);
        let outcome = handler(&mut frame);
        frame.into_result(outcome, None, false)
    }

    fn execute_view_function(
        &mut self,
        store: &mut dyn VmStore,
        env: &VmEnv,
        gas_balance: u64,
        payload: &ViewFunction,
    ) -> Result<ViewOutput, VmFailure> {
        let handler = match self.resolve(store, &payload.module, &payload.function) {
            Ok(handler) => handler,
            Err(status) => return Err(VmFailure::new(status, BASE_GAS.min(gas_balance))),
        };
        let mut frame = CallFrame::new(store, env, &[], &payload.ty_args, &payload.args, gas_balance);
        let outcome = handler(&mut frame);
        let ret = std::mem::take(&mut frame.ret);
        let result = frame.into_result(outcome, Some(&payload.module), false)?;
        Ok(ViewOutput {
            ret,
            events: result.events,
            gas_used: result.gas_used,
        })
    }

    fn authenticate(
        &mut self,
        _store: &mut dyn VmStore,
        _env: &VmEnv,
        gas_balance: u64,
        sender: AccountAddress,
        signature: &[u8],
    ) -> Result<AuthenticationOutput, VmFailure> {
        let gas_used = BASE_GAS.min(gas_balance);
        let authenticator = self.registry.authenticator.read().clone();
        let Some(authenticator) = authenticator else {
            return Err(VmFailure::new("UNSUPPORTED_AUTHENTICATION", gas_used));
        };
        authenticator(sender, signature)
            .map(|signer| AuthenticationOutput { signer, gas_used })
            .map_err(|status| VmFailure::new(status, gas_used))
    }

    fn initialize(
        &mut self,
        store: &mut dyn VmStore,
        _env: &VmEnv,
        module_bundle: &[Vec<u8>],
        allow_arbitrary: bool,
        _allowed_publishers: &[AccountAddress],
    ) -> Result<ExecutionResult, VmFailure> {
        let policy = if allow_arbitrary {
            UpgradePolicy::Arbitrary
        } else {
            UpgradePolicy::Compatible
        };
        match self.publish_bundle(store, None, module_bundle, policy) {
            Ok(()) => Ok(ExecutionResult {
                loaded_new_modules: true,
                ..ExecutionResult::default()
            }),
            Err(status) => Err(VmFailure {
                status,
                gas_used: 0,
                loaded_new_modules: true,
            }),
        }
    }

    fn flush_loader_cache(&mut self) {
        self.cache.clear();
        self.probe.flushes.fetch_add(1, Ordering::AcqRel);
    }
}
