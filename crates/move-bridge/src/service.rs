//! # Move Bridge Service
//!
//! The execution pipeline. One call moves through
//! `Built → GasDelegated → Running → Completed | Failed`:
//!
//! 1. the payload builder validates and encodes the call
//! 2. the VM gets `gas_for_runtime` and the host meter is swapped out
//! 3. an engine is lent from the pool, or an isolated one is created for
//!    CheckTx and simulation
//! 4. the VM runs against the resource store
//! 5. the engine goes back to the pool and the host meter is charged once
//! 6. on success the result applier commits the side effects
//!
//! There is no retry. Nested calls (from staking deposits and `MsgExecute`
//! messages) re-enter the pipeline after the parent's engine is released.

use crate::context::ExecutionContext;
use crate::domain::entities::{
    AuthenticationOutput, BridgeParams, CallKind, EntryFunction, ExecutionResult, Script,
    UpgradePolicy, ViewOutput, VmConfig, VmEnv, VmFailure,
};
use crate::domain::invariants::{check_all_invariants, limits, InvariantCheckResult};
use crate::domain::services::session_id;
use crate::domain::value_objects::{AccountAddress, Decimal};
use crate::errors::BridgeError;
use crate::events::LedgerEvent;
use crate::gas::{charge, gas_for_runtime, run_delegated, KvGasConfig};
use crate::loader_guard::LoaderCacheGuard;
use crate::payload::PayloadBuilder;
use crate::pool::{EngineLease, EnginePool};
use crate::ports::inbound::{
    ExecuteOutput, ExecuteRequest, MoveBridgeApi, PublishRequest, ScriptRequest, ViewRequest,
};
use crate::ports::outbound::{
    AccountKeeper, BankKeeper, EngineFactory, KvStore, MessageRouter, StakingKeeper,
};
use crate::store::{GenesisState, ResourceStore, VmStoreAdapter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

/// Boxed future used where the pipeline recurses.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Move bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Payload limits.
    pub vm_config: VmConfig,
    /// On-chain module parameters.
    pub params: BridgeParams,
    /// Number of pooled engines.
    pub pool_size: usize,
    /// Gas balance for CheckTx and simulation calls.
    pub contract_simulation_gas_limit: u64,
    /// Gas ceiling for view functions.
    pub view_gas_limit: u64,
    /// Longest wait for a pooled engine when the context has no deadline.
    pub acquire_timeout: Option<Duration>,
    /// Host store-cost schedule for VM store accesses. During a VM run
    /// these costs land on the substitute infinite meter and are discarded;
    /// the caller is charged only the gas the VM reports.
    pub kv_gas: KvGasConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            vm_config: VmConfig::default(),
            params: BridgeParams::default(),
            pool_size: num_cpus::get(),
            contract_simulation_gas_limit: limits::CONTRACT_SIMULATION_GAS_LIMIT,
            view_gas_limit: limits::VIEW_GAS_LIMIT,
            acquire_timeout: None,
            kv_gas: KvGasConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Rejects configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.pool_size == 0 {
            return Err(BridgeError::Config("pool_size must be positive".into()));
        }
        if self.params.contract_shared_revenue_ratio > Decimal::one() {
            return Err(BridgeError::Config(format!(
                "contract_shared_revenue_ratio {} exceeds 1",
                self.params.contract_shared_revenue_ratio
            )));
        }
        if self.params.base_denom.is_empty() {
            return Err(BridgeError::Config("base_denom must be set".into()));
        }
        Ok(())
    }
}

/// Statistics for the Move bridge.
#[derive(Debug, Default, Clone)]
pub struct ServiceStats {
    /// Successful VM calls, nested ones included.
    pub calls_executed: u64,
    /// Failed VM calls.
    pub calls_failed: u64,
    /// Calls that ran on an isolated engine.
    pub simulated_calls: u64,
    /// View calls.
    pub view_calls: u64,
    /// Total gas charged for VM execution.
    pub total_vm_gas: u64,
    /// Loader cache invalidations triggered by failed transactions.
    pub loader_flushes: u64,
}

// =============================================================================
// SERVICE
// =============================================================================

/// Ledger collaborators the bridge calls into.
#[derive(Clone)]
pub struct Keepers {
    /// Account store.
    pub accounts: Arc<dyn AccountKeeper>,
    /// Balances.
    pub bank: Arc<dyn BankKeeper>,
    /// Staking.
    pub staking: Arc<dyn StakingKeeper>,
    /// Message handlers.
    pub router: Arc<dyn MessageRouter>,
}

/// A VM invocation that commits state.
#[derive(Clone, Copy)]
enum VmCall<'p> {
    Entry {
        senders: &'p [AccountAddress],
        payload: &'p EntryFunction,
    },
    Script {
        senders: &'p [AccountAddress],
        payload: &'p Script,
    },
    Initialize {
        bundle: &'p [Vec<u8>],
        allow_arbitrary: bool,
        allowed_publishers: &'p [AccountAddress],
    },
}

impl VmCall<'_> {
    fn kind(&self) -> CallKind {
        match self {
            Self::Entry { .. } => CallKind::EntryFunction,
            Self::Script { .. } => CallKind::Script,
            Self::Initialize { .. } => CallKind::Initialize,
        }
    }
}

/// The Move execution bridge.
pub struct MoveBridge {
    pub(crate) config: ServiceConfig,
    pub(crate) store: ResourceStore,
    pool: EnginePool,
    engine_factory: Arc<dyn EngineFactory>,
    pub(crate) keepers: Keepers,
    pub(crate) payloads: PayloadBuilder,
    loader_guard: LoaderCacheGuard,
    stats: RwLock<ServiceStats>,
}

impl MoveBridge {
    /// Creates the bridge and fills the engine pool.
    pub fn new(
        config: ServiceConfig,
        kv: Arc<dyn KvStore>,
        engine_factory: Arc<dyn EngineFactory>,
        keepers: Keepers,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let pool = EnginePool::new(engine_factory.as_ref(), config.pool_size)?;
        info!(pool_size = config.pool_size, "Move bridge started");
        Ok(Self {
            payloads: PayloadBuilder::new(config.vm_config.clone()),
            store: ResourceStore::new(kv),
            pool,
            engine_factory,
            keepers,
            loader_guard: LoaderCacheGuard::new(),
            stats: RwLock::new(ServiceStats::default()),
            config,
        })
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The VM resource store.
    #[must_use]
    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// The engine pool.
    #[must_use]
    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    /// Get current service statistics.
    pub async fn stats(&self) -> ServiceStats {
        self.stats.read().await.clone()
    }

    /// Imports genesis, then publishes `stdlib` when the genesis carries no
    /// modules of its own. The stdlib publish counts on top of the imported
    /// execution counter.
    pub async fn init_genesis(
        &self,
        ctx: &mut ExecutionContext,
        stdlib: Vec<Vec<u8>>,
        state: &GenesisState,
    ) -> Result<(), BridgeError> {
        self.store.import_genesis(state)?;
        if state.modules.is_empty() {
            self.initialize(ctx, stdlib).await?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    /// Runs an entry function and applies its result. Boxed because result
    /// application can call back in.
    pub(crate) fn execute_entry<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        senders: Vec<AccountAddress>,
        payload: EntryFunction,
    ) -> BoxFuture<'a, Result<ExecuteOutput, BridgeError>> {
        Box::pin(async move {
            let result = self
                .run_vm(
                    ctx,
                    VmCall::Entry {
                        senders: &senders,
                        payload: &payload,
                    },
                )
                .await?;
            ctx.events
                .emit(LedgerEvent::execute(&senders, &payload.module, &payload.function));
            self.apply_execution_result(ctx, &senders, result).await
        })
    }

    async fn run_vm(
        &self,
        ctx: &mut ExecutionContext,
        call: VmCall<'_>,
    ) -> Result<ExecutionResult, BridgeError> {
        let gas_balance = gas_for_runtime(ctx, self.config.contract_simulation_gas_limit);
        let counter = self.store.next_execution_counter()?;
        let env = self.vm_env(ctx, counter)?;
        let isolated = ctx.uses_isolated_engine();

        let mut lease = self
            .lease_engine(isolated, ctx.cancellation.clone(), ctx.deadline)
            .await?;
        let pooled = lease.is_pooled();
        let kv_gas = self.config.kv_gas;
        let engine = lease.engine_mut()?;

        trace!(call = call.kind().as_str(), gas_balance, counter, pooled, "Running Move VM");
        let outcome = run_delegated(ctx, |ctx| {
            let mut store = VmStoreAdapter::new(&self.store, ctx.gas_meter.as_mut(), kv_gas);
            match call {
                VmCall::Entry { senders, payload } => {
                    engine.execute_entry_function(&mut store, &env, gas_balance, senders, payload)
                }
                VmCall::Script { senders, payload } => {
                    engine.execute_script(&mut store, &env, gas_balance, senders, payload)
                }
                VmCall::Initialize {
                    bundle,
                    allow_arbitrary,
                    allowed_publishers,
                } => engine.initialize(&mut store, &env, bundle, allow_arbitrary, allowed_publishers),
            }
        });
        drop(lease);

        self.settle(ctx, call.kind(), gas_balance, pooled, outcome).await
    }

    /// Charges gas for a finished VM call and turns the outcome into a
    /// checked result.
    async fn settle(
        &self,
        ctx: &mut ExecutionContext,
        kind: CallKind,
        gas_balance: u64,
        pooled: bool,
        outcome: Result<ExecutionResult, VmFailure>,
    ) -> Result<ExecutionResult, BridgeError> {
        let isolated = ctx.uses_isolated_engine();
        match outcome {
            Err(failure) => {
                if pooled {
                    self.loader_guard.record(failure.loaded_new_modules);
                }
                warn!(
                    call = kind.as_str(),
                    status = %failure.status,
                    gas_used = failure.gas_used,
                    "Move VM call failed"
                );
                self.record_call(isolated, failure.gas_used, false).await;
                charge(ctx, failure.gas_used)?;
                Err(BridgeError::VmExecution {
                    status: failure.status,
                    gas_used: failure.gas_used,
                })
            }
            Ok(result) => {
                if pooled {
                    self.loader_guard.record(result.loaded_new_modules);
                }
                if let InvariantCheckResult::Invalid(violations) =
                    check_all_invariants(&result, gas_balance)
                {
                    let reason = violations
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ");
                    error!(call = kind.as_str(), %reason, "Move VM result rejected");
                    self.record_call(isolated, 0, false).await;
                    return Err(BridgeError::InvalidVmResult(reason));
                }
                self.record_call(isolated, result.gas_used, true).await;
                charge(ctx, result.gas_used)?;
                debug!(
                    call = kind.as_str(),
                    gas_used = result.gas_used,
                    events = result.events.len(),
                    messages = result.messages.len(),
                    "Move VM call completed"
                );
                Ok(result)
            }
        }
    }

    async fn lease_engine(
        &self,
        isolated: bool,
        cancel: CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<EngineLease<'_>, BridgeError> {
        if isolated {
            trace!("Creating isolated engine");
            return Ok(EngineLease::Isolated(self.engine_factory.create()));
        }
        let deadline =
            deadline.or_else(|| self.config.acquire_timeout.map(|timeout| Instant::now() + timeout));
        Ok(EngineLease::Pooled(self.pool.acquire(&cancel, deadline).await?))
    }

    fn vm_env(&self, ctx: &ExecutionContext, counter: u64) -> Result<VmEnv, BridgeError> {
        Ok(VmEnv {
            chain_id: ctx.chain_id.clone(),
            block_height: ctx.block_height,
            block_timestamp: ctx.block_time,
            next_account_number: self.keepers.accounts.peek_account_number()?,
            tx_hash: ctx.tx_hash,
            session_id: session_id(&ctx.tx_hash, counter),
        })
    }

    async fn record_call(&self, isolated: bool, gas_used: u64, success: bool) {
        let mut stats = self.stats.write().await;
        if success {
            stats.calls_executed += 1;
        } else {
            stats.calls_failed += 1;
        }
        if isolated {
            stats.simulated_calls += 1;
        }
        stats.total_vm_gas = stats.total_vm_gas.saturating_add(gas_used);
    }
}

// =============================================================================
// API IMPLEMENTATION
// =============================================================================

#[async_trait]
impl MoveBridgeApi for MoveBridge {
    #[instrument(skip(self, ctx, request), fields(module = %request.module_name, function = %request.function_name))]
    async fn execute_entry_function(
        &self,
        ctx: &mut ExecutionContext,
        request: ExecuteRequest,
    ) -> Result<ExecuteOutput, BridgeError> {
        if request.senders.is_empty() {
            return Err(BridgeError::InvalidRequest("no senders".into()));
        }
        let payload = self.payloads.build_entry_function(
            request.module_address,
            &request.module_name,
            &request.function_name,
            &request.type_args,
            request.args,
        )?;
        self.execute_entry(ctx, request.senders, payload).await
    }

    #[instrument(skip(self, ctx, request), fields(code_len = request.code.len()))]
    async fn execute_script(
        &self,
        ctx: &mut ExecutionContext,
        request: ScriptRequest,
    ) -> Result<ExecuteOutput, BridgeError> {
        if !self.config.params.script_enabled {
            return Err(BridgeError::Unauthorized("script execution is disabled".into()));
        }
        if request.senders.is_empty() {
            return Err(BridgeError::InvalidRequest("no senders".into()));
        }
        let payload = self
            .payloads
            .build_script(request.code, &request.type_args, request.args)?;
        let result = self
            .run_vm(
                ctx,
                VmCall::Script {
                    senders: &request.senders,
                    payload: &payload,
                },
            )
            .await?;
        ctx.events.emit(LedgerEvent::script(&request.senders));
        self.apply_execution_result(ctx, &request.senders, result).await
    }

    #[instrument(skip(self, ctx, request), fields(module = %request.module_name, function = %request.function_name))]
    async fn execute_view_function(
        &self,
        ctx: &mut ExecutionContext,
        request: ViewRequest,
    ) -> Result<ViewOutput, BridgeError> {
        let payload = self.payloads.build_view_function(
            request.module_address,
            &request.module_name,
            &request.function_name,
            &request.type_args,
            request.args,
        )?;
        let gas_balance = self.config.view_gas_limit;
        let env = self.vm_env(ctx, self.store.execution_counter()?)?;
        let mut engine = self.engine_factory.create();
        let kv_gas = self.config.kv_gas;

        let outcome = run_delegated(ctx, |ctx| {
            let mut store = VmStoreAdapter::read_only(&self.store, ctx.gas_meter.as_mut(), kv_gas);
            engine.execute_view_function(&mut store, &env, gas_balance, &payload)
        });
        self.stats.write().await.view_calls += 1;

        match outcome {
            Err(failure) => {
                debug!(status = %failure.status, "View function failed");
                charge(ctx, failure.gas_used)?;
                Err(BridgeError::VmExecution {
                    status: failure.status,
                    gas_used: failure.gas_used,
                })
            }
            Ok(output) if output.gas_used > gas_balance => Err(BridgeError::InvalidVmResult(format!(
                "view used {} gas over a balance of {gas_balance}",
                output.gas_used
            ))),
            Ok(output) => {
                charge(ctx, output.gas_used)?;
                Ok(output)
            }
        }
    }

    #[instrument(skip(self, ctx, signature), fields(sender = %sender))]
    async fn execute_authenticate(
        &self,
        ctx: &mut ExecutionContext,
        sender: AccountAddress,
        signature: Vec<u8>,
    ) -> Result<AuthenticationOutput, BridgeError> {
        let gas_balance = gas_for_runtime(ctx, self.config.contract_simulation_gas_limit);
        let env = self.vm_env(ctx, self.store.execution_counter()?)?;
        let mut lease = self
            .lease_engine(ctx.uses_isolated_engine(), ctx.cancellation.clone(), ctx.deadline)
            .await?;
        let kv_gas = self.config.kv_gas;
        let engine = lease.engine_mut()?;

        let outcome = run_delegated(ctx, |ctx| {
            let mut store = VmStoreAdapter::new(&self.store, ctx.gas_meter.as_mut(), kv_gas);
            engine.authenticate(&mut store, &env, gas_balance, sender, &signature)
        });
        drop(lease);

        match outcome {
            Err(failure) => {
                warn!(status = %failure.status, "Authentication failed");
                charge(ctx, failure.gas_used)?;
                Err(BridgeError::VmExecution {
                    status: failure.status,
                    gas_used: failure.gas_used,
                })
            }
            Ok(output) => {
                charge(ctx, output.gas_used)?;
                debug!(signer = %output.signer, "Authenticated");
                Ok(output)
            }
        }
    }

    #[instrument(skip(self, ctx, request), fields(sender = %request.sender, modules = request.modules.len()))]
    async fn publish(
        &self,
        ctx: &mut ExecutionContext,
        request: PublishRequest,
    ) -> Result<ExecuteOutput, BridgeError> {
        let params = &self.config.params;
        if !params.allowed_publishers.is_empty() && !params.allowed_publishers.contains(&request.sender)
        {
            return Err(BridgeError::Unauthorized(format!(
                "{} is not an allowed publisher",
                request.sender
            )));
        }
        if request.upgrade_policy == UpgradePolicy::Arbitrary && !params.allow_arbitrary {
            return Err(BridgeError::Unauthorized(
                "arbitrary upgrade policy is not allowed".into(),
            ));
        }
        let payload = self
            .payloads
            .build_publish(&request.modules, request.upgrade_policy)?;
        self.execute_entry(ctx, vec![request.sender], payload).await
    }

    #[instrument(skip(self, ctx, module_bundle), fields(modules = module_bundle.len()))]
    async fn initialize(
        &self,
        ctx: &mut ExecutionContext,
        module_bundle: Vec<Vec<u8>>,
    ) -> Result<(), BridgeError> {
        if self.store.has_modules()? {
            debug!("Store already holds modules, skipping initialization");
            return Ok(());
        }
        let params = &self.config.params;
        let result = self
            .run_vm(
                ctx,
                VmCall::Initialize {
                    bundle: &module_bundle,
                    allow_arbitrary: params.allow_arbitrary,
                    allowed_publishers: &params.allowed_publishers,
                },
            )
            .await?;
        self.apply_execution_result(ctx, &[AccountAddress::ONE], result)
            .await?;
        info!(modules = module_bundle.len(), "Standard library published");
        Ok(())
    }

    async fn import_genesis(&self, state: &GenesisState) -> Result<(), BridgeError> {
        Ok(self.store.import_genesis(state)?)
    }

    async fn export_genesis(&self) -> Result<GenesisState, BridgeError> {
        Ok(self.store.export_genesis()?)
    }

    async fn post_transaction(&self, success: bool) -> bool {
        let flushed = self.loader_guard.post_transaction(success, &self.pool);
        if flushed {
            self.stats.write().await.loader_flushes += 1;
        }
        flushed
    }
}

// =============================================================================
// TESTS
// =============================================================================
