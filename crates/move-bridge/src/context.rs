//! # Execution Context
//!
//! Per-call state passed down the pipeline: block info, the host gas meter,
//! the event collector, and cancellation. Flags that hosts often smuggle
//! through untyped context maps (`is_simulation`, `gas_price_hint`) are
//! typed fields here.

use crate::domain::value_objects::{DecCoin, Hash};
use crate::events::EventManager;
use crate::gas::LimitedGasMeter;
use crate::ports::outbound::GasMeter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call execution context.
pub struct ExecutionContext {
    /// Chain identifier.
    pub chain_id: String,
    /// Current block height.
    pub block_height: u64,
    /// Current block time (unix seconds).
    pub block_time: u64,
    /// Hash of the enclosing transaction.
    pub tx_hash: Hash,
    /// Mempool admission check.
    pub is_check_tx: bool,
    /// Gas simulation.
    pub is_simulation: bool,
    /// Fee paid per gas unit, when the ante handler recorded one.
    pub gas_price_hint: Option<DecCoin>,
    /// Host gas meter. Swapped for an infinite meter while the VM runs.
    pub gas_meter: Box<dyn GasMeter>,
    /// Events emitted so far in this transaction.
    pub events: EventManager,
    /// Cancels a pending engine acquisition.
    pub cancellation: CancellationToken,
    /// Deadline for a pending engine acquisition.
    pub deadline: Option<Instant>,
}

impl ExecutionContext {
    /// Creates a delivery-mode context with a meter of `gas_limit`
    /// (zero for infinite).
    #[must_use]
    pub fn new(chain_id: impl Into<String>, block_height: u64, block_time: u64, gas_limit: u64) -> Self {
        Self {
            chain_id: chain_id.into(),
            block_height,
            block_time,
            tx_hash: Hash::ZERO,
            is_check_tx: false,
            is_simulation: false,
            gas_price_hint: None,
            gas_meter: Box::new(LimitedGasMeter::new(gas_limit)),
            events: EventManager::new(),
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Sets the transaction hash.
    #[must_use]
    pub fn with_tx_hash(mut self, tx_hash: Hash) -> Self {
        self.tx_hash = tx_hash;
        self
    }

    /// Marks the context as a mempool admission check.
    #[must_use]
    pub fn with_check_tx(mut self, is_check_tx: bool) -> Self {
        self.is_check_tx = is_check_tx;
        self
    }

    /// Marks the context as a gas simulation.
    #[must_use]
    pub fn with_simulation(mut self, is_simulation: bool) -> Self {
        self.is_simulation = is_simulation;
        self
    }

    /// Records the fee paid per gas unit.
    #[must_use]
    pub fn with_gas_price(mut self, price: DecCoin) -> Self {
        self.gas_price_hint = Some(price);
        self
    }

    /// Replaces the gas meter.
    #[must_use]
    pub fn with_gas_meter(mut self, meter: Box<dyn GasMeter>) -> Self {
        self.gas_meter = meter;
        self
    }

    /// Uses `token` for cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Bounds engine acquisition by `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Calls in this context run on a disposable engine, never a pooled one.
    #[must_use]
    pub fn uses_isolated_engine(&self) -> bool {
        self.is_check_tx || self.is_simulation
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("chain_id", &self.chain_id)
            .field("block_height", &self.block_height)
            .field("tx_hash", &self.tx_hash)
            .field("is_check_tx", &self.is_check_tx)
            .field("is_simulation", &self.is_simulation)
            .field("gas_limit", &self.gas_meter.limit())
            .field("gas_consumed", &self.gas_meter.consumed())
            .finish_non_exhaustive()
    }
}
