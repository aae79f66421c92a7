//! # Gas Bridge
//!
//! Converts the host meter's state into the gas balance handed to the VM,
//! and charges the VM-reported usage back to the host meter afterwards.
//!
//! While the VM runs, the host meter is replaced by an [`InfiniteGasMeter`]
//! so store accesses made on the VM's behalf are not charged twice. The whole
//! cost is charged once, as a lump sum, against the original meter.

use crate::context::ExecutionContext;
use crate::errors::GasError;
use crate::ports::outbound::GasMeter;
use serde::{Deserialize, Serialize};
use std::mem;

/// Descriptor used when charging VM-reported gas.
pub const VM_GAS_DESCRIPTOR: &str = "move vm execution";

// =============================================================================
// GAS METERS
// =============================================================================

/// A gas meter with a fixed limit. A zero limit never runs out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LimitedGasMeter {
    /// Gas limit for this meter.
    limit: u64,
    /// Gas consumed so far.
    consumed: u64,
}

impl LimitedGasMeter {
    /// Creates a meter with the given limit.
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self { limit, consumed: 0 }
    }
}

impl GasMeter for LimitedGasMeter {
    fn limit(&self) -> u64 {
        self.limit
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Running out burns the whole limit.
    fn consume(&mut self, amount: u64, descriptor: &str) -> Result<(), GasError> {
        let total = self.consumed.saturating_add(amount);
        if self.limit != 0 && total > self.limit {
            let consumed = self.consumed;
            self.consumed = self.limit;
            return Err(GasError::OutOfGas {
                descriptor: descriptor.to_string(),
                limit: self.limit,
                consumed,
                requested: amount,
            });
        }
        self.consumed = total;
        Ok(())
    }
}

/// Meter that counts but never fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InfiniteGasMeter {
    consumed: u64,
}

impl InfiniteGasMeter {
    /// Creates an empty meter.
    #[must_use]
    pub const fn new() -> Self {
        Self { consumed: 0 }
    }
}

impl GasMeter for InfiniteGasMeter {
    fn limit(&self) -> u64 {
        0
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }

    fn consume(&mut self, amount: u64, _descriptor: &str) -> Result<(), GasError> {
        self.consumed = self.consumed.saturating_add(amount);
        Ok(())
    }
}

// =============================================================================
// STORE ACCESS COSTS
// =============================================================================

/// Gas charged per store access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvGasConfig {
    /// Flat cost of a read.
    pub read_cost_flat: u64,
    /// Cost per byte read.
    pub read_cost_per_byte: u64,
    /// Flat cost of a write.
    pub write_cost_flat: u64,
    /// Cost per byte written.
    pub write_cost_per_byte: u64,
    /// Cost of a delete.
    pub delete_cost: u64,
    /// Flat cost of an iterator step.
    pub iter_next_cost_flat: u64,
}

impl Default for KvGasConfig {
    fn default() -> Self {
        Self {
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
            delete_cost: 1000,
            iter_next_cost_flat: 30,
        }
    }
}

impl KvGasConfig {
    /// Cost of reading `len` bytes (key plus value).
    #[must_use]
    pub fn read_cost(&self, len: usize) -> u64 {
        self.read_cost_flat
            .saturating_add(self.read_cost_per_byte.saturating_mul(len as u64))
    }

    /// Cost of writing `len` bytes (key plus value).
    #[must_use]
    pub fn write_cost(&self, len: usize) -> u64 {
        self.write_cost_flat
            .saturating_add(self.write_cost_per_byte.saturating_mul(len as u64))
    }
}

// =============================================================================
// BRIDGE OPERATIONS
// =============================================================================

/// Gas balance for the VM.
///
/// Simulation and `CheckTx` use the fixed simulation limit. Otherwise it is
/// whatever the host meter has left, or `u64::MAX` for an infinite meter.
#[must_use]
pub fn gas_for_runtime(ctx: &ExecutionContext, simulation_gas_limit: u64) -> u64 {
    if ctx.is_simulation || ctx.is_check_tx {
        return simulation_gas_limit;
    }
    if ctx.gas_meter.is_infinite() {
        u64::MAX
    } else {
        ctx.gas_meter
            .limit()
            .saturating_sub(ctx.gas_meter.consumed())
    }
}

/// Runs `f` with the host meter swapped for an infinite one, and puts the
/// original meter back before returning.
///
/// The closure is synchronous, so nothing can observe the substitute meter
/// once this returns.
pub fn run_delegated<T>(
    ctx: &mut ExecutionContext,
    f: impl FnOnce(&mut ExecutionContext) -> T,
) -> T {
    let original = mem::replace(&mut ctx.gas_meter, Box::new(InfiniteGasMeter::new()));
    let output = f(ctx);
    ctx.gas_meter = original;
    output
}

/// Charges VM-reported usage against the (restored) host meter.
pub fn charge(ctx: &mut ExecutionContext, gas_used: u64) -> Result<(), GasError> {
    ctx.gas_meter.consume(gas_used, VM_GAS_DESCRIPTOR)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(limit: u64) -> ExecutionContext {
        ExecutionContext::new("test-1", 1, 0, limit)
    }

    #[test]
    fn test_limited_meter_out_of_gas_burns_limit() {
        let mut meter = LimitedGasMeter::new(1000);
        assert!(meter.consume(600, "a").is_ok());
        assert_eq!(meter.remaining(), 400);

        let err = meter.consume(500, "b").unwrap_err();
        assert!(matches!(err, GasError::OutOfGas { consumed: 600, requested: 500, .. }));
        assert_eq!(meter.consumed(), 1000);
    }

    #[test]
    fn test_zero_limit_is_infinite() {
        let mut meter = LimitedGasMeter::new(0);
        assert!(meter.is_infinite());
        assert!(meter.consume(u64::MAX, "a").is_ok());
        assert_eq!(meter.remaining(), u64::MAX);
    }

    #[test]
    fn test_gas_for_runtime_finite() {
        let mut c = ctx(10_000);
        c.gas_meter.consume(2_500, "ante").unwrap();
        assert_eq!(gas_for_runtime(&c, 3_000_000), 7_500);
    }

    #[test]
    fn test_gas_for_runtime_infinite_meter() {
        assert_eq!(gas_for_runtime(&ctx(0), 3_000_000), u64::MAX);
    }

    #[test]
    fn test_gas_for_runtime_simulation_ignores_host_limit() {
        let c = ctx(100).with_simulation(true);
        assert_eq!(gas_for_runtime(&c, 3_000_000), 3_000_000);
        let c = ctx(100).with_check_tx(true);
        assert_eq!(gas_for_runtime(&c, 42), 42);
    }

    #[test]
    fn test_run_delegated_restores_original_meter() {
        let mut c = ctx(1_000);
        let inner_limit = run_delegated(&mut c, |c| {
            c.gas_meter.consume(50_000, "store write").unwrap();
            c.gas_meter.limit()
        });
        assert_eq!(inner_limit, 0);
        assert_eq!(c.gas_meter.limit(), 1_000);
        assert_eq!(c.gas_meter.consumed(), 0);

        charge(&mut c, 300).unwrap();
        assert_eq!(c.gas_meter.consumed(), 300);
    }

    #[test]
    fn test_kv_costs() {
        let config = KvGasConfig::default();
        assert_eq!(config.read_cost(10), 1030);
        assert_eq!(config.write_cost(10), 2300);
    }
}
