//! # Domain Invariants
//!
//! Invariants that must hold for every VM result before the host applies it.
//! A result that violates one of these is treated as a VM fault, never as
//! something to partially apply.
//!
//! - Gas used never exceeds the gas balance handed to the VM
//! - A new account is reported at most once per result
//! - Staking deltas name a validator

use crate::domain::entities::ExecutionResult;
use std::collections::HashSet;

// =============================================================================
// INVARIANT CHECKS
// =============================================================================

/// The VM never reports more gas than the balance it was given.
#[must_use]
pub fn check_gas_budget_invariant(result: &ExecutionResult, gas_for_runtime: u64) -> bool {
    result.gas_used <= gas_for_runtime
}

/// Each new account appears once, so account numbers advance once per account.
#[must_use]
pub fn check_unique_new_accounts_invariant(result: &ExecutionResult) -> bool {
    let mut seen = HashSet::with_capacity(result.new_accounts.len());
    result.new_accounts.iter().all(|acc| seen.insert(acc.address))
}

/// Every staking delta targets a named validator.
#[must_use]
pub fn check_staking_delta_invariant(result: &ExecutionResult) -> bool {
    result
        .staking_deltas
        .iter()
        .all(|delta| !delta.validator.is_empty())
}

/// Check all invariants at once.
#[must_use]
pub fn check_all_invariants(result: &ExecutionResult, gas_for_runtime: u64) -> InvariantCheckResult {
    let mut violations = Vec::new();

    if !check_gas_budget_invariant(result, gas_for_runtime) {
        violations.push(InvariantViolation::GasBudgetExceeded {
            used: result.gas_used,
            budget: gas_for_runtime,
        });
    }

    if !check_unique_new_accounts_invariant(result) {
        violations.push(InvariantViolation::DuplicateNewAccount);
    }

    if !check_staking_delta_invariant(result) {
        violations.push(InvariantViolation::UnnamedValidator);
    }

    if violations.is_empty() {
        InvariantCheckResult::Valid
    } else {
        InvariantCheckResult::Invalid(violations)
    }
}

// =============================================================================
// INVARIANT TYPES
// =============================================================================

/// Result of checking all invariants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantCheckResult {
    /// All invariants hold.
    Valid,
    /// One or more invariants violated.
    Invalid(Vec<InvariantViolation>),
}

impl InvariantCheckResult {
    /// Returns true if all invariants hold.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Specific invariant violation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// VM reported more gas than it was given.
    GasBudgetExceeded {
        /// Gas the VM reported.
        used: u64,
        /// Gas balance handed to the VM.
        budget: u64,
    },
    /// The same address was reported as new twice.
    DuplicateNewAccount,
    /// A staking delta had an empty validator.
    UnnamedValidator,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GasBudgetExceeded { used, budget } => {
                write!(f, "gas budget exceeded: used {used} > budget {budget}")
            }
            Self::DuplicateNewAccount => write!(f, "duplicate new account in result"),
            Self::UnnamedValidator => write!(f, "staking delta without validator"),
        }
    }
}

// =============================================================================
// LIMIT CONSTANTS
// =============================================================================

/// Execution limits shared by the payload builder and the service defaults.
pub mod limits {
    /// Maximum module name length in bytes.
    pub const MAX_MODULE_NAME_LENGTH: usize = 128;

    /// Maximum function name length in bytes.
    pub const MAX_FUNCTION_NAME_LENGTH: usize = 128;

    /// Maximum number of type arguments per call.
    pub const MAX_TYPE_ARGS: usize = 16;

    /// Maximum module or script size in bytes.
    pub const MAX_CODE_SIZE: usize = 1024 * 1024; // 1 MiB

    /// Gas ceiling for simulation and `CheckTx` calls.
    pub const CONTRACT_SIMULATION_GAS_LIMIT: u64 = 3_000_000;

    /// Gas ceiling for view functions.
    pub const VIEW_GAS_LIMIT: u64 = 1_000_000;
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{NewAccount, StakingDelta};
    use crate::domain::value_objects::AccountAddress;

    #[test]
    fn test_gas_budget_invariant() {
        let result = ExecutionResult::with_gas(500);
        assert!(check_gas_budget_invariant(&result, 500));
        assert!(!check_gas_budget_invariant(&result, 499));
    }

    #[test]
    fn test_duplicate_new_account_detected() {
        let mut result = ExecutionResult::with_gas(1);
        let acc = NewAccount {
            address: AccountAddress::new([4u8; 32]),
            account_kind: 1,
        };
        result.new_accounts.push(acc.clone());
        assert!(check_unique_new_accounts_invariant(&result));
        result.new_accounts.push(acc);
        assert!(!check_unique_new_accounts_invariant(&result));
    }

    #[test]
    fn test_check_all_collects_violations() {
        let mut result = ExecutionResult::with_gas(10);
        result.staking_deltas.push(StakingDelta {
            validator: String::new(),
            metadata: AccountAddress::ONE,
            delegation: 1,
            undelegation: 0,
        });

        match check_all_invariants(&result, 5) {
            InvariantCheckResult::Invalid(violations) => {
                assert_eq!(violations.len(), 2);
                assert_eq!(
                    violations[0].to_string(),
                    "gas budget exceeded: used 10 > budget 5"
                );
                assert_eq!(violations[1], InvariantViolation::UnnamedValidator);
            }
            InvariantCheckResult::Valid => panic!("expected violations"),
        }
    }

    #[test]
    fn test_valid_result() {
        assert!(check_all_invariants(&ExecutionResult::with_gas(3), 3).is_valid());
    }
}
