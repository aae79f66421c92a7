//! # Domain Services
//!
//! Pure business logic functions for Move execution.
//! These functions are deterministic and have no side effects.
//!
//! - NO I/O operations
//! - NO async code
//! - Pure functions only

use crate::domain::entities::StakingDelta;
use crate::domain::value_objects::{AccountAddress, Coin, Coins, Decimal, Hash, U256};
use sha3::{Digest, Sha3_256};

/// Scheme byte appended when deriving named object addresses.
pub const OBJECT_FROM_SEED_SCHEME: u8 = 0xFE;

/// Prefix of denoms backed by Move-native fungible assets.
pub const MOVE_DENOM_PREFIX: &str = "move/";

// =============================================================================
// ADDRESS DERIVATION
// =============================================================================

/// Derives a named object address: `sha3_256(creator || seed || 0xFE)`.
#[must_use]
pub fn object_address(creator: &AccountAddress, seed: &[u8]) -> AccountAddress {
    let mut hasher = Sha3_256::new();
    hasher.update(creator.as_bytes());
    hasher.update(seed);
    hasher.update([OBJECT_FROM_SEED_SCHEME]);
    AccountAddress::new(hasher.finalize().into())
}

/// Fungible asset metadata address of a ledger denom.
///
/// Native coins are registered by the standard library under their denom.
#[must_use]
pub fn metadata_address(denom: &str) -> AccountAddress {
    match denom.strip_prefix(MOVE_DENOM_PREFIX) {
        Some(hex_part) => AccountAddress::from_hex_literal(hex_part)
            .unwrap_or_else(|| object_address(&AccountAddress::ONE, denom.as_bytes())),
        None => object_address(&AccountAddress::ONE, denom.as_bytes()),
    }
}

/// Ledger denom of a Move-native fungible asset.
#[must_use]
pub fn move_denom(metadata: &AccountAddress) -> String {
    format!("{MOVE_DENOM_PREFIX}{}", hex::encode(metadata.as_bytes()))
}

/// Address of a named module account: the first 20 bytes of
/// `sha3_256(name)`, zero-padded like any short ledger address.
#[must_use]
pub fn module_account_address(name: &str) -> AccountAddress {
    let digest: [u8; 32] = Sha3_256::digest(name.as_bytes()).into();
    let mut bytes = [0u8; 32];
    bytes[AccountAddress::LENGTH - AccountAddress::SHORT_LENGTH..]
        .copy_from_slice(&digest[..AccountAddress::SHORT_LENGTH]);
    AccountAddress::new(bytes)
}

/// Ledger account that holds the stake delegated to `validator` on behalf
/// of Move staking code.
#[must_use]
pub fn delegator_address(validator: &str) -> AccountAddress {
    let mut hasher = Sha3_256::new();
    hasher.update(b"move_staking/delegator/");
    hasher.update(validator.as_bytes());
    AccountAddress::new(hasher.finalize().into())
}

// =============================================================================
// SESSION ID
// =============================================================================

/// Derives the per-call session id: `sha3_256(tx_hash || counter_be)`.
///
/// Two calls in one transaction differ in counter, so their session ids
/// never collide.
#[must_use]
pub fn session_id(tx_hash: &Hash, execution_counter: u64) -> Hash {
    let mut hasher = Sha3_256::new();
    hasher.update(tx_hash.as_bytes());
    hasher.update(execution_counter.to_be_bytes());
    Hash::new(hasher.finalize().into())
}

// =============================================================================
// CONTRACT REVENUE
// =============================================================================

/// Revenue owed to a module owner: `floor(price * ratio * gas_used)`.
///
/// Computed on the raw fixed-point values so no intermediate rounding occurs.
#[must_use]
pub fn contract_revenue(gas_price: &Decimal, ratio: &Decimal, gas_used: u64) -> Option<U256> {
    let scale = Decimal::scale();
    gas_price
        .atomics()
        .checked_mul(ratio.atomics())?
        .checked_mul(U256::from(gas_used))
        .map(|product| product / scale / scale)
}

// =============================================================================
// STAKING DELTA AGGREGATION
// =============================================================================

/// Net staking change for one validator after aggregating every delta.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetStakingChange {
    /// Validator operator address.
    pub validator: String,
    /// Coins to delegate.
    pub delegation: Coins,
    /// Coins to undelegate.
    pub undelegation: Coins,
}

/// Aggregates deltas per validator and nets delegation against undelegation
/// per denom, so at most one direction is applied per (validator, denom).
///
/// Validators keep the order of their first appearance.
pub fn aggregate_staking_deltas<E>(
    deltas: &[StakingDelta],
    mut resolve_denom: impl FnMut(&AccountAddress) -> Result<String, E>,
) -> Result<Vec<NetStakingChange>, E> {
    // (validator, [(denom, delegated, undelegated)])
    let mut per_validator: Vec<(String, Vec<(String, u128, u128)>)> = Vec::new();

    for delta in deltas {
        let denom = resolve_denom(&delta.metadata)?;
        let idx = match per_validator.iter().position(|(v, _)| *v == delta.validator) {
            Some(idx) => idx,
            None => {
                per_validator.push((delta.validator.clone(), Vec::new()));
                per_validator.len() - 1
            }
        };
        let entries = &mut per_validator[idx].1;
        match entries.iter_mut().find(|(d, _, _)| *d == denom) {
            Some(entry) => {
                entry.1 += u128::from(delta.delegation);
                entry.2 += u128::from(delta.undelegation);
            }
            None => entries.push((
                denom,
                u128::from(delta.delegation),
                u128::from(delta.undelegation),
            )),
        }
    }

    Ok(per_validator
        .into_iter()
        .map(|(validator, entries)| {
            let mut delegation = Coins::new();
            let mut undelegation = Coins::new();
            for (denom, delegated, undelegated) in entries {
                if delegated > undelegated {
                    delegation.add(Coin::new(denom, U256::from(delegated - undelegated)));
                } else if undelegated > delegated {
                    undelegation.add(Coin::new(denom, U256::from(undelegated - delegated)));
                }
            }
            NetStakingChange {
                validator,
                delegation,
                undelegation,
            }
        })
        .collect())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(validator: &str, metadata: AccountAddress, delegation: u64, undelegation: u64) -> StakingDelta {
        StakingDelta {
            validator: validator.to_string(),
            metadata,
            delegation,
            undelegation,
        }
    }

    fn resolve(metadata: &AccountAddress) -> Result<String, String> {
        if *metadata == metadata_address("uinit") {
            Ok("uinit".to_string())
        } else {
            Ok(move_denom(metadata))
        }
    }

    #[test]
    fn test_session_id_differs_per_counter() {
        let tx = Hash::new([3u8; 32]);
        assert_ne!(session_id(&tx, 1), session_id(&tx, 2));
        assert_eq!(session_id(&tx, 1), session_id(&tx, 1));
    }

    #[test]
    fn test_metadata_and_move_denom_roundtrip() {
        let metadata = object_address(&AccountAddress::new([5u8; 32]), b"token");
        let denom = move_denom(&metadata);
        assert!(denom.starts_with("move/"));
        assert_eq!(metadata_address(&denom), metadata);
        assert_ne!(metadata_address("uinit"), metadata_address("uatom"));
    }

    #[test]
    fn test_module_account_address_is_short() {
        let addr = module_account_address("fee_collector");
        assert_eq!(addr.to_ledger_bytes().len(), AccountAddress::SHORT_LENGTH);
        assert_ne!(addr, module_account_address("move_staking"));
    }

    #[test]
    fn test_contract_revenue_floor() {
        let price = Decimal::parse("0.15").unwrap();
        let ratio = Decimal::parse("0.5").unwrap();
        // 0.15 * 0.5 * 1001 = 75.075
        assert_eq!(contract_revenue(&price, &ratio, 1001), Some(U256::from(75)));
        assert_eq!(contract_revenue(&price, &Decimal::zero(), 1001), Some(U256::zero()));
    }

    #[test]
    fn test_aggregate_nets_delegation_against_undelegation() {
        let uinit = metadata_address("uinit");
        let deltas = vec![
            delta("valoper1", uinit, 100, 0),
            delta("valoper1", uinit, 0, 30),
        ];
        let changes = aggregate_staking_deltas(&deltas, resolve).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].delegation.amount_of("uinit"), U256::from(70));
        assert!(changes[0].undelegation.is_zero());
    }

    #[test]
    fn test_aggregate_keeps_first_seen_validator_order() {
        let uinit = metadata_address("uinit");
        let deltas = vec![
            delta("valoper2", uinit, 5, 0),
            delta("valoper1", uinit, 0, 8),
            delta("valoper2", uinit, 5, 0),
        ];
        let changes = aggregate_staking_deltas(&deltas, resolve).unwrap();
        assert_eq!(changes[0].validator, "valoper2");
        assert_eq!(changes[0].delegation.amount_of("uinit"), U256::from(10));
        assert_eq!(changes[1].validator, "valoper1");
        assert_eq!(changes[1].undelegation.amount_of("uinit"), U256::from(8));
    }

    #[test]
    fn test_aggregate_fully_cancelled_delta_is_empty() {
        let uinit = metadata_address("uinit");
        let deltas = vec![delta("valoper1", uinit, 40, 40)];
        let changes = aggregate_staking_deltas(&deltas, resolve).unwrap();
        assert!(changes[0].delegation.is_zero());
        assert!(changes[0].undelegation.is_zero());
    }

    #[test]
    fn test_aggregate_propagates_resolver_error() {
        let deltas = vec![delta("valoper1", AccountAddress::ZERO, 1, 0)];
        let result = aggregate_staking_deltas(&deltas, |_| Err::<String, _>("unknown metadata"));
        assert_eq!(result.unwrap_err(), "unknown metadata");
    }
}
