//! # End-to-End Tests for the Move Bridge
//!
//! Drives the bridge through its public API over the in-memory adapters and
//! the scripted engine.
//!
//! ## Test Categories
//!
//! 1. **Execution** - entry functions, scripts, gas accounting
//! 2. **Result Application** - accounts, revenue, staking, messages
//! 3. **Loader Cache** - stale modules after a rolled-back publish
//! 4. **Genesis** - export and import of the VM store
//! 5. **Cancellation** - waiting for an engine

use move_bridge::adapters::harness::{addr, coin_module, TestHarness, TEST_DENOM};
use move_bridge::adapters::{CallFrame, Transfer};
use move_bridge::domain::entities::{BondStatus, GasUsage, LedgerAccount, Validator};
use move_bridge::domain::services::module_account_address;
use move_bridge::messages::{AssetAmount, IbcTimeout, IbcTransfer, LedgerMessage, OutboundMessage};
use move_bridge::prelude::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// =============================================================================
// TEST HELPERS
// =============================================================================

const VALIDATOR: &str = "initvaloper1test";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn uinit(amount: u64) -> Coins {
    Coins::from(Coin::new(TEST_DENOM, amount))
}

fn module(address: AccountAddress, name: &str) -> ModuleId {
    ModuleId::new(address, Identifier::new(name).unwrap())
}

fn call(sender: AccountAddress, function: &str, args: Vec<Vec<u8>>) -> ExecuteRequest {
    ExecuteRequest::new(sender, AccountAddress::ONE, "coin", function, args)
}

/// `0x1::coin::mint(amount: u64)` emits `{account, amount}`.
fn register_mint(h: &TestHarness) {
    h.factory.register(coin_module(), "mint", |frame: &mut CallFrame<'_>| {
        let amount: u64 = frame.arg(0)?;
        let account = frame.sender()?;
        frame.events.push(JsonEvent::new(
            "0x1::coin::MintEvent",
            serde_json::json!({ "account": account.to_string(), "amount": amount.to_string() })
                .to_string(),
        ));
        Ok(())
    });
}

async fn publish(h: &TestHarness, sender: AccountAddress, name: &str) {
    let mut ctx = h.ctx(0);
    h.bridge
        .publish(
            &mut ctx,
            PublishRequest {
                sender,
                modules: vec![h.module_blob(sender, name)],
                upgrade_policy: UpgradePolicy::Compatible,
            },
        )
        .await
        .unwrap();
}

// =============================================================================
// EXECUTION
// =============================================================================

#[tokio::test]
async fn test_mint_emits_move_event_and_charges_caller() {
    init_tracing();
    let h = TestHarness::new();
    register_mint(&h);
    h.publish_coin_module().await;

    let mut ctx = h.ctx(1_000_000);
    let output = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "mint", vec![bcs::to_bytes(&100u64).unwrap()]))
        .await
        .unwrap();

    let event = ctx.events.of_kind("move").next().unwrap();
    assert_eq!(event.attribute("type_tag"), Some("0x1::coin::MintEvent"));
    assert_eq!(event.attribute("account"), Some("0x2"));
    assert_eq!(event.attribute("amount"), Some("100"));

    assert!(output.gas_used > 0);
    assert_eq!(ctx.gas_meter.consumed(), output.gas_used);
    assert_eq!(ctx.gas_meter.remaining(), 1_000_000 - output.gas_used);
    assert_eq!(output.event_count, 1);
    assert!(!output.loaded_new_modules);
}

#[tokio::test]
async fn test_unknown_function_fails_with_gas_charged() {
    let h = TestHarness::new();
    h.publish_coin_module().await;

    let mut ctx = h.ctx(1_000_000);
    let err = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "missing", vec![]))
        .await
        .unwrap_err();
    match err {
        BridgeError::VmExecution { status, gas_used } => {
            assert!(status.starts_with("FUNCTION_RESOLUTION_FAILURE"));
            assert_eq!(ctx.gas_meter.consumed(), gas_used);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(ctx.events.is_empty());
}

#[tokio::test]
async fn test_script_emits_script_event() {
    let h = TestHarness::new();
    let code = vec![0xA1, 0x1C, 0xEB, 0x0B];
    h.factory.register_script(code.clone(), |frame: &mut CallFrame<'_>| {
        frame.gas_used += 50;
        Ok(())
    });

    let mut ctx = h.ctx(1_000_000);
    let output = h
        .bridge
        .execute_script(
            &mut ctx,
            ScriptRequest {
                senders: vec![addr(2), addr(3)],
                code,
                type_args: vec!["u64".into()],
                args: vec![],
            },
        )
        .await
        .unwrap();

    assert_eq!(ctx.events.of_kind("script").count(), 1);
    assert_eq!(ctx.gas_meter.consumed(), output.gas_used);
}

#[tokio::test]
async fn test_malformed_type_argument_is_rejected_before_execution() {
    let h = TestHarness::new();
    register_mint(&h);
    h.publish_coin_module().await;
    let counter = h.bridge.store().execution_counter().unwrap();

    let mut ctx = h.ctx(1_000_000);
    let err = h
        .bridge
        .execute_entry_function(
            &mut ctx,
            call(addr(2), "mint", vec![]).with_type_args(vec!["vector<".into()]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::MalformedType(_)));
    assert_eq!(ctx.gas_meter.consumed(), 0);
    assert_eq!(h.bridge.store().execution_counter().unwrap(), counter);
}

#[tokio::test]
async fn test_immutable_module_cannot_be_republished() {
    let h = TestHarness::new();
    let mut ctx = h.ctx(0);
    let request = || PublishRequest {
        sender: addr(2),
        modules: vec![h.module_blob(addr(2), "vault")],
        upgrade_policy: UpgradePolicy::Immutable,
    };

    let output = h.bridge.publish(&mut ctx, request()).await.unwrap();
    assert!(output.loaded_new_modules);
    assert_eq!(
        h.bridge
            .store()
            .module_upgrade_policy(&addr(2), &Identifier::new("vault").unwrap())
            .unwrap(),
        Some(UpgradePolicy::Immutable)
    );

    let err = h.bridge.publish(&mut ctx, request()).await.unwrap_err();
    assert!(matches!(err, BridgeError::VmExecution { ref status, .. } if status.contains("UPGRADE_POLICY_VIOLATION")));
}

// =============================================================================
// RESULT APPLICATION
// =============================================================================

#[tokio::test]
async fn test_new_accounts_are_created_and_base_accounts_converted() {
    let h = TestHarness::new();
    h.factory.register(coin_module(), "spawn", |frame: &mut CallFrame<'_>| {
        frame.new_accounts.push(NewAccount {
            address: addr(8),
            account_kind: AccountKind::Object.as_u8(),
        });
        frame.new_accounts.push(NewAccount {
            address: addr(9),
            account_kind: AccountKind::Table.as_u8(),
        });
        Ok(())
    });
    h.publish_coin_module().await;
    h.accounts
        .set_account(LedgerAccount {
            address: addr(8),
            account_number: 41,
            kind: AccountKind::Base,
        })
        .unwrap();

    let mut ctx = h.ctx(1_000_000);
    h.bridge
        .execute_entry_function(&mut ctx, call(addr(2), "spawn", vec![]))
        .await
        .unwrap();

    let converted = h.accounts.get_account(&addr(8)).unwrap().unwrap();
    assert_eq!(converted.kind, AccountKind::Object);
    assert_eq!(converted.account_number, 41);

    let created = h.accounts.get_account(&addr(9)).unwrap().unwrap();
    assert_eq!(created.kind, AccountKind::Table);
    assert_eq!(created.account_number, 0);
}

#[tokio::test]
async fn test_unknown_account_kind_aborts_application() {
    let h = TestHarness::new();
    h.factory.register(coin_module(), "spawn", |frame: &mut CallFrame<'_>| {
        frame.new_accounts.push(NewAccount {
            address: addr(9),
            account_kind: 99,
        });
        Ok(())
    });
    h.publish_coin_module().await;

    let mut ctx = h.ctx(1_000_000);
    let err = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "spawn", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedAccountKind(99)));
    assert!(h.accounts.get_account(&addr(9)).unwrap().is_none());
    assert!(ctx.gas_meter.consumed() > 0);
}

#[tokio::test]
async fn test_contract_revenue_is_floored_and_skips_stdlib() {
    let mut config = TestHarness::config();
    config.params.contract_shared_revenue_ratio = Decimal::parse("0.5").unwrap();
    let h = TestHarness::with_config(config);

    let vault = module(addr(2), "vault");
    let tiny = module(addr(3), "tiny");
    {
        let (vault, tiny) = (vault.clone(), tiny.clone());
        h.factory.register(vault.clone(), "split", move |frame: &mut CallFrame<'_>| {
            frame.gas_usages = vec![
                GasUsage {
                    module_id: vault.clone(),
                    gas_used: 1_000,
                },
                GasUsage {
                    module_id: coin_module(),
                    gas_used: 1_000,
                },
                GasUsage {
                    module_id: tiny.clone(),
                    gas_used: 3,
                },
            ];
            Ok(())
        });
    }
    publish(&h, addr(2), "vault").await;

    let fee_collector = module_account_address("fee_collector");
    h.bank.mint_coins(&fee_collector, &uinit(10_000)).unwrap();

    let mut ctx = h
        .ctx(1_000_000)
        .with_gas_price(DecCoin::new(TEST_DENOM, Decimal::parse("0.5").unwrap()));
    h.bridge
        .execute_entry_function(
            &mut ctx,
            ExecuteRequest::new(addr(4), addr(2), "vault", "split", vec![]),
        )
        .await
        .unwrap();

    assert_eq!(
        h.bank.transfers(),
        vec![Transfer {
            from: fee_collector,
            to: addr(2),
            amount: uinit(250),
        }]
    );
    assert_eq!(h.bank.balance(&addr(3), TEST_DENOM).unwrap(), U256::zero());
}

#[tokio::test]
async fn test_staking_deltas_are_netted_then_unbonded() {
    let h = TestHarness::new();
    let metadata = metadata_address(TEST_DENOM);
    h.staking
        .set_validator(Validator {
            operator: VALIDATOR.to_string(),
            status: BondStatus::Bonded,
        })
        .unwrap();
    h.bank
        .mint_coins(&module_account_address("move_staking"), &uinit(1_000))
        .unwrap();

    h.factory.register(coin_module(), "stake", move |frame: &mut CallFrame<'_>| {
        frame.staking_deltas.push(StakingDelta {
            validator: VALIDATOR.to_string(),
            metadata,
            delegation: 100,
            undelegation: 0,
        });
        frame.staking_deltas.push(StakingDelta {
            validator: VALIDATOR.to_string(),
            metadata,
            delegation: 0,
            undelegation: 30,
        });
        Ok(())
    });
    h.factory.register(coin_module(), "unstake", move |frame: &mut CallFrame<'_>| {
        frame.staking_deltas.push(StakingDelta {
            validator: VALIDATOR.to_string(),
            metadata,
            delegation: 0,
            undelegation: 50,
        });
        Ok(())
    });
    h.factory.register(
        module(AccountAddress::ONE, "staking"),
        "deposit_unbonding_coin_for_chain",
        move |frame: &mut CallFrame<'_>| {
            let denom_metadata: AccountAddress = frame.arg(0)?;
            let validators: Vec<String> = frame.arg(1)?;
            let amounts: Vec<u64> = frame.arg(2)?;
            if denom_metadata != metadata || frame.sender()? != AccountAddress::ONE {
                return Err("ABORTED: unexpected deposit".to_string());
            }
            frame.events.push(JsonEvent::new(
                "0x1::staking::UnbondingDeposited",
                serde_json::json!({ "validator": validators[0], "amount": amounts[0] }).to_string(),
            ));
            Ok(())
        },
    );
    h.publish_coin_module().await;
    publish(&h, AccountAddress::ONE, "staking").await;

    let delegator = delegator_address(VALIDATOR);
    let bonded_pool = module_account_address("bonded_tokens_pool");

    let move_staking = module_account_address("move_staking");
    let logged = h.bank.transfers().len();
    let mut ctx = h.ctx(10_000_000);
    h.bridge
        .execute_entry_function(&mut ctx, call(addr(2), "stake", vec![]))
        .await
        .unwrap();
    assert_eq!(h.staking.delegation(&delegator, VALIDATOR), uinit(70));
    assert_eq!(h.bank.balance(&bonded_pool, TEST_DENOM).unwrap(), U256::from(70u64));

    // Only the net 70 moves: no 100 delegation followed by a 30 unbond.
    let stake_transfers = h.bank.transfers().split_off(logged);
    assert_eq!(
        stake_transfers,
        vec![
            Transfer {
                from: move_staking,
                to: delegator,
                amount: uinit(70),
            },
            Transfer {
                from: delegator,
                to: bonded_pool,
                amount: uinit(70),
            },
        ]
    );

    let mut ctx = h.ctx(10_000_000);
    h.bridge
        .execute_entry_function(&mut ctx, call(addr(2), "unstake", vec![]))
        .await
        .unwrap();
    assert_eq!(
        h.staking.delegation(&delegator, VALIDATOR).amount_of(TEST_DENOM),
        U256::from(20u64)
    );
    assert_eq!(
        h.bank
            .balance(&module_account_address("move_staking"), TEST_DENOM)
            .unwrap(),
        U256::from(980u64)
    );

    let deposit = ctx
        .events
        .of_kind("move")
        .find(|e| e.attribute("type_tag") == Some("0x1::staking::UnbondingDeposited"))
        .unwrap();
    assert_eq!(deposit.attribute("validator"), Some(VALIDATOR));
    assert_eq!(deposit.attribute("amount"), Some("50"));
    assert_eq!(ctx.events.of_kind("execute").count(), 2);
}

#[tokio::test]
async fn test_staking_to_unknown_validator_fails() {
    let h = TestHarness::new();
    let metadata = metadata_address(TEST_DENOM);
    h.factory.register(coin_module(), "stake", move |frame: &mut CallFrame<'_>| {
        frame.staking_deltas.push(StakingDelta {
            validator: "initvaloper1nobody".to_string(),
            metadata,
            delegation: 10,
            undelegation: 0,
        });
        Ok(())
    });
    h.publish_coin_module().await;

    let mut ctx = h.ctx(1_000_000);
    let err = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "stake", vec![]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

fn ibc_transfer(sender: AccountAddress) -> OutboundMessage {
    OutboundMessage::IbcTransfer(IbcTransfer {
        sender,
        source_port: "transfer".into(),
        source_channel: "channel-0".into(),
        token: AssetAmount {
            metadata: metadata_address(TEST_DENOM),
            amount: 10,
        },
        receiver: "cosmos1receiver".into(),
        timeout: IbcTimeout {
            revision_number: 0,
            revision_height: 100,
            timestamp: 0,
        },
        memo: String::new(),
    })
}

#[tokio::test]
async fn test_messages_are_routed_with_ledger_denoms() {
    let h = TestHarness::new();
    h.factory.register(coin_module(), "bridge_out", |frame: &mut CallFrame<'_>| {
        let sender = frame.sender()?;
        frame.messages.push(ibc_transfer(sender));
        Ok(())
    });
    h.publish_coin_module().await;

    let mut ctx = h.ctx(1_000_000);
    let output = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "bridge_out", vec![]))
        .await
        .unwrap();
    assert_eq!(output.message_count, 1);

    let received = h.recorder.received();
    assert_eq!(received.len(), 1);
    match &received[0] {
        LedgerMessage::Transfer { token, sender, .. } => {
            assert_eq!(token, &Coin::new(TEST_DENOM, 10u64));
            assert_eq!(*sender, addr(2));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(ctx.events.of_kind("recorded").count(), 1);
}

#[tokio::test]
async fn test_message_from_non_signer_is_unauthorized() {
    let h = TestHarness::new();
    h.factory.register(coin_module(), "bridge_out", |frame: &mut CallFrame<'_>| {
        frame.messages.push(ibc_transfer(addr(3)));
        Ok(())
    });
    h.publish_coin_module().await;

    let mut ctx = h.ctx(1_000_000);
    let err = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "bridge_out", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Unauthorized(_)));
    assert!(h.recorder.received().is_empty());
}

#[tokio::test]
async fn test_execute_message_runs_nested_call() {
    let h = TestHarness::new();
    register_mint(&h);
    h.factory.register(coin_module(), "relay", |frame: &mut CallFrame<'_>| {
        let sender = frame.sender()?;
        frame.messages.push(OutboundMessage::Execute {
            sender,
            module_address: AccountAddress::ONE,
            module_name: "coin".into(),
            function_name: "mint".into(),
            type_args: vec![],
            args: vec![bcs::to_bytes(&7u64).map_err(|e| e.to_string())?],
        });
        Ok(())
    });
    h.publish_coin_module().await;

    let mut ctx = h.ctx(1_000_000);
    let output = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "relay", vec![]))
        .await
        .unwrap();

    assert_eq!(ctx.events.of_kind("execute").count(), 2);
    let mint = ctx.events.of_kind("move").next().unwrap();
    assert_eq!(mint.attribute("account"), Some("0x2"));
    assert_eq!(mint.attribute("amount"), Some("7"));
    assert!(ctx.gas_meter.consumed() > output.gas_used);
}

#[tokio::test]
async fn test_delegate_message_moves_funds() {
    let h = TestHarness::new();
    h.staking
        .set_validator(Validator {
            operator: VALIDATOR.to_string(),
            status: BondStatus::Unbonded,
        })
        .unwrap();
    h.bank.mint_coins(&addr(2), &uinit(500)).unwrap();
    h.factory.register(coin_module(), "delegate", |frame: &mut CallFrame<'_>| {
        let delegator = frame.sender()?;
        frame.messages.push(OutboundMessage::Stake {
            delegator,
            validator: VALIDATOR.to_string(),
            token: AssetAmount {
                metadata: metadata_address(TEST_DENOM),
                amount: 200,
            },
        });
        Ok(())
    });
    h.publish_coin_module().await;

    let mut ctx = h.ctx(1_000_000);
    h.bridge
        .execute_entry_function(&mut ctx, call(addr(2), "delegate", vec![]))
        .await
        .unwrap();

    assert_eq!(h.staking.delegation(&addr(2), VALIDATOR), uinit(200));
    assert_eq!(
        h.bank
            .balance(&module_account_address("not_bonded_tokens_pool"), TEST_DENOM)
            .unwrap(),
        U256::from(200u64)
    );
    assert_eq!(ctx.events.of_kind("delegate").count(), 1);
}

// =============================================================================
// LOADER CACHE
// =============================================================================

#[tokio::test]
async fn test_failed_publish_leaves_no_stale_module() {
    init_tracing();
    let mut config = TestHarness::config();
    config.pool_size = 1;
    let h = TestHarness::with_config(config);
    register_mint(&h);

    let before = h.kv.snapshot().unwrap();
    h.publish_coin_module().await;

    // The surrounding transaction fails: the ledger rolls the store back.
    h.kv.restore(before).unwrap();
    assert!(h.bridge.post_transaction(false).await);
    assert_eq!(h.bridge.stats().await.loader_flushes, 1);

    let mut ctx = h.ctx(1_000_000);
    let err = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "mint", vec![bcs::to_bytes(&1u64).unwrap()]))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::VmExecution { ref status, .. } if status.starts_with("LINKER_ERROR")));
    assert_eq!(h.factory.probe().flushes(), 1);
}

#[tokio::test]
async fn test_partially_published_bundle_is_not_served_after_rollback() {
    init_tracing();
    let mut config = TestHarness::config();
    config.pool_size = 1;
    let h = TestHarness::with_config(config);
    h.factory.register(module(addr(2), "m"), "f", |_frame: &mut CallFrame<'_>| Ok(()));

    let before = h.kv.snapshot().unwrap();
    let mut ctx = h.ctx(0);
    let err = h
        .bridge
        .publish(
            &mut ctx,
            PublishRequest {
                sender: addr(2),
                modules: vec![h.module_blob(addr(2), "m"), h.module_blob(addr(3), "x")],
                upgrade_policy: UpgradePolicy::Compatible,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::VmExecution { ref status, .. } if status == "MODULE_ADDRESS_DOES_NOT_MATCH_SENDER"));

    h.kv.restore(before).unwrap();
    h.bridge.post_transaction(false).await;

    let mut ctx = h.ctx(1_000_000);
    let err = h
        .bridge
        .execute_entry_function(&mut ctx, ExecuteRequest::new(addr(2), addr(2), "m", "f", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::VmExecution { ref status, .. } if status.starts_with("LINKER_ERROR")));
}

#[tokio::test]
async fn test_successful_transaction_keeps_loader_cache() {
    let h = TestHarness::new();
    register_mint(&h);
    h.publish_coin_module().await;

    assert!(!h.bridge.post_transaction(true).await);
    assert!(!h.bridge.post_transaction(false).await);
    assert_eq!(h.factory.probe().flushes(), 0);
}

// =============================================================================
// GENESIS
// =============================================================================

#[tokio::test]
async fn test_genesis_export_import_roundtrip() {
    let source = TestHarness::new();
    source.publish_coin_module().await;
    publish(&source, addr(2), "vault").await;
    let exported = source.bridge.export_genesis().await.unwrap();
    assert_eq!(exported.modules.len(), 2);
    assert!(exported.execution_counter > 0);

    let json = exported.to_json().unwrap();
    let parsed = GenesisState::from_json(&json).unwrap();
    assert_eq!(parsed, exported);

    let target = TestHarness::new();
    let mut ctx = target.ctx(0);
    target
        .bridge
        .init_genesis(&mut ctx, vec![target.module_blob(AccountAddress::ONE, "stdlib")], &parsed)
        .await
        .unwrap();

    assert_eq!(target.bridge.export_genesis().await.unwrap(), exported);
    assert_eq!(
        target
            .bridge
            .store()
            .module_upgrade_policy(&addr(2), &Identifier::new("vault").unwrap())
            .unwrap(),
        Some(UpgradePolicy::Compatible)
    );
}

#[tokio::test]
async fn test_init_genesis_publishes_stdlib_when_state_has_no_modules() {
    let h = TestHarness::new();
    let mut ctx = h.ctx(0);
    h.bridge
        .init_genesis(
            &mut ctx,
            vec![h.module_blob(AccountAddress::ONE, "coin")],
            &GenesisState::default(),
        )
        .await
        .unwrap();
    assert!(h
        .bridge
        .store()
        .has_module(&AccountAddress::ONE, &Identifier::new("coin").unwrap())
        .unwrap());
    assert!(h.bridge.store().execution_counter().unwrap() >= 1);
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[tokio::test]
async fn test_cancelled_context_does_not_take_an_engine() {
    let h = TestHarness::new();
    register_mint(&h);
    h.publish_coin_module().await;
    let available = h.bridge.pool().available();

    let token = CancellationToken::new();
    token.cancel();
    let mut ctx = h.ctx(1_000_000).with_cancellation(token);
    let err = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "mint", vec![bcs::to_bytes(&1u64).unwrap()]))
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Cancelled(_)));
    assert_eq!(ctx.gas_meter.consumed(), 0);
    assert_eq!(h.bridge.pool().available(), available);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_expires_while_pool_is_exhausted() {
    let mut config = TestHarness::config();
    config.pool_size = 1;
    config.acquire_timeout = Some(Duration::from_millis(50));
    let h = TestHarness::with_config(config);
    register_mint(&h);
    h.publish_coin_module().await;

    let never = CancellationToken::new();
    let _held = h.bridge.pool().acquire(&never, None).await.unwrap();

    let mut ctx = h.ctx(1_000_000);
    let err = h
        .bridge
        .execute_entry_function(&mut ctx, call(addr(2), "mint", vec![bcs::to_bytes(&1u64).unwrap()]))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Cancelled(_)));
}
