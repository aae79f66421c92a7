//! # Result Applier
//!
//! Commits a successful VM result to the ledger, in this fixed order:
//!
//! 1. Move events become ledger events
//! 2. new accounts are materialized
//! 3. contract-shared revenue is paid from the fee collector
//! 4. staking deltas are netted per validator and applied
//! 5. outbound messages are converted, validated and dispatched
//!
//! Revenue is computed before any staking balance moves. The first failing
//! step aborts the rest; gas already charged stays charged.

use crate::context::ExecutionContext;
use crate::domain::entities::{
    AccountKind, ExecutionResult, GasUsage, JsonEvent, LedgerAccount, NewAccount, StakingDelta,
};
use crate::domain::services::{
    aggregate_staking_deltas, contract_revenue, delegator_address, metadata_address,
};
use crate::domain::value_objects::{AccountAddress, Coin, Coins, U256};
use crate::errors::BridgeError;
use crate::events::LedgerEvent;
use crate::messages::{LedgerMessage, OutboundMessage};
use crate::ports::inbound::ExecuteOutput;
use crate::service::MoveBridge;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Names of the module accounts the applier moves funds between.
pub mod module_accounts {
    /// Collects transaction fees.
    pub const FEE_COLLECTOR: &str = "fee_collector";
    /// Holds the funds Move staking code manages.
    pub const MOVE_STAKING: &str = "move_staking";
    /// Holds stake delegated to bonded validators.
    pub const BONDED_POOL: &str = "bonded_tokens_pool";
    /// Holds stake delegated to validators outside the active set.
    pub const NOT_BONDED_POOL: &str = "not_bonded_tokens_pool";
}

/// Move module receiving unbonded coins.
pub const STAKING_MODULE: &str = "staking";
/// `0x1::staking::deposit_unbonding_coin_for_chain(metadata, validators, amounts)`.
pub const DEPOSIT_UNBONDING_FUNCTION: &str = "deposit_unbonding_coin_for_chain";

impl MoveBridge {
    /// Applies `result` on behalf of `senders`.
    pub(crate) async fn apply_execution_result(
        &self,
        ctx: &mut ExecutionContext,
        senders: &[AccountAddress],
        result: ExecutionResult,
    ) -> Result<ExecuteOutput, BridgeError> {
        let output = ExecuteOutput {
            gas_used: result.gas_used,
            event_count: result.events.len(),
            message_count: result.messages.len(),
            loaded_new_modules: result.loaded_new_modules,
        };

        emit_move_events(ctx, &result.events);
        self.materialize_accounts(&result.new_accounts)?;
        self.distribute_contract_revenue(ctx, &result.gas_usages)?;
        self.apply_staking_deltas(ctx, &result.staking_deltas).await?;
        self.dispatch_messages(ctx, senders, result.messages).await?;

        Ok(output)
    }

    fn materialize_accounts(&self, accounts: &[NewAccount]) -> Result<(), BridgeError> {
        let keeper = &self.keepers.accounts;
        for new_account in accounts {
            let kind = AccountKind::from_u8(new_account.account_kind)
                .ok_or(BridgeError::UnsupportedAccountKind(new_account.account_kind))?;

            match keeper.get_account(&new_account.address)? {
                None => {
                    let account_number = keeper.next_account_number()?;
                    keeper.set_account(LedgerAccount {
                        address: new_account.address,
                        account_number,
                        kind,
                    })?;
                    debug!(address = %new_account.address, ?kind, account_number, "Account created");
                }
                Some(existing) if existing.kind == kind => {
                    trace!(address = %new_account.address, "Account already exists");
                }
                // A plain account that received funds before the VM claimed
                // its address keeps its number.
                Some(existing) if existing.kind == AccountKind::Base => {
                    debug!(address = %new_account.address, ?kind, "Account converted");
                    keeper.set_account(LedgerAccount { kind, ..existing })?;
                }
                Some(existing) => {
                    return Err(BridgeError::InvalidVmResult(format!(
                        "account {} already exists as {:?}",
                        existing.address, existing.kind
                    )));
                }
            }
        }
        Ok(())
    }

    fn distribute_contract_revenue(
        &self,
        ctx: &ExecutionContext,
        usages: &[GasUsage],
    ) -> Result<(), BridgeError> {
        let Some(price) = ctx.gas_price_hint.as_ref() else {
            return Ok(());
        };
        let ratio = &self.config.params.contract_shared_revenue_ratio;
        if ratio.is_zero() || price.amount.is_zero() {
            return Ok(());
        }

        let fee_collector = self
            .keepers
            .accounts
            .module_address(module_accounts::FEE_COLLECTOR);
        for usage in usages {
            let owner = usage.module_id.address;
            if owner.is_std() {
                continue;
            }
            let amount = contract_revenue(&price.amount, ratio, usage.gas_used).ok_or_else(|| {
                BridgeError::InvalidVmResult(format!("revenue overflow for {}", usage.module_id))
            })?;
            if amount.is_zero() {
                continue;
            }
            let revenue = Coins::from(Coin::new(price.denom.clone(), amount));
            self.keepers.bank.send_coins(&fee_collector, &owner, &revenue)?;
            debug!(module = %usage.module_id, %revenue, "Contract revenue paid");
        }
        Ok(())
    }

    async fn apply_staking_deltas(
        &self,
        ctx: &mut ExecutionContext,
        deltas: &[StakingDelta],
    ) -> Result<(), BridgeError> {
        if deltas.is_empty() {
            return Ok(());
        }
        let accounts = &self.keepers.accounts;
        let bank = &self.keepers.bank;
        let staking = &self.keepers.staking;

        let changes = aggregate_staking_deltas(deltas, |metadata| bank.denom_from_metadata(metadata))?;
        let staking_account = accounts.module_address(module_accounts::MOVE_STAKING);

        // denom -> (validators, amounts)
        let mut unbonded: BTreeMap<String, (Vec<String>, Vec<u64>)> = BTreeMap::new();

        for change in changes {
            let validator = staking
                .get_validator(&change.validator)?
                .ok_or_else(|| BridgeError::NotFound(format!("validator {}", change.validator)))?;
            let delegator = delegator_address(&validator.operator);

            if !change.delegation.is_zero() {
                bank.send_coins(&staking_account, &delegator, &change.delegation)?;
                staking.delegate(&delegator, &validator.operator, &change.delegation)?;
                debug!(validator = %validator.operator, amount = %change.delegation, "Stake delegated");
            }

            if !change.undelegation.is_zero() {
                let returned =
                    staking.unbond_instant(&delegator, &validator.operator, &change.undelegation)?;
                let pool = if validator.is_bonded() {
                    module_accounts::BONDED_POOL
                } else {
                    module_accounts::NOT_BONDED_POOL
                };
                bank.send_coins(&accounts.module_address(pool), &staking_account, &returned)?;
                debug!(validator = %validator.operator, amount = %returned, "Stake unbonded");

                for coin in returned.iter() {
                    if coin.amount > U256::from(u64::MAX) {
                        return Err(BridgeError::InvalidVmResult(format!(
                            "unbonded amount {coin} exceeds u64"
                        )));
                    }
                    let entry = unbonded.entry(coin.denom.clone()).or_default();
                    entry.0.push(validator.operator.clone());
                    entry.1.push(coin.amount.low_u64());
                }
            }
        }

        for (denom, (validators, amounts)) in unbonded {
            let payload = self.payloads.build_entry_function(
                AccountAddress::ONE,
                STAKING_MODULE,
                DEPOSIT_UNBONDING_FUNCTION,
                &[],
                vec![
                    bcs::to_bytes(&metadata_address(&denom))?,
                    bcs::to_bytes(&validators)?,
                    bcs::to_bytes(&amounts)?,
                ],
            )?;
            self.execute_entry(ctx, vec![AccountAddress::ONE], payload)
                .await?;
        }
        Ok(())
    }

    async fn dispatch_messages(
        &self,
        ctx: &mut ExecutionContext,
        senders: &[AccountAddress],
        messages: Vec<OutboundMessage>,
    ) -> Result<(), BridgeError> {
        for message in messages {
            let sender = message.sender();
            if !senders.contains(&sender) {
                return Err(BridgeError::Unauthorized(format!(
                    "message sender {sender} did not sign the call"
                )));
            }

            let ledger_msg = message.into_ledger(self.keepers.bank.as_ref())?;
            ledger_msg.validate_basic()?;

            if let LedgerMessage::Execute {
                sender,
                module_address,
                module_name,
                function_name,
                type_args,
                args,
            } = ledger_msg
            {
                let payload = self.payloads.build_entry_function(
                    module_address,
                    &module_name,
                    &function_name,
                    &type_args,
                    args,
                )?;
                self.execute_entry(ctx, vec![sender], payload).await?;
                continue;
            }

            let type_url = ledger_msg.type_url();
            let handler = self
                .keepers
                .router
                .handler(type_url)
                .ok_or_else(|| BridgeError::UnsupportedMessage(type_url.to_string()))?;
            let events = handler.handle(ctx, &ledger_msg).await?;
            trace!(type_url, events = events.len(), "Message dispatched");
            ctx.events.emit_all(events);
        }
        Ok(())
    }
}

fn emit_move_events(ctx: &mut ExecutionContext, events: &[JsonEvent]) {
    ctx.events
        .emit_all(events.iter().map(LedgerEvent::from_move_event));
}
