//! # Message Router
//!
//! A fixed type-URL → handler table, plus handlers for the ledger messages
//! the in-memory keepers can execute.

use crate::context::ExecutionContext;
use crate::errors::BridgeError;
use crate::events::LedgerEvent;
use crate::messages::{type_urls, LedgerMessage};
use crate::ports::outbound::{CommunityPoolKeeper, MessageHandler, MessageRouter, StakingKeeper};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Router over a fixed handler table.
#[derive(Default)]
pub struct StaticMessageRouter {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl StaticMessageRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `type_url`, replacing any previous one.
    #[must_use]
    pub fn with_handler(mut self, type_url: &str, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(type_url.to_string(), handler);
        self
    }

    /// Routes `MsgDelegate` and `MsgFundCommunityPool` to the given keepers.
    #[must_use]
    pub fn with_ledger_handlers(
        self,
        staking: Arc<dyn StakingKeeper>,
        community_pool: Arc<dyn CommunityPoolKeeper>,
    ) -> Self {
        self.with_handler(type_urls::MSG_DELEGATE, Arc::new(DelegateHandler { staking }))
            .with_handler(
                type_urls::MSG_FUND_COMMUNITY_POOL,
                Arc::new(FundCommunityPoolHandler { community_pool }),
            )
    }
}

impl MessageRouter for StaticMessageRouter {
    fn handler(&self, type_url: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(type_url).cloned()
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

fn unexpected(msg: &LedgerMessage) -> BridgeError {
    BridgeError::UnsupportedMessage(format!("handler cannot execute {}", msg.type_url()))
}

/// Executes `MsgDelegate`.
pub struct DelegateHandler {
    staking: Arc<dyn StakingKeeper>,
}

#[async_trait]
impl MessageHandler for DelegateHandler {
    async fn handle(
        &self,
        _ctx: &mut ExecutionContext,
        msg: &LedgerMessage,
    ) -> Result<Vec<LedgerEvent>, BridgeError> {
        let LedgerMessage::Delegate {
            delegator,
            validator,
            amount,
        } = msg
        else {
            return Err(unexpected(msg));
        };
        self.staking.delegate(delegator, validator, amount)?;
        Ok(vec![LedgerEvent::new("delegate")
            .with_attribute("validator", validator.as_str())
            .with_attribute("delegator", delegator.to_string())
            .with_attribute("amount", amount.to_string())])
    }
}

/// Executes `MsgFundCommunityPool`.
pub struct FundCommunityPoolHandler {
    community_pool: Arc<dyn CommunityPoolKeeper>,
}

#[async_trait]
impl MessageHandler for FundCommunityPoolHandler {
    async fn handle(
        &self,
        _ctx: &mut ExecutionContext,
        msg: &LedgerMessage,
    ) -> Result<Vec<LedgerEvent>, BridgeError> {
        let LedgerMessage::FundCommunityPool { depositor, amount } = msg else {
            return Err(unexpected(msg));
        };
        self.community_pool.fund_community_pool(depositor, amount)?;
        Ok(vec![LedgerEvent::new("fund_community_pool")
            .with_attribute("depositor", depositor.to_string())
            .with_attribute("amount", amount.to_string())])
    }
}

/// Accepts any message and remembers it.
#[derive(Default)]
pub struct RecordingHandler {
    received: Mutex<Vec<LedgerMessage>>,
}

impl RecordingHandler {
    /// Create a handler with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages handled so far.
    #[must_use]
    pub fn received(&self) -> Vec<LedgerMessage> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(
        &self,
        _ctx: &mut ExecutionContext,
        msg: &LedgerMessage,
    ) -> Result<Vec<LedgerEvent>, BridgeError> {
        self.received.lock().push(msg.clone());
        Ok(vec![LedgerEvent::new("recorded").with_attribute("type_url", msg.type_url())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{AccountAddress, Coin, Coins};

    #[tokio::test]
    async fn test_router_resolves_registered_handler() {
        let recorder = Arc::new(RecordingHandler::new());
        let router = StaticMessageRouter::new()
            .with_handler(type_urls::MSG_TRANSFER, Arc::clone(&recorder) as Arc<dyn MessageHandler>);

        assert!(router.handler(type_urls::MSG_NFT_TRANSFER).is_none());
        let handler = router.handler(type_urls::MSG_TRANSFER).unwrap();

        let msg = LedgerMessage::FundCommunityPool {
            depositor: AccountAddress::ONE,
            amount: Coins::from(Coin::new("uinit", 1u64)),
        };
        let mut ctx = ExecutionContext::new("test-1", 1, 0, 0);
        let events = handler.handle(&mut ctx, &msg).await.unwrap();
        assert_eq!(events[0].attribute("type_url"), Some(type_urls::MSG_FUND_COMMUNITY_POOL));
        assert_eq!(recorder.received(), vec![msg]);
    }
}
