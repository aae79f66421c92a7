//! # Test Harness
//!
//! A fully wired [`MoveBridge`] over the in-memory adapters and the scripted
//! engine. Shared by unit and integration tests.
//!
//! Constructors panic on wiring errors; this module is not meant for
//! production use.

use super::engine::{encode_module, ScriptedEngineFactory};
use super::keepers::{
    InMemoryAccountKeeper, InMemoryBankKeeper, InMemoryCommunityPoolKeeper, InMemoryStakingKeeper,
};
use super::kv::InMemoryKvStore;
use super::router::{RecordingHandler, StaticMessageRouter};
use crate::context::ExecutionContext;
use crate::domain::entities::UpgradePolicy;
use crate::domain::value_objects::{AccountAddress, Hash, Identifier, ModuleId};
use crate::messages::type_urls;
use crate::ports::inbound::{MoveBridgeApi, PublishRequest};
use crate::ports::outbound::MessageHandler;
use crate::service::{Keepers, MoveBridge, ServiceConfig};
use std::sync::Arc;
use std::time::Duration;

/// Chain id used by [`TestHarness::ctx`].
pub const TEST_CHAIN_ID: &str = "move-bridge-test";

/// Bond denom registered with the bank and staking keepers.
pub const TEST_DENOM: &str = "uinit";

/// Short address `0x<n>`.
#[must_use]
pub fn addr(n: u8) -> AccountAddress {
    let mut bytes = [0u8; 32];
    bytes[31] = n;
    AccountAddress::new(bytes)
}

/// `0x1::coin`.
///
/// # Panics
///
/// Never; the name is a valid identifier.
#[must_use]
pub fn coin_module() -> ModuleId {
    ModuleId::new(
        AccountAddress::ONE,
        Identifier::new("coin").expect("valid identifier"),
    )
}

/// A bridge with every collaborator exposed for inspection.
pub struct TestHarness {
    /// Bridge under test.
    pub bridge: MoveBridge,
    /// Engine factory behind the pool.
    pub factory: Arc<ScriptedEngineFactory>,
    /// Backing store.
    pub kv: Arc<InMemoryKvStore>,
    /// Accounts.
    pub accounts: Arc<InMemoryAccountKeeper>,
    /// Balances.
    pub bank: Arc<InMemoryBankKeeper>,
    /// Staking.
    pub staking: Arc<InMemoryStakingKeeper>,
    /// Community pool.
    pub community_pool: Arc<InMemoryCommunityPoolKeeper>,
    /// Receives IBC and OP-bridge messages.
    pub recorder: Arc<RecordingHandler>,
}

impl TestHarness {
    /// Harness with [`TestHarness::config`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::config())
    }

    /// Two pooled engines and a bounded acquire wait.
    #[must_use]
    pub fn config() -> ServiceConfig {
        ServiceConfig {
            pool_size: 2,
            acquire_timeout: Some(Duration::from_secs(5)),
            ..ServiceConfig::default()
        }
    }

    /// Harness over `config`.
    ///
    /// # Panics
    ///
    /// If `config` does not validate.
    #[must_use]
    pub fn with_config(config: ServiceConfig) -> Self {
        let factory = Arc::new(ScriptedEngineFactory::new());
        let kv = Arc::new(InMemoryKvStore::new());
        let accounts = Arc::new(InMemoryAccountKeeper::new());
        let bank = Arc::new(InMemoryBankKeeper::new());
        bank.register_denom(TEST_DENOM);
        let staking = Arc::new(InMemoryStakingKeeper::new(
            Arc::clone(&bank),
            vec![TEST_DENOM.to_string()],
        ));
        let community_pool = Arc::new(InMemoryCommunityPoolKeeper::new(Arc::clone(&bank)));
        let recorder = Arc::new(RecordingHandler::new());

        let mut router = StaticMessageRouter::new()
            .with_ledger_handlers(staking.clone(), community_pool.clone());
        for type_url in [
            type_urls::MSG_TRANSFER,
            type_urls::MSG_NFT_TRANSFER,
            type_urls::MSG_PAY_PACKET_FEE,
            type_urls::MSG_INITIATE_TOKEN_DEPOSIT,
            type_urls::MSG_INITIATE_TOKEN_WITHDRAWAL,
        ] {
            router = router.with_handler(type_url, Arc::clone(&recorder) as Arc<dyn MessageHandler>);
        }

        let keepers = Keepers {
            accounts: accounts.clone(),
            bank: bank.clone(),
            staking: staking.clone(),
            router: Arc::new(router),
        };
        let bridge = MoveBridge::new(config, kv.clone(), factory.clone(), keepers)
            .expect("harness config must validate");

        Self {
            bridge,
            factory,
            kv,
            accounts,
            bank,
            staking,
            community_pool,
            recorder,
        }
    }

    /// DeliverTx context with `gas_limit` (zero means unlimited).
    #[must_use]
    pub fn ctx(&self, gas_limit: u64) -> ExecutionContext {
        ExecutionContext::new(TEST_CHAIN_ID, 10, 1_700_000_000, gas_limit)
            .with_tx_hash(Hash::new([7u8; 32]))
    }

    /// Scripted module blob whose bytecode is its own name.
    ///
    /// # Panics
    ///
    /// Never; BCS encoding of the tuple cannot fail.
    #[must_use]
    pub fn module_blob(&self, address: AccountAddress, name: &str) -> Vec<u8> {
        encode_module(address, name, name.as_bytes()).expect("module blob encodes")
    }

    /// Publishes `0x1::coin` as compatible.
    ///
    /// # Panics
    ///
    /// If publication fails.
    pub async fn publish_coin_module(&self) {
        let mut ctx = self.ctx(0);
        self.bridge
            .publish(
                &mut ctx,
                PublishRequest {
                    sender: AccountAddress::ONE,
                    modules: vec![self.module_blob(AccountAddress::ONE, "coin")],
                    upgrade_policy: UpgradePolicy::Compatible,
                },
            )
            .await
            .expect("coin module publishes");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
