//! # Outbound Messages
//!
//! Ledger instructions emitted by Move code, as a closed sum type, and their
//! conversion into concrete ledger messages.
//!
//! VM messages name assets by fungible-asset metadata address; conversion
//! resolves each one to a ledger denom through the bank.

use crate::domain::services::move_denom;
use crate::domain::value_objects::{AccountAddress, Coin, Coins, U256};
use crate::errors::BridgeError;
use crate::ports::outbound::BankKeeper;
use serde::{Deserialize, Serialize};

/// Ledger message type URLs.
pub mod type_urls {
    /// Staking delegation.
    pub const MSG_DELEGATE: &str = "/cosmos.staking.v1beta1.MsgDelegate";
    /// Community pool deposit.
    pub const MSG_FUND_COMMUNITY_POOL: &str = "/cosmos.distribution.v1beta1.MsgFundCommunityPool";
    /// IBC fungible token transfer.
    pub const MSG_TRANSFER: &str = "/ibc.applications.transfer.v1.MsgTransfer";
    /// IBC NFT transfer.
    pub const MSG_NFT_TRANSFER: &str = "/ibc.applications.nft_transfer.v1.MsgTransfer";
    /// IBC relayer fee payment.
    pub const MSG_PAY_PACKET_FEE: &str = "/ibc.applications.fee.v1.MsgPayPacketFee";
    /// Rollup deposit.
    pub const MSG_INITIATE_TOKEN_DEPOSIT: &str = "/opinit.ophost.v1.MsgInitiateTokenDeposit";
    /// Rollup withdrawal.
    pub const MSG_INITIATE_TOKEN_WITHDRAWAL: &str = "/opinit.opchild.v1.MsgInitiateTokenWithdrawal";
    /// Nested Move entry-function call.
    pub const MSG_EXECUTE: &str = "/initia.move.v1.MsgExecute";
}

// =============================================================================
// VM-SIDE MESSAGES
// =============================================================================

/// IBC packet timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcTimeout {
    /// Counterparty revision number.
    pub revision_number: u64,
    /// Counterparty revision height, zero for none.
    pub revision_height: u64,
    /// Timeout timestamp in nanoseconds, zero for none.
    pub timestamp: u64,
}

impl IbcTimeout {
    /// Returns true if neither a height nor a timestamp is set.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.revision_height == 0 && self.timestamp == 0
    }
}

/// An amount of a Move fungible asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    /// Fungible asset metadata address.
    pub metadata: AccountAddress,
    /// Amount.
    pub amount: u64,
}

/// IBC fungible transfer requested by Move code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcTransfer {
    /// Sender.
    pub sender: AccountAddress,
    /// Source port.
    pub source_port: String,
    /// Source channel.
    pub source_channel: String,
    /// Asset sent.
    pub token: AssetAmount,
    /// Counterparty receiver.
    pub receiver: String,
    /// Timeout.
    pub timeout: IbcTimeout,
    /// Memo.
    pub memo: String,
}

/// IBC NFT transfer requested by Move code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcNftTransfer {
    /// Sender.
    pub sender: AccountAddress,
    /// Source port.
    pub source_port: String,
    /// Source channel.
    pub source_channel: String,
    /// Collection object address.
    pub collection: AccountAddress,
    /// Token ids.
    pub token_ids: Vec<String>,
    /// Counterparty receiver.
    pub receiver: String,
    /// Timeout.
    pub timeout: IbcTimeout,
    /// Memo.
    pub memo: String,
}

/// IBC relayer fee payment requested by Move code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayFee {
    /// Payer.
    pub sender: AccountAddress,
    /// Source port.
    pub source_port: String,
    /// Source channel.
    pub source_channel: String,
    /// Receive fee.
    pub recv_fee: AssetAmount,
    /// Acknowledgement fee.
    pub ack_fee: AssetAmount,
    /// Timeout fee.
    pub timeout_fee: AssetAmount,
}

/// A ledger instruction emitted by Move code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundMessage {
    /// Delegate stake to a validator.
    Stake {
        /// Delegator.
        delegator: AccountAddress,
        /// Validator operator.
        validator: String,
        /// Asset staked.
        token: AssetAmount,
    },
    /// Deposit into the community pool.
    FundCommunityPool {
        /// Depositor.
        sender: AccountAddress,
        /// Asset deposited.
        token: AssetAmount,
    },
    /// IBC fungible transfer.
    IbcTransfer(IbcTransfer),
    /// IBC NFT transfer.
    IbcNftTransfer(IbcNftTransfer),
    /// IBC relayer fee payment.
    PayFee(PayFee),
    /// Rollup deposit.
    InitiateTokenDeposit {
        /// Depositor.
        sender: AccountAddress,
        /// Bridge id.
        bridge_id: u64,
        /// Recipient on the rollup.
        to: String,
        /// Asset deposited.
        token: AssetAmount,
        /// Extra data forwarded to the rollup.
        data: Vec<u8>,
    },
    /// Rollup withdrawal.
    InitiateTokenWithdrawal {
        /// Withdrawer.
        sender: AccountAddress,
        /// Recipient on L1.
        to: String,
        /// Asset withdrawn.
        token: AssetAmount,
    },
    /// Nested Move entry-function call.
    Execute {
        /// Caller.
        sender: AccountAddress,
        /// Module address.
        module_address: AccountAddress,
        /// Module name.
        module_name: String,
        /// Function name.
        function_name: String,
        /// Type arguments, textual form.
        type_args: Vec<String>,
        /// BCS-encoded arguments.
        args: Vec<Vec<u8>>,
    },
}

impl OutboundMessage {
    /// Account the message acts for.
    #[must_use]
    pub fn sender(&self) -> AccountAddress {
        match self {
            Self::Stake { delegator, .. } => *delegator,
            Self::FundCommunityPool { sender, .. }
            | Self::InitiateTokenDeposit { sender, .. }
            | Self::InitiateTokenWithdrawal { sender, .. }
            | Self::Execute { sender, .. } => *sender,
            Self::IbcTransfer(msg) => msg.sender,
            Self::IbcNftTransfer(msg) => msg.sender,
            Self::PayFee(msg) => msg.sender,
        }
    }

    /// Converts into a concrete ledger message, resolving asset denoms.
    pub fn into_ledger(self, bank: &dyn BankKeeper) -> Result<LedgerMessage, BridgeError> {
        let coin = |asset: &AssetAmount| -> Result<Coin, BridgeError> {
            Ok(Coin::new(
                bank.denom_from_metadata(&asset.metadata)?,
                U256::from(asset.amount),
            ))
        };

        Ok(match self {
            Self::Stake {
                delegator,
                validator,
                token,
            } => LedgerMessage::Delegate {
                delegator,
                validator,
                amount: Coins::from(coin(&token)?),
            },
            Self::FundCommunityPool { sender, token } => LedgerMessage::FundCommunityPool {
                depositor: sender,
                amount: Coins::from(coin(&token)?),
            },
            Self::IbcTransfer(msg) => LedgerMessage::Transfer {
                token: coin(&msg.token)?,
                sender: msg.sender,
                source_port: msg.source_port,
                source_channel: msg.source_channel,
                receiver: msg.receiver,
                timeout: msg.timeout,
                memo: msg.memo,
            },
            Self::IbcNftTransfer(msg) => LedgerMessage::NftTransfer {
                class_id: move_denom(&msg.collection),
                sender: msg.sender,
                source_port: msg.source_port,
                source_channel: msg.source_channel,
                token_ids: msg.token_ids,
                receiver: msg.receiver,
                timeout: msg.timeout,
                memo: msg.memo,
            },
            Self::PayFee(msg) => LedgerMessage::PayPacketFee {
                recv_fee: Coins::from(coin(&msg.recv_fee)?),
                ack_fee: Coins::from(coin(&msg.ack_fee)?),
                timeout_fee: Coins::from(coin(&msg.timeout_fee)?),
                signer: msg.sender,
                source_port: msg.source_port,
                source_channel: msg.source_channel,
            },
            Self::InitiateTokenDeposit {
                sender,
                bridge_id,
                to,
                token,
                data,
            } => LedgerMessage::InitiateTokenDeposit {
                amount: coin(&token)?,
                sender,
                bridge_id,
                to,
                data,
            },
            Self::InitiateTokenWithdrawal { sender, to, token } => {
                LedgerMessage::InitiateTokenWithdrawal {
                    amount: coin(&token)?,
                    sender,
                    to,
                }
            }
            Self::Execute {
                sender,
                module_address,
                module_name,
                function_name,
                type_args,
                args,
            } => LedgerMessage::Execute {
                sender,
                module_address,
                module_name,
                function_name,
                type_args,
                args,
            },
        })
    }
}

// =============================================================================
// LEDGER MESSAGES
// =============================================================================

/// A concrete ledger message, ready for its handler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerMessage {
    /// `MsgDelegate`.
    Delegate {
        /// Delegator.
        delegator: AccountAddress,
        /// Validator operator.
        validator: String,
        /// Amount.
        amount: Coins,
    },
    /// `MsgFundCommunityPool`.
    FundCommunityPool {
        /// Depositor.
        depositor: AccountAddress,
        /// Amount.
        amount: Coins,
    },
    /// IBC `MsgTransfer`.
    Transfer {
        /// Source port.
        source_port: String,
        /// Source channel.
        source_channel: String,
        /// Token.
        token: Coin,
        /// Sender.
        sender: AccountAddress,
        /// Receiver.
        receiver: String,
        /// Timeout.
        timeout: IbcTimeout,
        /// Memo.
        memo: String,
    },
    /// IBC NFT `MsgTransfer`.
    NftTransfer {
        /// Source port.
        source_port: String,
        /// Source channel.
        source_channel: String,
        /// Class id.
        class_id: String,
        /// Token ids.
        token_ids: Vec<String>,
        /// Sender.
        sender: AccountAddress,
        /// Receiver.
        receiver: String,
        /// Timeout.
        timeout: IbcTimeout,
        /// Memo.
        memo: String,
    },
    /// `MsgPayPacketFee`.
    PayPacketFee {
        /// Source port.
        source_port: String,
        /// Source channel.
        source_channel: String,
        /// Payer.
        signer: AccountAddress,
        /// Receive fee.
        recv_fee: Coins,
        /// Acknowledgement fee.
        ack_fee: Coins,
        /// Timeout fee.
        timeout_fee: Coins,
    },
    /// `MsgInitiateTokenDeposit`.
    InitiateTokenDeposit {
        /// Depositor.
        sender: AccountAddress,
        /// Bridge id.
        bridge_id: u64,
        /// Recipient.
        to: String,
        /// Amount.
        amount: Coin,
        /// Extra data.
        data: Vec<u8>,
    },
    /// `MsgInitiateTokenWithdrawal`.
    InitiateTokenWithdrawal {
        /// Withdrawer.
        sender: AccountAddress,
        /// Recipient.
        to: String,
        /// Amount.
        amount: Coin,
    },
    /// `MsgExecute`.
    Execute {
        /// Caller.
        sender: AccountAddress,
        /// Module address.
        module_address: AccountAddress,
        /// Module name.
        module_name: String,
        /// Function name.
        function_name: String,
        /// Type arguments.
        type_args: Vec<String>,
        /// BCS arguments.
        args: Vec<Vec<u8>>,
    },
}

impl LedgerMessage {
    /// Type URL used for routing.
    #[must_use]
    pub fn type_url(&self) -> &'static str {
        match self {
            Self::Delegate { .. } => type_urls::MSG_DELEGATE,
            Self::FundCommunityPool { .. } => type_urls::MSG_FUND_COMMUNITY_POOL,
            Self::Transfer { .. } => type_urls::MSG_TRANSFER,
            Self::NftTransfer { .. } => type_urls::MSG_NFT_TRANSFER,
            Self::PayPacketFee { .. } => type_urls::MSG_PAY_PACKET_FEE,
            Self::InitiateTokenDeposit { .. } => type_urls::MSG_INITIATE_TOKEN_DEPOSIT,
            Self::InitiateTokenWithdrawal { .. } => type_urls::MSG_INITIATE_TOKEN_WITHDRAWAL,
            Self::Execute { .. } => type_urls::MSG_EXECUTE,
        }
    }

    /// Account that signs the message.
    #[must_use]
    pub fn signer(&self) -> AccountAddress {
        match self {
            Self::Delegate { delegator, .. } => *delegator,
            Self::FundCommunityPool { depositor, .. } => *depositor,
            Self::PayPacketFee { signer, .. } => *signer,
            Self::Transfer { sender, .. }
            | Self::NftTransfer { sender, .. }
            | Self::InitiateTokenDeposit { sender, .. }
            | Self::InitiateTokenWithdrawal { sender, .. }
            | Self::Execute { sender, .. } => *sender,
        }
    }

    /// Stateless validity checks.
    pub fn validate_basic(&self) -> Result<(), BridgeError> {
        match self {
            Self::Delegate { validator, amount, .. } => {
                require(!validator.is_empty(), "empty validator")?;
                require(!amount.is_zero(), "zero delegation")
            }
            Self::FundCommunityPool { amount, .. } => require(!amount.is_zero(), "zero deposit"),
            Self::Transfer {
                source_port,
                source_channel,
                token,
                receiver,
                timeout,
                ..
            } => {
                require_channel(source_port, source_channel)?;
                require(!token.amount.is_zero(), "zero transfer amount")?;
                require(!receiver.is_empty(), "empty receiver")?;
                require(!timeout.is_unset(), "timeout height and timestamp both unset")
            }
            Self::NftTransfer {
                source_port,
                source_channel,
                token_ids,
                receiver,
                timeout,
                ..
            } => {
                require_channel(source_port, source_channel)?;
                require(!token_ids.is_empty(), "no token ids")?;
                require(!receiver.is_empty(), "empty receiver")?;
                require(!timeout.is_unset(), "timeout height and timestamp both unset")
            }
            Self::PayPacketFee {
                source_port,
                source_channel,
                ..
            } => require_channel(source_port, source_channel),
            Self::InitiateTokenDeposit { to, amount, .. }
            | Self::InitiateTokenWithdrawal { to, amount, .. } => {
                require(!to.is_empty(), "empty recipient")?;
                require(!amount.amount.is_zero(), "zero amount")
            }
            Self::Execute {
                module_name,
                function_name,
                ..
            } => {
                require(!module_name.is_empty(), "empty module name")?;
                require(!function_name.is_empty(), "empty function name")
            }
        }
    }
}

fn require(condition: bool, reason: &str) -> Result<(), BridgeError> {
    if condition {
        Ok(())
    } else {
        Err(BridgeError::InvalidRequest(reason.to_string()))
    }
}

fn require_channel(port: &str, channel: &str) -> Result<(), BridgeError> {
    require(!port.is_empty(), "empty source port")?;
    require(!channel.is_empty(), "empty source channel")
}

// =============================================================================
// TESTS
// =============================================================================
