//! Wallet engine capability: per-wallet handles and the events they report.
//!
//! A handle is created once per tracked wallet and driven by a polling loop.
//! Each [`refresh`](TonWallet::refresh) queries the remote state through the
//! supplied transport and returns the deltas observed since the previous
//! call, in order.

use std::fmt;

use async_trait::async_trait;
use ember_core::models::{
    ContractState, ContractType, PendingTransaction, PollingMethod, SignedMessage, TokenTransaction,
    Transaction, TransactionId, TransactionsBatchInfo,
};

use crate::errors::EngineError;
use crate::transport::Transport;

/// Creates wallet handles bound to the live transport.
#[async_trait]
pub trait WalletEngine: Send + Sync {
    /// Start tracking the base wallet for `public_key` / `contract_type`.
    async fn subscribe_ton_wallet(
        &self,
        transport: &dyn Transport,
        public_key: &str,
        contract_type: ContractType,
    ) -> Result<Box<dyn TonWallet>, EngineError>;

    /// Start tracking the token wallet of `owner` for `root_token_contract`.
    async fn subscribe_token_wallet(
        &self,
        transport: &dyn Transport,
        owner: &str,
        root_token_contract: &str,
    ) -> Result<Box<dyn TokenWallet>, EngineError>;
}

/// Deltas reported by a base wallet handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TonWalletEvent {
    /// The contract state changed; carries the full new state.
    StateChanged(ContractState),
    /// A batch of transactions was observed.
    TransactionsFound {
        /// Transactions, newest first.
        transactions: Vec<Transaction>,
        /// Batch bounds and kind.
        info: TransactionsBatchInfo,
    },
    /// A pending message was included in a transaction.
    MessageSent {
        /// The message that was waited for.
        pending: PendingTransaction,
        /// The transaction that included it.
        transaction: Transaction,
    },
    /// A pending message passed its expiry without inclusion.
    MessageExpired(PendingTransaction),
}

/// Deltas reported by a token wallet handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenWalletEvent {
    /// Token balance changed; decimal string.
    BalanceChanged(String),
    /// A batch of token transactions was observed.
    TransactionsFound {
        /// Transactions, newest first.
        transactions: Vec<TokenTransaction>,
        /// Batch bounds and kind.
        info: TransactionsBatchInfo,
    },
}

/// A prepared, not yet signed, external message.
pub trait UnsignedMessage: Send + Sync + fmt::Debug {
    /// Hash of the data to sign (hex).
    fn hash(&self) -> &str;

    /// Unix time after which the message is no longer valid.
    fn expire_at(&self) -> u32;

    /// Attach a signature produced by the key store.
    fn sign(&self, signature: &str) -> Result<SignedMessage, EngineError>;

    /// Produce a message with a zero signature, for fee estimation.
    fn sign_fake(&self) -> SignedMessage;
}

/// Handle to one tracked base wallet.
#[async_trait]
pub trait TonWallet: Send + Sync {
    /// Contract address.
    fn address(&self) -> &str;

    /// Owner public key.
    fn public_key(&self) -> &str;

    /// Contract flavour.
    fn contract_type(&self) -> ContractType;

    /// Last known contract state, if a refresh has succeeded yet.
    fn contract_state(&self) -> Option<&ContractState>;

    /// Whether outbound messages are in flight.
    fn polling_method(&self) -> PollingMethod;

    /// Query remote state and return the deltas since the last refresh.
    async fn refresh(&mut self, transport: &dyn Transport)
    -> Result<Vec<TonWalletEvent>, EngineError>;

    /// Fetch history older than `from`. Results are `Old` batches.
    async fn preload_transactions(
        &mut self,
        transport: &dyn Transport,
        from: &TransactionId,
    ) -> Result<Vec<TonWalletEvent>, EngineError>;

    /// Prepare a transfer. Fails with [`EngineError::ContractNotDeployed`]
    /// when the contract must be deployed before it can send.
    fn prepare_transfer(
        &self,
        state: &ContractState,
        recipient: &str,
        amount: u64,
        bounce: bool,
        payload: Option<&str>,
        timeout_secs: u32,
    ) -> Result<Box<dyn UnsignedMessage>, EngineError>;

    /// Prepare the deployment message for this wallet.
    fn prepare_deploy(&self, timeout_secs: u32) -> Result<Box<dyn UnsignedMessage>, EngineError>;

    /// Estimate the fees for a (possibly fake-signed) message, in nano units.
    async fn estimate_fees(
        &self,
        transport: &dyn Transport,
        message: &SignedMessage,
    ) -> Result<u64, EngineError>;

    /// Submit a signed message and start watching for it.
    async fn send(
        &mut self,
        transport: &dyn Transport,
        message: &SignedMessage,
    ) -> Result<PendingTransaction, EngineError>;
}

/// Handle to one tracked token wallet.
#[async_trait]
pub trait TokenWallet: Send + Sync {
    /// Owner base-wallet address.
    fn owner(&self) -> &str;

    /// Root token contract address.
    fn root_token_contract(&self) -> &str;

    /// Last known balance.
    fn balance(&self) -> &str;

    /// Token wallets have no outbound messages of their own.
    fn polling_method(&self) -> PollingMethod {
        PollingMethod::Manual
    }

    /// Query remote state and return the deltas since the last refresh.
    async fn refresh(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<Vec<TokenWalletEvent>, EngineError>;

    /// Fetch history older than `from`. Results are `Old` batches.
    async fn preload_transactions(
        &mut self,
        transport: &dyn Transport,
        from: &TransactionId,
    ) -> Result<Vec<TokenWalletEvent>, EngineError>;
}
