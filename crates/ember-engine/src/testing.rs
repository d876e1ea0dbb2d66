//! In-memory doubles for every capability trait.
//!
//! Each double exposes its shared state so a test can script engine
//! behaviour (queued wallet events, failing refreshes, slow ticks) and then
//! assert on counters (transports opened/released, refreshes, sends).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ember_core::MessageId;
use ember_core::models::{
    AssetsList, BatchType, ContractState, ContractType, GenTimings, KeyPassword, Message,
    NetworkConfig, PendingTransaction, PollingMethod, Seed, SignedMessage, TonWalletAsset,
    Transaction, TransactionId, TransactionsBatchInfo,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::errors::{EngineError, TransportError};
use crate::storage::{AccountsStorage, KeyStore, KeyValueStore};
use crate::transport::{Transport, TransportFactory};
use crate::wallet::{
    TokenWallet, TokenWalletEvent, TonWallet, TonWalletEvent, UnsignedMessage, WalletEngine,
};

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Counters shared by a [`FakeTransportFactory`] and its transports.
#[derive(Debug, Default)]
pub struct TransportStats {
    opened: AtomicUsize,
    released: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    sends: AtomicUsize,
    connected: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl TransportStats {
    /// Transports opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Transports released so far.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Transports currently open.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open transports.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Requests sent through any transport.
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Network names in connection order.
    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().clone()
    }
}

/// Factory producing [`FakeTransport`]s; can be told to fail per network.
#[derive(Clone, Debug, Default)]
pub struct FakeTransportFactory {
    stats: Arc<TransportStats>,
}

impl FakeTransportFactory {
    /// New factory with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// Make connections to `network` fail until [`allow`](Self::allow) is called.
    pub fn fail(&self, network: &str) {
        let _ = self.stats.failing.lock().insert(network.to_owned());
    }

    /// Let connections to `network` succeed again.
    pub fn allow(&self, network: &str) {
        let _ = self.stats.failing.lock().remove(network);
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn connect(&self, config: &NetworkConfig) -> Result<Arc<dyn Transport>, TransportError> {
        if self.stats.failing.lock().contains(&config.name) {
            return Err(TransportError::Other(format!(
                "scripted connect failure for {}",
                config.name
            )));
        }
        let _ = self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.stats.max_live.fetch_max(live, Ordering::SeqCst);
        self.stats.connected.lock().push(config.name.clone());
        Ok(Arc::new(FakeTransport {
            config: config.clone(),
            stats: Arc::clone(&self.stats),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Transport that answers every request with `{}`.
#[derive(Debug)]
pub struct FakeTransport {
    config: NetworkConfig,
    stats: Arc<TransportStats>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for FakeTransport {
    fn config(&self) -> &NetworkConfig {
        &self.config
    }

    async fn send(&self, _request: Bytes) -> Result<Bytes, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let _ = self.stats.sends.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from_static(b"{}"))
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.stats.released.fetch_add(1, Ordering::SeqCst);
            let _ = self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallet engine
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic address for an account created by [`MemoryAccountsStorage`].
pub fn address_for(public_key: &str, contract_type: ContractType) -> String {
    format!("0:{public_key}-{contract_type:?}")
}

/// Deterministic public key for a seed phrase added to [`MemoryKeyStore`].
pub fn public_key_for(phrase: &str) -> String {
    format!("pk-{}", phrase.replace(' ', "-"))
}

/// Account entry with a computed address and no token wallets.
pub fn assets_list(name: &str, public_key: &str, contract_type: ContractType) -> AssetsList {
    AssetsList {
        name: name.to_owned(),
        ton_wallet: TonWalletAsset {
            address: address_for(public_key, contract_type),
            public_key: public_key.to_owned(),
            contract_type,
        },
        token_wallets: Vec::new(),
    }
}

/// Deployed contract state with the given balance.
pub fn deployed_state(balance: u64) -> ContractState {
    ContractState {
        balance,
        gen_timings: GenTimings::default(),
        last_transaction_id: None,
        is_deployed: true,
    }
}

/// Incoming transaction with the given logical time and value.
pub fn incoming_transaction(lt: u64, from: &str, value: u64) -> Transaction {
    Transaction {
        id: TransactionId {
            lt,
            hash: format!("tx{lt}"),
        },
        prev_trans_id: None,
        created_at: u32::try_from(lt).unwrap_or(u32::MAX),
        aborted: false,
        in_msg: Message {
            src: Some(from.to_owned()),
            dst: None,
            value,
            bounce: false,
            body_hash: None,
        },
        out_msgs: Vec::new(),
    }
}

/// Shared, scriptable state of one fake base wallet.
#[derive(Debug)]
pub struct FakeWalletState {
    queue: Mutex<VecDeque<TonWalletEvent>>,
    contract_state: Mutex<Option<ContractState>>,
    history: Mutex<Vec<Transaction>>,
    sent: Mutex<Vec<SignedMessage>>,
    networks: Mutex<Vec<String>>,
    refreshes: AtomicUsize,
    fail_refresh: AtomicBool,
    fail_send: Mutex<Option<String>>,
    refresh_delay: Mutex<Duration>,
    fees: AtomicU64,
    refresh_started: Notify,
}

impl Default for FakeWalletState {
    fn default() -> Self {
        Self {
            queue: Mutex::default(),
            contract_state: Mutex::new(Some(deployed_state(0))),
            history: Mutex::default(),
            sent: Mutex::default(),
            networks: Mutex::default(),
            refreshes: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            fail_send: Mutex::new(None),
            refresh_delay: Mutex::new(Duration::ZERO),
            fees: AtomicU64::new(10_000_000),
            refresh_started: Notify::new(),
        }
    }
}

impl FakeWalletState {
    /// Queue an event for the next refresh.
    pub fn push(&self, event: TonWalletEvent) {
        self.queue.lock().push_back(event);
    }

    /// Queue a `New` batch of transactions.
    pub fn push_new_transactions(&self, transactions: Vec<Transaction>) {
        let info = batch_info(&transactions, BatchType::New);
        self.push(TonWalletEvent::TransactionsFound { transactions, info });
    }

    /// Set the on-chain state; the next refresh reports it if it changed.
    /// `None` makes the contract state unavailable.
    pub fn set_contract_state(&self, state: Option<ContractState>) {
        *self.contract_state.lock() = state;
    }

    /// Transactions returned by `preload_transactions`, newest first.
    pub fn set_history(&self, history: Vec<Transaction>) {
        *self.history.lock() = history;
    }

    /// Make every refresh fail (or succeed again).
    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Make the next sends fail with `message`, or succeed again with `None`.
    pub fn fail_send(&self, message: Option<&str>) {
        *self.fail_send.lock() = message.map(str::to_owned);
    }

    /// Make each refresh take `delay`.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    /// Fee returned by `estimate_fees`.
    pub fn set_fees(&self, fees: u64) {
        self.fees.store(fees, Ordering::SeqCst);
    }

    /// Queue confirmation of a previously sent message.
    pub fn confirm(&self, body_hash: &MessageId, transaction: Transaction) -> bool {
        let Some(pending) = self.pending_for(body_hash) else {
            return false;
        };
        self.push(TonWalletEvent::MessageSent {
            pending,
            transaction,
        });
        true
    }

    /// Queue expiry of a previously sent message.
    pub fn expire(&self, body_hash: &MessageId) -> bool {
        let Some(pending) = self.pending_for(body_hash) else {
            return false;
        };
        self.push(TonWalletEvent::MessageExpired(pending));
        true
    }

    /// Number of refreshes started.
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Messages submitted through `send`.
    pub fn sent(&self) -> Vec<SignedMessage> {
        self.sent.lock().clone()
    }

    /// Network names seen by each refresh, in order.
    pub fn networks(&self) -> Vec<String> {
        self.networks.lock().clone()
    }

    /// Wait until a refresh has started since the last call.
    pub async fn refresh_started(&self) {
        self.refresh_started.notified().await;
    }

    fn pending_for(&self, body_hash: &MessageId) -> Option<PendingTransaction> {
        self.sent
            .lock()
            .iter()
            .find(|m| &m.body_hash == body_hash)
            .map(|m| PendingTransaction {
                body_hash: m.body_hash.clone(),
                expire_at: m.expire_at,
            })
    }
}

/// Shared, scriptable state of one fake token wallet.
#[derive(Debug, Default)]
pub struct FakeTokenWalletState {
    queue: Mutex<VecDeque<TokenWalletEvent>>,
    refreshes: AtomicUsize,
}

impl FakeTokenWalletState {
    /// Queue an event for the next refresh.
    pub fn push(&self, event: TokenWalletEvent) {
        self.queue.lock().push_back(event);
    }

    /// Number of refreshes started.
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

fn batch_info<T: ember_core::models::HasTransactionId>(
    transactions: &[T],
    batch_type: BatchType,
) -> TransactionsBatchInfo {
    let lts = transactions.iter().map(|t| t.transaction_id().lt);
    TransactionsBatchInfo {
        min_lt: lts.clone().min().unwrap_or(0),
        max_lt: lts.max().unwrap_or(0),
        batch_type,
    }
}

/// Wallet engine whose handles are driven by [`FakeWalletState`].
#[derive(Debug, Default)]
pub struct FakeEngine {
    wallets: Mutex<HashMap<String, Arc<FakeWalletState>>>,
    tokens: Mutex<HashMap<(String, String), Arc<FakeTokenWalletState>>>,
    subscribed: AtomicUsize,
    fail_subscribe: AtomicBool,
}

impl FakeEngine {
    /// New engine with no scripted wallets.
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the base wallet at `address`, created on first access.
    pub fn wallet(&self, address: &str) -> Arc<FakeWalletState> {
        Arc::clone(self.wallets.lock().entry(address.to_owned()).or_default())
    }

    /// State of the token wallet `(owner, root)`, created on first access.
    pub fn token_wallet(&self, owner: &str, root: &str) -> Arc<FakeTokenWalletState> {
        Arc::clone(
            self.tokens
                .lock()
                .entry((owner.to_owned(), root.to_owned()))
                .or_default(),
        )
    }

    /// Number of wallet handles created so far.
    pub fn subscribed(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Make handle creation fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletEngine for FakeEngine {
    async fn subscribe_ton_wallet(
        &self,
        transport: &dyn Transport,
        public_key: &str,
        contract_type: ContractType,
    ) -> Result<Box<dyn TonWallet>, EngineError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(EngineError::Other("scripted subscribe failure".into()));
        }
        let _ = transport.send(Bytes::from_static(b"{}")).await?;
        let _ = self.subscribed.fetch_add(1, Ordering::SeqCst);
        let address = address_for(public_key, contract_type);
        Ok(Box::new(FakeTonWallet {
            state: self.wallet(&address),
            address,
            public_key: public_key.to_owned(),
            contract_type,
            cached: None,
            pending: Vec::new(),
        }))
    }

    async fn subscribe_token_wallet(
        &self,
        transport: &dyn Transport,
        owner: &str,
        root_token_contract: &str,
    ) -> Result<Box<dyn TokenWallet>, EngineError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(EngineError::Other("scripted subscribe failure".into()));
        }
        let _ = transport.send(Bytes::from_static(b"{}")).await?;
        let _ = self.subscribed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTokenWallet {
            state: self.token_wallet(owner, root_token_contract),
            owner: owner.to_owned(),
            root: root_token_contract.to_owned(),
            balance: "0".into(),
        }))
    }
}

/// Base wallet handle backed by a [`FakeWalletState`].
#[derive(Debug)]
pub struct FakeTonWallet {
    state: Arc<FakeWalletState>,
    address: String,
    public_key: String,
    contract_type: ContractType,
    cached: Option<ContractState>,
    pending: Vec<PendingTransaction>,
}

#[async_trait]
impl TonWallet for FakeTonWallet {
    fn address(&self) -> &str {
        &self.address
    }

    fn public_key(&self) -> &str {
        &self.public_key
    }

    fn contract_type(&self) -> ContractType {
        self.contract_type
    }

    fn contract_state(&self) -> Option<&ContractState> {
        self.cached.as_ref()
    }

    fn polling_method(&self) -> PollingMethod {
        if self.pending.is_empty() {
            PollingMethod::Manual
        } else {
            PollingMethod::Reliable
        }
    }

    async fn refresh(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<Vec<TonWalletEvent>, EngineError> {
        let _ = self.state.refreshes.fetch_add(1, Ordering::SeqCst);
        self.state.refresh_started.notify_one();
        let delay = *self.state.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let _ = transport.send(Bytes::from_static(b"{}")).await?;
        self.state
            .networks
            .lock()
            .push(transport.config().name.clone());
        if self.state.fail_refresh.load(Ordering::SeqCst) {
            return Err(EngineError::Other("scripted refresh failure".into()));
        }

        let mut events = Vec::new();
        let remote = self.state.contract_state.lock().clone();
        if remote != self.cached {
            self.cached.clone_from(&remote);
            if let Some(state) = remote {
                events.push(TonWalletEvent::StateChanged(state));
            }
        }
        events.extend(self.state.queue.lock().drain(..));
        for event in &events {
            if let TonWalletEvent::MessageSent { pending, .. } | TonWalletEvent::MessageExpired(pending) =
                event
            {
                self.pending.retain(|p| p.body_hash != pending.body_hash);
            }
        }
        Ok(events)
    }

    async fn preload_transactions(
        &mut self,
        transport: &dyn Transport,
        from: &TransactionId,
    ) -> Result<Vec<TonWalletEvent>, EngineError> {
        let _ = transport.send(Bytes::from_static(b"{}")).await?;
        let transactions: Vec<Transaction> = self
            .state
            .history
            .lock()
            .iter()
            .filter(|t| t.id.lt < from.lt)
            .cloned()
            .collect();
        if transactions.is_empty() {
            return Ok(Vec::new());
        }
        let info = batch_info(&transactions, BatchType::Old);
        Ok(vec![TonWalletEvent::TransactionsFound { transactions, info }])
    }

    fn prepare_transfer(
        &self,
        state: &ContractState,
        recipient: &str,
        amount: u64,
        _bounce: bool,
        _payload: Option<&str>,
        timeout_secs: u32,
    ) -> Result<Box<dyn UnsignedMessage>, EngineError> {
        if !state.is_deployed {
            return Err(EngineError::ContractNotDeployed);
        }
        Ok(Box::new(FakeUnsignedMessage {
            hash: format!("transfer:{}:{recipient}:{amount}", self.address),
            expire_at: 1_000 + timeout_secs,
        }))
    }

    fn prepare_deploy(&self, timeout_secs: u32) -> Result<Box<dyn UnsignedMessage>, EngineError> {
        Ok(Box::new(FakeUnsignedMessage {
            hash: format!("deploy:{}", self.address),
            expire_at: 1_000 + timeout_secs,
        }))
    }

    async fn estimate_fees(
        &self,
        transport: &dyn Transport,
        _message: &SignedMessage,
    ) -> Result<u64, EngineError> {
        let _ = transport.send(Bytes::from_static(b"{}")).await?;
        Ok(self.state.fees.load(Ordering::SeqCst))
    }

    async fn send(
        &mut self,
        transport: &dyn Transport,
        message: &SignedMessage,
    ) -> Result<PendingTransaction, EngineError> {
        let failure = self.state.fail_send.lock().clone();
        if let Some(reason) = failure {
            return Err(EngineError::Other(reason));
        }
        let _ = transport.send(Bytes::from(message.boc.clone())).await?;
        self.state.sent.lock().push(message.clone());
        let pending = PendingTransaction {
            body_hash: message.body_hash.clone(),
            expire_at: message.expire_at,
        };
        self.pending.push(pending.clone());
        Ok(pending)
    }
}

/// Token wallet handle backed by a [`FakeTokenWalletState`].
#[derive(Debug)]
pub struct FakeTokenWallet {
    state: Arc<FakeTokenWalletState>,
    owner: String,
    root: String,
    balance: String,
}

#[async_trait]
impl TokenWallet for FakeTokenWallet {
    fn owner(&self) -> &str {
        &self.owner
    }

    fn root_token_contract(&self) -> &str {
        &self.root
    }

    fn balance(&self) -> &str {
        &self.balance
    }

    async fn refresh(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<Vec<TokenWalletEvent>, EngineError> {
        let _ = self.state.refreshes.fetch_add(1, Ordering::SeqCst);
        let _ = transport.send(Bytes::from_static(b"{}")).await?;
        let events: Vec<_> = self.state.queue.lock().drain(..).collect();
        for event in &events {
            if let TokenWalletEvent::BalanceChanged(balance) = event {
                self.balance.clone_from(balance);
            }
        }
        Ok(events)
    }

    async fn preload_transactions(
        &mut self,
        transport: &dyn Transport,
        _from: &TransactionId,
    ) -> Result<Vec<TokenWalletEvent>, EngineError> {
        let _ = transport.send(Bytes::from_static(b"{}")).await?;
        Ok(Vec::new())
    }
}

/// Unsigned message whose signature is embedded in the body hash.
#[derive(Debug)]
pub struct FakeUnsignedMessage {
    hash: String,
    expire_at: u32,
}

impl FakeUnsignedMessage {
    /// Message with the given hash and expiry.
    pub fn new(hash: impl Into<String>, expire_at: u32) -> Self {
        Self {
            hash: hash.into(),
            expire_at,
        }
    }
}

impl UnsignedMessage for FakeUnsignedMessage {
    fn hash(&self) -> &str {
        &self.hash
    }

    fn expire_at(&self) -> u32 {
        self.expire_at
    }

    fn sign(&self, signature: &str) -> Result<SignedMessage, EngineError> {
        Ok(SignedMessage {
            body_hash: MessageId::from(format!("{}#{signature}", self.hash)),
            expire_at: self.expire_at,
            boc: format!("boc:{}:{signature}", self.hash),
        })
    }

    fn sign_fake(&self) -> SignedMessage {
        SignedMessage {
            body_hash: MessageId::from(format!("{}#fake", self.hash)),
            expire_at: self.expire_at,
            boc: format!("boc:{}:fake", self.hash),
        }
    }
}

/// Build a signed message directly, bypassing the key store.
pub fn signed_message(id: &str) -> SignedMessage {
    SignedMessage {
        body_hash: MessageId::from(id),
        expire_at: 1_060,
        boc: format!("boc:{id}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// Key store holding `(public key → password)` in memory.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, String>>,
    clears: AtomicUsize,
}

impl MemoryKeyStore {
    /// Empty key store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key directly.
    pub fn insert(&self, public_key: &str, password: &str) {
        let _ = self
            .keys
            .lock()
            .insert(public_key.to_owned(), password.to_owned());
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }

    /// Number of `clear` calls.
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn add_key(&self, _name: &str, seed: &Seed, password: &str) -> Result<String, EngineError> {
        let public_key = public_key_for(&seed.phrase);
        self.insert(&public_key, password);
        Ok(public_key)
    }

    async fn check_password(&self, password: &KeyPassword) -> Result<bool, EngineError> {
        Ok(self
            .keys
            .lock()
            .get(&password.public_key)
            .is_some_and(|p| *p == password.password))
    }

    async fn sign(
        &self,
        message: &dyn UnsignedMessage,
        password: &KeyPassword,
    ) -> Result<SignedMessage, EngineError> {
        let matches = match self.keys.lock().get(&password.public_key) {
            None => return Err(EngineError::KeyNotFound(password.public_key.clone())),
            Some(stored) => *stored == password.password,
        };
        if !matches {
            return Err(EngineError::InvalidPassword);
        }
        message.sign(&format!("sig-{}", password.public_key))
    }

    async fn clear(&self) -> Result<(), EngineError> {
        self.keys.lock().clear();
        let _ = self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Accounts storage holding entries in insertion order.
#[derive(Debug, Default)]
pub struct MemoryAccountsStorage {
    accounts: Mutex<Vec<AssetsList>>,
    current: Mutex<Option<String>>,
    clears: AtomicUsize,
}

impl MemoryAccountsStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage preloaded with `accounts`; the first one is current.
    pub fn with_accounts(accounts: Vec<AssetsList>) -> Self {
        let current = accounts.first().map(|a| a.address().to_owned());
        Self {
            accounts: Mutex::new(accounts),
            current: Mutex::new(current),
            clears: AtomicUsize::new(0),
        }
    }

    /// Stored entries.
    pub fn accounts(&self) -> Vec<AssetsList> {
        self.accounts.lock().clone()
    }

    /// Number of `clear` calls.
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    fn find(&self, address: &str) -> Option<AssetsList> {
        self.accounts
            .lock()
            .iter()
            .find(|a| a.address() == address)
            .cloned()
    }
}

#[async_trait]
impl AccountsStorage for MemoryAccountsStorage {
    async fn current_account(&self) -> Result<Option<AssetsList>, EngineError> {
        let current = self.current.lock().clone();
        Ok(current.and_then(|address| self.find(&address)))
    }

    async fn set_current_account(&self, address: &str) -> Result<AssetsList, EngineError> {
        let account = self
            .find(address)
            .ok_or_else(|| EngineError::AccountNotFound(address.to_owned()))?;
        *self.current.lock() = Some(address.to_owned());
        Ok(account)
    }

    async fn get_account(&self, address: &str) -> Result<Option<AssetsList>, EngineError> {
        Ok(self.find(address))
    }

    async fn stored_accounts(&self) -> Result<Vec<AssetsList>, EngineError> {
        Ok(self.accounts())
    }

    async fn add_account(
        &self,
        name: &str,
        public_key: &str,
        contract_type: ContractType,
        make_current: bool,
    ) -> Result<AssetsList, EngineError> {
        let account = assets_list(name, public_key, contract_type);
        {
            let mut accounts = self.accounts.lock();
            accounts.retain(|a| a.address() != account.address());
            accounts.push(account.clone());
        }
        if make_current {
            *self.current.lock() = Some(account.address().to_owned());
        }
        Ok(account)
    }

    async fn remove_account(&self, address: &str) -> Result<Option<AssetsList>, EngineError> {
        let removed = {
            let mut accounts = self.accounts.lock();
            let index = accounts.iter().position(|a| a.address() == address);
            index.map(|i| accounts.remove(i))
        };
        let mut current = self.current.lock();
        if current.as_deref() == Some(address) {
            *current = None;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), EngineError> {
        self.accounts.lock().clear();
        *self.current.lock() = None;
        let _ = self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Key-value store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryKeyValueStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value synchronously.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    /// Make writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), EngineError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::Storage(format!("scripted write failure for {key}")));
        }
        let _ = self.values.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), EngineError> {
        let _ = self.values.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> NetworkConfig {
        NetworkConfig::graphql(name, "https://example.com/graphql", 1_000)
    }

    #[tokio::test]
    async fn transport_counters() {
        let factory = FakeTransportFactory::new();
        let stats = factory.stats();
        let t = factory.connect(&config("A")).await.unwrap();
        assert_eq!((stats.opened(), stats.live()), (1, 1));
        t.shutdown().await;
        t.shutdown().await;
        assert_eq!((stats.released(), stats.live()), (1, 0));
        assert!(t.send(Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn scripted_connect_failure() {
        let factory = FakeTransportFactory::new();
        factory.fail("A");
        assert!(factory.connect(&config("A")).await.is_err());
        factory.allow("A");
        assert!(factory.connect(&config("A")).await.is_ok());
    }

    #[tokio::test]
    async fn wallet_reports_state_once_then_queued_events() {
        let factory = FakeTransportFactory::new();
        let transport = factory.connect(&config("A")).await.unwrap();
        let engine = FakeEngine::new();
        let mut wallet = engine
            .subscribe_ton_wallet(transport.as_ref(), "pk", ContractType::WalletV3)
            .await
            .unwrap();

        let events = wallet.refresh(transport.as_ref()).await.unwrap();
        assert!(matches!(events.as_slice(), [TonWalletEvent::StateChanged(_)]));
        assert!(wallet.refresh(transport.as_ref()).await.unwrap().is_empty());

        let state = engine.wallet(wallet.address());
        state.push_new_transactions(vec![incoming_transaction(5, "0:a", 1)]);
        let events = wallet.refresh(transport.as_ref()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(state.refreshes(), 3);
        assert_eq!(state.networks(), vec!["A", "A", "A"]);
    }

    #[tokio::test]
    async fn sent_message_is_pending_until_confirmed() {
        let factory = FakeTransportFactory::new();
        let transport = factory.connect(&config("A")).await.unwrap();
        let engine = FakeEngine::new();
        let mut wallet = engine
            .subscribe_ton_wallet(transport.as_ref(), "pk", ContractType::WalletV3)
            .await
            .unwrap();
        let message = signed_message("m1");
        let _ = wallet.send(transport.as_ref(), &message).await.unwrap();
        assert_eq!(wallet.polling_method(), PollingMethod::Reliable);

        let state = engine.wallet(wallet.address());
        assert!(state.confirm(&message.body_hash, incoming_transaction(9, "0:b", 0)));
        let _ = wallet.refresh(transport.as_ref()).await.unwrap();
        assert_eq!(wallet.polling_method(), PollingMethod::Manual);
    }

    #[tokio::test]
    async fn key_store_signs_with_correct_password() {
        let keys = MemoryKeyStore::new();
        keys.insert("pk", "pw");
        let message = FakeUnsignedMessage::new("h", 10);
        let good = KeyPassword {
            public_key: "pk".into(),
            password: "pw".into(),
        };
        let bad = KeyPassword {
            public_key: "pk".into(),
            password: "nope".into(),
        };
        assert!(keys.sign(&message, &good).await.is_ok());
        assert!(matches!(
            keys.sign(&message, &bad).await,
            Err(EngineError::InvalidPassword)
        ));
        assert!(!keys.check_password(&bad).await.unwrap());
    }

    #[tokio::test]
    async fn accounts_storage_tracks_current() {
        let storage = MemoryAccountsStorage::new();
        let a = storage
            .add_account("A", "pk1", ContractType::WalletV3, true)
            .await
            .unwrap();
        let _ = storage
            .add_account("B", "pk2", ContractType::SurfWallet, false)
            .await
            .unwrap();
        assert_eq!(storage.current_account().await.unwrap(), Some(a.clone()));
        let removed = storage.remove_account(a.address()).await.unwrap();
        assert_eq!(removed, Some(a));
        assert_eq!(storage.current_account().await.unwrap(), None);
        assert_eq!(storage.stored_accounts().await.unwrap().len(), 1);
    }
}
