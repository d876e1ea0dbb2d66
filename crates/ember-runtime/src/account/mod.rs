//! Account controller: the subscription supervisor.
//!
//! Owns one [`TonWalletSubscription`] per stored account and one
//! [`TokenWalletSubscription`] per `(owner, root token contract)` pair.
//! Starting, stopping, logging out, selecting, removing accounts, and
//! switching networks are serialized by a single controller-wide mutex. When
//! both are needed, that mutex is taken before the connection slot.
//!
//! Subscriptions report into one channel drained by a single mutation task,
//! which is the only place subscription deltas touch [`AccountState`].
//! Updates from a subscription that is no longer registered are dropped.
//!
//! Sent messages are correlated with their outcome by `(address, message id)`.
//! Every pending request reaches exactly one terminal outcome: confirmed,
//! expired, rejected on submission failure, or superseded by stop / log out /
//! account removal.

mod state;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use ember_core::MessageId;
use ember_core::models::{
    AccountToCreate, AssetsList, BatchType, ContractState, KeyPassword, MessageToPrepare,
    NetworkConfig, SignedMessage, TokenTransaction, Transaction, TransactionId,
    TransactionsBatchInfo,
};
use ember_engine::{
    AccountsStorage, EngineError, KeyStore, TokenWallet, TokenWalletEvent, TonWallet,
    TonWalletEvent, UnsignedMessage, WalletEngine, merge_transactions,
};
use ember_settings::EmberSettings;
use futures::future::join_all;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::connection::ConnectionController;
use crate::errors::AccountError;
use crate::notifications::{Notifier, new_transactions_notification};
use crate::subscription::{
    SubscriptionUpdate, TokenWalletSubscription, TonWalletSubscription, WalletGuard, WalletUpdate,
};

pub use state::{AccountEvent, AccountState, PendingMessage};

/// Validity window of prepared messages, in seconds.
const MESSAGE_TIMEOUT_SECS: u32 = 60;

/// Capacity of the account event broadcast.
const EVENT_CAPACITY: usize = 256;

type MessageReply = oneshot::Sender<Result<Transaction, AccountError>>;
type TokenKey = (String, String);

/// External collaborators of the account controller.
#[derive(Clone)]
pub struct AccountDeps {
    /// Connection controller handing out leases.
    pub connection: Arc<ConnectionController>,
    /// Wallet engine creating wallet handles.
    pub engine: Arc<dyn WalletEngine>,
    /// Encrypted key storage.
    pub key_store: Arc<dyn KeyStore>,
    /// Account entries storage.
    pub accounts_storage: Arc<dyn AccountsStorage>,
    /// User-facing notification sink.
    pub notifier: Arc<dyn Notifier>,
}

/// Subscription supervisor and owner of [`AccountState`].
pub struct AccountController {
    deps: AccountDeps,
    settings: EmberSettings,
    accounts_mutex: tokio::sync::Mutex<()>,
    ton_subscriptions: DashMap<String, Arc<TonWalletSubscription>>,
    token_subscriptions: DashMap<TokenKey, Arc<TokenWalletSubscription>>,
    message_requests: parking_lot::Mutex<HashMap<String, HashMap<MessageId, MessageReply>>>,
    intensive: AtomicBool,
    state: watch::Sender<AccountState>,
    events: broadcast::Sender<AccountEvent>,
    updates: mpsc::UnboundedSender<SubscriptionUpdate>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AccountController {
    /// Create the controller and spawn its mutation task.
    pub fn new(deps: AccountDeps, settings: EmberSettings) -> Arc<Self> {
        let (updates, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(AccountState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let worker = tokio::spawn(mutation_loop(weak.clone(), rx));
            Self {
                deps,
                settings,
                accounts_mutex: tokio::sync::Mutex::new(()),
                ton_subscriptions: DashMap::new(),
                token_subscriptions: DashMap::new(),
                message_requests: parking_lot::Mutex::new(HashMap::new()),
                intensive: AtomicBool::new(false),
                state,
                events,
                updates,
                worker: parking_lot::Mutex::new(Some(worker)),
            }
        })
    }

    // ── State access ────────────────────────────────────────────────────

    /// Snapshot of the current state.
    pub fn state(&self) -> AccountState {
        self.state.borrow().clone()
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<AccountState> {
        self.state.subscribe()
    }

    /// Receive account events for fan-out.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AccountEvent> {
        self.events.subscribe()
    }

    /// Addresses with an active wallet subscription, sorted.
    pub fn subscribed_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .ton_subscriptions
            .iter()
            .map(|e| e.key().clone())
            .collect();
        addresses.sort();
        addresses
    }

    /// Number of active token wallet subscriptions.
    pub fn token_subscription_count(&self) -> usize {
        self.token_subscriptions.len()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Load the current account and stored entries from storage.
    #[instrument(skip_all)]
    pub async fn initial_sync(&self) -> Result<(), AccountError> {
        let storage = &self.deps.accounts_storage;
        let selected = storage
            .current_account()
            .await
            .map_err(AccountError::Storage)?;
        let stored = storage
            .stored_accounts()
            .await
            .map_err(AccountError::Storage)?;

        let mut entries: BTreeMap<String, Vec<AssetsList>> = BTreeMap::new();
        for entry in stored {
            entries
                .entry(entry.ton_wallet.public_key.clone())
                .or_default()
                .push(entry);
        }
        info!(accounts = entries.values().map(Vec::len).sum::<usize>(), "accounts loaded");

        self.state.send_modify(|state| {
            state.selected_account = selected;
            state.account_entries = entries;
        });
        Ok(())
    }

    /// Subscribe every known account entry that is not subscribed yet.
    ///
    /// Idempotent. A failing entry does not prevent the others from being
    /// subscribed; the first failure is returned.
    #[instrument(skip_all)]
    pub async fn start_subscriptions(&self) -> Result<(), AccountError> {
        let _guard = self.accounts_mutex.lock().await;
        debug!("start_subscriptions: mutex gained");
        let result = self.start_subscriptions_locked().await;
        debug!("start_subscriptions: mutex released");
        result
    }

    /// Stop every subscription and supersede every pending message.
    #[instrument(skip_all)]
    pub async fn stop_subscriptions(&self) {
        let _guard = self.accounts_mutex.lock().await;
        debug!("stop_subscriptions: mutex gained");
        self.stop_subscriptions_locked().await;
        debug!("stop_subscriptions: mutex released");
    }

    /// Move every subscription to `config`.
    ///
    /// Subscriptions are stopped (pending messages are superseded), the
    /// connection is replaced, and subscriptions are restarted, all under the
    /// controller mutex. The mutex is always taken before the connection
    /// slot. On connection failure subscriptions stay stopped.
    #[instrument(skip_all, fields(network = %config.name))]
    pub async fn change_network(&self, config: NetworkConfig) -> Result<(), AccountError> {
        let _guard = self.accounts_mutex.lock().await;
        debug!("change_network: mutex gained");

        self.stop_subscriptions_locked().await;
        self.deps
            .connection
            .start_switching_network(config)
            .await
            .switch()
            .await?;

        if let Err(error) = self.start_subscriptions_locked().await {
            warn!(%error, "some wallet subscriptions failed to restart");
        }
        debug!("change_network: mutex released");
        Ok(())
    }

    async fn start_subscriptions_locked(&self) -> Result<(), AccountError> {
        let entries: Vec<AssetsList> = self.state.borrow().entries().cloned().collect();
        let mut first_error = None;

        for entry in entries {
            let address = entry.address().to_owned();
            if !self.ton_subscriptions.contains_key(&address) {
                match self.create_ton_subscription(&entry).await {
                    Ok(subscription) => {
                        let _ = self.ton_subscriptions.insert(address.clone(), subscription);
                    }
                    Err(error) => {
                        warn!(%address, %error, "failed to subscribe to wallet");
                        let _ = first_error.get_or_insert(error);
                    }
                }
            }

            for token in &entry.token_wallets {
                let key = (address.clone(), token.root_token_contract.clone());
                if self.token_subscriptions.contains_key(&key) {
                    continue;
                }
                match self.create_token_subscription(&key.0, &key.1).await {
                    Ok(subscription) => {
                        let _ = self.token_subscriptions.insert(key, subscription);
                    }
                    Err(error) => {
                        warn!(
                            owner = %key.0,
                            root_token_contract = %key.1,
                            %error,
                            "failed to subscribe to token wallet"
                        );
                        let _ = first_error.get_or_insert(error);
                    }
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stop everything, wipe key and account storage, and reset state.
    ///
    /// State is reset even when wiping storage fails; the first storage
    /// error is returned.
    #[instrument(skip_all)]
    pub async fn log_out(&self) -> Result<(), AccountError> {
        let _guard = self.accounts_mutex.lock().await;
        debug!("log_out: mutex gained");

        self.stop_subscriptions_locked().await;
        let accounts = self.deps.accounts_storage.clear().await;
        let keys = self.deps.key_store.clear().await;
        let _ = self.state.send_replace(AccountState::default());
        info!("logged out");

        accounts.and(keys).map_err(AccountError::Storage)
    }

    /// Create a key and an account for it, select it, and subscribe.
    #[instrument(skip_all, fields(name = %account.name))]
    pub async fn create_account(&self, account: AccountToCreate) -> Result<AssetsList, AccountError> {
        let AccountToCreate {
            name,
            contract_type,
            seed,
            password,
        } = account;

        let public_key = self
            .deps
            .key_store
            .add_key(&format!("{name} key"), &seed, &password)
            .await
            .map_err(AccountError::Storage)?;
        let selected = self
            .deps
            .accounts_storage
            .add_account(&name, &public_key, contract_type, true)
            .await
            .map_err(AccountError::Storage)?;

        self.state.send_modify(|state| {
            state.insert_entry(selected.clone());
            state.selected_account = Some(selected.clone());
        });
        info!(address = %selected.address(), "account created");

        self.start_subscriptions().await?;
        Ok(selected)
    }

    /// Make `address` the selected account.
    #[instrument(skip(self))]
    pub async fn select_account(&self, address: &str) -> Result<AssetsList, AccountError> {
        let _guard = self.accounts_mutex.lock().await;
        let selected = self
            .deps
            .accounts_storage
            .set_current_account(address)
            .await
            .map_err(AccountError::Storage)?;
        self.state.send_modify(|state| state.selected_account = Some(selected.clone()));
        Ok(selected)
    }

    /// Remove an account: stop its subscriptions, supersede its pending
    /// messages, and drop its state slots.
    #[instrument(skip(self))]
    pub async fn remove_account(&self, address: &str) -> Result<(), AccountError> {
        let _guard = self.accounts_mutex.lock().await;

        let removed = self
            .deps
            .accounts_storage
            .remove_account(address)
            .await
            .map_err(AccountError::Storage)?;

        let ton = self.ton_subscriptions.remove(address).map(|(_, s)| s);
        let token_keys: Vec<TokenKey> = self
            .token_subscriptions
            .iter()
            .filter(|e| e.key().0 == address)
            .map(|e| e.key().clone())
            .collect();
        let tokens: Vec<_> = token_keys
            .iter()
            .filter_map(|key| self.token_subscriptions.remove(key).map(|(_, s)| s))
            .collect();
        if let Some(subscription) = &ton {
            subscription.stop().await;
        }
        let _ = join_all(tokens.iter().map(|s| s.stop())).await;

        self.reject_account_requests(address);

        let current = match self.deps.accounts_storage.current_account().await {
            Ok(current) => current,
            Err(error) => {
                warn!(%error, "failed to read current account");
                None
            }
        };
        self.state.send_modify(|state| {
            state.remove_account(address);
            state.selected_account = current;
        });
        if removed.is_none() {
            debug!("account was not in storage");
        }
        Ok(())
    }

    /// Whether `password` unlocks its key.
    pub async fn check_password(&self, password: &KeyPassword) -> Result<bool, AccountError> {
        Ok(self.deps.key_store.check_password(password).await?)
    }

    // ── Polling cadence ─────────────────────────────────────────────────

    /// Switch every subscription to the active interval and poll now.
    pub fn enable_intensive_polling(&self) {
        debug!("enable intensive polling");
        self.intensive.store(true, Ordering::SeqCst);
        let interval = self.settings.polling.active_interval();
        for subscription in &self.ton_subscriptions {
            subscription.set_polling_interval(interval);
            subscription.skip_refresh_timer();
        }
        for subscription in &self.token_subscriptions {
            subscription.set_polling_interval(interval);
            subscription.skip_refresh_timer();
        }
    }

    /// Switch every subscription to the idle interval.
    pub fn disable_intensive_polling(&self) {
        debug!("disable intensive polling");
        self.intensive.store(false, Ordering::SeqCst);
        let interval = self.settings.polling.idle_interval();
        for subscription in &self.ton_subscriptions {
            subscription.set_polling_interval(interval);
        }
        for subscription in &self.token_subscriptions {
            subscription.set_polling_interval(interval);
        }
    }

    /// Whether intensive polling is on.
    pub fn is_intensive_polling(&self) -> bool {
        self.intensive.load(Ordering::SeqCst)
    }

    // ── Wallet operations ───────────────────────────────────────────────

    /// Borrow the base wallet at `address` with a connection lease.
    pub async fn use_ton_wallet<T, F, Fut>(&self, address: &str, f: F) -> Result<T, AccountError>
    where
        F: FnOnce(WalletGuard<Box<dyn TonWallet>>) -> Fut,
        Fut: Future<Output = Result<T, AccountError>>,
    {
        self.ton_subscription(address)?.use_wallet(f).await
    }

    /// Borrow the token wallet `(owner, root_token_contract)` with a
    /// connection lease.
    pub async fn use_token_wallet<T, F, Fut>(
        &self,
        owner: &str,
        root_token_contract: &str,
        f: F,
    ) -> Result<T, AccountError>
    where
        F: FnOnce(WalletGuard<Box<dyn TokenWallet>>) -> Fut,
        Fut: Future<Output = Result<T, AccountError>>,
    {
        let key = (owner.to_owned(), root_token_contract.to_owned());
        let subscription = self
            .token_subscriptions
            .get(&key)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| AccountError::NoSubscription(owner.to_owned()))?;
        subscription.use_wallet(f).await
    }

    /// Estimate the fees of a transfer from `address`, in nano units.
    #[instrument(skip(self, params))]
    pub async fn estimate_fees(
        &self,
        address: &str,
        params: MessageToPrepare,
    ) -> Result<u64, AccountError> {
        let address = address.to_owned();
        self.use_ton_wallet(&address.clone(), |guard| async move {
            let wallet = guard.wallet();
            let state = known_state(wallet.as_ref(), &address)?;
            let unsigned = prepare_transfer(wallet.as_ref(), &state, &params)?;
            let message = unsigned.sign_fake();
            Ok(wallet.estimate_fees(guard.transport(), &message).await?)
        })
        .await
    }

    /// Estimate the fees of deploying the wallet at `address`.
    #[instrument(skip(self))]
    pub async fn estimate_deployment_fees(&self, address: &str) -> Result<u64, AccountError> {
        let address = address.to_owned();
        self.use_ton_wallet(&address.clone(), |guard| async move {
            let wallet = guard.wallet();
            let _ = known_state(wallet.as_ref(), &address)?;
            let unsigned = wallet.prepare_deploy(MESSAGE_TIMEOUT_SECS)?;
            let message = unsigned.sign_fake();
            Ok(wallet.estimate_fees(guard.transport(), &message).await?)
        })
        .await
    }

    /// Prepare and sign a transfer from `address`.
    #[instrument(skip(self, params, password))]
    pub async fn prepare_message(
        &self,
        address: &str,
        params: MessageToPrepare,
        password: KeyPassword,
    ) -> Result<SignedMessage, AccountError> {
        let address = address.to_owned();
        let key_store = Arc::clone(&self.deps.key_store);
        self.use_ton_wallet(&address.clone(), |guard| async move {
            let wallet = guard.wallet();
            let state = known_state(wallet.as_ref(), &address)?;
            let unsigned = prepare_transfer(wallet.as_ref(), &state, &params)?;
            Ok(key_store.sign(unsigned.as_ref(), &password).await?)
        })
        .await
    }

    /// Prepare and sign the deployment message of the wallet at `address`.
    #[instrument(skip(self, password))]
    pub async fn prepare_deployment_message(
        &self,
        address: &str,
        password: KeyPassword,
    ) -> Result<SignedMessage, AccountError> {
        let address = address.to_owned();
        let key_store = Arc::clone(&self.deps.key_store);
        self.use_ton_wallet(&address.clone(), |guard| async move {
            let wallet = guard.wallet();
            let _ = known_state(wallet.as_ref(), &address)?;
            let unsigned = wallet.prepare_deploy(MESSAGE_TIMEOUT_SECS)?;
            Ok(key_store.sign(unsigned.as_ref(), &password).await?)
        })
        .await
    }

    /// Sign an already prepared message.
    pub async fn sign_prepared_message(
        &self,
        message: &dyn UnsignedMessage,
        password: &KeyPassword,
    ) -> Result<SignedMessage, AccountError> {
        Ok(self.deps.key_store.sign(message, password).await?)
    }

    /// Submit a signed message from `address` and wait for its outcome.
    ///
    /// Resolves with the including transaction once the subscription
    /// observes it. Fails with [`AccountError::Expired`] on engine-reported
    /// expiry, with the submission error if submitting fails, and with
    /// [`AccountError::Superseded`] if subscriptions are stopped first.
    #[instrument(skip(self, message), fields(message_id = %message.body_hash))]
    pub async fn send_message(
        &self,
        address: &str,
        message: SignedMessage,
    ) -> Result<Transaction, AccountError> {
        let subscription = self.ton_subscription(address)?;
        let id = message.body_hash.clone();
        let reply = self.register_message_request(address, &id, message.expire_at)?;

        if self.is_registered(address, &subscription) {
            subscription.prepare_reliable_polling();
            let sent = subscription
                .use_wallet(|mut guard| async move {
                    let (wallet, transport) = guard.split();
                    Ok(wallet.send(transport, &message).await?)
                })
                .await;
            match sent {
                Ok(_) => {
                    debug!("message submitted");
                    subscription.skip_refresh_timer();
                }
                Err(error) => {
                    warn!(%error, "message submission failed");
                    self.reject_message_request(address, &id, error);
                }
            }
        } else {
            // stopped between lookup and registration
            self.reject_message_request(address, &id, AccountError::Superseded);
        }

        reply.await.unwrap_or(Err(AccountError::Superseded))
    }

    /// Fetch history of `address` older than `from`. The batch is merged
    /// silently when it arrives.
    #[instrument(skip(self))]
    pub async fn preload_transactions(
        &self,
        address: &str,
        from: TransactionId,
    ) -> Result<(), AccountError> {
        self.ton_subscription(address)?
            .preload_transactions(&from)
            .await
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn ton_subscription(&self, address: &str) -> Result<Arc<TonWalletSubscription>, AccountError> {
        self.ton_subscriptions
            .get(address)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| AccountError::NoSubscription(address.to_owned()))
    }

    fn is_registered(&self, address: &str, subscription: &TonWalletSubscription) -> bool {
        self.ton_subscriptions
            .get(address)
            .is_some_and(|e| e.id() == subscription.id())
    }

    fn initial_interval(&self) -> std::time::Duration {
        if self.is_intensive_polling() {
            self.settings.polling.active_interval()
        } else {
            self.settings.polling.idle_interval()
        }
    }

    async fn create_ton_subscription(
        &self,
        entry: &AssetsList,
    ) -> Result<Arc<TonWalletSubscription>, AccountError> {
        let subscription = TonWalletSubscription::subscribe(
            Arc::clone(&self.deps.connection),
            self.deps.engine.as_ref(),
            &entry.ton_wallet.public_key,
            entry.ton_wallet.contract_type,
            self.updates.clone(),
            &self.settings.polling,
        )
        .await?;
        subscription.set_polling_interval(self.initial_interval());
        subscription.start();
        debug!(address = %entry.address(), subscription = %subscription.id(), "wallet subscribed");
        Ok(Arc::new(subscription))
    }

    async fn create_token_subscription(
        &self,
        owner: &str,
        root_token_contract: &str,
    ) -> Result<Arc<TokenWalletSubscription>, AccountError> {
        let subscription = TokenWalletSubscription::subscribe(
            Arc::clone(&self.deps.connection),
            self.deps.engine.as_ref(),
            owner,
            root_token_contract,
            self.updates.clone(),
            &self.settings.polling,
        )
        .await?;
        subscription.set_polling_interval(self.initial_interval());
        subscription.start();
        debug!(owner, root_token_contract, subscription = %subscription.id(), "token wallet subscribed");
        Ok(Arc::new(subscription))
    }

    async fn stop_subscriptions_locked(&self) {
        let ton: Vec<_> = self
            .ton_subscriptions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        let token: Vec<_> = self
            .token_subscriptions
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        self.ton_subscriptions.clear();
        self.token_subscriptions.clear();

        let _ = join_all(ton.iter().map(|s| s.stop())).await;
        let _ = join_all(token.iter().map(|s| s.stop())).await;
        debug!(wallets = ton.len(), tokens = token.len(), "subscriptions stopped");

        self.clear_message_requests();
    }

    // ── Pending message table ───────────────────────────────────────────

    fn register_message_request(
        &self,
        address: &str,
        id: &MessageId,
        expire_at: u32,
    ) -> Result<oneshot::Receiver<Result<Transaction, AccountError>>, AccountError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut requests = self.message_requests.lock();
            let account = requests.entry(address.to_owned()).or_default();
            if account.contains_key(id) {
                return Err(AccountError::MessageAlreadyPending {
                    address: address.to_owned(),
                    message_id: id.to_string(),
                });
            }
            let _ = account.insert(id.clone(), tx);
        }
        self.state.send_modify(|state| {
            let _ = state
                .account_pending_messages
                .entry(address.to_owned())
                .or_default()
                .insert(id.clone(), PendingMessage { expire_at });
        });
        Ok(rx)
    }

    fn take_message_request(&self, address: &str, id: &MessageId) -> Option<MessageReply> {
        let reply = {
            let mut requests = self.message_requests.lock();
            let account = requests.get_mut(address)?;
            let reply = account.remove(id);
            if account.is_empty() {
                let _ = requests.remove(address);
            }
            reply
        }?;
        self.state.send_modify(|state| {
            if let Some(pending) = state.account_pending_messages.get_mut(address) {
                let _ = pending.remove(id);
                if pending.is_empty() {
                    let _ = state.account_pending_messages.remove(address);
                }
            }
        });
        Some(reply)
    }

    fn resolve_message_request(&self, address: &str, id: &MessageId, transaction: Transaction) {
        match self.take_message_request(address, id) {
            Some(reply) => {
                info!(address, message_id = %id, "message confirmed");
                let _ = reply.send(Ok(transaction));
            }
            None => debug!(address, message_id = %id, "no pending request for sent message"),
        }
    }

    fn reject_message_request(&self, address: &str, id: &MessageId, error: AccountError) {
        match self.take_message_request(address, id) {
            Some(reply) => {
                info!(address, message_id = %id, %error, "message request rejected");
                let _ = reply.send(Err(error));
            }
            None => debug!(address, message_id = %id, "no pending request to reject"),
        }
    }

    fn reject_account_requests(&self, address: &str) {
        let requests = self.message_requests.lock().remove(address);
        for (_, reply) in requests.into_iter().flatten() {
            let _ = reply.send(Err(AccountError::Superseded));
        }
        self.state.send_modify(|state| {
            let _ = state.account_pending_messages.remove(address);
        });
    }

    fn clear_message_requests(&self) {
        let requests = std::mem::take(&mut *self.message_requests.lock());
        let mut count = 0usize;
        for reply in requests.into_values().flat_map(HashMap::into_values) {
            let _ = reply.send(Err(AccountError::Superseded));
            count += 1;
        }
        if count > 0 {
            info!(count, "pending message requests superseded");
        }
        self.state.send_modify(|state| state.account_pending_messages.clear());
    }

    // ── Update ingestion ────────────────────────────────────────────────

    fn apply(&self, update: SubscriptionUpdate) {
        let SubscriptionUpdate {
            subscription,
            update,
        } = update;
        match update {
            WalletUpdate::Ton { address, event } => {
                let current = self
                    .ton_subscriptions
                    .get(&address)
                    .is_some_and(|e| *e.id() == subscription);
                if !current {
                    debug!(%address, %subscription, "dropping update from stale subscription");
                    return;
                }
                self.apply_ton_event(&address, event);
            }
            WalletUpdate::Token {
                owner,
                root_token_contract,
                event,
            } => {
                let key = (owner, root_token_contract);
                let current = self
                    .token_subscriptions
                    .get(&key)
                    .is_some_and(|e| *e.id() == subscription);
                if !current {
                    debug!(owner = %key.0, %subscription, "dropping update from stale subscription");
                    return;
                }
                self.apply_token_event(&key.0, &key.1, event);
            }
        }
    }

    fn apply_ton_event(&self, address: &str, event: TonWalletEvent) {
        match event {
            TonWalletEvent::StateChanged(state) => self.update_contract_state(address, state),
            TonWalletEvent::TransactionsFound { transactions, info } => {
                self.update_transactions(address, transactions, info);
            }
            TonWalletEvent::MessageSent {
                pending,
                transaction,
            } => self.resolve_message_request(address, &pending.body_hash, transaction),
            TonWalletEvent::MessageExpired(pending) => {
                self.reject_message_request(address, &pending.body_hash, AccountError::Expired);
            }
        }
    }

    fn apply_token_event(&self, owner: &str, root_token_contract: &str, event: TokenWalletEvent) {
        match event {
            TokenWalletEvent::BalanceChanged(balance) => {
                self.update_token_balance(owner, root_token_contract, balance);
            }
            TokenWalletEvent::TransactionsFound { transactions, info } => {
                self.update_token_transactions(owner, root_token_contract, transactions, &info);
            }
        }
    }

    fn update_contract_state(&self, address: &str, contract_state: ContractState) {
        self.state.send_modify(|state| {
            let _ = state
                .account_contract_states
                .insert(address.to_owned(), contract_state.clone());
        });
        let _ = self.events.send(AccountEvent::ContractStateChanged {
            address: address.to_owned(),
            state: contract_state,
        });
    }

    fn update_token_balance(&self, owner: &str, root_token_contract: &str, balance: String) {
        self.state.send_modify(|state| {
            let _ = state
                .account_token_balances
                .entry(owner.to_owned())
                .or_default()
                .insert(root_token_contract.to_owned(), balance.clone());
        });
        let _ = self.events.send(AccountEvent::TokenBalanceChanged {
            owner: owner.to_owned(),
            root_token_contract: root_token_contract.to_owned(),
            balance,
        });
    }

    fn update_transactions(
        &self,
        address: &str,
        transactions: Vec<Transaction>,
        info: TransactionsBatchInfo,
    ) {
        let mut inserted = Vec::new();
        let _ = self.state.send_if_modified(|state| {
            let known = state
                .account_transactions
                .entry(address.to_owned())
                .or_default();
            inserted = merge_transactions(known, transactions, &info);
            !inserted.is_empty()
        });
        if inserted.is_empty() {
            debug!(address, "batch holds no unseen transactions");
            return;
        }

        if info.batch_type == BatchType::New && self.settings.notifications.enabled {
            if let Some((title, body)) = new_transactions_notification(&inserted) {
                self.deps.notifier.show(&title, &body);
            }
        }
        let _ = self.events.send(AccountEvent::TransactionsFound {
            address: address.to_owned(),
            transactions: inserted,
            info,
        });
    }

    fn update_token_transactions(
        &self,
        owner: &str,
        root_token_contract: &str,
        transactions: Vec<TokenTransaction>,
        info: &TransactionsBatchInfo,
    ) {
        let _ = self.state.send_if_modified(|state| {
            let known = state
                .account_token_transactions
                .entry(owner.to_owned())
                .or_default()
                .entry(root_token_contract.to_owned())
                .or_default();
            !merge_transactions(known, transactions, info).is_empty()
        });
    }
}

impl Drop for AccountController {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

/// Single consumer of subscription updates.
async fn mutation_loop(
    controller: Weak<AccountController>,
    mut rx: mpsc::UnboundedReceiver<SubscriptionUpdate>,
) {
    while let Some(update) = rx.recv().await {
        let Some(controller) = controller.upgrade() else {
            break;
        };
        controller.apply(update);
    }
}

fn known_state(wallet: &dyn TonWallet, address: &str) -> Result<ContractState, AccountError> {
    wallet
        .contract_state()
        .cloned()
        .ok_or_else(|| AccountError::StateUnavailable(address.to_owned()))
}

fn prepare_transfer(
    wallet: &dyn TonWallet,
    state: &ContractState,
    params: &MessageToPrepare,
) -> Result<Box<dyn UnsignedMessage>, AccountError> {
    wallet
        .prepare_transfer(
            state,
            &params.recipient,
            params.amount,
            false,
            params.payload.as_deref(),
            MESSAGE_TIMEOUT_SECS,
        )
        .map_err(|error| match error {
            EngineError::ContractNotDeployed => AccountError::ContractNotDeployed,
            other => AccountError::Engine(other),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use ember_core::SubscriptionId;
    use ember_core::models::{ContractType, Seed, TokenWalletAsset};
    use ember_engine::testing::{
        FakeEngine, FakeTransportFactory, MemoryAccountsStorage, MemoryKeyStore,
        MemoryKeyValueStore, address_for, assets_list, deployed_state, incoming_transaction,
        public_key_for, signed_message,
    };
    use ember_engine::{KeyValueStore, TransportFactory};
    use ember_settings::{NetworkSettings, PollingSettings};

    const PK: &str = "pk";
    const ROOT: &str = "0:root";

    #[derive(Default)]
    struct RecordingNotifier {
        shown: parking_lot::Mutex<Vec<(String, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn show(&self, title: &str, body: &str) {
            self.shown.lock().push((title.to_owned(), body.to_owned()));
        }
    }

    struct Fixture {
        controller: Arc<AccountController>,
        engine: Arc<FakeEngine>,
        keys: Arc<MemoryKeyStore>,
        storage: Arc<MemoryAccountsStorage>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn fixture(accounts: Vec<AssetsList>) -> Fixture {
        let connection = Arc::new(ConnectionController::new(
            Arc::new(FakeTransportFactory::new()) as Arc<dyn TransportFactory>,
            Arc::new(MemoryKeyValueStore::new()) as Arc<dyn KeyValueStore>,
            NetworkSettings::default(),
        ));
        connection.initial_sync().await.unwrap();

        let engine = Arc::new(FakeEngine::new());
        let keys = Arc::new(MemoryKeyStore::new());
        keys.insert(PK, "secret");
        let storage = Arc::new(MemoryAccountsStorage::with_accounts(accounts));
        let notifier = Arc::new(RecordingNotifier::default());

        let controller = AccountController::new(
            AccountDeps {
                connection,
                engine: Arc::clone(&engine) as Arc<dyn WalletEngine>,
                key_store: Arc::clone(&keys) as Arc<dyn KeyStore>,
                accounts_storage: Arc::clone(&storage) as Arc<dyn AccountsStorage>,
                notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
            },
            EmberSettings::default(),
        );
        controller.initial_sync().await.unwrap();

        Fixture {
            controller,
            engine,
            keys,
            storage,
            notifier,
        }
    }

    fn account() -> AssetsList {
        assets_list("Main", PK, ContractType::WalletV3)
    }

    fn address() -> String {
        address_for(PK, ContractType::WalletV3)
    }

    fn password() -> KeyPassword {
        KeyPassword {
            public_key: PK.into(),
            password: "secret".into(),
        }
    }

    async fn started(accounts: Vec<AssetsList>) -> Fixture {
        let f = fixture(accounts).await;
        f.controller.start_subscriptions().await.unwrap();
        let address = address();
        wait_state(&f.controller, |s| {
            s.account_contract_states.contains_key(&address)
        })
        .await;
        f
    }

    async fn wait_state(controller: &AccountController, f: impl FnMut(&AccountState) -> bool) {
        let mut rx = controller.subscribe_state();
        let _ = rx.wait_for(f).await.unwrap();
    }

    async fn until(mut f: impl FnMut() -> bool) {
        while !f() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn spawn_send(
        controller: &Arc<AccountController>,
        id: &str,
    ) -> JoinHandle<Result<Transaction, AccountError>> {
        let controller = Arc::clone(controller);
        let message = signed_message(id);
        tokio::spawn(async move { controller.send_message(&address(), message).await })
    }

    #[tokio::test(start_paused = true)]
    async fn initial_sync_loads_entries_and_selection() {
        let other = assets_list("Second", "pk2", ContractType::SurfWallet);
        let f = fixture(vec![account(), other]).await;

        let state = f.controller.state();
        assert_eq!(state.selected_account, Some(account()));
        assert_eq!(state.entries().count(), 2);
        assert!(state.find_entry("0:pk2-SurfWallet").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn start_subscriptions_is_idempotent() {
        let mut entry = account();
        entry.token_wallets.push(TokenWalletAsset {
            root_token_contract: ROOT.into(),
        });
        let f = fixture(vec![entry]).await;

        f.controller.start_subscriptions().await.unwrap();
        f.controller.start_subscriptions().await.unwrap();

        assert_eq!(f.engine.subscribed(), 2);
        assert_eq!(f.controller.subscribed_addresses(), vec![address()]);
        assert_eq!(f.controller.token_subscription_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_entry_does_not_block_the_rest() {
        let f = fixture(vec![account()]).await;
        f.engine.fail_subscribe(true);
        assert_matches!(
            f.controller.start_subscriptions().await,
            Err(AccountError::Engine(EngineError::Other(_)))
        );
        assert!(f.controller.subscribed_addresses().is_empty());

        f.engine.fail_subscribe(false);
        f.controller.start_subscriptions().await.unwrap();
        assert_eq!(f.controller.subscribed_addresses(), vec![address()]);
    }

    #[tokio::test(start_paused = true)]
    async fn state_changes_are_broadcast() {
        let f = fixture(vec![account()]).await;
        let mut events = f.controller.subscribe_events();
        f.controller.start_subscriptions().await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            AccountEvent::ContractStateChanged {
                address: address(),
                state: deployed_state(0),
            }
        );
        assert_eq!(
            f.controller.state().account_contract_states.get(&address()),
            Some(&deployed_state(0))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn token_balance_lands_in_state() {
        let mut entry = account();
        entry.token_wallets.push(TokenWalletAsset {
            root_token_contract: ROOT.into(),
        });
        let f = fixture(vec![entry]).await;
        f.engine
            .token_wallet(&address(), ROOT)
            .push(TokenWalletEvent::BalanceChanged("42".into()));
        f.controller.start_subscriptions().await.unwrap();

        let owner = address();
        wait_state(&f.controller, |s| {
            s.account_token_balances
                .get(&owner)
                .and_then(|b| b.get(ROOT))
                .is_some_and(|b| b == "42")
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_transactions_are_merged_and_notified() {
        let f = started(vec![account()]).await;
        f.engine
            .wallet(&address())
            .push_new_transactions(vec![incoming_transaction(
                10,
                "0:abcdef0123456789",
                1_500_000_000,
            )]);
        f.controller.enable_intensive_polling();

        let address = address();
        wait_state(&f.controller, |s| {
            s.account_transactions.get(&address).is_some_and(|t| t.len() == 1)
        })
        .await;

        let shown = f.notifier.shown.lock().clone();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, "New transaction found");
        assert_eq!(shown[0].1, "1.5 TON from 0:abcd...6789");
    }

    #[tokio::test(start_paused = true)]
    async fn redelivered_batch_is_reported_once() {
        let f = started(vec![account()]).await;
        let mut events = f.controller.subscribe_events();
        let subscription = f.controller.ton_subscription(&address()).unwrap().id().clone();
        let batch = |lts: &[u64]| SubscriptionUpdate {
            subscription: subscription.clone(),
            update: WalletUpdate::Ton {
                address: address(),
                event: TonWalletEvent::TransactionsFound {
                    transactions: lts.iter().map(|lt| incoming_transaction(*lt, "0:a", 1)).collect(),
                    info: TransactionsBatchInfo {
                        min_lt: lts.iter().copied().min().unwrap_or(0),
                        max_lt: lts.iter().copied().max().unwrap_or(0),
                        batch_type: BatchType::New,
                    },
                },
            },
        };

        f.controller.apply(batch(&[20, 10]));
        f.controller.apply(batch(&[20, 10]));
        assert_eq!(f.notifier.shown.lock().len(), 1);

        f.controller.apply(batch(&[30, 20]));
        assert_eq!(f.notifier.shown.lock().len(), 2);

        let mut found = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let AccountEvent::TransactionsFound { transactions, .. } = event {
                found.push(transactions.iter().map(|t| t.id.lt).collect::<Vec<_>>());
            }
        }
        assert_eq!(found, vec![vec![20, 10], vec![30]]);
        let lts: Vec<u64> = f.controller.state().account_transactions[&address()]
            .iter()
            .map(|t| t.id.lt)
            .collect();
        assert_eq!(lts, vec![30, 20, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn preloaded_history_is_appended_silently() {
        let f = started(vec![account()]).await;
        let wallet = f.engine.wallet(&address());
        wallet.push_new_transactions(vec![incoming_transaction(10, "0:a", 1)]);
        f.controller.enable_intensive_polling();
        let address = address();
        wait_state(&f.controller, |s| s.account_transactions.contains_key(&address)).await;

        wallet.set_history(vec![
            incoming_transaction(5, "0:a", 1),
            incoming_transaction(3, "0:a", 1),
        ]);
        let from = TransactionId {
            lt: 10,
            hash: "tx10".into(),
        };
        f.controller
            .preload_transactions(&address, from)
            .await
            .unwrap();

        wait_state(&f.controller, |s| {
            s.account_transactions.get(&address).is_some_and(|t| t.len() == 3)
        })
        .await;
        let lts: Vec<u64> = f.controller.state().account_transactions[&address]
            .iter()
            .map(|t| t.id.lt)
            .collect();
        assert_eq!(lts, vec![10, 5, 3]);
        assert_eq!(f.notifier.shown.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_updates_are_dropped() {
        let f = started(vec![account()]).await;
        let _ = f.controller.updates.send(SubscriptionUpdate {
            subscription: SubscriptionId::new(),
            update: WalletUpdate::Ton {
                address: address(),
                event: TonWalletEvent::StateChanged(deployed_state(5)),
            },
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            f.controller.state().account_contract_states[&address()],
            deployed_state(0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_resolves_on_confirmation() {
        let f = started(vec![account()]).await;
        let wallet = f.engine.wallet(&address());
        let send = spawn_send(&f.controller, "m1");

        until(|| !wallet.sent().is_empty()).await;
        assert_eq!(
            f.controller.state().account_pending_messages[&address()][&MessageId::from("m1")],
            PendingMessage { expire_at: 1_060 }
        );
        assert!(wallet.confirm(&MessageId::from("m1"), incoming_transaction(20, "0:a", 1)));

        let transaction = send.await.unwrap().unwrap();
        assert_eq!(transaction.id.lt, 20);
        assert!(f.controller.state().account_pending_messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_rejects_on_expiry() {
        let f = started(vec![account()]).await;
        let wallet = f.engine.wallet(&address());
        let send = spawn_send(&f.controller, "m1");

        until(|| !wallet.sent().is_empty()).await;
        assert!(wallet.expire(&MessageId::from("m1")));

        assert_matches!(send.await.unwrap(), Err(AccountError::Expired));
        assert!(f.controller.state().account_pending_messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_surfaces_submission_failure() {
        let f = started(vec![account()]).await;
        f.engine.wallet(&address()).fail_send(Some("rejected by node"));

        let result = f
            .controller
            .send_message(&address(), signed_message("m1"))
            .await;
        assert_matches!(
            result,
            Err(AccountError::Engine(EngineError::Other(reason))) if reason == "rejected by node"
        );
        assert!(f.controller.state().account_pending_messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_message_without_subscription() {
        let f = fixture(vec![account()]).await;
        assert_matches!(
            f.controller
                .send_message(&address(), signed_message("m1"))
                .await,
            Err(AccountError::NoSubscription(a)) if a == address()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_pending_message_is_rejected() {
        let f = started(vec![account()]).await;
        let wallet = f.engine.wallet(&address());
        let first = spawn_send(&f.controller, "m1");
        until(|| !wallet.sent().is_empty()).await;

        assert_matches!(
            f.controller
                .send_message(&address(), signed_message("m1"))
                .await,
            Err(AccountError::MessageAlreadyPending { .. })
        );

        f.controller.stop_subscriptions().await;
        assert_matches!(first.await.unwrap(), Err(AccountError::Superseded));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_supersedes_pending_messages() {
        let f = started(vec![account()]).await;
        let wallet = f.engine.wallet(&address());
        let send = spawn_send(&f.controller, "m1");
        until(|| !wallet.sent().is_empty()).await;

        f.controller.stop_subscriptions().await;

        assert_matches!(send.await.unwrap(), Err(AccountError::Superseded));
        assert!(f.controller.subscribed_addresses().is_empty());
        assert!(f.controller.state().account_pending_messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn log_out_resets_everything() {
        let f = started(vec![account()]).await;
        let wallet = f.engine.wallet(&address());
        let send = spawn_send(&f.controller, "m1");
        until(|| !wallet.sent().is_empty()).await;

        f.controller.log_out().await.unwrap();

        assert_matches!(send.await.unwrap(), Err(AccountError::Superseded));
        assert_eq!(f.controller.state(), AccountState::default());
        assert!(f.controller.subscribed_addresses().is_empty());
        assert_eq!((f.keys.clears(), f.storage.clears()), (1, 1));
        assert!(f.keys.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn create_account_selects_and_subscribes() {
        let f = fixture(Vec::new()).await;
        let created = f
            .controller
            .create_account(AccountToCreate {
                name: "Fresh".into(),
                contract_type: ContractType::SurfWallet,
                seed: Seed {
                    phrase: "word one".into(),
                    mnemonic_type: "legacy".into(),
                },
                password: "pw".into(),
            })
            .await
            .unwrap();

        let public_key = public_key_for("word one");
        assert_eq!(created.ton_wallet.public_key, public_key);
        let state = f.controller.state();
        assert_eq!(state.selected_account, Some(created.clone()));
        assert_eq!(state.account_entries[&public_key], vec![created.clone()]);
        assert_eq!(f.controller.subscribed_addresses(), vec![created.address().to_owned()]);
        assert_eq!(f.storage.accounts(), vec![created]);
    }

    #[tokio::test(start_paused = true)]
    async fn select_account_updates_selection() {
        let other = assets_list("Second", "pk2", ContractType::SurfWallet);
        let f = fixture(vec![account(), other.clone()]).await;

        let selected = f.controller.select_account(other.address()).await.unwrap();
        assert_eq!(selected, other);
        assert_eq!(f.controller.state().selected_account, Some(other));

        assert_matches!(
            f.controller.select_account("0:missing").await,
            Err(AccountError::Storage(EngineError::AccountNotFound(_)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn remove_account_drops_its_slots() {
        let f = started(vec![account()]).await;
        let wallet = f.engine.wallet(&address());
        let send = spawn_send(&f.controller, "m1");
        until(|| !wallet.sent().is_empty()).await;

        f.controller.remove_account(&address()).await.unwrap();

        assert_matches!(send.await.unwrap(), Err(AccountError::Superseded));
        let state = f.controller.state();
        assert_eq!(state, AccountState::default());
        assert!(f.controller.subscribed_addresses().is_empty());
        assert!(f.storage.accounts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn estimate_fees_needs_known_deployed_state() {
        let f = started(vec![account()]).await;
        let params = MessageToPrepare {
            recipient: "0:dest".into(),
            amount: 1_000,
            payload: None,
        };
        assert_eq!(
            f.controller
                .estimate_fees(&address(), params.clone())
                .await
                .unwrap(),
            10_000_000
        );
        assert_eq!(
            f.controller
                .estimate_deployment_fees(&address())
                .await
                .unwrap(),
            10_000_000
        );

        let wallet = f.engine.wallet(&address());
        let mut undeployed = deployed_state(0);
        undeployed.is_deployed = false;
        wallet.set_contract_state(Some(undeployed));
        f.controller.enable_intensive_polling();
        let address = address();
        wait_state(&f.controller, |s| {
            s.account_contract_states
                .get(&address)
                .is_some_and(|c| !c.is_deployed)
        })
        .await;

        assert_matches!(
            f.controller.estimate_fees(&address, params).await,
            Err(AccountError::ContractNotDeployed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn estimate_fees_without_state() {
        let f = fixture(vec![account()]).await;
        f.engine.wallet(&address()).set_contract_state(None);
        f.controller.start_subscriptions().await.unwrap();
        let params = MessageToPrepare {
            recipient: "0:dest".into(),
            amount: 1,
            payload: None,
        };

        assert_matches!(
            f.controller.estimate_fees(&address(), params).await,
            Err(AccountError::StateUnavailable(a)) if a == address()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn prepare_message_signs_with_key() {
        let f = started(vec![account()]).await;
        let params = MessageToPrepare {
            recipient: "0:dest".into(),
            amount: 7,
            payload: Some("memo".into()),
        };

        let signed = f
            .controller
            .prepare_message(&address(), params.clone(), password())
            .await
            .unwrap();
        assert_eq!(
            signed.body_hash,
            MessageId::from(format!("transfer:{}:0:dest:7#sig-{PK}", address()))
        );
        assert_eq!(signed.expire_at, 1_000 + MESSAGE_TIMEOUT_SECS);

        let deploy = f
            .controller
            .prepare_deployment_message(&address(), password())
            .await
            .unwrap();
        assert_eq!(
            deploy.body_hash,
            MessageId::from(format!("deploy:{}#sig-{PK}", address()))
        );

        let wrong = KeyPassword {
            password: "nope".into(),
            ..password()
        };
        assert_matches!(
            f.controller.prepare_message(&address(), params, wrong).await,
            Err(AccountError::Engine(EngineError::InvalidPassword))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn check_password_consults_key_store() {
        let f = fixture(vec![account()]).await;
        assert!(f.controller.check_password(&password()).await.unwrap());
        let wrong = KeyPassword {
            password: "nope".into(),
            ..password()
        };
        assert!(!f.controller.check_password(&wrong).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn intensive_polling_switches_intervals() {
        let f = started(vec![account()]).await;
        let subscription = f.controller.ton_subscription(&address()).unwrap();
        let polling = PollingSettings::default();
        assert_eq!(subscription.polling_interval(), polling.idle_interval());

        f.controller.enable_intensive_polling();
        assert!(f.controller.is_intensive_polling());
        assert_eq!(subscription.polling_interval(), polling.active_interval());

        f.controller.disable_intensive_polling();
        assert_eq!(subscription.polling_interval(), polling.idle_interval());
    }

    #[tokio::test(start_paused = true)]
    async fn new_subscriptions_follow_intensive_mode() {
        let f = fixture(vec![account()]).await;
        f.controller.enable_intensive_polling();
        f.controller.start_subscriptions().await.unwrap();

        let subscription = f.controller.ton_subscription(&address()).unwrap();
        assert_eq!(
            subscription.polling_interval(),
            PollingSettings::default().active_interval()
        );
    }
}
