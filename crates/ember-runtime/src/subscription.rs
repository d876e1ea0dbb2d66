//! Wallet subscriptions: one supervised polling loop per tracked wallet.
//!
//! A subscription owns its wallet handle and reports every delta the handle
//! observes over an unbounded channel as a [`SubscriptionUpdate`]. The loop
//! is `Created → Running → Stopped`; [`Subscription::stop`] cancels it and
//! waits for any in-flight tick, so no tick fires after it returns.
//!
//! Each tick locks the wallet handle, then leases the connection. Waiting for
//! either is cancellable; once both are held the tick runs to completion.
//! One-off operations ([`Subscription::use_wallet`]) follow the same lock
//! order and do not disturb the polling cadence.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ember_core::SubscriptionId;
use ember_core::models::{ContractType, PollingMethod, TransactionId};
use ember_engine::{
    EngineError, TokenWallet, TokenWalletEvent, TonWallet, TonWalletEvent, Transport, WalletEngine,
};
use ember_settings::PollingSettings;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{ConnectionController, ConnectionLease};
use crate::errors::AccountError;

/// A delta observed by one wallet handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletUpdate {
    /// From a base wallet.
    Ton {
        /// Wallet address.
        address: String,
        /// The delta.
        event: TonWalletEvent,
    },
    /// From a token wallet.
    Token {
        /// Owner base-wallet address.
        owner: String,
        /// Root token contract address.
        root_token_contract: String,
        /// The delta.
        event: TokenWalletEvent,
    },
}

/// A [`WalletUpdate`] tagged with the subscription that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    /// Producing subscription.
    pub subscription: SubscriptionId,
    /// The delta.
    pub update: WalletUpdate,
}

/// Sender half every subscription reports into.
pub type UpdateSender = mpsc::UnboundedSender<SubscriptionUpdate>;

/// A wallet handle that can be driven by a polling loop.
#[async_trait]
pub trait PolledWallet: Send + 'static {
    /// Delta type reported by the handle.
    type Event: Send + 'static;

    /// Current polling preference.
    fn poll_method(&self) -> PollingMethod;

    /// One refresh of remote state.
    async fn poll(&mut self, transport: &dyn Transport) -> Result<Vec<Self::Event>, EngineError>;

    /// Fetch history older than `from`.
    async fn backfill(
        &mut self,
        transport: &dyn Transport,
        from: &TransactionId,
    ) -> Result<Vec<Self::Event>, EngineError>;

    /// Attach the handle's identity to a delta.
    fn wrap(&self, event: Self::Event) -> WalletUpdate;
}

#[async_trait]
impl PolledWallet for Box<dyn TonWallet> {
    type Event = TonWalletEvent;

    fn poll_method(&self) -> PollingMethod {
        self.polling_method()
    }

    async fn poll(&mut self, transport: &dyn Transport) -> Result<Vec<TonWalletEvent>, EngineError> {
        self.refresh(transport).await
    }

    async fn backfill(
        &mut self,
        transport: &dyn Transport,
        from: &TransactionId,
    ) -> Result<Vec<TonWalletEvent>, EngineError> {
        self.preload_transactions(transport, from).await
    }

    fn wrap(&self, event: TonWalletEvent) -> WalletUpdate {
        WalletUpdate::Ton {
            address: self.address().to_owned(),
            event,
        }
    }
}

#[async_trait]
impl PolledWallet for Box<dyn TokenWallet> {
    type Event = TokenWalletEvent;

    fn poll_method(&self) -> PollingMethod {
        self.polling_method()
    }

    async fn poll(
        &mut self,
        transport: &dyn Transport,
    ) -> Result<Vec<TokenWalletEvent>, EngineError> {
        self.refresh(transport).await
    }

    async fn backfill(
        &mut self,
        transport: &dyn Transport,
        from: &TransactionId,
    ) -> Result<Vec<TokenWalletEvent>, EngineError> {
        self.preload_transactions(transport, from).await
    }

    fn wrap(&self, event: TokenWalletEvent) -> WalletUpdate {
        WalletUpdate::Token {
            owner: self.owner().to_owned(),
            root_token_contract: self.root_token_contract().to_owned(),
            event,
        }
    }
}

/// Cadence state shared between a subscription and its loop.
struct Cadence {
    interval_ms: AtomicU64,
    reliable_interval: Duration,
    reliable_ticks: u32,
    reliable_remaining: AtomicU32,
    skip: Notify,
    cancel: CancellationToken,
}

impl Cadence {
    fn next_interval(&self, method: PollingMethod) -> Duration {
        let interval = Duration::from_millis(self.interval_ms.load(Ordering::SeqCst));
        let reliable = self.reliable_interval.min(interval);
        if method == PollingMethod::Reliable {
            return reliable;
        }
        let boosted = self
            .reliable_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if boosted { reliable } else { interval }
    }
}

/// Exclusive access to a wallet handle plus a connection lease.
pub struct WalletGuard<W> {
    wallet: OwnedMutexGuard<W>,
    lease: ConnectionLease,
}

impl<W> WalletGuard<W> {
    /// The wallet handle.
    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    /// The leased transport.
    pub fn transport(&self) -> &dyn Transport {
        self.lease.transport()
    }

    /// Mutable handle and transport at once.
    pub fn split(&mut self) -> (&mut W, &dyn Transport) {
        (&mut *self.wallet, self.lease.transport())
    }
}

/// A supervised polling loop over one wallet handle.
pub struct Subscription<W: PolledWallet> {
    id: SubscriptionId,
    wallet: Arc<Mutex<W>>,
    connection: Arc<ConnectionController>,
    cadence: Arc<Cadence>,
    updates: UpdateSender,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Subscription over a base wallet.
pub type TonWalletSubscription = Subscription<Box<dyn TonWallet>>;

/// Subscription over a token wallet.
pub type TokenWalletSubscription = Subscription<Box<dyn TokenWallet>>;

impl TonWalletSubscription {
    /// Create a base wallet handle over a connection lease and wrap it.
    /// The loop is not started.
    pub async fn subscribe(
        connection: Arc<ConnectionController>,
        engine: &dyn WalletEngine,
        public_key: &str,
        contract_type: ContractType,
        updates: UpdateSender,
        polling: &PollingSettings,
    ) -> Result<Self, AccountError> {
        let lease = connection.acquire().await?;
        let wallet = engine
            .subscribe_ton_wallet(lease.transport(), public_key, contract_type)
            .await?;
        drop(lease);
        Ok(Self::new(connection, wallet, updates, polling))
    }
}

impl TokenWalletSubscription {
    /// Create a token wallet handle over a connection lease and wrap it.
    /// The loop is not started.
    pub async fn subscribe(
        connection: Arc<ConnectionController>,
        engine: &dyn WalletEngine,
        owner: &str,
        root_token_contract: &str,
        updates: UpdateSender,
        polling: &PollingSettings,
    ) -> Result<Self, AccountError> {
        let lease = connection.acquire().await?;
        let wallet = engine
            .subscribe_token_wallet(lease.transport(), owner, root_token_contract)
            .await?;
        drop(lease);
        Ok(Self::new(connection, wallet, updates, polling))
    }
}

impl<W: PolledWallet> Subscription<W> {
    /// Wrap a handle. The polling interval starts at the idle rate.
    pub fn new(
        connection: Arc<ConnectionController>,
        wallet: W,
        updates: UpdateSender,
        polling: &PollingSettings,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            wallet: Arc::new(Mutex::new(wallet)),
            connection,
            cadence: Arc::new(Cadence {
                interval_ms: AtomicU64::new(polling.idle_interval_ms),
                reliable_interval: polling.reliable_interval(),
                reliable_ticks: polling.reliable_ticks,
                reliable_remaining: AtomicU32::new(0),
                skip: Notify::new(),
                cancel: CancellationToken::new(),
            }),
            updates,
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Identifier attached to every update this subscription reports.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Start the loop. No-op if already started or stopped.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() || self.cadence.cancel.is_cancelled() {
            return;
        }
        debug!(subscription = %self.id, "subscription started");
        *task = Some(tokio::spawn(run_loop(
            self.id.clone(),
            Arc::clone(&self.wallet),
            Arc::clone(&self.connection),
            Arc::clone(&self.cadence),
            self.updates.clone(),
        )));
    }

    /// Whether the loop is running.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for any in-flight tick or one-off operation.
    /// Terminal.
    pub async fn stop(&self) {
        self.cadence.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(error) = task.await {
                warn!(subscription = %self.id, %error, "subscription task failed");
            }
            debug!(subscription = %self.id, "subscription stopped");
        }
        let _wallet = self.wallet.lock().await;
    }

    /// Set the base polling interval.
    pub fn set_polling_interval(&self, interval: Duration) {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.cadence.interval_ms.store(ms, Ordering::SeqCst);
    }

    /// Current base polling interval.
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.cadence.interval_ms.load(Ordering::SeqCst))
    }

    /// Poll at the reliable rate for the next few ticks.
    pub fn prepare_reliable_polling(&self) {
        self.cadence
            .reliable_remaining
            .store(self.cadence.reliable_ticks.max(1), Ordering::SeqCst);
    }

    /// Cut the current wait short; the next tick happens right away.
    pub fn skip_refresh_timer(&self) {
        self.cadence.skip.notify_one();
    }

    /// Borrow the wallet handle with a connection lease for a one-off
    /// operation.
    ///
    /// Fails with [`AccountError::Superseded`] without running `f` once the
    /// subscription is stopped, including while waiting for the wallet or
    /// the lease.
    pub async fn use_wallet<T, F, Fut>(&self, f: F) -> Result<T, AccountError>
    where
        F: FnOnce(WalletGuard<W>) -> Fut,
        Fut: Future<Output = Result<T, AccountError>>,
    {
        let cancel = &self.cadence.cancel;
        let wallet = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AccountError::Superseded),
            guard = Arc::clone(&self.wallet).lock_owned() => guard,
        };
        let lease = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AccountError::Superseded),
            lease = self.connection.acquire() => lease?,
        };
        f(WalletGuard { wallet, lease }).await
    }

    /// Fetch history older than `from`; results are reported like any other
    /// update.
    pub async fn preload_transactions(&self, from: &TransactionId) -> Result<(), AccountError> {
        let updates = self.updates.clone();
        let id = self.id.clone();
        let fut: std::pin::Pin<Box<dyn Future<Output = Result<(), AccountError>> + Send + '_>> =
            Box::pin(self.use_wallet(|mut guard| async move {
            let (wallet, transport) = guard.split();
            let events = wallet.backfill(transport, from).await?;
            for event in events {
                let update = wallet.wrap(event);
                let _ = updates.send(SubscriptionUpdate {
                    subscription: id.clone(),
                    update,
                });
            }
            Ok(())
        }));
        fut.await
    }
}

impl<W: PolledWallet> Drop for Subscription<W> {
    fn drop(&mut self) {
        self.cadence.cancel.cancel();
    }
}

async fn run_loop<W: PolledWallet>(
    id: SubscriptionId,
    wallet: Arc<Mutex<W>>,
    connection: Arc<ConnectionController>,
    cadence: Arc<Cadence>,
    updates: UpdateSender,
) {
    loop {
        let Some(method) = tick(&id, &wallet, &connection, &cadence, &updates).await else {
            break;
        };

        let interval = cadence.next_interval(method);
        tokio::select! {
            biased;
            () = cadence.cancel.cancelled() => break,
            () = cadence.skip.notified() => debug!(subscription = %id, "refresh timer skipped"),
            () = tokio::time::sleep(interval) => {}
        }
    }
}

/// One poll. Returns `None` when cancelled before the wallet and lease were
/// both held.
async fn tick<W: PolledWallet>(
    id: &SubscriptionId,
    wallet: &Arc<Mutex<W>>,
    connection: &ConnectionController,
    cadence: &Cadence,
    updates: &UpdateSender,
) -> Option<PollingMethod> {
    let mut wallet = tokio::select! {
        biased;
        () = cadence.cancel.cancelled() => return None,
        guard = wallet.lock() => guard,
    };
    let lease = tokio::select! {
        biased;
        () = cadence.cancel.cancelled() => return None,
        lease = connection.acquire() => lease,
    };
    let lease = match lease {
        Ok(lease) => lease,
        Err(error) => {
            debug!(subscription = %id, %error, "tick skipped");
            return Some(wallet.poll_method());
        }
    };

    match wallet.poll(lease.transport()).await {
        Ok(events) => {
            for event in events {
                let update = wallet.wrap(event);
                let _ = updates.send(SubscriptionUpdate {
                    subscription: id.clone(),
                    update,
                });
            }
        }
        Err(error) => {
            warn!(subscription = %id, network = %lease.config().name, %error, "refresh failed");
        }
    }
    Some(wallet.poll_method())
}
