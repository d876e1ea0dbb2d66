//! Top-level wallet controller.
//!
//! Wires the connection and account controllers to the connection registry:
//! network switches and log out are broadcast to every attached context,
//! account events reach the tabs subscribed to the affected address, and
//! trusted UI surfaces receive a debounced full-state `sendUpdate`.
//!
//! While at least one trusted surface is attached, wallet subscriptions poll
//! at the active rate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use ember_core::ConnectionId;
use ember_core::models::NetworkConfig;
use ember_engine::{AccountsStorage, KeyStore, KeyValueStore, TransportFactory, WalletEngine};
use ember_runtime::{
    AccountController, AccountDeps, AccountError, AccountEvent, AccountState,
    ConnectionController, Notifier,
};
use ember_settings::EmberSettings;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::registry::{ClientConnection, ConnectionRegistry};
use crate::rpc::types::RpcNotification;

type TabAddresses = Arc<RwLock<HashMap<u32, HashSet<String>>>>;

/// External capabilities the controller is built from.
#[derive(Clone)]
pub struct WalletDeps {
    /// Builds transports for network configurations.
    pub transport_factory: Arc<dyn TransportFactory>,
    /// Persistent key-value storage for controller state.
    pub store: Arc<dyn KeyValueStore>,
    /// Wallet engine creating wallet handles.
    pub engine: Arc<dyn WalletEngine>,
    /// Encrypted key storage.
    pub key_store: Arc<dyn KeyStore>,
    /// Account entries storage.
    pub accounts_storage: Arc<dyn AccountsStorage>,
    /// User-facing notification sink.
    pub notifier: Arc<dyn Notifier>,
}

/// Snapshot pushed to trusted surfaces and returned by `getState`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerState {
    /// Network of the live connection, if any.
    pub selected_connection: Option<NetworkConfig>,
    /// Account aggregate.
    #[serde(flatten)]
    pub account: AccountState,
}

/// The top-level controller owning every other component.
pub struct WalletController {
    connection: Arc<ConnectionController>,
    accounts: Arc<AccountController>,
    registry: Arc<ConnectionRegistry>,
    trusted: Mutex<usize>,
    tab_addresses: TabAddresses,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WalletController {
    /// Build every component, restore the selected network and accounts,
    /// and start wallet subscriptions.
    ///
    /// Failing to connect is not fatal: the controller comes up without a
    /// live connection and `change_network` can recover.
    #[instrument(skip_all)]
    pub async fn load(deps: WalletDeps, settings: EmberSettings) -> Result<Arc<Self>, AccountError> {
        let connection = Arc::new(ConnectionController::new(
            deps.transport_factory,
            deps.store,
            settings.network.clone(),
        ));
        if let Err(error) = connection.initial_sync().await {
            warn!(%error, "starting without a network connection");
        }

        let accounts = AccountController::new(
            AccountDeps {
                connection: Arc::clone(&connection),
                engine: deps.engine,
                key_store: deps.key_store,
                accounts_storage: deps.accounts_storage,
                notifier: deps.notifier,
            },
            settings.clone(),
        );
        accounts.initial_sync().await?;
        if let Err(error) = accounts.start_subscriptions().await {
            warn!(%error, "some wallet subscriptions failed to start");
        }

        let registry = Arc::new(ConnectionRegistry::new(&settings.registry));
        let controller = Arc::new(Self {
            connection,
            accounts,
            registry,
            trusted: Mutex::new(0),
            tab_addresses: Arc::default(),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        });
        controller.spawn_tasks(Duration::from_millis(settings.registry.update_debounce_ms));
        info!("wallet controller loaded");
        Ok(controller)
    }

    fn spawn_tasks(&self, debounce: Duration) {
        let bridge = tokio::spawn(forward_account_events(
            self.accounts.subscribe_events(),
            Arc::clone(&self.registry),
            Arc::clone(&self.tab_addresses),
            self.cancel.clone(),
        ));
        let updates = tokio::spawn(send_updates(
            self.accounts.subscribe_state(),
            self.connection.subscribe(),
            Arc::clone(&self.registry),
            debounce,
            self.cancel.clone(),
        ));
        self.tasks.lock().extend([bridge, updates]);
    }

    /// Connection controller.
    pub fn connection(&self) -> &Arc<ConnectionController> {
        &self.connection
    }

    /// Account controller.
    pub fn accounts(&self) -> &Arc<AccountController> {
        &self.accounts
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Current full state.
    pub fn state(&self) -> ControllerState {
        ControllerState {
            selected_connection: self.connection.selected_network(),
            account: self.accounts.state(),
        }
    }

    /// Built-in network presets.
    pub fn available_networks(&self) -> Vec<NetworkConfig> {
        self.connection.list_presets()
    }

    /// Switch to `config`.
    ///
    /// Subscriptions are moved over by [`AccountController::change_network`]
    /// (pending messages are superseded), then `networkChanged` is
    /// broadcast. If the new transport cannot be built, no connection is
    /// live and the error is returned.
    #[instrument(skip_all, fields(network = %config.name))]
    pub async fn change_network(&self, config: NetworkConfig) -> Result<(), AccountError> {
        self.accounts.change_network(config.clone()).await?;

        let delivered = self.registry.notify_all(&RpcNotification::new(
            "networkChanged",
            json!({ "selectedConnection": config }),
        ));
        info!(delivered, "network changed");
        Ok(())
    }

    /// Log out and tell every attached context.
    #[instrument(skip_all)]
    pub async fn log_out(&self) -> Result<(), AccountError> {
        let result = self.accounts.log_out().await;
        self.tab_addresses.write().clear();
        let delivered = self
            .registry
            .notify_all(&RpcNotification::new("loggedOut", json!({})));
        debug!(delivered, "log out broadcast");
        result
    }

    /// Attach a browser context. The first trusted surface turns on
    /// intensive polling.
    pub fn attach(
        &self,
        origin: &str,
        tab_id: Option<u32>,
        trusted: bool,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let attached = self.registry.attach(origin, tab_id, trusted);
        if trusted {
            let mut count = self.trusted.lock();
            *count += 1;
            if *count == 1 {
                self.accounts.enable_intensive_polling();
            }
        }
        attached
    }

    /// Detach a browser context. The last trusted surface turns intensive
    /// polling off; the last context of a tab drops its address
    /// subscriptions.
    pub fn detach(&self, id: &ConnectionId) -> bool {
        let Some(connection) = self.registry.detach(id) else {
            return false;
        };
        if connection.trusted {
            let mut count = self.trusted.lock();
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.accounts.disable_intensive_polling();
            }
        }
        if let Some(tab) = connection.tab_id {
            if self.registry.tab_connection_count(tab) == 0 {
                let _ = self.tab_addresses.write().remove(&tab);
            }
        }
        true
    }

    /// Number of attached trusted surfaces.
    pub fn trusted_connections(&self) -> usize {
        *self.trusted.lock()
    }

    /// Deliver account events for `addresses` to `tab`.
    pub fn subscribe_tab_addresses<I>(&self, tab: u32, addresses: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.tab_addresses
            .write()
            .entry(tab)
            .or_default()
            .extend(addresses);
    }

    /// Stop delivering account events for `address` to `tab`.
    pub fn unsubscribe_tab_address(&self, tab: u32, address: &str) {
        let mut tabs = self.tab_addresses.write();
        if let Some(addresses) = tabs.get_mut(&tab) {
            let _ = addresses.remove(address);
            if addresses.is_empty() {
                let _ = tabs.remove(&tab);
            }
        }
    }

    /// Addresses `tab` is subscribed to, sorted.
    pub fn tab_addresses(&self, tab: u32) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .tab_addresses
            .read()
            .get(&tab)
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default();
        addresses.sort();
        addresses
    }

    /// Tell every context under `origin` that its permissions changed.
    pub fn notify_permissions_changed(&self, origin: &str, permissions: Value) -> usize {
        self.registry.notify_origin(
            origin,
            &RpcNotification::new("permissionsChanged", json!({ "permissions": permissions })),
        )
    }

    /// Stop background tasks and every wallet subscription.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(error) = task.await {
                warn!(%error, "controller task failed");
            }
        }
        self.accounts.stop_subscriptions().await;
        info!("wallet controller stopped");
    }
}

impl Drop for WalletController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Notification payload for an account event.
fn event_params(event: &AccountEvent) -> Value {
    match event {
        AccountEvent::ContractStateChanged { address, state } => {
            json!({ "address": address, "state": state })
        }
        AccountEvent::TransactionsFound {
            address,
            transactions,
            info,
        } => json!({ "address": address, "transactions": transactions, "info": info }),
        AccountEvent::TokenBalanceChanged {
            owner,
            root_token_contract,
            balance,
        } => json!({
            "owner": owner,
            "rootTokenContract": root_token_contract,
            "balance": balance,
        }),
    }
}

async fn forward_account_events(
    mut events: broadcast::Receiver<AccountEvent>,
    registry: Arc<ConnectionRegistry>,
    tab_addresses: TabAddresses,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let event = match event {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "account event bridge lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let tabs: Vec<u32> = tab_addresses
            .read()
            .iter()
            .filter(|(_, addresses)| addresses.contains(event.address()))
            .map(|(tab, _)| *tab)
            .collect();
        if tabs.is_empty() {
            continue;
        }
        let notification = RpcNotification::new(event.method(), event_params(&event));
        for tab in tabs {
            let _ = registry.notify_tab(tab, &notification);
        }
    }
    debug!("account event bridge stopped");
}

/// Push the full state to trusted surfaces at most once per `debounce`
/// window after any account or network change.
async fn send_updates(
    mut account: watch::Receiver<AccountState>,
    mut network: watch::Receiver<Option<NetworkConfig>>,
    registry: Arc<ConnectionRegistry>,
    debounce: Duration,
    cancel: CancellationToken,
) {
    loop {
        let changed = tokio::select! {
            () = cancel.cancelled() => break,
            changed = account.changed() => changed,
            changed = network.changed() => changed,
        };
        if changed.is_err() {
            break;
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(debounce) => {}
        }

        let state = ControllerState {
            selected_connection: network.borrow_and_update().clone(),
            account: account.borrow_and_update().clone(),
        };
        match serde_json::to_value(&state) {
            Ok(params) => {
                let delivered = registry.notify_trusted(&RpcNotification::new("sendUpdate", params));
                debug!(delivered, "state update sent");
            }
            Err(error) => warn!(%error, "failed to serialize state update"),
        }
    }
    debug!("state updates stopped");
}
