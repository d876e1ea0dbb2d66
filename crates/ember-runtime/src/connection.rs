//! Connection controller.
//!
//! Owns at most one live connection (network config plus transport). Any
//! number of consumers may hold a [`ConnectionLease`] at once; a network
//! switch takes exclusive ownership and only proceeds once every lease has
//! been dropped. The slot is a fair (FIFO) read/write lock, so a queued switch
//! is not starved by a stream of new leases, and leases requested after the
//! switch was queued observe the new connection.
//!
//! Switching is split in two: [`ConnectionController::start_switching_network`]
//! queues for exclusive ownership and returns a [`NetworkSwitchHandle`];
//! [`NetworkSwitchHandle::switch`] tears down the old transport and brings up
//! the new one. Callers stop every consumer of the old connection in between.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ember_core::models::{NetworkConfig, mainnet, network_preset, network_presets};
use ember_engine::{KeyValueStore, Transport, TransportFactory};
use ember_settings::NetworkSettings;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, watch};
use tracing::{debug, info, instrument, warn};

use crate::errors::ConnectionError;

/// Key under which the selected network is persisted.
pub const SELECTED_NETWORK_KEY: &str = "selectedConnection";

/// One live network configuration and its transport.
pub struct InitializedConnection {
    /// The network this connection talks to.
    pub config: NetworkConfig,
    /// Transport to the network's endpoint.
    pub transport: Arc<dyn Transport>,
}

type Slot = Option<InitializedConnection>;

struct Shared {
    factory: Arc<dyn TransportFactory>,
    store: Arc<dyn KeyValueStore>,
    slot: Arc<RwLock<Slot>>,
    leases: AtomicUsize,
    selected: watch::Sender<Option<NetworkConfig>>,
}

/// Owner of the single live connection.
pub struct ConnectionController {
    shared: Arc<Shared>,
    settings: NetworkSettings,
    initialized: AtomicBool,
}

impl ConnectionController {
    /// Create a controller with no live connection.
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn KeyValueStore>,
        settings: NetworkSettings,
    ) -> Self {
        let (selected, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                factory,
                store,
                slot: Arc::new(RwLock::new(None)),
                leases: AtomicUsize::new(0),
                selected,
            }),
            settings,
            initialized: AtomicBool::new(false),
        }
    }

    /// Connect to the persisted network, or to the configured default.
    ///
    /// Can be called once.
    #[instrument(skip_all)]
    pub async fn initial_sync(&self) -> Result<(), ConnectionError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyInitialized);
        }

        let config = match self.restore_selected().await {
            Some(config) => config,
            None => self.default_config(),
        };
        info!(network = %config.name, "initial network");

        self.start_switching_network(config).await.switch().await
    }

    /// Queue for exclusive ownership of the connection slot.
    ///
    /// Resolves once every outstanding lease is released. Leases requested
    /// after this call wait until the returned handle is switched or dropped.
    pub async fn start_switching_network(&self, config: NetworkConfig) -> NetworkSwitchHandle {
        debug!(network = %config.name, "waiting for connection slot");
        let guard = Arc::clone(&self.shared.slot).write_owned().await;
        debug!(network = %config.name, "connection slot acquired");
        NetworkSwitchHandle {
            shared: Arc::clone(&self.shared),
            guard,
            config,
        }
    }

    /// Lease the live connection.
    ///
    /// Fails with [`ConnectionError::NotInitialized`] when no connection is
    /// live. The lease is released on drop.
    pub async fn acquire(&self) -> Result<ConnectionLease, ConnectionError> {
        let guard = Arc::clone(&self.shared.slot).read_owned().await;
        let guard = OwnedRwLockReadGuard::try_map(guard, Option::as_ref)
            .map_err(|_| ConnectionError::NotInitialized)?;
        let _ = self.shared.leases.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionLease {
            guard,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Run `f` with a lease; the lease is released when `f`'s future
    /// completes, fails, or is dropped.
    pub async fn use_connection<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(ConnectionLease) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ConnectionError>,
    {
        let lease = self.acquire().await?;
        f(lease).await
    }

    /// The static preset set.
    pub fn list_presets(&self) -> Vec<NetworkConfig> {
        network_presets()
    }

    /// The network of the live connection, if any.
    pub fn selected_network(&self) -> Option<NetworkConfig> {
        self.shared.selected.borrow().clone()
    }

    /// Watch the selected network. `None` while no connection is live.
    pub fn subscribe(&self) -> watch::Receiver<Option<NetworkConfig>> {
        self.shared.selected.subscribe()
    }

    /// Number of leases currently held.
    pub fn active_leases(&self) -> usize {
        self.shared.leases.load(Ordering::SeqCst)
    }

    async fn restore_selected(&self) -> Option<NetworkConfig> {
        match self.shared.store.get(SELECTED_NETWORK_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<NetworkConfig>(value) {
                Ok(config) => Some(config),
                Err(error) => {
                    warn!(%error, "ignoring malformed persisted network");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "failed to read persisted network");
                None
            }
        }
    }

    fn default_config(&self) -> NetworkConfig {
        let mut config = network_preset(&self.settings.default_network).unwrap_or_else(|| {
            warn!(
                network = %self.settings.default_network,
                "unknown default network, falling back to mainnet"
            );
            mainnet()
        });
        config.timeout_ms = self.settings.request_timeout_ms;
        config
    }
}

/// Shared hold on the live connection. Dropping it releases the lease.
pub struct ConnectionLease {
    guard: OwnedRwLockReadGuard<Slot, InitializedConnection>,
    shared: Arc<Shared>,
}

impl ConnectionLease {
    /// The leased transport.
    pub fn transport(&self) -> &dyn Transport {
        self.guard.transport.as_ref()
    }

    /// The leased network.
    pub fn config(&self) -> &NetworkConfig {
        &self.guard.config
    }
}

impl Deref for ConnectionLease {
    type Target = InitializedConnection;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        let _ = self.shared.leases.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive ownership of the connection slot, waiting to be switched.
///
/// Dropping the handle without calling [`switch`](Self::switch) leaves the
/// current connection in place.
pub struct NetworkSwitchHandle {
    shared: Arc<Shared>,
    guard: OwnedRwLockWriteGuard<Slot>,
    config: NetworkConfig,
}

impl NetworkSwitchHandle {
    /// The network being switched to.
    pub fn target(&self) -> &NetworkConfig {
        &self.config
    }

    /// Release the old transport, then connect to the target network.
    ///
    /// On failure no connection is live and the persisted selection is left
    /// untouched. The slot is released either way.
    #[instrument(skip_all, fields(network = %self.config.name))]
    pub async fn switch(mut self) -> Result<(), ConnectionError> {
        debug_assert_eq!(self.shared.leases.load(Ordering::SeqCst), 0);

        if let Some(old) = self.guard.take() {
            old.transport.shutdown().await;
            info!(from = %old.config.name, "released previous connection");
        }

        let transport = match self.shared.factory.connect(&self.config).await {
            Ok(transport) => transport,
            Err(source) => {
                let _ = self.shared.selected.send_replace(None);
                warn!(error = %source, "connection failed");
                return Err(ConnectionError::ConnectionFailed {
                    network: self.config.name.clone(),
                    source,
                });
            }
        };

        *self.guard = Some(InitializedConnection {
            config: self.config.clone(),
            transport,
        });

        match serde_json::to_value(&self.config) {
            Ok(value) => {
                if let Err(error) = self.shared.store.set(SELECTED_NETWORK_KEY, value).await {
                    warn!(%error, "failed to persist selected network");
                }
            }
            Err(error) => warn!(%error, "failed to serialize selected network"),
        }
        let _ = self.shared.selected.send_replace(Some(self.config.clone()));
        info!("connected");
        Ok(())
    }
}
