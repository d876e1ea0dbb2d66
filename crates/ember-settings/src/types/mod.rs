//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]`. Every section is
//! `#[serde(default)]`, so partial JSON fills missing fields from defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmberSettings {
    /// Wallet subscription polling cadence.
    pub polling: PollingSettings,
    /// Network selection.
    pub network: NetworkSettings,
    /// Connection registry and update fan-out.
    pub registry: RegistrySettings,
    /// User-facing transaction notifications.
    pub notifications: NotificationSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Wallet subscription polling cadence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingSettings {
    /// Interval while a trusted UI surface is open.
    pub active_interval_ms: u64,
    /// Interval while no trusted UI surface is open.
    pub idle_interval_ms: u64,
    /// Interval while outbound messages await confirmation.
    pub reliable_interval_ms: u64,
    /// Minimum number of fast ticks after a reliable-polling request.
    pub reliable_ticks: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            active_interval_ms: 10_000,
            idle_interval_ms: 120_000,
            reliable_interval_ms: 1_000,
            reliable_ticks: 3,
        }
    }
}

impl PollingSettings {
    /// Active interval.
    pub fn active_interval(&self) -> Duration {
        Duration::from_millis(self.active_interval_ms)
    }

    /// Idle interval.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Reliable interval.
    pub fn reliable_interval(&self) -> Duration {
        Duration::from_millis(self.reliable_interval_ms)
    }
}

/// Network selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSettings {
    /// Preset used when nothing has been persisted yet.
    pub default_network: String,
    /// Timeout applied to transport requests.
    pub request_timeout_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            default_network: "Mainnet".into(),
            request_timeout_ms: 60_000,
        }
    }
}

/// Connection registry and update fan-out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// Per-connection outbound queue capacity.
    pub client_channel_capacity: usize,
    /// Coalescing window for full-state updates to trusted surfaces.
    pub update_debounce_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            client_channel_capacity: 64,
            update_debounce_ms: 200,
        }
    }
}

/// User-facing transaction notifications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    /// Whether "new transaction" notifications are shown.
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
