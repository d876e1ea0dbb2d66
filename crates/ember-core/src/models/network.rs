//! Network configuration descriptors and the built-in preset set.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the main network preset.
pub const MAINNET: &str = "Mainnet";
/// Name of the test network preset.
pub const TESTNET: &str = "Testnet";

/// Transport flavour of a remote blockchain API endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// GraphQL endpoint.
    Graphql,
    /// JSON-RPC endpoint.
    Jrpc,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graphql => write!(f, "graphql"),
            Self::Jrpc => write!(f, "jrpc"),
        }
    }
}

/// Named, immutable descriptor of one network connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Display name (`"Mainnet"`, `"Testnet"`, or a caller-supplied name).
    pub name: String,
    /// Transport flavour.
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
    /// Endpoint URL.
    pub endpoint: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl NetworkConfig {
    /// Build a GraphQL descriptor.
    pub fn graphql(name: impl Into<String>, endpoint: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            name: name.into(),
            kind: ConnectionKind::Graphql,
            endpoint: endpoint.into(),
            timeout_ms,
        }
    }

    /// Build a JSON-RPC descriptor.
    pub fn jrpc(name: impl Into<String>, endpoint: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            name: name.into(),
            kind: ConnectionKind::Jrpc,
            endpoint: endpoint.into(),
            timeout_ms,
        }
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// The main network preset, used when nothing else is configured.
pub fn mainnet() -> NetworkConfig {
    NetworkConfig::graphql(MAINNET, "https://main.ton.dev/graphql", 60_000)
}

/// The static set of named network configurations.
pub fn network_presets() -> Vec<NetworkConfig> {
    vec![
        mainnet(),
        NetworkConfig::graphql(TESTNET, "https://net.ton.dev/graphql", 60_000),
    ]
}

/// Look up a preset by name.
pub fn network_preset(name: &str) -> Option<NetworkConfig> {
    network_presets().into_iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_contain_mainnet_and_testnet() {
        let names: Vec<_> = network_presets().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec![MAINNET, TESTNET]);
    }

    #[test]
    fn preset_lookup() {
        let main = network_preset(MAINNET).unwrap();
        assert_eq!(main.kind, ConnectionKind::Graphql);
        assert_eq!(main.endpoint, "https://main.ton.dev/graphql");
        assert_eq!(main.timeout(), Duration::from_secs(60));
        assert!(network_preset("Devnet").is_none());
    }

    #[test]
    fn kind_serializes_as_type_field() {
        let cfg = NetworkConfig::jrpc("local", "http://127.0.0.1:8081/rpc", 5_000);
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["type"], "jrpc");
        assert_eq!(json["timeoutMs"], 5_000);
    }
}
