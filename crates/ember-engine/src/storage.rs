//! Persistent storage capabilities: keys, account entries, and plain
//! key-value settings.

use async_trait::async_trait;
use ember_core::models::{AssetsList, ContractType, KeyPassword, Seed, SignedMessage};
use serde_json::Value;

use crate::errors::EngineError;
use crate::wallet::UnsignedMessage;

/// Encrypted key storage.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Derive and store a key from `seed`, encrypted with `password`.
    /// Returns the public key.
    async fn add_key(&self, name: &str, seed: &Seed, password: &str) -> Result<String, EngineError>;

    /// Whether `password` unlocks the key.
    async fn check_password(&self, password: &KeyPassword) -> Result<bool, EngineError>;

    /// Sign a prepared message with the key unlocked by `password`.
    async fn sign(
        &self,
        message: &dyn UnsignedMessage,
        password: &KeyPassword,
    ) -> Result<SignedMessage, EngineError>;

    /// Remove every key.
    async fn clear(&self) -> Result<(), EngineError>;
}

/// Account entries and the current-account pointer.
#[async_trait]
pub trait AccountsStorage: Send + Sync {
    /// The selected account, if any.
    async fn current_account(&self) -> Result<Option<AssetsList>, EngineError>;

    /// Point the current account at `address`.
    async fn set_current_account(&self, address: &str) -> Result<AssetsList, EngineError>;

    /// Look up one account by base-wallet address.
    async fn get_account(&self, address: &str) -> Result<Option<AssetsList>, EngineError>;

    /// Every stored account.
    async fn stored_accounts(&self) -> Result<Vec<AssetsList>, EngineError>;

    /// Create an account entry for a key; the address is computed by the
    /// engine.
    async fn add_account(
        &self,
        name: &str,
        public_key: &str,
        contract_type: ContractType,
        make_current: bool,
    ) -> Result<AssetsList, EngineError>;

    /// Remove an account; returns the removed entry.
    async fn remove_account(&self, address: &str) -> Result<Option<AssetsList>, EngineError>;

    /// Remove every account and the current-account pointer.
    async fn clear(&self) -> Result<(), EngineError>;
}

/// Small JSON key-value store for controller state.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Value>, EngineError>;

    /// Write a value.
    async fn set(&self, key: &str, value: Value) -> Result<(), EngineError>;

    /// Delete a value.
    async fn remove(&self, key: &str) -> Result<(), EngineError>;
}
