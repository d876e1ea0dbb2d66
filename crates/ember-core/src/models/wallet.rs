//! Account entries, contract state, and message types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// Wallet contract flavour, as understood by the wallet engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    /// Safe multisig wallet.
    SafeMultisigWallet,
    /// Safe multisig wallet with 24h confirmations.
    SafeMultisigWallet24h,
    /// Setcode multisig wallet.
    SetcodeMultisigWallet,
    /// Surf wallet.
    SurfWallet,
    /// Wallet v3.
    WalletV3,
}

/// The base wallet of an account entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TonWalletAsset {
    /// Wallet contract address.
    pub address: String,
    /// Hex-encoded public key.
    pub public_key: String,
    /// Contract flavour.
    pub contract_type: ContractType,
}

/// A token wallet attached to an account entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenWalletAsset {
    /// Address of the root token contract.
    pub root_token_contract: String,
}

/// One stored account entry: a base wallet plus its token wallets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetsList {
    /// User-visible account name.
    pub name: String,
    /// Base wallet.
    pub ton_wallet: TonWalletAsset,
    /// Token wallets owned by the base wallet.
    #[serde(default)]
    pub token_wallets: Vec<TokenWalletAsset>,
}

impl AssetsList {
    /// Address of the base wallet.
    pub fn address(&self) -> &str {
        &self.ton_wallet.address
    }
}

/// Logical time and unix time of the block a state was generated in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenTimings {
    /// Logical time.
    pub gen_lt: u64,
    /// Unix time.
    pub gen_utime: u32,
}

/// Snapshot of a wallet contract's on-chain state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractState {
    /// Balance in nano units.
    pub balance: u64,
    /// Generation timings.
    pub gen_timings: GenTimings,
    /// Last transaction applied to the contract.
    pub last_transaction_id: Option<crate::models::TransactionId>,
    /// Whether the contract code is deployed.
    pub is_deployed: bool,
}

/// How a wallet handle wants to be polled right now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollingMethod {
    /// Plain interval polling.
    #[default]
    Manual,
    /// Outbound messages are in flight; poll aggressively.
    Reliable,
}

/// A signed message ready for submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    /// Content hash of the message body.
    pub body_hash: MessageId,
    /// Unix time after which the message can no longer be included.
    pub expire_at: u32,
    /// Serialized message.
    pub boc: String,
}

/// A submitted message the engine is watching for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    /// Content hash of the message body.
    pub body_hash: MessageId,
    /// Unix time after which the message is considered expired.
    pub expire_at: u32,
}

/// Parameters of a simple transfer to prepare.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageToPrepare {
    /// Destination address.
    pub recipient: String,
    /// Amount in nano units.
    pub amount: u64,
    /// Optional serialized payload.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Password used to unlock a stored key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPassword {
    /// Public key of the key to unlock.
    pub public_key: String,
    /// Password.
    pub password: String,
}

impl fmt::Debug for KeyPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPassword")
            .field("public_key", &self.public_key)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Mnemonic seed for a new key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    /// Space-separated words.
    pub phrase: String,
    /// Mnemonic flavour understood by the engine.
    pub mnemonic_type: String,
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("phrase", &"<redacted>")
            .field("mnemonic_type", &self.mnemonic_type)
            .finish()
    }
}

/// Request to create a new account from a seed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountToCreate {
    /// Account name.
    pub name: String,
    /// Wallet contract flavour.
    pub contract_type: ContractType,
    /// Mnemonic seed.
    pub seed: Seed,
    /// Password to encrypt the key with.
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_password_debug_is_redacted() {
        let pw = KeyPassword {
            public_key: "pk".into(),
            password: "hunter2".into(),
        };
        let dbg = format!("{pw:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("pk"));
    }

    #[test]
    fn assets_list_defaults_token_wallets() {
        let json = serde_json::json!({
            "name": "Main",
            "tonWallet": {
                "address": "0:aa",
                "publicKey": "pk",
                "contractType": "SafeMultisigWallet"
            }
        });
        let entry: AssetsList = serde_json::from_value(json).unwrap();
        assert!(entry.token_wallets.is_empty());
        assert_eq!(entry.address(), "0:aa");
    }
}
