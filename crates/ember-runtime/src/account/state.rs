//! Account state aggregate and the events derived from it.

use std::collections::BTreeMap;

use ember_core::MessageId;
use ember_core::models::{
    AssetsList, ContractState, TokenTransaction, Transaction, TransactionsBatchInfo,
};
use serde::{Deserialize, Serialize};

/// A sent message awaiting confirmation or expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessage {
    /// Unix time after which the engine reports the message expired.
    pub expire_at: u32,
}

/// Everything the account controller knows about the user's wallets.
///
/// Slots are replaced whole, never patched, so a reader never sees a partial
/// update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    /// Currently selected account.
    pub selected_account: Option<AssetsList>,
    /// Stored accounts grouped by public key.
    pub account_entries: BTreeMap<String, Vec<AssetsList>>,
    /// Contract state by wallet address.
    pub account_contract_states: BTreeMap<String, ContractState>,
    /// Token balance by owner address, then root token contract.
    pub account_token_balances: BTreeMap<String, BTreeMap<String, String>>,
    /// Transactions by wallet address, newest first.
    pub account_transactions: BTreeMap<String, Vec<Transaction>>,
    /// Token transactions by owner address, then root token contract.
    pub account_token_transactions: BTreeMap<String, BTreeMap<String, Vec<TokenTransaction>>>,
    /// Pending messages by wallet address, then message id.
    pub account_pending_messages: BTreeMap<String, BTreeMap<MessageId, PendingMessage>>,
}

impl AccountState {
    /// Every stored account entry.
    pub fn entries(&self) -> impl Iterator<Item = &AssetsList> {
        self.account_entries.values().flatten()
    }

    /// Look up an entry by base-wallet address.
    pub fn find_entry(&self, address: &str) -> Option<&AssetsList> {
        self.entries().find(|e| e.address() == address)
    }

    /// Add an entry under its public key.
    pub(crate) fn insert_entry(&mut self, entry: AssetsList) {
        let entries = self
            .account_entries
            .entry(entry.ton_wallet.public_key.clone())
            .or_default();
        entries.retain(|e| e.address() != entry.address());
        entries.push(entry);
    }

    /// Drop every slot that belongs to `address`.
    pub(crate) fn remove_account(&mut self, address: &str) {
        self.account_entries.retain(|_, entries| {
            entries.retain(|e| e.address() != address);
            !entries.is_empty()
        });
        let _ = self.account_contract_states.remove(address);
        let _ = self.account_transactions.remove(address);
        let _ = self.account_token_balances.remove(address);
        let _ = self.account_token_transactions.remove(address);
        let _ = self.account_pending_messages.remove(address);
        if self
            .selected_account
            .as_ref()
            .is_some_and(|s| s.address() == address)
        {
            self.selected_account = None;
        }
    }
}

/// Account-level change, published for fan-out to interested contexts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountEvent {
    /// A wallet's contract state was replaced.
    ContractStateChanged {
        /// Wallet address.
        address: String,
        /// New state.
        state: ContractState,
    },
    /// Transactions were merged for a wallet.
    TransactionsFound {
        /// Wallet address.
        address: String,
        /// The batch as observed.
        transactions: Vec<Transaction>,
        /// Batch bounds and kind.
        info: TransactionsBatchInfo,
    },
    /// A token balance was replaced.
    TokenBalanceChanged {
        /// Owner address.
        owner: String,
        /// Root token contract.
        root_token_contract: String,
        /// New balance.
        balance: String,
    },
}

impl AccountEvent {
    /// The base-wallet address the event concerns.
    pub fn address(&self) -> &str {
        match self {
            Self::ContractStateChanged { address, .. } | Self::TransactionsFound { address, .. } => {
                address
            }
            Self::TokenBalanceChanged { owner, .. } => owner,
        }
    }

    /// Notification method name for browser contexts.
    pub fn method(&self) -> &'static str {
        match self {
            Self::ContractStateChanged { .. } => "contractStateChanged",
            Self::TransactionsFound { .. } => "transactionsFound",
            Self::TokenBalanceChanged { .. } => "tokenBalanceChanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::models::ContractType;
    use ember_engine::testing::{assets_list, deployed_state};

    #[test]
    fn remove_account_drops_empty_key_bucket() {
        let a = assets_list("A", "pk1", ContractType::WalletV3);
        let b = assets_list("B", "pk1", ContractType::SurfWallet);
        let mut state = AccountState::default();
        state.insert_entry(a.clone());
        state.insert_entry(b.clone());
        state.selected_account = Some(a.clone());
        let _ = state
            .account_contract_states
            .insert(a.address().to_owned(), deployed_state(1));

        state.remove_account(a.address());
        assert_eq!(state.account_entries["pk1"], vec![b.clone()]);
        assert!(state.selected_account.is_none());
        assert!(state.account_contract_states.is_empty());

        state.remove_account(b.address());
        assert!(state.account_entries.is_empty());
    }

    #[test]
    fn insert_entry_replaces_same_address() {
        let a = assets_list("A", "pk1", ContractType::WalletV3);
        let mut state = AccountState::default();
        state.insert_entry(a.clone());
        state.insert_entry(a.clone());
        assert_eq!(state.entries().count(), 1);
        assert_eq!(state.find_entry(a.address()), Some(&a));
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(AccountState::default()).unwrap();
        assert!(json.get("accountPendingMessages").is_some());
        assert!(json.get("selectedAccount").is_some());
    }

    #[test]
    fn event_routing_address() {
        let event = AccountEvent::TokenBalanceChanged {
            owner: "0:o".into(),
            root_token_contract: "0:r".into(),
            balance: "1".into(),
        };
        assert_eq!(event.address(), "0:o");
        assert_eq!(event.method(), "tokenBalanceChanged");
    }
}
