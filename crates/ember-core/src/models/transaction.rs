//! Transactions and transaction batch descriptors.

use serde::{Deserialize, Serialize};

/// Identifier of an on-chain transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionId {
    /// Logical time.
    pub lt: u64,
    /// Transaction hash.
    pub hash: String,
}

/// A message carried by a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Source address, absent for external inbound messages.
    pub src: Option<String>,
    /// Destination address, absent for external outbound messages.
    pub dst: Option<String>,
    /// Attached value in nano units.
    pub value: u64,
    /// Whether the message bounces on failure.
    pub bounce: bool,
    /// Body hash, if the message has a body.
    pub body_hash: Option<String>,
}

/// A base-wallet transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction identifier.
    pub id: TransactionId,
    /// Previous transaction of the same account.
    pub prev_trans_id: Option<TransactionId>,
    /// Unix time.
    pub created_at: u32,
    /// Whether execution was aborted.
    pub aborted: bool,
    /// Inbound message.
    pub in_msg: Message,
    /// Outbound messages.
    #[serde(default)]
    pub out_msgs: Vec<Message>,
}

/// Direction of a token transfer relative to the owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenDirection {
    /// Tokens received.
    Incoming,
    /// Tokens sent.
    Outgoing,
}

/// A token-wallet transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransaction {
    /// Underlying transaction identifier.
    pub id: TransactionId,
    /// Unix time.
    pub created_at: u32,
    /// Transfer direction.
    pub direction: TokenDirection,
    /// Token amount as a decimal string.
    pub amount: String,
    /// Counterparty owner address, when known.
    pub counterparty: Option<String>,
}

/// Anything that carries a [`TransactionId`] and can be merged into an
/// ordered transaction list.
pub trait HasTransactionId {
    /// The transaction identifier.
    fn transaction_id(&self) -> &TransactionId;
}

impl HasTransactionId for Transaction {
    fn transaction_id(&self) -> &TransactionId {
        &self.id
    }
}

impl HasTransactionId for TokenTransaction {
    fn transaction_id(&self) -> &TransactionId {
        &self.id
    }
}

/// Whether a batch holds freshly observed or backfilled transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchType {
    /// Backfill of older history.
    Old,
    /// Newly observed transactions.
    New,
}

/// Bounds and kind of a transaction batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsBatchInfo {
    /// Smallest logical time in the batch.
    pub min_lt: u64,
    /// Largest logical time in the batch.
    pub max_lt: u64,
    /// Batch kind.
    pub batch_type: BatchType,
}
