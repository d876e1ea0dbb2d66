//! User-facing notifications for newly found transactions.

use std::fmt;

use ember_core::models::Transaction;
use tracing::info;

/// Nano units per whole coin.
const NANO: u64 = 1_000_000_000;

/// Sink for user-facing notifications (the host's notification center).
pub trait Notifier: Send + Sync {
    /// Show one notification.
    fn show(&self, title: &str, body: &str);
}

/// Notifier that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show(&self, title: &str, body: &str) {
        info!(title, body, "notification");
    }
}

/// Direction of a transaction relative to the wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Value left the wallet.
    To,
    /// Value arrived at the wallet.
    From,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::To => write!(f, "to"),
            Self::From => write!(f, "from"),
        }
    }
}

/// Value, direction, and counterparty of a transaction. Outgoing values are
/// summed, saturating at `u64::MAX`.
pub fn summarize(transaction: &Transaction) -> (u64, Direction, &str) {
    if let Some(dst) = transaction.out_msgs.first().and_then(|m| m.dst.as_deref()) {
        let value = transaction
            .out_msgs
            .iter()
            .fold(0u64, |total, m| total.saturating_add(m.value));
        return (value, Direction::To, dst);
    }
    let src = transaction.in_msg.src.as_deref().unwrap_or("unknown");
    (transaction.in_msg.value, Direction::From, src)
}

/// Format nano units as a decimal coin amount (`1500000000` → `1.5`).
pub fn convert_tons(nano: u64) -> String {
    let whole = nano / NANO;
    let frac = nano % NANO;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:09}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Shorten an address to its first six and last four characters.
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_owned();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Title and body for a batch of newly found transactions, or `None` for an
/// empty batch.
pub fn new_transactions_notification(transactions: &[Transaction]) -> Option<(String, String)> {
    if transactions.is_empty() {
        return None;
    }
    let title = if transactions.len() == 1 {
        "New transaction found"
    } else {
        "New transactions found"
    };
    let body = transactions
        .iter()
        .map(|t| {
            let (value, direction, address) = summarize(t);
            format!(
                "{} TON {direction} {}",
                convert_tons(value),
                shorten_address(address)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some((title.to_owned(), body))
}
