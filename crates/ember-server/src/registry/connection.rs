//! One attached browser context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use ember_core::ConnectionId;
use tokio::sync::mpsc;

/// An attached tab or extension page.
///
/// Outbound frames go through a bounded channel drained by the context's
/// write task. A full or closed channel drops the frame.
#[derive(Debug)]
pub struct ClientConnection {
    /// Opaque id assigned on attach.
    pub id: ConnectionId,
    /// Origin the context was loaded from.
    pub origin: String,
    /// Browser tab, if the context lives in one.
    pub tab_id: Option<u32>,
    /// Whether this is a trusted UI surface of the wallet itself.
    pub trusted: bool,
    /// When the context attached.
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Arc<String>>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection with a fresh id.
    pub fn new(
        origin: impl Into<String>,
        tab_id: Option<u32>,
        trusted: bool,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            origin: origin.into(),
            tab_id,
            trusted,
            connected_at: Utc::now(),
            tx,
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a frame. Returns `false` and counts a drop if the channel is
    /// full or closed.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Frames dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_frame() {
        let (tx, mut rx) = mpsc::channel(4);
        let conn = ClientConnection::new("https://app.example", Some(3), false, tx);
        assert!(conn.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn full_channel_counts_drop() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new("https://app.example", None, false, tx);
        assert!(conn.send(Arc::new("one".into())));
        assert!(!conn.send(Arc::new("two".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn closed_channel_counts_drop() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let conn = ClientConnection::new("https://app.example", None, true, tx);
        assert!(!conn.send(Arc::new("lost".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn ids_are_unique() {
        let (tx, _rx) = mpsc::channel(1);
        let a = ClientConnection::new("o", None, false, tx.clone());
        let b = ClientConnection::new("o", None, false, tx);
        assert_ne!(a.id, b.id);
    }
}
