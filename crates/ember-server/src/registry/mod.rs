//! Connection registry and notification fan-out.
//!
//! Every attached context is indexed by id, by origin, and (if it lives in a
//! tab) by tab. An id sits in exactly one origin bucket and at most one tab
//! bucket; a bucket is deleted as soon as it becomes empty.
//!
//! Detach is synchronous and takes the write lock, while every notify path
//! delivers under the read lock. Once [`ConnectionRegistry::detach`] returns,
//! no notification can reach the detached id.

mod connection;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ember_core::ConnectionId;
use ember_settings::RegistrySettings;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::rpc::types::RpcNotification;

pub use connection::ClientConnection;

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    by_origin: HashMap<String, HashSet<ConnectionId>>,
    by_tab: HashMap<u32, HashSet<ConnectionId>>,
}

/// Attached contexts and the notify-by-scope primitives.
pub struct ConnectionRegistry {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Empty registry; each attached context gets a queue of
    /// `client_channel_capacity` frames.
    pub fn new(settings: &RegistrySettings) -> Self {
        Self {
            capacity: settings.client_channel_capacity.max(1),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Attach a context. Returns the connection and the receiving end of its
    /// outbound queue.
    pub fn attach(
        &self,
        origin: &str,
        tab_id: Option<u32>,
        trusted: bool,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let connection = Arc::new(ClientConnection::new(origin, tab_id, trusted, tx));
        let id = connection.id.clone();

        let mut inner = self.inner.write();
        let _ = inner
            .connections
            .insert(id.clone(), Arc::clone(&connection));
        let _ = inner
            .by_origin
            .entry(origin.to_owned())
            .or_default()
            .insert(id.clone());
        if let Some(tab) = tab_id {
            let _ = inner.by_tab.entry(tab).or_default().insert(id.clone());
        }
        drop(inner);

        debug!(connection_id = %id, origin, tab_id, trusted, "context attached");
        (connection, rx)
    }

    /// Detach a context, deleting any bucket it leaves empty.
    pub fn detach(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let mut inner = self.inner.write();
        let connection = inner.connections.remove(id)?;

        if let Some(bucket) = inner.by_origin.get_mut(&connection.origin) {
            let _ = bucket.remove(id);
            if bucket.is_empty() {
                let _ = inner.by_origin.remove(&connection.origin);
            }
        }
        if let Some(tab) = connection.tab_id {
            if let Some(bucket) = inner.by_tab.get_mut(&tab) {
                let _ = bucket.remove(id);
                if bucket.is_empty() {
                    let _ = inner.by_tab.remove(&tab);
                }
            }
        }
        drop(inner);

        debug!(
            connection_id = %id,
            origin = %connection.origin,
            tab_id = connection.tab_id,
            dropped = connection.drop_count(),
            "context detached"
        );
        Some(connection)
    }

    /// Look up an attached context.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.inner.read().connections.get(id).cloned()
    }

    /// Number of attached contexts.
    pub fn len(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Whether nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.inner.read().connections.is_empty()
    }

    /// Origins with at least one attached context, sorted.
    pub fn origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self.inner.read().by_origin.keys().cloned().collect();
        origins.sort();
        origins
    }

    /// Number of contexts attached from `tab`.
    pub fn tab_connection_count(&self, tab: u32) -> usize {
        self.inner.read().by_tab.get(&tab).map_or(0, HashSet::len)
    }

    /// Deliver to one context. Returns whether it was queued.
    pub fn notify_connection(&self, id: &ConnectionId, notification: &RpcNotification) -> bool {
        let Some(frame) = encode(notification) else {
            return false;
        };
        let inner = self.inner.read();
        inner
            .connections
            .get(id)
            .is_some_and(|c| deliver(c, &frame, &notification.method))
    }

    /// Deliver to every context under `origin`. Returns how many were queued.
    pub fn notify_origin(&self, origin: &str, notification: &RpcNotification) -> usize {
        let Some(frame) = encode(notification) else {
            return 0;
        };
        let inner = self.inner.read();
        let delivered = inner.by_origin.get(origin).map_or(0, |ids| {
            deliver_to(&inner.connections, ids, &frame, &notification.method)
        });
        debug!(method = %notification.method, origin, delivered, "notify origin");
        delivered
    }

    /// Deliver to every context in `tab`. Returns how many were queued.
    pub fn notify_tab(&self, tab: u32, notification: &RpcNotification) -> usize {
        let Some(frame) = encode(notification) else {
            return 0;
        };
        let inner = self.inner.read();
        let delivered = inner.by_tab.get(&tab).map_or(0, |ids| {
            deliver_to(&inner.connections, ids, &frame, &notification.method)
        });
        debug!(method = %notification.method, tab_id = tab, delivered, "notify tab");
        delivered
    }

    /// Deliver to every attached context. Returns how many were queued.
    pub fn notify_all(&self, notification: &RpcNotification) -> usize {
        self.notify_where(notification, |_| true)
    }

    /// Deliver to every trusted UI surface. Returns how many were queued.
    pub fn notify_trusted(&self, notification: &RpcNotification) -> usize {
        self.notify_where(notification, |c| c.trusted)
    }

    fn notify_where(
        &self,
        notification: &RpcNotification,
        filter: impl Fn(&ClientConnection) -> bool,
    ) -> usize {
        let Some(frame) = encode(notification) else {
            return 0;
        };
        let inner = self.inner.read();
        let delivered = inner
            .connections
            .values()
            .filter(|c| filter(c))
            .filter(|c| deliver(c, &frame, &notification.method))
            .count();
        debug!(method = %notification.method, delivered, "notify all");
        delivered
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let inner = self.inner.read();
        for (id, connection) in &inner.connections {
            let origins = inner.by_origin.values().filter(|b| b.contains(id)).count();
            assert_eq!(origins, 1, "{id} must be in exactly one origin bucket");
            assert!(inner.by_origin[&connection.origin].contains(id));
            let tabs = inner.by_tab.values().filter(|b| b.contains(id)).count();
            assert_eq!(tabs, usize::from(connection.tab_id.is_some()));
        }
        for bucket in inner.by_origin.values().chain(inner.by_tab.values()) {
            assert!(!bucket.is_empty(), "empty bucket leaked");
            assert!(bucket.iter().all(|id| inner.connections.contains_key(id)));
        }
    }
}

fn encode(notification: &RpcNotification) -> Option<Arc<String>> {
    match serde_json::to_string(notification) {
        Ok(json) => Some(Arc::new(json)),
        Err(error) => {
            warn!(method = %notification.method, %error, "failed to serialize notification");
            None
        }
    }
}

fn deliver(connection: &ClientConnection, frame: &Arc<String>, method: &str) -> bool {
    let sent = connection.send(Arc::clone(frame));
    if !sent {
        warn!(connection_id = %connection.id, method, "failed to queue notification");
    }
    sent
}

fn deliver_to(
    connections: &HashMap<ConnectionId, Arc<ClientConnection>>,
    ids: &HashSet<ConnectionId>,
    frame: &Arc<String>,
    method: &str,
) -> usize {
    ids.iter()
        .filter_map(|id| connections.get(id))
        .filter(|c| deliver(c, frame, method))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(&RegistrySettings::default())
    }

    fn note(method: &str) -> RpcNotification {
        RpcNotification::new(method, json!({}))
    }

    #[test]
    fn attach_indexes_by_origin_and_tab() {
        let reg = registry();
        let (a, _ra) = reg.attach("https://a.example", Some(1), false);
        let (_b, _rb) = reg.attach("https://a.example", Some(2), false);
        let (_c, _rc) = reg.attach("https://b.example", None, false);

        assert_eq!(reg.len(), 3);
        assert_eq!(reg.origins(), vec!["https://a.example", "https://b.example"]);
        assert_eq!(reg.tab_connection_count(1), 1);
        assert!(reg.get(&a.id).is_some());
        reg.assert_consistent();
    }

    #[test]
    fn detach_deletes_empty_buckets() {
        let reg = registry();
        let (a, _ra) = reg.attach("https://a.example", Some(1), false);
        let (b, _rb) = reg.attach("https://a.example", Some(1), false);

        let _ = reg.detach(&a.id).unwrap();
        assert_eq!(reg.origins(), vec!["https://a.example"]);
        assert_eq!(reg.tab_connection_count(1), 1);

        let _ = reg.detach(&b.id).unwrap();
        assert!(reg.origins().is_empty());
        assert_eq!(reg.tab_connection_count(1), 0);
        assert!(reg.is_empty());
        reg.assert_consistent();
    }

    #[test]
    fn detach_unknown_is_none() {
        let reg = registry();
        assert!(reg.detach(&ConnectionId::new()).is_none());
    }

    #[test]
    fn notify_scopes() {
        let reg = registry();
        let (a, mut ra) = reg.attach("https://a.example", Some(1), false);
        let (_b, mut rb) = reg.attach("https://a.example", Some(2), false);
        let (_c, mut rc) = reg.attach("https://c.example", Some(1), true);

        assert_eq!(reg.notify_origin("https://a.example", &note("permissionsChanged")), 2);
        assert!(ra.try_recv().is_ok());
        assert!(rb.try_recv().is_ok());
        assert!(rc.try_recv().is_err());

        assert_eq!(reg.notify_tab(1, &note("contractStateChanged")), 2);
        assert!(ra.try_recv().is_ok());
        assert!(rb.try_recv().is_err());
        assert!(rc.try_recv().is_ok());

        assert!(reg.notify_connection(&a.id, &note("x")));
        assert!(ra.try_recv().is_ok());

        assert_eq!(reg.notify_trusted(&note("sendUpdate")), 1);
        assert!(rc.try_recv().is_ok());

        assert_eq!(reg.notify_all(&note("networkChanged")), 3);
    }

    #[test]
    fn notification_frame_is_json_rpc() {
        let reg = registry();
        let (_a, mut ra) = reg.attach("https://a.example", None, false);
        let _ = reg.notify_all(&RpcNotification::new("loggedOut", json!({})));

        let frame: serde_json::Value = serde_json::from_str(&ra.try_recv().unwrap()).unwrap();
        assert_eq!(frame["jsonrpc"], "2.0");
        assert_eq!(frame["method"], "loggedOut");
        assert_eq!(frame["params"], json!({}));
    }

    #[test]
    fn detached_context_receives_nothing() {
        let reg = registry();
        let (a, mut ra) = reg.attach("https://a.example", Some(7), false);
        let _ = reg.detach(&a.id);

        assert!(!reg.notify_connection(&a.id, &note("x")));
        assert_eq!(reg.notify_origin("https://a.example", &note("x")), 0);
        assert_eq!(reg.notify_tab(7, &note("x")), 0);
        assert_eq!(reg.notify_all(&note("x")), 0);
        assert!(ra.try_recv().is_err());
    }

    #[test]
    fn full_queue_does_not_block_others() {
        let reg = ConnectionRegistry::new(&RegistrySettings {
            client_channel_capacity: 1,
            ..RegistrySettings::default()
        });
        let (slow, _rs) = reg.attach("https://a.example", None, false);
        let (_fast, mut rf) = reg.attach("https://a.example", None, false);

        assert_eq!(reg.notify_all(&note("one")), 2);
        assert!(rf.try_recv().is_ok());
        assert_eq!(reg.notify_all(&note("two")), 1);
        assert_eq!(slow.drop_count(), 1);
    }

    type Receiver = mpsc::Receiver<Arc<String>>;

    #[derive(Clone, Debug)]
    enum Op {
        Attach { origin: u8, tab: Option<u8> },
        Detach(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..3, proptest::option::of(0u8..3))
                .prop_map(|(origin, tab)| Op::Attach { origin, tab }),
            (0usize..16).prop_map(Op::Detach),
        ]
    }

    proptest! {
        #[test]
        fn buckets_stay_consistent(ops in proptest::collection::vec(op(), 0..40)) {
            let reg = registry();
            let mut attached: Vec<(Arc<ClientConnection>, Receiver)> = Vec::new();
            for op in ops {
                match op {
                    Op::Attach { origin, tab } => {
                        let origin = format!("https://{origin}.example");
                        attached.push(reg.attach(&origin, tab.map(u32::from), false));
                    }
                    Op::Detach(index) if !attached.is_empty() => {
                        let (connection, mut rx) = attached.remove(index % attached.len());
                        prop_assert!(reg.detach(&connection.id).is_some());
                        while rx.try_recv().is_ok() {}
                        let _ = reg.notify_all(&note("after"));
                        let _ = reg.notify_origin(&connection.origin, &note("after"));
                        prop_assert!(rx.try_recv().is_err());
                    }
                    Op::Detach(_) => {}
                }
                reg.assert_consistent();
            }
            prop_assert_eq!(reg.len(), attached.len());
        }
    }
}
