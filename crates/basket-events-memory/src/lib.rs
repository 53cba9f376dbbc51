//! In-memory notification hub.
//!
//! This implementation is suitable for:
//! - Single server deployments
//! - Development and testing
//!
//! Subscribers live in this process only. Replicas do not see each other's connections.

use async_trait::async_trait;
use basket_events::{
    CartEvent, Connection, ConnectionError, ConnectionId, DeliveryOutcome, HubError,
    NotificationHub, NotifyReport,
};
use basket_storage::GroupId;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

type Registry = DashMap<GroupId, HashMap<ConnectionId, Arc<dyn Connection>>>;

/// Subscriber registry keyed by group.
///
/// Deliveries are made against a snapshot taken under the shard lock; sends and pruning
/// happen after the lock is released, so concurrent subscribe/notify never block on a client.
pub struct MemoryHub {
    subscribers: Arc<Registry>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
        }
    }

    fn snapshot(&self, group_id: &GroupId) -> Vec<Arc<dyn Connection>> {
        self.subscribers
            .get(group_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    fn prune<'a>(&self, group_id: &GroupId, dead: impl Iterator<Item = &'a ConnectionId>) {
        if let Some(mut set) = self.subscribers.get_mut(group_id) {
            for id in dead {
                set.remove(id);
            }
        }
        self.subscribers.remove_if(group_id, |_, set| set.is_empty());
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationHub for MemoryHub {
    async fn subscribe(
        &self,
        group_id: &GroupId,
        connection: Arc<dyn Connection>,
    ) -> Result<(), HubError> {
        let id = connection.id();
        self.subscribers
            .entry(group_id.clone())
            .or_default()
            .insert(id, connection);
        tracing::debug!(group_id = %group_id, connection_id = %id, "subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, connection_id: &ConnectionId) -> Result<(), HubError> {
        self.subscribers.retain(|_, set| {
            set.remove(connection_id);
            !set.is_empty()
        });
        tracing::debug!(connection_id = %connection_id, "unsubscribed");
        Ok(())
    }

    async fn notify(&self, group_id: &GroupId) -> NotifyReport {
        let targets = self.snapshot(group_id);
        if targets.is_empty() {
            return NotifyReport::default();
        }

        let event = CartEvent::cart_updated(group_id.clone());
        let outcomes: Vec<_> = targets
            .iter()
            .map(|conn| (conn.id(), DeliveryOutcome::attempt(conn.as_ref(), &event)))
            .collect();
        let report = NotifyReport { outcomes };

        if report.pruned().next().is_some() {
            self.prune(group_id, report.pruned());
            for (id, outcome) in &report.outcomes {
                if let DeliveryOutcome::Failed(reason) = outcome {
                    tracing::warn!(group_id = %group_id, connection_id = %id, %reason, "dropping subscriber after failed send");
                }
            }
        }

        tracing::debug!(
            group_id = %group_id,
            delivered = report.delivered(),
            attempted = report.outcomes.len(),
            "cart_updated fanned out"
        );
        report
    }

    fn subscriber_count(&self, group_id: &GroupId) -> usize {
        self.subscribers
            .get(group_id)
            .map(|set| set.len())
            .unwrap_or(0)
    }
}

/// Connection backed by a bounded tokio channel.
///
/// The transport drains the receiver and writes to the socket. A full buffer means the
/// client is not keeping up; that send fails and the hub drops the handle.
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<CartEvent>,
}

impl ChannelConnection {
    pub fn new(buffer: usize) -> (Arc<Self>, mpsc::Receiver<CartEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            tx,
        });
        (conn, rx)
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn try_send(&self, event: &CartEvent) -> Result<(), ConnectionError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => ConnectionError::Failed("send buffer full".to_string()),
            TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    fn group() -> GroupId {
        GroupId(Uuid::new_v4())
    }

    /// Counts sends and always reports a transport error.
    struct BrokenConnection {
        id: ConnectionId,
        attempts: AtomicUsize,
    }

    impl Connection for BrokenConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn is_open(&self) -> bool {
            true
        }

        fn try_send(&self, _event: &CartEvent) -> Result<(), ConnectionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ConnectionError::Failed("socket reset".into()))
        }
    }

    #[tokio::test]
    async fn subscribe_then_notify_delivers_once() {
        let hub = MemoryHub::new();
        let group_id = group();
        let (conn, mut rx) = ChannelConnection::new(8);

        hub.subscribe(&group_id, conn).await.unwrap();
        let report = hub.notify(&group_id).await;

        assert_eq!(report.delivered(), 1);
        let event = tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert_eq!(event, CartEvent::cart_updated(group_id));
        assert!(rx.try_recv().is_err(), "exactly one event expected");
    }

    #[tokio::test]
    async fn subscribing_twice_is_idempotent() {
        let hub = MemoryHub::new();
        let group_id = group();
        let (conn, mut rx) = ChannelConnection::new(8);

        hub.subscribe(&group_id, conn.clone()).await.unwrap();
        hub.subscribe(&group_id, conn).await.unwrap();
        assert_eq!(hub.subscriber_count(&group_id), 1);

        hub.notify(&group_id).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = MemoryHub::new();
        let group_id = group();
        let (conn, mut rx) = ChannelConnection::new(8);

        hub.subscribe(&group_id, conn.clone()).await.unwrap();
        hub.unsubscribe(&conn.id()).await.unwrap();

        let report = hub.notify(&group_id).await;
        assert!(report.is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count(&group_id), 0);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_connection_is_harmless() {
        let hub = MemoryHub::new();
        let group_id = group();
        let (conn, _rx) = ChannelConnection::new(8);
        hub.subscribe(&group_id, conn).await.unwrap();

        hub.unsubscribe(&ConnectionId::new()).await.unwrap();
        assert_eq!(hub.subscriber_count(&group_id), 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_from_every_group() {
        let hub = MemoryHub::new();
        let (a, b) = (group(), group());
        let (conn, _rx) = ChannelConnection::new(8);

        hub.subscribe(&a, conn.clone()).await.unwrap();
        hub.subscribe(&b, conn.clone()).await.unwrap();
        hub.unsubscribe(&conn.id()).await.unwrap();

        assert_eq!(hub.subscriber_count(&a), 0);
        assert_eq!(hub.subscriber_count(&b), 0);
    }

    #[tokio::test]
    async fn notify_without_subscribers_is_a_no_op() {
        let hub = MemoryHub::new();
        let report = hub.notify(&group()).await;
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn closed_handle_is_pruned_and_others_still_receive() {
        let hub = MemoryHub::new();
        let group_id = group();
        let (live, mut live_rx) = ChannelConnection::new(8);
        let (gone, gone_rx) = ChannelConnection::new(8);

        hub.subscribe(&group_id, live).await.unwrap();
        hub.subscribe(&group_id, gone.clone()).await.unwrap();
        drop(gone_rx);

        let report = hub.notify(&group_id).await;
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.pruned().copied().collect::<Vec<_>>(), vec![gone.id()]);
        assert!(live_rx.try_recv().is_ok());
        assert_eq!(hub.subscriber_count(&group_id), 1);
    }

    #[tokio::test]
    async fn failed_handle_is_never_retried() {
        let hub = MemoryHub::new();
        let group_id = group();
        let broken = Arc::new(BrokenConnection {
            id: ConnectionId::new(),
            attempts: AtomicUsize::new(0),
        });
        let (live, mut live_rx) = ChannelConnection::new(8);

        hub.subscribe(&group_id, broken.clone()).await.unwrap();
        hub.subscribe(&group_id, live).await.unwrap();

        let first = hub.notify(&group_id).await;
        assert_eq!(first.delivered(), 1);
        hub.notify(&group_id).await;

        assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscriber_count(&group_id), 1);
        assert!(live_rx.try_recv().is_ok());
        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn full_buffer_counts_as_failure() {
        let hub = MemoryHub::new();
        let group_id = group();
        let (conn, _rx) = ChannelConnection::new(1);
        hub.subscribe(&group_id, conn).await.unwrap();

        assert_eq!(hub.notify(&group_id).await.delivered(), 1);
        let second = hub.notify(&group_id).await;
        assert_eq!(second.delivered(), 0);
        assert!(matches!(
            second.outcomes[0].1,
            DeliveryOutcome::Failed(_)
        ));
        assert_eq!(hub.subscriber_count(&group_id), 0);
    }

    #[tokio::test]
    async fn groups_are_isolated() {
        let hub = MemoryHub::new();
        let (a, b) = (group(), group());
        let (conn_a, mut rx_a) = ChannelConnection::new(8);
        let (conn_b, mut rx_b) = ChannelConnection::new(8);

        hub.subscribe(&a, conn_a).await.unwrap();
        hub.subscribe(&b, conn_b).await.unwrap();
        hub.notify(&b).await;

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().group_id, b);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_subscribe_and_notify() {
        let hub = Arc::new(MemoryHub::new());
        let group_id = group();

        let mut handles = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..32 {
            let (conn, rx) = ChannelConnection::new(128);
            receivers.push(rx);
            let hub = hub.clone();
            let group_id = group_id.clone();
            handles.push(tokio::spawn(async move {
                hub.subscribe(&group_id, conn).await.unwrap();
                hub.notify(&group_id).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(hub.subscriber_count(&group_id), 32);
        for rx in receivers.iter_mut() {
            assert!(rx.try_recv().is_ok(), "every subscriber sees its own notify");
        }
    }
}
