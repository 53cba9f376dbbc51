//! Notification hub abstraction for basket cart changes.
//!
//! This crate defines the [`NotificationHub`] trait so the fan-out backend can change without
//! touching the ledger or the transport:
//! - Memory (single server, in-process subscriber registry)
//! - A message bus for multi-process fan-out can implement the same trait
//!
//! Delivery is best-effort. A handle that is closed or refuses a message is dropped from the
//! registry during the same pass and never retried.

use async_trait::async_trait;
use basket_storage::GroupId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identity of one live connection. Handles are deduplicated on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of cart event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartEventKind {
    CartUpdated,
}

/// Event pushed to subscribers. Deliberately carries no diff: clients re-fetch the cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEvent {
    pub event: CartEventKind,
    pub group_id: GroupId,
}

impl CartEvent {
    pub fn cart_updated(group_id: GroupId) -> Self {
        Self {
            event: CartEventKind::CartUpdated,
            group_id,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why a single send did not go through
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,
    #[error("send failed: {0}")]
    Failed(String),
}

/// A live, bidirectional channel to one subscribed client.
///
/// `try_send` must not block: implementations queue the event and return immediately.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn is_open(&self) -> bool;

    fn try_send(&self, event: &CartEvent) -> Result<(), ConnectionError>;
}

/// Result of one delivery attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Closed,
    Failed(String),
}

impl DeliveryOutcome {
    /// Attempt delivery to one handle, folding every failure mode into an outcome.
    pub fn attempt(connection: &dyn Connection, event: &CartEvent) -> Self {
        if !connection.is_open() {
            return DeliveryOutcome::Closed;
        }
        match connection.try_send(event) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(ConnectionError::Closed) => DeliveryOutcome::Closed,
            Err(ConnectionError::Failed(reason)) => DeliveryOutcome::Failed(reason),
        }
    }

    /// Closed and failed handles leave the registry.
    pub fn should_prune(&self) -> bool {
        !matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Aggregated outcomes of one `notify` pass
#[derive(Clone, Debug, Default)]
pub struct NotifyReport {
    pub outcomes: Vec<(ConnectionId, DeliveryOutcome)>,
}

impl NotifyReport {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == DeliveryOutcome::Delivered)
            .count()
    }

    pub fn pruned(&self) -> impl Iterator<Item = &ConnectionId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.should_prune())
            .map(|(id, _)| id)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Error type for hub registry operations
#[derive(Debug, Error)]
pub enum HubError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Fan-out of cart change events to live connections, keyed by group.
///
/// Callers authorize a connection for a group before subscribing it; the hub trusts them.
#[async_trait]
pub trait NotificationHub: Send + Sync {
    /// Register a connection under a group. Subscribing the same connection twice is a no-op.
    async fn subscribe(
        &self,
        group_id: &GroupId,
        connection: Arc<dyn Connection>,
    ) -> Result<(), HubError>;

    /// Remove a connection from every group it is registered under. Unknown ids are ignored.
    async fn unsubscribe(&self, connection_id: &ConnectionId) -> Result<(), HubError>;

    /// Push a `cart_updated` event to every subscriber of the group.
    ///
    /// Never fails from the caller's point of view: per-handle problems are reported in
    /// the returned [`NotifyReport`] and the offending handles are pruned.
    async fn notify(&self, group_id: &GroupId) -> NotifyReport;

    /// Number of live registrations for a group. Diagnostics only.
    fn subscriber_count(&self, group_id: &GroupId) -> usize;
}
