use std::sync::Arc;

use basket_events::NotificationHub;
use basket_storage::Store;

use crate::config::ServerConfig;

/// Shared server state: the membership manager and cart ledger live as methods on this type
/// (see `membership.rs` and `ledger.rs`), the transport holds a clone per request.
#[derive(Clone)]
pub struct BasketServer {
    pub store: Arc<dyn Store>,
    pub hub: Arc<dyn NotificationHub>,
    pub config: ServerConfig,
}

impl BasketServer {
    pub fn new(store: Arc<dyn Store>, hub: Arc<dyn NotificationHub>, config: ServerConfig) -> Self {
        Self { store, hub, config }
    }
}
