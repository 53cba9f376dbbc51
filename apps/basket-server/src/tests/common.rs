//! Common test helpers for server tests.

use std::sync::Arc;

use basket_events::{CartEvent, Connection, ConnectionId};
use basket_events_memory::{ChannelConnection, MemoryHub};
use basket_storage::*;
use basket_store_sqlite::SqliteStore;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::routes;
use crate::server::BasketServer;

/// Test helper: Create a BasketServer with in-memory SQLite and an in-process hub
pub async fn create_test_server() -> BasketServer {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let hub = Arc::new(MemoryHub::new());
    BasketServer::new(store, hub, ServerConfig::default())
}

/// Test helper: Register a profile and return its id
pub async fn create_profile(server: &BasketServer, email: &str) -> ProfileId {
    server
        .store
        .create_profile(&CreateProfileParams {
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
        })
        .await
        .unwrap()
        .id
}

/// Test helper: A group with an admin and one accepted member
pub async fn create_group_with_member(server: &BasketServer) -> (GroupId, ProfileId, ProfileId) {
    let admin = create_profile(server, "alice@example.com").await;
    let member = create_profile(server, "bob@example.com").await;
    let group = server.create_group("Groceries", &admin).await.unwrap();
    let invitation = server
        .invite(&group.id, &admin, "bob@example.com")
        .await
        .unwrap();
    server
        .accept_invitation(&invitation.id, &member)
        .await
        .unwrap();
    (group.id, admin, member)
}

pub fn milk() -> NewCartItem {
    NewCartItem {
        item_name: "Milk".to_string(),
        category: "dairy".to_string(),
        price: 3.0,
        quantity: 2,
        location: None,
        location_name: None,
    }
}

/// Test helper: Subscribe a channel-backed connection to a group
pub async fn listen(
    server: &BasketServer,
    group_id: &GroupId,
) -> (ConnectionId, mpsc::Receiver<CartEvent>) {
    let (conn, rx) = ChannelConnection::new(16);
    let id = conn.id();
    server.hub.subscribe(group_id, conn).await.unwrap();
    (id, rx)
}

/// Drain everything currently queued on a receiver.
pub fn drain(rx: &mut mpsc::Receiver<CartEvent>) -> Vec<CartEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Test helper: Serve the router on an ephemeral port, returning `http://<addr>`
pub async fn spawn_app(server: BasketServer) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, routes::router(server)).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Test helper: Wait until the hub holds `expected` registrations for a group
pub async fn wait_for_subscribers(server: &BasketServer, group_id: &GroupId, expected: usize) {
    for _ in 0..200 {
        if server.hub.subscriber_count(group_id) == expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} subscribers, found {}",
        server.hub.subscriber_count(group_id)
    );
}
