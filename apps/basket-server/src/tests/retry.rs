//! Store failure injection: only `remove_item` retries, and only on transient errors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use basket_events_memory::MemoryHub;
use basket_storage::*;
use uuid::Uuid;

use super::common::{drain, listen};
use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::server::BasketServer;

fn server_with(store: MockStore) -> BasketServer {
    BasketServer::new(
        Arc::new(store),
        Arc::new(MemoryHub::new()),
        ServerConfig::default(),
    )
}

fn ids() -> (GroupId, CartItemId) {
    (GroupId(Uuid::new_v4()), CartItemId(Uuid::new_v4()))
}

#[tokio::test]
async fn remove_item_retries_transient_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut store = MockStore::new();
    store
        .expect_delete_cart_item()
        .times(3)
        .returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Unavailable("pool timed out".into()))
            } else {
                Ok(1)
            }
        });

    let server = server_with(store);
    let (group_id, item_id) = ids();
    let (_id, mut rx) = listen(&server, &group_id).await;

    server.remove_item(&group_id, &item_id).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn remove_item_gives_up_after_three_attempts() {
    let mut store = MockStore::new();
    store
        .expect_delete_cart_item()
        .times(3)
        .returning(|_, _| Err(StoreError::Unavailable("connection reset".into())));

    let server = server_with(store);
    let (group_id, item_id) = ids();
    let (_id, mut rx) = listen(&server, &group_id).await;

    let err = server.remove_item(&group_id, &item_id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Storage(StoreError::Unavailable(_))
    ));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn remove_item_does_not_retry_permanent_failures() {
    let mut store = MockStore::new();
    store
        .expect_delete_cart_item()
        .times(1)
        .returning(|_, _| Err(StoreError::Backend("no such table".into())));

    let server = server_with(store);
    let (group_id, item_id) = ids();

    let err = server.remove_item(&group_id, &item_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Storage(StoreError::Backend(_))));
}

#[tokio::test]
async fn update_item_is_not_retried() {
    let mut store = MockStore::new();
    store
        .expect_update_cart_item()
        .times(1)
        .returning(|_, _, _| Err(StoreError::Unavailable("pool timed out".into())));

    let server = server_with(store);
    let (group_id, item_id) = ids();
    let patch = CartItemPatch {
        current: Some(1),
        ..Default::default()
    };

    let err = server
        .update_item(&group_id, &item_id, patch)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unavailable");
}

#[tokio::test]
async fn membership_lookup_failure_is_not_access_denied() {
    let mut store = MockStore::new();
    store
        .expect_get_membership()
        .returning(|_, _| Err(StoreError::Backend("disk I/O error".into())));

    let server = server_with(store);
    let (group_id, _) = ids();
    let err = server
        .assert_member(&group_id, &ProfileId(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Storage(_)));
}
