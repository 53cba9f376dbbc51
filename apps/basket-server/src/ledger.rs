//! Cart ledger: item CRUD for a group plus change notification.
//!
//! Callers authorize first (`assert_member`); nothing here checks who is asking.

use std::time::Duration;

use basket_storage::{CartItem, CartItemId, CartItemPatch, GroupId, NewCartItem, StoreError};

use crate::error::ServiceError;
use crate::server::BasketServer;

/// Attempts for `remove_item` when the store reports a transient failure.
const REMOVE_ATTEMPTS: u32 = 3;
const REMOVE_BACKOFF: Duration = Duration::from_millis(25);

impl BasketServer {
    pub async fn list_items(&self, group_id: &GroupId) -> Result<Vec<CartItem>, ServiceError> {
        Ok(self.store.list_cart_items(group_id).await?)
    }

    /// Insert a new item with `current = 0`. Same-named items are separate rows.
    pub async fn add_item(
        &self,
        group_id: &GroupId,
        item: NewCartItem,
    ) -> Result<CartItem, ServiceError> {
        if item.item_name.trim().is_empty() {
            return Err(ServiceError::invalid("item name must not be empty"));
        }
        if item.quantity < 1 {
            return Err(ServiceError::invalid("quantity must be at least 1"));
        }
        check_price(item.price)?;
        if let Some(point) = &item.location {
            // Re-validate points built without GeoPoint::new.
            basket_storage::GeoPoint::new(point.lat, point.lng)?;
        }

        let created = self.store.insert_cart_item(group_id, &item).await?;
        tracing::info!(group_id = %group_id, item_id = %created.id, "cart item added");

        self.announce(group_id).await;
        Ok(created)
    }

    /// Delete an item. An id from another group (or already gone) is a silent no-op.
    pub async fn remove_item(
        &self,
        group_id: &GroupId,
        item_id: &CartItemId,
    ) -> Result<(), ServiceError> {
        let mut attempt = 1;
        let deleted = loop {
            match self.store.delete_cart_item(group_id, item_id).await {
                Ok(n) => break n,
                Err(e) if e.is_transient() && attempt < REMOVE_ATTEMPTS => {
                    tracing::warn!(
                        group_id = %group_id,
                        item_id = %item_id,
                        attempt,
                        error = %e,
                        "transient failure deleting cart item, retrying"
                    );
                    tokio::time::sleep(REMOVE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::info!(group_id = %group_id, item_id = %item_id, deleted, "cart item removed");
        self.announce(group_id).await;
        Ok(())
    }

    pub async fn update_item(
        &self,
        group_id: &GroupId,
        item_id: &CartItemId,
        patch: CartItemPatch,
    ) -> Result<CartItem, ServiceError> {
        if matches!(&patch.item_name, Some(name) if name.trim().is_empty()) {
            return Err(ServiceError::invalid("item name must not be empty"));
        }
        if let Some(price) = patch.price {
            check_price(price)?;
        }
        if matches!(patch.quantity, Some(q) if q < 0) {
            return Err(ServiceError::invalid("quantity must not be negative"));
        }
        if matches!(patch.current, Some(c) if c < 0) {
            return Err(ServiceError::invalid("current must not be negative"));
        }

        if patch.is_empty() {
            return self
                .store
                .get_cart_item(group_id, item_id)
                .await
                .map_err(|e| match e {
                    StoreError::NotFound => ServiceError::NotFound,
                    other => ServiceError::Storage(other),
                });
        }

        // The store applies the patch as one conditional UPDATE; Conflict means the
        // freshest row would have ended with current > quantity.
        let updated = self
            .store
            .update_cart_item(group_id, item_id, &patch)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::NotFound,
                StoreError::Conflict => ServiceError::invalid("current exceeds quantity"),
                other => ServiceError::Storage(other),
            })?;

        tracing::info!(
            group_id = %group_id,
            item_id = %item_id,
            quantity = updated.quantity,
            current = updated.current,
            "cart item updated"
        );
        self.announce(group_id).await;
        Ok(updated)
    }

    /// Fan out `cart_updated`. Delivery problems never reach the caller.
    async fn announce(&self, group_id: &GroupId) {
        let report = self.hub.notify(group_id).await;
        let pruned = report.pruned().count();
        if pruned > 0 {
            tracing::debug!(group_id = %group_id, pruned, "pruned dead subscribers");
        }
    }
}

fn check_price(price: f64) -> Result<(), ServiceError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ServiceError::invalid("price must be a non-negative number"));
    }
    Ok(())
}
