//! Cart item types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CartItemId, GeoPoint, GroupId, LocationPatch};

/// Cart item record. Invariant: `current <= quantity`.
#[derive(Clone, Debug, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub group_id: GroupId,
    pub item_name: String,
    pub category: String,
    pub price: f64,
    pub quantity: i64,
    pub current: i64,
    pub location: Option<GeoPoint>,
    pub location_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for inserting a cart item (`current` always starts at 0)
#[derive(Clone, Debug)]
pub struct NewCartItem {
    pub item_name: String,
    pub category: String,
    pub price: f64,
    pub quantity: i64,
    pub location: Option<GeoPoint>,
    pub location_name: Option<String>,
}

/// Partial update of a cart item. `None` leaves the column untouched.
#[derive(Clone, Debug, Default)]
pub struct CartItemPatch {
    pub item_name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub current: Option<i64>,
    pub location: Option<LocationPatch>,
    /// `Some(None)` clears the place name.
    pub location_name: Option<Option<String>>,
}

impl CartItemPatch {
    /// Whether the patch writes either side of the `current <= quantity` invariant.
    pub fn touches_counts(&self) -> bool {
        self.quantity.is_some() || self.current.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.item_name.is_none()
            && self.category.is_none()
            && self.price.is_none()
            && !self.touches_counts()
            && self.location.is_none()
            && self.location_name.is_none()
    }
}
