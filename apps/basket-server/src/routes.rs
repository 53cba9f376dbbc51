//! HTTP surface: JSON handlers over the membership manager and cart ledger.

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use basket_storage::{
    CartItem, CartItemId, CartItemPatch, GeoPoint, Group, GroupId, Invitation, InvitationId,
    LocationPatch, Membership, NewCartItem, ProfileId,
};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::realtime;
use crate::server::BasketServer;

/// Header carrying the authenticated profile id, set by the gateway in front of us.
pub const PROFILE_HEADER: &str = "x-profile-id";

pub fn router(server: BasketServer) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/groups", post(create_group).get(list_groups))
        .route("/groups/{group_id}", get(get_group))
        .route("/groups/{group_id}/members", get(list_members))
        .route("/groups/{group_id}/invitations", post(invite))
        .route("/invitations", get(list_invitations))
        .route("/invitations/{invitation_id}/accept", post(accept_invitation))
        .route("/invitations/{invitation_id}/reject", post(reject_invitation))
        .route("/groups/{group_id}/cart", get(list_items).post(add_item))
        .route(
            "/groups/{group_id}/cart/{item_id}",
            patch(update_item).delete(remove_item),
        )
        .route("/ws", get(realtime::ws_handler))
        .with_state(server)
}

async fn health_handler() -> &'static str {
    "ok"
}

// ────────────────────────────────────── Identity ──────────────────────────────────────

/// The calling profile
pub struct Caller(pub ProfileId);

pub struct Unauthenticated;

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "unauthenticated",
                "message": format!("missing or invalid {PROFILE_HEADER} header"),
            })),
        )
            .into_response()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PROFILE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(|id| Caller(ProfileId(id)))
            .ok_or(Unauthenticated)
    }
}

// ────────────────────────────────────── Groups ──────────────────────────────────────

#[derive(Deserialize)]
struct CreateGroupBody {
    name: String,
}

async fn create_group(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Json(body): Json<CreateGroupBody>,
) -> Result<(StatusCode, Json<Group>), ServiceError> {
    let group = server.create_group(&body.name, &caller).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn list_groups(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Group>>, ServiceError> {
    Ok(Json(server.list_groups(&caller).await?))
}

async fn get_group(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Group>, ServiceError> {
    Ok(Json(server.get_group(&GroupId(group_id), &caller).await?))
}

async fn list_members(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<Membership>>, ServiceError> {
    Ok(Json(server.list_members(&GroupId(group_id), &caller).await?))
}

// ────────────────────────────────────── Invitations ──────────────────────────────────────

#[derive(Deserialize)]
struct InviteBody {
    email: String,
}

async fn invite(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path(group_id): Path<Uuid>,
    Json(body): Json<InviteBody>,
) -> Result<(StatusCode, Json<Invitation>), ServiceError> {
    let invitation = server
        .invite(&GroupId(group_id), &caller, &body.email)
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

async fn list_invitations(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Invitation>>, ServiceError> {
    Ok(Json(server.list_invitations(&caller).await?))
}

async fn accept_invitation(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<Group>, ServiceError> {
    let group = server
        .accept_invitation(&InvitationId(invitation_id), &caller)
        .await?;
    Ok(Json(group))
}

async fn reject_invitation(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path(invitation_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    server
        .reject_invitation(&InvitationId(invitation_id), &caller)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────── Cart ──────────────────────────────────────

#[derive(Deserialize)]
struct AddItemBody {
    item_name: String,
    category: String,
    price: f64,
    quantity: i64,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
    #[serde(default)]
    location_name: Option<String>,
}

impl AddItemBody {
    fn into_new_item(self) -> Result<NewCartItem, ServiceError> {
        Ok(NewCartItem {
            location: GeoPoint::from_parts(self.lat, self.lng)?,
            item_name: self.item_name,
            category: self.category,
            price: self.price,
            quantity: self.quantity,
            location_name: self.location_name,
        })
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct UpdateItemBody {
    #[serde(default)]
    item_name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    quantity: Option<i64>,
    #[serde(default)]
    current: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    lat: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    lng: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    location_name: Option<Option<String>>,
}

impl UpdateItemBody {
    fn into_patch(self) -> Result<CartItemPatch, ServiceError> {
        Ok(CartItemPatch {
            location: LocationPatch::from_fields(self.lat, self.lng)?,
            item_name: self.item_name,
            category: self.category,
            price: self.price,
            quantity: self.quantity,
            current: self.current,
            location_name: self.location_name,
        })
    }
}

async fn list_items(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Vec<CartItem>>, ServiceError> {
    let group_id = GroupId(group_id);
    server.assert_member(&group_id, &caller).await?;
    Ok(Json(server.list_items(&group_id).await?))
}

async fn add_item(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path(group_id): Path<Uuid>,
    Json(body): Json<AddItemBody>,
) -> Result<(StatusCode, Json<CartItem>), ServiceError> {
    let group_id = GroupId(group_id);
    server.assert_member(&group_id, &caller).await?;
    let item = server.add_item(&group_id, body.into_new_item()?).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path((group_id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateItemBody>,
) -> Result<Json<CartItem>, ServiceError> {
    let group_id = GroupId(group_id);
    server.assert_member(&group_id, &caller).await?;
    let item = server
        .update_item(&group_id, &CartItemId(item_id), body.into_patch()?)
        .await?;
    Ok(Json(item))
}

async fn remove_item(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Path((group_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    let group_id = GroupId(group_id);
    server.assert_member(&group_id, &caller).await?;
    server.remove_item(&group_id, &CartItemId(item_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
