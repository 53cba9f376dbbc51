use basket_storage::{
    CartItem, CartItemId, CartItemPatch, CreateGroupParams, CreateInvitationParams,
    CreateProfileParams, GeoPoint, Group, GroupId, Invitation, InvitationId, InvitationStatus,
    LocationPatch, MemberRole, Membership, NewCartItem, Profile, ProfileId, Store, StoreError,
};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgExecutor, PgPool};
use uuid::Uuid;


static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const GROUP_COLUMNS: &str = "id, name, total_members, created_at, updated_at";
const INVITATION_COLUMNS: &str =
    "id, group_id, invited_profile_id, invited_by_profile_id, status, created_at, updated_at";
// PostGIS stores (x, y) = (lng, lat).
const CART_ITEM_COLUMNS: &str = "id, group_id, item_name, category, price, quantity, \"current\", \
     ST_Y(location) AS location_lat, ST_X(location) AS location_lng, location_name, \
     created_at, updated_at";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(map_sqlx_error)?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::AlreadyExists,
        sqlx::Error::Database(ref db) if db.is_check_violation() => StoreError::Conflict,
        other => StoreError::Backend(other.to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: ProfileId(row.id),
            email: row.email,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    name: String,
    total_members: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: GroupId(row.id),
            name: row.name,
            total_members: row.total_members,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    group_id: Uuid,
    profile_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            group_id: GroupId(row.group_id),
            profile_id: ProfileId(row.profile_id),
            role: row
                .role
                .parse::<MemberRole>()
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InvitationRow {
    id: Uuid,
    group_id: Uuid,
    invited_profile_id: Uuid,
    invited_by_profile_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = StoreError;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        Ok(Invitation {
            id: InvitationId(row.id),
            group_id: GroupId(row.group_id),
            invited_profile_id: ProfileId(row.invited_profile_id),
            invited_by_profile_id: ProfileId(row.invited_by_profile_id),
            status: row
                .status
                .parse::<InvitationStatus>()
                .map_err(|e| StoreError::Backend(e.to_string()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: Uuid,
    group_id: Uuid,
    item_name: String,
    category: String,
    price: f64,
    quantity: i64,
    current: i64,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
    location_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = StoreError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let location = GeoPoint::from_parts(row.location_lat, row.location_lng)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(CartItem {
            id: CartItemId(row.id),
            group_id: GroupId(row.group_id),
            item_name: row.item_name,
            category: row.category,
            price: row.price,
            quantity: row.quantity,
            current: row.current,
            location,
            location_name: row.location_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

async fn fetch_group<'e, E: PgExecutor<'e>>(
    exec: E,
    group_id: &GroupId,
) -> Result<Group, StoreError> {
    sqlx::query_as::<_, GroupRow>(&format!(
        "SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1"
    ))
    .bind(group_id.0)
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx_error)?
    .map(Group::from)
    .ok_or(StoreError::NotFound)
}

async fn fetch_invitation<'e, E: PgExecutor<'e>>(
    exec: E,
    invitation_id: &InvitationId,
    for_update: bool,
) -> Result<Invitation, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    sqlx::query_as::<_, InvitationRow>(&format!(
        "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = $1{lock}"
    ))
    .bind(invitation_id.0)
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound)?
    .try_into()
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    // ───────────────────────────── Profiles ─────────────────────────────

    async fn create_profile(&self, params: &CreateProfileParams) -> Result<Profile, StoreError> {
        sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO profiles(id, email, name) VALUES($1, $2, $3)
             RETURNING id, email, name, created_at, updated_at",
        )
        .bind(Uuid::now_v7())
        .bind(&params.email)
        .bind(&params.name)
        .fetch_one(&self.pool)
        .await
        .map(Profile::from)
        .map_err(map_sqlx_error)
    }

    async fn get_profile(&self, profile_id: &ProfileId) -> Result<Profile, StoreError> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, name, created_at, updated_at FROM profiles WHERE id = $1",
        )
        .bind(profile_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(Profile::from)
        .ok_or(StoreError::NotFound)
    }

    async fn get_profile_by_email(&self, email: &str) -> Result<Profile, StoreError> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, name, created_at, updated_at FROM profiles WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(Profile::from)
        .ok_or(StoreError::NotFound)
    }

    // ───────────────────────────── Groups ─────────────────────────────

    async fn create_group_with_admin(
        &self,
        params: &CreateGroupParams,
    ) -> Result<Group, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let group: Group = sqlx::query_as::<_, GroupRow>(&format!(
            "INSERT INTO groups(id, name, total_members) VALUES($1, $2, 1) RETURNING {GROUP_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(&params.name)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .into();

        sqlx::query("INSERT INTO group_members(group_id, profile_id, role) VALUES($1, $2, $3)")
            .bind(group.id.0)
            .bind(params.creator.0)
            .bind(MemberRole::Admin.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(group)
    }

    async fn get_group(&self, group_id: &GroupId) -> Result<Group, StoreError> {
        fetch_group(&self.pool, group_id).await
    }

    async fn list_profile_groups(&self, profile_id: &ProfileId) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT g.id, g.name, g.total_members, g.created_at, g.updated_at
             FROM groups g
             INNER JOIN group_members gm ON g.id = gm.group_id
             WHERE gm.profile_id = $1
             ORDER BY g.name",
        )
        .bind(profile_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Group::from).collect())
    }

    // ───────────────────────────── Memberships ─────────────────────────────

    async fn get_membership(
        &self,
        group_id: &GroupId,
        profile_id: &ProfileId,
    ) -> Result<Membership, StoreError> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT group_id, profile_id, role, created_at FROM group_members
             WHERE group_id = $1 AND profile_id = $2",
        )
        .bind(group_id.0)
        .bind(profile_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(StoreError::NotFound)?
        .try_into()
    }

    async fn list_memberships(&self, group_id: &GroupId) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT group_id, profile_id, role, created_at FROM group_members
             WHERE group_id = $1 ORDER BY created_at",
        )
        .bind(group_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(Membership::try_from).collect()
    }

    // ───────────────────────────── Invitations ─────────────────────────────

    async fn create_invitation(
        &self,
        params: &CreateInvitationParams,
    ) -> Result<Invitation, StoreError> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "INSERT INTO invitations(id, group_id, invited_profile_id, invited_by_profile_id, status)
             VALUES($1, $2, $3, $4, $5)
             RETURNING {INVITATION_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(params.group_id.0)
        .bind(params.invited_profile_id.0)
        .bind(params.invited_by_profile_id.0)
        .bind(InvitationStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .try_into()
    }

    async fn get_invitation(
        &self,
        invitation_id: &InvitationId,
    ) -> Result<Invitation, StoreError> {
        fetch_invitation(&self.pool, invitation_id, false).await
    }

    async fn find_pending_invitation(
        &self,
        group_id: &GroupId,
        invited_profile_id: &ProfileId,
    ) -> Result<Option<Invitation>, StoreError> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations
             WHERE group_id = $1 AND invited_profile_id = $2 AND status = 'pending'"
        ))
        .bind(group_id.0)
        .bind(invited_profile_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .map(Invitation::try_from)
        .transpose()
    }

    async fn list_pending_invitations(
        &self,
        invited_profile_id: &ProfileId,
    ) -> Result<Vec<Invitation>, StoreError> {
        let rows = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations
             WHERE invited_profile_id = $1 AND status = 'pending'
             ORDER BY created_at"
        ))
        .bind(invited_profile_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(Invitation::try_from).collect()
    }

    async fn accept_invitation(&self, invitation_id: &InvitationId) -> Result<Group, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Row lock serializes racing accept/reject calls on the same invitation.
        let invitation = fetch_invitation(&mut *tx, invitation_id, true).await?;
        if invitation.status.is_terminal() {
            return Err(StoreError::Conflict);
        }

        sqlx::query("INSERT INTO group_members(group_id, profile_id, role) VALUES($1, $2, $3)")
            .bind(invitation.group_id.0)
            .bind(invitation.invited_profile_id.0)
            .bind(MemberRole::Member.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let group: Group = sqlx::query_as::<_, GroupRow>(&format!(
            "UPDATE groups SET total_members = total_members + 1, updated_at = NOW()
             WHERE id = $1 RETURNING {GROUP_COLUMNS}"
        ))
        .bind(invitation.group_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .map(Group::from)
        .ok_or(StoreError::NotFound)?;

        sqlx::query("UPDATE invitations SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(InvitationStatus::Accepted.as_str())
            .bind(invitation_id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(group)
    }

    async fn reject_invitation(&self, invitation_id: &InvitationId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE invitations SET status = $1, updated_at = NOW()
             WHERE id = $2 AND status = 'pending'",
        )
        .bind(InvitationStatus::Rejected.as_str())
        .bind(invitation_id.0)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            fetch_invitation(&self.pool, invitation_id, false).await?;
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    // ───────────────────────────── Cart ─────────────────────────────

    async fn list_cart_items(&self, group_id: &GroupId) -> Result<Vec<CartItem>, StoreError> {
        let rows = sqlx::query_as::<_, CartItemRow>(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE group_id = $1 ORDER BY created_at"
        ))
        .bind(group_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(CartItem::try_from).collect()
    }

    async fn get_cart_item(
        &self,
        group_id: &GroupId,
        item_id: &CartItemId,
    ) -> Result<CartItem, StoreError> {
        sqlx::query_as::<_, CartItemRow>(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE id = $1 AND group_id = $2"
        ))
        .bind(item_id.0)
        .bind(group_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(StoreError::NotFound)?
        .try_into()
    }

    async fn insert_cart_item(
        &self,
        group_id: &GroupId,
        item: &NewCartItem,
    ) -> Result<CartItem, StoreError> {
        sqlx::query_as::<_, CartItemRow>(&format!(
            "INSERT INTO cart_items(id, group_id, item_name, category, price, quantity, \"current\",
                                    location, location_name)
             VALUES($1, $2, $3, $4, $5, $6, 0,
                    ST_SetSRID(ST_MakePoint($7, $8), 4326), $9)
             RETURNING {CART_ITEM_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(group_id.0)
        .bind(&item.item_name)
        .bind(&item.category)
        .bind(item.price)
        .bind(item.quantity)
        .bind(item.location.map(|p| p.lng))
        .bind(item.location.map(|p| p.lat))
        .bind(&item.location_name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .try_into()
    }

    async fn update_cart_item(
        &self,
        group_id: &GroupId,
        item_id: &CartItemId,
        patch: &CartItemPatch,
    ) -> Result<CartItem, StoreError> {
        let (set_location, point) = match patch.location {
            Some(LocationPatch::Set(point)) => (true, Some(point)),
            Some(LocationPatch::Clear) => (true, None),
            None => (false, None),
        };
        let (set_location_name, location_name) = match &patch.location_name {
            Some(name) => (true, name.clone()),
            None => (false, None),
        };

        // Under READ COMMITTED the WHERE clause is re-evaluated against the newest row
        // version after any concurrent writer commits, which makes this a compare-and-set.
        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            "UPDATE cart_items SET
                 item_name = COALESCE($1, item_name),
                 category = COALESCE($2, category),
                 price = COALESCE($3, price),
                 quantity = COALESCE($4, quantity),
                 \"current\" = COALESCE($5, \"current\"),
                 location = CASE WHEN $6 THEN ST_SetSRID(ST_MakePoint($7, $8), 4326) ELSE location END,
                 location_name = CASE WHEN $9 THEN $10 ELSE location_name END,
                 updated_at = NOW()
             WHERE id = $11 AND group_id = $12
               AND COALESCE($5, \"current\") <= COALESCE($4, quantity)
             RETURNING {CART_ITEM_COLUMNS}"
        ))
        .bind(&patch.item_name)
        .bind(&patch.category)
        .bind(patch.price)
        .bind(patch.quantity)
        .bind(patch.current)
        .bind(set_location)
        .bind(point.map(|p| p.lng))
        .bind(point.map(|p| p.lat))
        .bind(set_location_name)
        .bind(location_name)
        .bind(item_id.0)
        .bind(group_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.try_into(),
            None => {
                self.get_cart_item(group_id, item_id).await?;
                Err(StoreError::Conflict)
            }
        }
    }

    async fn delete_cart_item(
        &self,
        group_id: &GroupId,
        item_id: &CartItemId,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND group_id = $2")
            .bind(item_id.0)
            .bind(group_id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
