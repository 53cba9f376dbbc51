use basket_storage::{
    CartItem, CartItemId, CartItemPatch, CreateGroupParams, CreateInvitationParams,
    CreateProfileParams, GeoPoint, Group, GroupId, Invitation, InvitationId, InvitationStatus,
    LocationPatch, MemberRole, Membership, NewCartItem, Profile, ProfileId, Store, StoreError,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const GROUP_COLUMNS: &str = "id, name, total_members, created_at, updated_at";
const INVITATION_COLUMNS: &str =
    "id, group_id, invited_profile_id, invited_by_profile_id, status, created_at, updated_at";
const CART_ITEM_COLUMNS: &str = "id, group_id, item_name, category, price, quantity, \"current\", \
     location, location_name, created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        // Every connection to :memory: is a separate database, so pin the pool to one
        // connection that never gets recycled.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(map_sqlx_error)?;
        Self::migrate(pool).await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(map_sqlx_error)?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, StoreError> {
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

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(s).map_err(|e| StoreError::Backend(e.to_string()))
}

// ───────────────────────────── Row mapping ─────────────────────────────

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: String,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Profile {
            id: ProfileId(parse_uuid(&row.id)?),
            email: row.email,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    total_members: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = StoreError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Group {
            id: GroupId(parse_uuid(&row.id)?),
            name: row.name,
            total_members: row.total_members,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    group_id: String,
    profile_id: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            group_id: GroupId(parse_uuid(&row.group_id)?),
            profile_id: ProfileId(parse_uuid(&row.profile_id)?),
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
    id: String,
    group_id: String,
    invited_profile_id: String,
    invited_by_profile_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = StoreError;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        Ok(Invitation {
            id: InvitationId(parse_uuid(&row.id)?),
            group_id: GroupId(parse_uuid(&row.group_id)?),
            invited_profile_id: ProfileId(parse_uuid(&row.invited_profile_id)?),
            invited_by_profile_id: ProfileId(parse_uuid(&row.invited_by_profile_id)?),
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
    id: String,
    group_id: String,
    item_name: String,
    category: String,
    price: f64,
    quantity: i64,
    current: i64,
    location: Option<String>,
    location_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = StoreError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        let location = row
            .location
            .as_deref()
            .map(GeoPoint::from_wkt)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(CartItem {
            id: CartItemId(parse_uuid(&row.id)?),
            group_id: GroupId(parse_uuid(&row.group_id)?),
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

async fn fetch_group<'e, E: SqliteExecutor<'e>>(
    exec: E,
    group_id: &GroupId,
) -> Result<Group, StoreError> {
    let row = sqlx::query_as::<_, GroupRow>(&format!(
        "SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?"
    ))
    .bind(group_id.0.to_string())
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound)?;
    row.try_into()
}

async fn fetch_invitation<'e, E: SqliteExecutor<'e>>(
    exec: E,
    invitation_id: &InvitationId,
) -> Result<Invitation, StoreError> {
    let row = sqlx::query_as::<_, InvitationRow>(&format!(
        "SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = ?"
    ))
    .bind(invitation_id.0.to_string())
    .fetch_optional(exec)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(StoreError::NotFound)?;
    row.try_into()
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Profiles ─────────────────────────────

    async fn create_profile(&self, params: &CreateProfileParams) -> Result<Profile, StoreError> {
        let now = Utc::now();
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO profiles(id, email, name, created_at, updated_at) VALUES(?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&params.email)
        .bind(&params.name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Profile {
            id: ProfileId(id),
            email: params.email.clone(),
            name: params.name.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_profile(&self, profile_id: &ProfileId) -> Result<Profile, StoreError> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, name, created_at, updated_at FROM profiles WHERE id = ?",
        )
        .bind(profile_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(StoreError::NotFound)?
        .try_into()
    }

    async fn get_profile_by_email(&self, email: &str) -> Result<Profile, StoreError> {
        sqlx::query_as::<_, ProfileRow>(
            "SELECT id, email, name, created_at, updated_at FROM profiles WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(StoreError::NotFound)?
        .try_into()
    }

    // ───────────────────────────── Groups ─────────────────────────────

    async fn create_group_with_admin(
        &self,
        params: &CreateGroupParams,
    ) -> Result<Group, StoreError> {
        let now = Utc::now();
        let group_id = Uuid::now_v7();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO groups(id, name, total_members, created_at, updated_at) VALUES(?, ?, 1, ?, ?)",
        )
        .bind(group_id.to_string())
        .bind(&params.name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO group_members(group_id, profile_id, role, created_at) VALUES(?, ?, ?, ?)",
        )
        .bind(group_id.to_string())
        .bind(params.creator.0.to_string())
        .bind(MemberRole::Admin.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(Group {
            id: GroupId(group_id),
            name: params.name.clone(),
            total_members: 1,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_group(&self, group_id: &GroupId) -> Result<Group, StoreError> {
        fetch_group(&self.pool, group_id).await
    }

    async fn list_profile_groups(&self, profile_id: &ProfileId) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT g.id, g.name, g.total_members, g.created_at, g.updated_at
             FROM groups g
             INNER JOIN group_members gm ON g.id = gm.group_id
             WHERE gm.profile_id = ?
             ORDER BY g.name",
        )
        .bind(profile_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(Group::try_from).collect()
    }

    // ───────────────────────────── Memberships ─────────────────────────────

    async fn get_membership(
        &self,
        group_id: &GroupId,
        profile_id: &ProfileId,
    ) -> Result<Membership, StoreError> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT group_id, profile_id, role, created_at FROM group_members
             WHERE group_id = ? AND profile_id = ?",
        )
        .bind(group_id.0.to_string())
        .bind(profile_id.0.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(StoreError::NotFound)?
        .try_into()
    }

    async fn list_memberships(&self, group_id: &GroupId) -> Result<Vec<Membership>, StoreError> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            "SELECT group_id, profile_id, role, created_at FROM group_members
             WHERE group_id = ? ORDER BY created_at",
        )
        .bind(group_id.0.to_string())
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
        let now = Utc::now();
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO invitations(id, group_id, invited_profile_id, invited_by_profile_id, status, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(params.group_id.0.to_string())
        .bind(params.invited_profile_id.0.to_string())
        .bind(params.invited_by_profile_id.0.to_string())
        .bind(InvitationStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(Invitation {
            id: InvitationId(id),
            group_id: params.group_id.clone(),
            invited_profile_id: params.invited_profile_id.clone(),
            invited_by_profile_id: params.invited_by_profile_id.clone(),
            status: InvitationStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_invitation(
        &self,
        invitation_id: &InvitationId,
    ) -> Result<Invitation, StoreError> {
        fetch_invitation(&self.pool, invitation_id).await
    }

    async fn find_pending_invitation(
        &self,
        group_id: &GroupId,
        invited_profile_id: &ProfileId,
    ) -> Result<Option<Invitation>, StoreError> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations
             WHERE group_id = ? AND invited_profile_id = ? AND status = 'pending'"
        ))
        .bind(group_id.0.to_string())
        .bind(invited_profile_id.0.to_string())
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
             WHERE invited_profile_id = ? AND status = 'pending'
             ORDER BY created_at"
        ))
        .bind(invited_profile_id.0.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(Invitation::try_from).collect()
    }

    async fn accept_invitation(&self, invitation_id: &InvitationId) -> Result<Group, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let invitation = fetch_invitation(&mut *tx, invitation_id).await?;

        // Claim the invitation first; a second accept/reject sees zero rows.
        let claimed = sqlx::query(
            "UPDATE invitations SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(InvitationStatus::Accepted.as_str())
        .bind(now)
        .bind(invitation_id.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if claimed.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }

        sqlx::query(
            "INSERT INTO group_members(group_id, profile_id, role, created_at) VALUES(?, ?, ?, ?)",
        )
        .bind(invitation.group_id.0.to_string())
        .bind(invitation.invited_profile_id.0.to_string())
        .bind(MemberRole::Member.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            "UPDATE groups SET total_members = total_members + 1, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(invitation.group_id.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let group = fetch_group(&mut *tx, &invitation.group_id).await?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(group)
    }

    async fn reject_invitation(&self, invitation_id: &InvitationId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE invitations SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(InvitationStatus::Rejected.as_str())
        .bind(Utc::now())
        .bind(invitation_id.0.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Distinguish a missing invitation from one that was already processed.
            fetch_invitation(&self.pool, invitation_id).await?;
            return Err(StoreError::Conflict);
        }
        Ok(())
    }

    // ───────────────────────────── Cart ─────────────────────────────

    async fn list_cart_items(&self, group_id: &GroupId) -> Result<Vec<CartItem>, StoreError> {
        let rows = sqlx::query_as::<_, CartItemRow>(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE group_id = ? ORDER BY created_at"
        ))
        .bind(group_id.0.to_string())
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
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE id = ? AND group_id = ?"
        ))
        .bind(item_id.0.to_string())
        .bind(group_id.0.to_string())
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
        let now = Utc::now();
        sqlx::query_as::<_, CartItemRow>(&format!(
            "INSERT INTO cart_items(id, group_id, item_name, category, price, quantity, \"current\",
                                    location, location_name, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
             RETURNING {CART_ITEM_COLUMNS}"
        ))
        .bind(Uuid::now_v7().to_string())
        .bind(group_id.0.to_string())
        .bind(&item.item_name)
        .bind(&item.category)
        .bind(item.price)
        .bind(item.quantity)
        .bind(item.location.as_ref().map(GeoPoint::to_wkt))
        .bind(&item.location_name)
        .bind(now)
        .bind(now)
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
        let (set_location, location) = match patch.location {
            Some(LocationPatch::Set(point)) => (true, Some(point.to_wkt())),
            Some(LocationPatch::Clear) => (true, None),
            None => (false, None),
        };
        let (set_location_name, location_name) = match &patch.location_name {
            Some(name) => (true, name.clone()),
            None => (false, None),
        };

        // The invariant guard lives in the WHERE clause so the check and the write are one
        // statement against the committed row.
        let row = sqlx::query_as::<_, CartItemRow>(&format!(
            "UPDATE cart_items SET
                 item_name = COALESCE(?, item_name),
                 category = COALESCE(?, category),
                 price = COALESCE(?, price),
                 quantity = COALESCE(?, quantity),
                 \"current\" = COALESCE(?, \"current\"),
                 location = CASE WHEN ? THEN ? ELSE location END,
                 location_name = CASE WHEN ? THEN ? ELSE location_name END,
                 updated_at = ?
             WHERE id = ? AND group_id = ?
               AND COALESCE(?, \"current\") <= COALESCE(?, quantity)
             RETURNING {CART_ITEM_COLUMNS}"
        ))
        .bind(&patch.item_name)
        .bind(&patch.category)
        .bind(patch.price)
        .bind(patch.quantity)
        .bind(patch.current)
        .bind(set_location)
        .bind(location)
        .bind(set_location_name)
        .bind(location_name)
        .bind(Utc::now())
        .bind(item_id.0.to_string())
        .bind(group_id.0.to_string())
        .bind(patch.current)
        .bind(patch.quantity)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => row.try_into(),
            None => {
                // Either the row is gone or the guard refused the write.
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
        let result = sqlx::query("DELETE FROM cart_items WHERE id = ? AND group_id = ?")
            .bind(item_id.0.to_string())
            .bind(group_id.0.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
