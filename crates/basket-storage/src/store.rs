//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait the server depends on.
///
/// Methods that touch more than one row (group creation, invitation acceptance) are atomic:
/// backends run them inside a single transaction so readers never see half of the change.
/// Cart item methods are **scoped by group**.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Profiles ───────────────────────────────────────

    /// Create a profile. Fails with `AlreadyExists` when the email is taken.
    async fn create_profile(&self, params: &CreateProfileParams) -> Result<Profile, StoreError>;

    /// Get profile by ID.
    async fn get_profile(&self, profile_id: &ProfileId) -> Result<Profile, StoreError>;

    /// Get profile by email.
    async fn get_profile_by_email(&self, email: &str) -> Result<Profile, StoreError>;

    // ───────────────────────────────────── Groups ─────────────────────────────────────────

    /// Atomically create a group (member count 1) and the creator's admin membership.
    async fn create_group_with_admin(
        &self,
        params: &CreateGroupParams,
    ) -> Result<Group, StoreError>;

    /// Get group by ID.
    async fn get_group(&self, group_id: &GroupId) -> Result<Group, StoreError>;

    /// List all groups the profile is a member of.
    async fn list_profile_groups(&self, profile_id: &ProfileId) -> Result<Vec<Group>, StoreError>;

    // ───────────────────────────────────── Memberships ────────────────────────────────────

    /// Get the membership of a profile in a group.
    async fn get_membership(
        &self,
        group_id: &GroupId,
        profile_id: &ProfileId,
    ) -> Result<Membership, StoreError>;

    /// List all memberships of a group.
    async fn list_memberships(&self, group_id: &GroupId) -> Result<Vec<Membership>, StoreError>;

    // ───────────────────────────────────── Invitations ────────────────────────────────────

    /// Create a pending invitation. Fails with `AlreadyExists` if one is already pending
    /// for the same (group, invited profile) pair.
    async fn create_invitation(
        &self,
        params: &CreateInvitationParams,
    ) -> Result<Invitation, StoreError>;

    /// Get invitation by ID.
    async fn get_invitation(&self, invitation_id: &InvitationId)
        -> Result<Invitation, StoreError>;

    /// Get the pending invitation for a (group, invited profile) pair, if any.
    async fn find_pending_invitation(
        &self,
        group_id: &GroupId,
        invited_profile_id: &ProfileId,
    ) -> Result<Option<Invitation>, StoreError>;

    /// List pending invitations addressed to a profile.
    async fn list_pending_invitations(
        &self,
        invited_profile_id: &ProfileId,
    ) -> Result<Vec<Invitation>, StoreError>;

    /// Atomically accept a pending invitation: insert a member membership, bump the
    /// group's member count, and mark the invitation accepted.
    /// Fails with `Conflict` if the invitation is no longer pending.
    async fn accept_invitation(&self, invitation_id: &InvitationId) -> Result<Group, StoreError>;

    /// Mark a pending invitation rejected. Fails with `Conflict` if it is no longer pending.
    async fn reject_invitation(&self, invitation_id: &InvitationId) -> Result<(), StoreError>;

    // ───────────────────────────────────── Cart ───────────────────────────────────────────

    /// List all cart items of a group.
    async fn list_cart_items(&self, group_id: &GroupId) -> Result<Vec<CartItem>, StoreError>;

    /// Get a single cart item scoped to its group.
    async fn get_cart_item(
        &self,
        group_id: &GroupId,
        item_id: &CartItemId,
    ) -> Result<CartItem, StoreError>;

    /// Insert a cart item with `current = 0`.
    async fn insert_cart_item(
        &self,
        group_id: &GroupId,
        item: &NewCartItem,
    ) -> Result<CartItem, StoreError>;

    /// Apply a partial update as one conditional write.
    ///
    /// The `current <= quantity` check is evaluated against the committed row inside the
    /// UPDATE itself. Returns `NotFound` if no row matches (group, item) and `Conflict` if
    /// the row exists but the write would break the invariant.
    async fn update_cart_item(
        &self,
        group_id: &GroupId,
        item_id: &CartItemId,
        patch: &CartItemPatch,
    ) -> Result<CartItem, StoreError>;

    /// Delete a cart item scoped to its group. Returns the number of rows deleted
    /// (0 when the item does not exist in that group).
    async fn delete_cart_item(
        &self,
        group_id: &GroupId,
        item_id: &CartItemId,
    ) -> Result<u64, StoreError>;
}
