//! Groups, memberships and invitations.
//!
//! Every read is gated on membership; inviting is gated on the admin role. Multi-row writes
//! (group plus admin membership, accepting an invitation) are single store calls that own
//! their transaction.

use basket_storage::{
    CreateGroupParams, CreateInvitationParams, Group, GroupId, Invitation, InvitationId,
    InvitationStatus, MemberRole, Membership, ProfileId, StoreError,
};

use crate::error::ServiceError;
use crate::server::BasketServer;

impl BasketServer {
    /// Membership of `profile_id` in `group_id`, or `AccessDenied`.
    ///
    /// A group that does not exist is indistinguishable from one the caller is not in.
    pub async fn assert_member(
        &self,
        group_id: &GroupId,
        profile_id: &ProfileId,
    ) -> Result<Membership, ServiceError> {
        self.store
            .get_membership(group_id, profile_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::AccessDenied,
                other => ServiceError::Storage(other),
            })
    }

    pub async fn create_group(
        &self,
        name: &str,
        creator: &ProfileId,
    ) -> Result<Group, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::invalid("group name must not be empty"));
        }
        if name.chars().count() > self.config.max_group_name {
            return Err(ServiceError::invalid(format!(
                "group name must be at most {} characters",
                self.config.max_group_name
            )));
        }

        let group = self
            .store
            .create_group_with_admin(&CreateGroupParams {
                name: name.to_string(),
                creator: creator.clone(),
            })
            .await?;

        tracing::info!(group_id = %group.id, creator = %creator, "group created");
        Ok(group)
    }

    pub async fn list_groups(&self, profile_id: &ProfileId) -> Result<Vec<Group>, ServiceError> {
        Ok(self.store.list_profile_groups(profile_id).await?)
    }

    pub async fn get_group(
        &self,
        group_id: &GroupId,
        profile_id: &ProfileId,
    ) -> Result<Group, ServiceError> {
        self.assert_member(group_id, profile_id).await?;
        self.store.get_group(group_id).await.map_err(not_found)
    }

    pub async fn list_members(
        &self,
        group_id: &GroupId,
        profile_id: &ProfileId,
    ) -> Result<Vec<Membership>, ServiceError> {
        self.assert_member(group_id, profile_id).await?;
        Ok(self.store.list_memberships(group_id).await?)
    }

    pub async fn invite(
        &self,
        group_id: &GroupId,
        inviter: &ProfileId,
        invitee_email: &str,
    ) -> Result<Invitation, ServiceError> {
        let membership = self
            .store
            .get_membership(group_id, inviter)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::NotAdmin,
                other => ServiceError::Storage(other),
            })?;
        if membership.role != MemberRole::Admin {
            return Err(ServiceError::NotAdmin);
        }

        let invitee = self
            .store
            .get_profile_by_email(invitee_email.trim())
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::UnknownUser,
                other => ServiceError::Storage(other),
            })?;

        match self.store.get_membership(group_id, &invitee.id).await {
            Ok(_) => return Err(ServiceError::AlreadyMember),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        if self
            .store
            .find_pending_invitation(group_id, &invitee.id)
            .await?
            .is_some()
        {
            return Err(ServiceError::InvitationPending);
        }

        // The partial unique index settles races between the check above and this insert.
        let invitation = self
            .store
            .create_invitation(&CreateInvitationParams {
                group_id: group_id.clone(),
                invited_profile_id: invitee.id.clone(),
                invited_by_profile_id: inviter.clone(),
            })
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists => ServiceError::InvitationPending,
                other => ServiceError::Storage(other),
            })?;

        tracing::info!(
            group_id = %group_id,
            invitation_id = %invitation.id,
            inviter = %inviter,
            invitee = %invitee.id,
            "invitation created"
        );
        Ok(invitation)
    }

    pub async fn list_invitations(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Vec<Invitation>, ServiceError> {
        Ok(self.store.list_pending_invitations(profile_id).await?)
    }

    pub async fn accept_invitation(
        &self,
        invitation_id: &InvitationId,
        profile_id: &ProfileId,
    ) -> Result<Group, ServiceError> {
        self.pending_invitation_for(invitation_id, profile_id).await?;

        let group = self
            .store
            .accept_invitation(invitation_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::NotFound,
                // Lost a race with a concurrent accept/reject.
                StoreError::Conflict => ServiceError::AlreadyProcessed,
                StoreError::AlreadyExists => ServiceError::AlreadyMember,
                other => ServiceError::Storage(other),
            })?;

        tracing::info!(
            group_id = %group.id,
            invitation_id = %invitation_id,
            profile_id = %profile_id,
            total_members = group.total_members,
            "invitation accepted"
        );
        Ok(group)
    }

    pub async fn reject_invitation(
        &self,
        invitation_id: &InvitationId,
        profile_id: &ProfileId,
    ) -> Result<(), ServiceError> {
        self.pending_invitation_for(invitation_id, profile_id).await?;

        self.store
            .reject_invitation(invitation_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::NotFound,
                StoreError::Conflict => ServiceError::AlreadyProcessed,
                other => ServiceError::Storage(other),
            })?;

        tracing::info!(invitation_id = %invitation_id, profile_id = %profile_id, "invitation rejected");
        Ok(())
    }

    /// Shared guards for accept/reject: exists, addressed to the caller, still pending.
    async fn pending_invitation_for(
        &self,
        invitation_id: &InvitationId,
        profile_id: &ProfileId,
    ) -> Result<Invitation, ServiceError> {
        let invitation = self
            .store
            .get_invitation(invitation_id)
            .await
            .map_err(not_found)?;
        if &invitation.invited_profile_id != profile_id {
            return Err(ServiceError::AccessDenied);
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(ServiceError::AlreadyProcessed);
        }
        Ok(invitation)
    }
}

fn not_found(e: StoreError) -> ServiceError {
    match e {
        StoreError::NotFound => ServiceError::NotFound,
        other => ServiceError::Storage(other),
    }
}
