//! Membership manager tests: groups, invitations, access checks.

use basket_storage::*;
use uuid::Uuid;

use super::common::*;
use crate::error::ServiceError;

#[tokio::test]
async fn create_group_makes_creator_sole_admin() {
    let server = create_test_server().await;
    let alice = create_profile(&server, "alice@example.com").await;

    let group = server.create_group("Groceries", &alice).await.unwrap();
    assert_eq!(group.name, "Groceries");
    assert_eq!(group.total_members, 1);

    let members = server.list_members(&group.id, &alice).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].profile_id, alice);
    assert_eq!(members[0].role, MemberRole::Admin);

    let groups = server.list_groups(&alice).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, group.id);
}

#[tokio::test]
async fn create_group_validates_name() {
    let server = create_test_server().await;
    let alice = create_profile(&server, "alice@example.com").await;

    let err = server.create_group("   ", &alice).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let too_long = "x".repeat(101);
    let err = server.create_group(&too_long, &alice).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let longest = "x".repeat(100);
    assert!(server.create_group(&longest, &alice).await.is_ok());
    assert!(server.list_groups(&alice).await.unwrap().len() == 1);
}

#[tokio::test]
async fn invite_and_accept_scenario() {
    let server = create_test_server().await;
    let alice = create_profile(&server, "alice@example.com").await;
    let bob = create_profile(&server, "bob@example.com").await;

    let group = server.create_group("Groceries", &alice).await.unwrap();
    let invitation = server
        .invite(&group.id, &alice, "bob@example.com")
        .await
        .unwrap();
    assert_eq!(invitation.status, InvitationStatus::Pending);
    assert_eq!(invitation.invited_profile_id, bob);
    assert_eq!(invitation.invited_by_profile_id, alice);

    let pending = server.list_invitations(&bob).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, invitation.id);

    let joined = server.accept_invitation(&invitation.id, &bob).await.unwrap();
    assert_eq!(joined.id, group.id);
    assert_eq!(joined.total_members, 2);

    let stored = server.store.get_invitation(&invitation.id).await.unwrap();
    assert_eq!(stored.status, InvitationStatus::Accepted);
    assert!(server.list_invitations(&bob).await.unwrap().is_empty());

    let membership = server.assert_member(&group.id, &bob).await.unwrap();
    assert_eq!(membership.role, MemberRole::Member);

    let members = server.list_members(&group.id, &alice).await.unwrap();
    assert_eq!(members.len() as i64, joined.total_members);
}

#[tokio::test]
async fn only_admins_invite() {
    let server = create_test_server().await;
    let (group_id, _admin, member) = create_group_with_member(&server).await;
    let carol = create_profile(&server, "carol@example.com").await;
    create_profile(&server, "dave@example.com").await;

    let err = server
        .invite(&group_id, &member, "dave@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotAdmin));

    let err = server
        .invite(&group_id, &carol, "dave@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotAdmin));
}

#[tokio::test]
async fn invite_guards() {
    let server = create_test_server().await;
    let (group_id, admin, _member) = create_group_with_member(&server).await;
    create_profile(&server, "carol@example.com").await;

    let err = server
        .invite(&group_id, &admin, "nobody@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnknownUser));

    let err = server
        .invite(&group_id, &admin, "bob@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyMember));

    let err = server
        .invite(&group_id, &admin, "alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyMember));

    server
        .invite(&group_id, &admin, "carol@example.com")
        .await
        .unwrap();
    let err = server
        .invite(&group_id, &admin, "carol@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvitationPending));
}

#[tokio::test]
async fn accept_and_reject_guards() {
    let server = create_test_server().await;
    let alice = create_profile(&server, "alice@example.com").await;
    let bob = create_profile(&server, "bob@example.com").await;
    let group = server.create_group("Groceries", &alice).await.unwrap();
    let invitation = server
        .invite(&group.id, &alice, "bob@example.com")
        .await
        .unwrap();

    let missing = InvitationId(Uuid::new_v4());
    assert!(matches!(
        server.accept_invitation(&missing, &bob).await,
        Err(ServiceError::NotFound)
    ));
    assert!(matches!(
        server.reject_invitation(&missing, &bob).await,
        Err(ServiceError::NotFound)
    ));

    // Only the invited profile may respond.
    assert!(matches!(
        server.accept_invitation(&invitation.id, &alice).await,
        Err(ServiceError::AccessDenied)
    ));

    server.accept_invitation(&invitation.id, &bob).await.unwrap();
    assert!(matches!(
        server.accept_invitation(&invitation.id, &bob).await,
        Err(ServiceError::AlreadyProcessed)
    ));
    assert!(matches!(
        server.reject_invitation(&invitation.id, &bob).await,
        Err(ServiceError::AlreadyProcessed)
    ));

    let group = server.get_group(&group.id, &alice).await.unwrap();
    assert_eq!(group.total_members, 2);
}

#[tokio::test]
async fn reject_changes_status_only() {
    let server = create_test_server().await;
    let alice = create_profile(&server, "alice@example.com").await;
    let bob = create_profile(&server, "bob@example.com").await;
    let group = server.create_group("Groceries", &alice).await.unwrap();
    let invitation = server
        .invite(&group.id, &alice, "bob@example.com")
        .await
        .unwrap();

    server.reject_invitation(&invitation.id, &bob).await.unwrap();

    let stored = server.store.get_invitation(&invitation.id).await.unwrap();
    assert_eq!(stored.status, InvitationStatus::Rejected);
    assert!(matches!(
        server.assert_member(&group.id, &bob).await,
        Err(ServiceError::AccessDenied)
    ));
    assert_eq!(
        server.get_group(&group.id, &alice).await.unwrap().total_members,
        1
    );
    assert!(matches!(
        server.accept_invitation(&invitation.id, &bob).await,
        Err(ServiceError::AlreadyProcessed)
    ));

    // A rejected invitation no longer blocks a fresh one.
    let again = server
        .invite(&group.id, &alice, "bob@example.com")
        .await
        .unwrap();
    assert_ne!(again.id, invitation.id);
}

#[tokio::test]
async fn reads_require_membership() {
    let server = create_test_server().await;
    let (group_id, _admin, member) = create_group_with_member(&server).await;
    let outsider = create_profile(&server, "mallory@example.com").await;

    assert!(server.get_group(&group_id, &member).await.is_ok());
    assert!(matches!(
        server.get_group(&group_id, &outsider).await,
        Err(ServiceError::AccessDenied)
    ));
    assert!(matches!(
        server.list_members(&group_id, &outsider).await,
        Err(ServiceError::AccessDenied)
    ));

    // Missing groups look the same as foreign ones.
    let missing = GroupId(Uuid::new_v4());
    assert!(matches!(
        server.get_group(&missing, &member).await,
        Err(ServiceError::AccessDenied)
    ));

    assert!(server.list_groups(&outsider).await.unwrap().is_empty());
}
