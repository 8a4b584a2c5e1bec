//! Service-level flows: sync, push conflicts, organization lifecycle.

use zkvault_store::{
    AuditStore, Database, DeviceStore, ItemCreate, ItemStore, ItemUpdate, KeyMaterial,
    MembershipStatus, OrgPlan, OrgRole, OrgStore, User, UserStore, VaultOwner, VaultStore,
};
use zkvault_vault::{
    AuditQueries, Caller, OrgService, SyncEngine, SyncRequest, VaultError, VaultService,
};

struct Harness {
    users: UserStore,
    vaults: VaultService,
    sync: SyncEngine,
    orgs: OrgService,
    audit: AuditQueries,
}

async fn harness() -> Harness {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().await.unwrap();

    let users = UserStore::new(db.clone());
    let vault_store = VaultStore::new(db.clone());
    let item_store = ItemStore::new(db.clone());
    let org_store = OrgStore::new(db.clone());
    let audit_store = AuditStore::new(db.clone());

    Harness {
        users: users.clone(),
        vaults: VaultService::new(
            vault_store.clone(),
            item_store.clone(),
            org_store.clone(),
            audit_store.clone(),
        ),
        sync: SyncEngine::new(
            users.clone(),
            vault_store.clone(),
            item_store,
            org_store.clone(),
            DeviceStore::new(db.clone()),
            audit_store.clone(),
        ),
        orgs: OrgService::new(org_store.clone(), users, vault_store, audit_store.clone()),
        audit: AuditQueries::new(audit_store, org_store),
    }
}

async fn keyed_user(h: &Harness, email: &str) -> (User, Caller) {
    let user = h.users.create(email, None, Some("hash".into())).await.unwrap();
    let user = h
        .users
        .set_keys(
            &user.id,
            KeyMaterial {
                public_key: format!("pk:{email}"),
                encrypted_private_key: "epk".into(),
                protected_symmetric_key: "psk".into(),
                kdf: zkvault_crypto::KdfParams::pbkdf2_default(),
            },
            "server-hash".into(),
        )
        .await
        .unwrap();
    let caller = Caller::new(user.id.clone(), user.email.clone());
    (user, caller)
}

fn create(id: &str, data: &str, rev: i64) -> ItemCreate {
    ItemCreate {
        id: id.into(),
        encrypted_data: data.into(),
        revision_date: rev,
    }
}

// ── sync ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_creates_default_vault_and_is_idempotent() {
    let h = harness().await;
    let (_, caller) = keyed_user(&h, "ada@example.com").await;

    let first = h.sync.sync(&caller, &SyncRequest::default()).await.unwrap();
    assert_eq!(first.vaults.len(), 1);
    assert!(first.vaults[0].is_default);

    let second = h.sync.sync(&caller, &SyncRequest::default()).await.unwrap();
    assert_eq!(
        first.vaults.iter().map(|v| &v.id).collect::<Vec<_>>(),
        second.vaults.iter().map(|v| &v.id).collect::<Vec<_>>()
    );
    assert_eq!(first.items.len(), second.items.len());
}

#[tokio::test]
async fn delta_sync_carries_tombstones() {
    let h = harness().await;
    let (_, caller) = keyed_user(&h, "ada@example.com").await;
    let full = h.sync.sync(&caller, &SyncRequest::default()).await.unwrap();
    let vault_id = full.vaults[0].id.clone();

    h.vaults
        .push_items(
            &caller,
            &vault_id,
            vec![create("item-1", "ct-1", 1), create("item-2", "ct-2", 1)],
            vec![],
            vec![],
        )
        .await
        .unwrap();
    let checkpoint = h.sync.sync(&caller, &SyncRequest::default()).await.unwrap();

    h.vaults.delete_item(&caller, "item-1").await.unwrap();

    let delta = h
        .sync
        .sync(
            &caller,
            &SyncRequest {
                since: Some(checkpoint.server_time),
                include_deleted: false,
            },
        )
        .await
        .unwrap();
    let tombstone = delta.items.iter().find(|i| i.id == "item-1").unwrap();
    assert!(tombstone.deleted_at.is_some());
    // Vaults come back full even in delta mode.
    assert_eq!(delta.vaults.len(), 1);
}

// ── vault access ───────────────────────────────────────────────────────────

#[tokio::test]
async fn foreign_vault_is_indistinguishable_from_absent() {
    let h = harness().await;
    let (_, ada) = keyed_user(&h, "ada@example.com").await;
    let (_, eve) = keyed_user(&h, "eve@example.com").await;
    let vault = h.sync.sync(&ada, &SyncRequest::default()).await.unwrap().vaults[0].clone();

    let foreign = h.vaults.get_vault(&eve, &vault.id).await.unwrap_err();
    let absent = h.vaults.get_vault(&eve, "no-such-vault").await.unwrap_err();
    assert!(matches!(foreign, VaultError::NotFound { .. }));
    assert!(matches!(absent, VaultError::NotFound { .. }));
}

#[tokio::test]
async fn default_vault_cannot_be_deleted() {
    let h = harness().await;
    let (_, ada) = keyed_user(&h, "ada@example.com").await;
    let vault = h.sync.sync(&ada, &SyncRequest::default()).await.unwrap().vaults[0].clone();

    let err = h.vaults.delete_vault(&ada, &vault.id).await.unwrap_err();
    assert!(matches!(err, VaultError::Conflict(_)));
}

#[tokio::test]
async fn conflicting_update_returns_server_version() {
    let h = harness().await;
    let (_, ada) = keyed_user(&h, "ada@example.com").await;
    let vault = h.sync.sync(&ada, &SyncRequest::default()).await.unwrap().vaults[0].clone();

    h.vaults
        .push_items(&ada, &vault.id, vec![create("item-1", "ct-v1", 1)], vec![], vec![])
        .await
        .unwrap();

    // Two devices race from the same base revision.
    let winner = h
        .vaults
        .push_items(
            &ada,
            &vault.id,
            vec![],
            vec![ItemUpdate {
                id: "item-1".into(),
                encrypted_data: "ct-device-a".into(),
                last_known_revision_date: 1,
                revision_date: 2,
            }],
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(winner.updated.len(), 1);

    let loser = h
        .vaults
        .push_items(
            &ada,
            &vault.id,
            vec![],
            vec![ItemUpdate {
                id: "item-1".into(),
                encrypted_data: "ct-device-b".into(),
                last_known_revision_date: 1,
                revision_date: 2,
            }],
            vec![],
        )
        .await
        .unwrap();
    assert_eq!(loser.conflicts.len(), 1);
    assert_eq!(loser.conflicts[0].encrypted_data, "ct-device-a");
}

// ── organizations ──────────────────────────────────────────────────────────

async fn org_with_member(
    h: &Harness,
    owner: &Caller,
    member: &Caller,
    role: OrgRole,
) -> (String, String) {
    let (org, _) = h
        .orgs
        .create(owner, "Acme", "billing@acme.example", OrgPlan::Team, "wrapped:owner")
        .await
        .unwrap();
    let invitation = h.orgs.invite(owner, &org.id, &member.email, role).await.unwrap();
    h.orgs.accept(member, &invitation.id).await.unwrap();
    let confirmed = h
        .orgs
        .confirm(owner, &invitation.id, "wrapped:member")
        .await
        .unwrap();
    assert_eq!(confirmed.status, MembershipStatus::Confirmed);
    (org.id, invitation.id)
}

#[tokio::test]
async fn membership_lifecycle_grants_org_vault_access() {
    let h = harness().await;
    let (_, owner) = keyed_user(&h, "owner@example.com").await;
    let (_, member) = keyed_user(&h, "member@example.com").await;

    let (org_id, _) = org_with_member(&h, &owner, &member, OrgRole::Member).await;

    let sync = h.sync.sync(&member, &SyncRequest::default()).await.unwrap();
    let org_vault = sync
        .vaults
        .iter()
        .find(|v| v.organization_id.as_deref() == Some(org_id.as_str()))
        .expect("org vault visible to confirmed member");
    let membership = sync
        .memberships
        .iter()
        .find(|m| m.organization_id == org_id)
        .unwrap();
    assert_eq!(membership.encrypted_org_key.as_deref(), Some("wrapped:member"));

    // Confirmed but non-admin: read yes, write no.
    h.vaults.get_vault(&member, &org_vault.id).await.unwrap();
    let err = h
        .vaults
        .push_items(&member, &org_vault.id, vec![create("i", "ct", 1)], vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Forbidden));

    // Owner writes fine.
    h.vaults
        .push_items(&owner, &org_vault.id, vec![create("i", "ct", 1)], vec![], vec![])
        .await
        .unwrap();
}

#[tokio::test]
async fn unconfirmed_member_sees_nothing() {
    let h = harness().await;
    let (_, owner) = keyed_user(&h, "owner@example.com").await;
    let (_, member) = keyed_user(&h, "member@example.com").await;

    let (org, _) = h
        .orgs
        .create(&owner, "Acme", "billing@acme.example", OrgPlan::Team, "wrapped:owner")
        .await
        .unwrap();
    let invitation = h
        .orgs
        .invite(&owner, &org.id, &member.email, OrgRole::Member)
        .await
        .unwrap();
    h.orgs.accept(&member, &invitation.id).await.unwrap();

    // Accepted but not confirmed: org vaults stay invisible.
    let sync = h.sync.sync(&member, &SyncRequest::default()).await.unwrap();
    assert!(sync.vaults.iter().all(|v| v.organization_id.is_none()));
}

#[tokio::test]
async fn member_cannot_manage_roles_and_owner_is_immutable() {
    let h = harness().await;
    let (_, owner) = keyed_user(&h, "owner@example.com").await;
    let (_, member) = keyed_user(&h, "member@example.com").await;
    let (org_id, membership_id) = org_with_member(&h, &owner, &member, OrgRole::Member).await;

    // A plain member is not an admin.
    let err = h
        .orgs
        .set_role(&member, &membership_id, OrgRole::Readonly)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Forbidden));

    // The owner role is immutable in both directions.
    let owner_membership = h
        .orgs
        .list_members(&owner, &org_id)
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.role == OrgRole::Owner)
        .unwrap();
    let err = h
        .orgs
        .set_role(&owner, &owner_membership.id, OrgRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidRequest(_)));
    let err = h
        .orgs
        .set_role(&owner, &membership_id, OrgRole::Owner)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidRequest(_)));
}

#[tokio::test]
async fn admin_cannot_touch_other_admins() {
    let h = harness().await;
    let (_, owner) = keyed_user(&h, "owner@example.com").await;
    let (_, admin) = keyed_user(&h, "admin@example.com").await;
    let (_, other) = keyed_user(&h, "other@example.com").await;

    let (org_id, admin_membership) = org_with_member(&h, &owner, &admin, OrgRole::Admin).await;
    let invitation = h
        .orgs
        .invite(&owner, &org_id, &other.email, OrgRole::Member)
        .await
        .unwrap();
    h.orgs.accept(&other, &invitation.id).await.unwrap();
    h.orgs.confirm(&owner, &invitation.id, "wrapped:other").await.unwrap();

    // Admin may manage plain members.
    h.orgs
        .set_role(&admin, &invitation.id, OrgRole::Readonly)
        .await
        .unwrap();
    // But neither promote to admin nor demote another admin.
    let err = h
        .orgs
        .set_role(&admin, &invitation.id, OrgRole::Admin)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Forbidden));
    let err = h.orgs.revoke(&admin, &admin_membership).await.unwrap_err();
    assert!(matches!(err, VaultError::Forbidden));
}

#[tokio::test]
async fn revocation_clears_wrapped_key_and_access() {
    let h = harness().await;
    let (_, owner) = keyed_user(&h, "owner@example.com").await;
    let (_, member) = keyed_user(&h, "member@example.com").await;
    let (org_id, membership_id) = org_with_member(&h, &owner, &member, OrgRole::Member).await;

    h.orgs.revoke(&owner, &membership_id).await.unwrap();

    let members = h.orgs.list_members(&owner, &org_id).await.unwrap();
    let revoked = members.iter().find(|m| m.id == membership_id).unwrap();
    assert_eq!(revoked.status, MembershipStatus::Revoked);
    assert!(revoked.encrypted_org_key.is_none());

    let sync = h.sync.sync(&member, &SyncRequest::default()).await.unwrap();
    assert!(sync.vaults.iter().all(|v| v.organization_id.is_none()));
}

#[tokio::test]
async fn member_cap_is_enforced() {
    let h = harness().await;
    let (_, owner) = keyed_user(&h, "owner@example.com").await;
    let (org, _) = h
        .orgs
        .create(&owner, "Tiny", "billing@tiny.example", OrgPlan::Free, "wrapped:owner")
        .await
        .unwrap();
    assert_eq!(org.max_members, 2);

    h.orgs
        .invite(&owner, &org.id, "second@example.com", OrgRole::Member)
        .await
        .unwrap();
    let err = h
        .orgs
        .invite(&owner, &org.id, "third@example.com", OrgRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Conflict(_)));
}

#[tokio::test]
async fn org_audit_requires_admin() {
    let h = harness().await;
    let (_, owner) = keyed_user(&h, "owner@example.com").await;
    let (_, member) = keyed_user(&h, "member@example.com").await;
    let (org_id, _) = org_with_member(&h, &owner, &member, OrgRole::Member).await;

    let entries = h.audit.for_org(&owner, &org_id, 1, 50).await.unwrap();
    assert!(!entries.is_empty());

    let err = h.audit.for_org(&member, &org_id, 1, 50).await.unwrap_err();
    assert!(matches!(err, VaultError::Forbidden));

    // Everyone may read their own trail.
    let own = h.audit.for_self(&member, 1, 50).await.unwrap();
    assert!(!own.is_empty());
}

#[tokio::test]
async fn create_dedup_by_id_and_ciphertext() {
    let h = harness().await;
    let (_, ada) = keyed_user(&h, "ada@example.com").await;
    let vault = h.sync.sync(&ada, &SyncRequest::default()).await.unwrap().vaults[0].clone();

    h.vaults
        .push_items(&ada, &vault.id, vec![create("item-1", "ct-1", 1)], vec![], vec![])
        .await
        .unwrap();

    // Same id again: upsert, not duplicate.
    let again = h
        .vaults
        .push_items(&ada, &vault.id, vec![create("item-1", "ct-1b", 2)], vec![], vec![])
        .await
        .unwrap();
    assert_eq!(again.created.len(), 1);

    // Identical ciphertext under a new id: the existing row comes back.
    let dup = h
        .vaults
        .push_items(&ada, &vault.id, vec![create("item-2", "ct-1b", 1)], vec![], vec![])
        .await
        .unwrap();
    assert_eq!(dup.created.len(), 1);
    assert_eq!(dup.created[0].id, "item-1");

    let items = h.vaults.list_items(&ada, &vault.id, true).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn personal_vault_create_and_rename() {
    let h = harness().await;
    let (_, ada) = keyed_user(&h, "ada@example.com").await;

    let vault = h
        .vaults
        .create_vault(&ada, VaultOwner::User(ada.user_id.clone()), "enc:work")
        .await
        .unwrap();
    let renamed = h.vaults.update_vault(&ada, &vault.id, "enc:work-v2").await.unwrap();
    assert_eq!(renamed.encrypted_name, "enc:work-v2");

    h.vaults.delete_vault(&ada, &vault.id).await.unwrap();
    let err = h.vaults.get_vault(&ada, &vault.id).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound { .. }));
}
