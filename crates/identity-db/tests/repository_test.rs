//! Integration tests for the user, signing key and refresh session
//! repositories.

use chrono::{Duration, Utc};
use identity_core::ErrorKind;
use identity_core::error::IdentityError;
use identity_core::models::refresh_session::CreateRefreshSession;
use identity_core::models::signing_key::{
    CreateSigningKey, SIGNING_ALGORITHM, SIGNING_KEY_USE, SigningKeyStatus,
};
use identity_core::models::user::CreateUser;
use identity_core::repository::{RefreshSessionRepository, SigningKeyRepository, UserRepository};
use identity_db::repository::{
    SurrealRefreshSessionRepository, SurrealSigningKeyRepository, SurrealUserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    identity_db::run_migrations(&db).await.unwrap();
    db
}

fn new_user(email: &str) -> CreateUser {
    CreateUser {
        name: "Alice".into(),
        email: email.into(),
        password_hash: "c2FsdA:a2V5".into(),
        roles: vec!["user".into()],
    }
}

fn new_key(kid: &str, created_at: chrono::DateTime<Utc>) -> CreateSigningKey {
    CreateSigningKey {
        kid: kid.into(),
        algorithm: SIGNING_ALGORITHM.into(),
        usage: SIGNING_KEY_USE.into(),
        private_key_pem: "private".into(),
        public_key_pem: "public".into(),
        created_at,
    }
}

fn new_session(session_id: &str, user_id: Uuid, hash: &str) -> CreateRefreshSession {
    let now = Utc::now();
    CreateRefreshSession {
        session_id: session_id.into(),
        user_id,
        refresh_secret_hash: hash.into(),
        user_agent: Some("tests".into()),
        client_address: None,
        created_at: now,
        expires_at: now + Duration::days(30),
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_user() {
    let repo = SurrealUserRepository::new(setup().await);

    let user = repo.create(new_user("alice@example.com")).await.unwrap();
    assert_eq!(user.email, "alice@example.com");
    assert_eq!(user.roles, vec!["user".to_string()]);

    let by_id = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(by_id.email, user.email);

    let by_email = repo.get_by_email("alice@example.com").await.unwrap();
    assert_eq!(by_email.id, user.id);
    assert_eq!(by_email.password_hash, "c2FsdA:a2V5");
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let repo = SurrealUserRepository::new(setup().await);

    repo.create(new_user("dup@example.com")).await.unwrap();
    let err = repo.create(new_user("dup@example.com")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let repo = SurrealUserRepository::new(setup().await);

    let err = repo.get_by_id(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = repo.get_by_email("nobody@example.com").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ---------------------------------------------------------------------------
// Signing keys
// ---------------------------------------------------------------------------

#[tokio::test]
async fn find_active_returns_newest_active_key() {
    let repo = SurrealSigningKeyRepository::new(setup().await);
    assert!(repo.find_active().await.unwrap().is_none());

    let now = Utc::now();
    repo.create(new_key("older", now - Duration::hours(2))).await.unwrap();
    let newer = repo.create(new_key("newer", now)).await.unwrap();
    assert_eq!(newer.status, SigningKeyStatus::Active);
    assert!(newer.rotated_at.is_none());

    let active = repo.find_active().await.unwrap().unwrap();
    assert_eq!(active.kid, "newer");
    assert_eq!(active.private_key_pem, "private");
}

#[tokio::test]
async fn duplicate_kid_is_rejected() {
    let repo = SurrealSigningKeyRepository::new(setup().await);

    repo.create(new_key("same", Utc::now())).await.unwrap();
    let err = repo.create(new_key("same", Utc::now())).await.unwrap_err();
    assert!(matches!(err, IdentityError::AlreadyExists { .. }));
}

#[tokio::test]
async fn status_moves_forward_only() {
    let repo = SurrealSigningKeyRepository::new(setup().await);
    let now = Utc::now();
    let key = repo.create(new_key("k1", now)).await.unwrap();

    // Revoking an active key skips a step.
    let err = repo
        .update_status(key.id, SigningKeyStatus::Revoked, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    repo.update_status(key.id, SigningKeyStatus::Retiring, Some(now))
        .await
        .unwrap();
    let listed = repo.list_verifiable().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, SigningKeyStatus::Retiring);
    assert!(listed[0].rotated_at.is_some());

    let err = repo
        .update_status(key.id, SigningKeyStatus::Active, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    repo.update_status(key.id, SigningKeyStatus::Revoked, None)
        .await
        .unwrap();
    assert!(repo.list_verifiable().await.unwrap().is_empty());
}

#[tokio::test]
async fn revoke_retiring_before_respects_cutoff() {
    let repo = SurrealSigningKeyRepository::new(setup().await);
    let now = Utc::now();

    let old = repo.create(new_key("old", now - Duration::hours(3))).await.unwrap();
    let recent = repo.create(new_key("recent", now - Duration::hours(2))).await.unwrap();
    repo.create(new_key("current", now)).await.unwrap();

    repo.update_status(old.id, SigningKeyStatus::Retiring, Some(now - Duration::hours(2)))
        .await
        .unwrap();
    repo.update_status(recent.id, SigningKeyStatus::Retiring, Some(now - Duration::minutes(10)))
        .await
        .unwrap();

    let revoked = repo
        .revoke_retiring_before(now - Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(revoked, 1);

    let mut kids: Vec<String> = repo
        .list_verifiable()
        .await
        .unwrap()
        .into_iter()
        .map(|k| k.kid)
        .collect();
    kids.sort();
    assert_eq!(kids, vec!["current".to_string(), "recent".to_string()]);

    // Active keys are never swept.
    assert_eq!(repo.revoke_retiring_before(now + Duration::days(1)).await.unwrap(), 1);
    let remaining = repo.list_verifiable().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].kid, "current");
}

// ---------------------------------------------------------------------------
// Refresh sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_session() {
    let repo = SurrealRefreshSessionRepository::new(setup().await);
    let user_id = Uuid::new_v4();

    let created = repo.create(new_session("sid-1", user_id, "h1")).await.unwrap();
    assert!(created.revoked_at.is_none());

    let fetched = repo.get_by_session_id("sid-1").await.unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.user_id, user_id);
    assert_eq!(fetched.refresh_secret_hash, "h1");
    assert_eq!(fetched.user_agent.as_deref(), Some("tests"));

    let err = repo.get_by_session_id("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn rotate_is_conditional_on_current_hash() {
    let repo = SurrealRefreshSessionRepository::new(setup().await);
    repo.create(new_session("sid-1", Uuid::new_v4(), "h1")).await.unwrap();
    let now = Utc::now();
    let later = now + Duration::days(30);

    assert!(repo.rotate("sid-1", "h1", "h2", later, now).await.unwrap());
    // The old hash no longer matches.
    assert!(!repo.rotate("sid-1", "h1", "h3", later, now).await.unwrap());
    assert!(repo.rotate("sid-1", "h2", "h3", later, now).await.unwrap());

    let session = repo.get_by_session_id("sid-1").await.unwrap();
    assert_eq!(session.refresh_secret_hash, "h3");
    assert_eq!(session.session_id, "sid-1");
}

#[tokio::test]
async fn rotate_rejects_revoked_and_expired_sessions() {
    let repo = SurrealRefreshSessionRepository::new(setup().await);
    let now = Utc::now();
    let later = now + Duration::days(30);

    repo.create(new_session("revoked", Uuid::new_v4(), "h")).await.unwrap();
    repo.revoke("revoked", now).await.unwrap();
    assert!(!repo.rotate("revoked", "h", "h2", later, now).await.unwrap());

    repo.create(new_session("expired", Uuid::new_v4(), "h")).await.unwrap();
    let after_expiry = now + Duration::days(31);
    assert!(!repo.rotate("expired", "h", "h2", later, after_expiry).await.unwrap());
}

#[tokio::test]
async fn revoke_keeps_first_timestamp() {
    let repo = SurrealRefreshSessionRepository::new(setup().await);
    repo.create(new_session("sid", Uuid::new_v4(), "h")).await.unwrap();

    let first = Utc::now();
    repo.revoke("sid", first).await.unwrap();
    repo.revoke("sid", first + Duration::minutes(5)).await.unwrap();

    let session = repo.get_by_session_id("sid").await.unwrap();
    let revoked_at = session.revoked_at.unwrap();
    assert!((revoked_at - first).num_seconds().abs() < 1);

    let err = repo.revoke("missing", first).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn revoke_user_sessions_only_touches_that_user() {
    let repo = SurrealRefreshSessionRepository::new(setup().await);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    repo.create(new_session("a1", alice, "h")).await.unwrap();
    repo.create(new_session("a2", alice, "h")).await.unwrap();
    repo.create(new_session("b1", bob, "h")).await.unwrap();

    assert_eq!(repo.revoke_user_sessions(alice, Utc::now()).await.unwrap(), 2);
    assert_eq!(repo.revoke_user_sessions(alice, Utc::now()).await.unwrap(), 0);

    assert!(repo.get_by_session_id("a1").await.unwrap().revoked_at.is_some());
    assert!(repo.get_by_session_id("b1").await.unwrap().revoked_at.is_none());
}

#[tokio::test]
async fn cleanup_expired_deletes_only_expired_sessions() {
    let repo = SurrealRefreshSessionRepository::new(setup().await);
    let now = Utc::now();

    let mut stale = new_session("stale", Uuid::new_v4(), "h");
    stale.created_at = now - Duration::days(40);
    stale.expires_at = now - Duration::days(10);
    repo.create(stale).await.unwrap();
    repo.create(new_session("live", Uuid::new_v4(), "h")).await.unwrap();

    assert_eq!(repo.cleanup_expired(now).await.unwrap(), 1);
    assert_eq!(
        repo.get_by_session_id("stale").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert!(repo.get_by_session_id("live").await.is_ok());
}
