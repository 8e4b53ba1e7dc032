mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::TestHarness;
use identity_service::models::{actions, reasons, PrincipalKind, PrincipalStatus};
use identity_service::services::error::ServiceError;
use identity_service::services::{MemoryKv, SharedKv};

async fn login(h: &TestHarness) -> identity_service::services::jwt::IssuedPair {
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    h.auth
        .login("root@platform.test", "RootPass#1", None, None)
        .await
        .unwrap()
        .tokens
}

#[tokio::test]
async fn test_rotation_issues_a_working_pair() {
    let h = TestHarness::new();
    let first = login(&h).await;

    let second = h.auth.refresh(&first.refresh_token, None).await.unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);

    // The new pair keeps working
    let third = h.auth.refresh(&second.refresh_token, None).await.unwrap();
    assert!(h
        .auth
        .jwt()
        .validate_access_token(&third.access_token)
        .is_ok());
}

#[tokio::test]
async fn test_replaying_a_rotated_token_kills_the_session() {
    let h = TestHarness::new();
    let first = login(&h).await;
    let second = h.auth.refresh(&first.refresh_token, None).await.unwrap();

    // Replay of the rotated-out token
    let err = h.auth.refresh(&first.refresh_token, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));

    // The replay invalidated the whole session: the still-current token is
    // dead too, and the principal must log in again.
    let err = h.auth.refresh(&second.refresh_token, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidToken));

    // The invalidation left a trace
    assert!(h
        .audit
        .records()
        .iter()
        .any(|r| r.action == actions::REFRESH_TOKEN_INVALID
            && r.metadata["reason"] == reasons::TOKEN_MISMATCH));
}

#[tokio::test]
async fn test_concurrent_refresh_has_exactly_one_winner() {
    let h = TestHarness::new();
    let first = login(&h).await;

    let (a, b) = futures::join!(
        h.auth.refresh(&first.refresh_token, None),
        h.auth.refresh(&first.refresh_token, None),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one concurrent rotation may win");
}

#[tokio::test]
async fn test_garbage_and_foreign_tokens_are_rejected() {
    let h = TestHarness::new();
    let pair = login(&h).await;

    assert!(matches!(
        h.auth.refresh("not-a-jwt", None).await.unwrap_err(),
        ServiceError::InvalidToken
    ));

    // An access token is not accepted on the refresh path
    assert!(matches!(
        h.auth.refresh(&pair.access_token, None).await.unwrap_err(),
        ServiceError::InvalidToken
    ));
}

#[tokio::test]
async fn test_logout_revokes_access_and_refresh() {
    let h = TestHarness::new();
    let pair = login(&h).await;

    let claims = h
        .auth
        .jwt()
        .validate_access_token(&pair.access_token)
        .unwrap();
    h.auth.logout(&claims, None).await.unwrap();

    // The access token is denylisted for the rest of its lifetime
    assert!(matches!(
        h.auth
            .check_access_token(&pair.access_token)
            .await
            .unwrap_err(),
        ServiceError::InvalidToken
    ));

    // The stored refresh token is gone
    assert!(matches!(
        h.auth.refresh(&pair.refresh_token, None).await.unwrap_err(),
        ServiceError::InvalidToken
    ));
}

#[tokio::test]
async fn test_refresh_for_a_suspended_account_is_refused_and_audited() {
    let h = TestHarness::new();
    let root = h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    let pair = h
        .auth
        .login("root@platform.test", "RootPass#1", None, None)
        .await
        .unwrap()
        .tokens;

    h.store
        .set_status(PrincipalKind::Root, root.base.id, PrincipalStatus::Suspended);

    let err = h.auth.refresh(&pair.refresh_token, None).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::AccountDisabled(PrincipalStatus::Suspended)
    ));

    let record = h
        .audit
        .records()
        .into_iter()
        .filter(|r| r.action == actions::REFRESH_TOKEN_INVALID)
        .next_back()
        .expect("the refusal was audited");
    assert_eq!(record.metadata["reason"], PrincipalStatus::Suspended.as_str());
}

/// Denylist backend that drops every write, like Redis being unreachable.
struct OutageKv {
    inner: MemoryKv,
}

#[async_trait]
impl SharedKv for OutageKv {
    async fn deny_token(&self, _token_jti: &str, _expiry_seconds: i64) -> Result<(), anyhow::Error> {
        Err(anyhow::anyhow!("denylist unavailable"))
    }

    async fn is_token_denied(&self, token_jti: &str) -> Result<bool, anyhow::Error> {
        self.inner.is_token_denied(token_jti).await
    }

    async fn incr_counter(&self, key: &str, window_seconds: i64) -> Result<u64, anyhow::Error> {
        self.inner.incr_counter(key, window_seconds).await
    }

    async fn reset_counter(&self, key: &str) -> Result<(), anyhow::Error> {
        self.inner.reset_counter(key).await
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.inner.health_check().await
    }
}

#[tokio::test]
async fn test_logout_succeeds_through_a_denylist_outage() {
    let h = TestHarness::with_kv(Arc::new(OutageKv {
        inner: MemoryKv::new(),
    }));
    let pair = login(&h).await;

    let claims = h
        .auth
        .jwt()
        .validate_access_token(&pair.access_token)
        .unwrap();
    h.auth.logout(&claims, None).await.unwrap();

    // The stored refresh token was still cleared
    assert!(h.auth.refresh(&pair.refresh_token, None).await.is_err());
}
