mod common;

use common::TestHarness;
use identity_service::models::Role;
use identity_service::services::error::ServiceError;
use identity_service::services::SentNotification;

fn reset_token(h: &TestHarness) -> String {
    h.notifier
        .sent()
        .into_iter()
        .rev()
        .find_map(|n| match n {
            SentNotification::ResetLink { token, .. } => Some(token),
            _ => None,
        })
        .expect("a reset link was sent")
}

fn issued_credentials(h: &TestHarness) -> (String, Option<String>) {
    h.notifier
        .sent()
        .into_iter()
        .rev()
        .find_map(|n| match n {
            SentNotification::NewCredentials { password, pin, .. } => Some((password, pin)),
            _ => None,
        })
        .expect("new credentials were sent")
}

#[tokio::test]
async fn test_request_is_silent_about_unknown_addresses() {
    let h = TestHarness::new();
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");

    // Both calls succeed identically
    h.auth
        .request_password_reset("root@platform.test", None)
        .await
        .unwrap();
    h.auth
        .request_password_reset("nobody@platform.test", None)
        .await
        .unwrap();

    // Only the real account got mail
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_full_reset_issues_working_credentials() {
    let h = TestHarness::new();
    let root = h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    let admin = h.seed_admin(&root, "admin@biz.test", "biz-admin", "AdminPass#1");
    h.seed_business_child(
        &admin,
        Role::retailer(),
        "shop@biz.test",
        "shop-1",
        "ShopPass#1",
    );

    h.auth
        .request_password_reset("shop@biz.test", None)
        .await
        .unwrap();
    let token = reset_token(&h);

    h.auth.confirm_password_reset(&token, None).await.unwrap();
    let (password, pin) = issued_credentials(&h);

    // Business accounts get a PIN alongside the password
    assert!(pin.is_some());
    assert_eq!(pin.as_ref().unwrap().len(), 6);

    // The old password is dead, the issued one works
    assert!(matches!(
        h.auth
            .login("shop@biz.test", "ShopPass#1", None, None)
            .await
            .unwrap_err(),
        ServiceError::InvalidCredentials
    ));
    assert!(h
        .auth
        .login("shop@biz.test", &password, None, None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_root_reset_issues_no_pin() {
    let h = TestHarness::new();
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");

    h.auth
        .request_password_reset("root@platform.test", None)
        .await
        .unwrap();
    let token = reset_token(&h);
    h.auth.confirm_password_reset(&token, None).await.unwrap();

    let (_, pin) = issued_credentials(&h);
    assert!(pin.is_none());
}

#[tokio::test]
async fn test_reset_token_is_single_use() {
    let h = TestHarness::new();
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");

    h.auth
        .request_password_reset("root@platform.test", None)
        .await
        .unwrap();
    let token = reset_token(&h);

    h.auth.confirm_password_reset(&token, None).await.unwrap();
    assert!(matches!(
        h.auth.confirm_password_reset(&token, None).await.unwrap_err(),
        ServiceError::InvalidToken
    ));
}

#[tokio::test]
async fn test_newer_request_invalidates_the_older_token() {
    let h = TestHarness::new();
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");

    h.auth
        .request_password_reset("root@platform.test", None)
        .await
        .unwrap();
    let first = reset_token(&h);

    h.auth
        .request_password_reset("root@platform.test", None)
        .await
        .unwrap();
    let second = reset_token(&h);
    assert_ne!(first, second);

    assert!(matches!(
        h.auth.confirm_password_reset(&first, None).await.unwrap_err(),
        ServiceError::InvalidToken
    ));
    assert!(h.auth.confirm_password_reset(&second, None).await.is_ok());
}

#[tokio::test]
async fn test_reset_invalidates_the_active_session() {
    let h = TestHarness::new();
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");

    let pair = h
        .auth
        .login("root@platform.test", "RootPass#1", None, None)
        .await
        .unwrap()
        .tokens;

    h.auth
        .request_password_reset("root@platform.test", None)
        .await
        .unwrap();
    let token = reset_token(&h);
    h.auth.confirm_password_reset(&token, None).await.unwrap();

    // The pre-reset refresh token no longer rotates
    assert!(matches!(
        h.auth.refresh(&pair.refresh_token, None).await.unwrap_err(),
        ServiceError::InvalidToken
    ));
}

#[tokio::test]
async fn test_smtp_outage_does_not_abort_the_reset_request() {
    let h = TestHarness::new();
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    h.notifier.set_failing(true);

    // The request still succeeds (and still reveals nothing to the caller);
    // only the delivery was lost.
    h.auth
        .request_password_reset("root@platform.test", None)
        .await
        .unwrap();
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_smtp_outage_does_not_abort_the_reset_confirmation() {
    let h = TestHarness::new();
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");

    h.auth
        .request_password_reset("root@platform.test", None)
        .await
        .unwrap();
    let token = reset_token(&h);

    h.notifier.set_failing(true);
    h.auth.confirm_password_reset(&token, None).await.unwrap();

    // The credentials were rotated even though delivery failed
    assert!(matches!(
        h.auth
            .login("root@platform.test", "RootPass#1", None, None)
            .await
            .unwrap_err(),
        ServiceError::InvalidCredentials
    ));
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let h = TestHarness::new();
    assert!(matches!(
        h.auth
            .confirm_password_reset("deadbeef", None)
            .await
            .unwrap_err(),
        ServiceError::InvalidToken
    ));
}
