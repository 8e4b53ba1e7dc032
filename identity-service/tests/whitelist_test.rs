mod common;

use common::TestHarness;
use identity_service::models::{
    actions, reasons, CreatorKind, PrincipalKind, Role, WhitelistEntry,
};
use identity_service::services::error::ServiceError;

#[tokio::test]
async fn test_unconstrained_principal_logs_in_from_anywhere() {
    let h = TestHarness::new();
    h.seed_root("root@platform.test", "platform-root", "RootPass#1");

    assert!(h
        .auth
        .login(
            "root@platform.test",
            "RootPass#1",
            Some("https://anywhere.test"),
            Some("203.0.113.9"),
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn test_root_is_checked_against_its_own_entries() {
    let h = TestHarness::new();
    let root = h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    h.seed_whitelist(
        WhitelistEntry::new(PrincipalKind::Root, root.base.id).with_domain("console.platform.test"),
    );

    assert!(h
        .auth
        .login(
            "root@platform.test",
            "RootPass#1",
            Some("https://console.platform.test"),
            None,
        )
        .await
        .is_ok());

    let err = h
        .auth
        .login(
            "root@platform.test",
            "RootPass#1",
            Some("https://evil.example.net"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OriginNotWhitelisted));
}

#[tokio::test]
async fn test_origin_comparison_is_case_sensitive() {
    let h = TestHarness::new();
    let root = h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    h.seed_whitelist(
        WhitelistEntry::new(PrincipalKind::Root, root.base.id).with_domain("console.platform.test"),
    );

    let err = h
        .auth
        .login(
            "root@platform.test",
            "RootPass#1",
            Some("https://Console.Platform.Test"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OriginNotWhitelisted));
}

#[tokio::test]
async fn test_origin_ok_but_address_unlisted_is_an_ip_rejection() {
    let h = TestHarness::new();
    let root = h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    h.seed_whitelist(
        WhitelistEntry::new(PrincipalKind::Root, root.base.id).with_domain("console.platform.test"),
    );
    h.seed_whitelist(
        WhitelistEntry::new(PrincipalKind::Root, root.base.id).with_server_ip("198.51.100.10"),
    );

    let err = h
        .auth
        .login(
            "root@platform.test",
            "RootPass#1",
            Some("https://console.platform.test"),
            Some("203.0.113.9"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::IpNotWhitelisted));

    let failure = h
        .audit
        .records()
        .into_iter()
        .find(|r| r.action == actions::LOGIN_FAILED)
        .unwrap();
    assert_eq!(failure.metadata["reason"], reasons::IP_NOT_WHITELISTED);
}

#[tokio::test]
async fn test_admin_is_governed_by_its_creating_roots_entries() {
    let h = TestHarness::new();
    let root = h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    let _admin = h.seed_admin(&root, "admin@biz.test", "biz-admin", "AdminPass#1");
    h.seed_whitelist(
        WhitelistEntry::new(PrincipalKind::Root, root.base.id).with_domain("portal.biz.test"),
    );

    assert!(h
        .auth
        .login(
            "admin@biz.test",
            "AdminPass#1",
            Some("https://portal.biz.test"),
            None,
        )
        .await
        .is_ok());

    let err = h
        .auth
        .login(
            "admin@biz.test",
            "AdminPass#1",
            Some("https://other.biz.test"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OriginNotWhitelisted));
}

#[tokio::test]
async fn test_descendants_are_governed_by_the_apex_admins_entries() {
    let h = TestHarness::new();
    let root = h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    let admin = h.seed_admin(&root, "admin@biz.test", "biz-admin", "AdminPass#1");
    let distributor = h.seed_business_child(
        &admin,
        Role::distributor(),
        "dist@biz.test",
        "dist-1",
        "DistPass#1",
    );
    h.seed_business_child(
        &distributor,
        Role::retailer(),
        "shop@biz.test",
        "shop-1",
        "ShopPass#1",
    );

    // The apex admin's entries govern the whole lineage; the Root's do not.
    h.seed_whitelist(
        WhitelistEntry::new(PrincipalKind::Business, admin.base.id).with_domain("portal.biz.test"),
    );
    h.seed_whitelist(
        WhitelistEntry::new(PrincipalKind::Root, root.base.id).with_domain("console.platform.test"),
    );

    assert!(h
        .auth
        .login(
            "shop@biz.test",
            "ShopPass#1",
            Some("https://portal.biz.test"),
            None,
        )
        .await
        .is_ok());

    // The Root-console entry does not bleed into the retailer's policy
    let err = h
        .auth
        .login(
            "shop@biz.test",
            "ShopPass#1",
            Some("https://console.platform.test"),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OriginNotWhitelisted));
}

#[tokio::test]
async fn test_constrained_login_without_an_origin_fails_closed() {
    let h = TestHarness::new();
    let root = h.seed_root("root@platform.test", "platform-root", "RootPass#1");
    h.seed_whitelist(
        WhitelistEntry::new(PrincipalKind::Root, root.base.id).with_domain("console.platform.test"),
    );

    let err = h
        .auth
        .login("root@platform.test", "RootPass#1", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::OriginNotWhitelisted));
}

#[tokio::test]
async fn test_employees_are_exempt() {
    let h = TestHarness::new();
    h.seed_employee(
        CreatorKind::Root,
        "ops@platform.test",
        "ops-emp",
        "OpsPass#1",
        vec![],
    );

    assert!(h
        .auth
        .login(
            "ops@platform.test",
            "OpsPass#1",
            Some("https://anywhere.test"),
            Some("203.0.113.9"),
        )
        .await
        .is_ok());
}
