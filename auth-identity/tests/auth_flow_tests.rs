//! Session orchestration tests against the in-memory store

use auth_identity::*;
use database_layer::MemoryAuditSink;
use error_common::{Categorized, ErrorCategory};
use std::sync::Arc;
use uuid::Uuid;

const PASSWORD: &str = "Sup3r-secret";

struct TestContext {
    auth: Arc<AuthService>,
    roles: RoleService,
    audit: MemoryAuditSink,
    codec: Arc<TokenCodec>,
}

/// Seeded in-memory service with a cheap bcrypt cost
async fn create_test_service() -> TestContext {
    let store = IdentityStore::in_memory();
    seed_defaults(&store).await.expect("seed defaults");

    let tokens = TokenConfig::new("test-access-secret", "test-refresh-secret").unwrap();
    let config = IdentityConfig::new(tokens).with_bcrypt_cost(4);
    let audit = MemoryAuditSink::new();

    let auth = AuthService::new(store.clone(), &config, Arc::new(audit.clone())).unwrap();
    let codec = auth.token_codec();

    TestContext {
        auth: Arc::new(auth),
        roles: RoleService::new(store, Arc::new(audit.clone())),
        audit,
        codec,
    }
}

fn signup_request(phone: &str, user_type: ActorKind) -> SignupRequest {
    SignupRequest {
        phone: phone.to_string(),
        email: None,
        password: PASSWORD.to_string(),
        user_type,
        full_name: Some("Test User".to_string()),
        company_name: Some("Acme Logistics".to_string()),
        ip_address: Some("10.0.0.1".to_string()),
    }
}

fn login_request(phone: &str, password: &str) -> LoginRequest {
    LoginRequest {
        phone: phone.to_string(),
        password: password.to_string(),
        ip_address: None,
    }
}

async fn create_admin(ctx: &TestContext, phone: &str, roles: &[&str]) -> User {
    ctx.auth
        .create_admin(
            &Actor::system(),
            CreateAdminRequest {
                phone: phone.to_string(),
                email: None,
                password: Some(PASSWORD.to_string()),
                full_name: Some("Ops Admin".to_string()),
                role_names: roles.iter().map(ToString::to_string).collect(),
            },
        )
        .await
        .expect("create admin")
}

async fn role_id(ctx: &TestContext, name: &str) -> Uuid {
    ctx.auth
        .store()
        .roles
        .find_role_by_name(name)
        .await
        .unwrap()
        .expect("seeded role")
        .id
}

#[tokio::test]
async fn test_client_signup_creates_tenant_and_owner_role() {
    let ctx = create_test_service().await;

    let session = ctx
        .auth
        .signup(signup_request("+15550000001", ActorKind::Client))
        .await
        .expect("signup should succeed");

    let claims = ctx.codec.verify_access(&session.access_token).unwrap();
    assert_eq!(claims.sub, session.user.id);
    assert_eq!(claims.user_type, ActorKind::Client);
    assert_eq!(claims.roles, vec!["CLIENT_ADMIN"]);
    assert!(claims.permissions.contains(&"jobs:create".to_string()));
    assert!(claims.tenant_id.is_some(), "client tokens carry the tenant");
    assert!(claims.jti.is_none(), "only admin access tokens carry a jti");

    let json = serde_json::to_value(&session).unwrap();
    assert!(json["user"].get("passwordHash").is_none());
    assert!(json["accessToken"].is_string());

    assert!(ctx.audit.actions().contains(&"user.signup".to_string()));
    println!("✅ Client signup test PASSED");
}

#[tokio::test]
async fn test_sp_signup_gets_basic_role_without_tenant() {
    let ctx = create_test_service().await;

    let session = ctx.auth.signup(signup_request("+15550000002", ActorKind::Sp)).await.unwrap();
    let claims = ctx.codec.verify_access(&session.access_token).unwrap();

    assert_eq!(claims.roles, vec!["SP_BASIC"]);
    assert_eq!(claims.permissions, vec!["jobs:apply", "jobs:view"]);
    assert!(claims.tenant_id.is_none());
}

#[tokio::test]
async fn test_admin_self_signup_is_forbidden() {
    let ctx = create_test_service().await;

    let err = ctx
        .auth
        .signup(signup_request("+15550000003", ActorKind::Admin))
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::AdminSignupForbidden));
    assert_eq!(err.category(), ErrorCategory::Forbidden);
    assert!(ctx.auth.store().users.find_by_phone("+15550000003").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_phone_rejected() {
    let ctx = create_test_service().await;
    ctx.auth.signup(signup_request("+15550000004", ActorKind::Sp)).await.unwrap();

    let err = ctx
        .auth
        .signup(signup_request("+15550000004", ActorKind::Client))
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::PhoneTaken));
    assert_eq!(err.category(), ErrorCategory::Conflict);
}

#[tokio::test]
async fn test_concurrent_signup_same_phone_single_winner() {
    let ctx = create_test_service().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let auth = Arc::clone(&ctx.auth);
            tokio::spawn(async move { auth.signup(signup_request("+15550000005", ActorKind::Sp)).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(matches!(e, IdentityError::PhoneTaken), "unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1, "exactly one signup may win the phone");
    println!("✅ Concurrent signup test PASSED");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_phone_look_identical() {
    let ctx = create_test_service().await;
    ctx.auth.signup(signup_request("+15550000006", ActorKind::Sp)).await.unwrap();

    let wrong_password = ctx
        .auth
        .login(login_request("+15550000006", "not-the-password"))
        .await
        .unwrap_err();
    let unknown_phone = ctx
        .auth
        .login(login_request("+15559999999", PASSWORD))
        .await
        .unwrap_err();

    assert!(matches!(wrong_password, IdentityError::InvalidCredentials));
    assert!(matches!(unknown_phone, IdentityError::InvalidCredentials));
    assert_eq!(wrong_password.to_string(), unknown_phone.to_string());
    assert_eq!(wrong_password.code(), unknown_phone.code());
    assert_eq!(wrong_password.category(), ErrorCategory::Unauthorized);
}

#[tokio::test]
async fn test_banned_user_gets_explicit_denial() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000007", ActorKind::Sp)).await.unwrap();

    let summary = ctx
        .auth
        .update_user_status(&Actor::system(), session.user.id, UserStatus::Banned)
        .await
        .unwrap();
    assert_eq!(summary.revoked_tokens, 1, "banning ends existing sessions");

    let err = ctx.auth.login(login_request("+15550000007", PASSWORD)).await.unwrap_err();
    assert!(matches!(err, IdentityError::AccountBanned));
    assert_eq!(err.category(), ErrorCategory::Forbidden);
    assert!(err.to_string().contains("banned"));

    let refresh = ctx.auth.refresh(&session.refresh_token).await.unwrap_err();
    assert!(matches!(refresh, IdentityError::RefreshRejected));
}

#[tokio::test]
async fn test_suspended_user_denied() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000008", ActorKind::Client)).await.unwrap();

    ctx.auth
        .update_user_status(&Actor::system(), session.user.id, UserStatus::Suspended)
        .await
        .unwrap();

    let err = ctx.auth.login(login_request("+15550000008", PASSWORD)).await.unwrap_err();
    assert!(matches!(err, IdentityError::AccountSuspended));

    ctx.auth
        .update_user_status(&Actor::system(), session.user.id, UserStatus::Active)
        .await
        .unwrap();
    assert!(ctx.auth.login(login_request("+15550000008", PASSWORD)).await.is_ok());
}

#[tokio::test]
async fn test_single_role_admin_login_auto_selects() {
    let ctx = create_test_service().await;
    let admin = create_admin(&ctx, "+15550000010", &["KYC_ADMIN"]).await;

    let outcome = ctx.auth.login(login_request("+15550000010", PASSWORD)).await.unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert!(json.get("requiresRoleSelection").is_none());
    assert!(json["accessToken"].is_string());

    let session = outcome.session().expect("single-role admin gets tokens directly");
    let claims = ctx.codec.verify_access(&session.access_token).unwrap();
    assert_eq!(claims.roles, vec!["KYC_ADMIN"]);
    assert!(claims.permissions.contains(&"kyc:view".to_string()));
    assert!(claims.tenant_id.is_none());

    let jti = claims.jti.expect("admin access tokens carry a jti");
    let admin_session = ctx
        .auth
        .store()
        .admin_sessions
        .find_active_by_jti(&jti)
        .await
        .unwrap()
        .expect("admin session recorded");
    assert_eq!(admin_session.user_id, admin.id);
    assert_eq!(admin_session.role_id, role_id(&ctx, "KYC_ADMIN").await);
    println!("✅ Single-role admin login test PASSED");
}

#[tokio::test]
async fn test_multi_role_admin_requires_selection() {
    let ctx = create_test_service().await;
    create_admin(&ctx, "+15550000011", &["KYC_ADMIN", "SUPPORT_ADMIN"]).await;

    let outcome = ctx.auth.login(login_request("+15550000011", PASSWORD)).await.unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["requiresRoleSelection"], true);
    assert_eq!(json["availableRoles"].as_array().unwrap().len(), 2);
    assert!(json["tempToken"].is_string());
    assert!(json.get("accessToken").is_none());

    let challenge = outcome.challenge().unwrap();

    // The temp token is never an access token
    assert!(ctx.codec.verify_access(&challenge.temp_token).is_err());

    let support_id = role_id(&ctx, "SUPPORT_ADMIN").await;
    let session = ctx.auth.select_role(&challenge.temp_token, support_id).await.unwrap();
    let claims = ctx.codec.verify_access(&session.access_token).unwrap();
    assert_eq!(claims.roles, vec!["SUPPORT_ADMIN"]);
    assert!(claims.permissions.contains(&"support:respond".to_string()));
    assert!(!claims.permissions.contains(&"kyc:approve".to_string()), "scoped to the selected role only");
    assert!(claims.jti.is_some());
    println!("✅ Multi-role admin login test PASSED");
}

#[tokio::test]
async fn test_select_role_rejects_unassigned_role_and_bad_tokens() {
    let ctx = create_test_service().await;
    create_admin(&ctx, "+15550000012", &["KYC_ADMIN", "SUPPORT_ADMIN"]).await;

    let outcome = ctx.auth.login(login_request("+15550000012", PASSWORD)).await.unwrap();
    let temp_token = outcome.challenge().unwrap().temp_token.clone();

    let super_admin = role_id(&ctx, "SUPER_ADMIN").await;
    let err = ctx.auth.select_role(&temp_token, super_admin).await.unwrap_err();
    assert!(matches!(err, IdentityError::RoleNotAssigned));
    assert_eq!(err.category(), ErrorCategory::Forbidden);

    // An access token cannot stand in for the role-selection token
    let sp = ctx.auth.signup(signup_request("+15550000013", ActorKind::Sp)).await.unwrap();
    let kyc = role_id(&ctx, "KYC_ADMIN").await;
    let err = ctx.auth.select_role(&sp.access_token, kyc).await.unwrap_err();
    assert!(matches!(err, IdentityError::InvalidRoleSelectionToken));
}

#[tokio::test]
async fn test_select_role_for_non_admin_is_forbidden() {
    let ctx = create_test_service().await;
    let sp = ctx.auth.signup(signup_request("+15550000014", ActorKind::Sp)).await.unwrap();

    let temp = ctx.codec.issue_role_selection(sp.user.id).unwrap();
    let err = ctx
        .auth
        .select_role(&temp.token, role_id(&ctx, "SP_BASIC").await)
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::NotAnAdmin));
}

#[tokio::test]
async fn test_admin_without_admin_roles_cannot_log_in() {
    let ctx = create_test_service().await;
    let admin = create_admin(&ctx, "+15550000015", &["KYC_ADMIN"]).await;

    ctx.roles
        .revoke_role(&Actor::system(), admin.id, role_id(&ctx, "KYC_ADMIN").await, None)
        .await
        .unwrap();

    let err = ctx.auth.login(login_request("+15550000015", PASSWORD)).await.unwrap_err();
    assert!(matches!(err, IdentityError::NoAdminRole));

    // A refused login is not a login
    let account = ctx.auth.store().users.find_by_id(admin.id).await.unwrap().unwrap();
    assert!(account.user.last_login_at.is_none());
}

#[tokio::test]
async fn test_successful_login_stamps_last_login() {
    let ctx = create_test_service().await;
    let sp = ctx.auth.signup(signup_request("+15550000060", ActorKind::Sp)).await.unwrap();

    ctx.auth.login(login_request("+15550000060", "wrong-password")).await.unwrap_err();
    let account = ctx.auth.store().users.find_by_id(sp.user.id).await.unwrap().unwrap();
    assert!(account.user.last_login_at.is_none());

    ctx.auth.login(login_request("+15550000060", PASSWORD)).await.unwrap();
    let account = ctx.auth.store().users.find_by_id(sp.user.id).await.unwrap().unwrap();
    assert!(account.user.last_login_at.is_some());
}

#[tokio::test]
async fn test_admin_without_password_cannot_log_in() {
    let ctx = create_test_service().await;
    ctx.auth
        .create_admin(
            &Actor::system(),
            CreateAdminRequest {
                phone: "+15550000016".to_string(),
                email: None,
                password: None,
                full_name: None,
                role_names: vec!["SUPPORT_ADMIN".to_string()],
            },
        )
        .await
        .unwrap();

    let err = ctx.auth.login(login_request("+15550000016", "")).await.unwrap_err();
    assert!(matches!(err, IdentityError::InvalidCredentials));
}

#[tokio::test]
async fn test_create_admin_rejects_non_admin_roles() {
    let ctx = create_test_service().await;

    let err = ctx
        .auth
        .create_admin(
            &Actor::system(),
            CreateAdminRequest {
                phone: "+15550000017".to_string(),
                email: None,
                password: Some(PASSWORD.to_string()),
                full_name: None,
                role_names: vec!["CLIENT_ADMIN".to_string()],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::ActorKindMismatch(_)));
    assert!(ctx.auth.store().users.find_by_phone("+15550000017").await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_rotation_rejects_replay() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000020", ActorKind::Client)).await.unwrap();

    let rotated = ctx.auth.refresh(&session.refresh_token).await.expect("first refresh succeeds");

    let replay = ctx.auth.refresh(&session.refresh_token).await.unwrap_err();
    assert!(matches!(replay, IdentityError::RefreshRejected));

    let again = ctx.auth.refresh(&rotated.refresh_token).await;
    assert!(again.is_ok(), "the newly issued refresh token stays usable");

    // Claims are carried over unchanged
    let before = ctx.codec.verify_access(&session.access_token).unwrap();
    let after = ctx.codec.verify_access(&rotated.access_token).unwrap();
    assert_eq!(before.session(), after.session());
    println!("✅ Refresh rotation test PASSED");
}

#[tokio::test]
async fn test_concurrent_refresh_single_winner() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000021", ActorKind::Sp)).await.unwrap();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let auth = Arc::clone(&ctx.auth);
            let token = session.refresh_token.clone();
            tokio::spawn(async move { auth.refresh(&token).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000022", ActorKind::Sp)).await.unwrap();

    let err = ctx.auth.refresh(&session.access_token).await.unwrap_err();
    assert!(matches!(err, IdentityError::RefreshRejected));
    assert_eq!(err.category(), ErrorCategory::Unauthorized);
}

#[tokio::test]
async fn test_logout_then_refresh_fails() {
    let ctx = create_test_service().await;
    let first = ctx.auth.signup(signup_request("+15550000023", ActorKind::Client)).await.unwrap();
    let second = ctx
        .auth
        .login(login_request("+15550000023", PASSWORD))
        .await
        .unwrap()
        .session()
        .cloned()
        .unwrap();

    let summary = ctx.auth.logout(first.user.id).await.unwrap();
    assert_eq!(summary.revoked_tokens, 2, "logout revokes every live refresh token");
    assert_eq!(summary.terminated_sessions, 0);

    for token in [&first.refresh_token, &second.refresh_token] {
        let err = ctx.auth.refresh(token).await.unwrap_err();
        assert!(matches!(err, IdentityError::RefreshRejected));
    }
    println!("✅ Logout-then-refresh test PASSED");
}

#[tokio::test]
async fn test_admin_refresh_and_logout_manage_sessions() {
    let ctx = create_test_service().await;
    let admin = create_admin(&ctx, "+15550000024", &["KYC_ADMIN"]).await;

    let session = ctx
        .auth
        .login(login_request("+15550000024", PASSWORD))
        .await
        .unwrap()
        .session()
        .cloned()
        .unwrap();
    let original_jti = ctx.codec.verify_access(&session.access_token).unwrap().jti.unwrap();

    let rotated = ctx.auth.refresh(&session.refresh_token).await.unwrap();
    let rotated_jti = ctx.codec.verify_access(&rotated.access_token).unwrap().jti.unwrap();
    assert_ne!(original_jti, rotated_jti, "admin refresh opens a new session");

    let sessions = &ctx.auth.store().admin_sessions;
    assert!(sessions.find_active_by_jti(&rotated_jti).await.unwrap().is_some());

    let summary = ctx.auth.logout(admin.id).await.unwrap();
    assert_eq!(summary.terminated_sessions, 2);
    assert!(sessions.find_active_by_jti(&original_jti).await.unwrap().is_none());
    assert!(sessions.find_active_by_jti(&rotated_jti).await.unwrap().is_none());
}

#[tokio::test]
async fn test_whoami_resolves_from_storage() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000030", ActorKind::Client)).await.unwrap();
    let user_id = session.user.id;

    let member = role_id(&ctx, "CLIENT_MEMBER").await;
    ctx.roles
        .assign_role(
            &Actor::system(),
            AssignRoleRequest {
                user_id,
                role_id: member,
                tenant_id: None,
                expires_at: None,
            },
        )
        .await
        .unwrap();

    let me = ctx.auth.whoami(user_id, None).await.unwrap();
    assert_eq!(me.roles, vec!["CLIENT_ADMIN", "CLIENT_MEMBER"]);
    assert!(me.tenant_id.is_some());
    assert!(me.active_role.is_none());

    // The token issued at signup still carries the old role set
    let claims = ctx.codec.verify_access(&session.access_token).unwrap();
    assert_eq!(claims.roles, vec!["CLIENT_ADMIN"]);
}

#[tokio::test]
async fn test_whoami_for_admin_follows_session_role() {
    let ctx = create_test_service().await;
    let admin = create_admin(&ctx, "+15550000031", &["KYC_ADMIN", "SUPPORT_ADMIN"]).await;

    let outcome = ctx.auth.login(login_request("+15550000031", PASSWORD)).await.unwrap();
    let kyc = role_id(&ctx, "KYC_ADMIN").await;
    let session = ctx
        .auth
        .select_role(&outcome.challenge().unwrap().temp_token, kyc)
        .await
        .unwrap();
    let jti = ctx.codec.verify_access(&session.access_token).unwrap().jti;

    let scoped = ctx.auth.whoami(admin.id, jti.as_deref()).await.unwrap();
    assert_eq!(scoped.roles, vec!["KYC_ADMIN"]);
    assert_eq!(scoped.active_role.map(|r| r.id), Some(kyc));

    let unscoped = ctx.auth.whoami(admin.id, None).await.unwrap();
    assert_eq!(unscoped.roles, vec!["KYC_ADMIN", "SUPPORT_ADMIN"]);
}

#[tokio::test]
async fn test_soft_delete_hides_user_and_frees_phone() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000040", ActorKind::Sp)).await.unwrap();

    ctx.auth.delete_user(&Actor::system(), session.user.id, false).await.unwrap();

    let err = ctx.auth.login(login_request("+15550000040", PASSWORD)).await.unwrap_err();
    assert!(matches!(err, IdentityError::InvalidCredentials));
    assert!(matches!(
        ctx.auth.whoami(session.user.id, None).await.unwrap_err(),
        IdentityError::UserNotFound
    ));
    assert!(ctx.auth.refresh(&session.refresh_token).await.is_err());

    // Phone uniqueness only counts live users
    assert!(ctx.auth.signup(signup_request("+15550000040", ActorKind::Sp)).await.is_ok());
}

#[tokio::test]
async fn test_hard_delete_and_missing_user() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000041", ActorKind::Client)).await.unwrap();

    ctx.auth.delete_user(&Actor::system(), session.user.id, true).await.unwrap();
    let err = ctx.auth.delete_user(&Actor::system(), session.user.id, true).await.unwrap_err();
    assert!(matches!(err, IdentityError::UserNotFound));

    let err = ctx
        .auth
        .update_user_status(&Actor::system(), Uuid::new_v4(), UserStatus::Banned)
        .await
        .unwrap_err();
    assert!(matches!(err, IdentityError::UserNotFound));
}

#[tokio::test]
async fn test_privileged_operations_are_audited() {
    let ctx = create_test_service().await;
    let session = ctx.auth.signup(signup_request("+15550000050", ActorKind::Sp)).await.unwrap();
    ctx.auth.login(login_request("+15550000050", PASSWORD)).await.unwrap();

    let operator = Actor::user(Uuid::new_v4()).with_role("SUPER_ADMIN");
    ctx.auth
        .update_user_status(&operator, session.user.id, UserStatus::Suspended)
        .await
        .unwrap();

    let actions = ctx.audit.actions();
    for expected in ["user.signup", "user.login", "user.status_changed"] {
        assert!(actions.contains(&expected.to_string()), "missing audit action {expected}");
    }

    let status_event = ctx
        .audit
        .events()
        .into_iter()
        .find(|e| e.action == "user.status_changed")
        .unwrap();
    assert_eq!(status_event.actor_user_id, operator.user_id);
    assert_eq!(status_event.actor_role.as_deref(), Some("SUPER_ADMIN"));
    assert_eq!(status_event.target_id, Some(session.user.id.to_string()));
}
