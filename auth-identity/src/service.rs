//! Session orchestration: signup, login, administrator role selection,
//! refresh rotation, logout and the fresh "who am I" view.

use chrono::Utc;
use database_layer::{AuditSink, DatabaseError};
use logger_redacted::redact_phone;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::IdentityConfig;
use crate::error::{IdentityError, Result};
use crate::models::*;
use crate::password::PasswordHasher;
use crate::rbac::audit_event;
use crate::repository::{AccountTransaction, IdentityStore};
use crate::tokens::{hash_token, SessionClaims, TokenCodec};

pub struct AuthService {
    store: IdentityStore,
    codec: Arc<TokenCodec>,
    hasher: PasswordHasher,
    audit: Arc<dyn AuditSink>,
}

impl AuthService {
    pub fn new(store: IdentityStore, config: &IdentityConfig, audit: Arc<dyn AuditSink>) -> Result<Self> {
        Ok(Self {
            store,
            codec: Arc::new(TokenCodec::new(&config.tokens)?),
            hasher: PasswordHasher::new(config.bcrypt_cost),
            audit,
        })
    }

    /// Shared codec, for request-time authentication
    pub fn token_codec(&self) -> Arc<TokenCodec> {
        Arc::clone(&self.codec)
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    // =========================================================================
    // SIGNUP & LOGIN
    // =========================================================================

    /// Self-service registration for clients and service providers
    pub async fn signup(&self, request: SignupRequest) -> Result<AuthSession> {
        if request.user_type == ActorKind::Admin {
            warn!("Rejected administrator self-signup");
            return Err(IdentityError::AdminSignupForbidden);
        }
        if request.phone.trim().is_empty() {
            return Err(IdentityError::Validation("phone is required".to_string()));
        }
        if request.password.is_empty() {
            return Err(IdentityError::Validation("password is required".to_string()));
        }

        if self.store.users.phone_exists(&request.phone).await? {
            return Err(IdentityError::PhoneTaken);
        }

        let default_role = match request.user_type {
            ActorKind::Client => role_names::CLIENT_ADMIN,
            _ => role_names::SP_BASIC,
        };
        let role = self
            .store
            .roles
            .find_role_by_name(default_role)
            .await?
            .ok_or_else(|| IdentityError::MissingDefaultRole(default_role.to_string()))?;

        let password_hash = self.hasher.hash(&request.password).await?;
        let user = User::new(request.phone.clone(), request.email.clone(), request.user_type)
            .with_password_hash(password_hash);

        let mut tx = self.store.users.begin().await?;
        let written = write_signup(tx.as_mut(), &user, &role, &request).await;
        finish(tx, written).await?;

        info!(user_id = %user.id, user_type = %user.user_type, phone = %redact_phone(&user.phone), "User signed up");

        let account = self.load_account(user.id).await?;
        let session = self.full_session(&account).await?;

        let mut event = audit_event(&Actor::user(user.id), "user.signup")
            .target("user", user.id)
            .metadata(json!({ "userType": user.user_type, "role": role.name }));
        event.ip_address = request.ip_address;
        self.audit.record(event);

        Ok(session)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome> {
        let Some(account) = self.store.users.find_by_phone(&request.phone).await? else {
            warn!(phone = %redact_phone(&request.phone), "Login failed: unknown phone");
            return Err(IdentityError::InvalidCredentials);
        };
        let Some(digest) = account.user.password_hash.as_deref() else {
            warn!(user_id = %account.user.id, "Login failed: no credentials set");
            return Err(IdentityError::InvalidCredentials);
        };

        match account.user.status {
            UserStatus::Banned => return Err(IdentityError::AccountBanned),
            UserStatus::Suspended => return Err(IdentityError::AccountSuspended),
            UserStatus::Active => {}
        }

        if !self.hasher.verify(&request.password, digest).await? {
            warn!(user_id = %account.user.id, "Login failed: wrong password");
            return Err(IdentityError::InvalidCredentials);
        }

        let outcome = if account.user.user_type == ActorKind::Admin {
            self.admin_login(&account).await?
        } else {
            LoginOutcome::Authenticated(self.full_session(&account).await?)
        };
        self.store.users.update_last_login(account.user.id, Utc::now()).await?;

        info!(
            user_id = %account.user.id,
            user_type = %account.user.user_type,
            role_selection = outcome.challenge().is_some(),
            "User logged in"
        );
        let mut event = audit_event(&Actor::user(account.user.id), "user.login").target("user", account.user.id);
        event.ip_address = request.ip_address;
        self.audit.record(event);

        Ok(outcome)
    }

    async fn admin_login(&self, account: &UserAccount) -> Result<LoginOutcome> {
        let admin_roles = account.admin_assignments();

        match admin_roles.as_slice() {
            [] => {
                warn!(user_id = %account.user.id, "Administrator has no active admin role");
                Err(IdentityError::NoAdminRole)
            }
            [only] => Ok(LoginOutcome::Authenticated(self.admin_session(account, only).await?)),
            several => {
                let temp = self.codec.issue_role_selection(account.user.id)?;
                debug!(user_id = %account.user.id, candidates = several.len(), "Role selection required");

                Ok(LoginOutcome::RoleSelectionRequired(RoleSelectionChallenge {
                    requires_role_selection: true,
                    available_roles: several.iter().map(|a| a.role.summary()).collect(),
                    temp_token: temp.token,
                }))
            }
        }
    }

    /// Complete the multi-role administrator login
    pub async fn select_role(&self, temp_token: &str, role_id: Uuid) -> Result<AuthSession> {
        let claims = self.codec.verify_role_selection(temp_token)?;

        let account = self
            .store
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(IdentityError::InvalidRoleSelectionToken)?;

        if account.user.user_type != ActorKind::Admin {
            return Err(IdentityError::NotAnAdmin);
        }
        match account.user.status {
            UserStatus::Banned => return Err(IdentityError::AccountBanned),
            UserStatus::Suspended => return Err(IdentityError::AccountSuspended),
            UserStatus::Active => {}
        }

        let assignment = account
            .admin_assignments()
            .into_iter()
            .find(|a| a.role.id == role_id)
            .ok_or(IdentityError::RoleNotAssigned)?;

        let session = self.admin_session(&account, assignment).await?;

        info!(user_id = %account.user.id, role = %assignment.role.name, "Administrator selected role");
        self.audit.record(
            audit_event(&Actor::user(account.user.id).with_role(assignment.role.name.clone()), "admin.role_selected")
                .target("role", role_id),
        );
        Ok(session)
    }

    // =========================================================================
    // TOKEN LIFECYCLE
    // =========================================================================

    /// Exchange a refresh token for a new pair. The presented token is
    /// revoked in the same step; its claims carry over unchanged.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.codec.verify_refresh(refresh_token)?;

        let record = self
            .store
            .refresh_tokens
            .find_active(&hash_token(refresh_token))
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "Refresh token not in ledger or revoked");
                IdentityError::RefreshRejected
            })?;

        if !record.is_usable(Utc::now()) || record.user_id != claims.sub {
            return Err(IdentityError::RefreshRejected);
        }

        let session = claims.session();

        // Administrators carry exactly the role their session was opened for
        let admin_role = if session.user_type == ActorKind::Admin {
            let name = session.roles.first().ok_or(IdentityError::RefreshRejected)?;
            let role = self
                .store
                .roles
                .find_role_by_name(name)
                .await?
                .ok_or(IdentityError::RefreshRejected)?;
            Some(role)
        } else {
            None
        };

        let refresh = self.codec.issue_refresh(&session)?;
        let replacement = RefreshTokenRecord::new(session.sub, hash_token(&refresh.token), refresh.expires_at);

        if !self.store.refresh_tokens.rotate(record.id, &replacement).await? {
            warn!(user_id = %session.sub, "Refresh token replayed");
            return Err(IdentityError::RefreshRejected);
        }

        let access = match admin_role {
            Some(role) => {
                let jti = Uuid::new_v4().to_string();
                let access = self.codec.issue_access(&session, Some(jti.clone()))?;
                self.store
                    .admin_sessions
                    .create(&AdminSession::new(session.sub, role.id, jti, access.expires_at))
                    .await?;
                access
            }
            None => self.codec.issue_access(&session, None)?,
        };

        debug!(user_id = %session.sub, "Token pair rotated");
        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Revoke every refresh token of the user and end any administrator sessions
    pub async fn logout(&self, user_id: Uuid) -> Result<LogoutSummary> {
        let revoked_tokens = self.store.refresh_tokens.revoke_all(user_id).await?;

        let is_admin = self
            .store
            .users
            .find_by_id(user_id)
            .await?
            .map_or(true, |account| account.user.user_type == ActorKind::Admin);
        let terminated_sessions = if is_admin {
            self.store.admin_sessions.terminate_all(user_id).await?
        } else {
            0
        };

        info!(user_id = %user_id, revoked_tokens, terminated_sessions, "User logged out");
        self.audit.record(audit_event(&Actor::user(user_id), "user.logout").target("user", user_id));

        Ok(LogoutSummary {
            revoked_tokens,
            terminated_sessions,
        })
    }

    /// Resolve the caller from storage, ignoring whatever the token claims say.
    ///
    /// For administrators `jti` selects the role of the live session; without
    /// one every admin role held is reported.
    pub async fn whoami(&self, user_id: Uuid, jti: Option<&str>) -> Result<WhoAmI> {
        let account = self.load_account(user_id).await?;

        if account.user.user_type != ActorKind::Admin {
            return Ok(WhoAmI {
                roles: account.role_names(),
                permissions: account.permission_union(),
                tenant_id: account.tenant_id(),
                user: account.user,
                profile: account.profile,
                active_role: None,
            });
        }

        let session_role = match jti {
            Some(jti) => self
                .store
                .admin_sessions
                .find_active_by_jti(jti)
                .await?
                .filter(|s| s.user_id == user_id && s.is_live(Utc::now()))
                .map(|s| s.role_id),
            None => None,
        };

        let admin_roles = account.admin_assignments();
        let scoped: Vec<&RoleAssignment> = match session_role {
            Some(role_id) => admin_roles.iter().copied().filter(|a| a.role.id == role_id).collect(),
            None => admin_roles,
        };

        let pointer = session_role.or_else(|| match &account.profile {
            Some(Profile::Admin(p)) => p.active_role_id,
            _ => None,
        });
        let active_role = pointer.and_then(|id| scoped.iter().find(|a| a.role.id == id).map(|a| a.role.summary()));

        let mut roles: Vec<String> = scoped.iter().map(|a| a.role.name.clone()).collect();
        roles.sort();
        roles.dedup();
        let permissions = union_permissions(scoped.iter().copied());

        Ok(WhoAmI {
            roles,
            permissions,
            tenant_id: None,
            user: account.user,
            profile: account.profile,
            active_role,
        })
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Create an administrator with one or more admin roles. The first role
    /// becomes the profile's active role.
    pub async fn create_admin(&self, actor: &Actor, request: CreateAdminRequest) -> Result<User> {
        if request.role_names.is_empty() {
            return Err(IdentityError::Validation("at least one role is required".to_string()));
        }
        if self.store.users.phone_exists(&request.phone).await? {
            return Err(IdentityError::PhoneTaken);
        }

        let mut roles = Vec::with_capacity(request.role_names.len());
        for name in &request.role_names {
            let role = self
                .store
                .roles
                .find_role_by_name(name)
                .await?
                .ok_or_else(|| IdentityError::RoleNotFound(name.clone()))?;
            if role.actor_kind != ActorKind::Admin {
                return Err(IdentityError::ActorKindMismatch(format!(
                    "role '{}' is for {} users",
                    role.name, role.actor_kind
                )));
            }
            if !roles.iter().any(|r: &Role| r.id == role.id) {
                roles.push(role);
            }
        }

        let mut user = User::new(request.phone.clone(), request.email.clone(), ActorKind::Admin);
        if let Some(password) = request.password.as_deref() {
            user = user.with_password_hash(self.hasher.hash(password).await?);
        }

        let mut tx = self.store.users.begin().await?;
        let written = write_admin(tx.as_mut(), &user, &roles, request.full_name.clone(), actor.user_id).await;
        finish(tx, written).await?;

        let role_list: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
        info!(user_id = %user.id, roles = ?role_list, "Administrator created");
        self.audit.record(
            audit_event(actor, "admin.created")
                .target("user", user.id)
                .metadata(json!({ "roles": role_list })),
        );

        Ok(user)
    }

    /// Change lifecycle status. Leaving ACTIVE ends every session of the user.
    pub async fn update_user_status(&self, actor: &Actor, user_id: Uuid, status: UserStatus) -> Result<LogoutSummary> {
        self.store
            .users
            .update_status(user_id, status)
            .await
            .map_err(user_not_found)?;

        let summary = if status == UserStatus::Active {
            LogoutSummary {
                revoked_tokens: 0,
                terminated_sessions: 0,
            }
        } else {
            LogoutSummary {
                revoked_tokens: self.store.refresh_tokens.revoke_all(user_id).await?,
                terminated_sessions: self.store.admin_sessions.terminate_all(user_id).await?,
            }
        };

        info!(user_id = %user_id, status = %status, "User status changed");
        self.audit.record(
            audit_event(actor, "user.status_changed")
                .target("user", user_id)
                .metadata(json!({ "status": status })),
        );
        Ok(summary)
    }

    /// Soft delete hides the user from every lookup and frees the phone for
    /// reuse. Hard delete removes the user with all owned records.
    pub async fn delete_user(&self, actor: &Actor, user_id: Uuid, hard: bool) -> Result<()> {
        if hard {
            self.store.users.hard_delete(user_id).await.map_err(user_not_found)?;
        } else {
            self.store.users.soft_delete(user_id).await.map_err(user_not_found)?;
            self.store.refresh_tokens.revoke_all(user_id).await?;
            self.store.admin_sessions.terminate_all(user_id).await?;
        }

        self.audit.record(
            audit_event(actor, "user.deleted")
                .target("user", user_id)
                .metadata(json!({ "hard": hard })),
        );
        Ok(())
    }

    // =========================================================================
    // ISSUANCE
    // =========================================================================

    async fn load_account(&self, user_id: Uuid) -> Result<UserAccount> {
        self.store
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    /// Client and service provider session over the union of every active role
    async fn full_session(&self, account: &UserAccount) -> Result<AuthSession> {
        let claims = SessionClaims {
            sub: account.user.id,
            user_type: account.user.user_type,
            roles: account.role_names(),
            permissions: account.permission_union(),
            tenant_id: account.tenant_id(),
        };
        let pair = self.issue_pair(&claims, None).await?;

        Ok(AuthSession {
            user: account.user.clone(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }

    /// Administrator session scoped to exactly one role, bound to an AdminSession
    async fn admin_session(&self, account: &UserAccount, assignment: &RoleAssignment) -> Result<AuthSession> {
        let claims = SessionClaims {
            sub: account.user.id,
            user_type: ActorKind::Admin,
            roles: vec![assignment.role.name.clone()],
            permissions: union_permissions(std::iter::once(assignment)),
            tenant_id: None,
        };
        let jti = Uuid::new_v4().to_string();
        let pair = self.issue_pair(&claims, Some(jti.clone())).await?;

        let expires_at = self.codec.access_expires_at(Utc::now())?;
        self.store
            .admin_sessions
            .create(&AdminSession::new(account.user.id, assignment.role.id, jti, expires_at))
            .await?;
        self.store
            .users
            .set_active_role(account.user.id, assignment.role.id)
            .await?;

        Ok(AuthSession {
            user: account.user.clone(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        })
    }

    /// Sign both tokens and record the refresh token in the ledger
    async fn issue_pair(&self, claims: &SessionClaims, jti: Option<String>) -> Result<TokenPair> {
        let access = self.codec.issue_access(claims, jti)?;
        let refresh = self.codec.issue_refresh(claims)?;

        self.store
            .refresh_tokens
            .create(&RefreshTokenRecord::new(claims.sub, hash_token(&refresh.token), refresh.expires_at))
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }
}

// =============================================================================
// UNIT OF WORK
// =============================================================================

async fn write_signup(
    tx: &mut dyn AccountTransaction,
    user: &User,
    role: &Role,
    request: &SignupRequest,
) -> Result<()> {
    tx.insert_user(user).await?;

    let now = Utc::now();
    let tenant_id = match user.user_type {
        ActorKind::Client => {
            let name = request
                .company_name
                .clone()
                .or_else(|| request.full_name.clone())
                .unwrap_or_else(|| user.phone.clone());
            let tenant = Tenant::new(name);
            tx.insert_tenant(&tenant).await?;
            tx.insert_profile(&Profile::Client(ClientProfile {
                user_id: user.id,
                tenant_id: tenant.id,
                full_name: request.full_name.clone(),
                tenant_role: TENANT_OWNER.to_string(),
                created_at: now,
            }))
            .await?;
            Some(tenant.id)
        }
        _ => {
            tx.insert_profile(&Profile::Sp(SpProfile {
                user_id: user.id,
                full_name: request.full_name.clone(),
                created_at: now,
            }))
            .await?;
            None
        }
    };

    tx.insert_user_role(&UserRole::new(user.id, role.id, tenant_id)).await?;
    Ok(())
}

async fn write_admin(
    tx: &mut dyn AccountTransaction,
    user: &User,
    roles: &[Role],
    full_name: Option<String>,
    assigned_by: Option<Uuid>,
) -> Result<()> {
    tx.insert_user(user).await?;
    tx.insert_profile(&Profile::Admin(AdminProfile {
        user_id: user.id,
        full_name,
        active_role_id: roles.first().map(|r| r.id),
        created_at: Utc::now(),
    }))
    .await?;

    for role in roles {
        let mut assignment = UserRole::new(user.id, role.id, None);
        assignment.assigned_by = assigned_by;
        tx.insert_user_role(&assignment).await?;
    }
    Ok(())
}

/// Commit when every write succeeded, otherwise roll back and surface the write error
async fn finish(tx: Box<dyn AccountTransaction>, written: Result<()>) -> Result<()> {
    match written {
        Ok(()) => Ok(tx.commit().await?),
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                error!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

fn user_not_found(err: DatabaseError) -> IdentityError {
    match err {
        DatabaseError::NotFound(_) => IdentityError::UserNotFound,
        other => other.into(),
    }
}
