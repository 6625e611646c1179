//! Domain models for identities, profiles, roles and session ledgers
//!
//! Row models derive `sqlx::FromRow` and map 1:1 onto the tables created by
//! `database-layer/migrations`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Names of the roles every deployment relies on
pub mod role_names {
    /// Distinguished top-level administrator role; bypasses permission checks
    pub const SUPER_ADMIN: &str = "SUPER_ADMIN";
    pub const KYC_ADMIN: &str = "KYC_ADMIN";
    pub const SUPPORT_ADMIN: &str = "SUPPORT_ADMIN";
    /// Granted to the user who creates a tenant through signup
    pub const CLIENT_ADMIN: &str = "CLIENT_ADMIN";
    pub const CLIENT_MEMBER: &str = "CLIENT_MEMBER";
    /// Granted to every service provider on signup
    pub const SP_BASIC: &str = "SP_BASIC";
}

// =============================================================================
// ENUMS
// =============================================================================

/// The three-way partition of identities. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ActorKind {
    Client,
    Sp,
    Admin,
}

impl ActorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Sp => "SP",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CLIENT" => Ok(Self::Client),
            "SP" => Ok(Self::Sp),
            "ADMIN" => Ok(Self::Admin),
            other => Err(format!("unknown actor kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Suspended,
    Banned,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Banned => "BANNED",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "SUSPENDED" => Ok(Self::Suspended),
            "BANNED" => Ok(Self::Banned),
            other => Err(format!("unknown user status '{other}'")),
        }
    }
}

// =============================================================================
// USER & PROFILES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub phone: String,
    pub email: Option<String>,
    /// Never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub user_type: ActorKind,
    pub status: UserStatus,
    pub phone_verified: bool,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(phone: impl Into<String>, email: Option<String>, user_type: ActorKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone: phone.into(),
            email,
            password_hash: None,
            user_type,
            status: UserStatus::Active,
            phone_verified: false,
            email_verified: false,
            last_login_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_password_hash(mut self, hash: String) -> Self {
        self.password_hash = Some(hash);
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Label used for in-tenant team checks; unrelated to global roles
pub const TENANT_OWNER: &str = "OWNER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClientProfile {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub full_name: Option<String>,
    pub tenant_role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SpProfile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    /// Denormalized pointer to the most recently selected role
    pub active_role_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Actor-specific extension, exactly one per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Profile {
    Client(ClientProfile),
    Sp(SpProfile),
    Admin(AdminProfile),
}

impl Profile {
    pub fn user_id(&self) -> Uuid {
        match self {
            Self::Client(p) => p.user_id,
            Self::Sp(p) => p.user_id,
            Self::Admin(p) => p.user_id,
        }
    }

    pub fn actor_kind(&self) -> ActorKind {
        match self {
            Self::Client(_) => ActorKind::Client,
            Self::Sp(_) => ActorKind::Sp,
            Self::Admin(_) => ActorKind::Admin,
        }
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            Self::Client(p) => Some(p.tenant_id),
            _ => None,
        }
    }
}

// =============================================================================
// ROLES & PERMISSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub actor_kind: ActorKind,
    pub is_system: bool,
    pub is_active: bool,
    /// Organizational parent, display only. Never walked for permissions.
    pub parent_id: Option<Uuid>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, actor_kind: ActorKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            display_name: display_name.into(),
            description: None,
            actor_kind,
            is_system: false,
            is_active: true,
            parent_id: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> RoleSummary {
        RoleSummary {
            id: self.id,
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
        }
    }
}

/// What a multi-role administrator picks from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSummary {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGroup {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub display_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: Uuid,
    pub key: String,
    pub description: Option<String>,
    pub group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(key: impl Into<String>, group_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            description: None,
            group_id,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub granted_by: Option<Uuid>,
    pub granted_at: DateTime<Utc>,
}

/// Assignment of a role to a user. Revocation flips `is_active`; rows are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub assigned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRole {
    pub fn new(user_id: Uuid, role_id: Uuid, tenant_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            role_id,
            tenant_id,
            is_active: true,
            expires_at: None,
            assigned_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active and not past its expiry
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |at| at > now)
    }
}

/// An effective assignment resolved together with its role and that role's direct permissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub assignment: UserRole,
    pub role: Role,
    pub permissions: Vec<String>,
}

// =============================================================================
// ACCOUNT AGGREGATE
// =============================================================================

/// A user with its profile and effective role assignments, as loaded for authentication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub user: User,
    pub profile: Option<Profile>,
    pub assignments: Vec<RoleAssignment>,
}

impl UserAccount {
    pub fn tenant_id(&self) -> Option<Uuid> {
        self.profile.as_ref().and_then(Profile::tenant_id)
    }

    /// Role names across all assignments, deduplicated and sorted
    pub fn role_names(&self) -> Vec<String> {
        self.assignments
            .iter()
            .map(|a| a.role.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Union of direct permissions across all assignments
    pub fn permission_union(&self) -> Vec<String> {
        union_permissions(self.assignments.iter())
    }

    /// Assignments whose role is meant for administrators
    pub fn admin_assignments(&self) -> Vec<&RoleAssignment> {
        self.assignments
            .iter()
            .filter(|a| a.role.actor_kind == ActorKind::Admin)
            .collect()
    }
}

pub(crate) fn union_permissions<'a>(assignments: impl Iterator<Item = &'a RoleAssignment>) -> Vec<String> {
    assignments
        .flat_map(|a| a.permissions.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// =============================================================================
// TOKEN LEDGERS
// =============================================================================

/// Ledger row for an issued refresh token. Only the digest is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn new(user_id: Uuid, token_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash,
            expires_at,
            revoked_at: None,
            replaced_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Server-side record binding an administrator's access token `jti` to the role it was issued for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AdminSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdminSession {
    pub fn new(user_id: Uuid, role_id: Uuid, jti: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            role_id,
            jti,
            expires_at,
            terminated_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.terminated_at.is_none() && self.expires_at > now
    }
}

// =============================================================================
// REQUESTS & RESPONSES
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub phone: String,
    pub email: Option<String>,
    pub password: String,
    pub user_type: ActorKind,
    pub full_name: Option<String>,
    /// Tenant name for client signups; defaults to the full name or phone
    pub company_name: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    pub phone: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub role_names: Vec<String>,
}

/// A fully authenticated session handed back to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// Continuation for an administrator holding more than one role
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSelectionChallenge {
    pub requires_role_selection: bool,
    pub available_roles: Vec<RoleSummary>,
    pub temp_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LoginOutcome {
    Authenticated(AuthSession),
    RoleSelectionRequired(RoleSelectionChallenge),
}

impl LoginOutcome {
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::RoleSelectionRequired(_) => None,
        }
    }

    pub fn challenge(&self) -> Option<&RoleSelectionChallenge> {
        match self {
            Self::Authenticated(_) => None,
            Self::RoleSelectionRequired(challenge) => Some(challenge),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Fresh view of the caller resolved from storage
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmI {
    pub user: User,
    pub profile: Option<Profile>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub tenant_id: Option<Uuid>,
    pub active_role: Option<RoleSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutSummary {
    pub revoked_tokens: u64,
    pub terminated_sessions: u64,
}

/// Who performed a privileged operation, for audit attribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub role: Option<String>,
    pub ip_address: Option<String>,
}

impl Actor {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            role: None,
            ip_address: None,
        }
    }

    /// Operator tooling acting outside any user session
    pub fn system() -> Self {
        Self {
            user_id: None,
            role: Some("SYSTEM".to_string()),
            ip_address: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}
