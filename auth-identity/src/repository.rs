use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database_layer::{DatabasePool, DatabaseResult};
use std::sync::Arc;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryBackend;
pub use postgres::{
    PostgresAdminSessionRepository, PostgresRefreshTokenRepository, PostgresRoleRepository,
    PostgresUserRepository,
};

/// Credential store: users, their profiles and account creation
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Non-deleted user by phone, with profile and effective role assignments
    async fn find_by_phone(&self, phone: &str) -> DatabaseResult<Option<UserAccount>>;

    /// Non-deleted user by id, with profile and effective role assignments
    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<UserAccount>>;

    /// Whether a non-deleted user holds this phone
    async fn phone_exists(&self, phone: &str) -> DatabaseResult<bool>;

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()>;

    /// Fails with `NotFound` when no live user has this id
    async fn update_status(&self, id: Uuid, status: UserStatus) -> DatabaseResult<()>;

    /// Point an administrator profile at the role selected for the current session
    async fn set_active_role(&self, user_id: Uuid, role_id: Uuid) -> DatabaseResult<()>;

    /// Timestamp the user as deleted; it disappears from every lookup
    async fn soft_delete(&self, id: Uuid) -> DatabaseResult<()>;

    /// Remove the user and every owned record
    async fn hard_delete(&self, id: Uuid) -> DatabaseResult<()>;

    /// Open a unit of work for multi-row account creation
    async fn begin(&self) -> DatabaseResult<Box<dyn AccountTransaction>>;
}

/// All-or-nothing account creation. Dropping without `commit` discards every write.
#[async_trait]
pub trait AccountTransaction: Send {
    async fn insert_user(&mut self, user: &User) -> DatabaseResult<()>;
    async fn insert_tenant(&mut self, tenant: &Tenant) -> DatabaseResult<()>;
    async fn insert_profile(&mut self, profile: &Profile) -> DatabaseResult<()>;
    async fn insert_user_role(&mut self, assignment: &UserRole) -> DatabaseResult<()>;
    async fn commit(self: Box<Self>) -> DatabaseResult<()>;
    async fn rollback(self: Box<Self>) -> DatabaseResult<()>;
}

/// Role & permission graph
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create_role(&self, role: &Role) -> DatabaseResult<()>;
    async fn update_role(&self, role: &Role) -> DatabaseResult<()>;
    async fn find_role(&self, id: Uuid) -> DatabaseResult<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> DatabaseResult<Option<Role>>;
    async fn list_roles(&self, actor_kind: Option<ActorKind>) -> DatabaseResult<Vec<Role>>;
    async fn soft_delete_role(&self, id: Uuid) -> DatabaseResult<()>;
    async fn count_active_assignments(&self, role_id: Uuid) -> DatabaseResult<u64>;

    async fn create_group(&self, group: &PermissionGroup) -> DatabaseResult<()>;
    async fn find_group(&self, id: Uuid) -> DatabaseResult<Option<PermissionGroup>>;
    async fn find_group_by_name(&self, name: &str) -> DatabaseResult<Option<PermissionGroup>>;
    async fn list_groups(&self) -> DatabaseResult<Vec<PermissionGroup>>;

    async fn create_permission(&self, permission: &Permission) -> DatabaseResult<()>;
    async fn find_permissions(&self, ids: &[Uuid]) -> DatabaseResult<Vec<Permission>>;
    async fn find_permission_by_key(&self, key: &str) -> DatabaseResult<Option<Permission>>;
    async fn list_permissions(&self) -> DatabaseResult<Vec<Permission>>;

    /// Permissions joined directly to the role
    async fn role_permissions(&self, role_id: Uuid) -> DatabaseResult<Vec<Permission>>;

    /// Grant permissions, skipping existing grants. Returns the number newly granted.
    async fn grant_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
        granted_by: Option<Uuid>,
    ) -> DatabaseResult<u64>;

    /// Returns the number of grants removed
    async fn revoke_permissions(&self, role_id: Uuid, permission_ids: &[Uuid]) -> DatabaseResult<u64>;

    async fn find_active_assignment(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Option<Uuid>,
    ) -> DatabaseResult<Option<UserRole>>;

    async fn insert_assignment(&self, assignment: &UserRole) -> DatabaseResult<()>;

    async fn deactivate_assignment(&self, assignment_id: Uuid) -> DatabaseResult<()>;
}

/// Refresh token ledger
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn create(&self, record: &RefreshTokenRecord) -> DatabaseResult<()>;

    /// Non-revoked row with this hash. Expiry is checked by the caller.
    async fn find_active(&self, token_hash: &str) -> DatabaseResult<Option<RefreshTokenRecord>>;

    async fn revoke(&self, id: Uuid) -> DatabaseResult<()>;

    /// Revoke every live token of a user, returning how many were revoked
    async fn revoke_all(&self, user_id: Uuid) -> DatabaseResult<u64>;

    /// Revoke `old_id` and insert `replacement` as one step. Returns `false`
    /// without inserting when `old_id` was already revoked.
    async fn rotate(&self, old_id: Uuid, replacement: &RefreshTokenRecord) -> DatabaseResult<bool>;

    /// Delete rows that expired before `before`
    async fn purge_expired(&self, before: DateTime<Utc>) -> DatabaseResult<u64>;
}

/// Administrator session side-records
#[async_trait]
pub trait AdminSessionRepository: Send + Sync {
    async fn create(&self, session: &AdminSession) -> DatabaseResult<()>;

    /// Non-terminated session bound to this token id. Expiry is checked by the caller.
    async fn find_active_by_jti(&self, jti: &str) -> DatabaseResult<Option<AdminSession>>;

    async fn terminate_all(&self, user_id: Uuid) -> DatabaseResult<u64>;
}

/// Handle to every repository the identity services need.
///
/// Constructed once at startup and passed into each service explicitly.
#[derive(Clone)]
pub struct IdentityStore {
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub admin_sessions: Arc<dyn AdminSessionRepository>,
}

impl IdentityStore {
    pub fn new(
        users: Arc<dyn UserRepository>,
        roles: Arc<dyn RoleRepository>,
        refresh_tokens: Arc<dyn RefreshTokenRepository>,
        admin_sessions: Arc<dyn AdminSessionRepository>,
    ) -> Self {
        Self {
            users,
            roles,
            refresh_tokens,
            admin_sessions,
        }
    }

    /// Process-local store for development and tests
    pub fn in_memory() -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        Self::new(backend.clone(), backend.clone(), backend.clone(), backend)
    }

    pub fn postgres(pool: &DatabasePool) -> Self {
        let pool = pool.pool().clone();
        Self::new(
            Arc::new(PostgresUserRepository::new(pool.clone())),
            Arc::new(PostgresRoleRepository::new(pool.clone())),
            Arc::new(PostgresRefreshTokenRepository::new(pool.clone())),
            Arc::new(PostgresAdminSessionRepository::new(pool)),
        )
    }
}
