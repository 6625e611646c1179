//! PostgreSQL-backed identity repositories
//!
//! Queries target the schema in `database-layer/migrations`. Uniqueness rules
//! (live phone, live role name, one active assignment per triple) are enforced
//! by partial unique indexes and surface as `DatabaseError::Conflict`.

use super::{
    AccountTransaction, AdminSessionRepository, RefreshTokenRepository, RoleRepository,
    UserRepository,
};
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database_layer::{DatabaseError, DatabasePool, DatabaseResult, PgTransaction, TransactionManager};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

fn db_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DatabaseError {
    move |e| DatabaseError::from_sqlx(e, operation)
}

const USER_COLUMNS: &str = "id, phone, email, password_hash, user_type, status, phone_verified, \
     email_verified, last_login_at, deleted_at, created_at, updated_at";

const ROLE_COLUMNS: &str = "id, name, display_name, description, actor_kind, is_system, is_active, \
     parent_id, deleted_at, created_at, updated_at";

/// Load profile and effective assignments for a user row
async fn load_account(pool: &PgPool, user: User) -> DatabaseResult<UserAccount> {
    let profile = load_profile(pool, &user).await?;
    let assignments = load_assignments(pool, user.id).await?;
    Ok(UserAccount {
        user,
        profile,
        assignments,
    })
}

async fn load_profile(pool: &PgPool, user: &User) -> DatabaseResult<Option<Profile>> {
    let profile = match user.user_type {
        ActorKind::Client => sqlx::query_as::<_, ClientProfile>(
            "SELECT user_id, tenant_id, full_name, tenant_role, created_at FROM client_profiles WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(pool)
        .await
        .map_err(db_err("load client profile"))?
        .map(Profile::Client),
        ActorKind::Sp => sqlx::query_as::<_, SpProfile>(
            "SELECT user_id, full_name, created_at FROM sp_profiles WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(pool)
        .await
        .map_err(db_err("load sp profile"))?
        .map(Profile::Sp),
        ActorKind::Admin => sqlx::query_as::<_, AdminProfile>(
            "SELECT user_id, full_name, active_role_id, created_at FROM admin_profiles WHERE user_id = $1",
        )
        .bind(user.id)
        .fetch_optional(pool)
        .await
        .map_err(db_err("load admin profile"))?
        .map(Profile::Admin),
    };
    Ok(profile)
}

async fn load_assignments(pool: &PgPool, user_id: Uuid) -> DatabaseResult<Vec<RoleAssignment>> {
    let assignments = sqlx::query_as::<_, UserRole>(
        r"
        SELECT id, user_id, role_id, tenant_id, is_active, expires_at, assigned_by, created_at, updated_at
        FROM user_roles
        WHERE user_id = $1 AND is_active AND (expires_at IS NULL OR expires_at > NOW())
        ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(db_err("load user roles"))?;

    if assignments.is_empty() {
        return Ok(Vec::new());
    }

    let role_ids: Vec<Uuid> = assignments.iter().map(|a| a.role_id).collect();
    let roles: HashMap<Uuid, Role> = sqlx::query_as::<_, Role>(&format!(
        "SELECT {ROLE_COLUMNS} FROM roles WHERE id = ANY($1) AND deleted_at IS NULL AND is_active"
    ))
    .bind(&role_ids)
    .fetch_all(pool)
    .await
    .map_err(db_err("load assigned roles"))?
    .into_iter()
    .map(|r| (r.id, r))
    .collect();

    let mut keys: HashMap<Uuid, Vec<String>> = HashMap::new();
    let rows = sqlx::query(
        r"
        SELECT rp.role_id, p.key
        FROM role_permissions rp
        JOIN permissions p ON p.id = rp.permission_id
        WHERE rp.role_id = ANY($1)
        ORDER BY p.key
        ",
    )
    .bind(&role_ids)
    .fetch_all(pool)
    .await
    .map_err(db_err("load role permissions"))?;

    for row in rows {
        let role_id: Uuid = row.try_get("role_id").map_err(db_err("decode role permission"))?;
        let key: String = row.try_get("key").map_err(db_err("decode role permission"))?;
        keys.entry(role_id).or_default().push(key);
    }

    let mut resolved: Vec<RoleAssignment> = assignments
        .into_iter()
        .filter_map(|assignment| {
            let role = roles.get(&assignment.role_id)?.clone();
            let permissions = keys.get(&role.id).cloned().unwrap_or_default();
            Some(RoleAssignment {
                assignment,
                role,
                permissions,
            })
        })
        .collect();
    resolved.sort_by(|a, b| a.role.name.cmp(&b.role.name));
    Ok(resolved)
}

// =============================================================================
// USERS
// =============================================================================

pub struct PostgresUserRepository {
    pool: PgPool,
    transactions: TransactionManager,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        let transactions = TransactionManager::new(DatabasePool::from_pool(pool.clone()));
        Self { pool, transactions }
    }

    async fn with_account(&self, user: Option<User>) -> DatabaseResult<Option<UserAccount>> {
        match user {
            Some(user) => Ok(Some(load_account(&self.pool, user).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_phone(&self, phone: &str) -> DatabaseResult<Option<UserAccount>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone = $1 AND deleted_at IS NULL"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find user by phone"))?;

        self.with_account(user).await
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<UserAccount>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find user by id"))?;

        self.with_account(user).await
    }

    async fn phone_exists(&self, phone: &str) -> DatabaseResult<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM users WHERE phone = $1 AND deleted_at IS NULL) AS taken")
            .bind(phone)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("check phone"))?;
        row.try_get("taken").map_err(db_err("check phone"))
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(db_err("update last login"))?;
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: UserStatus) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(db_err("update user status"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn set_active_role(&self, user_id: Uuid, role_id: Uuid) -> DatabaseResult<()> {
        sqlx::query("UPDATE admin_profiles SET active_role_id = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await
            .map_err(db_err("set active role"))?;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err("soft delete user"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {id}")));
        }
        info!(user_id = %id, "User soft-deleted");
        Ok(())
    }

    async fn hard_delete(&self, id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err("hard delete user"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {id}")));
        }
        info!(user_id = %id, "User hard-deleted");
        Ok(())
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn AccountTransaction>> {
        let tx = self.transactions.begin().await?;
        Ok(Box::new(PostgresAccountTransaction { tx }))
    }
}

struct PostgresAccountTransaction {
    tx: PgTransaction,
}

#[async_trait]
impl AccountTransaction for PostgresAccountTransaction {
    async fn insert_user(&mut self, user: &User) -> DatabaseResult<()> {
        sqlx::query(
            r"
            INSERT INTO users (
                id, phone, email, password_hash, user_type, status,
                phone_verified, email_verified, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(user.id)
        .bind(&user.phone)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.user_type)
        .bind(user.status)
        .bind(user.phone_verified)
        .bind(user.email_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err("insert user"))?;
        Ok(())
    }

    async fn insert_tenant(&mut self, tenant: &Tenant) -> DatabaseResult<()> {
        sqlx::query("INSERT INTO tenants (id, name, created_at, updated_at) VALUES ($1, $2, $3, $4)")
            .bind(tenant.id)
            .bind(&tenant.name)
            .bind(tenant.created_at)
            .bind(tenant.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("insert tenant"))?;
        Ok(())
    }

    async fn insert_profile(&mut self, profile: &Profile) -> DatabaseResult<()> {
        let query = match profile {
            Profile::Client(p) => sqlx::query(
                "INSERT INTO client_profiles (user_id, tenant_id, full_name, tenant_role, created_at) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(p.user_id)
            .bind(p.tenant_id)
            .bind(&p.full_name)
            .bind(&p.tenant_role)
            .bind(p.created_at),
            Profile::Sp(p) => sqlx::query(
                "INSERT INTO sp_profiles (user_id, full_name, created_at) VALUES ($1, $2, $3)",
            )
            .bind(p.user_id)
            .bind(&p.full_name)
            .bind(p.created_at),
            Profile::Admin(p) => sqlx::query(
                "INSERT INTO admin_profiles (user_id, full_name, active_role_id, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(p.user_id)
            .bind(&p.full_name)
            .bind(p.active_role_id)
            .bind(p.created_at),
        };

        query
            .execute(&mut *self.tx)
            .await
            .map_err(db_err("insert profile"))?;
        Ok(())
    }

    async fn insert_user_role(&mut self, assignment: &UserRole) -> DatabaseResult<()> {
        insert_user_role(&mut *self.tx, assignment).await
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        TransactionManager::commit(self.tx).await
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        TransactionManager::rollback(self.tx).await
    }
}

async fn insert_user_role(conn: &mut sqlx::PgConnection, assignment: &UserRole) -> DatabaseResult<()> {
    sqlx::query(
        r"
        INSERT INTO user_roles (
            id, user_id, role_id, tenant_id, is_active, expires_at, assigned_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
    )
    .bind(assignment.id)
    .bind(assignment.user_id)
    .bind(assignment.role_id)
    .bind(assignment.tenant_id)
    .bind(assignment.is_active)
    .bind(assignment.expires_at)
    .bind(assignment.assigned_by)
    .bind(assignment.created_at)
    .bind(assignment.updated_at)
    .execute(conn)
    .await
    .map_err(db_err("insert user role"))?;
    Ok(())
}

// =============================================================================
// ROLES & PERMISSIONS
// =============================================================================

pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn create_role(&self, role: &Role) -> DatabaseResult<()> {
        sqlx::query(
            r"
            INSERT INTO roles (
                id, name, display_name, description, actor_kind, is_system,
                is_active, parent_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.actor_kind)
        .bind(role.is_system)
        .bind(role.is_active)
        .bind(role.parent_id)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("create role"))?;

        debug!(role = %role.name, "Role created");
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> DatabaseResult<()> {
        let result = sqlx::query(
            r"
            UPDATE roles
            SET name = $2, display_name = $3, description = $4, is_active = $5,
                parent_id = $6, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.is_active)
        .bind(role.parent_id)
        .execute(&self.pool)
        .await
        .map_err(db_err("update role"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("role {}", role.id)));
        }
        Ok(())
    }

    async fn find_role(&self, id: Uuid) -> DatabaseResult<Option<Role>> {
        sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find role"))
    }

    async fn find_role_by_name(&self, name: &str) -> DatabaseResult<Option<Role>> {
        sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find role by name"))
    }

    async fn list_roles(&self, actor_kind: Option<ActorKind>) -> DatabaseResult<Vec<Role>> {
        sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles \
             WHERE deleted_at IS NULL AND ($1::text IS NULL OR actor_kind = $1) \
             ORDER BY name"
        ))
        .bind(actor_kind)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list roles"))
    }

    async fn soft_delete_role(&self, id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query(
            "UPDATE roles SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err("delete role"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("role {id}")));
        }
        Ok(())
    }

    async fn count_active_assignments(&self, role_id: Uuid) -> DatabaseResult<u64> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS assigned
            FROM user_roles ur
            JOIN users u ON u.id = ur.user_id AND u.deleted_at IS NULL
            WHERE ur.role_id = $1 AND ur.is_active
              AND (ur.expires_at IS NULL OR ur.expires_at > NOW())
            ",
        )
        .bind(role_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("count role assignments"))?;

        let count: i64 = row.try_get("assigned").map_err(db_err("count role assignments"))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn create_group(&self, group: &PermissionGroup) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO permission_groups (id, name, description, display_order) VALUES ($1, $2, $3, $4)",
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.display_order)
        .execute(&self.pool)
        .await
        .map_err(db_err("create permission group"))?;
        Ok(())
    }

    async fn find_group(&self, id: Uuid) -> DatabaseResult<Option<PermissionGroup>> {
        sqlx::query_as::<_, PermissionGroup>(
            "SELECT id, name, description, display_order FROM permission_groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find permission group"))
    }

    async fn find_group_by_name(&self, name: &str) -> DatabaseResult<Option<PermissionGroup>> {
        sqlx::query_as::<_, PermissionGroup>(
            "SELECT id, name, description, display_order FROM permission_groups WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find permission group"))
    }

    async fn list_groups(&self) -> DatabaseResult<Vec<PermissionGroup>> {
        sqlx::query_as::<_, PermissionGroup>(
            "SELECT id, name, description, display_order FROM permission_groups ORDER BY display_order, name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list permission groups"))
    }

    async fn create_permission(&self, permission: &Permission) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO permissions (id, key, description, group_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(permission.id)
        .bind(&permission.key)
        .bind(&permission.description)
        .bind(permission.group_id)
        .bind(permission.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("create permission"))?;
        Ok(())
    }

    async fn find_permissions(&self, ids: &[Uuid]) -> DatabaseResult<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(
            "SELECT id, key, description, group_id, created_at FROM permissions WHERE id = ANY($1) ORDER BY key",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("find permissions"))
    }

    async fn find_permission_by_key(&self, key: &str) -> DatabaseResult<Option<Permission>> {
        sqlx::query_as::<_, Permission>(
            "SELECT id, key, description, group_id, created_at FROM permissions WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find permission"))
    }

    async fn list_permissions(&self) -> DatabaseResult<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(
            "SELECT id, key, description, group_id, created_at FROM permissions ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("list permissions"))
    }

    async fn role_permissions(&self, role_id: Uuid) -> DatabaseResult<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(
            r"
            SELECT p.id, p.key, p.description, p.group_id, p.created_at
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = $1
            ORDER BY p.key
            ",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("load role permissions"))
    }

    async fn grant_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
        granted_by: Option<Uuid>,
    ) -> DatabaseResult<u64> {
        let result = sqlx::query(
            r"
            INSERT INTO role_permissions (role_id, permission_id, granted_by, granted_at)
            SELECT $1, permission_id, $3, NOW()
            FROM (SELECT DISTINCT unnest($2::uuid[]) AS permission_id) requested
            ON CONFLICT (role_id, permission_id) DO NOTHING
            ",
        )
        .bind(role_id)
        .bind(permission_ids)
        .bind(granted_by)
        .execute(&self.pool)
        .await
        .map_err(db_err("grant permissions"))?;

        Ok(result.rows_affected())
    }

    async fn revoke_permissions(&self, role_id: Uuid, permission_ids: &[Uuid]) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = ANY($2)")
            .bind(role_id)
            .bind(permission_ids)
            .execute(&self.pool)
            .await
            .map_err(db_err("revoke permissions"))?;

        Ok(result.rows_affected())
    }

    async fn find_active_assignment(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Option<Uuid>,
    ) -> DatabaseResult<Option<UserRole>> {
        sqlx::query_as::<_, UserRole>(
            r"
            SELECT id, user_id, role_id, tenant_id, is_active, expires_at, assigned_by, created_at, updated_at
            FROM user_roles
            WHERE user_id = $1 AND role_id = $2 AND tenant_id IS NOT DISTINCT FROM $3 AND is_active
            ",
        )
        .bind(user_id)
        .bind(role_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find role assignment"))
    }

    async fn insert_assignment(&self, assignment: &UserRole) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await.map_err(db_err("acquire connection"))?;
        insert_user_role(&mut *conn, assignment).await
    }

    async fn deactivate_assignment(&self, assignment_id: Uuid) -> DatabaseResult<()> {
        let result = sqlx::query("UPDATE user_roles SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(assignment_id)
            .execute(&self.pool)
            .await
            .map_err(db_err("deactivate role assignment"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user role {assignment_id}")));
        }
        Ok(())
    }
}

// =============================================================================
// REFRESH TOKEN LEDGER
// =============================================================================

const REFRESH_COLUMNS: &str = "id, user_id, token_hash, expires_at, revoked_at, replaced_by, created_at";

pub struct PostgresRefreshTokenRepository {
    pool: PgPool,
    transactions: TransactionManager,
}

impl PostgresRefreshTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        let transactions = TransactionManager::new(DatabasePool::from_pool(pool.clone()));
        Self { pool, transactions }
    }
}

async fn insert_refresh_token(conn: &mut sqlx::PgConnection, record: &RefreshTokenRecord) -> DatabaseResult<()> {
    sqlx::query(
        r"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.token_hash)
    .bind(record.expires_at)
    .bind(record.created_at)
    .execute(conn)
    .await
    .map_err(db_err("insert refresh token"))?;
    Ok(())
}

#[async_trait]
impl RefreshTokenRepository for PostgresRefreshTokenRepository {
    async fn create(&self, record: &RefreshTokenRecord) -> DatabaseResult<()> {
        let mut conn = self.pool.acquire().await.map_err(db_err("acquire connection"))?;
        insert_refresh_token(&mut *conn, record).await
    }

    async fn find_active(&self, token_hash: &str) -> DatabaseResult<Option<RefreshTokenRecord>> {
        sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = $1 AND revoked_at IS NULL"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find refresh token"))
    }

    async fn revoke(&self, id: Uuid) -> DatabaseResult<()> {
        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err("revoke refresh token"))?;
        Ok(())
    }

    async fn revoke_all(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(db_err("revoke user refresh tokens"))?;

        info!(user_id = %user_id, revoked = result.rows_affected(), "Revoked refresh tokens");
        Ok(result.rows_affected())
    }

    async fn rotate(&self, old_id: Uuid, replacement: &RefreshTokenRecord) -> DatabaseResult<bool> {
        let mut tx = self.transactions.begin().await?;

        // The row lock taken here serializes concurrent rotations of the same token
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW(), replaced_by = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(old_id)
        .bind(replacement.id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("revoke rotated token"))?
        .rows_affected();

        if revoked == 0 {
            TransactionManager::rollback(tx).await?;
            return Ok(false);
        }

        insert_refresh_token(&mut *tx, replacement).await?;
        TransactionManager::commit(tx).await?;
        Ok(true)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> DatabaseResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await
            .map_err(db_err("purge refresh tokens"))?;

        info!(deleted = result.rows_affected(), "Purged expired refresh tokens");
        Ok(result.rows_affected())
    }
}

// =============================================================================
// ADMIN SESSIONS
// =============================================================================

pub struct PostgresAdminSessionRepository {
    pool: PgPool,
}

impl PostgresAdminSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdminSessionRepository for PostgresAdminSessionRepository {
    async fn create(&self, session: &AdminSession) -> DatabaseResult<()> {
        sqlx::query(
            r"
            INSERT INTO admin_sessions (id, user_id, role_id, jti, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.role_id)
        .bind(&session.jti)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("create admin session"))?;
        Ok(())
    }

    async fn find_active_by_jti(&self, jti: &str) -> DatabaseResult<Option<AdminSession>> {
        sqlx::query_as::<_, AdminSession>(
            r"
            SELECT id, user_id, role_id, jti, expires_at, terminated_at, created_at
            FROM admin_sessions
            WHERE jti = $1 AND terminated_at IS NULL
            ",
        )
        .bind(jti)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find admin session"))
    }

    async fn terminate_all(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE admin_sessions SET terminated_at = NOW() WHERE user_id = $1 AND terminated_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_err("terminate admin sessions"))?;

        info!(user_id = %user_id, terminated = result.rows_affected(), "Terminated admin sessions");
        Ok(result.rows_affected())
    }
}
