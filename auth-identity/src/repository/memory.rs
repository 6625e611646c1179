//! In-memory identity store for development and tests
//!
//! Every repository trait is implemented by one backend guarding a single
//! state struct, so multi-table invariants (phone uniqueness, one active
//! assignment per triple, rotate-on-use) hold under concurrent callers the
//! same way the Postgres indexes enforce them.

use super::{
    AccountTransaction, AdminSessionRepository, RefreshTokenRepository, RoleRepository,
    UserRepository,
};
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use database_layer::{DatabaseError, DatabaseResult};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    tenants: HashMap<Uuid, Tenant>,
    profiles: HashMap<Uuid, Profile>,
    roles: HashMap<Uuid, Role>,
    groups: HashMap<Uuid, PermissionGroup>,
    permissions: HashMap<Uuid, Permission>,
    role_permissions: Vec<RolePermission>,
    user_roles: HashMap<Uuid, UserRole>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
    admin_sessions: HashMap<Uuid, AdminSession>,
}

impl State {
    fn live_user(&self, id: Uuid) -> Option<&User> {
        self.users.get(&id).filter(|u| !u.is_deleted())
    }

    fn live_user_mut(&mut self, id: Uuid) -> DatabaseResult<&mut User> {
        self.users
            .get_mut(&id)
            .filter(|u| !u.is_deleted())
            .ok_or_else(|| DatabaseError::NotFound(format!("user {id}")))
    }

    fn phone_taken(&self, phone: &str) -> bool {
        self.users.values().any(|u| !u.is_deleted() && u.phone == phone)
    }

    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| {
            !u.is_deleted()
                && u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
        })
    }

    fn live_role(&self, id: Uuid) -> Option<&Role> {
        self.roles.get(&id).filter(|r| r.deleted_at.is_none())
    }

    fn role_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.roles
            .values()
            .any(|r| r.deleted_at.is_none() && r.name == name && Some(r.id) != except)
    }

    fn active_assignment(&self, user_id: Uuid, role_id: Uuid, tenant_id: Option<Uuid>) -> Option<&UserRole> {
        self.user_roles.values().find(|a| {
            a.is_active && a.user_id == user_id && a.role_id == role_id && a.tenant_id == tenant_id
        })
    }

    fn permission_keys(&self, role_id: Uuid) -> Vec<String> {
        self.role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| self.permissions.get(&rp.permission_id))
            .map(|p| p.key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn effective_assignments(&self, user_id: Uuid, now: DateTime<Utc>) -> Vec<RoleAssignment> {
        let mut assignments: Vec<RoleAssignment> = self
            .user_roles
            .values()
            .filter(|a| a.user_id == user_id && a.is_effective(now))
            .filter_map(|a| {
                let role = self.live_role(a.role_id).filter(|r| r.is_active)?;
                Some(RoleAssignment {
                    assignment: a.clone(),
                    role: role.clone(),
                    permissions: self.permission_keys(role.id),
                })
            })
            .collect();
        assignments.sort_by(|a, b| a.role.name.cmp(&b.role.name));
        assignments
    }

    fn account(&self, user: &User) -> UserAccount {
        UserAccount {
            user: user.clone(),
            profile: self.profiles.get(&user.id).cloned(),
            assignments: self.effective_assignments(user.id, Utc::now()),
        }
    }
}

fn conflict(constraint: &str) -> DatabaseError {
    DatabaseError::Conflict(constraint.to_string())
}

/// Shared state behind every in-memory repository
#[derive(Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// USERS
// =============================================================================

#[async_trait]
impl UserRepository for InMemoryBackend {
    async fn find_by_phone(&self, phone: &str) -> DatabaseResult<Option<UserAccount>> {
        let state = self.state.lock();
        Ok(state
            .users
            .values()
            .find(|u| !u.is_deleted() && u.phone == phone)
            .map(|u| state.account(u)))
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<UserAccount>> {
        let state = self.state.lock();
        Ok(state.live_user(id).map(|u| state.account(u)))
    }

    async fn phone_exists(&self, phone: &str) -> DatabaseResult<bool> {
        Ok(self.state.lock().phone_taken(phone))
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        let user = state.live_user_mut(id)?;
        user.last_login_at = Some(at);
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: UserStatus) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        let user = state.live_user_mut(id)?;
        user.status = status;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn set_active_role(&self, user_id: Uuid, role_id: Uuid) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if let Some(Profile::Admin(profile)) = state.profiles.get_mut(&user_id) {
            profile.active_role_id = Some(role_id);
        }
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        let user = state.live_user_mut(id)?;
        let now = Utc::now();
        user.deleted_at = Some(now);
        user.updated_at = now;
        Ok(())
    }

    async fn hard_delete(&self, id: Uuid) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if state.users.remove(&id).is_none() {
            return Err(DatabaseError::NotFound(format!("user {id}")));
        }
        state.profiles.remove(&id);
        state.user_roles.retain(|_, a| a.user_id != id);
        state.refresh_tokens.retain(|_, t| t.user_id != id);
        state.admin_sessions.retain(|_, s| s.user_id != id);
        Ok(())
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn AccountTransaction>> {
        Ok(Box::new(InMemoryAccountTransaction {
            state: Arc::clone(&self.state),
            writes: Vec::new(),
        }))
    }
}

enum PendingWrite {
    User(User),
    Tenant(Tenant),
    Profile(Profile),
    UserRole(UserRole),
}

/// Buffers writes and applies them under a single lock on commit
struct InMemoryAccountTransaction {
    state: Arc<Mutex<State>>,
    writes: Vec<PendingWrite>,
}

impl InMemoryAccountTransaction {
    fn validate(state: &State, writes: &[PendingWrite]) -> DatabaseResult<()> {
        let mut phones = HashSet::new();
        let mut triples = HashSet::new();

        for write in writes {
            match write {
                PendingWrite::User(user) => {
                    if state.phone_taken(&user.phone) || !phones.insert(user.phone.as_str()) {
                        return Err(conflict("users_phone_live_key"));
                    }
                    if user.email.as_deref().is_some_and(|e| state.email_taken(e)) {
                        return Err(conflict("users_email_live_key"));
                    }
                }
                PendingWrite::UserRole(a) => {
                    let triple = (a.user_id, a.role_id, a.tenant_id);
                    if state.active_assignment(a.user_id, a.role_id, a.tenant_id).is_some()
                        || !triples.insert(triple)
                    {
                        return Err(conflict("user_roles_active_key"));
                    }
                }
                PendingWrite::Tenant(_) | PendingWrite::Profile(_) => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountTransaction for InMemoryAccountTransaction {
    async fn insert_user(&mut self, user: &User) -> DatabaseResult<()> {
        self.writes.push(PendingWrite::User(user.clone()));
        Ok(())
    }

    async fn insert_tenant(&mut self, tenant: &Tenant) -> DatabaseResult<()> {
        self.writes.push(PendingWrite::Tenant(tenant.clone()));
        Ok(())
    }

    async fn insert_profile(&mut self, profile: &Profile) -> DatabaseResult<()> {
        self.writes.push(PendingWrite::Profile(profile.clone()));
        Ok(())
    }

    async fn insert_user_role(&mut self, assignment: &UserRole) -> DatabaseResult<()> {
        self.writes.push(PendingWrite::UserRole(assignment.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        let this = *self;
        let mut state = this.state.lock();
        Self::validate(&state, &this.writes)?;

        for write in this.writes {
            match write {
                PendingWrite::User(user) => {
                    state.users.insert(user.id, user);
                }
                PendingWrite::Tenant(tenant) => {
                    state.tenants.insert(tenant.id, tenant);
                }
                PendingWrite::Profile(profile) => {
                    state.profiles.insert(profile.user_id(), profile);
                }
                PendingWrite::UserRole(assignment) => {
                    state.user_roles.insert(assignment.id, assignment);
                }
            }
        }
        debug!("In-memory account transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        debug!(discarded = self.writes.len(), "In-memory account transaction rolled back");
        Ok(())
    }
}

// =============================================================================
// ROLES & PERMISSIONS
// =============================================================================

#[async_trait]
impl RoleRepository for InMemoryBackend {
    async fn create_role(&self, role: &Role) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if state.role_name_taken(&role.name, None) {
            return Err(conflict("roles_name_live_key"));
        }
        state.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn update_role(&self, role: &Role) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if state.live_role(role.id).is_none() {
            return Err(DatabaseError::NotFound(format!("role {}", role.id)));
        }
        if state.role_name_taken(&role.name, Some(role.id)) {
            return Err(conflict("roles_name_live_key"));
        }
        state.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn find_role(&self, id: Uuid) -> DatabaseResult<Option<Role>> {
        Ok(self.state.lock().live_role(id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> DatabaseResult<Option<Role>> {
        let state = self.state.lock();
        Ok(state
            .roles
            .values()
            .find(|r| r.deleted_at.is_none() && r.name == name)
            .cloned())
    }

    async fn list_roles(&self, actor_kind: Option<ActorKind>) -> DatabaseResult<Vec<Role>> {
        let state = self.state.lock();
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| r.deleted_at.is_none())
            .filter(|r| actor_kind.map_or(true, |kind| r.actor_kind == kind))
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn soft_delete_role(&self, id: Uuid) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        let role = state
            .roles
            .get_mut(&id)
            .filter(|r| r.deleted_at.is_none())
            .ok_or_else(|| DatabaseError::NotFound(format!("role {id}")))?;
        let now = Utc::now();
        role.deleted_at = Some(now);
        role.updated_at = now;
        Ok(())
    }

    async fn count_active_assignments(&self, role_id: Uuid) -> DatabaseResult<u64> {
        let state = self.state.lock();
        let now = Utc::now();
        let count = state
            .user_roles
            .values()
            .filter(|a| a.role_id == role_id && a.is_effective(now))
            .filter(|a| state.live_user(a.user_id).is_some())
            .count();
        Ok(count as u64)
    }

    async fn create_group(&self, group: &PermissionGroup) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if state.groups.values().any(|g| g.name == group.name) {
            return Err(conflict("permission_groups_name_key"));
        }
        state.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn find_group(&self, id: Uuid) -> DatabaseResult<Option<PermissionGroup>> {
        Ok(self.state.lock().groups.get(&id).cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> DatabaseResult<Option<PermissionGroup>> {
        let state = self.state.lock();
        Ok(state.groups.values().find(|g| g.name == name).cloned())
    }

    async fn list_groups(&self) -> DatabaseResult<Vec<PermissionGroup>> {
        let state = self.state.lock();
        let mut groups: Vec<PermissionGroup> = state.groups.values().cloned().collect();
        groups.sort_by(|a, b| (a.display_order, &a.name).cmp(&(b.display_order, &b.name)));
        Ok(groups)
    }

    async fn create_permission(&self, permission: &Permission) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if state.permissions.values().any(|p| p.key == permission.key) {
            return Err(conflict("permissions_key_key"));
        }
        state.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn find_permissions(&self, ids: &[Uuid]) -> DatabaseResult<Vec<Permission>> {
        let state = self.state.lock();
        Ok(ids
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|id| state.permissions.get(id).cloned())
            .collect())
    }

    async fn find_permission_by_key(&self, key: &str) -> DatabaseResult<Option<Permission>> {
        let state = self.state.lock();
        Ok(state.permissions.values().find(|p| p.key == key).cloned())
    }

    async fn list_permissions(&self) -> DatabaseResult<Vec<Permission>> {
        let state = self.state.lock();
        let mut permissions: Vec<Permission> = state.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(permissions)
    }

    async fn role_permissions(&self, role_id: Uuid) -> DatabaseResult<Vec<Permission>> {
        let state = self.state.lock();
        let mut permissions: Vec<Permission> = state
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| state.permissions.get(&rp.permission_id).cloned())
            .collect();
        permissions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(permissions)
    }

    async fn grant_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
        granted_by: Option<Uuid>,
    ) -> DatabaseResult<u64> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut granted = 0u64;

        for permission_id in permission_ids.iter().collect::<BTreeSet<_>>() {
            let exists = state
                .role_permissions
                .iter()
                .any(|rp| rp.role_id == role_id && rp.permission_id == *permission_id);
            if !exists {
                state.role_permissions.push(RolePermission {
                    role_id,
                    permission_id: *permission_id,
                    granted_by,
                    granted_at: now,
                });
                granted += 1;
            }
        }
        Ok(granted)
    }

    async fn revoke_permissions(&self, role_id: Uuid, permission_ids: &[Uuid]) -> DatabaseResult<u64> {
        let mut state = self.state.lock();
        let before = state.role_permissions.len();
        state
            .role_permissions
            .retain(|rp| !(rp.role_id == role_id && permission_ids.contains(&rp.permission_id)));
        Ok((before - state.role_permissions.len()) as u64)
    }

    async fn find_active_assignment(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Option<Uuid>,
    ) -> DatabaseResult<Option<UserRole>> {
        Ok(self
            .state
            .lock()
            .active_assignment(user_id, role_id, tenant_id)
            .cloned())
    }

    async fn insert_assignment(&self, assignment: &UserRole) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if assignment.is_active
            && state
                .active_assignment(assignment.user_id, assignment.role_id, assignment.tenant_id)
                .is_some()
        {
            return Err(conflict("user_roles_active_key"));
        }
        state.user_roles.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn deactivate_assignment(&self, assignment_id: Uuid) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        let assignment = state
            .user_roles
            .get_mut(&assignment_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("user role {assignment_id}")))?;
        assignment.is_active = false;
        assignment.updated_at = Utc::now();
        Ok(())
    }
}

// =============================================================================
// REFRESH TOKEN LEDGER
// =============================================================================

#[async_trait]
impl RefreshTokenRepository for InMemoryBackend {
    async fn create(&self, record: &RefreshTokenRecord) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if state.refresh_tokens.values().any(|t| t.token_hash == record.token_hash) {
            return Err(conflict("refresh_tokens_token_hash_key"));
        }
        state.refresh_tokens.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_active(&self, token_hash: &str) -> DatabaseResult<Option<RefreshTokenRecord>> {
        let state = self.state.lock();
        Ok(state
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash && t.revoked_at.is_none())
            .cloned())
    }

    async fn revoke(&self, id: Uuid) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if let Some(token) = state.refresh_tokens.get_mut(&id) {
            token.revoked_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn revoke_all(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut revoked = 0u64;
        for token in state
            .refresh_tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && t.revoked_at.is_none())
        {
            token.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn rotate(&self, old_id: Uuid, replacement: &RefreshTokenRecord) -> DatabaseResult<bool> {
        let mut state = self.state.lock();
        if state
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == replacement.token_hash)
        {
            return Err(conflict("refresh_tokens_token_hash_key"));
        }

        let Some(old) = state
            .refresh_tokens
            .get_mut(&old_id)
            .filter(|t| t.revoked_at.is_none())
        else {
            return Ok(false);
        };

        old.revoked_at = Some(Utc::now());
        old.replaced_by = Some(replacement.id);
        state.refresh_tokens.insert(replacement.id, replacement.clone());
        Ok(true)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> DatabaseResult<u64> {
        let mut state = self.state.lock();
        let count = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, t| t.expires_at >= before);
        Ok((count - state.refresh_tokens.len()) as u64)
    }
}

// =============================================================================
// ADMIN SESSIONS
// =============================================================================

#[async_trait]
impl AdminSessionRepository for InMemoryBackend {
    async fn create(&self, session: &AdminSession) -> DatabaseResult<()> {
        let mut state = self.state.lock();
        if state.admin_sessions.values().any(|s| s.jti == session.jti) {
            return Err(conflict("admin_sessions_jti_key"));
        }
        state.admin_sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_active_by_jti(&self, jti: &str) -> DatabaseResult<Option<AdminSession>> {
        let state = self.state.lock();
        Ok(state
            .admin_sessions
            .values()
            .find(|s| s.jti == jti && s.terminated_at.is_none())
            .cloned())
    }

    async fn terminate_all(&self, user_id: Uuid) -> DatabaseResult<u64> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut terminated = 0u64;
        for session in state
            .admin_sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.terminated_at.is_none())
        {
            session.terminated_at = Some(now);
            terminated += 1;
        }
        Ok(terminated)
    }
}
