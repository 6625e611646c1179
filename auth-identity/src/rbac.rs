//! Role & permission graph management
//!
//! A role's effective permissions are exactly the permissions granted to it
//! directly. `parent_id` is kept for organizational display and is never
//! walked during resolution.

use chrono::{DateTime, Utc};
use database_layer::{AuditEvent, AuditSink, DatabaseError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::models::{Actor, ActorKind, Permission, PermissionGroup, Role, UserRole};
use crate::repository::IdentityStore;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub actor_kind: ActorKind,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub is_system: bool,
}

/// Partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionRequest {
    pub key: String,
    pub description: Option<String>,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleRequest {
    pub user_id: Uuid,
    pub role_id: Uuid,
    /// Defaults to the user's own tenant for client roles
    pub tenant_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A role with its direct grants and, for display, its parent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDetails {
    pub role: Role,
    pub parent: Option<Role>,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionListing {
    /// `None` collects ungrouped permissions
    pub group: Option<PermissionGroup>,
    pub permissions: Vec<Permission>,
}

/// Validate a `resource:action` permission key
pub fn validate_permission_key(key: &str) -> Result<()> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    };

    match key.split_once(':') {
        Some((resource, action)) if valid_part(resource) && valid_part(action) => Ok(()),
        _ => Err(IdentityError::Validation(format!(
            "permission key '{key}' must look like 'resource:action'"
        ))),
    }
}

pub struct RoleService {
    store: IdentityStore,
    audit: Arc<dyn AuditSink>,
}

impl RoleService {
    pub fn new(store: IdentityStore, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    // =========================================================================
    // ROLES
    // =========================================================================

    pub async fn create_role(&self, actor: &Actor, request: CreateRoleRequest) -> Result<Role> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(IdentityError::Validation("role name must not be empty".to_string()));
        }

        if self.store.roles.find_role_by_name(&name).await?.is_some() {
            return Err(IdentityError::RoleNameTaken(name));
        }

        if let Some(parent_id) = request.parent_id {
            self.check_parent(request.actor_kind, parent_id).await?;
        }

        let mut role = Role::new(name, request.display_name, request.actor_kind);
        role.description = request.description;
        role.parent_id = request.parent_id;
        role.is_system = request.is_system;

        self.store
            .roles
            .create_role(&role)
            .await
            .map_err(|e| role_conflict(e, &role.name))?;

        info!(role = %role.name, actor_kind = %role.actor_kind, "Role created");
        self.record(
            actor,
            "role.created",
            role.id,
            json!({ "name": role.name, "actorKind": role.actor_kind, "parentId": role.parent_id }),
        );
        Ok(role)
    }

    pub async fn update_role(&self, actor: &Actor, role_id: Uuid, request: UpdateRoleRequest) -> Result<Role> {
        let mut role = self.require_role(role_id).await?;

        if request.is_active == Some(false) && role.is_system {
            return Err(IdentityError::SystemRoleProtected);
        }

        if let Some(parent_id) = request.parent_id {
            if parent_id == role.id {
                return Err(IdentityError::Validation("a role cannot be its own parent".to_string()));
            }
            self.check_parent(role.actor_kind, parent_id).await?;
            role.parent_id = Some(parent_id);
        }
        if let Some(display_name) = request.display_name {
            role.display_name = display_name;
        }
        if let Some(description) = request.description {
            role.description = Some(description);
        }
        if let Some(is_active) = request.is_active {
            role.is_active = is_active;
        }
        role.updated_at = Utc::now();

        self.store.roles.update_role(&role).await?;

        self.record(actor, "role.updated", role.id, json!({ "name": role.name, "isActive": role.is_active }));
        Ok(role)
    }

    /// Soft-delete a role. System roles and roles still held by users are refused.
    pub async fn delete_role(&self, actor: &Actor, role_id: Uuid) -> Result<()> {
        let role = self.require_role(role_id).await?;

        if role.is_system {
            warn!(role = %role.name, "Refused to delete system role");
            return Err(IdentityError::SystemRoleProtected);
        }

        let assigned = self.store.roles.count_active_assignments(role_id).await?;
        if assigned > 0 {
            debug!(role = %role.name, assigned, "Role still assigned");
            return Err(IdentityError::RoleInUse);
        }

        self.store.roles.soft_delete_role(role_id).await?;

        info!(role = %role.name, "Role deleted");
        self.record(actor, "role.deleted", role_id, json!({ "name": role.name }));
        Ok(())
    }

    pub async fn get_role(&self, role_id: Uuid) -> Result<RoleDetails> {
        let role = self.require_role(role_id).await?;
        let parent = match role.parent_id {
            Some(parent_id) => self.store.roles.find_role(parent_id).await?,
            None => None,
        };
        let permissions = self.store.roles.role_permissions(role_id).await?;

        Ok(RoleDetails {
            role,
            parent,
            permissions,
        })
    }

    pub async fn list_roles(&self, actor_kind: Option<ActorKind>) -> Result<Vec<Role>> {
        Ok(self.store.roles.list_roles(actor_kind).await?)
    }

    /// Permission keys granted directly to the role, sorted
    pub async fn effective_permissions(&self, role_id: Uuid) -> Result<Vec<String>> {
        self.require_role(role_id).await?;
        let mut keys: Vec<String> = self
            .store
            .roles
            .role_permissions(role_id)
            .await?
            .into_iter()
            .map(|p| p.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    // =========================================================================
    // PERMISSIONS
    // =========================================================================

    pub async fn create_permission_group(
        &self,
        actor: &Actor,
        name: &str,
        description: Option<String>,
        display_order: i32,
    ) -> Result<PermissionGroup> {
        if self.store.roles.find_group_by_name(name).await?.is_some() {
            return Err(IdentityError::PermissionGroupTaken(name.to_string()));
        }

        let group = PermissionGroup {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            display_order,
        };
        self.store.roles.create_group(&group).await?;

        self.record(actor, "permission_group.created", group.id, json!({ "name": group.name }));
        Ok(group)
    }

    pub async fn create_permission(&self, actor: &Actor, request: CreatePermissionRequest) -> Result<Permission> {
        validate_permission_key(&request.key)?;

        if self.store.roles.find_permission_by_key(&request.key).await?.is_some() {
            return Err(IdentityError::PermissionKeyTaken(request.key));
        }
        if let Some(group_id) = request.group_id {
            if self.store.roles.find_group(group_id).await?.is_none() {
                return Err(IdentityError::PermissionGroupNotFound(group_id));
            }
        }

        let mut permission = Permission::new(request.key, request.group_id);
        permission.description = request.description;

        self.store.roles.create_permission(&permission).await.map_err(|e| {
            if e.is_conflict() {
                IdentityError::PermissionKeyTaken(permission.key.clone())
            } else {
                e.into()
            }
        })?;

        self.record(actor, "permission.created", permission.id, json!({ "key": permission.key }));
        Ok(permission)
    }

    /// All permissions bucketed by group in display order, ungrouped last
    pub async fn list_permissions_grouped(&self) -> Result<Vec<PermissionListing>> {
        let groups = self.store.roles.list_groups().await?;
        let mut by_group: BTreeMap<Option<Uuid>, Vec<Permission>> = BTreeMap::new();
        for permission in self.store.roles.list_permissions().await? {
            by_group.entry(permission.group_id).or_default().push(permission);
        }

        let mut listings: Vec<PermissionListing> = groups
            .into_iter()
            .map(|group| PermissionListing {
                permissions: by_group.remove(&Some(group.id)).unwrap_or_default(),
                group: Some(group),
            })
            .collect();

        // Whatever is left is ungrouped or points at a group that no longer exists
        let ungrouped: Vec<Permission> = by_group.into_values().flatten().collect();
        if !ungrouped.is_empty() {
            listings.push(PermissionListing {
                group: None,
                permissions: ungrouped,
            });
        }
        Ok(listings)
    }

    /// Grant permissions to a role. Existing grants are kept, not duplicated.
    /// Returns the number of newly granted permissions.
    pub async fn assign_permissions(&self, actor: &Actor, role_id: Uuid, permission_ids: &[Uuid]) -> Result<u64> {
        let role = self.require_role(role_id).await?;
        let ids = self.require_permissions(permission_ids).await?;

        let granted = self
            .store
            .roles
            .grant_permissions(role_id, &ids, actor.user_id)
            .await?;

        info!(role = %role.name, requested = ids.len(), granted, "Permissions assigned");
        self.record(
            actor,
            "role.permissions_assigned",
            role_id,
            json!({ "permissionIds": ids, "newlyAssigned": granted }),
        );
        Ok(granted)
    }

    /// Remove grants by permission id. Returns the number removed.
    pub async fn revoke_permissions(&self, actor: &Actor, role_id: Uuid, permission_ids: &[Uuid]) -> Result<u64> {
        let role = self.require_role(role_id).await?;
        let removed = self.store.roles.revoke_permissions(role_id, permission_ids).await?;

        info!(role = %role.name, removed, "Permissions revoked");
        self.record(
            actor,
            "role.permissions_revoked",
            role_id,
            json!({ "permissionIds": permission_ids, "removed": removed }),
        );
        Ok(removed)
    }

    // =========================================================================
    // USER ASSIGNMENTS
    // =========================================================================

    pub async fn assign_role(&self, actor: &Actor, request: AssignRoleRequest) -> Result<UserRole> {
        let account = self
            .store
            .users
            .find_by_id(request.user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)?;
        let role = self.require_role(request.role_id).await?;

        if !role.is_active {
            return Err(IdentityError::Validation(format!("role '{}' is inactive", role.name)));
        }
        if role.actor_kind != account.user.user_type {
            return Err(IdentityError::ActorKindMismatch(format!(
                "role '{}' is for {} users, user is {}",
                role.name, role.actor_kind, account.user.user_type
            )));
        }
        if let Some(expires_at) = request.expires_at {
            if expires_at <= Utc::now() {
                return Err(IdentityError::Validation("expiry must be in the future".to_string()));
            }
        }

        let tenant_id = match role.actor_kind {
            ActorKind::Client => request.tenant_id.or_else(|| account.tenant_id()),
            _ => request.tenant_id,
        };

        if let Some(existing) = self
            .store
            .roles
            .find_active_assignment(account.user.id, role.id, tenant_id)
            .await?
        {
            if existing.is_effective(Utc::now()) {
                return Err(IdentityError::DuplicateAssignment);
            }
            // Lapsed but still flagged active; retire it so the new row can take its place
            self.store.roles.deactivate_assignment(existing.id).await?;
        }

        let mut assignment = UserRole::new(account.user.id, role.id, tenant_id);
        assignment.expires_at = request.expires_at;
        assignment.assigned_by = actor.user_id;

        self.store.roles.insert_assignment(&assignment).await?;

        info!(user_id = %account.user.id, role = %role.name, "Role assigned");
        self.record(
            actor,
            "user.role_assigned",
            account.user.id,
            json!({ "roleId": role.id, "roleName": role.name, "tenantId": tenant_id }),
        );
        Ok(assignment)
    }

    /// Deactivate the user's active assignment of the role. The row is kept.
    pub async fn revoke_role(
        &self,
        actor: &Actor,
        user_id: Uuid,
        role_id: Uuid,
        tenant_id: Option<Uuid>,
    ) -> Result<()> {
        let assignment = self
            .store
            .roles
            .find_active_assignment(user_id, role_id, tenant_id)
            .await?
            .ok_or(IdentityError::AssignmentNotFound)?;

        self.store.roles.deactivate_assignment(assignment.id).await?;

        info!(user_id = %user_id, role_id = %role_id, "Role revoked");
        self.record(actor, "user.role_revoked", user_id, json!({ "roleId": role_id, "tenantId": tenant_id }));
        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn require_role(&self, role_id: Uuid) -> Result<Role> {
        self.store
            .roles
            .find_role(role_id)
            .await?
            .ok_or_else(|| IdentityError::RoleNotFound(role_id.to_string()))
    }

    async fn check_parent(&self, actor_kind: ActorKind, parent_id: Uuid) -> Result<()> {
        let parent = self
            .store
            .roles
            .find_role(parent_id)
            .await?
            .ok_or_else(|| IdentityError::RoleNotFound(parent_id.to_string()))?;

        if parent.actor_kind != actor_kind {
            return Err(IdentityError::ActorKindMismatch(format!(
                "parent role '{}' is for {} users, not {}",
                parent.name, parent.actor_kind, actor_kind
            )));
        }
        Ok(())
    }

    /// Deduplicate ids and fail on the first one that does not exist
    async fn require_permissions(&self, permission_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = permission_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let found: HashSet<Uuid> = self
            .store
            .roles
            .find_permissions(&ids)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        match ids.iter().find(|id| !found.contains(id)) {
            Some(missing) => Err(IdentityError::PermissionNotFound(missing.to_string())),
            None => Ok(ids),
        }
    }

    fn record(&self, actor: &Actor, action: &str, target_id: Uuid, metadata: serde_json::Value) {
        let target_type = if action.starts_with("user.") { "user" } else { "role" };
        self.audit.record(audit_event(actor, action).target(target_type, target_id).metadata(metadata));
    }
}

fn role_conflict(err: DatabaseError, name: &str) -> IdentityError {
    if err.is_conflict() {
        IdentityError::RoleNameTaken(name.to_string())
    } else {
        err.into()
    }
}

/// Audit event pre-filled with the acting identity
pub(crate) fn audit_event(actor: &Actor, action: &str) -> AuditEvent {
    let mut event = AuditEvent::new(action);
    event.actor_user_id = actor.user_id;
    event.actor_role = actor.role.clone();
    event.ip_address = actor.ip_address.clone();
    event
}
