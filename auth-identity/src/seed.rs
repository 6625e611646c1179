//! Default permission groups, permissions and system roles
//!
//! Seeding is idempotent: existing rows are found by name or key and reused,
//! and grants that already exist are skipped.

use serde::Serialize;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{role_names, ActorKind, Permission, PermissionGroup, Role};
use crate::repository::IdentityStore;

struct GroupSeed {
    name: &'static str,
    description: &'static str,
    permissions: &'static [(&'static str, &'static str)],
}

const GROUPS: &[GroupSeed] = &[
    GroupSeed {
        name: "users",
        description: "User accounts",
        permissions: &[
            ("users:view", "View user accounts"),
            ("users:manage", "Create and edit user accounts"),
            ("users:ban", "Suspend or ban user accounts"),
        ],
    },
    GroupSeed {
        name: "kyc",
        description: "Identity verification",
        permissions: &[
            ("kyc:view", "View KYC submissions"),
            ("kyc:approve", "Approve KYC submissions"),
            ("kyc:reject", "Reject KYC submissions"),
        ],
    },
    GroupSeed {
        name: "support",
        description: "Support desk",
        permissions: &[
            ("support:view", "View support tickets"),
            ("support:respond", "Respond to support tickets"),
        ],
    },
    GroupSeed {
        name: "roles",
        description: "Roles and permissions",
        permissions: &[
            ("roles:view", "View roles and permissions"),
            ("roles:manage", "Create roles and change their grants"),
        ],
    },
    GroupSeed {
        name: "audit",
        description: "Audit trail",
        permissions: &[("audit:view", "View audit logs")],
    },
    GroupSeed {
        name: "jobs",
        description: "Marketplace jobs",
        permissions: &[
            ("jobs:create", "Post jobs"),
            ("jobs:view", "View jobs"),
            ("jobs:manage", "Edit and close jobs"),
            ("jobs:apply", "Apply to jobs"),
        ],
    },
    GroupSeed {
        name: "team",
        description: "Company team",
        permissions: &[
            ("team:view", "View team members"),
            ("team:manage", "Invite and remove team members"),
        ],
    },
];

struct RoleSeed {
    name: &'static str,
    display_name: &'static str,
    description: &'static str,
    actor_kind: ActorKind,
    parent: Option<&'static str>,
    /// `None` grants every seeded permission
    permissions: Option<&'static [&'static str]>,
}

/// Parents must precede their children
const ROLES: &[RoleSeed] = &[
    RoleSeed {
        name: role_names::SUPER_ADMIN,
        display_name: "Super Administrator",
        description: "Full platform access",
        actor_kind: ActorKind::Admin,
        parent: None,
        permissions: None,
    },
    RoleSeed {
        name: role_names::KYC_ADMIN,
        display_name: "KYC Administrator",
        description: "Reviews identity verification",
        actor_kind: ActorKind::Admin,
        parent: Some(role_names::SUPER_ADMIN),
        permissions: Some(&["kyc:view", "kyc:approve", "kyc:reject", "users:view"]),
    },
    RoleSeed {
        name: role_names::SUPPORT_ADMIN,
        display_name: "Support Administrator",
        description: "Handles support requests",
        actor_kind: ActorKind::Admin,
        parent: Some(role_names::SUPER_ADMIN),
        permissions: Some(&["support:view", "support:respond", "users:view"]),
    },
    RoleSeed {
        name: role_names::CLIENT_ADMIN,
        display_name: "Company Administrator",
        description: "Owner of a client company",
        actor_kind: ActorKind::Client,
        parent: None,
        permissions: Some(&["jobs:create", "jobs:view", "jobs:manage", "team:view", "team:manage"]),
    },
    RoleSeed {
        name: role_names::CLIENT_MEMBER,
        display_name: "Company Member",
        description: "Member of a client company",
        actor_kind: ActorKind::Client,
        parent: Some(role_names::CLIENT_ADMIN),
        permissions: Some(&["jobs:view", "team:view"]),
    },
    RoleSeed {
        name: role_names::SP_BASIC,
        display_name: "Service Provider",
        description: "Default service provider access",
        actor_kind: ActorKind::Sp,
        parent: None,
        permissions: Some(&["jobs:view", "jobs:apply"]),
    },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub groups_created: u32,
    pub permissions_created: u32,
    pub roles_created: u32,
    pub grants_added: u64,
}

/// Install the default role & permission graph
pub async fn seed_defaults(store: &IdentityStore) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let mut permission_ids: HashMap<&'static str, Uuid> = HashMap::new();

    for (order, seed) in GROUPS.iter().enumerate() {
        let group = match store.roles.find_group_by_name(seed.name).await? {
            Some(group) => group,
            None => {
                let group = PermissionGroup {
                    id: Uuid::new_v4(),
                    name: seed.name.to_string(),
                    description: Some(seed.description.to_string()),
                    display_order: i32::try_from(order).unwrap_or(i32::MAX),
                };
                store.roles.create_group(&group).await?;
                report.groups_created += 1;
                group
            }
        };

        for (key, description) in seed.permissions {
            let permission = match store.roles.find_permission_by_key(key).await? {
                Some(permission) => permission,
                None => {
                    let mut permission = Permission::new(*key, Some(group.id));
                    permission.description = Some((*description).to_string());
                    store.roles.create_permission(&permission).await?;
                    report.permissions_created += 1;
                    permission
                }
            };
            permission_ids.insert(key, permission.id);
        }
    }

    let mut role_ids: HashMap<&'static str, Uuid> = HashMap::new();
    for seed in ROLES {
        let role = match store.roles.find_role_by_name(seed.name).await? {
            Some(role) => role,
            None => {
                let mut role = Role::new(seed.name, seed.display_name, seed.actor_kind);
                role.description = Some(seed.description.to_string());
                role.is_system = true;
                role.parent_id = seed.parent.and_then(|parent| role_ids.get(parent).copied());
                store.roles.create_role(&role).await?;
                report.roles_created += 1;
                role
            }
        };
        role_ids.insert(seed.name, role.id);

        let grants: Vec<Uuid> = match seed.permissions {
            Some(keys) => keys.iter().filter_map(|key| permission_ids.get(key).copied()).collect(),
            None => permission_ids.values().copied().collect(),
        };
        report.grants_added += store.roles.grant_permissions(role.id, &grants, None).await?;
    }

    info!(
        groups = report.groups_created,
        permissions = report.permissions_created,
        roles = report.roles_created,
        grants = report.grants_added,
        "Default roles seeded"
    );
    Ok(report)
}
