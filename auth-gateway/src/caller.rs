use auth_identity::{role_names, ActorKind, TokenClaims};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated caller as carried by a verified access token.
///
/// Inserted into request extensions by the middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub user_id: Uuid,
    pub user_type: ActorKind,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub tenant_id: Option<Uuid>,
    /// Present for administrator sessions
    pub jti: Option<String>,
}

impl Caller {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Exact match only
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(role_names::SUPER_ADMIN)
    }
}

impl From<TokenClaims> for Caller {
    fn from(claims: TokenClaims) -> Self {
        Self {
            user_id: claims.sub,
            user_type: claims.user_type,
            roles: claims.roles,
            permissions: claims.permissions,
            tenant_id: claims.tenant_id,
            jti: claims.jti,
        }
    }
}
