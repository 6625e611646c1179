//! Authorization guards
//!
//! Two plain functions over a [`Caller`]: the actor-kind guard and the
//! permission guard. [`GuardPipeline`] composes them, always running the
//! actor-kind check first.

use auth_identity::ActorKind;
use tracing::warn;

use crate::caller::Caller;
use crate::error::{GuardError, Result};

/// Allow only callers whose actor kind is listed. An empty list allows everyone.
pub fn require_actor_kind(allowed: &[ActorKind], caller: &Caller) -> Result<()> {
    if allowed.is_empty() || allowed.contains(&caller.user_type) {
        return Ok(());
    }

    warn!(
        user_id = %caller.user_id,
        actual = %caller.user_type,
        allowed = ?allowed,
        "Actor kind check failed"
    );
    Err(GuardError::WrongActorKind {
        actual: caller.user_type,
    })
}

/// Require every listed permission.
///
/// An empty list means "authenticated only". Holders of `SUPER_ADMIN` pass
/// regardless of what is listed.
pub fn require_permissions<S: AsRef<str>>(required: &[S], caller: &Caller) -> Result<()> {
    if required.is_empty() || caller.is_super_admin() {
        return Ok(());
    }

    if let Some(missing) = required.iter().find(|p| !caller.has_permission(p.as_ref())) {
        warn!(
            user_id = %caller.user_id,
            missing = %missing.as_ref(),
            "Permission denied"
        );
        return Err(GuardError::InsufficientPermissions);
    }
    Ok(())
}

/// Ordered guard chain for one route
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardPipeline {
    actor_kinds: Vec<ActorKind>,
    permissions: Vec<String>,
}

impl GuardPipeline {
    /// Authenticated callers of any kind
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor_kinds(mut self, kinds: impl IntoIterator<Item = ActorKind>) -> Self {
        self.actor_kinds.extend(kinds);
        self
    }

    pub fn admin_only(self) -> Self {
        self.actor_kinds([ActorKind::Admin])
    }

    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn check(&self, caller: &Caller) -> Result<()> {
        require_actor_kind(&self.actor_kinds, caller)?;
        require_permissions(&self.permissions, caller)
    }
}
