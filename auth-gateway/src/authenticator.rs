use auth_identity::repository::AdminSessionRepository;
use auth_identity::{ActorKind, IdentityStore, TokenCodec};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::caller::Caller;
use crate::error::{GuardError, Result};

/// Turns a bearer token into a [`Caller`].
///
/// Administrator tokens are additionally checked against their server-side
/// session, so terminating the session ends access before the token expires.
#[derive(Clone)]
pub struct Authenticator {
    codec: Arc<TokenCodec>,
    admin_sessions: Arc<dyn AdminSessionRepository>,
}

impl Authenticator {
    pub fn new(codec: Arc<TokenCodec>, admin_sessions: Arc<dyn AdminSessionRepository>) -> Self {
        Self { codec, admin_sessions }
    }

    pub fn from_store(codec: Arc<TokenCodec>, store: &IdentityStore) -> Self {
        Self::new(codec, Arc::clone(&store.admin_sessions))
    }

    pub async fn authenticate(&self, token: &str) -> Result<Caller> {
        let claims = self
            .codec
            .verify_access(token)
            .map_err(|_| GuardError::InvalidToken)?;

        if claims.user_type == ActorKind::Admin {
            let jti = claims.jti.as_deref().ok_or(GuardError::InvalidToken)?;
            let live = self
                .admin_sessions
                .find_active_by_jti(jti)
                .await?
                .is_some_and(|s| s.user_id == claims.sub && s.is_live(Utc::now()));

            if !live {
                warn!(user_id = %claims.sub, "Administrator session is no longer active");
                return Err(GuardError::SessionTerminated);
            }
        }

        debug!(user_id = %claims.sub, user_type = %claims.user_type, "Request authenticated");
        Ok(Caller::from(claims))
    }
}
