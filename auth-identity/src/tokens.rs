//! Token codec for the three token classes
//!
//! Access and refresh tokens are signed with independent HS256 secrets so
//! that a leaked refresh secret cannot mint access tokens and vice versa.
//! Role-selection tokens share the access secret but carry a different
//! claim shape, so neither class deserializes as the other.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::error::{IdentityError, Result};
use crate::models::ActorKind;

pub const ROLE_SELECTION_PURPOSE: &str = "role_selection";

// =============================================================================
// CLAIMS
// =============================================================================

/// Identity and entitlements embedded in access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub sub: Uuid,
    pub user_type: ActorKind,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub tenant_id: Option<Uuid>,
}

/// Wire shape of access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub sub: Uuid,
    pub user_type: ActorKind,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    /// Serialized as `null` when absent
    pub tenant_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    fn new(session: &SessionClaims, jti: Option<String>, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: session.sub,
            user_type: session.user_type,
            roles: session.roles.clone(),
            permissions: session.permissions.clone(),
            tenant_id: session.tenant_id,
            jti,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// The carried payload, without token bookkeeping
    pub fn session(&self) -> SessionClaims {
        SessionClaims {
            sub: self.sub,
            user_type: self.user_type,
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
            tenant_id: self.tenant_id,
        }
    }
}

/// Narrow token for the administrator role-selection continuation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSelectionClaims {
    pub sub: Uuid,
    pub purpose: String,
    pub iat: i64,
    pub exp: i64,
}

/// A signed token together with the bookkeeping callers need to persist it
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: Option<String>,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// CODEC
// =============================================================================

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    role_selection_ttl: Duration,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: &TokenConfig) -> Result<Self> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            access: SigningKeys::from_secret(config.access_secret.expose_secret()),
            refresh: SigningKeys::from_secret(config.refresh_secret.expose_secret()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            role_selection_ttl: config.role_selection_ttl,
            validation,
        })
    }

    /// When an access token issued at `from` stops being valid
    pub fn access_expires_at(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
        expiry(from, self.access_ttl)
    }

    /// Sign an access token. `jti` is set only for administrator sessions.
    pub fn issue_access(&self, session: &SessionClaims, jti: Option<String>) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = expiry(now, self.access_ttl)?;
        let claims = TokenClaims::new(session, jti, now, expires_at);
        let token = sign(&claims, &self.access.encoding)?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    /// Sign a refresh token. Every refresh token gets a fresh `jti`, so two
    /// tokens issued in the same second for the same payload never collide.
    pub fn issue_refresh(&self, session: &SessionClaims) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = expiry(now, self.refresh_ttl)?;
        let claims = TokenClaims::new(session, Some(Uuid::new_v4().to_string()), now, expires_at);
        let token = sign(&claims, &self.refresh.encoding)?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    pub fn issue_role_selection(&self, user_id: Uuid) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = expiry(now, self.role_selection_ttl)?;
        let claims = RoleSelectionClaims {
            sub: user_id,
            purpose: ROLE_SELECTION_PURPOSE.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        Ok(IssuedToken {
            token: sign(&claims, &self.access.encoding)?,
            jti: None,
            expires_at,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenClaims> {
        self.verify(token, &self.access.decoding)
            .ok_or(IdentityError::InvalidToken)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims> {
        self.verify(token, &self.refresh.decoding)
            .ok_or(IdentityError::RefreshRejected)
    }

    pub fn verify_role_selection(&self, token: &str) -> Result<RoleSelectionClaims> {
        self.verify::<RoleSelectionClaims>(token, &self.access.decoding)
            .filter(|claims| claims.purpose == ROLE_SELECTION_PURPOSE)
            .ok_or(IdentityError::InvalidRoleSelectionToken)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Option<T> {
        match decode::<T>(token, key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(error = %e, "Token verification failed");
                None
            }
        }
    }
}

/// `issued_at + ttl`, or an error when the sum leaves chrono's range
pub fn expiry(issued_at: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    issued_at
        .checked_add_signed(ttl)
        .ok_or_else(|| IdentityError::TokenSigning(format!("token lifetime {ttl} is out of range")))
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| IdentityError::TokenSigning(e.to_string()))
}

/// Fast digest used for refresh-token ledger lookups. Never store the raw token.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    BASE64.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&TokenConfig::new("access-secret", "refresh-secret").unwrap()).unwrap()
    }

    fn session() -> SessionClaims {
        SessionClaims {
            sub: Uuid::new_v4(),
            user_type: ActorKind::Admin,
            roles: vec!["KYC_ADMIN".into()],
            permissions: vec!["kyc:view".into()],
            tenant_id: None,
        }
    }

    #[test]
    fn test_access_claims_wire_shape() {
        let codec = codec();
        let session = session();
        let issued = codec.issue_access(&session, Some("jti-1".into())).unwrap();
        let claims = codec.verify_access(&issued.token).unwrap();

        assert_eq!(claims.session(), session);
        assert_eq!(claims.jti.as_deref(), Some("jti-1"));
        assert_eq!(claims.exp - claims.iat, 15 * 60);

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["userType"], "ADMIN");
        assert!(json["tenantId"].is_null());
        assert!(json.get("tenant_id").is_none());
    }

    #[test]
    fn test_access_without_jti_omits_the_claim() {
        let codec = codec();
        let issued = codec.issue_access(&session(), None).unwrap();
        let claims = codec.verify_access(&issued.token).unwrap();

        assert!(claims.jti.is_none());
        assert!(serde_json::to_value(&claims).unwrap().get("jti").is_none());
    }

    #[test]
    fn test_refresh_tokens_always_carry_unique_jti() {
        let codec = codec();
        let session = session();
        let first = codec.issue_refresh(&session).unwrap();
        let second = codec.issue_refresh(&session).unwrap();

        assert!(first.jti.is_some());
        assert_ne!(first.jti, second.jti);
        assert_ne!(hash_token(&first.token), hash_token(&second.token));
    }

    #[test]
    fn test_secrets_do_not_cross_verify() {
        let codec = codec();
        let session = session();
        let access = codec.issue_access(&session, None).unwrap();
        let refresh = codec.issue_refresh(&session).unwrap();

        assert!(matches!(codec.verify_refresh(&access.token), Err(IdentityError::RefreshRejected)));
        assert!(matches!(codec.verify_access(&refresh.token), Err(IdentityError::InvalidToken)));
    }

    #[test]
    fn test_role_selection_isolation() {
        let codec = codec();
        let user_id = Uuid::new_v4();
        let temp = codec.issue_role_selection(user_id).unwrap();

        let claims = codec.verify_role_selection(&temp.token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.purpose, ROLE_SELECTION_PURPOSE);

        // Missing roles/permissions: never usable as an access token
        assert!(codec.verify_access(&temp.token).is_err());

        // And an access token is never accepted as a role-selection token
        let access = codec.issue_access(&session(), None).unwrap();
        assert!(codec.verify_role_selection(&access.token).is_err());
    }

    #[test]
    fn test_wrong_purpose_rejected() {
        let codec = codec();
        let claims = RoleSelectionClaims {
            sub: Uuid::new_v4(),
            purpose: "password_reset".into(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();

        assert!(matches!(
            codec.verify_role_selection(&token),
            Err(IdentityError::InvalidRoleSelectionToken)
        ));
    }

    #[test]
    fn test_expired_and_tampered_tokens_rejected() {
        let codec = codec();
        let past = Utc::now() - Duration::hours(1);
        let expired = TokenClaims::new(&session(), None, past, past + Duration::minutes(15));
        let token = encode(
            &Header::new(Algorithm::HS256),
            &expired,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();
        assert!(codec.verify_access(&token).is_err());

        let valid = codec.issue_access(&session(), None).unwrap().token;
        let mut tampered = valid.clone();
        tampered.push('x');
        assert!(codec.verify_access(&tampered).is_err());
    }

    #[test]
    fn test_expiry_out_of_range_is_an_error() {
        let now = Utc::now();
        assert_eq!(expiry(now, Duration::minutes(15)).unwrap(), now + Duration::minutes(15));

        let huge = Duration::try_days(365_000_000).unwrap();
        assert!(matches!(expiry(now, huge), Err(IdentityError::TokenSigning(_))));
        assert!(matches!(expiry(DateTime::<Utc>::MAX_UTC, Duration::seconds(1)), Err(IdentityError::TokenSigning(_))));
    }

    #[test]
    fn test_hash_token_is_deterministic_and_opaque() {
        let hash = hash_token("some.refresh.token");
        assert_eq!(hash, hash_token("some.refresh.token"));
        assert!(!hash.contains("refresh"));
        assert_eq!(hash.len(), 44);
    }
}
