//! Identity core for the Gigline marketplace
//!
//! Credentials, token issuance and rotation, the administrator role-selection
//! protocol and the role & permission graph. Storage is reached through the
//! repository traits in [`repository`], bundled in an [`IdentityStore`] that
//! callers construct once and pass into each service.
//!
//! # Example
//!
//! ```rust,no_run
//! use auth_identity::{seed_defaults, AuthService, IdentityConfig, IdentityStore, LoginRequest};
//! use database_layer::TracingAuditSink;
//! use std::sync::Arc;
//!
//! # async fn run() -> auth_identity::Result<()> {
//! let store = IdentityStore::in_memory();
//! seed_defaults(&store).await?;
//!
//! let config = IdentityConfig::from_env()?;
//! let auth = AuthService::new(store, &config, Arc::new(TracingAuditSink))?;
//!
//! let outcome = auth
//!     .login(LoginRequest {
//!         phone: "+15550001111".into(),
//!         password: "correct horse".into(),
//!         ip_address: None,
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod password;
pub mod rbac;
pub mod repository;
pub mod seed;
pub mod service;
pub mod tokens;

pub use config::{IdentityConfig, TokenConfig};
pub use error::{IdentityError, Result};
pub use models::*;
pub use password::PasswordHasher;
pub use rbac::{
    AssignRoleRequest, CreatePermissionRequest, CreateRoleRequest, PermissionListing, RoleDetails,
    RoleService, UpdateRoleRequest,
};
pub use repository::IdentityStore;
pub use seed::{seed_defaults, SeedReport};
pub use service::AuthService;
pub use tokens::{hash_token, SessionClaims, TokenClaims, TokenCodec};
