//! Request-time authentication and authorization
//!
//! Verifies access tokens, checks that administrator tokens still have a live
//! server-side session, and gates each route by actor kind and then by
//! required permissions. The axum adapter lives in [`middleware`].
//!
//! # Example
//!
//! ```rust,no_run
//! use auth_gateway::{authorize, Authenticator, GatewayState, GuardPipeline};
//! use auth_identity::{AuthService, IdentityConfig, IdentityStore};
//! use axum::{routing::post, Router};
//! use database_layer::TracingAuditSink;
//! use std::sync::Arc;
//!
//! # fn build() -> auth_identity::Result<Router> {
//! let store = IdentityStore::in_memory();
//! let auth = AuthService::new(store.clone(), &IdentityConfig::from_env()?, Arc::new(TracingAuditSink))?;
//!
//! let gateway = GatewayState::new(
//!     Authenticator::from_store(auth.token_codec(), &store),
//!     GuardPipeline::new().admin_only().permissions(["kyc:approve"]),
//! );
//!
//! let app = Router::new()
//!     .route("/kyc/approve", post(|| async { "approved" }))
//!     .layer(axum::middleware::from_fn_with_state(gateway, authorize));
//! # Ok(app)
//! # }
//! ```

pub mod authenticator;
pub mod caller;
pub mod error;
pub mod guard;
pub mod middleware;

pub use authenticator::Authenticator;
pub use caller::Caller;
pub use error::{GuardError, Result};
pub use guard::{require_actor_kind, require_permissions, GuardPipeline};
pub use middleware::{authorize, caller_of, extract_bearer, GatewayState};
