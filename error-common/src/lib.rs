//! Common error handling utilities for the Gigline identity platform
//!
//! Every crate in the workspace owns its own `thiserror` enum. This crate
//! supplies the shared vocabulary those enums map onto: a small set of
//! categories with fixed HTTP semantics, and stable machine-readable codes
//! that API consumers can match on without parsing messages.
//!
//! # Error Categories
//!
//! - **Conflict**: duplicate phone, duplicate role name, duplicate active assignment
//! - **Unauthorized**: bad credentials, invalid or expired tokens, revoked refresh tokens
//! - **Forbidden**: banned or suspended accounts, missing permissions, protected roles
//! - **NotFound**: unknown role, permission or user referenced by an operation
//! - **InvalidRequest**: structurally valid input that violates a domain rule
//! - **Internal**: storage, hashing or configuration failures
//!
//! # Example
//!
//! ```rust
//! use error_common::{codes, Categorized, ErrorBody, ErrorCategory};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("role already exists")]
//! struct DuplicateRole;
//!
//! impl Categorized for DuplicateRole {
//!     fn category(&self) -> ErrorCategory {
//!         ErrorCategory::Conflict
//!     }
//!
//!     fn code(&self) -> &'static str {
//!         codes::conflict::DUPLICATE_ROLE
//!     }
//! }
//!
//! let body = ErrorBody::from_error(&DuplicateRole);
//! assert_eq!(body.status, 409);
//! assert_eq!(body.code, "CONFLICT_1002");
//! ```

pub mod codes;
pub mod types;

pub use types::*;
