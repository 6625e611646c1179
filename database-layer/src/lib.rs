//! Database layer for the Gigline identity platform
//!
//! Provides the Postgres connection pool, an explicit transaction manager,
//! the embedded schema migrations and the audit sinks used by the identity
//! services.
//!
//! # Example
//!
//! ```rust,no_run
//! use database_layer::{AuditEvent, AuditSink, DatabaseConfig, DatabasePool, PgAuditSink};
//!
//! # async fn run() -> Result<(), database_layer::DatabaseError> {
//! let pool = DatabasePool::connect(&DatabaseConfig::from_env()?).await?;
//! pool.migrate().await?;
//!
//! let audit = PgAuditSink::new(pool.pool().clone());
//! audit.record(AuditEvent::new("system.started"));
//!
//! // Before shutting down
//! audit.flush().await;
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod connection;
pub mod error;
pub mod transaction;

pub use audit::*;
pub use connection::*;
pub use error::*;
pub use transaction::*;
