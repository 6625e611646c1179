//! Operator tooling for the identity core
//!
//! Everything an operator does outside the HTTP surface: applying
//! migrations, installing the default roles, bootstrapping the first
//! administrator and handling account escalations.
//!
//! # Example Usage
//!
//! ```bash
//! gigline migrate
//! gigline seed
//! ADMIN_PASSWORD=... gigline create-admin --phone +15550001111 --roles SUPER_ADMIN
//! gigline set-status 0f9c... banned
//! gigline delete-user 0f9c... --hard
//! gigline purge-tokens --grace 7d
//! ```

use anyhow::{bail, Context, Result};
use auth_identity::config::parse_duration;
use auth_identity::{Actor, AuthService, CreateAdminRequest, LogoutSummary, SeedReport, User, UserStatus};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use database_layer::DatabasePool;
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// Role label recorded on audit events raised from the command line
pub const OPERATOR_ROLE: &str = "OPERATOR";

#[derive(Parser, Debug)]
#[command(name = "gigline")]
#[command(about = "Administer the Gigline identity and access core", version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// Install the default permission catalogue and system roles
    Seed,

    /// Create an administrator holding one or more admin roles
    CreateAdmin {
        #[arg(long)]
        phone: String,

        /// Comma-separated role names, the first becomes the active role
        #[arg(long, value_delimiter = ',', required = true)]
        roles: Vec<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        name: Option<String>,

        /// Without a password the account cannot log in until one is set
        #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Change an account status; anything but ACTIVE also ends its sessions
    SetStatus { user_id: Uuid, status: UserStatus },

    /// Delete an account (soft by default)
    DeleteUser {
        user_id: Uuid,

        #[arg(long)]
        hard: bool,
    },

    /// Remove refresh token rows that expired more than `grace` ago
    PurgeTokens {
        #[arg(long, default_value = "0s")]
        grace: String,
    },
}

/// What a command did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Migrated,
    Seeded(SeedReport),
    AdminCreated(User),
    StatusChanged {
        user_id: Uuid,
        status: UserStatus,
        summary: LogoutSummary,
    },
    Deleted {
        user_id: Uuid,
        hard: bool,
    },
    Purged(u64),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Migrated => write!(f, "{}", "✅ Migrations applied".green()),
            Self::Seeded(report) => write!(
                f,
                "{} groups={} permissions={} roles={} grants={}",
                "✅ Seed complete".green(),
                report.groups_created,
                report.permissions_created,
                report.roles_created,
                report.grants_added
            ),
            Self::AdminCreated(user) => write!(f, "{} {}", "✅ Administrator created".green(), user.id.to_string().bold()),
            Self::StatusChanged { user_id, status, summary } => write!(
                f,
                "{} {} -> {} (revoked {} tokens, ended {} sessions)",
                "✅ Status updated".green(),
                user_id,
                status.to_string().yellow(),
                summary.revoked_tokens,
                summary.terminated_sessions
            ),
            Self::Deleted { user_id, hard: true } => write!(f, "{} {}", "🗑  Permanently deleted".red(), user_id),
            Self::Deleted { user_id, hard: false } => write!(f, "{} {}", "✅ Deactivated".green(), user_id),
            Self::Purged(count) => write!(f, "{} {} expired refresh tokens", "🧹 Purged".cyan(), count),
        }
    }
}

/// Runs commands against an identity store
pub struct Operator {
    auth: AuthService,
    pool: Option<DatabasePool>,
    actor: Actor,
}

impl Operator {
    pub fn new(auth: AuthService, pool: Option<DatabasePool>) -> Self {
        Self {
            auth,
            pool,
            actor: Actor::system().with_role(OPERATOR_ROLE),
        }
    }

    pub async fn execute(&self, command: Command) -> Result<Outcome> {
        info!(command = command_name(&command), "Running operator command");

        match command {
            Command::Migrate => {
                let Some(pool) = &self.pool else {
                    bail!("migrate needs a database connection (set DATABASE_URL)");
                };
                pool.migrate().await.context("failed to apply migrations")?;
                Ok(Outcome::Migrated)
            }
            Command::Seed => {
                let report = auth_identity::seed_defaults(self.auth.store())
                    .await
                    .context("failed to seed default roles")?;
                Ok(Outcome::Seeded(report))
            }
            Command::CreateAdmin {
                phone,
                roles,
                email,
                name,
                password,
            } => {
                let request = CreateAdminRequest {
                    phone,
                    email,
                    password,
                    full_name: name,
                    role_names: roles,
                };
                let user = self.auth.create_admin(&self.actor, request).await?;
                Ok(Outcome::AdminCreated(user))
            }
            Command::SetStatus { user_id, status } => {
                let summary = self.auth.update_user_status(&self.actor, user_id, status).await?;
                Ok(Outcome::StatusChanged {
                    user_id,
                    status,
                    summary,
                })
            }
            Command::DeleteUser { user_id, hard } => {
                self.auth.delete_user(&self.actor, user_id, hard).await?;
                Ok(Outcome::Deleted { user_id, hard })
            }
            Command::PurgeTokens { grace } => {
                let cutoff = Utc::now()
                    .checked_sub_signed(parse_duration(&grace)?)
                    .with_context(|| format!("grace period '{grace}' reaches before the earliest representable time"))?;
                let purged = self.auth.store().refresh_tokens.purge_expired(cutoff).await?;
                Ok(Outcome::Purged(purged))
            }
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Migrate => "migrate",
        Command::Seed => "seed",
        Command::CreateAdmin { .. } => "create-admin",
        Command::SetStatus { .. } => "set-status",
        Command::DeleteUser { .. } => "delete-user",
        Command::PurgeTokens { .. } => "purge-tokens",
    }
}
