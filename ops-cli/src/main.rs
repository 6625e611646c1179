use anyhow::{Context, Result};
use auth_identity::{AuthService, IdentityConfig, IdentityStore};
use clap::Parser;
use colored::Colorize;
use database_layer::{DatabaseConfig, DatabasePool, PgAuditSink};
use logger_redacted::{init_tracing, LoggerConfig};
use ops_cli::{Cli, Operator};
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = %e, "Operator command failed");
        eprintln!("{} {:#}", "❌".red(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut logging = LoggerConfig::from_env();
    if cli.verbose {
        logging.log_level = "debug".to_string();
    }
    init_tracing(&logging).context("failed to initialise logging")?;

    let identity = IdentityConfig::from_env().context("invalid identity configuration")?;
    let database = DatabaseConfig::from_env()?;
    let pool = DatabasePool::connect(&database)
        .await
        .context("failed to connect to the database")?;

    let store = IdentityStore::postgres(&pool);
    let audit = Arc::new(PgAuditSink::new(pool.pool().clone()));
    let auth = AuthService::new(store, &identity, audit.clone())?;

    let outcome = Operator::new(auth, Some(pool.clone())).execute(cli.command).await;
    audit.flush().await;
    pool.close().await;

    println!("{}", outcome?);
    Ok(())
}
