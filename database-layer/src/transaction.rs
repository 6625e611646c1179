// Explicit transaction management
use crate::connection::DatabasePool;
use crate::error::{DatabaseError, DatabaseResult};
use sqlx::{Postgres, Transaction};
use tracing::debug;

pub type PgTransaction = Transaction<'static, Postgres>;

/// Hands out owned transactions so callers can commit or roll back explicitly.
/// A transaction dropped without `commit` is rolled back by the driver.
#[derive(Clone, Debug)]
pub struct TransactionManager {
    pool: DatabasePool,
}

impl TransactionManager {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> DatabaseResult<PgTransaction> {
        debug!("Beginning transaction");
        self.pool
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::from_sqlx(e, "begin transaction"))
    }

    pub async fn commit(tx: PgTransaction) -> DatabaseResult<()> {
        tx.commit()
            .await
            .map_err(|e| DatabaseError::from_sqlx(e, "commit transaction"))?;
        debug!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(tx: PgTransaction) -> DatabaseResult<()> {
        tx.rollback()
            .await
            .map_err(|e| DatabaseError::from_sqlx(e, "rollback transaction"))?;
        debug!("Transaction rolled back");
        Ok(())
    }
}
