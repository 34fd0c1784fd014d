//! Postgres-backed ledger store.
//!
//! Each [`PostgresUnit`] wraps one database transaction. Row locks are plain
//! `SELECT ... FOR UPDATE`; the caller's deadline is pushed down as a
//! transaction-local `lock_timeout` so Postgres itself stops the wait.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key / check violation) | `23503`, `23514` | `Constraint` |
//! | Database (numeric value out of range) | `22003` | `Constraint` |
//! | Database (lock not available / statement cancelled) | `55P03`, `57014` | `LockTimeout` |
//! | Database (connection exception class) | `08xxx` | `Unavailable` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut, PoolClosed, Io, Tls | N/A | `Unavailable` |
//! | RowNotFound | N/A | `MissingRow` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use ewallet_core::{AccountId, Amount, Money, TransactionId};
use ewallet_ledger::{Account, EntryKind, LedgerEntry, NewAccount, NewLedgerEntry};

use crate::config::DatabaseConfig;

use super::r#trait::{Deadline, LedgerStore, StoreError, UnitOfWork};

/// Postgres ledger store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Build the connection pool described by `config`.
    ///
    /// The pool connects lazily; the first unit of work surfaces an
    /// unreachable database as [`StoreError::Unavailable`].
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(0)
            .idle_timeout(config.idle_timeout)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.url)
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Unit = PostgresUnit;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<PostgresUnit, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        Ok(PostgresUnit { tx })
    }
}

/// One Postgres transaction. Dropping it without commit rolls back.
pub struct PostgresUnit {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresUnit").finish_non_exhaustive()
    }
}

impl PostgresUnit {
    async fn set_lock_timeout(&mut self, deadline: Deadline) -> Result<(), StoreError> {
        // 0 disables the timeout; any bounded wait is at least 1ms so an
        // almost-expired deadline does not turn into "wait forever".
        let timeout = match deadline.remaining() {
            Some(left) => format!("{}ms", left.as_millis().max(1)),
            None => "0".to_string(),
        };

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(timeout)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnit {
    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn lock_account_for_update(
        &mut self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Option<Account>, StoreError> {
        if deadline.has_expired() {
            return Err(StoreError::LockTimeout(format!(
                "deadline passed before locking account {account_id}"
            )));
        }
        self.set_lock_timeout(deadline).await?;

        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, balance
            FROM accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_account_for_update", e))?;

        row.map(|r| AccountRow::from_row(&r).map(Account::from))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_account", e))
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn find_account(&mut self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, balance
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_account", e))?;

        row.map(|r| AccountRow::from_row(&r).map(Account::from))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_account", e))
    }

    #[instrument(skip(self), err)]
    async fn find_account_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, balance
            FROM accounts
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_account_by_username", e))?;

        row.map(|r| AccountRow::from_row(&r).map(Account::from))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_account", e))
    }

    #[instrument(skip(self, account), fields(username = %account.username()), err)]
    async fn insert_account(&mut self, account: &NewAccount) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, balance
            "#,
        )
        .bind(account.username())
        .bind(account.password_hash())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;

        AccountRow::from_row(&row)
            .map(Account::from)
            .map_err(|e| map_sqlx_error("decode_account", e))
    }

    #[instrument(skip(self), fields(account_id = %account_id, balance = %balance), err)]
    async fn set_balance(&mut self, account_id: AccountId, balance: Money) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account_id.get())
        .bind(balance.as_decimal())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_balance", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingRow(format!("account {account_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, entry), fields(kind = %entry.kind, amount = %entry.amount), err)]
    async fn append_transaction(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (account_id, amount, type)
            VALUES ($1, $2, $3::transaction_type)
            RETURNING id, account_id, amount, type::text AS type, created_at
            "#,
        )
        .bind(entry.account_id.map(AccountId::get))
        .bind(entry.amount.as_decimal())
        .bind(entry.kind.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_transaction", e))?;

        EntryRow::from_row(&row)
            .map_err(|e| map_sqlx_error("decode_transaction", e))?
            .try_into()
    }

    #[instrument(skip(self), fields(account_id = %account_id), err)]
    async fn list_transactions(&mut self, account_id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, type::text AS type, created_at
            FROM transactions
            WHERE account_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(account_id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_transactions", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = EntryRow::from_row(&row).map_err(|e| map_sqlx_error("decode_transaction", e))?;
            entries.push(entry.try_into()?);
        }
        Ok(entries)
    }

    #[instrument(skip(self), err)]
    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") | Some("23514") => StoreError::Constraint(msg),
                // numeric_value_out_of_range: a value wider than NUMERIC(20,4)
                Some("22003") => StoreError::Constraint(msg),
                // lock_not_available, query_canceled (lock_timeout / statement_timeout)
                Some("55P03") | Some("57014") => StoreError::LockTimeout(msg),
                Some(code) if code.starts_with("08") => StoreError::Unavailable(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("timed out acquiring a connection in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::RowNotFound => {
            StoreError::MissingRow(format!("unexpected row not found in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    id: i64,
    username: String,
    password_hash: String,
    balance: Decimal,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            balance: row.try_get("balance")?,
        })
    }
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId::new(row.id),
            username: row.username,
            password_hash: row.password_hash,
            balance: Money::new(row.balance),
        }
    }
}

#[derive(Debug)]
struct EntryRow {
    id: i64,
    account_id: Option<i64>,
    amount: Decimal,
    kind: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EntryRow {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            amount: row.try_get("amount")?,
            kind: row.try_get("type")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let amount = Amount::new(row.amount)
            .map_err(|e| StoreError::Backend(format!("invalid stored amount for transaction {}: {e}", row.id)))?;
        let kind = row
            .kind
            .parse::<EntryKind>()
            .map_err(|e| StoreError::Backend(format!("invalid stored type for transaction {}: {e}", row.id)))?;

        Ok(LedgerEntry {
            id: TransactionId::new(row.id),
            account_id: row.account_id.map(AccountId::new),
            amount,
            kind,
            created_at: row.created_at,
        })
    }
}
