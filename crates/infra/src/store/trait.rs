use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use ewallet_core::{AccountId, Money};
use ewallet_ledger::{Account, LedgerEntry, NewAccount, NewLedgerEntry};

/// Point in time after which a caller no longer wants to wait.
///
/// `Deadline::none()` waits indefinitely. Deadlines are threaded into the
/// row-lock wait so a stuck lock holder cannot pin a caller forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub const fn none() -> Self {
        Self(None)
    }

    pub const fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Time left before expiry (zero once expired), or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn has_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// The earlier of two deadlines.
    pub fn min(self, other: Deadline) -> Deadline {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Deadline(Some(a.min(b))),
            (Some(a), None) | (None, Some(a)) => Deadline(Some(a)),
            (None, None) => Deadline(None),
        }
    }
}

/// Ledger store operation error.
///
/// These are **infrastructure errors** (connectivity, locking, constraints) as
/// opposed to domain errors (insufficient funds, validation).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or a connection could not be obtained.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Waiting for a row lock, or for a unit to open, outlasted the caller's
    /// deadline.
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),

    /// A uniqueness constraint rejected the write (e.g. duplicate username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A check or foreign-key constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A write targeted a row that does not exist.
    #[error("row not found: {0}")]
    MissingRow(String),

    /// Any other storage failure.
    #[error("storage error: {0}")]
    Backend(String),
}

/// Durable ledger storage that hands out atomic units of work.
///
/// Every read or write goes through a [`UnitOfWork`]; there is no
/// "no transaction" path. Contexts that do not need a multi-statement
/// transaction simply open a unit, run one statement and commit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Unit: UnitOfWork;

    /// Open a new atomic unit of work.
    async fn begin(&self) -> Result<Self::Unit, StoreError>;
}

/// One atomic unit of work against the ledger store.
///
/// ## Locking
///
/// `lock_account_for_update` takes an exclusive lock on one account row that
/// is held until the unit commits or rolls back. A second unit locking the same
/// account waits; units locking different accounts never wait on each other.
///
/// ## Completion
///
/// `commit` and `rollback` consume the unit, so each unit is completed at most
/// once. A unit dropped without either is rolled back: none of its writes
/// become visible and its locks are released.
///
/// ## Interruption
///
/// Dropping an in-flight call does not abort work already sent to the store.
/// On Postgres a `FOR UPDATE` wait keeps running on the server until its
/// `lock_timeout` fires or the holder releases the row, and the connection is
/// busy until then. `rollback` on such a unit waits for that too; drop the
/// unit instead when the caller must not wait.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read an account and hold an exclusive lock on its row.
    ///
    /// Waits at most until `deadline`; expiry yields [`StoreError::LockTimeout`].
    /// Returns `Ok(None)` when the account does not exist.
    async fn lock_account_for_update(
        &mut self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Option<Account>, StoreError>;

    /// Read an account without locking it.
    async fn find_account(&mut self, account_id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn find_account_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Insert a new account with a zero balance.
    async fn insert_account(&mut self, account: &NewAccount) -> Result<Account, StoreError>;

    async fn set_balance(&mut self, account_id: AccountId, balance: Money) -> Result<(), StoreError>;

    /// Append an immutable ledger entry; the store assigns id and timestamp.
    async fn append_transaction(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, StoreError>;

    /// Entries referencing `account_id`, in insertion order.
    async fn list_transactions(&mut self, account_id: AccountId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Make every write of this unit visible atomically and release its locks.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard every write of this unit and release its locks.
    async fn rollback(self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore,
{
    type Unit = S::Unit;

    async fn begin(&self) -> Result<Self::Unit, StoreError> {
        (**self).begin().await
    }
}
