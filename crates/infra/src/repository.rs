//! Account repository: the typed query boundary over a [`LedgerStore`].
//!
//! Every operation runs inside an explicit unit of work. Callers that need
//! several statements to commit together open a unit with
//! [`AccountRepository::begin`] and obtain a handle scoped to it with
//! [`AccountRepository::bound_to`]. The remaining methods are one-statement
//! conveniences that open, use and commit their own unit.

use tracing::{instrument, warn};

use ewallet_core::{AccountId, Money};
use ewallet_ledger::{Account, AccountStatement, LedgerEntry, NewAccount, NewLedgerEntry};

use crate::store::{Deadline, LedgerStore, StoreError, UnitOfWork};

#[derive(Debug, Clone)]
pub struct AccountRepository<S> {
    store: S,
}

impl<S> AccountRepository<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Open a unit of work, giving up once `deadline` passes.
    ///
    /// Running out of time here is reported as [`StoreError::LockTimeout`], the
    /// same as running out of time on a row lock.
    pub async fn begin(&self, deadline: Deadline) -> Result<S::Unit, StoreError> {
        match deadline.instant() {
            Some(at) => tokio::time::timeout_at(at, self.store.begin())
                .await
                .map_err(|_| {
                    StoreError::LockTimeout("deadline passed while opening a unit of work".to_string())
                })?,
            None => self.store.begin().await,
        }
    }

    /// Repository handle whose every operation runs inside `unit`.
    pub fn bound_to<'u>(&self, unit: &'u mut S::Unit) -> BoundRepository<'u, S::Unit> {
        BoundRepository { unit }
    }

    #[instrument(skip(self, account), fields(username = %account.username()), err)]
    pub async fn create_account(&self, account: &NewAccount, deadline: Deadline) -> Result<Account, StoreError> {
        let mut unit = self.begin(deadline).await?;
        let result = self.bound_to(&mut unit).insert_account(account).await;
        finish(unit, result).await
    }

    pub async fn get_account(&self, account_id: AccountId, deadline: Deadline) -> Result<Option<Account>, StoreError> {
        let mut unit = self.begin(deadline).await?;
        let result = self.bound_to(&mut unit).find_account(account_id).await;
        finish(unit, result).await
    }

    pub async fn find_by_username(&self, username: &str, deadline: Deadline) -> Result<Option<Account>, StoreError> {
        let mut unit = self.begin(deadline).await?;
        let result = self.bound_to(&mut unit).find_account_by_username(username).await;
        finish(unit, result).await
    }

    pub async fn list_transactions(
        &self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut unit = self.begin(deadline).await?;
        let result = self.bound_to(&mut unit).list_transactions(account_id).await;
        finish(unit, result).await
    }

    /// Account and its entries, read in one unit so they agree with each other.
    ///
    /// The account row is locked for the duration of the read so no posting
    /// can land between the two statements. Waiting for that lock is bounded
    /// by `deadline` like any posting.
    #[instrument(skip(self), fields(account_id = %account_id), err)]
    pub async fn statement(
        &self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Option<AccountStatement>, StoreError> {
        let mut unit = self.begin(deadline).await?;
        let result: Result<Option<AccountStatement>, StoreError> = async {
            let mut repo = self.bound_to(&mut unit);
            let Some(account) = repo.lock_account_for_update(account_id, deadline).await? else {
                return Ok(None);
            };
            let entries = repo.list_transactions(account_id).await?;
            Ok(Some(AccountStatement { account, entries }))
        }
        .await;
        finish(unit, result).await
    }
}

/// Commit on success; on failure roll back and return the original error.
async fn finish<U, T>(unit: U, result: Result<T, StoreError>) -> Result<T, StoreError>
where
    U: UnitOfWork,
{
    match result {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                warn!(error = %rollback_err, original = %err, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Repository operations scoped to one unit of work.
#[derive(Debug)]
pub struct BoundRepository<'u, U> {
    unit: &'u mut U,
}

impl<U> BoundRepository<'_, U>
where
    U: UnitOfWork,
{
    pub async fn lock_account_for_update(
        &mut self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Option<Account>, StoreError> {
        self.unit.lock_account_for_update(account_id, deadline).await
    }

    pub async fn find_account(&mut self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        self.unit.find_account(account_id).await
    }

    pub async fn find_account_by_username(&mut self, username: &str) -> Result<Option<Account>, StoreError> {
        self.unit.find_account_by_username(username).await
    }

    pub async fn insert_account(&mut self, account: &NewAccount) -> Result<Account, StoreError> {
        self.unit.insert_account(account).await
    }

    pub async fn update_balance(&mut self, account_id: AccountId, balance: Money) -> Result<(), StoreError> {
        self.unit.set_balance(account_id, balance).await
    }

    pub async fn append_transaction(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        self.unit.append_transaction(entry).await
    }

    pub async fn list_transactions(&mut self, account_id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.unit.list_transactions(account_id).await
    }
}
