use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use ewallet_core::{AccountId, Money, TransactionId};
use ewallet_ledger::{Account, LedgerEntry, NewAccount, NewLedgerEntry};

use super::r#trait::{Deadline, LedgerStore, StoreError, UnitOfWork};

/// Store step that can be made to fail or stall once, for exercising rollback
/// and timeout paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    SetBalance,
    AppendTransaction,
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    entries: Vec<LedgerEntry>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<AccountId, Arc<RowLock<()>>>>,
    faults: Mutex<HashSet<FaultPoint>>,
    delays: Mutex<HashMap<FaultPoint, Duration>>,
    next_account_id: AtomicI64,
    next_entry_id: AtomicI64,
}

impl Shared {
    fn row_lock(&self, account_id: AccountId) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(account_id).or_default().clone())
    }

    /// Sleep for the delay armed at `point`, if any, then run the fault check.
    async fn enter(&self, point: FaultPoint) -> Result<(), StoreError> {
        let delay = self.delays.lock().map_err(|_| poisoned())?.remove(&point);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_fault(point)
    }

    fn check_fault(&self, point: FaultPoint) -> Result<(), StoreError> {
        let armed = self.faults.lock().map_err(|_| poisoned())?.remove(&point);
        if !armed {
            return Ok(());
        }
        Err(match point {
            FaultPoint::Begin => StoreError::Unavailable("injected fault at begin".to_string()),
            other => StoreError::Backend(format!("injected fault at {other:?}")),
        })
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory ledger store.
///
/// Intended for tests/benchmarks. Row locks are per-account async mutexes held
/// by the unit that acquired them; writes are staged inside the unit and
/// applied to the shared tables only on commit. Ids come from counters that are
/// not rolled back, so (as with database sequences) a rolled-back unit leaves a
/// gap.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next operation at `point` fail (one-shot).
    pub fn fail_next(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.insert(point);
        }
    }

    /// Make the next operation at `point` sleep for `delay` first (one-shot).
    pub fn delay_next(&self, point: FaultPoint, delay: Duration) {
        if let Ok(mut delays) = self.shared.delays.lock() {
            delays.insert(point, delay);
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Unit = InMemoryUnit;

    async fn begin(&self) -> Result<InMemoryUnit, StoreError> {
        self.shared.enter(FaultPoint::Begin).await?;
        Ok(InMemoryUnit {
            shared: self.shared.clone(),
            held: HashMap::new(),
            new_accounts: BTreeMap::new(),
            balances: HashMap::new(),
            entries: Vec::new(),
        })
    }
}

/// Unit of work over [`InMemoryLedgerStore`].
#[derive(Debug)]
pub struct InMemoryUnit {
    shared: Arc<Shared>,
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    new_accounts: BTreeMap<AccountId, Account>,
    balances: HashMap<AccountId, Money>,
    entries: Vec<LedgerEntry>,
}

impl InMemoryUnit {
    /// Account as seen from inside this unit (committed state + staged writes).
    fn view(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        let base = match self.new_accounts.get(&account_id) {
            Some(account) => Some(account.clone()),
            None => self
                .shared
                .tables
                .read()
                .map_err(|_| poisoned())?
                .accounts
                .get(&account_id)
                .cloned(),
        };

        Ok(base.map(|mut account| {
            if let Some(balance) = self.balances.get(&account_id) {
                account.balance = *balance;
            }
            account
        }))
    }

    async fn acquire(&mut self, account_id: AccountId, deadline: Deadline) -> Result<(), StoreError> {
        if self.held.contains_key(&account_id) {
            return Ok(());
        }

        let lock = self.shared.row_lock(account_id)?;
        let guard = match deadline.instant() {
            Some(at) => tokio::time::timeout_at(at, lock.lock_owned())
                .await
                .map_err(|_| {
                    StoreError::LockTimeout(format!("account {account_id} is locked by another unit"))
                })?,
            None => lock.lock_owned().await,
        };

        self.held.insert(account_id, guard);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    async fn lock_account_for_update(
        &mut self,
        account_id: AccountId,
        deadline: Deadline,
    ) -> Result<Option<Account>, StoreError> {
        self.acquire(account_id, deadline).await?;

        let account = self.view(account_id)?;
        if account.is_none() {
            // Nothing to lock; do not keep other units waiting on a phantom row.
            self.held.remove(&account_id);
        }
        Ok(account)
    }

    async fn find_account(&mut self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        self.view(account_id)
    }

    async fn find_account_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Account>, StoreError> {
        let id = match self.new_accounts.values().find(|a| a.username == username) {
            Some(account) => Some(account.id),
            None => self
                .shared
                .tables
                .read()
                .map_err(|_| poisoned())?
                .accounts
                .values()
                .find(|a| a.username == username)
                .map(|a| a.id),
        };

        match id {
            Some(id) => self.view(id),
            None => Ok(None),
        }
    }

    async fn insert_account(&mut self, account: &NewAccount) -> Result<Account, StoreError> {
        let taken = self.new_accounts.values().any(|a| a.username == account.username())
            || self
                .shared
                .tables
                .read()
                .map_err(|_| poisoned())?
                .accounts
                .values()
                .any(|a| a.username == account.username());
        if taken {
            return Err(StoreError::Conflict(format!(
                "username '{}' already exists",
                account.username()
            )));
        }

        let id = AccountId::new(self.shared.next_account_id.fetch_add(1, Ordering::SeqCst) + 1);
        let row = account.clone().into_account(id);
        self.new_accounts.insert(id, row.clone());
        Ok(row)
    }

    async fn set_balance(&mut self, account_id: AccountId, balance: Money) -> Result<(), StoreError> {
        self.shared.enter(FaultPoint::SetBalance).await?;

        if balance.is_negative() {
            return Err(StoreError::Constraint(format!(
                "balance of account {account_id} must not be negative"
            )));
        }

        // An UPDATE takes the row lock implicitly.
        self.acquire(account_id, Deadline::none()).await?;

        if self.view(account_id)?.is_none() {
            return Err(StoreError::MissingRow(format!("account {account_id}")));
        }
        self.balances.insert(account_id, balance);
        Ok(())
    }

    async fn append_transaction(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, StoreError> {
        self.shared.enter(FaultPoint::AppendTransaction).await?;

        if let Some(account_id) = entry.account_id {
            if self.view(account_id)?.is_none() {
                return Err(StoreError::Constraint(format!(
                    "transaction references unknown account {account_id}"
                )));
            }
        }

        let id = TransactionId::new(self.shared.next_entry_id.fetch_add(1, Ordering::SeqCst) + 1);
        let stored = entry.into_entry(id, Utc::now());
        self.entries.push(stored.clone());
        Ok(stored)
    }

    async fn list_transactions(&mut self, account_id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .entries
            .iter()
            .chain(self.entries.iter())
            .filter(|e| e.account_id == Some(account_id))
            .cloned()
            .collect())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.shared.enter(FaultPoint::Commit).await?;

        let InMemoryUnit {
            shared,
            held,
            new_accounts,
            balances,
            entries,
        } = self;

        let mut tables = shared.tables.write().map_err(|_| poisoned())?;

        for account in new_accounts.values() {
            if tables.accounts.values().any(|a| a.username == account.username) {
                return Err(StoreError::Conflict(format!(
                    "username '{}' already exists",
                    account.username
                )));
            }
        }

        tables.accounts.extend(new_accounts);
        for (account_id, balance) in balances {
            if let Some(account) = tables.accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }
        tables.entries.extend(entries);

        // Publish before releasing row locks so the next holder reads the new balance.
        drop(tables);
        drop(held);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        let outcome = self.shared.enter(FaultPoint::Rollback).await;
        // Staged writes and row locks go away with the unit either way.
        drop(self);
        outcome
    }
}
