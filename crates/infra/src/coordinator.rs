//! Transaction coordinator: the credit/debit pipeline.
//!
//! ## Posting Flow
//!
//! ```text
//! create_credit / create_debit
//!   ↓
//! 1. Begin a unit of work                     (Idle)
//!   ↓
//! 2. Lock the account row                     (LockAcquired)
//!   ↓
//! 3. Validate: debits must be covered         (Validated)
//!   ↓
//! 4. Write the new balance                    (Mutated)
//!   ↓
//! 5. Append the immutable ledger entry        (Recorded)
//!   ↓
//! 6. Commit                                   (Committed)
//! ```
//!
//! Any failure after step 1 rolls the unit back (`RolledBack`) before the error
//! is returned, so a failed posting leaves no trace in the store.
//!
//! ## Concurrency
//!
//! The coordinator holds no in-process lock. Postings on one account are
//! serialised by the store's row lock; postings on different accounts never
//! wait on each other.
//!
//! ## Deadlines and Cancellation
//!
//! Every step runs under the caller's [`CallContext`]. The row-lock wait is
//! bounded by the deadline inside the store as well, and the commit is skipped
//! in favour of a rollback when the call was interrupted before it. Dropping the
//! returned future drops the unit, which also rolls back.
//!
//! An interrupted call does not wait for its rollback. The step it abandoned
//! may still be running inside the database (a lock wait has no client-side
//! abort), so the unit is dropped and the store finishes the rollback on its
//! own once that step ends.

use std::future::Future;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use ewallet_core::{AccountId, Amount, DomainError, Money, TransactionId};
use ewallet_ledger::{EntryKind, NewLedgerEntry, post};

use crate::context::{CallContext, Interruption};
use crate::repository::AccountRepository;
use crate::store::{LedgerStore, StoreError, UnitOfWork};

/// Result of a committed posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PostingReceipt {
    pub transaction_id: TransactionId,
    pub new_balance: Money,
}

/// Progress of one posting through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingStage {
    Idle,
    LockAcquired,
    Validated,
    Mutated,
    Recorded,
    Committed,
    RolledBack,
}

impl PostingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PostingStage::Idle => "idle",
            PostingStage::LockAcquired => "lock_acquired",
            PostingStage::Validated => "validated",
            PostingStage::Mutated => "mutated",
            PostingStage::Recorded => "recorded",
            PostingStage::Committed => "committed",
            PostingStage::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for PostingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable classification of [`CoordinatorError`] for callers mapping to their
/// own error surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    LimitExceeded,
    Timeout,
    Cancelled,
    Internal,
}

/// Posting failure. Every variant implies the unit was rolled back.
///
/// `stage` is the last stage the posting reached before failing.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("account {0} not found")]
    NotFound(AccountId),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Money,
        requested: Amount,
    },

    #[error("Balance limit exceeded: balance {balance}, requested {requested}")]
    BalanceLimitExceeded {
        account_id: AccountId,
        balance: Money,
        requested: Amount,
    },

    #[error("deadline exceeded (stage: {stage})")]
    DeadlineExceeded { stage: PostingStage },

    #[error("cancelled by caller (stage: {stage})")]
    Cancelled { stage: PostingStage },

    #[error("ledger invariant violated: {0}")]
    Invariant(String),

    #[error("store failure (stage: {stage}): {source}")]
    Internal {
        stage: PostingStage,
        #[source]
        source: StoreError,
    },
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::NotFound(_) => ErrorKind::NotFound,
            CoordinatorError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            CoordinatorError::BalanceLimitExceeded { .. } => ErrorKind::LimitExceeded,
            CoordinatorError::DeadlineExceeded { .. } => ErrorKind::Timeout,
            CoordinatorError::Cancelled { .. } => ErrorKind::Cancelled,
            CoordinatorError::Invariant(_) | CoordinatorError::Internal { .. } => ErrorKind::Internal,
        }
    }

    fn from_store(stage: PostingStage, source: StoreError) -> Self {
        match source {
            // The store's lock wait is bounded by the same deadline.
            StoreError::LockTimeout(_) => CoordinatorError::DeadlineExceeded { stage },
            source => CoordinatorError::Internal { stage, source },
        }
    }

    fn interrupted(interruption: Interruption, stage: PostingStage) -> Self {
        match interruption {
            Interruption::DeadlineExceeded => CoordinatorError::DeadlineExceeded { stage },
            Interruption::Cancelled => CoordinatorError::Cancelled { stage },
        }
    }
}

/// Applies credits and debits to account balances.
///
/// Generic over the store so the same pipeline runs against Postgres in
/// production and the in-memory store in tests. There is no way to build a
/// coordinator without a store.
#[derive(Debug, Clone)]
pub struct TransactionCoordinator<S> {
    repository: AccountRepository<S>,
}

impl<S> TransactionCoordinator<S>
where
    S: LedgerStore,
{
    pub fn new(repository: AccountRepository<S>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &AccountRepository<S> {
        &self.repository
    }

    /// Add `amount` to the account balance and record a credit entry.
    #[instrument(
        skip(self, ctx),
        fields(account_id = %account_id, kind = "credit", amount = %amount)
    )]
    pub async fn create_credit(
        &self,
        ctx: &CallContext,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<PostingReceipt, CoordinatorError> {
        self.execute(ctx, account_id, EntryKind::Credit, amount).await
    }

    /// Subtract `amount` from the account balance and record a debit entry.
    ///
    /// Fails with [`CoordinatorError::InsufficientFunds`] when the balance does
    /// not cover the amount; the balance is never driven negative.
    #[instrument(
        skip(self, ctx),
        fields(account_id = %account_id, kind = "debit", amount = %amount)
    )]
    pub async fn create_debit(
        &self,
        ctx: &CallContext,
        account_id: AccountId,
        amount: Amount,
    ) -> Result<PostingReceipt, CoordinatorError> {
        self.execute(ctx, account_id, EntryKind::Debit, amount).await
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        account_id: AccountId,
        kind: EntryKind,
        amount: Amount,
    ) -> Result<PostingReceipt, CoordinatorError> {
        let result = self.run(ctx, account_id, kind, amount).await;
        match &result {
            Ok(receipt) => debug!(
                transaction_id = %receipt.transaction_id,
                new_balance = %receipt.new_balance,
                stage = %PostingStage::Committed,
                "posting committed"
            ),
            Err(err) => report(err),
        }
        result
    }

    async fn run(
        &self,
        ctx: &CallContext,
        account_id: AccountId,
        kind: EntryKind,
        amount: Amount,
    ) -> Result<PostingReceipt, CoordinatorError> {
        let mut unit = guarded(ctx, PostingStage::Idle, self.repository.begin(ctx.deadline())).await?;

        let receipt = match self.apply(ctx, &mut unit, account_id, kind, amount).await {
            Ok(receipt) => receipt,
            Err(err) => {
                abort(unit, &err).await;
                return Err(err);
            }
        };

        if let Some(interruption) = ctx.interruption() {
            let err = CoordinatorError::interrupted(interruption, PostingStage::Recorded);
            abort(unit, &err).await;
            return Err(err);
        }

        unit.commit()
            .await
            .map_err(|source| CoordinatorError::from_store(PostingStage::Recorded, source))?;

        Ok(receipt)
    }

    async fn apply(
        &self,
        ctx: &CallContext,
        unit: &mut S::Unit,
        account_id: AccountId,
        kind: EntryKind,
        amount: Amount,
    ) -> Result<PostingReceipt, CoordinatorError> {
        let mut repo = self.repository.bound_to(unit);

        let account = guarded(
            ctx,
            PostingStage::Idle,
            repo.lock_account_for_update(account_id, ctx.deadline()),
        )
        .await?
        .ok_or(CoordinatorError::NotFound(account_id))?;
        debug!(stage = %PostingStage::LockAcquired, balance = %account.balance, "account locked");

        let new_balance = post(account.balance, kind, amount).map_err(|err| match err {
            DomainError::InsufficientFunds { .. } => CoordinatorError::InsufficientFunds {
                account_id,
                balance: account.balance,
                requested: amount,
            },
            DomainError::LimitExceeded { .. } => CoordinatorError::BalanceLimitExceeded {
                account_id,
                balance: account.balance,
                requested: amount,
            },
            other => CoordinatorError::Invariant(other.to_string()),
        })?;

        guarded(
            ctx,
            PostingStage::Validated,
            repo.update_balance(account_id, new_balance),
        )
        .await?;

        let entry = guarded(
            ctx,
            PostingStage::Mutated,
            repo.append_transaction(&NewLedgerEntry::new(account_id, kind, amount)),
        )
        .await?;

        Ok(PostingReceipt {
            transaction_id: entry.id,
            new_balance,
        })
    }
}

/// Run one store step, abandoning it as soon as the call is interrupted.
async fn guarded<T, F>(ctx: &CallContext, stage: PostingStage, step: F) -> Result<T, CoordinatorError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        interruption = ctx.interrupted() => Err(CoordinatorError::interrupted(interruption, stage)),
        result = step => result.map_err(|source| CoordinatorError::from_store(stage, source)),
    }
}

/// Undo a failed posting.
///
/// Interrupted calls drop the unit instead of awaiting the rollback, so the
/// caller gets its answer even while an abandoned store step is still running.
async fn abort<U>(unit: U, cause: &CoordinatorError)
where
    U: UnitOfWork,
{
    if matches!(cause.kind(), ErrorKind::Timeout | ErrorKind::Cancelled) {
        debug!(cause = %cause, "dropping interrupted unit");
        drop(unit);
        return;
    }
    if let Err(err) = unit.rollback().await {
        warn!(error = %err, cause = %cause, "rollback failed");
    }
}

fn report(err: &CoordinatorError) {
    let stage = PostingStage::RolledBack;
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::InsufficientFunds | ErrorKind::LimitExceeded => {
            info!(error = %err, %stage, "posting rejected")
        }
        ErrorKind::Timeout | ErrorKind::Cancelled => {
            warn!(error = %err, %stage, "posting interrupted")
        }
        ErrorKind::Internal => error!(error = %err, %stage, "posting failed"),
    }
}
