//! Integration tests for the posting pipeline.
//!
//! Tests: Coordinator → AccountRepository → InMemoryLedgerStore
//!
//! Verifies:
//! - Concurrent postings on one account are serialised and additive
//! - Postings on different accounts do not wait on each other
//! - Deadlines and cancellation bound the row-lock wait and roll back
//! - Any failed step leaves balance and history untouched

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use ewallet_core::{AccountId, Amount, Money};
    use ewallet_ledger::{EntryKind, NewAccount};

    use crate::context::{CallContext, cancellation};
    use crate::coordinator::{CoordinatorError, ErrorKind, PostingStage, TransactionCoordinator};
    use crate::repository::AccountRepository;
    use crate::store::{Deadline, FaultPoint, InMemoryLedgerStore, LedgerStore, UnitOfWork};

    type Coordinator = TransactionCoordinator<InMemoryLedgerStore>;

    fn setup() -> (Coordinator, InMemoryLedgerStore) {
        let store = InMemoryLedgerStore::new();
        let coordinator = TransactionCoordinator::new(AccountRepository::new(store.clone()));
        (coordinator, store)
    }

    async fn open_account(coordinator: &Coordinator, username: &str) -> AccountId {
        coordinator
            .repository()
            .create_account(&NewAccount::new(username, "hash").unwrap(), Deadline::none())
            .await
            .unwrap()
            .id
    }

    async fn balance_of(coordinator: &Coordinator, id: AccountId) -> Money {
        coordinator
            .repository()
            .get_account(id, Deadline::none())
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_credits_are_additive() {
        let (coordinator, _) = setup();
        let id = open_account(&coordinator, "hot").await;

        let mut tasks = Vec::with_capacity(100);
        for _ in 0..100 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                let ctx = CallContext::background();
                for _ in 0..100 {
                    coordinator.create_credit(&ctx, id, amount(dec!(1000))).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let statement = coordinator.repository().statement(id, Deadline::none()).await.unwrap().unwrap();
        assert_eq!(statement.account.balance, Money::new(dec!(10000000)));
        assert_eq!(statement.entries.len(), 10_000);
        assert!(statement.is_consistent());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_debits_never_overdraw() {
        let (coordinator, _) = setup();
        let id = open_account(&coordinator, "drained").await;
        coordinator
            .create_credit(&CallContext::background(), id, amount(dec!(1000)))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .create_debit(&CallContext::background(), id, amount(dec!(100)))
                    .await
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert_eq!(err.kind(), ErrorKind::InsufficientFunds),
            }
        }

        assert_eq!(accepted, 10);
        assert_eq!(balance_of(&coordinator, id).await, Money::ZERO);
    }

    #[tokio::test]
    async fn insufficient_funds_changes_nothing() {
        let (coordinator, _) = setup();
        let id = open_account(&coordinator, "alice").await;
        let ctx = CallContext::background();
        coordinator.create_credit(&ctx, id, amount(dec!(300))).await.unwrap();

        let err = coordinator.create_debit(&ctx, id, amount(dec!(1000))).await.unwrap_err();
        match err {
            CoordinatorError::InsufficientFunds {
                account_id,
                balance,
                requested,
            } => {
                assert_eq!(account_id, id);
                assert_eq!(balance, Money::new(dec!(300)));
                assert_eq!(requested, amount(dec!(1000)));
            }
            other => panic!("expected insufficient funds, got {other:?}"),
        }

        let statement = coordinator.repository().statement(id, Deadline::none()).await.unwrap().unwrap();
        assert_eq!(statement.account.balance, Money::new(dec!(300)));
        assert_eq!(statement.entries.len(), 1);
    }

    #[tokio::test]
    async fn other_accounts_are_not_blocked() {
        let (coordinator, store) = setup();
        let a = open_account(&coordinator, "a").await;
        let b = open_account(&coordinator, "b").await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_account_for_update(a, Deadline::none()).await.unwrap();

        let started = Instant::now();
        let ctx = CallContext::background().with_timeout(Duration::from_secs(1));
        coordinator.create_credit(&ctx, b, amount(dec!(10))).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        holder.rollback().await.unwrap();
        assert_eq!(balance_of(&coordinator, b).await, Money::new(dec!(10)));
    }

    #[tokio::test]
    async fn same_account_wait_is_bounded_by_deadline() {
        let (coordinator, store) = setup();
        let a = open_account(&coordinator, "a").await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_account_for_update(a, Deadline::none()).await.unwrap();

        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        let err = coordinator.create_credit(&ctx, a, amount(dec!(10))).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::DeadlineExceeded {
                stage: PostingStage::Idle
            }
        ));

        holder.rollback().await.unwrap();
        let statement = coordinator.repository().statement(a, Deadline::none()).await.unwrap().unwrap();
        assert_eq!(statement.account.balance, Money::ZERO);
        assert!(statement.entries.is_empty());
    }

    #[tokio::test]
    async fn cancellation_while_waiting_rolls_back() {
        let (coordinator, store) = setup();
        let a = open_account(&coordinator, "a").await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_account_for_update(a, Deadline::none()).await.unwrap();

        let (handle, signal) = cancellation();
        let waiting = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let ctx = CallContext::background().with_cancellation(signal);
                coordinator.create_credit(&ctx, a, amount(dec!(10))).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let err = waiting.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        holder.rollback().await.unwrap();
        assert_eq!(balance_of(&coordinator, a).await, Money::ZERO);
        assert!(coordinator.repository().list_transactions(a, Deadline::none()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_call_releases_its_lock() {
        let (coordinator, store) = setup();
        let a = open_account(&coordinator, "a").await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_account_for_update(a, Deadline::none()).await.unwrap();

        // The caller gives up on the future itself, not through the context.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            coordinator.create_credit(&CallContext::background(), a, amount(dec!(10))),
        )
        .await;
        assert!(abandoned.is_err());

        holder.rollback().await.unwrap();

        let ctx = CallContext::background().with_timeout(Duration::from_millis(200));
        let receipt = coordinator.create_credit(&ctx, a, amount(dec!(5))).await.unwrap();
        assert_eq!(receipt.new_balance, Money::new(dec!(5)));
    }

    #[tokio::test]
    async fn failed_append_leaves_no_trace() {
        let (coordinator, store) = setup();
        let a = open_account(&coordinator, "a").await;
        coordinator
            .create_credit(&CallContext::background(), a, amount(dec!(100)))
            .await
            .unwrap();

        store.fail_next(FaultPoint::AppendTransaction);
        let err = coordinator
            .create_debit(&CallContext::background(), a, amount(dec!(40)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Internal {
                stage: PostingStage::Mutated,
                ..
            }
        ));

        let statement = coordinator.repository().statement(a, Deadline::none()).await.unwrap().unwrap();
        assert_eq!(statement.account.balance, Money::new(dec!(100)));
        assert_eq!(statement.entries.len(), 1);
    }

    #[tokio::test]
    async fn identical_requests_are_not_deduplicated() {
        let (coordinator, _) = setup();
        let a = open_account(&coordinator, "a").await;
        let ctx = CallContext::background();

        let first = coordinator.create_credit(&ctx, a, amount(dec!(50))).await.unwrap();
        let second = coordinator.create_credit(&ctx, a, amount(dec!(50))).await.unwrap();

        assert_ne!(first.transaction_id, second.transaction_id);
        assert_eq!(second.new_balance, Money::new(dec!(100)));
        assert_eq!(coordinator.repository().list_transactions(a, Deadline::none()).await.unwrap().len(), 2);
    }

    fn movement() -> impl Strategy<Value = (bool, i64)> {
        (any::<bool>(), 1i64..5_000_000i64)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: after any mix of postings, the stored balance equals the
        /// replay of the committed history and every rejection was a debit.
        #[test]
        fn stored_balance_matches_committed_history(
            movements in prop::collection::vec(movement(), 1..40)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let (coordinator, _) = setup();
                let id = open_account(&coordinator, "prop").await;
                let ctx = CallContext::background();

                for (is_credit, units) in movements {
                    let value = amount(Decimal::new(units, 4));
                    let kind = if is_credit { EntryKind::Credit } else { EntryKind::Debit };
                    let result = match kind {
                        EntryKind::Credit => coordinator.create_credit(&ctx, id, value).await,
                        EntryKind::Debit => coordinator.create_debit(&ctx, id, value).await,
                    };
                    if let Err(err) = result {
                        prop_assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
                        prop_assert_eq!(kind, EntryKind::Debit);
                    }
                }

                let statement = coordinator.repository().statement(id, Deadline::none()).await.unwrap().unwrap();
                prop_assert!(!statement.account.balance.is_negative());
                prop_assert!(statement.is_consistent());
                Ok(())
            })?;
        }
    }
}
