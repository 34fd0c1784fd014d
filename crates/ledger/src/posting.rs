//! Posting rules and balance replay.
//!
//! `post` is the single decision point for how a credit or debit changes a
//! balance. `replay_balance` recomputes a balance from history, which is how
//! the ledger-sum invariant is checked:
//!
//! ```text
//! balance == initial + Σ credits − Σ debits
//! ```

use rust_decimal::Decimal;
use serde::Serialize;

use ewallet_core::{Amount, DomainError, DomainResult, Money};

use crate::account::Account;
use crate::entry::{EntryKind, LedgerEntry};

/// Balance after applying one movement.
///
/// Debits that exceed the balance are rejected with
/// [`DomainError::InsufficientFunds`]; credits that would push it past
/// [`ewallet_core::MAX_MONEY`] with [`DomainError::LimitExceeded`].
pub fn post(balance: Money, kind: EntryKind, amount: Amount) -> DomainResult<Money> {
    match kind {
        EntryKind::Credit => balance.checked_credit(amount),
        EntryKind::Debit => balance.checked_debit(amount),
    }
}

/// Recompute a balance from `initial` plus the signed sum of `entries`.
pub fn replay_balance<'a, I>(initial: Money, entries: I) -> DomainResult<Money>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    entries
        .into_iter()
        .try_fold(initial.as_decimal(), |acc, entry| {
            acc.checked_add(entry.signed_amount())
        })
        .map(Money::new)
        .ok_or_else(|| DomainError::invariant("ledger replay overflow"))
}

/// An account together with every committed entry that references it,
/// read at one consistent point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStatement {
    pub account: Account,
    pub entries: Vec<LedgerEntry>,
}

impl AccountStatement {
    /// Sum of credit and debit amounts, in that order.
    pub fn totals(&self) -> (Decimal, Decimal) {
        self.entries
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(credits, debits), e| match e.kind {
                EntryKind::Credit => (credits + e.amount.as_decimal(), debits),
                EntryKind::Debit => (credits, debits + e.amount.as_decimal()),
            })
    }

    pub fn replayed_balance(&self) -> DomainResult<Money> {
        // Accounts open at zero, so the history alone determines the balance.
        replay_balance(Money::ZERO, &self.entries)
    }

    /// Whether the stored balance matches the replayed history.
    pub fn is_consistent(&self) -> bool {
        self.replayed_balance()
            .map(|replayed| replayed == self.account.balance)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ewallet_core::{AccountId, TransactionId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use crate::entry::NewLedgerEntry;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    fn entry(id: i64, kind: EntryKind, value: Decimal) -> LedgerEntry {
        NewLedgerEntry::new(AccountId::new(1), kind, amount(value))
            .into_entry(TransactionId::new(id), Utc::now())
    }

    fn account(balance: Decimal) -> Account {
        Account {
            id: AccountId::new(1),
            username: "alice".to_string(),
            password_hash: "hash".to_string(),
            balance: Money::new(balance),
        }
    }

    #[test]
    fn example_trace_credit_debit_then_rejected_debit() {
        let balance = post(Money::ZERO, EntryKind::Credit, amount(dec!(500))).unwrap();
        assert_eq!(balance, Money::new(dec!(500)));

        let balance = post(balance, EntryKind::Debit, amount(dec!(200))).unwrap();
        assert_eq!(balance, Money::new(dec!(300)));

        let err = post(balance, EntryKind::Debit, amount(dec!(1000))).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientFunds { .. }));
    }

    #[test]
    fn statement_detects_drift_between_balance_and_history() {
        let entries = vec![
            entry(1, EntryKind::Credit, dec!(500)),
            entry(2, EntryKind::Debit, dec!(200)),
        ];

        let good = AccountStatement {
            account: account(dec!(300)),
            entries: entries.clone(),
        };
        assert!(good.is_consistent());
        assert_eq!(good.totals(), (dec!(500), dec!(200)));

        let drifted = AccountStatement {
            account: account(dec!(310)),
            entries,
        };
        assert!(!drifted.is_consistent());
    }

    fn movement() -> impl Strategy<Value = (bool, i64)> {
        // Amounts in ten-thousandths so fractional cents are exercised.
        (any::<bool>(), 1i64..10_000_000i64)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever mix of credits and debits is attempted, the
        /// running balance never goes negative and always equals the replay of
        /// the accepted entries.
        #[test]
        fn balance_equals_replay_of_accepted_entries(
            movements in prop::collection::vec(movement(), 1..64)
        ) {
            let mut balance = Money::ZERO;
            let mut accepted: Vec<LedgerEntry> = Vec::new();

            for (idx, (is_credit, units)) in movements.into_iter().enumerate() {
                let kind = if is_credit { EntryKind::Credit } else { EntryKind::Debit };
                let value = Decimal::new(units, 4);

                match post(balance, kind, amount(value)) {
                    Ok(next) => {
                        balance = next;
                        accepted.push(entry(idx as i64 + 1, kind, value));
                    }
                    Err(DomainError::InsufficientFunds { .. }) => {
                        prop_assert_eq!(kind, EntryKind::Debit);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }

                prop_assert!(!balance.is_negative());
            }

            prop_assert_eq!(replay_balance(Money::ZERO, &accepted).unwrap(), balance);
        }
    }
}
