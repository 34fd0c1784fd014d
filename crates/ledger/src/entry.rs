use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ewallet_core::{AccountId, Amount, DomainError, Entity, TransactionId};

/// Direction of a balance movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Credit,
    Debit,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Credit => "credit",
            EntryKind::Debit => "debit",
        }
    }
}

impl core::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for EntryKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(EntryKind::Credit),
            "debit" => Ok(EntryKind::Debit),
            other => Err(DomainError::validation(format!(
                "unknown transaction type '{other}'"
            ))),
        }
    }
}

/// Immutable ledger entry (one committed credit or debit).
///
/// There is no update or delete path for entries; once the store hands one
/// back it is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: TransactionId,
    /// `None` for unattached system entries.
    pub account_id: Option<AccountId>,
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Amount with the sign implied by the entry kind.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Credit => self.amount.as_decimal(),
            EntryKind::Debit => -self.amount.as_decimal(),
        }
    }
}

impl Entity for LedgerEntry {
    type Id = TransactionId;

    fn id(&self) -> TransactionId {
        self.id
    }
}

/// An entry ready to be appended (id and timestamp not yet assigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub account_id: Option<AccountId>,
    pub amount: Amount,
    pub kind: EntryKind,
}

impl NewLedgerEntry {
    pub fn new(account_id: AccountId, kind: EntryKind, amount: Amount) -> Self {
        Self {
            account_id: Some(account_id),
            amount,
            kind,
        }
    }

    pub fn unattached(kind: EntryKind, amount: Amount) -> Self {
        Self {
            account_id: None,
            amount,
            kind,
        }
    }

    pub fn into_entry(self, id: TransactionId, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            account_id: self.account_id,
            amount: self.amount,
            kind: self.kind,
            created_at,
        }
    }
}
