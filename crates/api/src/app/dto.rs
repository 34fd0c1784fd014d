use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ewallet_core::{AccountId, Money};
use ewallet_ledger::{Account, LedgerEntry};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub password_hash: String,
}

/// Body of a credit or debit. Accepts the amount as a JSON string or number.
#[derive(Debug, Deserialize)]
pub struct PostingRequest {
    pub amount: Decimal,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub username: String,
    pub balance: Money,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            balance: account.balance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub items: Vec<LedgerEntry>,
}
