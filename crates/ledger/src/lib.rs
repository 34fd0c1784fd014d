//! Wallet ledger module (single-entry balances + append-only history).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod entry;
pub mod posting;

pub use account::{Account, NewAccount};
pub use entry::{EntryKind, LedgerEntry, NewLedgerEntry};
pub use posting::{AccountStatement, post, replay_balance};
