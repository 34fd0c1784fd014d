//! Ledger store boundary.
//!
//! This module defines the storage abstraction the coordinator runs on: a store
//! that opens atomic units of work, and units that lock, read and write account
//! rows and append ledger entries.

#[cfg(any(test, feature = "in-memory"))]
pub mod in_memory;
pub mod postgres;
pub mod r#trait;

#[cfg(any(test, feature = "in-memory"))]
pub use in_memory::{FaultPoint, InMemoryLedgerStore, InMemoryUnit};
pub use postgres::{PostgresLedgerStore, PostgresUnit};
pub use r#trait::{Deadline, LedgerStore, StoreError, UnitOfWork};
