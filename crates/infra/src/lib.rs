//! Infrastructure layer: ledger storage, repository, transaction coordinator,
//! database config and migrations.

pub mod config;
pub mod context;
pub mod coordinator;
pub mod migrations;
pub mod repository;
pub mod store;

mod integration_tests;

pub use config::DatabaseConfig;
pub use context::{CallContext, CancelHandle, CancelSignal, Interruption, cancellation};
pub use coordinator::{CoordinatorError, ErrorKind, PostingReceipt, PostingStage, TransactionCoordinator};
pub use repository::{AccountRepository, BoundRepository};
pub use store::{Deadline, LedgerStore, PostgresLedgerStore, StoreError, UnitOfWork};

#[cfg(any(test, feature = "in-memory"))]
pub use store::{FaultPoint, InMemoryLedgerStore};
