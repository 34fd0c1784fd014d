use std::time::Duration;

use ewallet_infra::{AccountRepository, CallContext, LedgerStore, TransactionCoordinator};

/// Shared state handed to every handler.
#[derive(Debug)]
pub struct AppServices<S> {
    pub coordinator: TransactionCoordinator<S>,
    pub request_timeout: Duration,
}

impl<S> AppServices<S>
where
    S: LedgerStore,
{
    pub fn new(store: S, request_timeout: Duration) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(AccountRepository::new(store)),
            request_timeout,
        }
    }

    pub fn repository(&self) -> &AccountRepository<S> {
        self.coordinator.repository()
    }

    /// Context for one request: bounded by the configured request timeout.
    pub fn call_context(&self) -> CallContext {
        CallContext::background().with_timeout(self.request_timeout)
    }
}
