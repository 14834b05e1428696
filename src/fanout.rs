//! Concurrent negotiation of independent operations.
//!
//! Each operation runs its own sequential negotiation. Negotiations run in
//! parallel up to a concurrency limit, and one failing does not affect the
//! others.

use crate::error::EwsError;
use crate::negotiator::{Negotiated, Negotiator};
use crate::operation::Operation;
use crate::session::CancelToken;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// Parallel negotiations per available core.
pub const CONCURRENCY_PER_CORE: usize = 4;

/// Default limit on concurrent negotiations.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * CONCURRENCY_PER_CORE
}

/// Negotiate every operation, at most `max_concurrency` at a time.
///
/// Returns exactly one result per operation, in input order.
pub async fn run_all(
    negotiator: Arc<Negotiator>,
    operations: Vec<Arc<dyn Operation>>,
    max_concurrency: usize,
    cancel: CancelToken,
) -> Vec<Result<Negotiated, EwsError>> {
    let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let total = operations.len();

    let handles: Vec<_> = operations
        .into_iter()
        .enumerate()
        .map(|(index, operation)| {
            let negotiator = Arc::clone(&negotiator);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| EwsError::TaskFailed(e.to_string()))?;
                debug!(index, total, operation = operation.name(), "Starting negotiation");
                negotiator.negotiate(operation.as_ref(), &cancel).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(total);
    for handle in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Negotiation task failed");
                Err(EwsError::TaskFailed(e.to_string()))
            }
        };
        results.push(result);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_concurrency() {
        let n = default_concurrency();
        assert!(n >= CONCURRENCY_PER_CORE);
        assert_eq!(n % CONCURRENCY_PER_CORE, 0);
    }
}
