//! All-or-nothing commit of the whole unit of work.

use super::{CommitPlan, FlushReport, PersistenceManager};
use crate::client::{BatchOutcome, OperationResult, ProtocolClient};
use crate::context::Context;
use crate::error::{FailedChange, ProxyError, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Submits every pending change as one atomic change set.
///
/// On failure the context is left exactly as it was, so the same `flush` can be
/// retried.
pub struct TransactionalPersistenceManager {
    context: Arc<Context>,
    client: Arc<dyn ProtocolClient>,
    flush_lock: Mutex<()>,
}

impl TransactionalPersistenceManager {
    pub fn new(context: Arc<Context>, client: Arc<dyn ProtocolClient>) -> Self {
        Self {
            context,
            client,
            flush_lock: Mutex::new(()),
        }
    }

    fn rolled_back(plan: &CommitPlan, failures: Vec<(usize, TransportError)>) -> ProxyError {
        let conflict = !failures.is_empty() && failures.iter().all(|(_, error)| error.is_conflict());
        let mut by_index: HashMap<usize, TransportError> = failures.into_iter().collect();

        let failures: Vec<FailedChange> = plan
            .changes()
            .enumerate()
            .map(|(index, change)| {
                let error = by_index.remove(&index).unwrap_or(TransportError::RolledBack);
                FailedChange::new(change.clone(), error)
            })
            .collect();

        if conflict {
            ProxyError::ConcurrencyConflict {
                failures,
                committed: 0,
            }
        } else {
            ProxyError::CommitFailed {
                failures,
                committed: 0,
            }
        }
    }
}

#[async_trait]
impl PersistenceManager for TransactionalPersistenceManager {
    async fn flush(&self) -> Result<FlushReport, ProxyError> {
        let _guard = self.flush_lock.lock().await;
        let mut snapshot = self.context.begin_flush();
        let plan = CommitPlan::from_changes(
            std::mem::take(&mut snapshot.changes),
            self.context.update_type(),
        );

        if plan.is_empty() {
            debug!("Nothing to flush");
            return Ok(FlushReport::default());
        }

        info!(changes = plan.len(), "Submitting change set");
        match self.client.execute_batch(plan.operations()).await {
            Ok(BatchOutcome::Committed(results)) => {
                let mut results = results.into_iter();
                for change in plan.changes() {
                    let result = results.next();
                    self.context
                        .acknowledge(change, result.as_ref().and_then(OperationResult::entity));
                }
                info!(changes = plan.len(), "Change set committed");
                Ok(FlushReport {
                    committed: plan.into_changes(),
                    requests: 1,
                })
            }
            Ok(BatchOutcome::RolledBack { failures }) => {
                warn!(
                    changes = plan.len(),
                    failed = failures.len(),
                    "Change set rolled back"
                );
                Err(Self::rolled_back(&plan, failures))
            }
            Err(error) => {
                warn!(changes = plan.len(), error = %error, "Change set request failed");
                let failures = plan
                    .changes()
                    .map(|change| FailedChange::new(change.clone(), error.clone()))
                    .collect();
                Err(ProxyError::from_failures(failures, 0))
            }
        }
    }

    fn is_transactional(&self) -> bool {
        true
    }
}
