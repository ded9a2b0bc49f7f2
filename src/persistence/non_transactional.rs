//! Change-by-change commit.

use super::{describe, CommitPlan, FlushReport, PersistenceManager};
use crate::client::ProtocolClient;
use crate::context::Context;
use crate::error::{FailedChange, ProxyError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Submits each pending change as an independent request.
///
/// Successful changes are cleared from the context one by one; failed ones stay
/// pending for the next flush. Each step is addressed just before it is sent,
/// so links and updates recorded before a create in the same flush use the key
/// the service assigned.
pub struct NonTransactionalPersistenceManager {
    context: Arc<Context>,
    client: Arc<dyn ProtocolClient>,
    flush_lock: Mutex<()>,
}

impl NonTransactionalPersistenceManager {
    pub fn new(context: Arc<Context>, client: Arc<dyn ProtocolClient>) -> Self {
        Self {
            context,
            client,
            flush_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl PersistenceManager for NonTransactionalPersistenceManager {
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

        info!(changes = plan.len(), "Submitting changes");
        let mut report = FlushReport::default();
        let mut failures = Vec::new();

        let update_type = plan.update_type();
        for change in plan.into_changes() {
            let change = self.context.readdress(change);
            let operation = describe(&change, update_type);
            report.requests += 1;
            match self.client.execute(operation).await {
                Ok(result) => {
                    self.context.acknowledge(&change, result.entity());
                    report.committed.push(change);
                }
                Err(error) => {
                    warn!(change = %change, error = %error, "Change failed");
                    failures.push(FailedChange::new(change, error));
                }
            }
        }
        drop(snapshot);

        if failures.is_empty() {
            info!(committed = report.committed.len(), "Changes committed");
            Ok(report)
        } else {
            warn!(
                committed = report.committed.len(),
                failed = failures.len(),
                "Flush finished with failures"
            );
            Err(ProxyError::from_failures(failures, report.committed.len()))
        }
    }

    fn is_transactional(&self) -> bool {
        false
    }
}
