//! Error types for the entity proxy layer.

use crate::context::ChangeRecord;
use crate::types::{ContainerInterface, EntityId, EntityStatus};
use thiserror::Error;

/// Failures reported by the protocol collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request failed with status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Precondition failed (stale version): {0}")]
    PreconditionFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Rolled back with its change set")]
    RolledBack,
}

impl TransportError {
    /// True when the service rejected the request because the client's version is stale.
    pub fn is_conflict(&self) -> bool {
        match self {
            TransportError::PreconditionFailed(_) => true,
            TransportError::Status { code, .. } => *code == 409 || *code == 412,
            _ => false,
        }
    }
}

/// A change record the service did not accept, with the reason
#[derive(Debug, Clone)]
pub struct FailedChange {
    pub change: ChangeRecord,
    pub error: TransportError,
}

impl FailedChange {
    pub fn new(change: ChangeRecord, error: TransportError) -> Self {
        Self { change, error }
    }

    pub fn is_conflict(&self) -> bool {
        self.error.is_conflict()
    }
}

fn describe_failures(failures: &[FailedChange]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.change, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Proxy layer errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Not an entity container shape: {0}")]
    InvalidContainerShape(String),

    #[error("Unknown type name: {0}")]
    UnknownTypeName(String),

    #[error("Invalid state transition for {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: EntityId,
        from: EntityStatus,
        to: EntityStatus,
    },

    #[error("Entity is not tracked: {0}")]
    UntrackedEntity(EntityId),

    #[error("Container {container} has no member named '{member}'")]
    UnknownMember {
        container: ContainerInterface,
        member: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation '{operation}' failed: {source}")]
    OperationInvocationError {
        operation: String,
        #[source]
        source: TransportError,
    },

    #[error("Commit failed for {} change(s), {committed} committed: {}", .failures.len(), describe_failures(.failures))]
    CommitFailed {
        failures: Vec<FailedChange>,
        committed: usize,
    },

    #[error("Concurrency conflict on {} change(s): {}", .failures.len(), describe_failures(.failures))]
    ConcurrencyConflict {
        failures: Vec<FailedChange>,
        committed: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProxyError {
    /// Remote failures may succeed on retry; local usage errors never will.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ProxyError::OperationInvocationError { .. }
                | ProxyError::CommitFailed { .. }
                | ProxyError::ConcurrencyConflict { .. }
        )
    }

    /// Change records a failed flush left pending.
    pub fn failed_changes(&self) -> &[FailedChange] {
        match self {
            ProxyError::CommitFailed { failures, .. }
            | ProxyError::ConcurrencyConflict { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Classify a set of commit failures: conflicts only, or a general failure.
    pub(crate) fn from_failures(failures: Vec<FailedChange>, committed: usize) -> Self {
        if !failures.is_empty() && failures.iter().all(FailedChange::is_conflict) {
            ProxyError::ConcurrencyConflict {
                failures,
                committed,
            }
        } else {
            ProxyError::CommitFailed {
                failures,
                committed,
            }
        }
    }
}

impl From<config::ConfigError> for ProxyError {
    fn from(err: config::ConfigError) -> Self {
        ProxyError::ConfigError(err.to_string())
    }
}
