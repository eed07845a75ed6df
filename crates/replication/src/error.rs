use std::error::Error;
use std::fmt::Debug;

use thiserror::Error as ThisError;

use crate::replica::ReplicaId;

/// Marker trait for state-machine errors.
pub trait StateMachineError: Debug + Error + Send + Sync + 'static {}

/// Failure of a single remote call.
///
/// The sequencer treats every variant as retryable while a delivery deadline is
/// still open.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum RemoteError {
    /// The remote endpoint is not accepting calls (shut down or unreachable).
    #[error("remote endpoint unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within its budget.
    #[error("remote call timed out")]
    Timeout,

    /// The remote endpoint refused the request.
    #[error("remote call rejected: {0}")]
    Rejected(String),
}

/// Errors resolving replica handles.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DirectoryError {
    /// No handle is bound under the id.
    #[error("replica '{0}' is not bound")]
    NotBound(ReplicaId),
}

/// Errors returned by the sequencer to its callers.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SequencerError {
    /// The group name was not declared on this sequencer.
    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// A joiner could not be resolved to a handle.
    #[error("cannot join '{group}': {source}")]
    Join {
        /// Group the replica tried to join.
        group: String,
        /// Why the handle could not be resolved.
        #[source]
        source: DirectoryError,
    },

    /// The call to the sequencer itself failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
