use ledger_replication::{RemoteError, SequencerError};
use thiserror::Error;

/// Result type for replica operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on the replica side.
#[derive(Debug, Error)]
pub enum Error {
    /// The apply worker has already been started.
    #[error("the replica has already started")]
    AlreadyStarted,

    /// A command line was empty.
    #[error("empty command")]
    EmptyCommand,

    /// A local command was given bad arguments.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// A local query could not be answered.
    #[error("query failed: {0}")]
    Query(String),

    /// A call to the replica itself failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The call to the sequencer failed.
    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    /// The replica has shut down.
    #[error("the replica has shut down")]
    Shutdown,
}
