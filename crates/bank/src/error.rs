use std::num::ParseFloatError;
use std::path::PathBuf;

use ledger_replication::StateMachineError;
use thiserror::Error;

/// Result type for bank operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur parsing or applying bank commands.
#[derive(Debug, Error)]
pub enum Error {
    /// The command was empty.
    #[error("empty command")]
    EmptyCommand,

    /// The command name is not known.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The command had the wrong arguments.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// A numeric argument did not parse.
    #[error("invalid number '{value}': {source}")]
    InvalidNumber {
        /// The offending argument.
        value: String,
        /// The parse failure.
        #[source]
        source: ParseFloatError,
    },

    /// The currency has no exchange rate.
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    /// A query was applied as a mutation, or the other way round.
    #[error("'{0}' cannot be used this way")]
    WrongKind(String),

    /// A rate file line was malformed.
    #[error("invalid rate on line {line}: {reason}")]
    InvalidRate {
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The rate file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StateMachineError for Error {}
