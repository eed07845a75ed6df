//! Abstract interface for replicating a deterministic ledger through a central sequencer.
//!
//! This crate provides:
//! - The replicated data model (operations, the ordered view, snapshots)
//! - Remote capability traits for both roles (sequencer and replica)
//! - The state-machine collaborator consumed by replicas
//! - A directory trait used to resolve replica handles by id
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Replica handle lookup.
pub mod directory;

/// Error types shared by both roles.
pub mod error;

/// State-machine collaborator interface.
pub mod machine;

/// Operations and their identity.
pub mod operation;

/// Replica-side remote capability.
pub mod replica;

/// Sequencer-side remote capability.
pub mod sequencer;

/// Snapshots of replicated state.
pub mod snapshot;

/// The totally ordered view.
pub mod view;

pub use directory::ReplicaDirectory;
pub use error::{DirectoryError, RemoteError, SequencerError, StateMachineError};
pub use machine::{CommandClassifier, CommandKind, StateMachine};
pub use operation::{Operation, OperationId};
pub use replica::{ReplicaHandle, ReplicaId, ReplicaService};
pub use sequencer::{CohortTicket, JoinReceipt, SequencerService};
pub use snapshot::{ReplicatedState, Snapshot};
pub use view::View;
