use crate::error::StateMachineError;
use crate::snapshot::ReplicatedState;

/// How a replica treats a command found in the view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandKind {
    /// Deterministically changes replicated state on every replica.
    Mutation,

    /// Read-only, ordered with the log so it observes every earlier entry, but only
    /// answered by the replica that issued it. Never advances the cursor.
    SyncedQuery,

    /// Read-only and answered immediately from the local snapshot. A command
    /// source never queues these for ordering.
    LocalQuery,
}

impl CommandKind {
    /// Whether the command changes replicated state.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Mutation)
    }
}

/// Tells mutations from queries.
///
/// The sequencer only needs this much of the state machine, to trim answered
/// queries out of the view.
pub trait CommandClassifier: Send + Sync + 'static {
    /// Classifies a command string.
    fn classify(&self, command: &str) -> CommandKind;
}

/// Deterministic state machine applied by every replica.
///
/// Implementations must produce identical results for identical
/// `(command, state)` inputs on every replica.
pub trait StateMachine: CommandClassifier {
    /// The replicated state.
    type State: ReplicatedState;

    /// The error type for rejected commands.
    type Error: StateMachineError;

    /// Applies a mutation, returning the new state.
    fn apply(&self, command: &str, state: &Self::State) -> Result<Self::State, Self::Error>;

    /// Answers a query against `state`.
    fn query(&self, command: &str, state: &Self::State) -> Result<String, Self::Error>;
}
