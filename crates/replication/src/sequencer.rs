use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SequencerError;
use crate::operation::Operation;
use crate::replica::ReplicaId;
use crate::snapshot::{ReplicatedState, Snapshot};

/// Names the cohort generation a join was counted in.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct CohortTicket(pub u64);

/// What a replica receives when it joins a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinReceipt<S> {
    /// The sequencer's cached snapshot, absent if nothing has been committed yet.
    pub snapshot: Option<Snapshot<S>>,

    /// Pass to [`SequencerService::await_cohort`] to rendezvous with the rest of the cohort.
    pub cohort: CohortTicket,
}

/// Remote capability the sequencer exposes to replicas.
#[async_trait]
pub trait SequencerService<S>: Send + Sync + 'static
where
    S: ReplicatedState,
{
    /// Registers `replica` (resolved through the directory) as a member of `group`.
    async fn join_group(
        &self,
        group: &str,
        replica: &ReplicaId,
    ) -> Result<JoinReceipt<S>, SequencerError>;

    /// Removes `replica` from `group`. Leaving is unconditional.
    async fn leave_group(&self, group: &str, replica: &ReplicaId) -> Result<(), SequencerError>;

    /// Orders `batch` into the group's view and broadcasts the result.
    ///
    /// Returns once the broadcast round has completed. Individual member failures
    /// are not reported here.
    async fn send_operations(
        &self,
        group: &str,
        batch: Vec<Operation>,
    ) -> Result<(), SequencerError>;

    /// Number of live members in `group`.
    async fn member_count(&self, group: &str) -> Result<usize, SequencerError>;

    /// Ids of the live members in `group`, sorted.
    async fn member_names(&self, group: &str) -> Result<Vec<ReplicaId>, SequencerError>;

    /// Waits until the cohort named by `ticket` has fully joined.
    async fn await_cohort(&self, group: &str, ticket: CohortTicket) -> Result<(), SequencerError>;
}
