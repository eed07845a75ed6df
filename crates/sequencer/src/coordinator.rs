//! Per-group coordination
//!
//! A round is submit, trim, broadcast. Rounds of one group are serialized so
//! every replica sees views in which all entries before the new batch are
//! retained mutations, which keeps a replica's cursor equal to its position in
//! the view.

use std::fmt::{self, Debug};
use std::sync::Arc;

use ledger_replication::{
    CohortTicket, CommandClassifier, JoinReceipt, Operation, ReplicaHandle,
    ReplicaId, ReplicatedState, View,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::cohort::CohortBarrier;
use crate::config::BroadcastConfig;
use crate::group::Group;
use crate::log::TransactionLog;

/// Sequencer state for one replication group.
pub struct GroupCoordinator<S>
where
    S: ReplicatedState,
{
    group: Arc<Group<S>>,
    log: TransactionLog,
    broadcaster: Broadcaster<S>,
    cohort: CohortBarrier,
    classifier: Arc<dyn CommandClassifier>,
    round: Mutex<()>,
}

impl<S> GroupCoordinator<S>
where
    S: ReplicatedState,
{
    /// Creates a coordinator for an empty group.
    pub fn new(
        name: impl Into<String>,
        cohort_size: usize,
        config: BroadcastConfig,
        classifier: Arc<dyn CommandClassifier>,
    ) -> Self {
        let group = Arc::new(Group::new(name));

        Self {
            broadcaster: Broadcaster::new(group.clone(), config),
            group,
            log: TransactionLog::new(),
            cohort: CohortBarrier::new(cohort_size),
            classifier,
            round: Mutex::new(()),
        }
    }

    /// The membership registry.
    pub const fn group(&self) -> &Arc<Group<S>> {
        &self.group
    }

    /// The current view.
    pub fn view(&self) -> View {
        self.log.view()
    }

    /// Registers a member and counts it against the open cohort.
    pub fn join(&self, handle: ReplicaHandle<S>) -> JoinReceipt<S> {
        self.group.join(handle);

        JoinReceipt {
            snapshot: self.group.cached_snapshot(),
            cohort: self.cohort.arrive(),
        }
    }

    /// Removes a member. Returns whether it was present.
    pub fn leave(&self, id: &ReplicaId) -> bool {
        self.group.leave(id)
    }

    /// Waits for the cohort named by `ticket`.
    pub async fn await_cohort(&self, ticket: CohortTicket) {
        self.cohort.wait(ticket).await;
    }

    /// Resizes the cohort currently accepting joins.
    pub fn rearm_cohort(&self, size: usize) {
        self.cohort.rearm(size);
    }

    /// Runs one round: orders `batch`, trims queries from the log, then broadcasts.
    ///
    /// The broadcast carries the untrimmed view of this round. The log is trimmed
    /// before the first await, so dropping the returned future mid-broadcast never
    /// leaves a query behind for later rounds.
    pub async fn submit(&self, batch: Vec<Operation>) -> BroadcastReport {
        let _round = self.round.lock().await;

        let submission = self.log.submit(batch);
        debug!(
            "Group {} ordered {} new operation(s), absorbed {} duplicate(s), view length {}",
            self.group.name(),
            submission.appended,
            submission.duplicates,
            submission.view.len()
        );

        let trimmed = self
            .log
            .trim(|operation| !self.classifier.classify(operation.command()).is_mutation());
        if trimmed > 0 {
            debug!("Group {} trimmed {} query(ies) from the log", self.group.name(), trimmed);
        }

        let report = self.broadcaster.broadcast(&submission.view).await;

        if !report.evicted.is_empty() {
            info!(
                "Group {} round finished with evictions: {:?}",
                self.group.name(),
                report.evicted
            );
        }

        report
    }
}

impl<S> Debug for GroupCoordinator<S>
where
    S: ReplicatedState,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupCoordinator")
            .field("group", &self.group)
            .field("log", &self.log)
            .field("cohort", &self.cohort)
            .finish_non_exhaustive()
    }
}
