//! Multi-group sequencer service

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use ledger_replication::{
    CohortTicket, CommandClassifier, JoinReceipt, Operation, ReplicaDirectory, ReplicaId,
    ReplicatedState, SequencerError, SequencerService,
};
use tracing::{debug, info, warn};

use crate::config::SequencerConfig;
use crate::coordinator::GroupCoordinator;

/// Sequencer ordering the operations of every configured group.
pub struct Sequencer<S, D>
where
    S: ReplicatedState,
    D: ReplicaDirectory<S>,
{
    coordinators: HashMap<String, Arc<GroupCoordinator<S>>>,
    directory: Arc<D>,
}

impl<S, D> Sequencer<S, D>
where
    S: ReplicatedState,
    D: ReplicaDirectory<S>,
{
    /// Creates a sequencer with one coordinator per configured group.
    pub fn new(
        config: SequencerConfig,
        directory: Arc<D>,
        classifier: Arc<dyn CommandClassifier>,
    ) -> Self {
        let coordinators = config
            .groups
            .iter()
            .map(|name| {
                info!("Created group {}", name);
                (
                    name.clone(),
                    Arc::new(GroupCoordinator::new(
                        name.clone(),
                        config.cohort_size,
                        config.broadcast.clone(),
                        classifier.clone(),
                    )),
                )
            })
            .collect();

        Self {
            coordinators,
            directory,
        }
    }

    /// Looks up the coordinator for `group`.
    pub fn coordinator(&self, group: &str) -> Result<&Arc<GroupCoordinator<S>>, SequencerError> {
        self.coordinators
            .get(group)
            .ok_or_else(|| SequencerError::UnknownGroup(group.to_string()))
    }

    /// Resizes the cohort currently accepting joins in `group`.
    pub fn rearm_cohort(&self, group: &str, size: usize) -> Result<(), SequencerError> {
        self.coordinator(group)?.rearm_cohort(size);
        Ok(())
    }
}

impl<S, D> Debug for Sequencer<S, D>
where
    S: ReplicatedState,
    D: ReplicaDirectory<S>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut groups: Vec<&String> = self.coordinators.keys().collect();
        groups.sort();
        f.debug_struct("Sequencer")
            .field("groups", &groups)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<S, D> SequencerService<S> for Sequencer<S, D>
where
    S: ReplicatedState,
    D: ReplicaDirectory<S>,
{
    async fn join_group(
        &self,
        group: &str,
        replica: &ReplicaId,
    ) -> Result<JoinReceipt<S>, SequencerError> {
        let coordinator = self.coordinator(group)?;

        let handle = self.directory.lookup(replica).await.map_err(|source| {
            warn!("Rejected join of {} to group {}: {}", replica, group, source);
            SequencerError::Join {
                group: group.to_string(),
                source,
            }
        })?;

        Ok(coordinator.join(handle))
    }

    async fn leave_group(&self, group: &str, replica: &ReplicaId) -> Result<(), SequencerError> {
        if !self.coordinator(group)?.leave(replica) {
            debug!("Replica {} was not a member of group {}", replica, group);
        }
        Ok(())
    }

    async fn send_operations(
        &self,
        group: &str,
        batch: Vec<Operation>,
    ) -> Result<(), SequencerError> {
        self.coordinator(group)?.submit(batch).await;
        Ok(())
    }

    async fn member_count(&self, group: &str) -> Result<usize, SequencerError> {
        Ok(self.coordinator(group)?.group().len())
    }

    async fn member_names(&self, group: &str) -> Result<Vec<ReplicaId>, SequencerError> {
        Ok(self.coordinator(group)?.group().member_names())
    }

    async fn await_cohort(&self, group: &str, ticket: CohortTicket) -> Result<(), SequencerError> {
        self.coordinator(group)?.await_cohort(ticket).await;
        Ok(())
    }
}
