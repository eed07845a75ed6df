//! Command source of a replica
//!
//! Assigns operation ids, queues mutations and synchronized queries for the
//! sequencer, and answers local reporting commands without touching the
//! replication path.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ledger_replication::{
    CommandKind, Operation, OperationId, ReplicaDirectory, ReplicaHandle, ReplicaId,
    ReplicaService, SequencerService, StateMachine,
};
use tracing::{debug, info, warn};

use crate::config::ReplicaConfig;
use crate::engine::{Replica, TxStatus};
use crate::error::{Error, Result};

/// Outcome of a command line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    /// Queued for ordering under the given id.
    Queued(OperationId),
    /// Answer to a local query.
    Answer(String),
    /// Current members of the group.
    Members(Vec<ReplicaId>),
    /// Executed history.
    History(Vec<Operation>),
    /// History was cleared.
    HistoryCleared,
    /// Status of an operation.
    Status {
        /// The operation asked about.
        id: OperationId,
        /// Its status on this replica.
        status: TxStatus,
    },
    /// Slept for the given duration.
    Slept(Duration),
    /// Left the group and shut down.
    Exited,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued(id) => write!(f, "queued {id}"),
            Self::Answer(answer) => f.write_str(answer),
            Self::Members(members) if members.is_empty() => f.write_str("(no members)"),
            Self::Members(members) => {
                let names: Vec<&str> = members.iter().map(ReplicaId::as_str).collect();
                f.write_str(&names.join("\n"))
            }
            Self::History(history) if history.is_empty() => f.write_str("(empty history)"),
            Self::History(history) => {
                let lines: Vec<String> = history
                    .iter()
                    .map(|op| format!("{} {}", op.id(), op.command()))
                    .collect();
                f.write_str(&lines.join("\n"))
            }
            Self::HistoryCleared => f.write_str("history cleared"),
            Self::Status { id, status } => write!(f, "{id} is {status}"),
            Self::Slept(duration) => write!(f, "slept {duration:?}"),
            Self::Exited => f.write_str("exited"),
        }
    }
}

/// A replica together with the command source driving it.
pub struct ReplicaNode<M, Q, D>
where
    M: StateMachine,
    Q: SequencerService<M::State>,
    D: ReplicaDirectory<M::State>,
{
    config: ReplicaConfig,
    machine: Arc<M>,
    replica: Arc<Replica<M>>,
    sequencer: Arc<Q>,
    directory: Arc<D>,
    counter: AtomicU64,
}

impl<M, Q, D> ReplicaNode<M, Q, D>
where
    M: StateMachine,
    Q: SequencerService<M::State>,
    D: ReplicaDirectory<M::State>,
{
    /// Creates a node. Nothing is bound or joined until [`Self::join`].
    pub fn new(config: ReplicaConfig, machine: Arc<M>, sequencer: Arc<Q>, directory: Arc<D>) -> Self {
        let replica = Arc::new(Replica::new(config.id.clone(), machine.clone()));

        Self {
            config,
            machine,
            replica,
            sequencer,
            directory,
            counter: AtomicU64::new(0),
        }
    }

    /// The node's id.
    pub const fn id(&self) -> &ReplicaId {
        &self.config.id
    }

    /// The underlying replica.
    pub const fn replica(&self) -> &Arc<Replica<M>> {
        &self.replica
    }

    /// Starts the replica, binds it, joins the group and waits for the rest of the cohort.
    ///
    /// A late joiner starts from the sequencer's cached snapshot. If the sequencer
    /// refuses the join, the replica is unbound and shut down again.
    pub async fn join(&self) -> Result<()> {
        self.replica.start()?;

        let handle: ReplicaHandle<M::State> = self.replica.clone();
        self.directory.bind(handle).await;

        let receipt = match self.sequencer.join_group(&self.config.group, &self.config.id).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Replica {} could not join group {}: {}", self.config.id, self.config.group, e);
                self.directory.unbind(&self.config.id).await;
                self.replica.shutdown().await;
                return Err(e.into());
            }
        };

        if let Some(snapshot) = receipt.snapshot {
            info!(
                "Replica {} joined group {} at cursor {}",
                self.config.id,
                self.config.group,
                snapshot.applied()
            );
            self.replica.install(snapshot)?;
        } else {
            info!("Replica {} joined group {} from empty state", self.config.id, self.config.group);
        }

        debug!("Replica {} waiting for cohort {:?}", self.config.id, receipt.cohort);
        self.sequencer
            .await_cohort(&self.config.group, receipt.cohort)
            .await?;

        info!("Replica {} started in group {}", self.config.id, self.config.group);
        Ok(())
    }

    /// Runs one command line.
    pub async fn execute(&self, line: &str) -> Result<Reply> {
        let line = line.trim();
        let mut tokens = line.split_whitespace();
        let Some(head) = tokens.next() else {
            return Err(Error::EmptyCommand);
        };

        match head.to_ascii_lowercase().as_str() {
            "memberinfo" => Ok(Reply::Members(
                self.sequencer.member_names(&self.config.group).await?,
            )),
            "gethistory" => Ok(Reply::History(self.replica.history().await)),
            "cleanhistory" => {
                self.replica.clean_history().await;
                Ok(Reply::HistoryCleared)
            }
            "checktxstatus" => {
                let id = OperationId::from(tokens.next().ok_or(Error::Usage("checkTxStatus <id>"))?);
                let status = self.replica.tx_status(&id).await;
                Ok(Reply::Status { id, status })
            }
            "sleep" => {
                let duration = tokens
                    .next()
                    .and_then(|seconds| seconds.parse::<f64>().ok())
                    .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
                    .ok_or(Error::Usage("sleep <seconds>"))?;
                tokio::time::sleep(duration).await;
                Ok(Reply::Slept(duration))
            }
            "exit" => {
                self.exit().await?;
                Ok(Reply::Exited)
            }
            _ => self.submit(line).await,
        }
    }

    async fn submit(&self, command: &str) -> Result<Reply> {
        if self.machine.classify(command) == CommandKind::LocalQuery {
            let snapshot = self.replica.snapshot().await?;
            return self
                .machine
                .query(command, snapshot.state())
                .map(Reply::Answer)
                .map_err(|error| Error::Query(error.to_string()));
        }

        let id = self.next_id();
        let unsent = self
            .replica
            .outstanding()
            .queue(Operation::new(command, id.clone()));

        if self.config.batch_size > 0 && unsent >= self.config.batch_size {
            self.flush().await?;
        }

        Ok(Reply::Queued(id))
    }

    /// Sends every queued operation to the sequencer as one batch.
    ///
    /// Returns the number of operations sent. On failure the batch stays queued.
    pub async fn flush(&self) -> Result<usize> {
        let outstanding = self.replica.outstanding();
        let batch = outstanding.take_unsent();
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        if let Err(error) = self
            .sequencer
            .send_operations(&self.config.group, batch.clone())
            .await
        {
            warn!("Replica {} failed to send {} operation(s): {}", self.config.id, count, error);
            outstanding.requeue(batch);
            return Err(error.into());
        }

        debug!("Replica {} sent {} operation(s)", self.config.id, count);
        Ok(count)
    }

    /// Flushes, leaves the group, unbinds and shuts the replica down.
    pub async fn exit(&self) -> Result<()> {
        self.flush().await?;
        self.sequencer
            .leave_group(&self.config.group, &self.config.id)
            .await?;
        self.directory.unbind(&self.config.id).await;
        self.replica.shutdown().await;

        info!("Replica {} left group {}", self.config.id, self.config.group);
        Ok(())
    }

    fn next_id(&self) -> OperationId {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        OperationId::new(&self.config.id, sequence)
    }
}

impl<M, Q, D> Debug for ReplicaNode<M, Q, D>
where
    M: StateMachine,
    Q: SequencerService<M::State>,
    D: ReplicaDirectory<M::State>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaNode")
            .field("config", &self.config)
            .field("replica", &self.replica)
            .finish_non_exhaustive()
    }
}
