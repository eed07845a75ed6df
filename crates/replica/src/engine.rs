//! Replica apply engine
//!
//! Deliveries are queued to a single worker which runs one application pass per
//! queued item, strictly in enqueue order. Every finished pass publishes a
//! snapshot tagged with its pass number before the state lock is released, and
//! a reader waits for the pass covering everything queued before its call.

use std::collections::HashSet;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ledger_replication::{
    Operation, OperationId, RemoteError, ReplicaId, ReplicaService, Snapshot, StateMachine, View,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::outstanding::Outstanding;

/// Where an operation issued or seen by this replica stands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Issued here and not yet applied.
    Pending,
    /// Applied (or answered) by this replica.
    Executed,
    /// Never seen.
    Unknown,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Executed => f.write_str("executed"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Answer to a synchronized query issued by this replica.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryAnswer {
    /// Id of the query operation.
    pub id: OperationId,
    /// The query command.
    pub command: String,
    /// The answer, or the state machine's error message.
    pub answer: std::result::Result<String, String>,
}

enum Work<S> {
    Apply(View),
    Install(Snapshot<S>),
}

#[derive(Debug)]
struct Ledger<S> {
    state: S,
    cursor: u64,
    executed: HashSet<OperationId>,
    answered: HashSet<OperationId>,
    history: Vec<Operation>,
}

impl<S: Default> Default for Ledger<S> {
    fn default() -> Self {
        Self {
            state: S::default(),
            cursor: 0,
            executed: HashSet::new(),
            answered: HashSet::new(),
            history: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Published<S> {
    pass: u64,
    snapshot: Snapshot<S>,
}

struct Worker<M>
where
    M: StateMachine,
{
    id: ReplicaId,
    machine: Arc<M>,
    ledger: Arc<Mutex<Ledger<M::State>>>,
    outstanding: Arc<Outstanding>,
    answers: mpsc::UnboundedSender<QueryAnswer>,
    published: watch::Sender<Published<M::State>>,
    pass: u64,
}

impl<M> Worker<M>
where
    M: StateMachine,
{
    async fn run(
        mut self,
        mut queue: mpsc::UnboundedReceiver<Work<M::State>>,
        shutdown_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = shutdown_token.cancelled() => break,
                work = queue.recv() => match work {
                    Some(work) => self.process(work).await,
                    None => break,
                },
            }
        }

        debug!("Apply worker of {} stopped after {} pass(es)", self.id, self.pass);
    }

    async fn process(&mut self, work: Work<M::State>) {
        let mut ledger = self.ledger.lock().await;

        match work {
            Work::Apply(view) => self.replay(&mut ledger, &view),
            Work::Install(snapshot) => self.install(&mut ledger, snapshot),
        }

        self.pass += 1;
        self.published.send_replace(Published {
            pass: self.pass,
            snapshot: Snapshot::new(ledger.state.clone(), ledger.cursor),
        });
    }

    fn replay(&self, ledger: &mut Ledger<M::State>, view: &View) {
        let start = usize::try_from(ledger.cursor).unwrap_or(usize::MAX);
        let before = ledger.cursor;

        for operation in view.entries_from(start) {
            if ledger.executed.contains(operation.id()) {
                debug!("Replica {} skipped already executed {}", self.id, operation.id());
                continue;
            }

            if self.machine.classify(operation.command()).is_mutation() {
                self.apply(ledger, operation);
            } else {
                self.answer(ledger, operation);
            }
        }

        debug!(
            "Replica {} applied {} operation(s) from a view of {}, cursor now {}",
            self.id,
            ledger.cursor - before,
            view.len(),
            ledger.cursor
        );
    }

    fn apply(&self, ledger: &mut Ledger<M::State>, operation: &Operation) {
        match self.machine.apply(operation.command(), &ledger.state) {
            Ok(state) => {
                ledger.state = state;
                ledger.history.push(operation.clone());
            }
            // Every replica rejects the same command, so the position is still consumed.
            Err(error) => warn!(
                "Replica {} rejected {} ({}): {}",
                self.id,
                operation.id(),
                operation.command(),
                error
            ),
        }

        ledger.executed.insert(operation.id().clone());
        ledger.cursor += 1;
        self.outstanding.resolve(operation.id());
    }

    fn answer(&self, ledger: &mut Ledger<M::State>, operation: &Operation) {
        if !operation.originated_at(&self.id) || !ledger.answered.insert(operation.id().clone()) {
            return;
        }

        let answer = self
            .machine
            .query(operation.command(), &ledger.state)
            .map_err(|error| error.to_string());
        self.outstanding.resolve(operation.id());

        let answer = QueryAnswer {
            id: operation.id().clone(),
            command: operation.command().to_string(),
            answer,
        };
        if self.answers.send(answer).is_err() {
            debug!("Replica {} dropped answer to {}: no listener", self.id, operation.id());
        }
    }

    fn install(&self, ledger: &mut Ledger<M::State>, snapshot: Snapshot<M::State>) {
        if snapshot.applied() <= ledger.cursor {
            debug!(
                "Replica {} ignored snapshot at {}, already at {}",
                self.id,
                snapshot.applied(),
                ledger.cursor
            );
            return;
        }

        let (state, applied) = snapshot.into_parts();
        info!("Replica {} installed snapshot at cursor {}", self.id, applied);
        ledger.state = state;
        ledger.cursor = applied;
    }
}

type Startup<M> = (
    Worker<M>,
    mpsc::UnboundedReceiver<Work<<M as StateMachine>::State>>,
);

/// One replica of the ledger.
///
/// Local state is only ever mutated by the apply worker. Everything else reads it
/// through [`ReplicaService::snapshot`] or the record-keeping accessors.
pub struct Replica<M>
where
    M: StateMachine,
{
    id: ReplicaId,
    ledger: Arc<Mutex<Ledger<M::State>>>,
    outstanding: Arc<Outstanding>,
    queue: mpsc::UnboundedSender<Work<M::State>>,
    enqueued: AtomicU64,
    published: watch::Receiver<Published<M::State>>,
    startup: parking_lot::Mutex<Option<Startup<M>>>,
    answers: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<QueryAnswer>>>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl<M> Replica<M>
where
    M: StateMachine,
{
    /// Creates a replica with empty state. Deliveries queue up until [`Self::start`].
    pub fn new(id: impl Into<ReplicaId>, machine: Arc<M>) -> Self {
        let id = id.into();
        let ledger = Arc::new(Mutex::new(Ledger::default()));
        let outstanding = Arc::new(Outstanding::new());
        let (queue, queue_receiver) = mpsc::unbounded_channel();
        let (answers, answers_receiver) = mpsc::unbounded_channel();
        let (published, published_receiver) = watch::channel(Published::default());

        let worker = Worker {
            id: id.clone(),
            machine,
            ledger: ledger.clone(),
            outstanding: outstanding.clone(),
            answers,
            published,
            pass: 0,
        };

        Self {
            id,
            ledger,
            outstanding,
            queue,
            enqueued: AtomicU64::new(0),
            published: published_receiver,
            startup: parking_lot::Mutex::new(Some((worker, queue_receiver))),
            answers: parking_lot::Mutex::new(Some(answers_receiver)),
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Spawns the apply worker.
    pub fn start(&self) -> Result<()> {
        let Some((worker, queue)) = self.startup.lock().take() else {
            return Err(Error::AlreadyStarted);
        };

        self.task_tracker
            .spawn(worker.run(queue, self.shutdown_token.clone()));
        self.task_tracker.close();

        info!("Replica {} started", self.id);
        Ok(())
    }

    /// Stops the apply worker. Queued passes that have not started are dropped.
    pub async fn shutdown(&self) {
        info!("Replica {} shutting down...", self.id);

        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("Replica {} shut down", self.id);
    }

    /// Queues `snapshot` for installation. It only takes effect if it is ahead of
    /// the cursor when the worker reaches it.
    pub fn install(&self, snapshot: Snapshot<M::State>) -> Result<()> {
        self.enqueue(Work::Install(snapshot))
            .map_err(|_| Error::Shutdown)
    }

    /// Takes the receiving end of the synchronized query answers. Only the first call
    /// gets it.
    pub fn take_answers(&self) -> Option<mpsc::UnboundedReceiver<QueryAnswer>> {
        self.answers.lock().take()
    }

    /// Operations issued here that have not been applied yet.
    pub const fn outstanding(&self) -> &Arc<Outstanding> {
        &self.outstanding
    }

    /// Operations applied successfully since the history was last cleaned, in order.
    pub async fn history(&self) -> Vec<Operation> {
        self.ledger.lock().await.history.clone()
    }

    /// Clears the history. Executed ids are kept, so replays stay idempotent.
    pub async fn clean_history(&self) {
        self.ledger.lock().await.history.clear();
    }

    /// Status of `id` as seen by this replica.
    pub async fn tx_status(&self, id: &OperationId) -> TxStatus {
        let ledger = self.ledger.lock().await;
        if ledger.executed.contains(id) || ledger.answered.contains(id) {
            TxStatus::Executed
        } else if self.outstanding.contains(id) {
            TxStatus::Pending
        } else {
            TxStatus::Unknown
        }
    }

    fn enqueue(&self, work: Work<M::State>) -> std::result::Result<(), RemoteError> {
        if self.shutdown_token.is_cancelled() {
            return Err(self.unavailable());
        }

        self.enqueued.fetch_add(1, Ordering::SeqCst);
        self.queue.send(work).map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> RemoteError {
        RemoteError::Unavailable(format!("replica {} has shut down", self.id))
    }
}

impl<M> Debug for Replica<M>
where
    M: StateMachine,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replica")
            .field("id", &self.id)
            .field("enqueued", &self.enqueued.load(Ordering::Relaxed))
            .field("outstanding", &self.outstanding.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M> ReplicaService<M::State> for Replica<M>
where
    M: StateMachine,
{
    fn id(&self) -> &ReplicaId {
        &self.id
    }

    async fn deliver_ordered_batch(&self, view: View) -> std::result::Result<bool, RemoteError> {
        debug!("Replica {} queued a view of {} entries", self.id, view.len());
        self.enqueue(Work::Apply(view))?;
        Ok(true)
    }

    async fn snapshot(&self) -> std::result::Result<Snapshot<M::State>, RemoteError> {
        let target = self.enqueued.load(Ordering::SeqCst);
        let mut published = self.published.clone();

        let snapshot = published
            .wait_for(|published| published.pass >= target)
            .await
            .map_err(|_| self.unavailable())?
            .snapshot
            .clone();

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use ledger_replication::{CommandClassifier, CommandKind, StateMachineError};
    use thiserror::Error as ThisError;

    use super::*;

    #[derive(Debug, ThisError)]
    #[error("{0}")]
    struct TallyError(String);

    impl StateMachineError for TallyError {}

    /// `add <n>` mutates, `fail` is always rejected, `sum` is a synchronized query.
    struct Tally;

    impl CommandClassifier for Tally {
        fn classify(&self, command: &str) -> CommandKind {
            if command == "sum" {
                CommandKind::SyncedQuery
            } else {
                CommandKind::Mutation
            }
        }
    }

    impl StateMachine for Tally {
        type State = i64;
        type Error = TallyError;

        fn apply(&self, command: &str, state: &i64) -> std::result::Result<i64, TallyError> {
            command
                .strip_prefix("add ")
                .and_then(|n| n.parse::<i64>().ok())
                .map(|n| state + n)
                .ok_or_else(|| TallyError(format!("cannot apply '{command}'")))
        }

        fn query(&self, _command: &str, state: &i64) -> std::result::Result<String, TallyError> {
            Ok(format!("sum is {state}"))
        }
    }

    fn started(id: &str) -> Replica<Tally> {
        let replica = Replica::new(id, Arc::new(Tally));
        replica.start().unwrap();
        replica
    }

    fn view(entries: &[(&str, &str)]) -> View {
        entries
            .iter()
            .map(|(command, id)| Operation::new(*command, *id))
            .collect()
    }

    #[tokio::test]
    async fn test_snapshot_reflects_delivered_view() {
        let replica = started("R1");

        let acked = replica
            .deliver_ordered_batch(view(&[("add 2", "R1:1"), ("add 3", "R2:1")]))
            .await
            .unwrap();
        assert!(acked);

        let snapshot = replica.snapshot().await.unwrap();
        assert_eq!(snapshot, Snapshot::new(5, 2));
    }

    #[tokio::test]
    async fn test_snapshot_waits_for_queued_pass() {
        let replica = Arc::new(Replica::new("R1", Arc::new(Tally)));
        replica
            .deliver_ordered_batch(view(&[("add 4", "R1:1")]))
            .await
            .unwrap();

        let reader = {
            let replica = replica.clone();
            tokio::spawn(async move { replica.snapshot().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        replica.start().unwrap();
        let snapshot = reader.await.unwrap().unwrap();
        assert_eq!(snapshot, Snapshot::new(4, 1));
    }

    #[tokio::test]
    async fn test_overlapping_views_apply_once() {
        let replica = started("R1");
        let first = view(&[("add 1", "R1:1"), ("add 10", "R1:2")]);
        let second = view(&[("add 1", "R1:1"), ("add 10", "R1:2"), ("add 100", "R1:3")]);

        replica.deliver_ordered_batch(first.clone()).await.unwrap();
        replica.deliver_ordered_batch(second).await.unwrap();
        replica.deliver_ordered_batch(first).await.unwrap();

        assert_eq!(replica.snapshot().await.unwrap(), Snapshot::new(111, 3));
        assert_eq!(replica.history().await.len(), 3);
    }

    #[tokio::test]
    async fn test_synced_query_answered_once_by_originator_only() {
        let origin = started("R1");
        let other = started("R2");
        let mut answers = origin.take_answers().unwrap();
        let mut other_answers = other.take_answers().unwrap();

        let round = view(&[("add 7", "R2:1"), ("sum", "R1:1")]);
        for replica in [&origin, &other] {
            replica.deliver_ordered_batch(round.clone()).await.unwrap();
            replica.deliver_ordered_batch(round.clone()).await.unwrap();
        }

        // Queries never advance the cursor.
        assert_eq!(origin.snapshot().await.unwrap(), Snapshot::new(7, 1));
        assert_eq!(other.snapshot().await.unwrap(), Snapshot::new(7, 1));

        let answer = answers.try_recv().unwrap();
        assert_eq!(answer.id, OperationId::from("R1:1"));
        assert_eq!(answer.answer, Ok("sum is 7".to_string()));
        assert!(answers.try_recv().is_err());
        assert!(other_answers.try_recv().is_err());
        assert_eq!(origin.tx_status(&OperationId::from("R1:1")).await, TxStatus::Executed);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_rejected_command_still_consumes_its_position() {
        let replica = started("R1");

        replica
            .deliver_ordered_batch(view(&[("add 1", "R1:1"), ("fail", "R1:2"), ("add 2", "R1:3")]))
            .await
            .unwrap();

        assert_eq!(replica.snapshot().await.unwrap(), Snapshot::new(3, 3));
        assert_eq!(replica.history().await.len(), 2);
        assert!(logs_contain("Replica R1 rejected R1:2"));
    }

    #[tokio::test]
    async fn test_install_only_moves_forward() {
        let replica = started("R3");

        replica.install(Snapshot::new(30, 2)).unwrap();
        replica.install(Snapshot::new(99, 1)).unwrap();
        assert_eq!(replica.snapshot().await.unwrap(), Snapshot::new(30, 2));

        // Catch up from the installed cursor.
        replica
            .deliver_ordered_batch(view(&[("add 10", "R1:1"), ("add 20", "R1:2"), ("add 5", "R1:3")]))
            .await
            .unwrap();
        assert_eq!(replica.snapshot().await.unwrap(), Snapshot::new(35, 3));
    }

    #[tokio::test]
    async fn test_tx_status_and_history() {
        let replica = started("R1");
        let issued = Operation::new("add 1", "R1:1");
        replica.outstanding().queue(issued.clone());

        assert_eq!(replica.tx_status(issued.id()).await, TxStatus::Pending);
        assert_eq!(replica.tx_status(&OperationId::from("R1:9")).await, TxStatus::Unknown);

        replica
            .deliver_ordered_batch(View::from(vec![issued.clone()]))
            .await
            .unwrap();
        replica.snapshot().await.unwrap();

        assert_eq!(replica.tx_status(issued.id()).await, TxStatus::Executed);
        assert!(replica.outstanding().is_empty());
        assert_eq!(replica.history().await, vec![issued.clone()]);

        replica.clean_history().await;
        assert!(replica.history().await.is_empty());
        assert_eq!(replica.tx_status(issued.id()).await, TxStatus::Executed);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let replica = started("R1");
        assert_matches!(replica.start(), Err(Error::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_shut_down_replica_refuses_deliveries() {
        let replica = started("R1");
        replica
            .deliver_ordered_batch(view(&[("add 1", "R1:1")]))
            .await
            .unwrap();
        replica.snapshot().await.unwrap();

        replica.shutdown().await;

        assert_matches!(
            replica.deliver_ordered_batch(view(&[("add 1", "R1:1")])).await,
            Err(RemoteError::Unavailable(_))
        );
        // The last published snapshot stays readable.
        assert_eq!(replica.snapshot().await.unwrap(), Snapshot::new(1, 1));
    }
}
