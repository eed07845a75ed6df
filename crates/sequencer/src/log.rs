//! Total-order assigner
//!
//! The view is append-only from the point of view of submitters: an operation id
//! enters it at most once, and an entry never moves while other entries are
//! appended. The only removal is [`TransactionLog::trim`], which the coordinator
//! runs under the same round lock as submission.

use std::collections::HashSet;

use ledger_replication::{Operation, OperationId, View};
use parking_lot::Mutex;
use tracing::debug;

/// Outcome of a submission.
#[derive(Clone, Debug)]
pub struct Submission {
    /// The full view after the batch was merged
    pub view: View,
    /// Number of operations newly appended
    pub appended: usize,
    /// Number of operations absorbed because their id was already seen
    pub duplicates: usize,
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<Operation>,
    // Ids of `entries`, kept in step with it.
    seen: HashSet<OperationId>,
}

/// The globally ordered sequence of operations for one group.
#[derive(Debug, Default)]
pub struct TransactionLog {
    state: Mutex<LogState>,
}

impl TransactionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends each operation of `batch`, in order, unless its id was already seen.
    pub fn submit<I>(&self, batch: I) -> Submission
    where
        I: IntoIterator<Item = Operation>,
    {
        let mut state = self.state.lock();
        let mut appended = 0;
        let mut duplicates = 0;

        for operation in batch {
            if state.seen.insert(operation.id().clone()) {
                state.entries.push(operation);
                appended += 1;
            } else {
                debug!("Absorbed duplicate operation {}", operation.id());
                duplicates += 1;
            }
        }

        Submission {
            view: View::from(state.entries.clone()),
            appended,
            duplicates,
        }
    }

    /// The current view.
    pub fn view(&self) -> View {
        View::from(self.state.lock().entries.clone())
    }

    /// Number of entries in the view.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Removes entries matching `predicate`, keeping the relative order of the rest.
    ///
    /// Trimmed ids are forgotten: a later submission with the same id is appended again.
    pub fn trim<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&Operation) -> bool,
    {
        let mut state = self.state.lock();
        let LogState { entries, seen } = &mut *state;
        let before = entries.len();

        entries.retain(|operation| {
            if predicate(operation) {
                seen.remove(operation.id());
                false
            } else {
                true
            }
        });

        before - entries.len()
    }
}
