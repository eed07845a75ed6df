use indexmap::IndexMap;
use ledger_replication::{Operation, OperationId};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct OutstandingState {
    unsent: Vec<Operation>,
    awaiting: IndexMap<OperationId, Operation>,
}

/// Operations this replica issued that it has not yet seen applied.
///
/// An operation is unsent until a flush takes it, then awaiting until the apply
/// engine reaches it in the view.
#[derive(Debug, Default)]
pub struct Outstanding {
    state: Mutex<OutstandingState>,
}

impl Outstanding {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an operation for the next flush. Returns the number now unsent.
    pub fn queue(&self, operation: Operation) -> usize {
        let mut state = self.state.lock();
        state.unsent.push(operation);
        state.unsent.len()
    }

    /// Takes every unsent operation, in issue order, and marks it awaiting.
    pub fn take_unsent(&self) -> Vec<Operation> {
        let mut state = self.state.lock();
        let batch = std::mem::take(&mut state.unsent);
        for operation in &batch {
            state
                .awaiting
                .insert(operation.id().clone(), operation.clone());
        }
        batch
    }

    /// Puts a batch whose send failed back in front of the unsent queue.
    pub fn requeue(&self, batch: Vec<Operation>) {
        let mut state = self.state.lock();
        for operation in &batch {
            state.awaiting.shift_remove(operation.id());
        }
        let later = std::mem::replace(&mut state.unsent, batch);
        state.unsent.extend(later);
    }

    /// Forgets `id` once it has been applied. Returns whether it was outstanding.
    pub fn resolve(&self, id: &OperationId) -> bool {
        let mut state = self.state.lock();
        if state.awaiting.shift_remove(id).is_some() {
            return true;
        }
        let before = state.unsent.len();
        state.unsent.retain(|operation| operation.id() != id);
        state.unsent.len() != before
    }

    /// Whether `id` is unsent or awaiting application.
    pub fn contains(&self, id: &OperationId) -> bool {
        let state = self.state.lock();
        state.awaiting.contains_key(id) || state.unsent.iter().any(|op| op.id() == id)
    }

    /// Number of unsent operations.
    pub fn unsent_len(&self) -> usize {
        self.state.lock().unsent.len()
    }

    /// Total number of outstanding operations.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.unsent.len() + state.awaiting.len()
    }

    /// Whether nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: &str) -> Operation {
        Operation::new("deposit USD 1", id)
    }

    #[test]
    fn test_flush_moves_unsent_to_awaiting() {
        let outstanding = Outstanding::new();
        assert_eq!(outstanding.queue(op("R1:1")), 1);
        assert_eq!(outstanding.queue(op("R1:2")), 2);

        let batch = outstanding.take_unsent();
        let ids: Vec<&str> = batch.iter().map(|op| op.id().as_str()).collect();
        assert_eq!(ids, vec!["R1:1", "R1:2"]);
        assert_eq!(outstanding.unsent_len(), 0);
        assert_eq!(outstanding.len(), 2);
        assert!(outstanding.contains(&OperationId::from("R1:1")));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let outstanding = Outstanding::new();
        outstanding.queue(op("R1:1"));
        outstanding.take_unsent();

        assert!(outstanding.resolve(&OperationId::from("R1:1")));
        assert!(!outstanding.resolve(&OperationId::from("R1:1")));
        assert!(outstanding.is_empty());
    }

    #[test]
    fn test_requeue_keeps_issue_order() {
        let outstanding = Outstanding::new();
        outstanding.queue(op("R1:1"));
        outstanding.queue(op("R1:2"));
        let batch = outstanding.take_unsent();
        outstanding.queue(op("R1:3"));

        outstanding.requeue(batch);

        let ids: Vec<String> = outstanding
            .take_unsent()
            .iter()
            .map(|op| op.id().to_string())
            .collect();
        assert_eq!(ids, vec!["R1:1", "R1:2", "R1:3"]);
    }
}
