//! Cohort rendezvous
//!
//! A cohort is a batch of replicas expected to join together. Each join is
//! counted against the open cohort; when the count is reached the cohort
//! completes, everyone waiting on it is released, and a fresh cohort of the
//! same size opens for the next batch of joiners.

use ledger_replication::CohortTicket;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug)]
struct CohortState {
    size: usize,
    remaining: usize,
    generation: u64,
}

/// Reusable countdown barrier for joining replicas.
#[derive(Debug)]
pub struct CohortBarrier {
    state: Mutex<CohortState>,
    // Highest completed generation.
    completed: watch::Sender<u64>,
}

impl CohortBarrier {
    /// Creates a barrier for cohorts of `size` joiners. A size of zero disables rendezvous.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let (completed, _) = watch::channel(0);

        Self {
            state: Mutex::new(CohortState {
                size,
                remaining: size,
                generation: 1,
            }),
            completed,
        }
    }

    /// Counts one join against the open cohort.
    pub fn arrive(&self) -> CohortTicket {
        let mut state = self.state.lock();

        if state.size == 0 {
            return CohortTicket(*self.completed.borrow());
        }

        let ticket = CohortTicket(state.generation);
        state.remaining -= 1;
        debug!(
            "Cohort {} has {} of {} joiners",
            state.generation,
            state.size - state.remaining,
            state.size
        );

        if state.remaining == 0 {
            let arrived = state.size;
            Self::complete(&mut state, arrived, &self.completed);
        }

        ticket
    }

    /// Waits until the cohort named by `ticket` has completed.
    pub async fn wait(&self, ticket: CohortTicket) {
        let mut completed = self.completed.subscribe();
        // The sender lives as long as `self`, so this only fails if it is dropped mid-wait.
        let _ = completed.wait_for(|generation| *generation >= ticket.0).await;
    }

    /// Resizes the open cohort, counting joins already made against the new size.
    ///
    /// If the new size is already met the open cohort completes immediately.
    pub fn rearm(&self, size: usize) {
        let mut state = self.state.lock();
        let arrived = state.size - state.remaining;
        state.size = size;

        if arrived > 0 && arrived >= size {
            Self::complete(&mut state, arrived, &self.completed);
        } else {
            state.remaining = size - arrived;
        }
        info!("Cohort {} rearmed for {} joiners", state.generation, size);
    }

    /// Generation of the cohort currently accepting joins.
    pub fn open_generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn complete(state: &mut CohortState, arrived: usize, completed: &watch::Sender<u64>) {
        info!("Cohort {} complete with {} joiners", state.generation, arrived);
        completed.send_replace(state.generation);
        state.generation += 1;
        state.remaining = state.size;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_waiters_released_when_cohort_fills() {
        let barrier = Arc::new(CohortBarrier::new(3));

        let first = barrier.arrive();
        let second = barrier.arrive();

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait(first).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let third = barrier.arrive();
        assert_eq!(first, second);
        assert_eq!(second, third);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be released")
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_waiter_does_not_block_on_next_cohort() {
        let barrier = CohortBarrier::new(1);
        let ticket = barrier.arrive();

        // The cohort completed before anyone waited on it.
        tokio::time::timeout(Duration::from_secs(1), barrier.wait(ticket))
            .await
            .expect("completed cohort should not block");
        assert_eq!(barrier.open_generation(), ticket.0 + 1);
    }

    #[tokio::test]
    async fn test_barrier_rearms_for_next_cohort() {
        let barrier = Arc::new(CohortBarrier::new(2));
        let first_cohort = barrier.arrive();
        barrier.arrive();

        let next = barrier.arrive();
        assert_eq!(next.0, first_cohort.0 + 1);

        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait(next).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        barrier.arrive();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("second cohort should complete")
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_size_never_blocks() {
        let barrier = CohortBarrier::new(0);
        let ticket = barrier.arrive();

        tokio::time::timeout(Duration::from_secs(1), barrier.wait(ticket))
            .await
            .expect("disabled barrier should not block");
    }

    #[tokio::test]
    async fn test_rearm_below_arrivals_completes_open_cohort() {
        let barrier = CohortBarrier::new(3);
        let ticket = barrier.arrive();
        barrier.arrive();

        barrier.rearm(2);

        tokio::time::timeout(Duration::from_secs(1), barrier.wait(ticket))
            .await
            .expect("rearm should complete the cohort");
        assert_eq!(barrier.open_generation(), ticket.0 + 1);
    }

    #[tokio::test]
    async fn test_rearm_before_any_join_resizes() {
        let barrier = CohortBarrier::new(3);
        barrier.rearm(1);

        let ticket = barrier.arrive();
        tokio::time::timeout(Duration::from_secs(1), barrier.wait(ticket))
            .await
            .expect("single joiner fills the resized cohort");
    }
}
