//! Broadcast coordinator
//!
//! Every broadcast round fans the view out to all live members concurrently and
//! waits for every delivery task to resolve. A member that does not acknowledge
//! within the delivery deadline is evicted; its failure never reaches the other
//! members or the submitter.

use std::sync::Arc;

use futures::future::join_all;
use ledger_replication::{ReplicaId, ReplicatedState, View};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::BroadcastConfig;
use crate::group::{Group, MemberRecord};

/// What happened to each member during one broadcast round.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BroadcastReport {
    /// Members that acknowledged the view, sorted
    pub acknowledged: Vec<ReplicaId>,
    /// Members evicted after exhausting the delivery deadline, sorted
    pub evicted: Vec<ReplicaId>,
}

/// Result of the bounded delivery loop for one member.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Delivery {
    Acknowledged { attempts: u32 },
    Failed { attempts: u32 },
}

/// Outcome of one member's delivery task.
#[derive(Clone, Debug)]
enum MemberOutcome {
    Acknowledged(ReplicaId),
    Evicted(ReplicaId),
    // Delivery failed but the member had already rejoined or left.
    Dropped(ReplicaId),
}

/// Pushes views to the members of one group.
#[derive(Debug)]
pub struct Broadcaster<S>
where
    S: ReplicatedState,
{
    group: Arc<Group<S>>,
    config: BroadcastConfig,
}

impl<S> Broadcaster<S>
where
    S: ReplicatedState,
{
    /// Creates a broadcaster for `group`.
    pub const fn new(group: Arc<Group<S>>, config: BroadcastConfig) -> Self {
        Self { group, config }
    }

    /// Delivers `view` to every live member and waits for all deliveries to resolve.
    pub async fn broadcast(&self, view: &View) -> BroadcastReport {
        let members = self.group.members();

        if members.is_empty() {
            debug!("Group {} has no members, skipping broadcast", self.group.name());
            return BroadcastReport::default();
        }

        debug!(
            "Broadcasting view of {} entries to {} members of group {}",
            view.len(),
            members.len(),
            self.group.name()
        );

        let mut handles = Vec::with_capacity(members.len());
        for member in members {
            let group = self.group.clone();
            let config = self.config.clone();
            let view = view.clone();

            handles.push(tokio::spawn(async move {
                Self::deliver_to_member(&group, member, &view, &config).await
            }));
        }

        let mut report = BroadcastReport::default();
        for result in join_all(handles).await {
            match result {
                Ok(MemberOutcome::Acknowledged(id)) => report.acknowledged.push(id),
                Ok(MemberOutcome::Evicted(id)) => report.evicted.push(id),
                Ok(MemberOutcome::Dropped(id)) => {
                    debug!("Replica {} failed delivery after it rejoined or left", id);
                }
                Err(e) => warn!("Delivery task failed: {}", e),
            }
        }

        report.acknowledged.sort();
        report.evicted.sort();
        report
    }

    async fn deliver_to_member(
        group: &Group<S>,
        member: MemberRecord<S>,
        view: &View,
        config: &BroadcastConfig,
    ) -> MemberOutcome {
        match Self::deliver_with_retry(&member, view, config).await {
            Delivery::Acknowledged { attempts } => {
                debug!(
                    "ACK from replica {} after {} attempt(s)",
                    member.id, attempts
                );
                Self::refresh_snapshot(group, &member, config).await;
                MemberOutcome::Acknowledged(member.id)
            }
            Delivery::Failed { attempts } => {
                if group.evict(&member.id, member.incarnation) {
                    warn!(
                        "Evicted replica {} from group {}: no acknowledgement after {} attempt(s) within {:?}",
                        member.id,
                        group.name(),
                        attempts,
                        config.delivery_deadline
                    );
                    MemberOutcome::Evicted(member.id)
                } else {
                    MemberOutcome::Dropped(member.id)
                }
            }
        }
    }

    /// Repeats the delivery until it is acknowledged or the deadline runs out.
    ///
    /// Each attempt is bounded by the attempt timeout, clipped to what is left of
    /// the deadline. A timed-out attempt is dropped, which cancels the call.
    async fn deliver_with_retry(
        member: &MemberRecord<S>,
        view: &View,
        config: &BroadcastConfig,
    ) -> Delivery {
        let deadline = Instant::now() + config.delivery_deadline;
        let mut attempts = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Delivery::Failed { attempts };
            }

            attempts += 1;
            let budget = remaining.min(config.attempt_timeout);

            match timeout(budget, member.handle.deliver_ordered_batch(view.clone())).await {
                Ok(Ok(true)) => return Delivery::Acknowledged { attempts },
                Ok(Ok(false)) => {
                    debug!("Replica {} declined attempt {}, retrying", member.id, attempts);
                }
                Ok(Err(e)) => {
                    warn!("Delivery to replica {} failed on attempt {}: {}", member.id, attempts, e);
                }
                Err(_) => {
                    debug!("Timeout delivering to replica {} on attempt {}, retrying", member.id, attempts);
                    continue;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(remaining.min(config.retry_delay)).await;
        }
    }

    async fn refresh_snapshot(group: &Group<S>, member: &MemberRecord<S>, config: &BroadcastConfig) {
        match timeout(config.snapshot_timeout, member.handle.snapshot()).await {
            Ok(Ok(snapshot)) => {
                let offer = group.offer_snapshot(&member.id, snapshot);
                debug!("Snapshot from replica {}: {:?}", member.id, offer);
            }
            Ok(Err(e)) => {
                info!("Could not fetch snapshot from replica {}: {}", member.id, e);
            }
            Err(_) => {
                info!("Timed out fetching snapshot from replica {}", member.id);
            }
        }
    }
}
