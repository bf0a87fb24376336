//! The serialized mutation queue.
//!
//! Every operation that reads the shared snapshot and then mutates tabs or writes the snapshot
//! goes through here, so at most one of them is in flight per peer. The queue itself only makes
//! decisions; the engine owns the timer and runs the operations.

use std::{collections::VecDeque, fmt::Display};

use crate::{schedule::Waiter, snapshot::SyncRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOp {
    /// Publish the local tabs against the stored snapshot.
    SaveTabs,
    /// Merge the stored snapshot into the local tabs, or publish when there is none.
    RestoreTabs,
    /// Merge a snapshot received through a storage notification.
    ApplyRecord(Box<SyncRecord>),
}

impl Display for SyncOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOp::SaveTabs => write!(f, "SaveTabs"),
            SyncOp::RestoreTabs => write!(f, "RestoreTabs"),
            SyncOp::ApplyRecord(record) => write!(
                f,
                "ApplyRecord({} @ {})",
                record.author_peer_id, record.write_time
            ),
        }
    }
}

#[derive(Debug)]
pub struct QueuedOp {
    pub op: SyncOp,
    pub waiters: Vec<Waiter>,
}

/// What the engine should do at a queue step.
#[derive(Debug)]
pub enum Step {
    /// Nothing is queued.
    Idle,
    /// An operation is still running; try again later.
    Locked,
    /// Tabs are still loading; re-check settlement and try again later.
    Settling,
    /// Syncing is not allowed; complete the waiters without running.
    Drop(QueuedOp),
    /// Run the operation. The queue is locked until [`SyncQueue::release`].
    Run(QueuedOp),
}

#[derive(Debug, Default)]
pub struct SyncQueue {
    pending: VecDeque<QueuedOp>,
    locked: bool,
    scheduled: bool,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `op`. A `SaveTabs` joins an unstarted `SaveTabs` already in the queue.
    pub fn push(&mut self, op: SyncOp, waiter: Option<Waiter>) {
        if op == SyncOp::SaveTabs {
            if let Some(queued) = self.pending.iter_mut().find(|q| q.op == SyncOp::SaveTabs) {
                tracing::debug!("[SyncQueue] coalescing SaveTabs");
                queued.waiters.extend(waiter);
                return;
            }
        }
        tracing::debug!("[SyncQueue] queued {op}, {} pending", self.pending.len() + 1);
        self.pending.push_back(QueuedOp {
            op,
            waiters: waiter.into_iter().collect(),
        });
    }

    /// Returns true when a step timer has to be armed: something is queued and no step is
    /// scheduled yet.
    pub fn schedule(&mut self) -> bool {
        if self.scheduled || self.pending.is_empty() {
            return false;
        }
        self.scheduled = true;
        true
    }

    /// Decide the current step. Consumes the scheduled timer.
    pub fn next_step(&mut self, settled: bool, allowed: bool) -> Step {
        self.scheduled = false;
        if self.pending.is_empty() {
            return Step::Idle;
        }
        if self.locked {
            return Step::Locked;
        }
        if !settled {
            return Step::Settling;
        }
        let Some(queued) = self.pending.pop_front() else {
            return Step::Idle;
        };
        if !allowed {
            return Step::Drop(queued);
        }
        self.locked = true;
        Step::Run(queued)
    }

    pub fn release(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PeerId;
    use test_log::test;
    use tokio::sync::oneshot;

    fn record() -> Box<SyncRecord> {
        Box::new(SyncRecord {
            items: vec![],
            author_peer_id: PeerId::from("desk"),
            write_time: 1,
            peer_sync_times: Default::default(),
        })
    }

    #[test]
    fn test_runs_in_order_one_at_a_time() {
        let mut queue = SyncQueue::new();
        queue.push(SyncOp::RestoreTabs, None);
        queue.push(SyncOp::ApplyRecord(record()), None);
        assert!(queue.schedule());
        assert!(!queue.schedule());

        match queue.next_step(true, true) {
            Step::Run(queued) => assert_eq!(queued.op, SyncOp::RestoreTabs),
            other => panic!("unexpected step {other:?}"),
        }
        assert!(queue.is_locked());
        assert!(matches!(queue.next_step(true, true), Step::Locked));

        queue.release();
        match queue.next_step(true, true) {
            Step::Run(queued) => assert!(matches!(queued.op, SyncOp::ApplyRecord(_))),
            other => panic!("unexpected step {other:?}"),
        }
        queue.release();
        assert!(matches!(queue.next_step(true, true), Step::Idle));
    }

    #[test]
    fn test_unsettled_tabs_hold_the_queue() {
        let mut queue = SyncQueue::new();
        queue.push(SyncOp::SaveTabs, None);
        assert!(matches!(queue.next_step(false, true), Step::Settling));
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_locked());
    }

    #[test]
    fn test_disallowed_operations_are_dropped() {
        let mut queue = SyncQueue::new();
        queue.push(SyncOp::RestoreTabs, None);
        assert!(matches!(queue.next_step(true, false), Step::Drop(_)));
        assert!(queue.is_empty());
        assert!(!queue.is_locked());
    }

    #[test]
    fn test_save_requests_coalesce() {
        let mut queue = SyncQueue::new();
        let (tx_a, _rx_a) = oneshot::channel();
        let (tx_b, _rx_b) = oneshot::channel();
        queue.push(SyncOp::SaveTabs, Some(tx_a));
        queue.push(SyncOp::RestoreTabs, None);
        queue.push(SyncOp::SaveTabs, Some(tx_b));
        assert_eq!(queue.len(), 2);

        match queue.next_step(true, true) {
            Step::Run(queued) => {
                assert_eq!(queued.op, SyncOp::SaveTabs);
                assert_eq!(queued.waiters.len(), 2);
            }
            other => panic!("unexpected step {other:?}"),
        }
    }
}
