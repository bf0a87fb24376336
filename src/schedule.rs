use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::SyncError;

/// Completion handle of a caller waiting on a queued or delayed operation.
pub type Waiter = oneshot::Sender<Result<(), SyncError>>;

pub fn complete_all(waiters: Vec<Waiter>, result: Result<(), SyncError>) {
    for waiter in waiters {
        // the caller may have stopped waiting
        let _ = waiter.send(result.clone());
    }
}

#[derive(Debug)]
struct SlotState<T> {
    data: Option<T>,
    waiters: Vec<Waiter>,
}

/// Debounce buffer holding at most one pending payload.
///
/// The first offer of a cycle arms it and fixes the fire time. Later offers replace the payload
/// and join their waiter to the cycle without moving the fire time. At fire time the owner calls
/// [`DelayedSlot::take`], which empties the slot so that the next offer starts a new cycle.
#[derive(Debug)]
pub struct DelayedSlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Default for DelayedSlot<T> {
    fn default() -> Self {
        DelayedSlot {
            state: Mutex::new(SlotState {
                data: None,
                waiters: Vec::new(),
            }),
        }
    }
}

impl<T> DelayedSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data`, replacing any pending payload. Returns true when this offer started a new
    /// cycle and the caller has to arm the timer.
    pub fn offer(&self, data: T, waiter: Option<Waiter>) -> bool {
        let mut state = self.state.lock();
        let fresh = state.data.is_none();
        state.data = Some(data);
        state.waiters.extend(waiter);
        fresh
    }

    pub fn take(&self) -> Option<(T, Vec<Waiter>)> {
        let mut state = self.state.lock();
        let data = state.data.take()?;
        Some((data, std::mem::take(&mut state.waiters)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_first_offer_arms_and_later_offers_replace() {
        let slot = DelayedSlot::new();
        assert!(slot.offer(1, None));
        assert!(!slot.offer(2, None));

        let (data, waiters) = slot.take().unwrap();
        assert_eq!(data, 2);
        assert!(waiters.is_empty());
        assert!(slot.take().is_none());
        assert!(slot.offer(3, None));
    }

    #[test(tokio::test)]
    async fn test_every_waiter_of_a_cycle_completes() {
        let slot = DelayedSlot::new();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        slot.offer("a", Some(tx_a));
        slot.offer("b", Some(tx_b));

        let (data, waiters) = slot.take().unwrap();
        assert_eq!(data, "b");
        complete_all(waiters, Err(SyncError::Store("quota".to_string())));

        assert_eq!(rx_a.await.unwrap(), Err(SyncError::Store("quota".to_string())));
        assert!(rx_b.await.unwrap().is_err());
    }
}
