use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{PeerError, Result};

/// Outcome delivered to a waiting caller.
pub type CallResult = Result<Bytes>;

struct PendingCall {
    created_at: Instant,
    slot: oneshot::Sender<CallResult>,
}

/// Calls awaiting a reply, keyed by correlation id.
///
/// An entry is resolved by whoever removes it from the table under the lock:
/// the reader (reply), the reaper (reclaim) or teardown (cancel). The
/// single-use sender makes a second delivery impossible.
#[derive(Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<u64, PendingCall>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and return the receiving end of its result slot.
    ///
    /// Registering an id twice replaces the older entry, whose waiter then
    /// sees a closed slot.
    pub fn register(&self, id: u64) -> oneshot::Receiver<CallResult> {
        let (slot, rx) = oneshot::channel();
        let call = PendingCall {
            created_at: Instant::now(),
            slot,
        };
        self.lock().insert(id, call);
        rx
    }

    /// Deliver `result` to the caller waiting on `id`.
    ///
    /// Returns false if no such call is pending.
    pub fn resolve(&self, id: u64, result: CallResult) -> bool {
        let call = self.lock().remove(&id);
        match call {
            Some(call) => {
                deliver(id, call, result);
                true
            }
            None => false,
        }
    }

    /// Drop a registration without delivering anything.
    pub fn forget(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Resolve every call older than `stale_after` with `Reclaimed`.
    pub fn reap(&self, stale_after: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<(u64, PendingCall)> = {
            let mut calls = self.lock();
            let ids: Vec<u64> = calls
                .iter()
                .filter(|(_, call)| now.saturating_duration_since(call.created_at) >= stale_after)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| calls.remove(&id).map(|call| (id, call)))
                .collect()
        };

        let reclaimed = stale.len();
        for (id, call) in stale {
            deliver(id, call, Err(PeerError::Reclaimed(stale_after)));
        }
        reclaimed
    }

    /// Resolve every outstanding call with `Cancelled`.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(u64, PendingCall)> = self.lock().drain().collect();
        let cancelled = drained.len();
        for (id, call) in drained {
            deliver(id, call, Err(PeerError::Cancelled));
        }
        cancelled
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        // Every critical section is a single map operation; the table is
        // consistent even if a holder panicked.
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn deliver(id: u64, call: PendingCall, result: CallResult) {
    if call.slot.send(result).is_err() {
        trace!(id, "caller stopped waiting before its result arrived");
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn resolve_delivers_once() {
        let pending = PendingCalls::new();
        let rx = pending.register(1);

        assert!(pending.resolve(1, Ok(Bytes::from_static(b"pong"))));
        assert!(!pending.resolve(1, Ok(Bytes::from_static(b"again"))));

        assert_eq!(rx.blocking_recv().unwrap().unwrap().as_ref(), b"pong");
        assert!(pending.is_empty());
    }

    #[test]
    fn resolve_unknown_id_is_noop() {
        let pending = PendingCalls::new();
        assert!(!pending.resolve(7, Err(PeerError::Cancelled)));
    }

    #[test]
    fn forget_removes_without_delivery() {
        let pending = PendingCalls::new();
        let rx = pending.register(3);

        assert!(pending.forget(3));
        assert!(!pending.forget(3));
        assert!(rx.blocking_recv().is_err());
    }

    #[test]
    fn reap_only_takes_stale_calls() {
        let pending = PendingCalls::new();
        let old = pending.register(1);
        thread::sleep(Duration::from_millis(40));
        let _fresh = pending.register(2);

        assert_eq!(pending.reap(Duration::from_millis(30)), 1);
        assert_eq!(pending.len(), 1);
        assert!(matches!(
            old.blocking_recv().unwrap(),
            Err(PeerError::Reclaimed(_))
        ));
    }

    #[test]
    fn late_resolve_after_reap_is_discarded() {
        let pending = PendingCalls::new();
        let rx = pending.register(5);
        assert_eq!(pending.reap(Duration::ZERO), 1);

        assert!(!pending.resolve(5, Ok(Bytes::from_static(b"late"))));
        assert!(matches!(rx.blocking_recv().unwrap(), Err(PeerError::Reclaimed(_))));
    }

    #[test]
    fn cancel_all_resolves_everything() {
        let pending = PendingCalls::new();
        let receivers: Vec<_> = (0..5).map(|id| pending.register(id)).collect();

        assert_eq!(pending.cancel_all(), 5);
        assert!(pending.is_empty());
        for rx in receivers {
            assert!(matches!(rx.blocking_recv().unwrap(), Err(PeerError::Cancelled)));
        }
    }

    #[test]
    fn racing_resolvers_deliver_exactly_once() {
        let pending = std::sync::Arc::new(PendingCalls::new());
        let rx = pending.register(9);

        let handles: Vec<_> = (0..3)
            .map(|n| {
                let pending = std::sync::Arc::clone(&pending);
                thread::spawn(move || match n {
                    0 => pending.resolve(9, Ok(Bytes::from_static(b"reply"))),
                    1 => pending.reap(Duration::ZERO) == 1,
                    _ => pending.cancel_all() == 1,
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(rx.blocking_recv().is_ok());
    }

    #[test]
    fn dropped_receiver_does_not_block_delivery() {
        let pending = PendingCalls::new();
        drop(pending.register(4));
        assert!(pending.resolve(4, Ok(Bytes::new())));
    }
}
