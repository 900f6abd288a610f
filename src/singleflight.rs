//! Per-URL single-flight coalescing.
//!
//! Concurrent evaluations of the same key share one in-progress future.
//! The key map is only locked to look up or insert a slot, never across an
//! await.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::types::Outcome;

type Slot = Arc<OnceCell<Outcome>>;

#[derive(Default)]
pub(crate) struct SingleFlight {
    calls: Mutex<HashMap<String, Slot>>,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `f` for `key`, or join an evaluation of `key` already in progress.
    ///
    /// If the leading caller is cancelled before finishing, a waiting joiner
    /// runs its own `f` to completion instead.
    pub(crate) async fn run<F, Fut>(&self, key: &str, f: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let (slot, leader) = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(slot) => (slot.clone(), false),
                None => {
                    let slot = Slot::default();
                    calls.insert(key.to_string(), slot.clone());
                    (slot, true)
                }
            }
        };

        if !leader {
            tracing::debug!(url = key, "joining in-flight evaluation");
        }

        let _guard = SlotGuard {
            flight: self,
            key,
            slot: &slot,
            leader,
        };
        let outcome = slot.get_or_init(f).await;
        *outcome
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

/// Releases the key once its slot is resolved, or when the leader goes away.
struct SlotGuard<'a> {
    flight: &'a SingleFlight,
    key: &'a str,
    slot: &'a Slot,
    leader: bool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !(self.leader || self.slot.initialized()) {
            return;
        }
        let mut calls = self.flight.calls.lock();
        if calls
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, self.slot))
        {
            calls.remove(self.key);
        }
    }
}
