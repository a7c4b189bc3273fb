//! Per-key gates that keep at most one backing fetch in flight.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async gates serializing cache fills.
///
/// A gate lives only while someone holds or waits for it.
pub struct InFlight<K>
where
    K: Eq + Hash + Clone,
{
    gates: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> InFlight<K>
where
    K: Eq + Hash + Clone,
{
    /// No gates held.
    pub fn new() -> Self {
        Self {
            gates: Arc::new(DashMap::new()),
        }
    }

    /// Wait until no other caller holds the gate for `key`, then hold it.
    pub async fn acquire(&self, key: K) -> FlightGuard<K> {
        let gate = Arc::clone(self.gates.entry(key.clone()).or_default().value());
        let permit = gate.lock_owned().await;

        FlightGuard {
            key,
            gates: Arc::clone(&self.gates),
            permit: Some(permit),
        }
    }

    /// Keys with a holder or waiters.
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

impl<K> Default for InFlight<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Held gate for one key; dropping it wakes the next waiter and removes
/// the gate once nobody else wants it.
pub struct FlightGuard<K>
where
    K: Eq + Hash + Clone,
{
    key: K,
    gates: Arc<DashMap<K, Arc<Mutex<()>>>>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for FlightGuard<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.permit.take();
        // Only the map still references the gate once nobody waits on it.
        self.gates
            .remove_if(&self.key, |_, gate| Arc::strong_count(gate) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn gate_is_removed_after_last_holder() {
        let flights = InFlight::new();
        {
            let _guard = flights.acquire("k").await;
            assert_eq!(flights.len(), 1);
        }
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn holders_of_the_same_key_are_serialized() {
        let flights = Arc::new(InFlight::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = flights.acquire(7u32).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task should finish");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let flights = InFlight::new();
        let _a = flights.acquire(1u8).await;
        let _b = flights.acquire(2u8).await;
        assert_eq!(flights.len(), 2);
    }
}
