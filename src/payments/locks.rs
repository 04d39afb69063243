use crate::payments::types::OrderId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-order advisory locks shared by every writer of gateway state.
///
/// Holders must reload the order after acquiring; a snapshot taken before the
/// lock may already be stale. The lock is not re-entrant.
#[derive(Default)]
pub struct OrderLocks {
    inner: Mutex<HashMap<OrderId, Arc<AsyncMutex<()>>>>,
}

/// Held for one read-modify-write of an order. Dropping it releases the lock.
pub struct OrderLockGuard<'a> {
    locks: &'a OrderLocks,
    order_id: OrderId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, order_id: OrderId) -> OrderLockGuard<'_> {
        let lock = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(order_id)
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        OrderLockGuard {
            locks: self,
            order_id,
            guard: Some(guard),
        }
    }

    /// Number of orders with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, order_id: OrderId) {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&order_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&order_id);
        }
    }
}

impl Drop for OrderLockGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.release(self.order_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entries_are_dropped_after_release() {
        let locks = OrderLocks::new();
        {
            let _first = locks.lock(1).await;
            let _second = locks.lock(2).await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_order_is_serialised() {
        let locks = Arc::new(OrderLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(7).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
