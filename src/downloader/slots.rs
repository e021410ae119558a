//! Worker slot pool
//!
//! The pool is the only global admission control for extraction work. It is
//! a fixed-capacity semaphore; tokio's semaphore hands out permits in the
//! order waiters arrived, which gives FIFO admission. A [`WorkerSlot`] returns
//! its permit when dropped.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-capacity pool of worker slots
#[derive(Debug, Clone)]
pub struct WorkerSlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerSlotPool {
    /// Create a pool with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Total slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    /// Whether every slot is taken (a new job would have to wait)
    pub fn is_saturated(&self) -> bool {
        self.available() == 0
    }

    /// Wait for a free slot, in arrival order
    ///
    /// # Errors
    /// Only fails if the pool was closed.
    pub async fn acquire(&self) -> Result<WorkerSlot, SlotError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SlotError::Closed)?;
        crate::metrics::record_slots_in_use(self.in_use());
        Ok(WorkerSlot {
            permit: Some(permit),
            pool: self.clone(),
        })
    }

    /// Take a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<WorkerSlot> {
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        Some(WorkerSlot {
            permit: Some(permit),
            pool: self.clone(),
        })
    }

    /// Stop handing out slots; pending and future `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// A held worker slot; released on drop
#[derive(Debug)]
pub struct WorkerSlot {
    permit: Option<OwnedSemaphorePermit>,
    pool: WorkerSlotPool,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        drop(self.permit.take());
        crate::metrics::record_slots_in_use(self.pool.in_use());
    }
}

/// Worker slot errors
#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    /// Pool closed during shutdown
    #[error("worker slot pool is closed")]
    Closed,
}
