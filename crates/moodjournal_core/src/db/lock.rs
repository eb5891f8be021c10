//! Process-wide FIFO admission queue for store opens.
//!
//! # Responsibility
//! - Hand out one ticket per store open, in construction order.
//! - Admit a ticket only once every earlier ticket has settled.
//!
//! # Invariants
//! - A ticket leaves the queue when it is dropped, whether its open
//!   succeeded, failed or was abandoned.
//! - The queue is shared by cloning the same `OpenLock`; it serializes all
//!   opens regardless of store name.

use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Shared queue that serializes schema-upgrading opens.
///
/// Create one per process (or per test) and pass clones to every store.
#[derive(Clone, Default)]
pub struct OpenLock {
    inner: Arc<LockInner>,
}

#[derive(Default)]
struct LockInner {
    queue: Mutex<TicketQueue>,
    settled: Notify,
}

#[derive(Default)]
struct TicketQueue {
    next_id: u64,
    waiting: VecDeque<u64>,
}

impl OpenLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a ticket to the back of the queue.
    pub fn enqueue(&self) -> OpenTicket {
        let mut queue = self.inner.lock_queue();
        let id = queue.next_id;
        queue.next_id += 1;
        queue.waiting.push_back(id);
        debug!(
            "event=open_lock module=db status=enqueued ticket={} queued={}",
            id,
            queue.waiting.len()
        );
        OpenTicket {
            lock: Arc::clone(&self.inner),
            id,
        }
    }

    /// Number of tickets that have not settled yet.
    pub fn pending(&self) -> usize {
        self.inner.lock_queue().waiting.len()
    }
}

impl LockInner {
    fn lock_queue(&self) -> MutexGuard<'_, TicketQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_front(&self, id: u64) -> bool {
        self.lock_queue().waiting.front() == Some(&id)
    }
}

/// Place in the open queue; settles when dropped.
pub struct OpenTicket {
    lock: Arc<LockInner>,
    id: u64,
}

impl OpenTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits until every earlier ticket has settled.
    pub async fn admitted(&self) {
        loop {
            let notified = self.lock.settled.notified();
            tokio::pin!(notified);
            // Register before checking so a settle between the check and the
            // await is not missed.
            notified.as_mut().enable();
            if self.lock.is_front(self.id) {
                debug!("event=open_lock module=db status=admitted ticket={}", self.id);
                return;
            }
            notified.await;
        }
    }
}

impl Drop for OpenTicket {
    fn drop(&mut self) {
        {
            let mut queue = self.lock.lock_queue();
            queue.waiting.retain(|id| *id != self.id);
        }
        debug!("event=open_lock module=db status=settled ticket={}", self.id);
        self.lock.settled.notify_waiters();
    }
}
