//! L2: bounded pool of reusable read buffers.
//!
//! Grounded in `BufferPool.h`'s refcount + condition-variable design,
//! expressed with `tokio::sync::Mutex`/`Notify` instead of a C++ mutex +
//! `std::condition_variable`.

use crate::error::{AtomError, AtomResult};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Duration};

struct Slot {
    data: Vec<u8>,
    refcount: usize,
}

struct Inner {
    slots: Vec<Slot>,
    cap: usize,
}

/// A fixed-ceiling pool of read buffers, growing lazily up to `cap`.
pub struct BufferPool {
    inner: Mutex<Inner>,
    notify: Notify,
}

/// A strong reference to one pooled buffer, checked out by `acquire`.
/// Dropping it without calling `release` leaves the slot's refcount at 1
/// forever — release is a manual contract, not RAII, so callers must
/// call `release`.
pub struct PooledBuffer {
    index: usize,
}

impl PooledBuffer {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl BufferPool {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                cap,
            }),
            notify: Notify::new(),
        }
    }

    /// Blocks until a buffer with refcount 0 is available, growing the pool
    /// lazily while `current < cap`, or until `wait_timeout_ms` elapses.
    pub async fn acquire(&self, wait_timeout_ms: u64) -> AtomResult<PooledBuffer> {
        let deadline = Duration::from_millis(wait_timeout_ms);
        match timeout(deadline, self.acquire_inner()).await {
            Ok(buf) => Ok(buf),
            Err(_) => Err(AtomError::Timeout {
                resource: "buffer pool",
            }),
        }
    }

    async fn acquire_inner(&self) -> PooledBuffer {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some((idx, slot)) = inner
                    .slots
                    .iter_mut()
                    .enumerate()
                    .find(|(_, s)| s.refcount == 0)
                {
                    slot.refcount = 1;
                    slot.data.clear();
                    return PooledBuffer { index: idx };
                }
                if inner.slots.len() < inner.cap {
                    inner.slots.push(Slot {
                        data: Vec::new(),
                        refcount: 1,
                    });
                    let idx = inner.slots.len() - 1;
                    return PooledBuffer { index: idx };
                }
            }
            self.notify.notified().await;
        }
    }

    /// Writes `bytes` into the checked-out buffer, replacing its contents.
    pub async fn fill(&self, buf: &PooledBuffer, bytes: &[u8]) {
        let mut inner = self.inner.lock().await;
        inner.slots[buf.index].data = bytes.to_vec();
    }

    /// Reads the checked-out buffer's current contents.
    pub async fn read(&self, buf: &PooledBuffer) -> Vec<u8> {
        let inner = self.inner.lock().await;
        inner.slots[buf.index].data.clone()
    }

    /// Advances the buffer's read cursor by `bytes_to_consume` (dropping
    /// that many leading bytes) and decrements its refcount, signalling one
    /// waiter.
    pub async fn release(&self, buf: PooledBuffer, bytes_to_consume: usize) {
        let mut inner = self.inner.lock().await;
        let slot = &mut inner.slots[buf.index];
        let drain = bytes_to_consume.min(slot.data.len());
        slot.data.drain(0..drain);
        slot.refcount = 0;
        drop(inner);
        self.notify.notify_one();
    }

    pub async fn live_count(&self) -> usize {
        self.inner.lock().await.slots.len()
    }
}

pub fn new_shared(cap: usize) -> Arc<BufferPool> {
    Arc::new(BufferPool::new(cap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn acquire_grows_lazily_up_to_cap() {
        let pool = BufferPool::new(2);
        let a = pool.acquire(50).await.unwrap();
        let b = pool.acquire(50).await.unwrap();
        assert_eq!(pool.live_count().await, 2);
        pool.release(a, 0).await;
        pool.release(b, 0).await;
    }

    #[tokio::test]
    async fn acquire_times_out_at_cap() {
        let pool = BufferPool::new(1);
        let _a = pool.acquire(50).await.unwrap();
        let result = pool.acquire(20).await;
        assert!(matches!(result, Err(AtomError::Timeout { .. })));
    }

    #[tokio::test]
    async fn release_wakes_a_waiter() {
        let pool = Arc::new(BufferPool::new(1));
        let a = pool.acquire(50).await.unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.acquire(500).await });

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        pool.release(a, 0).await;

        let b = waiter.await.unwrap().unwrap();
        pool.release(b, 0).await;
    }

    #[tokio::test]
    async fn fill_and_read_round_trip() {
        let pool = BufferPool::new(1);
        let buf = pool.acquire(50).await.unwrap();
        pool.fill(&buf, b"hello").await;
        assert_eq!(pool.read(&buf).await, b"hello".to_vec());
        pool.release(buf, 5).await;
    }
}
