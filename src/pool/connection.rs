//! L2: bounded pool of Redis connections, split into `unix` and `tcp`
//! sub-queues with a combined cap, growing lazily ("doubling") as each
//! sub-queue is exhausted.
//!
//! Grounded in `ConnectionPool.h`: two typed sub-queues, a combined size
//! ceiling, and virtual connection-construction hooks for mockability —
//! here expressed as a pair of `redis::Client`s rather than virtual
//! `make_unix`/`make_tcp` methods.

use crate::config::Transport;
use crate::error::{AtomError, AtomResult};
use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout, Duration};

pub type RedisConnection = redis::aio::MultiplexedConnection;

struct Queue {
    idle: Vec<RedisConnection>,
    created: usize,
}

impl Queue {
    fn new() -> Self {
        Self {
            idle: Vec::new(),
            created: 0,
        }
    }
}

struct Inner {
    unix: Queue,
    tcp: Queue,
}

pub struct ConnectionPool {
    unix_client: Option<redis::Client>,
    tcp_client: Option<redis::Client>,
    cap: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

/// A connection checked out from the pool. Must be returned via
/// `ConnectionPool::release`; dropping it without releasing leaks the slot
/// (it is simply never given back to the idle queue).
pub struct PooledConnection {
    transport: Transport,
    conn: RedisConnection,
}

impl PooledConnection {
    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn as_mut(&mut self) -> &mut RedisConnection {
        &mut self.conn
    }
}

impl ConnectionPool {
    /// `unix_endpoint`/`tcp_endpoint` are Redis connection URLs
    /// (`redis+unix:///path` or `redis://host:port`); either may be absent
    /// if the element only ever uses the other transport.
    pub fn new(
        unix_client: Option<redis::Client>,
        tcp_client: Option<redis::Client>,
        cap: usize,
    ) -> Self {
        Self {
            unix_client,
            tcp_client,
            cap,
            inner: Mutex::new(Inner {
                unix: Queue::new(),
                tcp: Queue::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Pops a connection from `transport`'s sub-queue; creates new
    /// connections (doubling the sub-queue's created count, at least one) if
    /// the combined pool is still under `cap`; otherwise waits up to
    /// `wait_timeout_ms` for a `release`.
    pub async fn get(&self, transport: Transport, wait_timeout_ms: u64) -> AtomResult<PooledConnection> {
        let deadline = Duration::from_millis(wait_timeout_ms);
        match timeout(deadline, self.get_inner(transport)).await {
            Ok(inner) => inner,
            Err(_) => Err(AtomError::Timeout {
                resource: "connection pool",
            }),
        }
    }

    async fn get_inner(&self, transport: Transport) -> AtomResult<PooledConnection> {
        loop {
            let to_create: usize;
            {
                let mut inner = self.inner.lock().await;
                let queue = match transport {
                    Transport::Unix => &mut inner.unix,
                    Transport::Tcp => &mut inner.tcp,
                };
                if let Some(conn) = queue.idle.pop() {
                    return Ok(PooledConnection { transport, conn });
                }
                let combined = inner.unix.created + inner.tcp.created;
                if combined >= self.cap {
                    to_create = 0;
                } else {
                    let current = queue.created;
                    to_create = current.max(1).min(self.cap - combined);
                }
            }

            if to_create == 0 {
                self.notify.notified().await;
                continue;
            }

            let client = match transport {
                Transport::Unix => self.unix_client.as_ref(),
                Transport::Tcp => self.tcp_client.as_ref(),
            }
            .ok_or_else(|| {
                AtomError::InternalError(format!("no client configured for transport {transport:?}"))
            })?;

            let mut fresh = Vec::with_capacity(to_create);
            for _ in 0..to_create {
                let conn = client.get_multiplexed_async_connection().await?;
                fresh.push(conn);
            }

            let mut inner = self.inner.lock().await;
            let queue = match transport {
                Transport::Unix => &mut inner.unix,
                Transport::Tcp => &mut inner.tcp,
            };
            queue.created += fresh.len();
            queue.idle.extend(fresh);
        }
    }

    /// Returns a connection to its sub-queue, unvalidated: a broken
    /// connection surfaces as `RedisError` on its next use and the caller
    /// must discard it rather than rely on the pool to reap it.
    pub async fn release(&self, pooled: PooledConnection) {
        let mut inner = self.inner.lock().await;
        let queue = match pooled.transport {
            Transport::Unix => &mut inner.unix,
            Transport::Tcp => &mut inner.tcp,
        };
        queue.idle.push(pooled.conn);
        drop(inner);
        self.notify.notify_one();
    }

    /// Discards a connection instead of returning it to the pool — for the
    /// case where the caller observed a `RedisError` and knows the
    /// connection is broken. Frees a slot so a future `get` can create a
    /// fresh one.
    pub async fn discard(&self, pooled: PooledConnection) {
        let mut inner = self.inner.lock().await;
        let queue = match pooled.transport {
            Transport::Unix => &mut inner.unix,
            Transport::Tcp => &mut inner.tcp,
        };
        queue.created = queue.created.saturating_sub(1);
        drop(inner);
        drop(pooled);
        self.notify.notify_one();
    }

    /// Pre-creates up to `num_unix`/`num_tcp` connections of each transport
    /// so callers configuring a known working set don't pay per-connection
    /// setup latency on the first `get`s, matching `num_unix`/`num_tcp` in
    /// the §6 configuration surface.
    pub async fn seed(&self, num_unix: usize, num_tcp: usize) -> AtomResult<()> {
        self.seed_transport(Transport::Unix, num_unix).await?;
        self.seed_transport(Transport::Tcp, num_tcp).await?;
        Ok(())
    }

    /// Pre-creates up to `count` connections for `transport`, capped by the
    /// combined `cap` like ordinary lazy growth. A transport with no
    /// configured client is skipped rather than treated as an error — an
    /// element that only ever uses one transport still passes `0` for the
    /// other's count.
    async fn seed_transport(&self, transport: Transport, count: usize) -> AtomResult<()> {
        if count == 0 {
            return Ok(());
        }
        let client = match transport {
            Transport::Unix => self.unix_client.as_ref(),
            Transport::Tcp => self.tcp_client.as_ref(),
        };
        let Some(client) = client else {
            return Ok(());
        };

        let to_create = {
            let inner = self.inner.lock().await;
            let combined = inner.unix.created + inner.tcp.created;
            count.min(self.cap.saturating_sub(combined))
        };
        if to_create == 0 {
            return Ok(());
        }

        let mut fresh = Vec::with_capacity(to_create);
        for _ in 0..to_create {
            fresh.push(client.get_multiplexed_async_connection().await?);
        }

        let mut inner = self.inner.lock().await;
        let queue = match transport {
            Transport::Unix => &mut inner.unix,
            Transport::Tcp => &mut inner.tcp,
        };
        queue.created += fresh.len();
        queue.idle.extend(fresh);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_only_pool(cap: usize) -> ConnectionPool {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        ConnectionPool::new(None, Some(client), cap)
    }

    #[tokio::test]
    async fn get_without_a_live_redis_times_out_rather_than_hangs() {
        // No Redis is actually running on 127.0.0.1:1, so connection
        // construction itself fails fast; this exercises the pool's error
        // plumbing rather than its growth/timeout logic.
        let pool = tcp_only_pool(2);
        let result = pool.get(Transport::Tcp, 200).await;
        assert!(result.is_err());
    }

    #[test]
    fn unconfigured_transport_is_an_internal_error_not_a_panic() {
        // Constructed here purely to document the invariant: requesting the
        // unix sub-queue with no unix client configured must not panic.
        let _pool = ConnectionPool::new(None, None, 1);
    }

    #[tokio::test]
    async fn seed_is_a_no_op_for_an_unconfigured_transport() {
        let pool = tcp_only_pool(2);
        let result = pool.seed(3, 0).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn seed_surfaces_a_connection_error_for_a_configured_transport() {
        let pool = tcp_only_pool(2);
        let result = pool.seed(0, 1).await;
        assert!(result.is_err());
    }
}
