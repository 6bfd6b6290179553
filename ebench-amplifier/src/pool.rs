//! Fixed-size connection pool.
//!
//! Slots are gated by a FIFO semaphore, so every waiter is served once a
//! slot is released. The idle set is only touched while holding a permit.
//! Closing the pool cancels its token, which fails every pending and
//! future `acquire()` with [`PoolError::Closed`].

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::Connector;
use crate::error::PoolError;

pub struct ConnectionPool<C> {
    size: usize,
    slots: Arc<Semaphore>,
    idle: Mutex<VecDeque<C>>,
    closed: CancellationToken,
    checked_out: AtomicUsize,
    max_checked_out: AtomicUsize,
}

impl<C: Send + 'static> ConnectionPool<C> {
    /// Open `size` connections up front. Any failure is fatal.
    pub async fn connect<K>(
        connector: &K,
        size: usize,
        closed: CancellationToken,
    ) -> Result<Arc<Self>, PoolError>
    where
        K: Connector<Connection = C>,
    {
        let mut connections = Vec::with_capacity(size);
        for index in 0..size {
            connections.push(connector.connect(index).await?);
        }
        info!(size, "Connection pool ready");
        Ok(Self::from_connections(connections, closed))
    }

    /// Wrap already opened connections
    pub fn from_connections(connections: Vec<C>, closed: CancellationToken) -> Arc<Self> {
        let size = connections.len();
        Arc::new(Self {
            size,
            slots: Arc::new(Semaphore::new(size)),
            idle: Mutex::new(connections.into()),
            closed,
            checked_out: AtomicUsize::new(0),
            max_checked_out: AtomicUsize::new(0),
        })
    }

    /// Check out a connection, waiting until one is free or the pool closes
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection<C>, PoolError> {
        if self.closed.is_cancelled() {
            return Err(PoolError::Closed);
        }

        let permit = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(PoolError::Closed),
            permit = Arc::clone(&self.slots).acquire_owned() => {
                permit.map_err(|_| PoolError::Closed)?
            }
        };

        let connection = self.idle.lock().pop_front().ok_or(PoolError::Closed)?;
        let now = self.checked_out.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_checked_out.fetch_max(now, Ordering::AcqRel);

        Ok(PooledConnection {
            connection: Some(connection),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Return a connection to the free set
    pub fn release(slot: PooledConnection<C>) {
        drop(slot);
    }

    /// Drain and invalidate every slot
    pub fn close(&self) {
        if self.closed.is_cancelled() && self.slots.is_closed() {
            return;
        }
        self.closed.cancel();
        self.slots.close();
        let drained = {
            let mut idle = self.idle.lock();
            let n = idle.len();
            idle.clear();
            n
        };
        debug!(drained, "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::Acquire)
    }

    /// Highest number of simultaneously checked out connections
    pub fn max_checked_out(&self) -> usize {
        self.max_checked_out.load(Ordering::Acquire)
    }

    fn give_back(&self, connection: C) {
        self.checked_out.fetch_sub(1, Ordering::AcqRel);
        if !self.is_closed() {
            self.idle.lock().push_back(connection);
        }
    }
}

/// A checked out connection; returns itself to the pool on drop
pub struct PooledConnection<C: Send + 'static> {
    connection: Option<C>,
    pool: Arc<ConnectionPool<C>>,
    // Released after the connection is back in the idle set.
    _permit: OwnedSemaphorePermit,
}

impl<C: Send + 'static> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `drop` takes the connection out.
        match &self.connection {
            Some(c) => c,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Send + 'static> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        match &mut self.connection {
            Some(c) => c,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Send + 'static> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.give_back(connection);
        }
    }
}
