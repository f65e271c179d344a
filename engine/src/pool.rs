//! Connection pool keyed by session and data source.
//!
//! Each (session, data source) pair owns at most one connection. A
//! [`Lease`] hands that connection out exclusively; releasing the lease
//! (explicitly or on drop) returns it to the pool without disposing it.
//! Connections are disposed by [`ConnectionPool::evict_expired`],
//! [`ConnectionPool::close_all`], or when a disconnected one is replaced on
//! acquire; their dispose listeners run afterwards.
//!
//! Time is passed in explicitly so expiry is deterministic under test.

use crate::{connection::ConnectionRef, error::Result, Error};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Callback run when a pooled connection is disposed.
pub type DisposeListener = Box<dyn FnOnce(&PoolKey) + Send + Sync>;

/// Identifies a pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub session: String,
    pub data_source: String,
}

impl PoolKey {
    pub fn new(session: impl Into<String>, data_source: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            data_source: data_source.into(),
        }
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session, self.data_source)
    }
}

struct PoolEntry {
    connection: ConnectionRef,
    /// Set while a lease is outstanding
    lease_id: Option<Uuid>,
    expires_at: DateTime<Utc>,
    listeners: Vec<DisposeListener>,
}

impl PoolEntry {
    fn dispose(self, key: &PoolKey) {
        self.connection.dispose();
        for listener in self.listeners {
            listener(key);
        }
    }
}

/// Thread-safe pool of connections, shared via `Arc`.
pub struct ConnectionPool {
    entries: DashMap<PoolKey, PoolEntry>,
    lease_lifetime: chrono::Duration,
}

impl ConnectionPool {
    /// Create a pool whose connections live for `lease_lifetime` after
    /// they were opened.
    pub fn new(lease_lifetime: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            lease_lifetime: chrono::Duration::from_std(lease_lifetime)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Create a pool wrapped in Arc for sharing.
    pub fn new_shared(lease_lifetime: Duration) -> Arc<Self> {
        Arc::new(Self::new(lease_lifetime))
    }

    /// Lease the connection for `(session, data_source)`.
    ///
    /// A live, unleased connection is reused. A missing or disconnected one
    /// is replaced by calling `connect`, which runs without any pool lock
    /// held. Fails if the connection is already leased.
    pub fn acquire<F>(
        self: &Arc<Self>,
        session: &str,
        data_source: &str,
        now: DateTime<Utc>,
        connect: F,
    ) -> Result<Lease>
    where
        F: FnOnce() -> Result<ConnectionRef>,
    {
        let key = PoolKey::new(session, data_source);
        let lease_id = Uuid::new_v4();

        // A stale entry is reserved under the lease id while reconnecting.
        let reused = match self.entries.get_mut(&key) {
            Some(mut entry) => {
                if entry.lease_id.is_some() {
                    return Err(Error::Pool(format!("connection {} is already leased", key)));
                }
                entry.lease_id = Some(lease_id);
                entry
                    .connection
                    .is_connected()
                    .then(|| Arc::clone(&entry.connection))
            }
            None => None,
        };

        let connection = match reused {
            Some(connection) => connection,
            None => self.open(&key, lease_id, now, connect)?,
        };

        tracing::debug!(key = %key, lease_id = %lease_id, "Leased connection");
        Ok(Lease {
            pool: Arc::clone(self),
            key,
            lease_id,
            connection,
            released: AtomicBool::new(false),
        })
    }

    /// Connect and store the result under `lease_id`, replacing a stale
    /// connection reserved for it.
    fn open<F>(
        &self,
        key: &PoolKey,
        lease_id: Uuid,
        now: DateTime<Utc>,
        connect: F,
    ) -> Result<ConnectionRef>
    where
        F: FnOnce() -> Result<ConnectionRef>,
    {
        let connection = match connect() {
            Ok(connection) if connection.is_connected() => connection,
            Ok(_) => {
                self.return_lease(key, lease_id);
                return Err(Error::Pool(format!("connection {} could not be opened", key)));
            }
            Err(e) => {
                self.return_lease(key, lease_id);
                return Err(e);
            }
        };

        let stale = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.lease_id != Some(lease_id) {
                    drop(occupied);
                    connection.dispose();
                    return Err(Error::Pool(format!(
                        "connection {} changed while connecting",
                        key
                    )));
                }
                let old = std::mem::replace(&mut entry.connection, Arc::clone(&connection));
                entry.expires_at = self.expiry(now);
                Some(PoolEntry {
                    connection: old,
                    lease_id: None,
                    expires_at: now,
                    listeners: std::mem::take(&mut entry.listeners),
                })
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PoolEntry {
                    connection: Arc::clone(&connection),
                    lease_id: Some(lease_id),
                    expires_at: self.expiry(now),
                    listeners: Vec::new(),
                });
                None
            }
        };

        match stale {
            Some(old) => {
                tracing::info!(key = %key, "Replaced disconnected pooled connection");
                old.dispose(key);
            }
            None => tracing::info!(key = %key, "Opened pooled connection"),
        }
        Ok(connection)
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.lease_lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Dispose every unleased connection whose lifetime has elapsed.
    ///
    /// Returns the number of connections disposed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<PoolKey> = self
            .entries
            .iter()
            .filter(|e| e.lease_id.is_none() && e.expires_at <= now)
            .map(|e| e.key().clone())
            .collect();

        let mut evicted = 0;
        for key in expired {
            // Re-checked under the shard lock; a lease may have started since.
            if let Some((key, entry)) = self
                .entries
                .remove_if(&key, |_, e| e.lease_id.is_none() && e.expires_at <= now)
            {
                entry.dispose(&key);
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!(evicted, remaining = self.entries.len(), "Evicted expired connections");
        }
        evicted
    }

    /// Dispose every connection, leased or not.
    pub fn close_all(&self) {
        let keys: Vec<PoolKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((key, entry)) = self.entries.remove(&key) {
                entry.dispose(&key);
            }
        }
        tracing::info!("Closed all pooled connections");
    }

    /// Number of pooled connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the connection for `key` is currently leased.
    pub fn is_leased(&self, key: &PoolKey) -> bool {
        self.entries
            .get(key)
            .map(|e| e.lease_id.is_some())
            .unwrap_or(false)
    }

    fn return_lease(&self, key: &PoolKey, lease_id: Uuid) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.lease_id == Some(lease_id) {
                entry.lease_id = None;
                tracing::debug!(key = %key, lease_id = %lease_id, "Returned connection");
            }
        }
    }

    fn add_listener(&self, key: &PoolKey, lease_id: Uuid, listener: DisposeListener) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.lease_id == Some(lease_id) => {
                entry.listeners.push(listener);
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("entries", &self.entries.len())
            .field("lease_lifetime", &self.lease_lifetime)
            .finish()
    }
}

/// Exclusive use of a pooled connection.
pub struct Lease {
    pool: Arc<ConnectionPool>,
    key: PoolKey,
    lease_id: Uuid,
    connection: ConnectionRef,
    released: AtomicBool,
}

impl Lease {
    pub fn connection(&self) -> &ConnectionRef {
        &self.connection
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn id(&self) -> Uuid {
        self.lease_id
    }

    /// Run `listener` when the pool disposes this connection.
    ///
    /// Fails once the lease has been released.
    pub fn on_disposed<F>(&self, listener: F) -> Result<()>
    where
        F: FnOnce(&PoolKey) + Send + Sync + 'static,
    {
        if self.is_released() || !self.pool.add_listener(&self.key, self.lease_id, Box::new(listener))
        {
            return Err(Error::Pool(format!("lease on {} is no longer held", self.key)));
        }
        Ok(())
    }

    /// Return the connection to the pool. Releasing twice is a no-op and
    /// never disposes the connection.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pool.return_lease(&self.key, self.lease_id);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("key", &self.key)
            .field("lease_id", &self.lease_id)
            .field("released", &self.is_released())
            .finish()
    }
}
