//! Thread-keyed connection management.
//!
//! # Responsibility
//! - Hand out one logical connection per calling thread, created through the
//!   configured factory.
//! - Prune tracked connections whose session no longer answers.
//!
//! # Invariants
//! - At most one live connection per thread key at any time.
//! - Connections are never shared across thread keys.
//! - No pooling beyond the 1:1 key association.

use super::{ConnectionFactory, DbError};
use log::debug;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Shared handle to one physical session. The inner mutex serializes use of
/// the session by its owning thread and liveness probes.
pub type SharedConnection = Arc<Mutex<Connection>>;

pub struct ConnectionManager {
    factory: ConnectionFactory,
    busy_timeout: Duration,
    conns: Mutex<HashMap<ThreadId, SharedConnection>>,
}

impl ConnectionManager {
    pub fn new(factory: ConnectionFactory, busy_timeout: Duration) -> Self {
        Self {
            factory,
            busy_timeout,
            conns: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the calling thread's connection, creating one when the thread
    /// has none or its previous session stopped answering. Dead sessions of
    /// other threads are pruned on the same pass.
    pub fn acquire(&self) -> Result<SharedConnection, DbError> {
        let key = thread::current().id();
        let mut map = self
            .conns
            .lock()
            .map_err(|_| DbError::Poisoned("connection registry"))?;

        if let Some(handle) = map.get(&key) {
            if is_live(handle) {
                return Ok(Arc::clone(handle));
            }
        }

        let before = map.len();
        map.retain(|_, handle| is_live(handle));
        if map.len() < before {
            debug!(
                "event=conn_prune module=db status=ok removed={}",
                before - map.len()
            );
        }

        let conn = (self.factory)().map_err(DbError::Sqlite)?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(DbError::Sqlite)?;
        let handle = Arc::new(Mutex::new(conn));
        map.insert(key, Arc::clone(&handle));
        debug!("event=conn_open module=db status=ok key={key:?}");
        Ok(handle)
    }

    /// Drops the calling thread's tracked connection so the next `acquire`
    /// obtains a fresh session. Other threads' connections are untouched.
    pub fn release(&self) -> Result<(), DbError> {
        let key = thread::current().id();
        let mut map = self
            .conns
            .lock()
            .map_err(|_| DbError::Poisoned("connection registry"))?;
        if map.remove(&key).is_some() {
            debug!("event=conn_release module=db status=ok key={key:?}");
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.conns.lock().map(|m| m.len()).unwrap_or(0)
    }
}

fn is_live(handle: &SharedConnection) -> bool {
    match handle.lock() {
        Ok(conn) => conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok(),
        Err(_) => false,
    }
}
