//! Process-wide map of live call sessions.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};

use super::CallSession;

/// Errors returned by [`SessionRegistry`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("call {0} already has a live session")]
    Conflict(String),

    #[error("no session for call {0}")]
    NotFound(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry of active calls keyed by call id.
///
/// Backed by a sharded map, so insert, lookup and delete of different calls
/// never contend on a single lock.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<CallSession>>,
    queue_capacity: usize,
}

impl SessionRegistry {
    /// Create an empty registry. New sessions get an audio queue of
    /// `queue_capacity` chunks.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            queue_capacity,
        }
    }

    /// Create a session in the `INITIATED` state.
    pub fn create(
        &self,
        call_id: &str,
        caller: Option<String>,
    ) -> RegistryResult<Arc<CallSession>> {
        match self.sessions.entry(call_id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::Conflict(call_id.to_string())),
            Entry::Vacant(slot) => {
                let session = Arc::new(CallSession::new(call_id, caller, self.queue_capacity));
                slot.insert(session.clone());
                debug!(call_id, "session created");
                Ok(session)
            }
        }
    }

    pub fn get(&self, call_id: &str) -> RegistryResult<Arc<CallSession>> {
        self.sessions
            .get(call_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(call_id.to_string()))
    }

    /// Remove a session and mark it `CLOSED`. Removing an absent call is a no-op.
    pub fn remove(&self, call_id: &str) -> Option<Arc<CallSession>> {
        let (_, session) = self.sessions.remove(call_id)?;
        session.mark_closed();
        debug!(call_id, "session removed");
        Some(session)
    }

    /// Drop sessions that stayed `INITIATED` for longer than `max_age`.
    ///
    /// Returns the number of evicted sessions.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|call_id, session| {
            let stale = session.close_if_initiated(max_age);
            if stale {
                evicted += 1;
                debug!(call_id = %call_id, "evicting session that never started streaming");
            }
            !stale
        });
        evicted
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Periodically evict sessions whose media socket never opened.
///
/// Runs until the process exits. A zero TTL disables the task.
pub async fn start_reaper_task(registry: Arc<SessionRegistry>, ttl: Duration) {
    if ttl.is_zero() {
        tracing::warn!("session reaper disabled (ttl=0)");
        return;
    }

    // Check every ttl/2, capped at a minute, but at least once a second
    let interval_seconds = (ttl.as_secs() / 2).clamp(1, 60);
    let interval = Duration::from_secs(interval_seconds);

    info!(
        ttl_seconds = ttl.as_secs(),
        interval_seconds, "starting session reaper"
    );

    loop {
        sleep(interval).await;

        let evicted = registry.evict_stale(ttl);
        if evicted > 0 {
            info!(count = evicted, "evicted sessions stuck in INITIATED");
        }
    }
}
