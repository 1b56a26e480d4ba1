//! Session finalization.
//!
//! Runs once per call after end-of-input: joins the upstream client, hands a
//! non-empty transcript to the summarization collaborator and removes the
//! session from the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::collaborators::SummaryDispatcher;
use crate::core::session::{CallSession, SessionRegistry, Turn};

/// Extra time given to the upstream join on top of its own drain timeout.
const UPSTREAM_JOIN_GRACE: Duration = Duration::from_secs(2);

/// Drains, summarizes and removes finished calls.
#[derive(Clone)]
pub struct SessionFinalizer {
    registry: Arc<SessionRegistry>,
    summarizer: Arc<dyn SummaryDispatcher>,
    join_timeout: Duration,
}

impl SessionFinalizer {
    pub fn new(
        registry: Arc<SessionRegistry>,
        summarizer: Arc<dyn SummaryDispatcher>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            summarizer,
            join_timeout: drain_timeout + UPSTREAM_JOIN_GRACE,
        }
    }

    /// Finalize `session`, returning the transcript that was collected.
    ///
    /// The summary request is awaited before the session is removed, so this
    /// can take up to the collaborator timeout on top of the upstream join.
    /// The session is removed from the registry whatever happens along the way.
    pub async fn finalize(
        &self,
        session: &Arc<CallSession>,
        mut upstream: JoinHandle<Vec<Turn>>,
    ) -> Vec<Turn> {
        let call_id = session.call_id();

        // Both are no-ops when the bridge already did them
        session.finish_input();
        session.begin_draining();

        let log = match tokio::time::timeout(self.join_timeout, &mut upstream).await {
            Ok(Ok(log)) => log,
            Ok(Err(e)) => {
                warn!(call_id, error = %e, "Upstream task failed");
                session.conversation_log()
            }
            Err(_) => {
                warn!(
                    call_id,
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "Upstream task did not finish in time, aborting"
                );
                upstream.abort();
                session.conversation_log()
            }
        };

        if log.is_empty() {
            info!(call_id, "Empty conversation log, skipping summary");
        } else {
            debug!(call_id, turns = log.len(), "Dispatching conversation log for summary");
            if let Err(e) = self.summarizer.dispatch(call_id, &log).await {
                warn!(call_id, error = %e, "Failed to dispatch conversation log for summary");
            }
        }

        self.registry.remove(call_id);
        info!(call_id, turns = log.len(), "Call finalized");
        log
    }
}
