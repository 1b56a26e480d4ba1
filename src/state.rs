use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::collaborators::{CollaboratorError, HttpSummaryClient, SummaryDispatcher};
use crate::core::finalizer::SessionFinalizer;
use crate::core::realtime::{OpenAIRealtimeConnector, RealtimeConnector, RealtimeError};
use crate::core::session::SessionRegistry;
use crate::core::upstream::UpstreamClient;

/// Errors raised while assembling the application state
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("realtime backend: {0}")]
    Realtime(#[from] RealtimeError),
    #[error("summary collaborator: {0}")]
    Collaborator(#[from] CollaboratorError),
}

/// Shared state handed to every handler
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: Arc<SessionRegistry>,
    pub upstream: UpstreamClient,
    pub finalizer: SessionFinalizer,
}

impl AppState {
    /// Build the production state: OpenAI realtime backend plus the HTTP
    /// summarization collaborator.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let connector = Arc::new(OpenAIRealtimeConnector::new(config.realtime.clone())?);
        let summarizer = Arc::new(HttpSummaryClient::new(
            config.summary_service_url.clone(),
            config.collaborator_timeout(),
        )?);

        Ok(Self::with_components(config, connector, summarizer))
    }

    /// Build state around caller-supplied backend and summarizer.
    pub fn with_components(
        config: ServerConfig,
        connector: Arc<dyn RealtimeConnector>,
        summarizer: Arc<dyn SummaryDispatcher>,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionRegistry::new(config.audio_queue_capacity));
        let upstream = UpstreamClient::new(connector, config.drain_timeout());
        let finalizer = SessionFinalizer::new(sessions.clone(), summarizer, config.drain_timeout());

        Arc::new(Self {
            config,
            sessions,
            upstream,
            finalizer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_api_key() {
        let config = ServerConfig::default();
        assert!(matches!(
            AppState::new(config),
            Err(StateError::Realtime(RealtimeError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn test_new_with_api_key() {
        let mut config = ServerConfig::default();
        config.realtime.api_key = "sk-test".to_string();
        config.audio_queue_capacity = 4;

        let state = AppState::new(config).unwrap();
        assert!(state.sessions.is_empty());
        assert_eq!(state.config.audio_queue_capacity, 4);
    }
}
