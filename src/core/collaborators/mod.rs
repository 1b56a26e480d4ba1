//! HTTP collaborators the relay hands work to.
//!
//! - [`HttpSummaryClient`] posts a finished call's transcript to the
//!   summarization service
//! - [`ConversationClient`] implements the text-turn contract
//!   (`conversation_log` in, `reply` out)

mod conversation;
mod summary;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::core::session::Turn;

pub use conversation::{ConversationClient, ConversationReply};
pub use summary::{HttpSummaryClient, SummaryResponse};

/// Identifies this service to collaborators.
const USER_AGENT: &str = concat!("voice-relay/", env!("CARGO_PKG_VERSION"));

/// Errors returned by collaborator clients.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Collaborator returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Receives the transcript of every finished call that has one.
#[async_trait]
pub trait SummaryDispatcher: Send + Sync {
    async fn dispatch(&self, call_id: &str, log: &[Turn]) -> CollaboratorResult<()>;
}

/// Build the shared HTTP client used by collaborator clients.
pub(crate) fn build_http_client(timeout: Duration) -> CollaboratorResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .pool_max_idle_per_host(4)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CollaboratorError::Configuration(format!("Failed to create HTTP client: {e}")))
}

/// Turn a non-success response into [`CollaboratorError::Status`].
pub(crate) async fn check_status(response: reqwest::Response) -> CollaboratorResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Status {
        status: status.as_u16(),
        body,
    })
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CollaboratorError::InvalidResponse(e.to_string())
        } else {
            CollaboratorError::Network(e.to_string())
        }
    }
}
