use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{CollaboratorResult, SummaryDispatcher, build_http_client, check_status};
use crate::core::session::Turn;

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    conversation_log: &'a [Turn],
}

/// Body returned by the summarization service.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResponse {
    pub summary_text: String,
}

/// Client for `POST {conversation_log} -> {summary_text}`.
#[derive(Debug, Clone)]
pub struct HttpSummaryClient {
    client: Client,
    url: String,
}

impl HttpSummaryClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> CollaboratorResult<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            url: url.into(),
        })
    }

    /// Request a summary of `log`.
    pub async fn summarize(&self, log: &[Turn]) -> CollaboratorResult<SummaryResponse> {
        let response = self
            .client
            .post(&self.url)
            .json(&SummaryRequest {
                conversation_log: log,
            })
            .send()
            .await?;

        let summary = check_status(response).await?.json::<SummaryResponse>().await?;
        Ok(summary)
    }
}

#[async_trait]
impl SummaryDispatcher for HttpSummaryClient {
    async fn dispatch(&self, call_id: &str, log: &[Turn]) -> CollaboratorResult<()> {
        let summary = self.summarize(log).await?;
        info!(
            call_id,
            turns = log.len(),
            summary_chars = summary.summary_text.len(),
            "Summary generated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborators::CollaboratorError;
    use crate::core::session::Role;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_log() -> Vec<Turn> {
        vec![
            Turn::new(Role::User, "my tooth hurts"),
            Turn::new(Role::Assistant, "when did it start?"),
        ]
    }

    #[tokio::test]
    async fn test_summarize_posts_conversation_log() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize"))
            .and(body_json(serde_json::json!({
                "conversation_log": [
                    {"role": "user", "content": "my tooth hurts"},
                    {"role": "assistant", "content": "when did it start?"}
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"summary_text": "Toothache."})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client =
            HttpSummaryClient::new(format!("{}/summarize", server.uri()), Duration::from_secs(5))
                .unwrap();
        let summary = client.summarize(&sample_log()).await.unwrap();
        assert_eq!(summary.summary_text, "Toothache.");
    }

    #[tokio::test]
    async fn test_dispatch_surfaces_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = HttpSummaryClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.dispatch("CA1", &sample_log()).await.unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::Status { status: 500, ref body } if body == "boom"
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = HttpSummaryClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.summarize(&sample_log()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        let client =
            HttpSummaryClient::new("http://127.0.0.1:1/summarize", Duration::from_secs(1)).unwrap();
        let err = client.summarize(&sample_log()).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Network(_)));
    }
}
