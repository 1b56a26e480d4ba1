//! Text-turn collaborator client. The relay itself never calls it; it is
//! exported for embedders that drive text conversations over the same log.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CollaboratorResult, build_http_client, check_status};
use crate::core::session::Turn;

#[derive(Debug, Serialize)]
struct ConversationRequest<'a> {
    conversation_log: &'a [Turn],
}

/// Next assistant turn produced by the conversation service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationReply {
    pub reply: String,
    #[serde(default)]
    pub end_of_conversation: bool,
}

/// Client for the text-turn contract: `POST {conversation_log} -> {reply, end_of_conversation}`.
#[derive(Debug, Clone)]
pub struct ConversationClient {
    client: Client,
    url: String,
}

impl ConversationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> CollaboratorResult<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            url: url.into(),
        })
    }

    pub async fn next_reply(&self, log: &[Turn]) -> CollaboratorResult<ConversationReply> {
        let response = self
            .client
            .post(&self.url)
            .json(&ConversationRequest {
                conversation_log: log,
            })
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborators::CollaboratorError;
    use crate::core::session::Role;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_next_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "reply": "Goodbye!",
                "end_of_conversation": true
            })))
            .mount(&server)
            .await;

        let client = ConversationClient::new(
            format!("{}/conversation", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        let reply = client
            .next_reply(&[Turn::new(Role::User, "that's all, thanks")])
            .await
            .unwrap();

        assert_eq!(
            reply,
            ConversationReply {
                reply: "Goodbye!".to_string(),
                end_of_conversation: true,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_end_flag_defaults_to_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"reply": "Sure."})),
            )
            .mount(&server)
            .await;

        let client = ConversationClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let reply = client.next_reply(&[]).await.unwrap();
        assert!(!reply.end_of_conversation);
    }

    #[tokio::test]
    async fn test_client_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                serde_json::json!({"error": "Invalid request body"}),
            ))
            .mount(&server)
            .await;

        let client = ConversationClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.next_reply(&[]).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Status { status: 400, .. }));
    }
}
