//! OpenAI Realtime API WebSocket connector.
//!
//! Each call gets its own WebSocket. The socket is split into a writer task,
//! which serializes [`ClientEvent`]s, and a reader task, which parses
//! [`ServerEvent`]s. Closing the outbound channel sends a WebSocket close frame
//! while the reader keeps delivering whatever the server still sends.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::sync::CancellationToken;

use super::config::OpenAIRealtimeConfig;
use super::messages::{ClientEvent, ServerEvent, SessionConfig};
use crate::core::realtime::base::{
    RealtimeConnection, RealtimeConnector, RealtimeError, RealtimeResult,
};

/// Channel capacity for WebSocket messages in each direction.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Opens OpenAI Realtime WebSocket connections.
#[derive(Debug, Clone)]
pub struct OpenAIRealtimeConnector {
    config: OpenAIRealtimeConfig,
}

impl OpenAIRealtimeConnector {
    pub fn new(config: OpenAIRealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "API key is required for OpenAI Realtime".to_string(),
            ));
        }
        Ok(Self { config })
    }

    fn build_request(&self) -> RealtimeResult<http::Request<()>> {
        let mut request = self
            .config
            .ws_url()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(http::header::AUTHORIZATION, auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        Ok(request)
    }
}

#[async_trait]
impl RealtimeConnector for OpenAIRealtimeConnector {
    async fn connect(&self) -> RealtimeResult<RealtimeConnection> {
        let request = self.build_request()?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        tracing::debug!(model = %self.config.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (event_tx, mut event_rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (server_tx, server_rx) =
            mpsc::channel::<RealtimeResult<ServerEvent>>(WS_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        // Writer: client events out, close frame once the sender side is dropped
        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_shutdown.cancelled() => break,
                    event = event_rx.recv() => {
                        let Some(event) = event else { break };
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::warn!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }
                }
            }
            let _ = ws_sink.close().await;
        });

        // Reader: server events in until the server closes or the connection is dropped
        let reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    _ = reader_shutdown.cancelled() => break,
                    msg = ws_stream.next() => msg,
                };

                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if server_tx.send(Ok(event)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse server event: {} - {}", e, text);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!("WebSocket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = server_tx
                            .send(Err(RealtimeError::WebSocketError(e.to_string())))
                            .await;
                        break;
                    }
                    None => break,
                }
            }
        });

        Ok(RealtimeConnection::new(event_tx, server_rx, shutdown))
    }

    fn session_config(&self) -> SessionConfig {
        self.config.session_config()
    }
}
