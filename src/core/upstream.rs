//! Upstream realtime client.
//!
//! Owns one backend connection per call and runs two loops concurrently:
//!
//! - **outbound** drains the call's audio queue into `input_audio_buffer.append`
//!   events and sends a single `input_audio_buffer.commit` on end-of-input,
//!   then stops sending
//! - **inbound** forwards assistant audio to the media bridge in arrival order
//!   and appends completed transcripts to the session log
//!
//! Failures only end this call's loops. The client always returns the log
//! collected so far.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::realtime::{ClientEvent, RealtimeConnector, ServerEvent};
use crate::core::session::{AudioFrame, CallSession, Role, Turn};

/// Drives one call's conversation with the realtime backend.
#[derive(Clone)]
pub struct UpstreamClient {
    connector: Arc<dyn RealtimeConnector>,
    drain_timeout: Duration,
}

impl UpstreamClient {
    /// `drain_timeout` bounds how long the inbound loop keeps reading after commit.
    pub fn new(connector: Arc<dyn RealtimeConnector>, drain_timeout: Duration) -> Self {
        Self {
            connector,
            drain_timeout,
        }
    }

    /// Run the client on its own task.
    pub fn spawn(
        &self,
        session: Arc<CallSession>,
        audio_out: mpsc::Sender<Bytes>,
    ) -> JoinHandle<Vec<Turn>> {
        let client = self.clone();
        tokio::spawn(async move { client.run(session, audio_out).await })
    }

    /// Stream the session's audio to the backend until end-of-input and return
    /// the conversation log.
    pub async fn run(&self, session: Arc<CallSession>, audio_out: mpsc::Sender<Bytes>) -> Vec<Turn> {
        let call_id = session.call_id().to_string();

        let Some(mut audio_rx) = session.take_audio_receiver() else {
            warn!(call_id = %call_id, "audio queue already has a consumer");
            return session.conversation_log();
        };

        let connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                error!(call_id = %call_id, error = %e, "Failed to connect to realtime backend");
                return session.conversation_log();
            }
        };
        let (events, mut server_events, _connection_guard) = connection.into_parts();

        let session_update = ClientEvent::SessionUpdate {
            session: self.connector.session_config(),
        };
        if events.send(session_update).await.is_err() {
            warn!(call_id = %call_id, "Realtime connection closed before session.update");
            return session.conversation_log();
        }
        info!(call_id = %call_id, "Realtime session started");

        let committed = CancellationToken::new();
        let stop = CancellationToken::new();

        let outbound = {
            let committed = committed.clone();
            let stop = stop.clone();
            let call_id = call_id.as_str();
            async move {
                let mut appended: u64 = 0;
                loop {
                    let frame = tokio::select! {
                        _ = stop.cancelled() => break,
                        frame = audio_rx.next() => frame,
                    };

                    match frame {
                        AudioFrame::Chunk(chunk) => {
                            if events.send(ClientEvent::audio_append(&chunk)).await.is_err() {
                                warn!(call_id, "Realtime connection closed while sending audio");
                                break;
                            }
                            appended += 1;
                        }
                        AudioFrame::EndOfInput => {
                            if events.send(ClientEvent::InputAudioBufferCommit).await.is_ok() {
                                committed.cancel();
                                debug!(call_id, appended, "Committed input audio buffer");
                            } else {
                                warn!(call_id, "Realtime connection closed before commit");
                            }
                            break;
                        }
                    }
                }

                // Dropping the sender half-closes the connection
                drop(events);
                if !committed.is_cancelled() {
                    stop.cancel();
                }
            }
        };

        let inbound = {
            let committed = committed.clone();
            let stop = stop.clone();
            let session = session.as_ref();
            let audio_out = &audio_out;
            let call_id = call_id.as_str();
            let drain_timeout = self.drain_timeout;
            async move {
                let mut deadline: Option<Instant> = None;
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = committed.cancelled(), if deadline.is_none() => {
                            deadline = Some(Instant::now() + drain_timeout);
                        }
                        _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                            debug!(call_id, "Realtime backend still open after drain timeout");
                            break;
                        }
                        event = server_events.recv() => match event {
                            Some(Ok(event)) => forward_event(session, audio_out, event).await,
                            Some(Err(e)) => {
                                if committed.is_cancelled() {
                                    debug!(call_id, error = %e, "Realtime receive ended after commit");
                                } else {
                                    warn!(call_id, error = %e, "Realtime receive failed");
                                }
                                break;
                            }
                            None => {
                                if !committed.is_cancelled() {
                                    warn!(call_id, "Realtime backend closed before commit");
                                }
                                break;
                            }
                        },
                    }
                }
                stop.cancel();
            }
        };

        tokio::join!(outbound, inbound);

        let log = session.conversation_log();
        info!(call_id = %call_id, turns = log.len(), "Realtime session finished");
        log
    }
}

/// Apply one server event to the call.
async fn forward_event(session: &CallSession, audio_out: &mpsc::Sender<Bytes>, event: ServerEvent) {
    match event {
        ServerEvent::AudioDelta { delta } => match ServerEvent::decode_audio_delta(&delta) {
            Ok(audio) => {
                // Bridge gone means the call is ending; nothing left to play to
                let _ = audio_out.send(Bytes::from(audio)).await;
            }
            Err(e) => {
                warn!(call_id = session.call_id(), "Failed to decode audio delta: {}", e);
            }
        },
        ServerEvent::TranscriptionCompleted { transcript } => {
            append_transcript(session, Role::User, transcript);
        }
        ServerEvent::AssistantResponseCompleted { transcript } => {
            append_transcript(session, Role::Assistant, transcript);
        }
        ServerEvent::Error { error } => {
            warn!(
                call_id = session.call_id(),
                error_type = %error.error_type,
                code = ?error.code,
                "Realtime backend error: {}",
                error.message
            );
        }
        ServerEvent::SessionCreated { session: info } | ServerEvent::SessionUpdated { session: info } => {
            debug!(call_id = session.call_id(), session_id = %info.id, "Realtime session acknowledged");
        }
        ServerEvent::Unknown => {}
    }
}

fn append_transcript(session: &CallSession, role: Role, transcript: String) {
    if transcript.trim().is_empty() {
        return;
    }
    if let Err(e) = session.append_turn(role, transcript) {
        debug!(call_id = session.call_id(), error = %e, "Dropping transcript");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::core::realtime::{
        RealtimeConnection, RealtimeError, RealtimeResult, SessionConfig,
    };

    /// Connector handing out a single pre-built connection.
    struct ChannelConnector {
        connection: Mutex<Option<RealtimeConnection>>,
    }

    #[async_trait]
    impl RealtimeConnector for ChannelConnector {
        async fn connect(&self) -> RealtimeResult<RealtimeConnection> {
            self.connection
                .lock()
                .take()
                .ok_or(RealtimeError::NotConnected)
        }

        fn session_config(&self) -> SessionConfig {
            SessionConfig {
                voice: Some("alloy".to_string()),
                ..Default::default()
            }
        }
    }

    struct Backend {
        client_events: mpsc::Receiver<ClientEvent>,
        server_events: mpsc::Sender<RealtimeResult<ServerEvent>>,
    }

    fn channel_connector() -> (Arc<ChannelConnector>, Backend) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (server_tx, server_rx) = mpsc::channel(64);
        let connection = RealtimeConnection::new(event_tx, server_rx, CancellationToken::new());
        (
            Arc::new(ChannelConnector {
                connection: Mutex::new(Some(connection)),
            }),
            Backend {
                client_events: event_rx,
                server_events: server_tx,
            },
        )
    }

    fn streaming_session() -> Arc<CallSession> {
        let session = Arc::new(CallSession::new("CA1", None, 16));
        session.begin_streaming("MZ1").unwrap();
        session
    }

    fn event(json: &str) -> RealtimeResult<ServerEvent> {
        Ok(serde_json::from_str(json).unwrap())
    }

    #[tokio::test]
    async fn test_audio_is_appended_then_committed() {
        let (connector, mut backend) = channel_connector();
        let session = streaming_session();
        let (audio_tx, _audio_rx) = mpsc::channel(16);

        let client = UpstreamClient::new(connector, Duration::from_millis(200));
        let handle = client.spawn(session.clone(), audio_tx);

        session.push_audio(Bytes::from_static(b"a"));
        session.push_audio(Bytes::from_static(b"b"));
        session.push_audio(Bytes::from_static(b"c"));
        assert!(session.finish_input());

        let mut sent = Vec::new();
        while let Some(event) = backend.client_events.recv().await {
            sent.push(serde_json::to_value(&event).unwrap());
        }

        assert_eq!(sent.len(), 5);
        assert_eq!(sent[0]["type"], "session.update");
        assert_eq!(sent[0]["session"]["voice"], "alloy");
        for (event, expected) in sent[1..4].iter().zip(["YQ==", "Yg==", "Yw=="]) {
            assert_eq!(event["type"], "input_audio_buffer.append");
            assert_eq!(event["audio"], expected);
        }
        assert_eq!(sent[4]["type"], "input_audio_buffer.commit");

        drop(backend.server_events);
        let log = handle.await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_inbound_events_reach_log_and_bridge() {
        let (connector, mut backend) = channel_connector();
        let session = streaming_session();
        let (audio_tx, mut audio_rx) = mpsc::channel(16);

        let client = UpstreamClient::new(connector, Duration::from_secs(1));
        let handle = client.spawn(session.clone(), audio_tx);

        let server = backend.server_events.clone();
        server
            .send(event(r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello"}"#))
            .await
            .unwrap();
        server
            .send(event(r#"{"type":"response.audio.delta","delta":"AAEC"}"#))
            .await
            .unwrap();
        server
            .send(event(r#"{"type":"conversation.item.assistant_response.completed","transcript":"hi there"}"#))
            .await
            .unwrap();
        server
            .send(event(r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"   "}"#))
            .await
            .unwrap();
        server
            .send(event(r#"{"type":"rate_limits.updated","rate_limits":[]}"#))
            .await
            .unwrap();

        assert_eq!(audio_rx.recv().await.unwrap(), Bytes::from_static(&[0, 1, 2]));

        session.finish_input();
        while backend.client_events.recv().await.is_some() {}
        drop(server);
        drop(backend.server_events);

        let log = handle.await.unwrap();
        assert_eq!(
            log.iter()
                .map(|t| (t.role, t.content.as_str()))
                .collect::<Vec<_>>(),
            vec![(Role::User, "hello"), (Role::Assistant, "hi there")]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_returns_partial_log() {
        let connector = Arc::new(ChannelConnector {
            connection: Mutex::new(None),
        });
        let session = streaming_session();
        session.append_turn(Role::User, "before").unwrap();
        let (audio_tx, _audio_rx) = mpsc::channel(16);

        let log = UpstreamClient::new(connector, Duration::from_secs(1))
            .run(session, audio_tx)
            .await;
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_receive_error_before_commit_ends_loops() {
        let (connector, mut backend) = channel_connector();
        let session = streaming_session();
        let (audio_tx, _audio_rx) = mpsc::channel(16);

        let handle = UpstreamClient::new(connector, Duration::from_secs(1))
            .spawn(session.clone(), audio_tx);

        // session.update
        assert!(backend.client_events.recv().await.is_some());
        backend
            .server_events
            .send(Err(RealtimeError::WebSocketError("reset".to_string())))
            .await
            .unwrap();

        // Returns without end-of-input ever being signalled
        let log = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("upstream should stop after a receive error")
            .unwrap();
        assert!(log.is_empty());
        assert!(!session.input_finished());
    }

    #[tokio::test]
    async fn test_drain_timeout_bounds_inbound_after_commit() {
        let (connector, mut backend) = channel_connector();
        let session = streaming_session();
        let (audio_tx, _audio_rx) = mpsc::channel(16);

        let handle = UpstreamClient::new(connector, Duration::from_millis(50))
            .spawn(session.clone(), audio_tx);

        session.finish_input();
        while backend.client_events.recv().await.is_some() {}

        // Backend never closes; the client gives up after the drain timeout
        let log = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("upstream should stop after the drain timeout")
            .unwrap();
        assert!(log.is_empty());
        drop(backend.server_events);
    }
}
