//! OpenAI Realtime Mock Server Tests
//!
//! Runs the upstream client with the real OpenAI connector against a local
//! WebSocket server speaking the realtime event protocol.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use voice_relay::core::realtime::{OpenAIRealtimeConfig, OpenAIRealtimeConnector};
use voice_relay::core::session::{CallSession, Role};
use voice_relay::core::upstream::UpstreamClient;

#[derive(Default)]
struct Handshake {
    uri: String,
    authorization: Option<String>,
    beta: Option<String>,
}

/// Accept one connection, record the client's events up to the commit, then
/// answer with `replies` and close.
async fn start_mock_backend(
    replies: Vec<Value>,
) -> (String, Arc<Mutex<Handshake>>, Arc<Mutex<Vec<Value>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handshake = Arc::new(Mutex::new(Handshake::default()));
    let received = Arc::new(Mutex::new(Vec::new()));

    let captured = handshake.clone();
    let events = received.clone();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let header = |name: &str| {
                req.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let mut hs = captured.lock();
            hs.uri = req.uri().to_string();
            hs.authorization = header("authorization");
            hs.beta = header("openai-beta");
            Ok(resp)
        };
        let mut ws = accept_hdr_async(stream, callback).await.unwrap();

        ws.send(Message::Text(
            json!({"type": "session.created", "session": {"id": "sess_1", "model": "gpt-4o-realtime"}})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(&text).unwrap();
                let committed = value["type"] == "input_audio_buffer.commit";
                events.lock().push(value);
                if committed {
                    break;
                }
            }
        }

        for reply in replies {
            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        }
        let _ = ws.close(None).await;
    });

    (format!("ws://{addr}/v1/realtime"), handshake, received)
}

fn connector_for(url: String) -> Arc<OpenAIRealtimeConnector> {
    let config = OpenAIRealtimeConfig {
        url,
        api_key: "sk-test".to_string(),
        ..Default::default()
    };
    Arc::new(OpenAIRealtimeConnector::new(config).unwrap())
}

#[tokio::test]
async fn test_upstream_conversation_against_mock_backend() {
    let (url, handshake, received) = start_mock_backend(vec![
        json!({"type": "input_audio_buffer.speech_started", "audio_start_ms": 0}),
        json!({"type": "response.audio.delta", "delta": "eHl6"}),
        json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "hello"
        }),
        json!({
            "type": "conversation.item.assistant_response.completed",
            "transcript": "hi there"
        }),
        json!({"type": "error", "error": {"type": "invalid_request_error", "message": "ignored"}}),
    ])
    .await;

    let session = Arc::new(CallSession::new("CA1", None, 16));
    session.begin_streaming("MZ1").unwrap();
    session.push_audio(Bytes::from_static(b"a"));
    session.push_audio(Bytes::from_static(b"b"));
    session.finish_input();

    let (audio_tx, mut audio_rx) = mpsc::channel(16);
    let client = UpstreamClient::new(connector_for(url), Duration::from_secs(2));

    let log = timeout(Duration::from_secs(10), client.run(session.clone(), audio_tx))
        .await
        .expect("upstream client did not finish");

    let hs = handshake.lock();
    assert!(hs.uri.contains("model=gpt-4o-realtime-preview"));
    assert_eq!(hs.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(hs.beta.as_deref(), Some("realtime=v1"));
    drop(hs);

    let events = received.lock().clone();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0]["type"], "session.update");
    assert_eq!(events[0]["session"]["input_audio_format"], "g711_ulaw");
    assert_eq!(events[0]["session"]["output_audio_format"], "g711_ulaw");
    assert_eq!(events[0]["session"]["turn_detection"]["type"], "server_vad");
    assert_eq!(
        events[0]["session"]["input_audio_transcription"]["model"],
        "whisper-1"
    );
    assert_eq!(events[1], json!({"type": "input_audio_buffer.append", "audio": "YQ=="}));
    assert_eq!(events[2], json!({"type": "input_audio_buffer.append", "audio": "Yg=="}));
    assert_eq!(events[3], json!({"type": "input_audio_buffer.commit"}));

    assert_eq!(audio_rx.recv().await.as_deref(), Some(&b"xyz"[..]));
    assert!(audio_rx.recv().await.is_none());

    assert_eq!(log.len(), 2);
    assert_eq!((log[0].role, log[0].content.as_str()), (Role::User, "hello"));
    assert_eq!(
        (log[1].role, log[1].content.as_str()),
        (Role::Assistant, "hi there")
    );
}

#[tokio::test]
async fn test_blank_transcripts_are_not_logged() {
    let (url, _handshake, _received) = start_mock_backend(vec![
        json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "   "
        }),
        json!({
            "type": "conversation.item.assistant_response.completed",
            "transcript": "anything else?"
        }),
    ])
    .await;

    let session = Arc::new(CallSession::new("CA2", None, 16));
    session.begin_streaming("MZ2").unwrap();
    session.finish_input();

    let (audio_tx, _audio_rx) = mpsc::channel(16);
    let client = UpstreamClient::new(connector_for(url), Duration::from_secs(2));
    let log = timeout(Duration::from_secs(10), client.run(session, audio_tx))
        .await
        .expect("upstream client did not finish");

    assert_eq!(log.len(), 1);
    assert_eq!(log[0].role, Role::Assistant);
}

#[tokio::test]
async fn test_unreachable_backend_returns_empty_log() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = Arc::new(CallSession::new("CA3", None, 16));
    session.begin_streaming("MZ3").unwrap();
    session.finish_input();

    let (audio_tx, _audio_rx) = mpsc::channel(16);
    let client = UpstreamClient::new(
        connector_for(format!("ws://{addr}/v1/realtime")),
        Duration::from_secs(2),
    );
    let log = timeout(Duration::from_secs(10), client.run(session, audio_tx))
        .await
        .expect("upstream client did not finish");
    assert!(log.is_empty());
}
