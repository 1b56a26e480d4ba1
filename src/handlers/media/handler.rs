//! Media stream WebSocket handler
//!
//! One socket per call. The read loop waits for `start`, binds the socket to
//! the registered call and starts the upstream client. Caller audio goes into
//! the session's audio queue; assistant audio coming back from the upstream
//! client is written to the socket by a dedicated sender task. `stop` or the
//! socket closing ends input and hands the call to the finalizer.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use crate::core::session::{CallSession, PushOutcome, Turn};
use crate::state::AppState;

use super::messages::{TelephonyInbound, TelephonyOutbound};

/// Buffer between the bridge and the socket sender task
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long the sender task may take to flush and close the socket
const SENDER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Routed to the socket sender task
enum MediaRoute {
    Outgoing(TelephonyOutbound),
    Close,
}

/// What the read loop does after a frame
enum Flow {
    Continue,
    /// End of caller input: finalize and close
    EndOfInput,
    /// Close without touching any session
    Close,
}

/// A call bound to this socket by its `start` frame
struct ActiveCall {
    session: Arc<CallSession>,
    upstream: JoinHandle<Vec<Turn>>,
    forwarder: JoinHandle<()>,
}

/// `GET /media` WebSocket upgrade
pub async fn media_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("Media stream connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_socket(socket, state))
}

async fn handle_media_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<MediaRoute>(CHANNEL_BUFFER_SIZE);

    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let result = match route {
                MediaRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing media frame: {}", e);
                        continue;
                    }
                },
                MediaRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!("Failed to write to media socket: {}", e);
                break;
            }
        }
    });

    let start_timeout = tokio::time::sleep(state.config.start_timeout());
    tokio::pin!(start_timeout);

    let mut call: Option<ActiveCall> = None;

    loop {
        select! {
            _ = &mut start_timeout, if call.is_none() => {
                warn!(
                    timeout_ms = state.config.start_timeout_ms,
                    "No start frame received, closing media socket"
                );
                break;
            }
            msg = receiver.next() => {
                let flow = match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<TelephonyInbound>(text.as_str()) {
                            Ok(event) => handle_event(event, &state, &mut call, &route_tx),
                            Err(e) => {
                                warn!(error = %e, "Dropping malformed media frame");
                                Flow::Continue
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Media socket closed by peer");
                        Flow::EndOfInput
                    }
                    Some(Ok(_)) => Flow::Continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "Media socket error");
                        Flow::EndOfInput
                    }
                };

                match flow {
                    Flow::Continue => {}
                    Flow::EndOfInput | Flow::Close => break,
                }
            }
        }
    }

    if let Some(active) = call {
        end_call(&state, active).await;
    }

    let _ = route_tx.send(MediaRoute::Close).await;
    drop(route_tx);
    if tokio::time::timeout(SENDER_SHUTDOWN_TIMEOUT, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }
}

fn handle_event(
    event: TelephonyInbound,
    state: &Arc<AppState>,
    call: &mut Option<ActiveCall>,
    route_tx: &mpsc::Sender<MediaRoute>,
) -> Flow {
    match event {
        TelephonyInbound::Connected => {
            debug!("Media stream connected");
            Flow::Continue
        }
        TelephonyInbound::Start { start } => {
            if let Some(active) = call {
                debug!(
                    call_id = active.session.call_id(),
                    "Ignoring repeated start frame"
                );
                return Flow::Continue;
            }

            let session = match state.sessions.get(&start.call_sid) {
                Ok(session) => session,
                Err(e) => {
                    warn!(call_id = %start.call_sid, error = %e, "Start for unknown call, closing");
                    return Flow::Close;
                }
            };

            if let Err(e) = session.begin_streaming(start.stream_sid.clone()) {
                warn!(call_id = %start.call_sid, error = %e, "Call cannot start streaming, closing");
                return Flow::Close;
            }

            info!(
                call_id = %start.call_sid,
                stream_id = %start.stream_sid,
                "Media stream started"
            );

            let (audio_tx, audio_rx) = mpsc::channel::<Bytes>(CHANNEL_BUFFER_SIZE);
            let upstream = state.upstream.spawn(session.clone(), audio_tx);
            let forwarder = tokio::spawn(forward_assistant_audio(
                audio_rx,
                start.stream_sid,
                route_tx.clone(),
            ));

            *call = Some(ActiveCall {
                session,
                upstream,
                forwarder,
            });
            Flow::Continue
        }
        TelephonyInbound::Media { media } => {
            let Some(active) = call else {
                debug!("Dropping media frame received before start");
                return Flow::Continue;
            };
            let call_id = active.session.call_id();

            let chunk = match media.decode() {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(call_id, error = %e, "Dropping media frame with invalid payload");
                    return Flow::Continue;
                }
            };

            match active.session.push_audio(Bytes::from(chunk)) {
                PushOutcome::Queued => {}
                PushOutcome::DroppedFull => {
                    warn!(call_id, "Audio queue full, dropping chunk");
                }
                PushOutcome::Closed => {
                    debug!(call_id, "Audio queue closed, dropping chunk");
                }
            }
            Flow::Continue
        }
        TelephonyInbound::Stop => {
            info!("Media stream stopped");
            Flow::EndOfInput
        }
        TelephonyInbound::Unknown => {
            debug!("Ignoring unsupported media frame");
            Flow::Continue
        }
    }
}

/// Relay assistant audio from the upstream client to the caller in order.
async fn forward_assistant_audio(
    mut audio_rx: mpsc::Receiver<Bytes>,
    stream_sid: String,
    route_tx: mpsc::Sender<MediaRoute>,
) {
    while let Some(audio) = audio_rx.recv().await {
        let frame = TelephonyOutbound::media(stream_sid.as_str(), &audio);
        if route_tx.send(MediaRoute::Outgoing(frame)).await.is_err() {
            debug!(stream_id = %stream_sid, "Media socket sender gone, dropping assistant audio");
            break;
        }
    }
}

/// End caller input and finalize the call.
async fn end_call(state: &Arc<AppState>, active: ActiveCall) {
    let ActiveCall {
        session,
        upstream,
        forwarder,
    } = active;

    session.finish_input();
    if !session.begin_draining() {
        debug!(call_id = session.call_id(), "Call already draining");
        forwarder.abort();
        return;
    }

    state.finalizer.finalize(&session, upstream).await;

    // The upstream client is done, so the forwarder only has buffered audio left
    if let Err(e) = forwarder.await {
        debug!(call_id = session.call_id(), error = %e, "Audio forwarder ended abnormally");
    }
}
