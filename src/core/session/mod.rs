//! Per-call session state.
//!
//! A [`CallSession`] is created by the telephony webhook, bound to a media
//! stream on the first `start` frame, drained on `stop` and finally removed
//! from the [`SessionRegistry`]. Every task working on a call receives an
//! `Arc<CallSession>` handle; the session is the only place the stream id,
//! the audio queue and the transcript live.
//!
//! # State machine
//!
//! ```text
//! INITIATED --start--> STREAMING --stop / socket closed--> DRAINING --finalized--> CLOSED
//! ```
//!
//! `CLOSED` is only ever set at the moment the registry drops the session.

mod queue;
mod registry;

use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use queue::{AudioFrame, AudioQueueReceiver, AudioQueueSender, PushOutcome, audio_queue};
pub use registry::{RegistryError, RegistryResult, SessionRegistry, start_reaper_task};

/// Lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    /// Webhook received, media socket not yet bound
    Initiated,
    /// Media socket bound, audio flowing
    Streaming,
    /// End of input seen, waiting for the upstream client to finish
    Draining,
    /// Removed from the registry
    Closed,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Initiated => "INITIATED",
            CallState::Streaming => "STREAMING",
            CallState::Draining => "DRAINING",
            CallState::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// Speaker of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One attributed utterance in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Milliseconds since the session was created; diagnostics only
    #[serde(skip)]
    pub at_ms: u64,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at_ms: 0,
        }
    }
}

/// Errors raised by session state transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid transition for call {call_id}: {from} -> {to}")]
    InvalidTransition {
        call_id: String,
        from: CallState,
        to: CallState,
    },

    #[error("transcript for call {call_id} is not writable in state {state}")]
    LogNotWritable { call_id: String, state: CallState },
}

/// State for one active call.
pub struct CallSession {
    call_id: String,
    caller: Option<String>,
    created_at: Instant,
    stream_id: OnceLock<String>,
    state: Mutex<CallState>,
    audio_tx: AudioQueueSender,
    audio_rx: Mutex<Option<AudioQueueReceiver>>,
    conversation_log: Mutex<Vec<Turn>>,
}

impl CallSession {
    /// Create a session in the `INITIATED` state with an audio queue of
    /// `queue_capacity` chunks.
    pub fn new(call_id: impl Into<String>, caller: Option<String>, queue_capacity: usize) -> Self {
        let (audio_tx, audio_rx) = audio_queue(queue_capacity);
        Self {
            call_id: call_id.into(),
            caller,
            created_at: Instant::now(),
            stream_id: OnceLock::new(),
            state: Mutex::new(CallState::Initiated),
            audio_tx,
            audio_rx: Mutex::new(Some(audio_rx)),
            conversation_log: Mutex::new(Vec::new()),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// Media stream id, set once the `start` frame has been processed.
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.get().map(String::as_str)
    }

    pub fn state(&self) -> CallState {
        *self.state.lock()
    }

    /// Time since the webhook created this session.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// `INITIATED -> STREAMING`, recording the stream id.
    pub fn begin_streaming(&self, stream_id: impl Into<String>) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if *state != CallState::Initiated {
            return Err(SessionError::InvalidTransition {
                call_id: self.call_id.clone(),
                from: *state,
                to: CallState::Streaming,
            });
        }

        // Only reachable once, the state guard above serialises callers
        let _ = self.stream_id.set(stream_id.into());
        *state = CallState::Streaming;
        Ok(())
    }

    /// `STREAMING -> DRAINING`. Returns `false` if the session was not streaming,
    /// which makes the caller that wins the transition the only one to finalize.
    pub fn begin_draining(&self) -> bool {
        let mut state = self.state.lock();
        if *state == CallState::Streaming {
            *state = CallState::Draining;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_closed(&self) {
        *self.state.lock() = CallState::Closed;
    }

    /// `INITIATED -> CLOSED` for a session older than `max_age`, checked and
    /// applied under one lock so a concurrent `start` either wins or loses whole.
    pub(crate) fn close_if_initiated(&self, max_age: Duration) -> bool {
        let mut state = self.state.lock();
        if *state == CallState::Initiated && self.age() > max_age {
            *state = CallState::Closed;
            true
        } else {
            false
        }
    }

    /// Non-blocking enqueue of inbound telephony audio.
    pub fn push_audio(&self, chunk: Bytes) -> PushOutcome {
        self.audio_tx.push(chunk)
    }

    /// Enqueue the end-of-input sentinel. Returns `true` only the first time.
    pub fn finish_input(&self) -> bool {
        self.audio_tx.finish()
    }

    pub fn input_finished(&self) -> bool {
        self.audio_tx.is_finished()
    }

    /// Hand the consumer half of the audio queue to the upstream client.
    /// Returns `None` if it was already taken.
    pub fn take_audio_receiver(&self) -> Option<AudioQueueReceiver> {
        self.audio_rx.lock().take()
    }

    /// Append a turn to the transcript. Only allowed while streaming or draining.
    pub fn append_turn(&self, role: Role, content: impl Into<String>) -> Result<(), SessionError> {
        let state = self.state.lock();
        if !matches!(*state, CallState::Streaming | CallState::Draining) {
            return Err(SessionError::LogNotWritable {
                call_id: self.call_id.clone(),
                state: *state,
            });
        }

        let turn = Turn {
            role,
            content: content.into(),
            at_ms: self.created_at.elapsed().as_millis() as u64,
        };
        self.conversation_log.lock().push(turn);
        Ok(())
    }

    /// Snapshot of the transcript in append order.
    pub fn conversation_log(&self) -> Vec<Turn> {
        self.conversation_log.lock().clone()
    }
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("call_id", &self.call_id)
            .field("stream_id", &self.stream_id.get())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
