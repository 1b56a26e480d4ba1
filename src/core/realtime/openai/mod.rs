//! OpenAI Realtime API connector.
//!
//! Speaks the `session.update` / `input_audio_buffer.*` client protocol and
//! decodes the server events the relay cares about.

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtimeConnector;
pub use config::{
    DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeConfig,
    OpenAIRealtimeVoice,
};
pub use messages::{
    ApiError, ClientEvent, InputAudioTranscription, SessionConfig, ServerEvent, TurnDetection,
};
