//! Realtime speech-to-speech backend.
//!
//! # Architecture
//!
//! - [`RealtimeConnector`] opens one connection per call
//! - [`RealtimeConnection`] exposes the connection as outbound/inbound channels
//! - [`openai`] implements the connector over the OpenAI Realtime WebSocket API
//!
//! # Example
//!
//! ```rust,ignore
//! use voice_relay::core::realtime::{OpenAIRealtimeConfig, OpenAIRealtimeConnector, RealtimeConnector};
//!
//! let connector = OpenAIRealtimeConnector::new(OpenAIRealtimeConfig {
//!     api_key: "sk-...".to_string(),
//!     ..Default::default()
//! })?;
//! let connection = connector.connect().await?;
//! ```

mod base;
pub mod openai;

pub use base::{RealtimeConnection, RealtimeConnector, RealtimeError, RealtimeResult};
pub use openai::{
    ClientEvent, OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeConfig,
    OpenAIRealtimeConnector, OpenAIRealtimeVoice, ServerEvent, SessionConfig,
};
