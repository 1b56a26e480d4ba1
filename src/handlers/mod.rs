//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `telephony` - Incoming-call webhook answering with TwiML
//! - `media` - Media stream WebSocket bridging the call to the realtime backend

pub mod api;
pub mod media;
pub mod telephony;

pub use media::media_handler;
pub use telephony::incoming_call;
