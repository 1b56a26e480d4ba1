//! Media stream WebSocket handlers
//!
//! # Protocol
//!
//! ## Telephony → Server
//!
//! - **connected**: socket opened
//! - **start**: binds the socket to a registered call (`start.callSid`)
//! - **media**: base64 caller audio (`media.payload`)
//! - **stop**: end of the caller's audio
//!
//! ## Server → Telephony
//!
//! - **media**: base64 assistant audio tagged with the call's `streamSid`

mod handler;
pub mod messages;

pub use handler::media_handler;
