//! Media stream message types
//!
//! JSON frames exchanged with the telephony platform over the media socket.
//! Audio payloads are base64 encoded in both directions.

use base64::{Engine, prelude::BASE64_STANDARD};
use serde::{Deserialize, Serialize};

// =============================================================================
// Incoming Messages (Telephony -> Server)
// =============================================================================

/// Incoming media socket frames, tagged by `event`
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyInbound {
    /// Socket opened; carries no call information
    Connected,

    /// Stream started for a call
    Start { start: StreamStart },

    /// One chunk of caller audio
    Media { media: MediaPayload },

    /// Caller hung up or the stream ended
    Stop,

    /// Marks, DTMF and anything newer
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    pub call_sid: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaPayload {
    /// Base64 encoded audio
    pub payload: String,
}

impl MediaPayload {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(&self.payload)
    }
}

// =============================================================================
// Outgoing Messages (Server -> Telephony)
// =============================================================================

/// Outgoing media socket frames
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyOutbound {
    /// Assistant audio for the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
}

impl TelephonyOutbound {
    pub fn media(stream_sid: impl Into<String>, audio: &[u8]) -> Self {
        TelephonyOutbound::Media {
            stream_sid: stream_sid.into(),
            media: MediaPayload {
                payload: BASE64_STANDARD.encode(audio),
            },
        }
    }
}
