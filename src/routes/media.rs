//! Media stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media::media_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media stream WebSocket router
///
/// # Endpoint
///
/// `GET /media` - WebSocket upgrade for the telephony platform's media stream
///
/// # Example
///
/// ```json
/// // Telephony sends
/// {"event": "start", "start": {"streamSid": "MZ...", "callSid": "CA..."}}
/// {"event": "media", "media": {"payload": "<base64 audio>"}}
/// {"event": "stop"}
///
/// // Server sends assistant audio
/// {"event": "media", "streamSid": "MZ...", "media": {"payload": "<base64 audio>"}}
/// ```
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media", get(media_handler))
        .layer(TraceLayer::new_for_http())
}
