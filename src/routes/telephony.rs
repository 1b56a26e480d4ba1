use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::telephony::incoming_call;
use crate::state::AppState;
use std::sync::Arc;

/// Create the telephony webhook router
///
/// # Endpoint
///
/// `POST /call` - Form-encoded incoming-call webhook (`CallSid`, `From`).
/// Responds with TwiML (`text/xml`) that greets the caller and connects the
/// call to the media stream endpoint.
///
/// # Errors
///
/// - `400` when `CallSid` is missing
/// - `409` when the call already has a live session
pub fn create_telephony_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/call", post(incoming_call))
        .layer(TraceLayer::new_for_http())
}
