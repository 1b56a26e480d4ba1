//! Incoming-call webhook
//!
//! The telephony platform posts `CallSid` and `From` when a call arrives. The
//! handler registers the call and answers with TwiML that speaks the greeting
//! and then connects the call's audio to the media stream endpoint.

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// Form fields of the incoming-call webhook. Other fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct IncomingCallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

/// `POST /call`
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<IncomingCallForm>,
) -> AppResult<Response> {
    let call_sid = form
        .call_sid
        .map(|sid| sid.trim().to_string())
        .filter(|sid| !sid.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing CallSid".to_string()))?;

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());
    let stream_url = state.config.media_stream_url(host).ok_or_else(|| {
        AppError::BadRequest("cannot build media stream URL without a Host header".to_string())
    })?;

    state.sessions.create(&call_sid, form.from.clone())?;

    info!(
        call_id = %call_sid,
        caller = form.from.as_deref().unwrap_or("unknown"),
        "Incoming call registered"
    );

    let twiml = render_twiml(&state.config.greeting, &stream_url);
    Ok(([(header::CONTENT_TYPE, "text/xml")], twiml).into_response())
}

/// Greeting, a one second pause, then the bidirectional media stream.
fn render_twiml(greeting: &str, stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>{greeting}</Say>
  <Pause length="1"/>
  <Connect>
    <Stream url="{stream_url}"/>
  </Connect>
</Response>"#,
        greeting = escape_xml(greeting),
        stream_url = escape_xml(stream_url),
    )
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
