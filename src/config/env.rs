use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ServerConfig, TlsConfig};
use crate::core::realtime::{OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice};

/// Read an optional, non-empty environment variable.
fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse an optional environment variable.
fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} ({raw:?}): {e}")),
        None => Ok(None),
    }
}

/// Build a configuration from environment variables on top of the defaults.
pub(super) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_string("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse("PORT")? {
        config.port = port;
    }

    config.tls = match (env_string("TLS_CERT_PATH"), env_string("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    };

    config.public_url = env_string("PUBLIC_URL");
    if let Some(greeting) = env_string("GREETING") {
        config.greeting = greeting;
    }

    // Realtime backend
    let realtime = &mut config.realtime;
    if let Some(key) = env_string("OPENAI_API_KEY") {
        realtime.api_key = key;
    }
    if let Some(url) = env_string("OPENAI_REALTIME_URL") {
        realtime.url = url;
    }
    if let Some(model) = env_string("OPENAI_REALTIME_MODEL") {
        realtime.model = model;
    }
    if let Some(voice) = env_string("OPENAI_REALTIME_VOICE") {
        realtime.voice = OpenAIRealtimeVoice::from_str_or_default(&voice);
    }
    if let Some(instructions) = env_string("OPENAI_REALTIME_INSTRUCTIONS") {
        realtime.instructions = Some(instructions);
    }
    if let Some(format) = env_string("REALTIME_INPUT_AUDIO_FORMAT") {
        realtime.input_audio_format = OpenAIRealtimeAudioFormat::from_str_or_default(&format);
    }
    if let Some(format) = env_string("REALTIME_OUTPUT_AUDIO_FORMAT") {
        realtime.output_audio_format = OpenAIRealtimeAudioFormat::from_str_or_default(&format);
    }
    if let Some(model) = env_string("TRANSCRIPTION_MODEL") {
        realtime.transcription_model = model;
    }
    if let Some(language) = env_string("TRANSCRIPTION_LANGUAGE") {
        realtime.transcription_language = Some(language);
    }
    if let Some(threshold) = env_parse("VAD_THRESHOLD")? {
        realtime.vad_threshold = threshold;
    }
    if let Some(ms) = env_parse("VAD_PREFIX_PADDING_MS")? {
        realtime.vad_prefix_padding_ms = ms;
    }
    if let Some(ms) = env_parse("VAD_SILENCE_DURATION_MS")? {
        realtime.vad_silence_duration_ms = ms;
    }

    // Collaborators
    if let Some(url) = env_string("SUMMARY_SERVICE_URL") {
        config.summary_service_url = url;
    }
    if let Some(url) = env_string("CONVERSATION_SERVICE_URL") {
        config.conversation_service_url = url;
    }
    if let Some(secs) = env_parse("COLLABORATOR_TIMEOUT_SECONDS")? {
        config.collaborator_timeout_seconds = secs;
    }

    // Per-call limits
    if let Some(capacity) = env_parse("AUDIO_QUEUE_CAPACITY")? {
        config.audio_queue_capacity = capacity;
    }
    if let Some(ms) = env_parse("START_TIMEOUT_MS")? {
        config.start_timeout_ms = ms;
    }
    if let Some(ms) = env_parse("DRAIN_TIMEOUT_MS")? {
        config.drain_timeout_ms = ms;
    }
    if let Some(secs) = env_parse("INITIATED_TTL_SECONDS")? {
        config.initiated_ttl_seconds = secs;
    }

    // Rate limiting
    if let Some(rps) = env_parse("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = env_parse("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup() {
        unsafe {
            env::remove_var("TLS_CERT_PATH");
            env::remove_var("TLS_KEY_PATH");
            env::remove_var("VAD_THRESHOLD");
            env::remove_var("OPENAI_REALTIME_VOICE");
            env::remove_var("REALTIME_INPUT_AUDIO_FORMAT");
        }
    }

    #[test]
    #[serial]
    fn test_tls_requires_both_paths() {
        cleanup();
        unsafe {
            env::set_var("TLS_CERT_PATH", "/etc/tls/cert.pem");
        }
        assert!(load_from_env().is_err());

        unsafe {
            env::set_var("TLS_KEY_PATH", "/etc/tls/key.pem");
        }
        let config = load_from_env().unwrap();
        assert_eq!(
            config.tls,
            Some(TlsConfig {
                cert_path: PathBuf::from("/etc/tls/cert.pem"),
                key_path: PathBuf::from("/etc/tls/key.pem"),
            })
        );
        cleanup();
    }

    #[test]
    #[serial]
    fn test_realtime_settings_from_env() {
        cleanup();
        unsafe {
            env::set_var("VAD_THRESHOLD", "0.7");
            env::set_var("OPENAI_REALTIME_VOICE", "coral");
            env::set_var("REALTIME_INPUT_AUDIO_FORMAT", "pcm16");
        }

        let config = load_from_env().unwrap();
        assert_eq!(config.realtime.vad_threshold, 0.7);
        assert_eq!(config.realtime.voice, OpenAIRealtimeVoice::Coral);
        assert_eq!(
            config.realtime.input_audio_format,
            OpenAIRealtimeAudioFormat::Pcm16
        );
        cleanup();
    }

    #[test]
    #[serial]
    fn test_blank_values_are_ignored() {
        cleanup();
        unsafe {
            env::set_var("VAD_THRESHOLD", "  ");
        }
        let config = load_from_env().unwrap();
        assert_eq!(config.realtime.vad_threshold, 0.5);
        cleanup();
    }
}
