use serde::Deserialize;
use std::path::PathBuf;

use super::{ServerConfig, TlsConfig};
use crate::core::realtime::{OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8080
///   public_url: "wss://relay.example.com"
///   tls:
///     cert_path: "/etc/tls/cert.pem"
///     key_path: "/etc/tls/key.pem"
///
/// call:
///   greeting: "Thanks for calling."
///
/// realtime:
///   api_key: "sk-..."
///   url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview-2024-10-01"
///   voice: "alloy"
///   instructions: "You are a dental office receptionist."
///   input_audio_format: "g711_ulaw"
///   output_audio_format: "g711_ulaw"
///   transcription_model: "whisper-1"
///   transcription_language: "en"
///   vad_threshold: 0.5
///   vad_prefix_padding_ms: 300
///   vad_silence_duration_ms: 500
///
/// collaborators:
///   summary_url: "http://summary_service:5003/summarize"
///   conversation_url: "http://conversation_service:5002/conversation"
///   timeout_seconds: 30
///
/// limits:
///   audio_queue_capacity: 512
///   start_timeout_ms: 10000
///   drain_timeout_ms: 5000
///   initiated_ttl_seconds: 120
///
/// security:
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub call: Option<CallYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub collaborators: Option<CollaboratorsYaml>,
    pub limits: Option<LimitsYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Call-control settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CallYaml {
    pub greeting: Option<String>,
}

/// Realtime backend settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub input_audio_format: Option<String>,
    pub output_audio_format: Option<String>,
    pub transcription_model: Option<String>,
    pub transcription_language: Option<String>,
    pub vad_threshold: Option<f32>,
    pub vad_prefix_padding_ms: Option<u32>,
    pub vad_silence_duration_ms: Option<u32>,
}

/// Collaborator endpoints from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CollaboratorsYaml {
    pub summary_url: Option<String>,
    pub conversation_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Per-call limits from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LimitsYaml {
    pub audio_queue_capacity: Option<usize>,
    pub start_timeout_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub initiated_ttl_seconds: Option<u64>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// Maximum requests per second per IP
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }

    /// Apply every value present in the file on top of `config`.
    pub fn merge_into(self, config: &mut ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(server) = self.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(public_url) = server.public_url {
                config.public_url = Some(public_url);
            }
            if let Some(tls) = server.tls {
                config.tls = tls.into_config(config.tls.take())?;
            }
        }

        if let Some(greeting) = self.call.and_then(|c| c.greeting) {
            config.greeting = greeting;
        }

        if let Some(rt) = self.realtime {
            let realtime = &mut config.realtime;
            if let Some(key) = rt.api_key {
                realtime.api_key = key;
            }
            if let Some(url) = rt.url {
                realtime.url = url;
            }
            if let Some(model) = rt.model {
                realtime.model = model;
            }
            if let Some(voice) = rt.voice {
                realtime.voice = OpenAIRealtimeVoice::from_str_or_default(&voice);
            }
            if let Some(instructions) = rt.instructions {
                realtime.instructions = Some(instructions);
            }
            if let Some(format) = rt.input_audio_format {
                realtime.input_audio_format = OpenAIRealtimeAudioFormat::from_str_or_default(&format);
            }
            if let Some(format) = rt.output_audio_format {
                realtime.output_audio_format =
                    OpenAIRealtimeAudioFormat::from_str_or_default(&format);
            }
            if let Some(model) = rt.transcription_model {
                realtime.transcription_model = model;
            }
            if let Some(language) = rt.transcription_language {
                realtime.transcription_language = Some(language);
            }
            if let Some(threshold) = rt.vad_threshold {
                realtime.vad_threshold = threshold;
            }
            if let Some(ms) = rt.vad_prefix_padding_ms {
                realtime.vad_prefix_padding_ms = ms;
            }
            if let Some(ms) = rt.vad_silence_duration_ms {
                realtime.vad_silence_duration_ms = ms;
            }
        }

        if let Some(collaborators) = self.collaborators {
            if let Some(url) = collaborators.summary_url {
                config.summary_service_url = url;
            }
            if let Some(url) = collaborators.conversation_url {
                config.conversation_service_url = url;
            }
            if let Some(secs) = collaborators.timeout_seconds {
                config.collaborator_timeout_seconds = secs;
            }
        }

        if let Some(limits) = self.limits {
            if let Some(capacity) = limits.audio_queue_capacity {
                config.audio_queue_capacity = capacity;
            }
            if let Some(ms) = limits.start_timeout_ms {
                config.start_timeout_ms = ms;
            }
            if let Some(ms) = limits.drain_timeout_ms {
                config.drain_timeout_ms = ms;
            }
            if let Some(secs) = limits.initiated_ttl_seconds {
                config.initiated_ttl_seconds = secs;
            }
        }

        if let Some(security) = self.security {
            if let Some(rps) = security.rate_limit_requests_per_second {
                config.rate_limit_requests_per_second = rps;
            }
            if let Some(burst) = security.rate_limit_burst_size {
                config.rate_limit_burst_size = burst;
            }
        }

        Ok(())
    }
}

impl TlsYaml {
    /// Resolve the YAML TLS section against the TLS settings from the environment.
    fn into_config(
        self,
        from_env: Option<TlsConfig>,
    ) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
        if self.enabled == Some(false) {
            return Ok(None);
        }

        let cert_path = self
            .cert_path
            .map(PathBuf::from)
            .or_else(|| from_env.as_ref().map(|t| t.cert_path.clone()));
        let key_path = self
            .key_path
            .map(PathBuf::from)
            .or_else(|| from_env.as_ref().map(|t| t.key_path.clone()));

        match (cert_path, key_path) {
            (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
                cert_path,
                key_path,
            })),
            (None, None) if self.enabled != Some(true) => Ok(None),
            _ => Err("TLS requires both cert_path and key_path".into()),
        }
    }
}
