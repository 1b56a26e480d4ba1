//! Configuration module for the voice relay
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading and merging
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::realtime::OpenAIRealtimeConfig;

mod env;
mod validation;
mod yaml;

/// Spoken before the media stream is connected.
pub const DEFAULT_GREETING: &str = "Thank you for calling the dental office. Please wait a moment while I connect you to our AI assistant, Echo.";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the relay, including:
/// - Server settings (host, port, TLS, public URL)
/// - Call-control settings (greeting)
/// - Realtime backend settings
/// - Collaborator endpoints
/// - Per-call limits and timeouts
/// - Rate limiting
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Public base URL the telephony platform uses to reach this server
    /// (e.g. `wss://relay.example.com`). When unset the media stream URL is
    /// derived from the webhook request's `Host` header.
    pub public_url: Option<String>,

    /// Text spoken to the caller before the media stream opens
    pub greeting: String,

    /// Realtime backend connection and session settings
    pub realtime: OpenAIRealtimeConfig,

    // Collaborators
    /// Summarization service endpoint (`POST {conversation_log}`)
    pub summary_service_url: String,
    /// Text-turn conversation service endpoint
    pub conversation_service_url: String,
    /// Request timeout for collaborator calls. The media socket of a finished
    /// call stays open until the summary request completes, so this also bounds
    /// how long the telephony side waits for the close.
    pub collaborator_timeout_seconds: u64,

    // Per-call limits
    /// Audio chunks buffered per call before new chunks are dropped
    pub audio_queue_capacity: usize,
    /// How long a media socket may stay open without a `start` frame
    pub start_timeout_ms: u64,
    /// How long to keep reading from the backend after commit
    pub drain_timeout_ms: u64,
    /// Sessions still waiting for their media socket after this long are evicted
    pub initiated_ttl_seconds: u64,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            tls: None,
            public_url: None,
            greeting: DEFAULT_GREETING.to_string(),
            realtime: OpenAIRealtimeConfig::default(),
            summary_service_url: "http://summary_service:5003/summarize".to_string(),
            conversation_service_url: "http://conversation_service:5002/conversation".to_string(),
            collaborator_timeout_seconds: 30,
            audio_queue_capacity: 512,
            start_timeout_ms: 10_000,
            drain_timeout_ms: 5_000,
            initiated_ttl_seconds: 120,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Missing variables fall back to defaults. The .env file is loaded in main.rs
    /// before this is called.
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let mut config = env::load_from_env()?;
        yaml_config.merge_into(&mut config)?;

        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_seconds)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn initiated_ttl(&self) -> Duration {
        Duration::from_secs(self.initiated_ttl_seconds)
    }

    /// Media stream URL to hand to the telephony platform.
    ///
    /// Uses the configured public URL, or `wss://{host}/media` built from the
    /// webhook request's `Host` header.
    pub fn media_stream_url(&self, request_host: Option<&str>) -> Option<String> {
        match (&self.public_url, request_host) {
            (Some(base), _) => Some(format!("{}/media", base.trim_end_matches('/'))),
            (None, Some(host)) => Some(format!("wss://{host}/media")),
            (None, None) => None,
        }
    }
}
