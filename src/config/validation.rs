use url::Url;

use super::ServerConfig;

/// Validate a merged configuration.
///
/// # Errors
/// Returns an error naming the first invalid setting.
pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.audio_queue_capacity == 0 {
        return Err("audio_queue_capacity must be greater than zero".into());
    }
    if config.start_timeout_ms == 0 {
        return Err("start_timeout_ms must be greater than zero".into());
    }
    if config.drain_timeout_ms == 0 {
        return Err("drain_timeout_ms must be greater than zero".into());
    }
    if config.collaborator_timeout_seconds == 0 {
        return Err("collaborator_timeout_seconds must be greater than zero".into());
    }
    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err("rate limit values must be greater than zero".into());
    }
    if !(0.0..=1.0).contains(&config.realtime.vad_threshold) {
        return Err(format!(
            "vad_threshold must be between 0.0 and 1.0, got {}",
            config.realtime.vad_threshold
        )
        .into());
    }

    validate_url("realtime url", &config.realtime.url, &["ws", "wss"])?;
    validate_url("summary_service_url", &config.summary_service_url, &["http", "https"])?;
    validate_url(
        "conversation_service_url",
        &config.conversation_service_url,
        &["http", "https"],
    )?;
    if let Some(public_url) = &config.public_url {
        validate_url("public_url", public_url, &["ws", "wss"])?;
    }

    Ok(())
}

fn validate_url(name: &str, value: &str, schemes: &[&str]) -> Result<(), String> {
    let url = Url::parse(value).map_err(|e| format!("Invalid {name} '{value}': {e}"))?;
    if !schemes.contains(&url.scheme()) {
        return Err(format!(
            "Invalid {name} '{value}': scheme must be one of {}",
            schemes.join(", ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = ServerConfig {
            drain_timeout_ms: 0,
            ..Default::default()
        };
        assert!(validate(&config).unwrap_err().to_string().contains("drain_timeout_ms"));

        let config = ServerConfig {
            start_timeout_ms: 0,
            ..Default::default()
        };
        assert!(validate(&config).unwrap_err().to_string().contains("start_timeout_ms"));
    }

    #[test]
    fn test_bad_urls_rejected() {
        let config = ServerConfig {
            summary_service_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(validate(&config).is_err());

        let config = ServerConfig {
            public_url: Some("https://relay.example.com".to_string()),
            ..Default::default()
        };
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("public_url"));
    }

    #[test]
    fn test_vad_threshold_range() {
        let mut config = ServerConfig::default();
        config.realtime.vad_threshold = 1.5;
        assert!(validate(&config).is_err());
    }
}
