//! Configuration validation utilities.

use skiff_framework::cache::MAX_CAPACITY;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, CacheConfig, LogOutput, LoggingConfig, PollingConfig, RetryConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &super::schema::SkiffConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_polling_config(&config.polling)?;
    validate_cache_config(&config.cache)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.token.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.token"));
    }

    if bot.token.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation("Bot token cannot contain whitespace"));
    }

    validate_url(&bot.api_url)
}

fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::invalid_url(url, "URL cannot be empty"));
    }

    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ConfigError::invalid_url(url, "URL must include a scheme"));
    };

    if scheme != "http" && scheme != "https" {
        return Err(ConfigError::invalid_url(
            url,
            format!("Expected scheme http or https, got {scheme}"),
        ));
    }

    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::invalid_url(url, "URL must include a host"));
    }

    Ok(())
}

fn validate_polling_config(polling: &PollingConfig) -> ConfigResult<()> {
    if polling.poll_time_secs == 0 {
        return Err(ConfigError::validation("Poll time must be greater than 0"));
    }

    if polling.request_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "Request timeout must be greater than 0",
        ));
    }

    validate_retry_config(&polling.retry)
}

fn validate_retry_config(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

fn validate_cache_config(cache: &CacheConfig) -> ConfigResult<()> {
    if cache.enabled && cache.capacity == 0 {
        return Err(ConfigError::validation(
            "Cache capacity must be greater than 0",
        ));
    }

    if cache.enabled && cache.capacity > MAX_CAPACITY {
        return Err(ConfigError::validation(format!(
            "Cache capacity must be at most {MAX_CAPACITY}"
        )));
    }

    if cache.enabled && cache.ttl_secs == 0 {
        return Err(ConfigError::validation("Cache TTL must be greater than 0"));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::SkiffConfig;

    fn valid() -> SkiffConfig {
        let mut config = SkiffConfig::default();
        config.bot.token = "001.0123456789.0123456789:1234567890".to_string();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_missing_token() {
        let config = SkiffConfig::default();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "bot.token"
        ));
    }

    #[test]
    fn test_invalid_url() {
        for url in ["", "api.icq.net/bot/v1", "ftp://host", "https://"] {
            let mut config = valid();
            config.bot.api_url = url.to_string();
            assert!(
                matches!(validate_config(&config), Err(ConfigError::InvalidUrl { .. })),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_retry_bounds() {
        let mut config = valid();
        config.polling.retry.max_delay_ms = 10;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.polling.retry.backoff_multiplier = 0.5;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.polling.poll_time_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = valid();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("bot.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_disabled_cache_skips_bounds() {
        let mut config = valid();
        config.cache.enabled = false;
        config.cache.capacity = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_cache_capacity_ceiling() {
        let mut config = valid();
        config.cache.capacity = MAX_CAPACITY;
        assert!(validate_config(&config).is_ok());
        config.cache.capacity = MAX_CAPACITY + 1;
        assert!(validate_config(&config).is_err());
    }
}
