use crate::config::types::{Config, CrawlerConfig, SiteConfig, TargetConfig};
use crate::ConfigError;
use url::Url;

const MAX_USERNAME_LEN: usize = 30;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target_config(&config.target)?;
    validate_crawler_config(&config.crawler)?;
    validate_site_config(&config.site)?;
    Ok(())
}

/// Validates the crawl target
fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    if config.username.is_empty() {
        return Err(ConfigError::Validation(
            "username cannot be empty".to_string(),
        ));
    }

    if config.username.len() > MAX_USERNAME_LEN {
        return Err(ConfigError::Validation(format!(
            "username must be at most {} characters, got {}",
            MAX_USERNAME_LEN,
            config.username.len()
        )));
    }

    if !config
        .username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "username must contain only letters, digits, periods and underscores, got '{}'",
            config.username
        )));
    }

    if config.after < 0 {
        return Err(ConfigError::Validation(format!(
            "after must be a non-negative unix timestamp, got {}",
            config.after
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.page_size < 1 || config.page_size > 50 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 50, got {}",
            config.page_size
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates site endpoints
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use an http or https scheme",
            config.base_url
        )));
    }

    Ok(())
}
