//! Validates an assembled `Config` before it is handed to the application.

use super::Config;
use crate::core::error::{AppError, Result};
use url::Url;

/// Checks the invariants a usable configuration must satisfy. Missing API
/// credentials are only warned about here: the verification client fails
/// fast at call time, and the SMTP-only stages still work without them.
pub(crate) fn validate_config(config: &Config) -> Result<()> {
    if config.smtp_relay_host.trim().is_empty() {
        return Err(AppError::Config(
            "smtp.relay_host must not be empty".to_string(),
        ));
    }
    if config.smtp_relay_port == 0 {
        return Err(AppError::Config(
            "smtp.relay_port must be a valid TCP port".to_string(),
        ));
    }
    if config.smtp_from_domain.trim().is_empty() || config.smtp_from_domain.contains('@') {
        return Err(AppError::Config(format!(
            "smtp.from_domain must be a bare domain, got '{}'",
            config.smtp_from_domain
        )));
    }
    if config.smtp_helo_domain.trim().is_empty() {
        return Err(AppError::Config(
            "smtp.helo_domain must not be empty".to_string(),
        ));
    }

    if config.dns_servers.is_empty() {
        return Err(AppError::Config(
            "dns.dns_servers must list at least one server".to_string(),
        ));
    }

    Url::parse(&config.mailjet_api_base).map_err(|e| {
        AppError::Config(format!(
            "mailjet.api_base is not a valid URL ('{}'): {}",
            config.mailjet_api_base, e
        ))
    })?;

    if config.launch_max_retries == 0 {
        return Err(AppError::Config(
            "mailjet.launch_max_retries must be at least 1".to_string(),
        ));
    }
    if config.poll_max_attempts == 0 {
        return Err(AppError::Config(
            "mailjet.poll_max_attempts must be at least 1".to_string(),
        ));
    }

    if config.cache_ttl.is_zero() {
        return Err(AppError::Config(
            "cache.ttl must be greater than zero".to_string(),
        ));
    }
    if config.cache_path.trim().is_empty() {
        return Err(AppError::Config("cache.path must not be empty".to_string()));
    }

    config
        .listen_addr
        .parse::<std::net::SocketAddr>()
        .map_err(|e| {
            AppError::Config(format!(
                "server.listen_addr is not a valid socket address ('{}'): {}",
                config.listen_addr, e
            ))
        })?;

    if config.max_email_length < 3 {
        return Err(AppError::Config(
            "max_email_length is too small to hold any address".to_string(),
        ));
    }

    if !config.has_api_credentials() {
        tracing::warn!(
            "Verification API credentials are not configured; the third-party \
             verification stage will be reported as unavailable."
        );
    }

    Ok(())
}
