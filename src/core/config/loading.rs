//! Loads TOML configuration files and applies them over the defaults.

use super::file::ConfigFile;
use super::Config;
use crate::core::error::{AppError, Result};
use std::path::Path;
use std::time::Duration;

/// Reads and parses a TOML configuration file.
pub(crate) fn load_config_file(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!(
            "Cannot read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    toml::from_str(&contents).map_err(|e| {
        AppError::Config(format!(
            "Cannot parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Applies every value present in `file` onto `config`.
pub(crate) fn apply_file_config(config: &mut Config, file: &ConfigFile) {
    let smtp = &file.smtp;
    if let Some(ref v) = smtp.relay_host {
        config.smtp_relay_host = v.clone();
    }
    if let Some(v) = smtp.relay_port {
        config.smtp_relay_port = v;
    }
    if let Some(ref v) = smtp.auth_user {
        config.smtp_auth_user = Some(v.clone());
    }
    if let Some(ref v) = smtp.auth_password {
        config.smtp_auth_password = Some(v.clone());
    }
    if let Some(ref v) = smtp.helo_domain {
        config.smtp_helo_domain = v.clone();
    }
    if let Some(ref v) = smtp.from_domain {
        config.smtp_from_domain = v.clone();
    }
    if let Some(v) = smtp.connect_timeout {
        config.smtp_connect_timeout = Duration::from_secs(v);
    }
    if let Some(v) = smtp.smtp_timeout {
        config.smtp_timeout = Duration::from_secs(v);
    }
    if let Some(v) = smtp.enable_starttls {
        config.smtp_enable_starttls = v;
    }

    if let Some(v) = file.dns.dns_timeout {
        config.dns_timeout = Duration::from_secs(v);
    }
    if let Some(ref v) = file.dns.dns_servers {
        if !v.is_empty() {
            config.dns_servers = v.clone();
        }
    }

    let mailjet = &file.mailjet;
    if let Some(ref v) = mailjet.api_key {
        config.mailjet_api_key = Some(v.clone());
    }
    if let Some(ref v) = mailjet.secret_key {
        config.mailjet_secret_key = Some(v.clone());
    }
    if let Some(ref v) = mailjet.api_base {
        config.mailjet_api_base = v.clone();
    }
    if let Some(v) = mailjet.request_timeout {
        config.request_timeout = Duration::from_secs(v);
    }
    if let Some(v) = mailjet.connect_timeout {
        config.http_connect_timeout = Duration::from_secs(v);
    }
    if let Some(v) = mailjet.launch_max_retries {
        config.launch_max_retries = v;
    }
    if let Some(v) = mailjet.launch_retry_base_delay_ms {
        config.launch_retry_base_delay = Duration::from_millis(v);
    }
    if let Some(v) = mailjet.poll_initial_wait {
        config.poll_initial_wait = Duration::from_secs(v);
    }
    if let Some(v) = mailjet.poll_interval {
        config.poll_interval = Duration::from_secs(v);
    }
    if let Some(v) = mailjet.poll_max_attempts {
        config.poll_max_attempts = v;
    }

    if let Some(ref v) = file.cache.path {
        config.cache_path = v.clone();
    }
    if let Some(v) = file.cache.ttl {
        config.cache_ttl = Duration::from_secs(v);
    }

    if let Some(ref v) = file.server.listen_addr {
        config.listen_addr = v.clone();
    }
    if let Some(v) = file.server.max_execution_time {
        config.max_execution_time = Duration::from_secs(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            [smtp]
            relay_host = "smtp.test.invalid"
            relay_port = 2525
            enable_starttls = false

            [mailjet]
            poll_max_attempts = 10
            launch_retry_base_delay_ms = 250

            [cache]
            ttl = 60
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        apply_file_config(&mut config, &file);

        assert_eq!(config.smtp_relay_host, "smtp.test.invalid");
        assert_eq!(config.smtp_relay_port, 2525);
        assert!(!config.smtp_enable_starttls);
        assert_eq!(config.poll_max_attempts, 10);
        assert_eq!(config.launch_retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        // Untouched values keep their defaults.
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: std::result::Result<ConfigFile, _> =
            toml::from_str("[smtp]\nbogus_field = 1\n");
        assert!(parsed.is_err());
    }
}
