//! Provides the `ConfigBuilder` for fluent configuration construction.

use super::loading::{apply_file_config, load_config_file};
use super::validation::validate_config;
use super::{Config, ConfigFile};
use crate::core::error::Result;
use std::time::Duration;

/// Builder pattern for creating `Config` instances fluently.
///
/// This is the primary way callers should create a `Config` object. It
/// handles loading from files, applying overrides, and validation.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    overrides: ConfigFile,
}

impl ConfigBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify an optional configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    pub fn smtp_relay_host(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.relay_host = Some(value.into());
        self
    }
    pub fn smtp_relay_port(mut self, value: u16) -> Self {
        self.overrides.smtp.relay_port = Some(value);
        self
    }
    pub fn smtp_auth_user(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.auth_user = Some(value.into());
        self
    }
    pub fn smtp_auth_password(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.auth_password = Some(value.into());
        self
    }
    pub fn smtp_helo_domain(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.helo_domain = Some(value.into());
        self
    }
    pub fn smtp_from_domain(mut self, value: impl Into<String>) -> Self {
        self.overrides.smtp.from_domain = Some(value.into());
        self
    }
    pub fn smtp_connect_timeout(mut self, duration: Duration) -> Self {
        self.overrides.smtp.connect_timeout = Some(duration.as_secs());
        self
    }
    pub fn smtp_timeout(mut self, duration: Duration) -> Self {
        self.overrides.smtp.smtp_timeout = Some(duration.as_secs());
        self
    }
    pub fn smtp_enable_starttls(mut self, enable: bool) -> Self {
        self.overrides.smtp.enable_starttls = Some(enable);
        self
    }
    pub fn dns_timeout(mut self, duration: Duration) -> Self {
        self.overrides.dns.dns_timeout = Some(duration.as_secs());
        self
    }
    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.overrides.dns.dns_servers = Some(servers);
        self
    }
    pub fn mailjet_api_key(mut self, value: impl Into<String>) -> Self {
        self.overrides.mailjet.api_key = Some(value.into());
        self
    }
    pub fn mailjet_secret_key(mut self, value: impl Into<String>) -> Self {
        self.overrides.mailjet.secret_key = Some(value.into());
        self
    }
    pub fn mailjet_api_base(mut self, value: impl Into<String>) -> Self {
        self.overrides.mailjet.api_base = Some(value.into());
        self
    }
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.overrides.mailjet.request_timeout = Some(duration.as_secs());
        self
    }
    pub fn launch_max_retries(mut self, value: u32) -> Self {
        self.overrides.mailjet.launch_max_retries = Some(value);
        self
    }
    pub fn poll_initial_wait(mut self, duration: Duration) -> Self {
        self.overrides.mailjet.poll_initial_wait = Some(duration.as_secs());
        self
    }
    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.overrides.mailjet.poll_interval = Some(duration.as_secs());
        self
    }
    pub fn poll_max_attempts(mut self, value: u32) -> Self {
        self.overrides.mailjet.poll_max_attempts = Some(value);
        self
    }
    pub fn cache_path(mut self, value: impl Into<String>) -> Self {
        self.overrides.cache.path = Some(value.into());
        self
    }
    pub fn cache_ttl(mut self, duration: Duration) -> Self {
        self.overrides.cache.ttl = Some(duration.as_secs());
        self
    }
    pub fn listen_addr(mut self, value: impl Into<String>) -> Self {
        self.overrides.server.listen_addr = Some(value.into());
        self
    }
    pub fn max_execution_time(mut self, duration: Duration) -> Self {
        self.overrides.server.max_execution_time = Some(duration.as_secs());
        self
    }

    /// Builds the final `Config` object, applying defaults, file settings,
    /// overrides, and validation.
    pub fn build(mut self) -> Result<Config> {
        let mut loaded_path: Option<String> = None;

        if let Some(ref path) = self.config_file_path {
            let file_config = load_config_file(path)?;
            apply_file_config(&mut self.config, &file_config);
            loaded_path = Some(path.clone());
            tracing::info!("Loaded base configuration from file: {}", path);
        }

        apply_file_config(&mut self.config, &self.overrides);
        self.config.loaded_config_path = loaded_path;

        validate_config(&self.config)?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_defaults() {
        let config = ConfigBuilder::new()
            .smtp_relay_host("relay.test.invalid")
            .poll_max_attempts(7)
            .cache_ttl(Duration::from_secs(120))
            .build()
            .unwrap();

        assert_eq!(config.smtp_relay_host, "relay.test.invalid");
        assert_eq!(config.poll_max_attempts, 7);
        assert_eq!(config.cache_ttl, Duration::from_secs(120));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(ConfigBuilder::new().poll_max_attempts(0).build().is_err());
        assert!(ConfigBuilder::new()
            .mailjet_api_base("not a url")
            .build()
            .is_err());
        assert!(ConfigBuilder::new().smtp_from_domain("a@b").build().is_err());
    }
}
