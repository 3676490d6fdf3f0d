//! Defines the core runtime `Config` struct, its defaults, and related
//! utilities. Submodules handle loading, building, and validation.

pub(crate) mod builder;
pub(crate) mod file;
pub(crate) mod loading;
pub(crate) mod validation;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use regex::Regex;
use std::time::Duration;

/// Runtime configuration settings used by the email-sentinel core logic.
#[derive(Clone)]
pub struct Config {
    /// SMTP relay the prober connects through (never the target's own MX).
    pub smtp_relay_host: String,
    pub smtp_relay_port: u16,
    /// Relay credentials for AUTH LOGIN; absence skips authentication.
    pub smtp_auth_user: Option<String>,
    pub smtp_auth_password: Option<String>,
    /// Domain announced in EHLO.
    pub smtp_helo_domain: String,
    /// Domain of the probe sender identity (`verification@<domain>`).
    pub smtp_from_domain: String,
    /// Timeout for the initial TCP connect.
    pub smtp_connect_timeout: Duration,
    /// Timeout for each command/reply round trip.
    pub smtp_timeout: Duration,
    /// Attempt the STARTTLS upgrade when the relay advertises it.
    pub smtp_enable_starttls: bool,

    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,

    /// Verification API credentials (key / secret, basic auth).
    pub mailjet_api_key: Option<String>,
    pub mailjet_secret_key: Option<String>,
    /// Base URL of the verification REST API.
    pub mailjet_api_base: String,
    /// Per-request HTTP timeout for API calls.
    pub request_timeout: Duration,
    pub http_connect_timeout: Duration,

    /// Attempt budget for launching the verification job.
    pub launch_max_retries: u32,
    /// Base delay of the launch backoff; doubles per attempt.
    pub launch_retry_base_delay: Duration,

    /// Settle time before the first job status poll.
    pub poll_initial_wait: Duration,
    /// Steady-state delay between polls.
    pub poll_interval: Duration,
    /// Polling attempt budget before reporting a timeout.
    pub poll_max_attempts: u32,

    pub cache_path: String,
    pub cache_ttl: Duration,

    /// Bind address of the SSE server.
    pub listen_addr: String,
    /// Hard wall-clock ceiling for one verification request.
    pub max_execution_time: Duration,

    pub email_regex: Regex,
    pub max_email_length: usize,

    pub loaded_config_path: Option<String>,
}

impl Config {
    fn build_default() -> Self {
        let email_regex_pattern = r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$";
        let email_regex = Regex::new(email_regex_pattern)
            .expect("Default email regex pattern failed to compile. This is a bug.");
        let dns_servers = vec![
            "8.8.8.8".to_string(),
            "8.8.4.4".to_string(),
            "1.1.1.1".to_string(),
            "1.0.0.1".to_string(),
        ];

        Config {
            smtp_relay_host: "in-v3.mailjet.com".to_string(),
            smtp_relay_port: 587,
            smtp_auth_user: None,
            smtp_auth_password: None,
            smtp_helo_domain: "example.com".to_string(),
            smtp_from_domain: "example.com".to_string(),
            smtp_connect_timeout: Duration::from_secs(10),
            smtp_timeout: Duration::from_secs(10),
            smtp_enable_starttls: true,
            dns_timeout: Duration::from_secs(5),
            dns_servers,
            mailjet_api_key: None,
            mailjet_secret_key: None,
            mailjet_api_base: "https://api.mailjet.com/v3/REST".to_string(),
            request_timeout: Duration::from_secs(30),
            http_connect_timeout: Duration::from_secs(5),
            launch_max_retries: 3,
            launch_retry_base_delay: Duration::from_secs(1),
            poll_initial_wait: Duration::from_secs(20),
            poll_interval: Duration::from_secs(5),
            poll_max_attempts: 120,
            cache_path: "email_cache.json".to_string(),
            cache_ttl: Duration::from_secs(600),
            listen_addr: "127.0.0.1:3000".to_string(),
            max_execution_time: Duration::from_secs(300),
            email_regex,
            max_email_length: 254,
            loaded_config_path: None,
        }
    }

    /// True when both verification API credentials are present.
    pub fn has_api_credentials(&self) -> bool {
        self.mailjet_api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty())
            && self
                .mailjet_secret_key
                .as_deref()
                .is_some_and(|k| !k.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::build_default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            match value {
                Some(_) => "<redacted>",
                None => "<unset>",
            }
        }

        f.debug_struct("Config")
            .field("smtp_relay_host", &self.smtp_relay_host)
            .field("smtp_relay_port", &self.smtp_relay_port)
            .field("smtp_auth_user", &self.smtp_auth_user)
            .field("smtp_auth_password", &redact(&self.smtp_auth_password))
            .field("smtp_helo_domain", &self.smtp_helo_domain)
            .field("smtp_from_domain", &self.smtp_from_domain)
            .field("smtp_connect_timeout", &self.smtp_connect_timeout)
            .field("smtp_timeout", &self.smtp_timeout)
            .field("smtp_enable_starttls", &self.smtp_enable_starttls)
            .field("dns_timeout", &self.dns_timeout)
            .field("dns_servers_count", &self.dns_servers.len())
            .field("mailjet_api_key", &redact(&self.mailjet_api_key))
            .field("mailjet_secret_key", &redact(&self.mailjet_secret_key))
            .field("mailjet_api_base", &self.mailjet_api_base)
            .field("request_timeout", &self.request_timeout)
            .field("http_connect_timeout", &self.http_connect_timeout)
            .field("launch_max_retries", &self.launch_max_retries)
            .field("launch_retry_base_delay", &self.launch_retry_base_delay)
            .field("poll_initial_wait", &self.poll_initial_wait)
            .field("poll_interval", &self.poll_interval)
            .field("poll_max_attempts", &self.poll_max_attempts)
            .field("cache_path", &self.cache_path)
            .field("cache_ttl", &self.cache_ttl)
            .field("listen_addr", &self.listen_addr)
            .field("max_execution_time", &self.max_execution_time)
            .field("email_regex", &self.email_regex.as_str())
            .field("max_email_length", &self.max_email_length)
            .field("loaded_config_path", &self.loaded_config_path)
            .finish()
    }
}
