//! Defines the structure mirroring the TOML configuration file format.

use serde::Deserialize;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub(crate) smtp: SmtpConfig,
    #[serde(default)]
    pub(crate) dns: DnsConfig,
    #[serde(default)]
    pub(crate) mailjet: MailjetConfig,
    #[serde(default)]
    pub(crate) cache: CacheConfig,
    #[serde(default)]
    pub(crate) server: ServerConfig,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct SmtpConfig {
    pub(crate) relay_host: Option<String>,
    pub(crate) relay_port: Option<u16>,
    pub(crate) auth_user: Option<String>,
    pub(crate) auth_password: Option<String>,
    pub(crate) helo_domain: Option<String>,
    pub(crate) from_domain: Option<String>,
    pub(crate) connect_timeout: Option<u64>,
    pub(crate) smtp_timeout: Option<u64>,
    pub(crate) enable_starttls: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct DnsConfig {
    pub(crate) dns_timeout: Option<u64>,
    pub(crate) dns_servers: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct MailjetConfig {
    pub(crate) api_key: Option<String>,
    pub(crate) secret_key: Option<String>,
    pub(crate) api_base: Option<String>,
    pub(crate) request_timeout: Option<u64>,
    pub(crate) connect_timeout: Option<u64>,
    pub(crate) launch_max_retries: Option<u32>,
    pub(crate) launch_retry_base_delay_ms: Option<u64>,
    pub(crate) poll_initial_wait: Option<u64>,
    pub(crate) poll_interval: Option<u64>,
    pub(crate) poll_max_attempts: Option<u32>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct CacheConfig {
    pub(crate) path: Option<String>,
    pub(crate) ttl: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServerConfig {
    pub(crate) listen_addr: Option<String>,
    pub(crate) max_execution_time: Option<u64>,
}
