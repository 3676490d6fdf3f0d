//! DNS utilities: resolver construction and MX resolution.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};

use std::net::IpAddr;
use trust_dns_resolver::config::{
    NameServerConfigGroup, ResolverConfig, ResolverOpts,
};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

/// One mail exchanger for a domain, ordered by preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailExchanger {
    /// Hostname of the exchanger, without the trailing dot.
    pub exchange: String,
    /// MX preference value (lower is preferred).
    pub preference: u16,
}

/// Builds the shared Tokio DNS resolver from the configured nameservers.
pub async fn create_resolver(config: &Config) -> Result<TokioAsyncResolver> {
    let ips: Vec<IpAddr> = config
        .dns_servers
        .iter()
        .filter_map(|s| s.parse::<IpAddr>().ok())
        .collect();

    if ips.is_empty() {
        return Err(AppError::Config(format!(
            "No usable DNS server addresses in configuration: {:?}",
            config.dns_servers
        )));
    }

    let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
    let resolver_config = ResolverConfig::from_parts(None, vec![], group);

    let mut opts = ResolverOpts::default();
    opts.timeout = config.dns_timeout;
    opts.attempts = 2;

    tracing::debug!("DNS resolver initialized with {} upstream server(s)", ips.len());
    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}

/// Resolves the MX records for `domain`, sorted by preference.
///
/// Distinguishes NXDOMAIN, no-records and timeout failures so the pipeline
/// can word its terminal verdict precisely.
pub async fn resolve_mx(
    resolver: &TokioAsyncResolver,
    domain: &str,
) -> Result<Vec<MailExchanger>> {
    tracing::debug!(target: "pipeline_task", "Resolving MX records for {}", domain);

    let lookup = resolver
        .mx_lookup(domain)
        .await
        .map_err(|e| translate_resolve_error(e, domain))?;

    let mut exchangers: Vec<MailExchanger> = lookup
        .iter()
        .map(|mx| MailExchanger {
            exchange: mx.exchange().to_utf8().trim_end_matches('.').to_string(),
            preference: mx.preference(),
        })
        .collect();

    if exchangers.is_empty() {
        return Err(AppError::NoDnsRecords(domain.to_string()));
    }

    exchangers.sort_by_key(|mx| mx.preference);
    tracing::info!(target: "pipeline_task",
        "Found {} mail exchanger(s) for {}: {}",
        exchangers.len(),
        domain,
        exchangers
            .iter()
            .map(|m| m.exchange.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(exchangers)
}

fn translate_resolve_error(error: ResolveError, domain: &str) -> AppError {
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            if *response_code == ResponseCode::NXDomain {
                AppError::NxDomain(domain.to_string())
            } else {
                AppError::NoDnsRecords(domain.to_string())
            }
        }
        ResolveErrorKind::Timeout => AppError::DnsTimeout(domain.to_string()),
        _ => AppError::Dns(error),
    }
}
