//! Defines the custom error types for the email-sentinel application.

use std::{io, net::AddrParseError};
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for the email verification process.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error initializing necessary components (e.g., clients, resolvers).
    #[error("Initialization Error: {0}")]
    Initialization(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// Error during DNS resolution.
    #[error("DNS Resolution Error: {0}")]
    Dns(#[from] trust_dns_resolver::error::ResolveError),

    /// Specific DNS error indicating the domain does not exist.
    #[error("Domain Not Found (NXDOMAIN): {0}")]
    NxDomain(String),

    /// Specific DNS error indicating no relevant records were found.
    #[error("No DNS Records Found (MX): {0}")]
    NoDnsRecords(String),

    /// DNS operation timed out.
    #[error("DNS Timeout for domain: {0}")]
    DnsTimeout(String),

    /// Error parsing an IP address or socket address.
    #[error("Address Parsing Error: {0}")]
    AddrParse(#[from] AddrParseError),

    /// The verification API credentials are absent from the configuration.
    #[error("Missing verification API credentials (api key / secret key)")]
    MissingCredentials,

    /// A verification API call failed. Carries the operation code, the HTTP
    /// status when one was received, and the remote message for diagnostics.
    #[error("Verification API Error [{code}] (HTTP {status:?}): {message}")]
    MailjetApi {
        /// Stable operation identifier, e.g. `LIST_CREATION_ERROR`.
        code: &'static str,
        /// HTTP status of the failed call, if the request got that far.
        status: Option<u16>,
        /// Remote error body or transport error text.
        message: String,
    },

    /// The verification API answered 2xx but the payload was missing an
    /// expected field.
    #[error("Unexpected verification API response: missing {0}")]
    InvalidApiResponse(&'static str),

    /// The remote verification job reached the `Error` terminal state.
    #[error("Verification job failed: {0}")]
    JobFailed(String),

    /// Polling the remote verification job exhausted the attempt budget.
    #[error("Verification job polling timed out after {0} attempts")]
    PollingTimeout(u32),

    /// Error related to concurrency or task execution.
    #[error("Task Execution Error: {0}")]
    Task(String),

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    /// True when the error is the polling-exhaustion terminal condition,
    /// which callers report differently from a remote job error.
    pub fn is_polling_timeout(&self) -> bool {
        matches!(self, AppError::PollingTimeout(_))
    }

    /// HTTP status attached to a verification API error, when present.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AppError::MailjetApi { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
