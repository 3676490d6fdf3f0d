//! Defines the result types for SMTP probe operations.

use serde::Serialize;

/// Broad status of an SMTP probe, derived from the reply codes observed
/// during the `MAIL FROM` / `RCPT TO` / `DATA` exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The recipient was accepted (250/251).
    Valid,
    /// Transient failure (450/451/452); retrying later may succeed.
    TemporaryError,
    /// Permanent rejection of the recipient (501/550/551/553).
    Invalid,
    /// Transaction-level policy rejection (554).
    Rejected,
    /// A reply code outside the known sets.
    UnknownError,
    /// RCPT was accepted but the follow-up `DATA` probe was bounced with
    /// blocking language; the acceptance is likely masking enumeration.
    PotentialHardBounce,
    /// The relay refused our own sender identity (MAIL FROM 550/553). Says
    /// nothing about the target address.
    SenderRejected,
    /// The dialogue never completed (connect/read/write failure).
    ConnectionError,
}

/// How much weight to give the probe verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    VeryLow,
    Low,
    Medium,
    High,
}

/// Outcome of the non-committing `DATA` probe issued after a provisional
/// RCPT acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOutcome {
    /// RCPT was not accepted, so `DATA` was never sent.
    NotAttempted,
    /// The server answered 354; the transaction was immediately `RSET`.
    Accepted,
    /// The server refused `DATA`; carries the raw rejection line.
    Rejected(String),
}

/// Represents the outcome of a single SMTP probe attempt for an email
/// address. Immutable once built; the prober performs no retries itself.
#[derive(Debug, Clone, Serialize)]
pub struct SmtpProbeResult {
    /// SMTP reply code of the decisive command (usually RCPT TO).
    pub code: u16,
    /// Extended status code extracted from the reply text, e.g. "5.1.1".
    pub extended_code: Option<String>,
    /// Raw server reply line(s).
    pub response: String,
    /// True when a `DATA` probe was issued after RCPT acceptance.
    pub data_test_performed: bool,
    /// True when the `DATA` probe was answered with 354.
    pub data_test_accepted: bool,
    /// Classified status.
    pub status: ProbeStatus,
    /// Confidence attached to the classification.
    pub confidence: Confidence,
    /// Free-form classification tag, e.g. `mailbox_not_found`.
    pub probable_cause: &'static str,
    /// True only for a trusted acceptance.
    pub success: bool,
    /// Suggests a later retry might yield a different result (4xx replies).
    pub needs_retry: bool,
    /// Optional caveat attached to the verdict (e.g. DATA-stage rejection).
    pub warning: Option<String>,
}

impl SmtpProbeResult {
    /// Creates a result for a dialogue that never reached RCPT because the
    /// connection itself failed.
    pub fn connection_error(message: String) -> Self {
        Self {
            code: 0,
            extended_code: None,
            response: message,
            data_test_performed: false,
            data_test_accepted: false,
            status: ProbeStatus::ConnectionError,
            confidence: Confidence::VeryLow,
            probable_cause: "connection_failed",
            success: false,
            needs_retry: false,
            warning: None,
        }
    }

    /// Creates a result for a relay that refused our sender identity at
    /// MAIL FROM. Distinct from recipient rejections: no RCPT was issued.
    pub fn sender_rejected(code: u16, response: String) -> Self {
        Self {
            code,
            extended_code: super::classify::extract_extended_code(&response),
            response,
            data_test_performed: false,
            data_test_accepted: false,
            status: ProbeStatus::SenderRejected,
            confidence: Confidence::VeryLow,
            probable_cause: "sender_identity_refused",
            success: false,
            needs_retry: false,
            warning: None,
        }
    }

    /// True when the orchestrator must stop the pipeline on this result.
    ///
    /// This is the canonical union of the fatal code sets: syntax rejections
    /// (501), recipient-unknown rejections (550/551/553) and transaction
    /// rejections (554) all map to `Invalid` or `Rejected`.
    pub fn is_fatal(&self) -> bool {
        matches!(self.status, ProbeStatus::Invalid | ProbeStatus::Rejected)
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProbeStatus::Valid => "valid",
            ProbeStatus::TemporaryError => "temporary_error",
            ProbeStatus::Invalid => "invalid",
            ProbeStatus::Rejected => "rejected",
            ProbeStatus::UnknownError => "unknown_error",
            ProbeStatus::PotentialHardBounce => "potential_hard_bounce",
            ProbeStatus::SenderRejected => "sender_rejected",
            ProbeStatus::ConnectionError => "connection_error",
        };
        write!(f, "{}", s)
    }
}
