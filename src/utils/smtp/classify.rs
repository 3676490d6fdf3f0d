//! Pure classification of SMTP replies into a structured probe result.
//!
//! No I/O happens here: the same (code, text, data outcome) triple always
//! yields the same verdict, which keeps the heuristics unit-testable away
//! from any live relay.

use super::result::{Confidence, DataOutcome, ProbeStatus, SmtpProbeResult};
use once_cell::sync::Lazy;
use regex::Regex;

static EXTENDED_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d\.\d{1,3}\.\d{1,3})\b").expect("extended code regex"));

/// Terms that make a 250/251 acceptance suspicious: the server took the
/// recipient but its wording hints at deferred or conditional handling.
static SUSPICIOUS_ACCEPT_TERMS: &[&str] = &[
    "verify",
    "confirm",
    "pending",
    "review",
    "monitored",
    "delayed",
    "filtered",
    "quarantine",
    "greylist",
];

/// Terms in a DATA-stage rejection that indicate a hard block rather than a
/// transient hiccup.
static HARD_BOUNCE_TERMS: &[&str] = &[
    "blocked",
    "denied",
    "blacklist",
    "spam",
    "banned",
    "abuse",
    "poor reputation",
    "not allowed",
];

/// 4xx wording that points at a mailbox still being provisioned or a
/// greylisting pass rather than a storage problem.
static MAILBOX_CREATING_TERMS: &[&str] = &[
    "being created",
    "in process of being created",
    "greylisted",
    "greylisting",
    "try again later",
    "try later",
    "temporarily deferred",
];

/// 5xx wording that points at a full mailbox rather than a missing one.
static MAILBOX_FULL_TERMS: &[&str] = &[
    "quota",
    "full",
    "over limit",
    "insufficient storage",
    "storage",
];

/// Extracts an RFC 3463 extended status code (`x.y.z`) from a reply line.
pub(crate) fn extract_extended_code(response: &str) -> Option<String> {
    EXTENDED_CODE_RE
        .captures(response)
        .map(|c| c[1].to_string())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Classifies the decisive RCPT reply plus the DATA probe outcome into a
/// [`SmtpProbeResult`].
///
/// The rule ordering matters: a naive reading of RCPT 250 alone over-reports
/// validity on servers that accept every recipient and only bounce at the
/// content stage, so the DATA outcome can downgrade or invert an acceptance.
pub fn classify(code: u16, response: &str, data: &DataOutcome) -> SmtpProbeResult {
    let extended_code = extract_extended_code(response);
    let lower = response.to_lowercase();

    let (data_test_performed, data_test_accepted) = match data {
        DataOutcome::NotAttempted => (false, false),
        DataOutcome::Accepted => (true, true),
        DataOutcome::Rejected(_) => (true, false),
    };

    let base = SmtpProbeResult {
        code,
        extended_code,
        response: response.to_string(),
        data_test_performed,
        data_test_accepted,
        status: ProbeStatus::UnknownError,
        confidence: Confidence::VeryLow,
        probable_cause: "unrecognized_reply",
        success: false,
        needs_retry: false,
        warning: None,
    };

    match code {
        250 | 251 => classify_acceptance(base, &lower, data),
        450 | 451 | 452 => SmtpProbeResult {
            status: ProbeStatus::TemporaryError,
            confidence: Confidence::Low,
            probable_cause: if contains_any(&lower, MAILBOX_CREATING_TERMS) {
                "mailbox_being_created"
            } else {
                "mailbox_temporary_issue"
            },
            success: false,
            needs_retry: true,
            ..base
        },
        550 | 551 | 553 => {
            let probable_cause = if base.extended_code.as_deref() == Some("5.1.1") {
                "mailbox_not_found"
            } else if contains_any(&lower, HARD_BOUNCE_TERMS) {
                "sender_rejected"
            } else if contains_any(&lower, MAILBOX_FULL_TERMS) {
                "mailbox_full"
            } else {
                "address_invalid"
            };
            let confidence = if probable_cause == "mailbox_not_found" {
                Confidence::High
            } else {
                Confidence::Medium
            };
            SmtpProbeResult {
                status: ProbeStatus::Invalid,
                confidence,
                probable_cause,
                ..base
            }
        }
        501 => SmtpProbeResult {
            status: ProbeStatus::Invalid,
            confidence: Confidence::High,
            probable_cause: "invalid_email_format",
            ..base
        },
        554 => SmtpProbeResult {
            status: ProbeStatus::Rejected,
            confidence: Confidence::Medium,
            probable_cause: "policy_rejection",
            ..base
        },
        _ => base,
    }
}

/// Refinement of a 250/251 acceptance against the DATA probe and the reply
/// wording.
fn classify_acceptance(
    base: SmtpProbeResult,
    lower_response: &str,
    data: &DataOutcome,
) -> SmtpProbeResult {
    let mut result = SmtpProbeResult {
        status: ProbeStatus::Valid,
        confidence: Confidence::Medium,
        probable_cause: "address_exists",
        success: true,
        ..base
    };

    if contains_any(lower_response, SUSPICIOUS_ACCEPT_TERMS) {
        result.confidence = Confidence::Low;
        result.probable_cause = "conditional_acceptance";
    }

    match data {
        DataOutcome::Accepted => {
            result.confidence = Confidence::High;
        }
        DataOutcome::Rejected(rejection) => {
            let rejection_lower = rejection.to_lowercase();
            if contains_any(&rejection_lower, HARD_BOUNCE_TERMS) {
                // The acceptance was a decoy: the content stage names a block.
                return SmtpProbeResult {
                    status: ProbeStatus::PotentialHardBounce,
                    confidence: Confidence::VeryLow,
                    probable_cause: "data_stage_block",
                    success: false,
                    warning: Some(format!("DATA probe rejected: {}", rejection)),
                    ..result
                };
            }
            result.confidence = Confidence::VeryLow;
            result.warning = Some(format!(
                "RCPT accepted but DATA probe rejected: {}",
                rejection
            ));
        }
        DataOutcome::NotAttempted => {}
    }

    result
}
