//! Pure mapping from a completed job summary to a status/risk/message
//! triple. No I/O; first match wins over the ordered category checks.

use super::models::{CategoryCounts, JobSummary, RiskCounts};
use serde::Serialize;

/// Deliverability category of an address per the completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Deliverable,
    CatchAll,
    Undeliverable,
    DoNotSend,
    Unknown,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Deliverable => "deliverable",
            EmailStatus::CatchAll => "catch_all",
            EmailStatus::Undeliverable => "undeliverable",
            EmailStatus::DoNotSend => "do_not_send",
            EmailStatus::Unknown => "unknown",
        }
    }
}

/// Bounce-risk band of an address per the completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unknown => "unknown",
        }
    }
}

/// Final interpretation of one verification job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAnalysis {
    pub status: EmailStatus,
    pub risk: RiskLevel,
    /// True only for the `deliverable` category.
    pub is_valid: bool,
    /// Human-readable summary shown to the client.
    pub message: String,
}

/// Interprets the summary counts of a completed job.
pub fn analyze(summary: &JobSummary) -> JobAnalysis {
    let status = determine_status(&summary.result);
    let risk = determine_risk(&summary.risk);
    JobAnalysis {
        status,
        risk,
        is_valid: status == EmailStatus::Deliverable,
        message: status_message(status, risk),
    }
}

/// Status precedence: deliverable > catch_all > undeliverable >
/// do_not_send > unknown.
fn determine_status(result: &CategoryCounts) -> EmailStatus {
    if result.deliverable > 0 {
        EmailStatus::Deliverable
    } else if result.catch_all > 0 {
        EmailStatus::CatchAll
    } else if result.undeliverable > 0 {
        EmailStatus::Undeliverable
    } else if result.do_not_send > 0 {
        EmailStatus::DoNotSend
    } else {
        EmailStatus::Unknown
    }
}

/// Risk precedence: low > medium > high.
fn determine_risk(risk: &RiskCounts) -> RiskLevel {
    if risk.low > 0 {
        RiskLevel::Low
    } else if risk.medium > 0 {
        RiskLevel::Medium
    } else if risk.high > 0 {
        RiskLevel::High
    } else {
        RiskLevel::Unknown
    }
}

fn status_message(status: EmailStatus, risk: RiskLevel) -> String {
    let base = match status {
        EmailStatus::Deliverable => "Deliverable",
        EmailStatus::CatchAll => "Catch-all domain (accepts every address)",
        EmailStatus::Undeliverable => "Undeliverable",
        EmailStatus::DoNotSend => "Do not send to this address",
        EmailStatus::Unknown => "Unknown status",
    };

    if status == EmailStatus::Deliverable && risk != RiskLevel::Unknown {
        let risk_text = match risk {
            RiskLevel::Low => "low bounce risk",
            RiskLevel::Medium => "moderate bounce risk",
            RiskLevel::High => "high bounce risk",
            RiskLevel::Unknown => unreachable!(),
        };
        format!("{} with {}", base, risk_text)
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(result: CategoryCounts, risk: RiskCounts) -> JobSummary {
        JobSummary { result, risk }
    }

    #[test]
    fn deliverable_wins_over_every_other_category() {
        let s = summary(
            CategoryCounts {
                deliverable: 1,
                catch_all: 1,
                undeliverable: 1,
                do_not_send: 1,
                unknown: 1,
            },
            RiskCounts {
                low: 1,
                ..Default::default()
            },
        );
        let analysis = analyze(&s);
        assert_eq!(analysis.status, EmailStatus::Deliverable);
        assert!(analysis.is_valid);
        assert_eq!(analysis.message, "Deliverable with low bounce risk");
    }

    #[test]
    fn category_precedence_order() {
        let catch_all = summary(
            CategoryCounts {
                catch_all: 1,
                undeliverable: 1,
                ..Default::default()
            },
            RiskCounts::default(),
        );
        assert_eq!(analyze(&catch_all).status, EmailStatus::CatchAll);

        let undeliverable = summary(
            CategoryCounts {
                undeliverable: 1,
                do_not_send: 1,
                ..Default::default()
            },
            RiskCounts::default(),
        );
        let analysis = analyze(&undeliverable);
        assert_eq!(analysis.status, EmailStatus::Undeliverable);
        assert!(!analysis.is_valid);

        let do_not_send = summary(
            CategoryCounts {
                do_not_send: 1,
                unknown: 3,
                ..Default::default()
            },
            RiskCounts::default(),
        );
        assert_eq!(analyze(&do_not_send).status, EmailStatus::DoNotSend);
    }

    #[test]
    fn empty_summary_is_unknown() {
        let analysis = analyze(&JobSummary::default());
        assert_eq!(analysis.status, EmailStatus::Unknown);
        assert_eq!(analysis.risk, RiskLevel::Unknown);
        assert!(!analysis.is_valid);
        assert_eq!(analysis.message, "Unknown status");
    }

    #[test]
    fn risk_precedence_order() {
        let s = summary(
            CategoryCounts {
                deliverable: 1,
                ..Default::default()
            },
            RiskCounts {
                medium: 2,
                high: 5,
                ..Default::default()
            },
        );
        assert_eq!(analyze(&s).risk, RiskLevel::Medium);
    }

    #[test]
    fn risk_suffix_only_for_deliverable() {
        let s = summary(
            CategoryCounts {
                undeliverable: 1,
                ..Default::default()
            },
            RiskCounts {
                high: 1,
                ..Default::default()
            },
        );
        assert_eq!(analyze(&s).message, "Undeliverable");
    }
}
