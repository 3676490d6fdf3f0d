//! Wire types for the Mailjet contact-list verification API.

use serde::{Deserialize, Serialize};

/// Generic envelope of the REST API: every payload nests under `Data`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiCollection<T> {
    #[serde(rename = "Data", default = "Vec::new")]
    pub(crate) data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContactsListData {
    #[serde(rename = "ID")]
    pub(crate) id: u64,
    #[serde(rename = "Name")]
    #[allow(dead_code)]
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyLaunchData {
    #[serde(rename = "JobID")]
    pub(crate) job_id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobData {
    #[serde(rename = "Status")]
    pub(crate) status: String,
    #[serde(rename = "Summary")]
    pub(crate) summary: Option<JobSummary>,
    #[serde(rename = "Error")]
    pub(crate) error: Option<String>,
}

/// Terminal/running state of a remote verification job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Completed,
    Error,
    /// Any state string the API may add; treated as still running.
    Other(String),
}

impl JobState {
    pub(crate) fn parse(status: &str) -> Self {
        match status {
            "Pending" => JobState::Pending,
            "Completed" => JobState::Completed,
            "Error" => JobState::Error,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "Pending",
            JobState::Completed => "Completed",
            JobState::Error => "Error",
            JobState::Other(s) => s.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }
}

/// A refreshed view of the remote job, read-only between polls.
#[derive(Debug, Clone)]
pub struct VerificationJob {
    pub list_id: u64,
    pub job_id: u64,
    pub state: JobState,
    pub summary: Option<JobSummary>,
    pub error: Option<String>,
}

/// Per-category counts in the completed job summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    #[serde(default)]
    pub deliverable: u32,
    #[serde(default)]
    pub catch_all: u32,
    #[serde(default)]
    pub undeliverable: u32,
    #[serde(default)]
    pub do_not_send: u32,
    #[serde(default)]
    pub unknown: u32,
}

/// Per-risk-band counts in the completed job summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    #[serde(default)]
    pub low: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub high: u32,
    #[serde(default)]
    pub unknown: u32,
}

/// Summary block of a completed job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(default)]
    pub result: CategoryCounts,
    #[serde(default)]
    pub risk: RiskCounts,
}
