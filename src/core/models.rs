//! Core data structures shared across the verification pipeline.

use serde::{Deserialize, Serialize};

/// Detail block attached to a terminal verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictDetails {
    /// Outcome code: `VALID`, `INVALID`, or the decisive SMTP reply code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Raw response or human explanation backing the verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Third-party result category (deliverable, catch_all, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Third-party risk category (low, medium, high, unknown).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
}

/// The single terminal outcome of one verification request. Written once,
/// emitted as the final `result` event and persisted into the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<VerdictDetails>,
}

impl FinalVerdict {
    /// A failure verdict with no detail block.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: None,
        }
    }

    /// A failure verdict carrying the decisive code and raw response.
    pub fn failure_with_details(
        message: impl Into<String>,
        code: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: Some(VerdictDetails {
                code: Some(code.into()),
                response: Some(response.into()),
                result: None,
                risk: None,
            }),
        }
    }
}
