//! Progress events and the channel decoupling the pipeline from transport.
//!
//! The pipeline never writes to a socket: it pushes [`ProgressEvent`]s into
//! an [`EventSink`], and a transport adapter (the SSE handler, the CLI
//! printer) drains the matching receiver. A vanished receiver is tolerated
//! so a client disconnect never aborts a verification mid-flight.

use crate::core::models::FinalVerdict;
use crate::utils::smtp::SmtpProbeResult;
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// One event on the progress stream. Variants map one-to-one onto the wire
/// event names of the SSE channel.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A pipeline stage started (`success: None`) or finished.
    Step {
        message: String,
        success: Option<bool>,
        details: Option<Value>,
    },
    /// One polling iteration against the remote verification job.
    JobStatus {
        attempt: u32,
        status: String,
        progress: Option<f64>,
    },
    /// Outcome of the SMTP probe stage.
    SmtpResult {
        success: bool,
        message: String,
        code: u16,
        extended_code: Option<String>,
        response: String,
    },
    /// Keep-alive marker emitted between polling iterations.
    Heartbeat { time: i64, attempt: u32 },
    /// The terminal verdict; at most one per stream.
    Result(FinalVerdict),
    /// A curated error notification; raw internals stay server-side.
    Error {
        message: String,
        error_message: Option<String>,
    },
}

impl ProgressEvent {
    /// Wire name of the event, used as the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Step { .. } => "step",
            ProgressEvent::JobStatus { .. } => "job_status",
            ProgressEvent::SmtpResult { .. } => "smtp_result",
            ProgressEvent::Heartbeat { .. } => "heartbeat",
            ProgressEvent::Result(_) => "result",
            ProgressEvent::Error { .. } => "error",
        }
    }

    /// JSON payload of the event, used as the SSE `data:` field.
    pub fn payload(&self) -> Value {
        match self {
            ProgressEvent::Step {
                message,
                success,
                details,
            } => {
                let mut payload = json!({ "message": message, "success": success });
                if let Some(details) = details {
                    payload["details"] = details.clone();
                }
                payload
            }
            ProgressEvent::JobStatus {
                attempt,
                status,
                progress,
            } => json!({ "attempt": attempt, "status": status, "progress": progress }),
            ProgressEvent::SmtpResult {
                success,
                message,
                code,
                extended_code,
                response,
            } => json!({
                "success": success,
                "message": message,
                "code": code,
                "extended_code": extended_code,
                "details": { "code": code, "response": response },
            }),
            ProgressEvent::Heartbeat { time, attempt } => {
                json!({ "time": time, "attempt": attempt })
            }
            ProgressEvent::Result(verdict) => {
                serde_json::to_value(verdict).unwrap_or_else(|_| json!({ "success": false }))
            }
            ProgressEvent::Error {
                message,
                error_message,
            } => {
                let mut payload = json!({ "message": message });
                if let Some(detail) = error_message {
                    payload["errorMessage"] = Value::String(detail.clone());
                }
                payload
            }
        }
    }
}

/// Sending half of the progress channel handed to the pipeline.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl EventSink {
    /// Creates a connected sink/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that silently drops every event, for non-streaming callers.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emits one event. A closed receiver is not an error: the pipeline
    /// keeps running (and caching) after the client goes away.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!(target: "sse_task", "progress receiver gone, event dropped");
            }
        }
    }

    /// Announces a stage as running (`success: null`).
    pub fn step_running(&self, message: &str) {
        self.emit(ProgressEvent::Step {
            message: message.to_string(),
            success: None,
            details: None,
        });
    }

    /// Reports a finished stage.
    pub fn step_done(&self, message: &str, success: bool) {
        self.emit(ProgressEvent::Step {
            message: message.to_string(),
            success: Some(success),
            details: None,
        });
    }

    /// Reports a finished stage with a detail object.
    pub fn step_done_with_details(&self, message: &str, success: bool, details: Value) {
        self.emit(ProgressEvent::Step {
            message: message.to_string(),
            success: Some(success),
            details: Some(details),
        });
    }

    /// Publishes the SMTP probe outcome.
    pub fn smtp_result(&self, probe: &SmtpProbeResult, message: String) {
        self.emit(ProgressEvent::SmtpResult {
            success: probe.success,
            message,
            code: probe.code,
            extended_code: probe.extended_code.clone(),
            response: probe.response.clone(),
        });
    }

    /// Publishes one polling iteration.
    pub fn job_status(&self, attempt: u32, status: &str, progress: Option<f64>) {
        self.emit(ProgressEvent::JobStatus {
            attempt,
            status: status.to_string(),
            progress,
        });
    }

    /// Keeps the stream alive between polling iterations.
    pub fn heartbeat(&self, attempt: u32) {
        self.emit(ProgressEvent::Heartbeat {
            time: chrono::Utc::now().timestamp(),
            attempt,
        });
    }

    /// Publishes the terminal verdict.
    pub fn result(&self, verdict: &FinalVerdict) {
        self.emit(ProgressEvent::Result(verdict.clone()));
    }

    /// Publishes a curated error notification.
    pub fn error(&self, message: &str, error_message: Option<String>) {
        self.emit(ProgressEvent::Error {
            message: message.to_string(),
            error_message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_wire_protocol() {
        assert_eq!(
            ProgressEvent::Step {
                message: "x".into(),
                success: None,
                details: None
            }
            .name(),
            "step"
        );
        assert_eq!(
            ProgressEvent::Heartbeat { time: 0, attempt: 1 }.name(),
            "heartbeat"
        );
        assert_eq!(
            ProgressEvent::Result(FinalVerdict::failure("no")).name(),
            "result"
        );
    }

    #[test]
    fn step_payload_has_null_success_while_running() {
        let payload = ProgressEvent::Step {
            message: "Checking format...".into(),
            success: None,
            details: None,
        }
        .payload();
        assert_eq!(payload["message"], "Checking format...");
        assert!(payload["success"].is_null());
        assert!(payload.get("details").is_none());
    }

    #[test]
    fn error_payload_spells_error_message_in_camel_case() {
        let payload = ProgressEvent::Error {
            message: "Verification failed".into(),
            error_message: Some("timeout".into()),
        }
        .payload();
        assert_eq!(payload["errorMessage"], "timeout");
    }

    #[tokio::test]
    async fn sink_delivers_in_order_and_tolerates_closed_receiver() {
        let (sink, mut rx) = EventSink::channel();
        sink.step_running("one");
        sink.step_done("one", true);
        sink.heartbeat(3);

        assert_eq!(rx.recv().await.unwrap().name(), "step");
        assert_eq!(rx.recv().await.unwrap().name(), "step");
        assert_eq!(rx.recv().await.unwrap().name(), "heartbeat");

        drop(rx);
        // Must not panic or error once the receiver is gone.
        sink.step_done("after close", false);
    }
}
