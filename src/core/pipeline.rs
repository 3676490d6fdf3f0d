//! The verification orchestrator: sequences the format, MX, SMTP and
//! third-party stages, short-circuits on fatal outcomes, emits progress
//! events and caches the terminal verdict.

use crate::core::cache::VerdictCache;
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::events::EventSink;
use crate::core::models::{FinalVerdict, VerdictDetails};
use crate::utils::dns::{create_resolver, resolve_mx};
use crate::utils::smtp::{describe_reply, ProbeStatus, SmtpProbeResult, SmtpProber};
use crate::verification::MailjetVerifier;

use lettre::Address;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use trust_dns_resolver::TokioAsyncResolver;

const STEP_FORMAT: &str = "Checking address format...";
const STEP_MX: &str = "Checking mail servers...";
const STEP_SMTP: &str = "Testing the address over SMTP...";
const STEP_REMOTE: &str = "Running advanced verification...";

/// The main struct orchestrating one email verification request.
#[derive(Clone)]
pub struct VerificationPipeline {
    config: Arc<Config>,
    dns_resolver: Arc<TokioAsyncResolver>,
    prober: SmtpProber,
    mailjet: MailjetVerifier,
    cache: Arc<VerdictCache>,
}

impl VerificationPipeline {
    /// Creates a new pipeline instance with shared resolver, prober,
    /// verification client and cache.
    pub async fn new(config: &Config) -> Result<Self> {
        tracing::debug!("Initializing verification pipeline components...");
        let config = Arc::new(config.clone());

        let dns_resolver = Arc::new(create_resolver(&config).await?);
        let prober = SmtpProber::new(Arc::clone(&config));
        let mailjet = MailjetVerifier::new(Arc::clone(&config))?;
        let cache = Arc::new(VerdictCache::new(
            config.cache_path.clone(),
            config.cache_ttl,
        ));

        tracing::info!("Verification pipeline initialized.");
        Ok(Self {
            config,
            dns_resolver,
            prober,
            mailjet,
            cache,
        })
    }

    /// Runs the whole pipeline for `email`, streaming progress into `sink`
    /// and returning the terminal verdict.
    ///
    /// Every stage emits a `step` before (success=null) and after running.
    /// Only a fatal SMTP classification (status `invalid` or `rejected`)
    /// stops the pipeline before the third-party stage; temporary errors,
    /// connection failures and low-confidence accepts carry on.
    pub async fn verify(&self, email: &str, sink: &EventSink) -> FinalVerdict {
        let email = email.trim();
        tracing::info!(target: "pipeline_task", "Starting verification for <{}>", email);

        if let Some(verdict) = self.guard_input(email, sink) {
            return verdict;
        }

        // A fresh cached verdict bypasses the whole pipeline.
        if let Some(cached) = self.cache.lookup(email).await {
            tracing::info!(target: "pipeline_task",
                "Serving cached verdict for <{}>", email);
            sink.result(&cached);
            return cached;
        }

        if let Some(verdict) = self.check_format(email, sink) {
            return verdict;
        }

        let domain = email.split('@').nth(1).unwrap_or_default();
        if let Err(verdict) = self.check_mx(domain, sink).await {
            return verdict;
        }

        if let Some(verdict) = self.check_smtp(email, sink).await {
            return verdict;
        }

        self.run_remote_verification(email, sink).await
    }

    /// Rejects unusable input before any work: empty, oversized or
    /// CRLF-injected addresses never reach the pipeline.
    fn guard_input(&self, email: &str, sink: &EventSink) -> Option<FinalVerdict> {
        let reason = if email.is_empty() {
            Some("Missing email address")
        } else if email.len() > self.config.max_email_length {
            Some("Email address too long")
        } else if email.contains(['\r', '\n']) {
            Some("Invalid characters in email address")
        } else {
            None
        };

        reason.map(|message| {
            tracing::warn!(target: "pipeline_task", "Rejected input: {}", message);
            sink.error(message, None);
            FinalVerdict::failure(message)
        })
    }

    /// Stage 1: syntactic validation.
    fn check_format(&self, email: &str, sink: &EventSink) -> Option<FinalVerdict> {
        sink.step_running(STEP_FORMAT);

        let valid =
            self.config.email_regex.is_match(email) && Address::from_str(email).is_ok();
        sink.step_done(STEP_FORMAT, valid);

        if valid {
            None
        } else {
            tracing::info!(target: "pipeline_task", "Invalid format for <{}>", email);
            let verdict = FinalVerdict::failure("Invalid email format");
            sink.result(&verdict);
            Some(verdict)
        }
    }

    /// Stage 2: MX resolution. A domain with no exchangers is terminal.
    async fn check_mx(&self, domain: &str, sink: &EventSink) -> std::result::Result<(), FinalVerdict> {
        sink.step_running(STEP_MX);

        match resolve_mx(&self.dns_resolver, domain).await {
            Ok(exchangers) => {
                sink.step_done(STEP_MX, true);
                let names = exchangers
                    .iter()
                    .map(|mx| mx.exchange.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                sink.step_done(&format!("Mail servers found: {}", names), true);
                Ok(())
            }
            Err(e) => {
                sink.step_done(STEP_MX, false);
                let detail = match &e {
                    AppError::NxDomain(_) | AppError::NoDnsRecords(_) => {
                        "No mail server configured for this domain".to_string()
                    }
                    AppError::DnsTimeout(_) => "Mail server lookup timed out".to_string(),
                    other => format!("Mail server lookup failed: {}", other),
                };
                tracing::info!(target: "pipeline_task",
                    "MX stage failed for {}: {}", domain, e);
                let message = format!("Invalid domain: {}", domain);
                sink.error(&message, Some(detail.clone()));
                Err(FinalVerdict::failure(format!("{} ({})", message, detail)))
            }
        }
    }

    /// Stage 3: the single SMTP probe. Returns a terminal verdict only for
    /// the fatal classification set.
    async fn check_smtp(&self, email: &str, sink: &EventSink) -> Option<FinalVerdict> {
        sink.step_running(STEP_SMTP);

        let probe = self.prober.probe(email).await;
        let message = probe_message(&probe);
        sink.step_done(STEP_SMTP, probe.success);
        sink.smtp_result(&probe, message.clone());

        if probe.is_fatal() {
            tracing::info!(target: "pipeline_task",
                "Fatal SMTP classification for <{}>: {} ({}), stopping pipeline",
                email, probe.status, probe.probable_cause);
            let verdict = FinalVerdict::failure_with_details(
                message,
                probe.code.to_string(),
                probe.response.clone(),
            );
            sink.result(&verdict);
            return Some(verdict);
        }

        if !probe.success {
            tracing::info!(target: "pipeline_task",
                "Non-fatal SMTP failure for <{}> ({}), continuing to advanced verification",
                email, probe.status);
        }
        None
    }

    /// Stage 4: third-party verification. Its terminal outcome becomes the
    /// final verdict and is written to the cache.
    async fn run_remote_verification(&self, email: &str, sink: &EventSink) -> FinalVerdict {
        sink.step_running(STEP_REMOTE);

        match self.mailjet.run_verification(email, sink).await {
            Ok(analysis) => {
                sink.step_done_with_details(
                    STEP_REMOTE,
                    analysis.is_valid,
                    json!({
                        "result": analysis.status.as_str(),
                        "risk": analysis.risk.as_str(),
                    }),
                );

                let verdict = FinalVerdict {
                    success: analysis.is_valid,
                    message: analysis.message.clone(),
                    details: Some(VerdictDetails {
                        code: Some(if analysis.is_valid { "VALID" } else { "INVALID" }.to_string()),
                        response: Some(analysis.message.clone()),
                        result: Some(analysis.status.as_str().to_string()),
                        risk: Some(analysis.risk.as_str().to_string()),
                    }),
                };
                sink.result(&verdict);

                if let Err(e) = self.cache.store(email, &verdict).await {
                    tracing::warn!(target: "pipeline_task",
                        "Failed to cache verdict for <{}>: {}", email, e);
                }
                verdict
            }
            Err(e) => {
                sink.step_done(STEP_REMOTE, false);
                let (message, detail) = curate_remote_error(&e);
                tracing::error!(target: "pipeline_task",
                    "Advanced verification failed for <{}>: {}", email, e);
                sink.error(message, Some(detail.clone()));
                FinalVerdict::failure(format!("{} ({})", message, detail))
            }
        }
    }
}

/// Client-facing wording for the probe outcome.
fn probe_message(probe: &SmtpProbeResult) -> String {
    match probe.status {
        ProbeStatus::ConnectionError => {
            format!("SMTP check could not be completed: {}", probe.response)
        }
        ProbeStatus::SenderRejected => {
            "The relay refused the probe sender identity".to_string()
        }
        ProbeStatus::PotentialHardBounce => {
            "Recipient accepted, but delivery would likely bounce".to_string()
        }
        _ => describe_reply(probe.code, probe.extended_code.as_deref()).to_string(),
    }
}

/// Maps internal failures of the remote stage to curated client wording.
/// Raw exception text never reaches the stream.
fn curate_remote_error(error: &AppError) -> (&'static str, String) {
    match error {
        AppError::PollingTimeout(_) => (
            "Verification timed out",
            "The verification is taking too long, please try again later".to_string(),
        ),
        AppError::MissingCredentials => (
            "Advanced verification unavailable",
            "Verification API credentials are not configured".to_string(),
        ),
        AppError::JobFailed(reason) => ("Verification failed", reason.clone()),
        AppError::MailjetApi { code, status, .. } => (
            "Failed to run the advanced verification",
            match status {
                Some(status) => format!("{} (HTTP {})", code, status),
                None => (*code).to_string(),
            },
        ),
        other => (
            "Failed to run the advanced verification",
            other.to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::ProgressEvent;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn test_config() -> Config {
        let mut config = Config::default();
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        config.cache_path = std::env::temp_dir()
            .join(format!(
                "email-sentinel-pipeline-test-{}-{}.json",
                std::process::id(),
                n
            ))
            .to_string_lossy()
            .into_owned();
        config
    }

    async fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn invalid_format_is_terminal_before_any_network_stage() {
        let pipeline = VerificationPipeline::new(&test_config()).await.unwrap();
        let (sink, mut rx) = EventSink::channel();

        let verdict = pipeline.verify("definitely-not-an-email", &sink).await;
        assert!(!verdict.success);
        assert_eq!(verdict.message, "Invalid email format");

        let events = drain(&mut rx).await;
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["step", "step", "result"]);
        match &events[1] {
            ProgressEvent::Step { success, .. } => assert_eq!(*success, Some(false)),
            other => panic!("expected step, got {}", other.name()),
        }
    }

    #[tokio::test]
    async fn oversized_input_is_rejected_with_an_error_event() {
        let pipeline = VerificationPipeline::new(&test_config()).await.unwrap();
        let (sink, mut rx) = EventSink::channel();

        let long_local = "a".repeat(300);
        let verdict = pipeline
            .verify(&format!("{}@example.com", long_local), &sink)
            .await;
        assert!(!verdict.success);

        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "error");
    }

    #[tokio::test]
    async fn crlf_injection_is_rejected() {
        let pipeline = VerificationPipeline::new(&test_config()).await.unwrap();
        let verdict = pipeline
            .verify("jane\r\nRCPT TO:<x@y.com>@example.com", &EventSink::disabled())
            .await;
        assert!(!verdict.success);
        assert_eq!(verdict.message, "Invalid characters in email address");
    }

    #[tokio::test]
    async fn cached_verdict_bypasses_the_pipeline() {
        let config = test_config();
        let pipeline = VerificationPipeline::new(&config).await.unwrap();

        let verdict = FinalVerdict {
            success: true,
            message: "Deliverable".to_string(),
            details: None,
        };
        pipeline
            .cache
            .store("jane.doe@example.com", &verdict)
            .await
            .unwrap();

        let (sink, mut rx) = EventSink::channel();
        let served = pipeline.verify("jane.doe@example.com", &sink).await;
        assert_eq!(served, verdict);

        // The cached verdict is re-emitted immediately as the only event.
        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "result");

        let _ = tokio::fs::remove_file(&config.cache_path).await;
    }

    #[tokio::test]
    async fn cache_miss_falls_through_to_the_format_stage() {
        let mut config = test_config();
        config.cache_ttl = Duration::from_secs(600);
        let pipeline = VerificationPipeline::new(&config).await.unwrap();

        let (sink, mut rx) = EventSink::channel();
        let verdict = pipeline.verify("still-not-an-email", &sink).await;
        assert!(!verdict.success);
        assert_eq!(drain(&mut rx).await.last().unwrap().name(), "result");
    }

    #[test]
    fn probe_messages_are_specific_per_status() {
        let connection = SmtpProbeResult::connection_error("connect timed out".to_string());
        assert!(probe_message(&connection).contains("connect timed out"));

        let sender = SmtpProbeResult::sender_rejected(550, "550 refused".to_string());
        assert!(probe_message(&sender).contains("sender identity"));

        let not_found = crate::utils::smtp::classify(
            550,
            "550 5.1.1 no such user",
            &crate::utils::smtp::DataOutcome::NotAttempted,
        );
        assert_eq!(probe_message(&not_found), "Email address does not exist");
    }

    #[test]
    fn remote_errors_are_curated_for_the_client() {
        let (message, detail) = curate_remote_error(&AppError::PollingTimeout(120));
        assert_eq!(message, "Verification timed out");
        assert!(detail.contains("try again later"));

        let (message, _) = curate_remote_error(&AppError::MissingCredentials);
        assert_eq!(message, "Advanced verification unavailable");

        let (_, detail) = curate_remote_error(&AppError::MailjetApi {
            code: "VERIFICATION_LAUNCH_ERROR",
            status: Some(429),
            message: "secret internals".to_string(),
        });
        assert!(!detail.contains("secret internals"));
    }
}
