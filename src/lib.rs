//! # Email Sentinel Core Library
//!
//! This crate provides the core logic for verifying whether an email
//! address is live without sending it a message. A verification request
//! runs through four stages: syntactic validation, DNS MX resolution, a
//! raw SMTP probe through a fixed authenticated relay, and an
//! asynchronous third-party verification job.
//!
//! Progress is pushed through an [`EventSink`] channel, which the bundled
//! SSE server (or the `email-sentinel` CLI) drains towards the client.
//! Terminal verdicts are cached by address hash with a short TTL.

mod core;
mod server;
mod utils;
mod verification;

pub use crate::core::cache::VerdictCache;
pub use crate::core::config::{Config, ConfigBuilder, ConfigFile};
pub use crate::core::error::{AppError, Result};
pub use crate::core::events::{EventSink, ProgressEvent};
pub use crate::core::models::{FinalVerdict, VerdictDetails};
pub use crate::core::pipeline::VerificationPipeline;
pub use crate::server::{router, serve};
pub use crate::utils::smtp::{
    classify, describe_reply, Confidence, DataOutcome, ProbeStatus, SmtpProbeResult, SmtpProber,
};
pub use crate::verification::{
    analyze, CategoryCounts, EmailStatus, JobAnalysis, JobState, JobSummary, MailjetClient,
    MailjetVerifier, RiskCounts, RiskLevel, VerificationJob,
};

/// Initializes the shared pipeline (resolver, prober, API client, cache).
pub async fn initialize_pipeline(config: &Config) -> Result<VerificationPipeline> {
    VerificationPipeline::new(config).await
}

/// Verifies a single address end to end, streaming progress into `sink`.
///
/// Convenience wrapper for library callers that do not hold a pipeline.
pub async fn verify_single_email(
    config: &Config,
    email: &str,
    sink: &EventSink,
) -> Result<FinalVerdict> {
    let pipeline = VerificationPipeline::new(config).await?;
    Ok(pipeline.verify(email, sink).await)
}
