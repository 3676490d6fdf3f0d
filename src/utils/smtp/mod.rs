//! SMTP probing: raw relay dialogue plus reply classification.

pub(crate) mod classify;
pub(crate) mod client;
pub(crate) mod codes;
pub(crate) mod result;

pub use classify::classify;
pub use codes::describe_reply;
pub use client::SmtpProber;
pub use result::{Confidence, DataOutcome, ProbeStatus, SmtpProbeResult};
