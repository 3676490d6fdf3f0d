//! HTTP client for the Mailjet contact-list verification API.
//!
//! Five remote operations, each authenticated with key:secret basic auth
//! and each surfacing failures as a typed error carrying the operation
//! code, the HTTP status and the remote message.

use super::models::{
    ApiCollection, ContactsListData, JobData, JobState, VerificationJob, VerifyLaunchData,
};
use crate::core::config::Config;
use crate::core::error::{AppError, Result};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tokio::time::sleep;

/// HTTP status codes worth retrying when launching the verification job.
pub(crate) const RETRYABLE_HTTP_CODES: [u16; 5] = [429, 500, 502, 503, 504];

pub(crate) fn is_retryable_status(status: Option<u16>) -> bool {
    status.is_some_and(|s| RETRYABLE_HTTP_CODES.contains(&s))
}

/// Client for the contact-list REST endpoints.
#[derive(Clone)]
pub struct MailjetClient {
    http: Client,
    config: Arc<Config>,
}

impl MailjetClient {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.http_connect_timeout)
            .build()
            .map_err(|e| {
                AppError::Initialization(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { http, config })
    }

    /// Fails fast when credentials are absent, before any network call.
    fn credentials(&self) -> Result<(&str, &str)> {
        match (
            self.config.mailjet_api_key.as_deref(),
            self.config.mailjet_secret_key.as_deref(),
        ) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Ok((key, secret))
            }
            _ => Err(AppError::MissingCredentials),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.mailjet_api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let (key, secret) = self.credentials()?;
        Ok(builder.basic_auth(key, Some(secret)))
    }

    /// Creates a contacts list and returns its id.
    pub async fn create_list(&self, name: &str) -> Result<u64> {
        tracing::debug!(target: "mailjet_task", "Creating contacts list '{}'", name);
        let request = self
            .authed(self.http.post(self.endpoint("contactslist")))?
            .json(&json!({ "Name": name }));

        let response = send(request, "LIST_CREATION_ERROR").await?;
        expect_success(&response, "LIST_CREATION_ERROR")?;

        let body: ApiCollection<ContactsListData> =
            parse_body(response, "LIST_CREATION_ERROR").await?;
        let list = body
            .data
            .into_iter()
            .next()
            .ok_or(AppError::InvalidApiResponse("Data[0].ID"))?;
        tracing::debug!(target: "mailjet_task", "Created contacts list {} ('{}')", list.id, name);
        Ok(list.id)
    }

    /// Adds (force-subscribes) the address to the list.
    pub async fn add_contact(&self, list_id: u64, email: &str) -> Result<()> {
        tracing::debug!(target: "mailjet_task",
            "Adding contact <{}> to list {}", email, list_id);
        let path = format!("contactslist/{}/managecontact", list_id);
        let request = self
            .authed(self.http.post(self.endpoint(&path)))?
            .json(&json!({ "Email": email, "action": "addforce" }));

        let response = send(request, "CONTACT_MANAGEMENT_ERROR").await?;
        expect_success(&response, "CONTACT_MANAGEMENT_ERROR")?;
        Ok(())
    }

    /// Launches the verification job for the list, retrying transient HTTP
    /// failures with exponential backoff. Returns the job id.
    pub async fn launch_verification(&self, list_id: u64) -> Result<u64> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_launch(list_id).await {
                Ok(job_id) => return Ok(job_id),
                Err(e) => {
                    attempt += 1;
                    let retryable = is_retryable_status(e.http_status());
                    if !retryable || attempt >= self.config.launch_max_retries {
                        return Err(e);
                    }
                    // Exponential backoff: base, 2*base, 4*base, ...
                    let delay = self.config.launch_retry_base_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(target: "mailjet_task",
                        "Transient failure launching verification for list {} \
                         (attempt {}/{}): {}. Retrying in {:?}",
                        list_id, attempt, self.config.launch_max_retries, e, delay);
                    sleep(delay).await;
                }
            }
        }
    }

    async fn try_launch(&self, list_id: u64) -> Result<u64> {
        tracing::debug!(target: "mailjet_task",
            "Launching verification job for list {}", list_id);
        let path = format!("contactslist/{}/verify", list_id);
        let request = self
            .authed(self.http.post(self.endpoint(&path)))?
            .json(&json!({ "Method": "fulllist" }));

        let response = send(request, "VERIFICATION_LAUNCH_ERROR").await?;
        if response.status() != StatusCode::CREATED {
            return Err(api_error(response, "VERIFICATION_LAUNCH_ERROR").await);
        }

        let body: ApiCollection<VerifyLaunchData> =
            parse_body(response, "VERIFICATION_LAUNCH_ERROR").await?;
        let launch = body
            .data
            .into_iter()
            .next()
            .ok_or(AppError::InvalidApiResponse("Data[0].JobID"))?;
        tracing::info!(target: "mailjet_task",
            "Verification job {} launched for list {}", launch.job_id, list_id);
        Ok(launch.job_id)
    }

    /// Refreshes the job state (read-only).
    pub async fn job_status(&self, list_id: u64, job_id: u64) -> Result<VerificationJob> {
        let path = format!("contactslist/{}/verify/{}", list_id, job_id);
        let request = self.authed(self.http.get(self.endpoint(&path)))?;

        let response = send(request, "JOB_STATUS_ERROR").await?;
        expect_success(&response, "JOB_STATUS_ERROR")?;

        let body: ApiCollection<JobData> = parse_body(response, "JOB_STATUS_ERROR").await?;
        let job = body
            .data
            .into_iter()
            .next()
            .ok_or(AppError::InvalidApiResponse("Data[0].Status"))?;

        Ok(VerificationJob {
            list_id,
            job_id,
            state: JobState::parse(&job.status),
            summary: job.summary,
            error: job.error,
        })
    }

    /// Deletes the list. Callers treat failures here as log-only.
    pub async fn delete_list(&self, list_id: u64) -> Result<()> {
        tracing::debug!(target: "mailjet_task", "Deleting contacts list {}", list_id);
        let path = format!("contactslist/{}", list_id);
        let request = self.authed(self.http.delete(self.endpoint(&path)))?;

        let response = send(request, "LIST_DELETION_ERROR").await?;
        expect_success(&response, "LIST_DELETION_ERROR")?;
        Ok(())
    }
}

async fn send(request: RequestBuilder, code: &'static str) -> Result<Response> {
    request.send().await.map_err(|e| AppError::MailjetApi {
        code,
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    })
}

fn expect_success(response: &Response, code: &'static str) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(AppError::MailjetApi {
            code,
            status: Some(response.status().as_u16()),
            message: format!("unexpected status {}", response.status()),
        })
    }
}

async fn api_error(response: Response, code: &'static str) -> AppError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let mut message = body.trim().to_string();
    message.truncate(200);
    if message.is_empty() {
        message = format!("unexpected status {}", status);
    }
    AppError::MailjetApi {
        code,
        status: Some(status),
        message,
    }
}

async fn parse_body<T: serde::de::DeserializeOwned>(
    response: Response,
    code: &'static str,
) -> Result<T> {
    let status = response.status().as_u16();
    response.json::<T>().await.map_err(|e| AppError::MailjetApi {
        code,
        status: Some(status),
        message: format!("unreadable response body: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes_match_the_transient_set() {
        for code in RETRYABLE_HTTP_CODES {
            assert!(is_retryable_status(Some(code)), "{} should retry", code);
        }
        for code in [400u16, 401, 403, 404, 422] {
            assert!(!is_retryable_status(Some(code)), "{} must not retry", code);
        }
        assert!(!is_retryable_status(None));
    }

    #[test]
    fn missing_credentials_fail_before_any_network_call() {
        let config = Arc::new(Config::default());
        let client = MailjetClient::new(config).unwrap();
        assert!(matches!(
            client.credentials(),
            Err(AppError::MissingCredentials)
        ));
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let mut config = Config::default();
        config.mailjet_api_base = "https://api.test.invalid/v3/REST/".to_string();
        let client = MailjetClient::new(Arc::new(config)).unwrap();
        assert_eq!(
            client.endpoint("/contactslist"),
            "https://api.test.invalid/v3/REST/contactslist"
        );
    }
}
