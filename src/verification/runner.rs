//! Drives one third-party verification end to end: disposable list,
//! contact add, job launch, polling, analysis — and unconditional cleanup
//! of the remote list.

use super::analysis::{analyze, JobAnalysis};
use super::client::MailjetClient;
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::events::EventSink;

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::time::sleep;

/// High-level driver over [`MailjetClient`].
#[derive(Clone)]
pub struct MailjetVerifier {
    client: MailjetClient,
    config: Arc<Config>,
}

/// Name of the disposable per-request list: unique enough that concurrent
/// verifications of the same address never share remote state.
fn disposable_list_name(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("verify_{}_{:08x}", &digest[..16], rand::random::<u32>())
}

impl MailjetVerifier {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        Ok(Self {
            client: MailjetClient::new(Arc::clone(&config))?,
            config,
        })
    }

    /// Runs the whole remote verification for `email`, emitting progress
    /// into `sink`.
    ///
    /// Cleanup invariant: once the remote list exists, exactly one delete
    /// is attempted for it on every exit path — completion, job error,
    /// polling timeout or any API failure in between. Cleanup failures are
    /// logged, never propagated.
    pub async fn run_verification(&self, email: &str, sink: &EventSink) -> Result<JobAnalysis> {
        if !self.config.has_api_credentials() {
            return Err(AppError::MissingCredentials);
        }

        let list_name = disposable_list_name(email);
        let list_id = self.client.create_list(&list_name).await?;

        let outcome = self.drive_job(list_id, email, sink).await;

        if let Err(e) = self.client.delete_list(list_id).await {
            tracing::warn!(target: "mailjet_task",
                "Cleanup of contacts list {} failed (ignored): {}", list_id, e);
        }

        outcome
    }

    async fn drive_job(&self, list_id: u64, email: &str, sink: &EventSink) -> Result<JobAnalysis> {
        self.client.add_contact(list_id, email).await?;
        let job_id = self.client.launch_verification(list_id).await?;
        self.poll_job(list_id, job_id, sink).await
    }

    /// Polls the job to a terminal state within the attempt budget.
    ///
    /// Waits a settle time before the first poll, then checks at a fixed
    /// interval, surfacing each iteration as a `job_status` event and a
    /// `heartbeat` between checks. Exhausting the budget is a distinct
    /// timeout failure, never confused with a remote `Error` state.
    async fn poll_job(&self, list_id: u64, job_id: u64, sink: &EventSink) -> Result<JobAnalysis> {
        tracing::debug!(target: "mailjet_task",
            "Waiting {:?} before polling job {} on list {}",
            self.config.poll_initial_wait, job_id, list_id);
        sleep(self.config.poll_initial_wait).await;

        let max_attempts = self.config.poll_max_attempts;
        for attempt in 1..=max_attempts {
            let job = self.client.job_status(list_id, job_id).await?;
            sink.job_status(attempt, job.state.as_str(), None);
            tracing::debug!(target: "mailjet_task",
                "Job {} status (attempt {}/{}): {}",
                job_id, attempt, max_attempts, job.state.as_str());

            if job.state.is_terminal() {
                return match job.state {
                    super::models::JobState::Completed => {
                        let summary = job
                            .summary
                            .ok_or(AppError::InvalidApiResponse("Data[0].Summary"))?;
                        let analysis = analyze(&summary);
                        tracing::info!(target: "mailjet_task",
                            "Job {} completed: status={}, risk={}",
                            job_id, analysis.status.as_str(), analysis.risk.as_str());
                        Ok(analysis)
                    }
                    _ => Err(AppError::JobFailed(
                        job.error
                            .unwrap_or_else(|| "unknown remote error".to_string()),
                    )),
                };
            }

            if attempt < max_attempts {
                sleep(self.config.poll_interval).await;
                sink.heartbeat(attempt);
            }
        }

        Err(AppError::PollingTimeout(max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::ProgressEvent;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Scripted stand-in for the remote verification API, counting every
    /// call so the tests can assert the cleanup invariant.
    #[derive(Default)]
    struct FakeApi {
        launch_failures_left: u32,
        polls_until_terminal: u32,
        terminal_status: &'static str,
        creates: u32,
        launches: u32,
        polls: u32,
        deletes: u32,
    }

    type Shared = Arc<Mutex<FakeApi>>;

    async fn create_list_handler(State(api): State<Shared>) -> (StatusCode, Json<Value>) {
        api.lock().unwrap().creates += 1;
        (
            StatusCode::CREATED,
            Json(json!({ "Data": [{ "ID": 77, "Name": "verify_x" }] })),
        )
    }

    async fn manage_contact_handler(
        State(_api): State<Shared>,
        Path(_id): Path<u64>,
    ) -> (StatusCode, Json<Value>) {
        (StatusCode::CREATED, Json(json!({ "Count": 1 })))
    }

    async fn launch_handler(
        State(api): State<Shared>,
        Path(_id): Path<u64>,
    ) -> (StatusCode, Json<Value>) {
        let mut api = api.lock().unwrap();
        api.launches += 1;
        if api.launch_failures_left > 0 {
            api.launch_failures_left -= 1;
            return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
        }
        (
            StatusCode::CREATED,
            Json(json!({ "Data": [{ "JobID": 42 }] })),
        )
    }

    async fn job_status_handler(
        State(api): State<Shared>,
        Path((_id, _job)): Path<(u64, u64)>,
    ) -> Json<Value> {
        let mut api = api.lock().unwrap();
        api.polls += 1;
        if api.polls < api.polls_until_terminal {
            return Json(json!({ "Data": [{ "Status": "Pending" }] }));
        }
        match api.terminal_status {
            "Completed" => Json(json!({
                "Data": [{
                    "Status": "Completed",
                    "Summary": {
                        "result": { "deliverable": 1 },
                        "risk": { "low": 1 }
                    }
                }]
            })),
            "Error" => Json(json!({
                "Data": [{ "Status": "Error", "Error": "remote exploded" }]
            })),
            _ => Json(json!({ "Data": [{ "Status": "Pending" }] })),
        }
    }

    async fn delete_handler(
        State(api): State<Shared>,
        Path(_id): Path<u64>,
    ) -> (StatusCode, Json<Value>) {
        api.lock().unwrap().deletes += 1;
        (StatusCode::OK, Json(json!({})))
    }

    async fn spawn_fake_api(api: FakeApi) -> (String, Shared) {
        let shared: Shared = Arc::new(Mutex::new(api));
        let router = Router::new()
            .route("/contactslist", post(create_list_handler))
            .route("/contactslist/:id/managecontact", post(manage_contact_handler))
            .route("/contactslist/:id/verify", post(launch_handler))
            .route("/contactslist/:id/verify/:job", get(job_status_handler))
            .route("/contactslist/:id", delete(delete_handler))
            .with_state(Arc::clone(&shared));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("http://{}", addr), shared)
    }

    fn test_config(api_base: &str) -> Arc<Config> {
        let mut config = Config::default();
        config.mailjet_api_key = Some("key".to_string());
        config.mailjet_secret_key = Some("secret".to_string());
        config.mailjet_api_base = api_base.to_string();
        config.poll_initial_wait = std::time::Duration::ZERO;
        config.poll_interval = std::time::Duration::from_millis(1);
        config.poll_max_attempts = 5;
        config.launch_max_retries = 3;
        config.launch_retry_base_delay = std::time::Duration::from_millis(5);
        Arc::new(config)
    }

    #[tokio::test]
    async fn completed_job_is_analyzed_and_list_deleted_once() {
        let (base, api) = spawn_fake_api(FakeApi {
            polls_until_terminal: 3,
            terminal_status: "Completed",
            ..Default::default()
        })
        .await;

        let verifier = MailjetVerifier::new(test_config(&base)).unwrap();
        let (sink, mut rx) = EventSink::channel();

        let analysis = verifier
            .run_verification("jane.doe@example.com", &sink)
            .await
            .unwrap();

        assert!(analysis.is_valid);
        assert_eq!(analysis.message, "Deliverable with low bounce risk");

        let counters = api.lock().unwrap();
        assert_eq!(counters.creates, 1);
        assert_eq!(counters.deletes, 1, "list must be deleted exactly once");
        assert_eq!(counters.polls, 3);
        drop(counters);

        // The stream saw one job_status per poll, pending first.
        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::JobStatus { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(statuses, vec!["Pending", "Pending", "Completed"]);
    }

    #[tokio::test]
    async fn job_error_still_deletes_the_list() {
        let (base, api) = spawn_fake_api(FakeApi {
            polls_until_terminal: 1,
            terminal_status: "Error",
            ..Default::default()
        })
        .await;

        let verifier = MailjetVerifier::new(test_config(&base)).unwrap();
        let result = verifier
            .run_verification("jane.doe@example.com", &EventSink::disabled())
            .await;

        match result {
            Err(AppError::JobFailed(message)) => assert!(message.contains("remote exploded")),
            other => panic!("expected JobFailed, got {:?}", other.map(|a| a.message)),
        }
        assert_eq!(api.lock().unwrap().deletes, 1);
    }

    #[tokio::test]
    async fn transient_launch_failures_are_retried_with_backoff() {
        let (base, api) = spawn_fake_api(FakeApi {
            launch_failures_left: 2,
            polls_until_terminal: 1,
            terminal_status: "Completed",
            ..Default::default()
        })
        .await;

        let verifier = MailjetVerifier::new(test_config(&base)).unwrap();
        let analysis = verifier
            .run_verification("jane.doe@example.com", &EventSink::disabled())
            .await
            .unwrap();

        assert!(analysis.is_valid);
        let counters = api.lock().unwrap();
        assert_eq!(counters.launches, 3, "two 503s then one success");
        assert_eq!(counters.deletes, 1);
    }

    #[tokio::test]
    async fn polling_exhaustion_is_a_timeout_not_a_success() {
        let (base, api) = spawn_fake_api(FakeApi {
            polls_until_terminal: u32::MAX,
            terminal_status: "Pending",
            ..Default::default()
        })
        .await;

        let verifier = MailjetVerifier::new(test_config(&base)).unwrap();
        let result = verifier
            .run_verification("jane.doe@example.com", &EventSink::disabled())
            .await;

        match result {
            Err(AppError::PollingTimeout(attempts)) => assert_eq!(attempts, 5),
            other => panic!("expected PollingTimeout, got {:?}", other.map(|a| a.message)),
        }
        assert_eq!(api.lock().unwrap().deletes, 1);
        assert_eq!(api.lock().unwrap().polls, 5);
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_touching_the_api() {
        let (base, api) = spawn_fake_api(FakeApi::default()).await;

        let mut config = (*test_config(&base)).clone();
        config.mailjet_api_key = None;
        let verifier = MailjetVerifier::new(Arc::new(config)).unwrap();

        let result = verifier
            .run_verification("jane.doe@example.com", &EventSink::disabled())
            .await;
        assert!(matches!(result, Err(AppError::MissingCredentials)));
        assert_eq!(api.lock().unwrap().creates, 0);
    }

    #[test]
    fn disposable_list_names_are_unique_per_request() {
        let a = disposable_list_name("jane.doe@example.com");
        let b = disposable_list_name("jane.doe@example.com");
        assert!(a.starts_with("verify_"));
        assert_ne!(a, b);
    }
}
