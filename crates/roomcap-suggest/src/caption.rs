use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use roomcap_core::CaptionSettings;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::GenerateError;
use crate::parse;

const SERVICE: &str = "captioning";

/// Floor for the pause between status checks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// State of a captioning job as seen by one status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded(String),
    Failed,
}

/// An asynchronous captioning backend: submit once, then check the returned
/// status URL until the job settles.
#[async_trait]
pub trait CaptionService: Send + Sync {
    /// Start a job for `image_url` and return its status URL.
    async fn submit(&self, image_url: &str) -> Result<String, GenerateError>;

    async fn status(&self, status_url: &str) -> Result<JobStatus, GenerateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the job settles.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl PollPolicy {
    pub fn from_settings(settings: &CaptionSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.poll_interval_ms).max(MIN_POLL_INTERVAL),
            timeout: match settings.poll_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Caption `image_url`, returning an empty string if the job fails or does
/// not finish within the policy's timeout. Transport errors propagate.
#[instrument(skip(service, policy))]
pub async fn get_caption(
    service: &dyn CaptionService,
    image_url: &str,
    policy: &PollPolicy,
) -> Result<String, GenerateError> {
    let status_url = service.submit(image_url).await?;
    debug!(%status_url, "caption job submitted");

    let started = tokio::time::Instant::now();
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        let check = service.status(&status_url);
        let status = match policy.timeout {
            // A hung status call must not outlive the polling budget.
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, check).await {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(attempts, ?limit, "caption status check timed out");
                        return Ok(String::new());
                    }
                }
            }
            None => check.await?,
        };
        match status {
            JobStatus::Succeeded(caption) => {
                info!(attempts, "caption ready");
                return Ok(caption);
            }
            JobStatus::Failed => {
                warn!(attempts, "caption job failed");
                return Ok(String::new());
            }
            JobStatus::Running => {}
        }

        if let Some(limit) = policy.timeout {
            if started.elapsed() + policy.interval > limit {
                warn!(attempts, ?limit, "caption job timed out");
                return Ok(String::new());
            }
        }
        tokio::time::sleep(policy.interval).await;
    }
}

// --- Replicate ---

#[derive(Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    image: &'a str,
    num_beams: u32,
}

/// Captioning through the Replicate predictions API.
pub struct ReplicateCaptioner {
    client: Client,
    api_key: String,
    endpoint: String,
    version: String,
    num_beams: u32,
}

impl ReplicateCaptioner {
    pub fn new(client: Client, settings: &CaptionSettings) -> Self {
        Self {
            client,
            api_key: settings.api_key.clone(),
            endpoint: settings.endpoint.clone(),
            version: settings.version.clone(),
            num_beams: settings.num_beams,
        }
    }

    fn auth(&self) -> Result<String, GenerateError> {
        if self.api_key.is_empty() {
            return Err(GenerateError::MissingCredential("REPLICATE_API_KEY"));
        }
        Ok(format!("Token {}", self.api_key))
    }

    async fn read(&self, resp: reqwest::Response) -> Result<parse::Prediction, GenerateError> {
        let status = resp.status();
        let body = resp.text().await.map_err(|source| GenerateError::Http {
            service: SERVICE,
            source,
        })?;
        if !status.is_success() {
            return Err(GenerateError::Status {
                service: SERVICE,
                status,
                body,
            });
        }
        parse::parse_prediction(&body).map_err(|detail| GenerateError::Malformed {
            service: SERVICE,
            detail,
        })
    }
}

#[async_trait]
impl CaptionService for ReplicateCaptioner {
    async fn submit(&self, image_url: &str) -> Result<String, GenerateError> {
        let request = PredictionRequest {
            version: &self.version,
            input: PredictionInput {
                image: image_url,
                num_beams: self.num_beams,
            },
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, self.auth()?)
            .json(&request)
            .send()
            .await
            .map_err(|source| GenerateError::Http {
                service: SERVICE,
                source,
            })?;
        let prediction = self.read(resp).await?;
        parse::status_url(&prediction).ok_or_else(|| GenerateError::Malformed {
            service: SERVICE,
            detail: "submission response has no urls.get".to_string(),
        })
    }

    async fn status(&self, status_url: &str) -> Result<JobStatus, GenerateError> {
        let resp = self
            .client
            .get(status_url)
            .header(reqwest::header::AUTHORIZATION, self.auth()?)
            .send()
            .await
            .map_err(|source| GenerateError::Http {
                service: SERVICE,
                source,
            })?;
        let prediction = self.read(resp).await?;
        let status = parse::job_status(&prediction);
        if status == JobStatus::Failed {
            if let Some(err) = &prediction.error {
                warn!(error = %err, "captioning service reported an error");
            }
        }
        Ok(status)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use mockito::Matcher;
    use serde_json::json;
    use tokio::time::Instant;

    /// Replays a fixed sequence of job states and records when each status
    /// check happened.
    pub(crate) struct ScriptedCaptioner {
        statuses: Mutex<VecDeque<JobStatus>>,
        pub polls: Mutex<Vec<Instant>>,
        pub submitted: Mutex<Vec<String>>,
    }

    impl ScriptedCaptioner {
        pub(crate) fn new(statuses: Vec<JobStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                polls: Mutex::new(Vec::new()),
                submitted: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn poll_count(&self) -> usize {
            self.polls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CaptionService for ScriptedCaptioner {
        async fn submit(&self, image_url: &str) -> Result<String, GenerateError> {
            self.submitted.lock().unwrap().push(image_url.to_string());
            Ok("https://captions.test/jobs/1".to_string())
        }

        async fn status(&self, status_url: &str) -> Result<JobStatus, GenerateError> {
            assert_eq!(status_url, "https://captions.test/jobs/1");
            self.polls.lock().unwrap().push(Instant::now());
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(JobStatus::Running))
        }
    }

    /// Accepts the job, then never answers a status check.
    struct HungCaptioner;

    #[async_trait]
    impl CaptionService for HungCaptioner {
        async fn submit(&self, _image_url: &str) -> Result<String, GenerateError> {
            Ok("https://captions.test/jobs/1".to_string())
        }

        async fn status(&self, _status_url: &str) -> Result<JobStatus, GenerateError> {
            std::future::pending().await
        }
    }

    struct BrokenCaptioner;

    #[async_trait]
    impl CaptionService for BrokenCaptioner {
        async fn submit(&self, _image_url: &str) -> Result<String, GenerateError> {
            Err(GenerateError::MissingCredential("REPLICATE_API_KEY"))
        }

        async fn status(&self, _status_url: &str) -> Result<JobStatus, GenerateError> {
            unreachable!("status checked without a submitted job")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_three_polls() {
        let svc = ScriptedCaptioner::new(vec![
            JobStatus::Running,
            JobStatus::Running,
            JobStatus::Succeeded("X".into()),
        ]);
        let caption = get_caption(&svc, "https://img/room.jpg", &PollPolicy::default())
            .await
            .unwrap();
        assert_eq!(caption, "X");
        assert_eq!(svc.poll_count(), 3);
        assert_eq!(svc.submitted.lock().unwrap().as_slice(), ["https://img/room.jpg"]);

        let polls = svc.polls.lock().unwrap();
        assert!(polls[2] - polls[1] >= Duration::from_secs(1));
        assert!(polls[1] - polls[0] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_gives_empty_caption() {
        let svc = ScriptedCaptioner::new(vec![JobStatus::Running, JobStatus::Failed]);
        let caption = get_caption(&svc, "u", &PollPolicy::default()).await.unwrap();
        assert_eq!(caption, "");
        assert_eq!(svc.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_stops_polling() {
        let svc = ScriptedCaptioner::new(vec![]);
        let policy = PollPolicy {
            interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(5)),
        };
        let started = Instant::now();
        let caption = get_caption(&svc, "u", &policy).await.unwrap();
        assert_eq!(caption, "");
        // Polls at t=0..=5s; the sixth check sees the limit reached.
        assert_eq!(svc.poll_count(), 6);
        assert!(started.elapsed() <= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_status_check_respects_timeout() {
        let policy = PollPolicy {
            interval: Duration::from_secs(1),
            timeout: Some(Duration::from_secs(5)),
        };
        let started = Instant::now();
        let caption = get_caption(&HungCaptioner, "u", &policy).await.unwrap();
        assert_eq!(caption, "");
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_policy_keeps_polling() {
        let mut statuses = vec![JobStatus::Running; 500];
        statuses.push(JobStatus::Succeeded("late".into()));
        let svc = ScriptedCaptioner::new(statuses);
        let policy = PollPolicy {
            interval: Duration::from_secs(1),
            timeout: None,
        };
        assert_eq!(get_caption(&svc, "u", &policy).await.unwrap(), "late");
        assert_eq!(svc.poll_count(), 501);
    }

    #[tokio::test]
    async fn submit_error_propagates() {
        let err = get_caption(&BrokenCaptioner, "u", &PollPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::MissingCredential(_)));
    }

    #[test]
    fn policy_from_settings() {
        let mut settings = CaptionSettings::default();
        assert_eq!(PollPolicy::from_settings(&settings), PollPolicy::default());
        settings.poll_timeout_secs = 0;
        settings.poll_interval_ms = 250;
        let policy = PollPolicy::from_settings(&settings);
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert!(policy.timeout.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_floored() {
        let settings = CaptionSettings {
            poll_interval_ms: 0,
            poll_timeout_secs: 1,
            ..CaptionSettings::default()
        };
        let policy = PollPolicy::from_settings(&settings);
        assert_eq!(policy.interval, MIN_POLL_INTERVAL);

        let svc = ScriptedCaptioner::new(vec![]);
        assert_eq!(get_caption(&svc, "u", &policy).await.unwrap(), "");
        // Checks at 0, 100, ..., 1000ms.
        assert_eq!(svc.poll_count(), 11);
    }

    #[tokio::test]
    async fn replicate_requires_key() {
        let svc = ReplicateCaptioner::new(Client::new(), &CaptionSettings::default());
        let err = svc.submit("u").await.unwrap_err();
        assert!(matches!(
            err,
            GenerateError::MissingCredential("REPLICATE_API_KEY")
        ));
    }

    fn replicate(server: &mockito::Server) -> ReplicateCaptioner {
        let settings = CaptionSettings {
            api_key: "r8_test".into(),
            endpoint: format!("{}/v1/predictions", server.url()),
            version: "blip-v1".into(),
            ..CaptionSettings::default()
        };
        ReplicateCaptioner::new(Client::new(), &settings)
    }

    #[tokio::test]
    async fn replicate_submits_then_polls_status_url() {
        let mut server = mockito::Server::new_async().await;
        let status_url = format!("{}/v1/predictions/abc", server.url());
        let submit = server
            .mock("POST", "/v1/predictions")
            .match_header("authorization", "Token r8_test")
            .match_body(Matcher::Json(json!({
                "version": "blip-v1",
                "input": {"image": "https://img/room.jpg", "num_beams": 1},
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(json!({"id": "abc", "status": "starting", "urls": {"get": status_url}}).to_string())
            .create_async()
            .await;
        let poll = server
            .mock("GET", "/v1/predictions/abc")
            .match_header("authorization", "Token r8_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"succeeded","output":"a bright bedroom"}"#)
            .create_async()
            .await;

        let svc = replicate(&server);
        let caption = get_caption(&svc, "https://img/room.jpg", &PollPolicy::default())
            .await
            .unwrap();
        assert_eq!(caption, "a bright bedroom");
        submit.assert_async().await;
        poll.assert_async().await;
    }

    #[tokio::test]
    async fn replicate_failed_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _poll = server
            .mock("GET", "/v1/predictions/abc")
            .with_status(200)
            .with_body(r#"{"status":"failed","error":"out of memory"}"#)
            .create_async()
            .await;
        let svc = replicate(&server);
        let status = svc
            .status(&format!("{}/v1/predictions/abc", server.url()))
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn replicate_non_success_is_status_error() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/v1/predictions")
            .with_status(401)
            .with_body(r#"{"detail":"Invalid token."}"#)
            .create_async()
            .await;
        let err = replicate(&server).submit("u").await.unwrap_err();
        match err {
            GenerateError::Status { status, body, .. } => {
                assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
                assert!(body.contains("Invalid token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn replicate_submission_without_status_url_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/v1/predictions")
            .with_status(201)
            .with_body(r#"{"id":"abc","status":"starting"}"#)
            .create_async()
            .await;
        let err = replicate(&server).submit("u").await.unwrap_err();
        assert!(matches!(err, GenerateError::Malformed { service: "captioning", .. }));
    }

    #[test]
    fn submission_body_shape() {
        let body = serde_json::to_value(PredictionRequest {
            version: "v1",
            input: PredictionInput {
                image: "https://img/room.jpg",
                num_beams: 1,
            },
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"version": "v1", "input": {"image": "https://img/room.jpg", "num_beams": 1}})
        );
    }
}
