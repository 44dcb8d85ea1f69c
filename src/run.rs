//! AI strategy runs: backend access, routes and the regenerate flow.
//!
//! Starting a run only queues strategy generation on the backend. The worker
//! appends progress messages to the run's log and finishes with
//! [`STRATEGY_CREATED`]; clients poll the log for that marker before reading
//! the strategy entries.

use crate::session::SessionProvider;
use crate::strategy::StrategiesWithProjects;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Final log message of a completed strategy run
pub const STRATEGY_CREATED: &str = "STRATEGY_CREATED";

/// Delay between log polls while a strategy is generated
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Give up waiting after this many polls
pub const MAX_POLL_ATTEMPTS: usize = 90;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetails {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub strategies: StrategiesWithProjects,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLog {
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[async_trait(?Send)]
pub trait RunBackend: Send + Sync {
    /// Queue a new strategy run and return its id
    async fn start_run(&self, prompt: &str, access_token: &str) -> Result<String>;

    async fn fetch_run(&self, run_id: &str) -> Result<RunDetails>;

    async fn fetch_logs(&self, run_id: &str) -> Result<Vec<RunLog>>;
}

/// Screens the client can navigate to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Strategy { run_id: String },
}

impl Route {
    pub fn strategy(run_id: impl Into<String>) -> Self {
        Route::Strategy {
            run_id: run_id.into(),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Strategy { run_id } => format!("/s/{}", run_id),
        }
    }

    /// Absolute link to the route on the web app
    pub fn url(&self, app_url: &str) -> String {
        format!("{}{}", app_url.trim_end_matches('/'), self.path())
    }

    /// Parse `/s/{runId}`, a full app URL, or a bare run id
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().trim_end_matches('/');
        let run_id = match input.rsplit_once("/s/") {
            Some((_, id)) => id,
            None if !input.contains('/') => input,
            None => return None,
        };
        if run_id.is_empty() || run_id.contains('/') {
            return None;
        }
        Some(Self::strategy(run_id))
    }

    pub fn run_id(&self) -> &str {
        match self {
            Route::Strategy { run_id } => run_id,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegenerateError {
    #[error("User needs to have a session")]
    MissingSession,
    #[error("Prompt cannot be empty")]
    EmptyPrompt,
    #[error("Failed to start run: {0}")]
    Backend(String),
}

/// Start a new run for `prompt` and return the route to navigate to
pub async fn regenerate_strategy(
    prompt: &str,
    sessions: &dyn SessionProvider,
    backend: &dyn RunBackend,
) -> Result<Route, RegenerateError> {
    let session = sessions.session().ok_or(RegenerateError::MissingSession)?;
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(RegenerateError::EmptyPrompt);
    }

    let run_id = backend
        .start_run(prompt, &session.access_token)
        .await
        .map_err(|e| RegenerateError::Backend(format!("{:#}", e)))?;
    info!("Started strategy run {}", run_id);
    Ok(Route::strategy(run_id))
}

/// True once the run's log contains the completion marker
pub fn is_strategy_ready(logs: &[RunLog]) -> bool {
    logs.iter().any(|l| l.message == STRATEGY_CREATED)
}

/// Poll the run's log until the strategy exists, then fetch the run
pub async fn wait_for_strategy(
    backend: &dyn RunBackend,
    run_id: &str,
    interval: Duration,
    max_attempts: usize,
) -> Result<RunDetails> {
    for attempt in 1..=max_attempts {
        let logs = backend.fetch_logs(run_id).await?;
        if is_strategy_ready(&logs) {
            let run = backend.fetch_run(run_id).await?;
            info!("Loaded run {} with {} strategy entries", run_id, run.strategies.len());
            return Ok(run);
        }
        if let Some(last) = logs.last() {
            debug!("Run {} (poll {}/{}): {}", run_id, attempt, max_attempts, last.message);
        }
        if attempt < max_attempts {
            sleep(interval).await;
        }
    }
    warn!("Run {} not ready after {} polls", run_id, max_attempts);
    Err(anyhow!(
        "Strategy for run {} was not created after {} attempts",
        run_id,
        max_attempts
    ))
}

/// JSON API client for the run backend
pub struct HttpRunBackend {
    client: reqwest::Client,
    api_url: String,
}

impl HttpRunBackend {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    fn runs_url(&self, suffix: &str) -> String {
        format!("{}/runs{}", self.api_url, suffix)
    }
}

#[derive(Serialize)]
struct StartRunRequest<'a> {
    prompt: &'a str,
}

#[async_trait(?Send)]
impl RunBackend for HttpRunBackend {
    async fn start_run(&self, prompt: &str, access_token: &str) -> Result<String> {
        let response = self
            .client
            .post(self.runs_url(""))
            .bearer_auth(access_token)
            .json(&StartRunRequest { prompt })
            .send()
            .await?
            .error_for_status()?
            .json::<StartRunResponse>()
            .await?;
        Ok(response.run_id)
    }

    async fn fetch_run(&self, run_id: &str) -> Result<RunDetails> {
        let run = self
            .client
            .get(self.runs_url(&format!("/{}", run_id)))
            .send()
            .await?
            .error_for_status()?
            .json::<RunDetails>()
            .await?;
        Ok(run)
    }

    async fn fetch_logs(&self, run_id: &str) -> Result<Vec<RunLog>> {
        let logs = self
            .client
            .get(self.runs_url(&format!("/{}/logs", run_id)))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RunLog>>()
            .await?;
        Ok(logs)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// In-memory backend; each `fetch_logs` call pops the next batch
    pub(crate) struct FakeBackend {
        pub run: RunDetails,
        pub log_batches: Mutex<Vec<Vec<RunLog>>>,
        pub started: Mutex<Vec<(String, String)>>,
        pub fail_start: bool,
    }

    impl FakeBackend {
        pub(crate) fn new(run: RunDetails) -> Self {
            Self {
                run,
                log_batches: Mutex::new(Vec::new()),
                started: Mutex::new(Vec::new()),
                fail_start: false,
            }
        }

        pub(crate) fn started(&self) -> Vec<(String, String)> {
            self.started.lock().unwrap().clone()
        }
    }

    pub(crate) fn log(message: &str) -> RunLog {
        RunLog {
            message: message.to_string(),
            created_at: None,
        }
    }

    #[async_trait(?Send)]
    impl RunBackend for FakeBackend {
        async fn start_run(&self, prompt: &str, access_token: &str) -> Result<String> {
            if self.fail_start {
                return Err(anyhow!("503 Service Unavailable"));
            }
            self.started
                .lock()
                .unwrap()
                .push((prompt.to_string(), access_token.to_string()));
            Ok("run-2".to_string())
        }

        async fn fetch_run(&self, _run_id: &str) -> Result<RunDetails> {
            Ok(self.run.clone())
        }

        async fn fetch_logs(&self, _run_id: &str) -> Result<Vec<RunLog>> {
            let mut batches = self.log_batches.lock().unwrap();
            if batches.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(batches.remove(0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::session::StoredSession;

    fn run() -> RunDetails {
        RunDetails {
            id: "run-1".to_string(),
            prompt: "fund open source tooling".to_string(),
            strategies: Vec::new(),
        }
    }

    fn signed_in() -> StoredSession {
        let session = StoredSession::default();
        session.set_access_token("token-1");
        session
    }

    // ==================== Route tests ====================

    #[test]
    fn test_route_path_and_url() {
        let route = Route::strategy("abc");
        assert_eq!(route.path(), "/s/abc");
        assert_eq!(route.url("https://fundpublicgoods.ai/"), "https://fundpublicgoods.ai/s/abc");
        assert_eq!(route.to_string(), "/s/abc");
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("/s/abc"), Some(Route::strategy("abc")));
        assert_eq!(
            Route::parse("https://fundpublicgoods.ai/s/abc/"),
            Some(Route::strategy("abc"))
        );
        assert_eq!(Route::parse("abc"), Some(Route::strategy("abc")));
        assert_eq!(Route::parse("/x/abc"), None);
        assert_eq!(Route::parse(""), None);
    }

    // ==================== regenerate tests ====================

    #[test]
    fn test_regenerate_navigates_to_new_run() {
        let backend = FakeBackend::new(run());
        let route =
            tokio_test::block_on(regenerate_strategy(" new prompt ", &signed_in(), &backend))
                .unwrap();
        assert_eq!(route, Route::strategy("run-2"));
        assert_eq!(
            backend.started(),
            vec![("new prompt".to_string(), "token-1".to_string())]
        );
    }

    #[test]
    fn test_regenerate_without_session() {
        let backend = FakeBackend::new(run());
        let result =
            tokio_test::block_on(regenerate_strategy("prompt", &StoredSession::default(), &backend));
        assert_eq!(result, Err(RegenerateError::MissingSession));
        assert_eq!(
            RegenerateError::MissingSession.to_string(),
            "User needs to have a session"
        );
        assert!(backend.started().is_empty());
    }

    #[test]
    fn test_regenerate_empty_prompt() {
        let backend = FakeBackend::new(run());
        let result = tokio_test::block_on(regenerate_strategy("   ", &signed_in(), &backend));
        assert_eq!(result, Err(RegenerateError::EmptyPrompt));
        assert!(backend.started().is_empty());
    }

    #[test]
    fn test_regenerate_backend_failure() {
        let mut backend = FakeBackend::new(run());
        backend.fail_start = true;
        let result = tokio_test::block_on(regenerate_strategy("prompt", &signed_in(), &backend));
        match result {
            Err(RegenerateError::Backend(msg)) => assert!(msg.contains("503")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    // ==================== polling tests ====================

    #[test]
    fn test_wait_for_strategy_polls_until_marker() {
        let backend = FakeBackend::new(run());
        *backend.log_batches.lock().unwrap() = vec![
            vec![log("Extracting prompt from run_id")],
            vec![log("Extracting prompt from run_id"), log("Generating results")],
            vec![log("Generating results"), log(STRATEGY_CREATED)],
        ];
        let loaded =
            tokio_test::block_on(wait_for_strategy(&backend, "run-1", Duration::ZERO, 5)).unwrap();
        assert_eq!(loaded.id, "run-1");
        assert!(backend.log_batches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_wait_for_strategy_gives_up() {
        let backend = FakeBackend::new(run());
        let result = tokio_test::block_on(wait_for_strategy(&backend, "run-1", Duration::ZERO, 3));
        assert!(result.is_err());
    }

    #[test]
    fn test_run_details_deserialize() {
        let json = r#"{"id": "r1", "prompt": "p", "strategies": []}"#;
        let parsed: RunDetails = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, "r1");
        let response: StartRunResponse = serde_json::from_str(r#"{"runId": "r9"}"#).unwrap();
        assert_eq!(response.run_id, "r9");
    }

    #[test]
    fn test_http_backend_urls() {
        let backend = HttpRunBackend::new("https://fundpublicgoods.ai/api/");
        assert_eq!(backend.runs_url(""), "https://fundpublicgoods.ai/api/runs");
        assert_eq!(backend.runs_url("/r1/logs"), "https://fundpublicgoods.ai/api/runs/r1/logs");
    }
}
