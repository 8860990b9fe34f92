//! HTTP research provider adapter.
//!
//! Speaks a small JSON protocol against a configurable base URL; both
//! concrete providers are instances of this adapter pointed at different
//! endpoints. HTTP statuses are mapped onto `ProviderError` so the retry
//! layer can classify them.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::models::{ProviderConfig, ProviderResult, Question};
use crate::domain::ports::{
    ProviderError, ResearchProvider, RunHandle, RunPoll, SessionReply, SessionStart,
};

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl HttpProviderConfig {
    pub fn from_provider_config(config: &ProviderConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct HttpResearchProvider {
    name: &'static str,
    config: HttpProviderConfig,
    client: Client,
}

impl HttpResearchProvider {
    pub fn new(name: &'static str, config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self { name, config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, ProviderError> {
        let response = check_status(response)?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy.
fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthenticationFailed(status.to_string()));
    }
    if status.is_client_error() {
        return Err(ProviderError::InvalidRequest(status.to_string()));
    }
    Err(ProviderError::ServerError {
        status: status.as_u16(),
        message: status.to_string(),
    })
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct StartSessionRequest<'a> {
    topic: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartSessionResponse {
    session_id: String,
    #[serde(default)]
    questions: Vec<WireQuestion>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireQuestion {
    index: u32,
    text: String,
}

impl From<WireQuestion> for Question {
    fn from(q: WireQuestion) -> Self {
        Question { index: q.index, text: q.text }
    }
}

#[derive(Debug, Serialize)]
struct SubmitAnswerRequest<'a> {
    index: u32,
    answer: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitAnswerResponse {
    #[serde(default)]
    next_question: Option<WireQuestion>,
    #[serde(default)]
    final_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteRunRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExecuteRunResponse {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct PollResultResponse {
    status: String,
    #[serde(default)]
    result: Option<ProviderResult>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ResearchProvider for HttpResearchProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn start_session(&self, topic: &str) -> Result<SessionStart, ProviderError> {
        let response = self
            .authorize(self.client.post(self.url("/v1/sessions")))
            .json(&StartSessionRequest { topic })
            .send()
            .await
            .map_err(map_transport_error)?;

        let body: StartSessionResponse = Self::parse_json(response).await?;
        Ok(SessionStart {
            session_id: body.session_id,
            questions: body.questions.into_iter().map(Into::into).collect(),
        })
    }

    async fn submit_answer(
        &self,
        session_id: &str,
        answer: &str,
        question_index: u32,
    ) -> Result<SessionReply, ProviderError> {
        let response = self
            .authorize(
                self.client
                    .post(self.url(&format!("/v1/sessions/{session_id}/answers"))),
            )
            .json(&SubmitAnswerRequest { index: question_index, answer })
            .send()
            .await
            .map_err(map_transport_error)?;

        let body: SubmitAnswerResponse = Self::parse_json(response).await?;
        Ok(SessionReply {
            next_question: body.next_question.map(Into::into),
            final_prompt: body.final_prompt,
        })
    }

    async fn execute_run(
        &self,
        session_id: Option<&str>,
        prompt: &str,
    ) -> Result<RunHandle, ProviderError> {
        let response = self
            .authorize(self.client.post(self.url("/v1/runs")))
            .json(&ExecuteRunRequest { session_id, prompt })
            .send()
            .await
            .map_err(map_transport_error)?;

        let body: ExecuteRunResponse = Self::parse_json(response).await?;
        Ok(RunHandle { job_id: body.job_id })
    }

    async fn poll_result(&self, job_id: &str) -> Result<RunPoll, ProviderError> {
        let response = self
            .authorize(self.client.get(self.url(&format!("/v1/runs/{job_id}"))))
            .send()
            .await
            .map_err(map_transport_error)?;

        let body: PollResultResponse = Self::parse_json(response).await?;
        match body.status.as_str() {
            "pending" | "running" => Ok(RunPoll::Pending),
            "completed" => {
                let result = body.result.ok_or_else(|| {
                    ProviderError::MalformedResponse("completed run without result".into())
                })?;
                Ok(RunPoll::Completed(result))
            }
            "failed" => Ok(RunPoll::Failed(
                body.error.unwrap_or_else(|| "provider reported failure".to_string()),
            )),
            other => Err(ProviderError::MalformedResponse(format!(
                "unknown run status: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_for(server: &mockito::ServerGuard) -> HttpResearchProvider {
        HttpResearchProvider::new(
            "test",
            HttpProviderConfig {
                base_url: server.url(),
                api_key: None,
                timeout: Duration::from_secs(5),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_session_parses_questions() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/sessions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"session_id":"s-1","questions":[{"index":1,"text":"Scope?"}]}"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server);
        let start = provider.start_session("batteries").await.unwrap();

        assert_eq!(start.session_id, "s-1");
        assert_eq!(start.questions.len(), 1);
        assert_eq!(start.questions[0].text, "Scope?");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_maps_with_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/runs")
            .with_status(429)
            .with_header("retry-after", "17")
            .create_async()
            .await;

        let provider = provider_for(&server);
        let err = provider.execute_run(None, "prompt").await.unwrap_err();

        assert!(matches!(
            err,
            ProviderError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(17)
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/runs")
            .with_status(400)
            .create_async()
            .await;

        let provider = provider_for(&server);
        let err = provider.execute_run(None, "prompt").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_poll_statuses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/runs/j-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"pending"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/runs/j-2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"completed","result":{"summary":"done","findings":[],"metadata":null}}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/v1/runs/j-3")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"failed","error":"ran out of budget"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server);
        assert_eq!(provider.poll_result("j-1").await.unwrap(), RunPoll::Pending);

        let RunPoll::Completed(result) = provider.poll_result("j-2").await.unwrap() else {
            panic!("expected completion");
        };
        assert_eq!(result.summary, "done");

        assert_eq!(
            provider.poll_result("j-3").await.unwrap(),
            RunPoll::Failed("ran out of budget".into())
        );
    }
}
