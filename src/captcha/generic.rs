//! Token-based solver for generic widget challenges (reCAPTCHA-style).
//!
//! Speaks the common createTask/getTaskResult protocol: submit the site
//! key and page URL, then poll until the task is ready. Any non-zero
//! error id, error code, or unknown status terminates polling immediately;
//! only an explicit `processing` keeps it going.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::{CaptchaError, CaptchaOutcome, CaptchaSolver, SolveContext, SolverConfig};
use crate::browser::CaptchaKind;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitReply {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    task_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollReply {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<PollSolution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollSolution {
    #[serde(default)]
    cookie: Option<String>,
    #[serde(default)]
    g_recaptcha_response: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// Generic widget-challenge solver.
pub struct GenericTokenSolver {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    config: SolverConfig,
}

impl GenericTokenSolver {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        config: SolverConfig,
    ) -> Result<Self, CaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CaptchaError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            config,
        })
    }

    pub(crate) async fn post_json<T: serde::de::DeserializeOwned>(
        client: &reqwest::Client,
        endpoint: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, CaptchaError> {
        let url = format!("{}/{path}", endpoint.trim_end_matches('/'));
        let response = client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CaptchaError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptchaError::Provider(format!(
                "{path} returned {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CaptchaError::Transport(format!("bad {path} body: {e}")))
    }
}

#[async_trait]
impl CaptchaSolver for GenericTokenSolver {
    async fn solve_if_present(
        &self,
        ctx: SolveContext<'_>,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        if ctx.observation.kind != CaptchaKind::Generic {
            return Err(CaptchaError::NotConfigured);
        }
        let Some(site_key) = &ctx.observation.site_key else {
            return Ok(CaptchaOutcome::failed("challenge exposes no site key"));
        };

        let started = Instant::now();

        let submit: SubmitReply = Self::post_json(
            &self.client,
            &self.endpoint,
            "createTask",
            &json!({
                "clientKey": self.api_key,
                "task": {
                    "type": "NoCaptchaTaskProxyless",
                    "websiteURL": ctx.page_url,
                    "websiteKey": site_key,
                },
            }),
        )
        .await?;

        if submit.error_id != 0 || submit.error_code.is_some() {
            return Err(CaptchaError::Provider(format!(
                "task rejected: {}",
                submit
                    .error_code
                    .unwrap_or_else(|| submit.error_id.to_string())
            )));
        }
        let Some(task_id) = submit.task_id else {
            return Err(CaptchaError::Provider("no task id returned".to_string()));
        };
        debug!(task_id, "Captcha task submitted");

        loop {
            if started.elapsed() >= self.config.timeout {
                return Err(CaptchaError::Timeout(self.config.timeout));
            }
            sleep(self.config.poll_interval).await;

            let poll: PollReply = Self::post_json(
                &self.client,
                &self.endpoint,
                "getTaskResult",
                &json!({ "clientKey": self.api_key, "taskId": task_id }),
            )
            .await?;

            // Any error indicator ends polling, not just a terminal status.
            if poll.error_id != 0 || poll.error_code.is_some() {
                let reason = poll
                    .error_code
                    .unwrap_or_else(|| format!("errorId {}", poll.error_id));
                warn!(task_id, reason, "Captcha task failed");
                return Ok(CaptchaOutcome::failed(reason));
            }

            match poll.status.as_deref() {
                Some("ready") => {
                    let solution = poll.solution.ok_or_else(|| {
                        CaptchaError::Provider("ready with no solution".to_string())
                    })?;
                    let cookie = solution.cookie.or_else(|| {
                        solution
                            .g_recaptcha_response
                            .or(solution.token)
                            .map(|t| format!("captcha-token={t}"))
                    });
                    return Ok(CaptchaOutcome {
                        solved: true,
                        updated_cookie: cookie,
                        reason: None,
                    });
                }
                Some("processing") => continue,
                other => {
                    // Unknown status is fatal; the service is not going to
                    // converge while we burn the scrape budget.
                    return Ok(CaptchaOutcome::failed(format!(
                        "unexpected task status: {}",
                        other.unwrap_or("<missing>")
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::CaptchaObservation;
    use std::time::Duration;

    fn generic_observation() -> CaptchaObservation {
        CaptchaObservation {
            kind: CaptchaKind::Generic,
            site_key: Some("site-key-1".to_string()),
            iframe_url: None,
        }
    }

    fn fast_config() -> SolverConfig {
        SolverConfig {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
        }
    }

    async fn solve_against(server: &mockito::ServerGuard) -> Result<CaptchaOutcome, CaptchaError> {
        let solver = GenericTokenSolver::new(server.url(), "key", fast_config()).unwrap();
        let observation = generic_observation();
        solver
            .solve_if_present(SolveContext {
                page_url: "https://example.com",
                observation: &observation,
                user_agent: None,
                proxy: None,
            })
            .await
    }

    #[tokio::test]
    async fn solves_when_task_is_ready() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/createTask")
            .with_body(r#"{"errorId":0,"taskId":7}"#)
            .create_async()
            .await;
        let _poll = server
            .mock("POST", "/getTaskResult")
            .with_body(r#"{"errorId":0,"status":"ready","solution":{"cookie":"cf=ok"}}"#)
            .create_async()
            .await;

        let outcome = solve_against(&server).await.unwrap();
        assert!(outcome.solved);
        assert_eq!(outcome.updated_cookie.as_deref(), Some("cf=ok"));
    }

    #[tokio::test]
    async fn any_error_indicator_terminates_polling() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/createTask")
            .with_body(r#"{"errorId":0,"taskId":8}"#)
            .create_async()
            .await;
        // errorCode set while status still claims processing: must stop.
        let poll = server
            .mock("POST", "/getTaskResult")
            .with_body(r#"{"errorId":0,"errorCode":"ERROR_UNSOLVABLE","status":"processing"}"#)
            .expect(1)
            .create_async()
            .await;

        let outcome = solve_against(&server).await.unwrap();
        assert!(!outcome.solved);
        assert_eq!(outcome.reason.as_deref(), Some("ERROR_UNSOLVABLE"));
        poll.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_submit_is_a_provider_error() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/createTask")
            .with_body(r#"{"errorId":1,"errorCode":"ERROR_KEY_DOES_NOT_EXIST"}"#)
            .create_async()
            .await;

        let err = solve_against(&server).await.unwrap_err();
        assert!(matches!(err, CaptchaError::Provider(_)));
    }

    #[tokio::test]
    async fn unknown_status_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/createTask")
            .with_body(r#"{"errorId":0,"taskId":9}"#)
            .create_async()
            .await;
        let poll = server
            .mock("POST", "/getTaskResult")
            .with_body(r#"{"errorId":0,"status":"paused"}"#)
            .expect(1)
            .create_async()
            .await;

        let outcome = solve_against(&server).await.unwrap();
        assert!(!outcome.solved);
        assert!(outcome.reason.unwrap().contains("paused"));
        poll.assert_async().await;
    }
}
