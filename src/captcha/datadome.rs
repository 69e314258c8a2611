//! DataDome slider solver.
//!
//! DataDome interstitials embed the challenge in an iframe served from
//! `captcha-delivery.com`; the solving service needs that iframe URL plus
//! the exact user agent the browser presented. The solution is a
//! `datadome=...` cookie which must be installed before reloading.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::generic::GenericTokenSolver;
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
    solution: Option<SliderSolution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SliderSolution {
    #[serde(default)]
    cookie: Option<String>,
}

/// DataDome slider solver over the createTask/getTaskResult protocol.
pub struct DataDomeSolver {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    config: SolverConfig,
}

impl DataDomeSolver {
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
}

#[async_trait]
impl CaptchaSolver for DataDomeSolver {
    async fn solve_if_present(
        &self,
        ctx: SolveContext<'_>,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        if ctx.observation.kind != CaptchaKind::DataDome {
            return Err(CaptchaError::NotConfigured);
        }
        let Some(iframe_url) = &ctx.observation.iframe_url else {
            return Ok(CaptchaOutcome::failed("no challenge iframe URL observed"));
        };
        let Some(user_agent) = ctx.user_agent else {
            // DataDome validates the cookie against the UA that earned it.
            return Ok(CaptchaOutcome::failed(
                "user agent unknown; solution cookie would not validate",
            ));
        };

        let started = Instant::now();

        let mut task = json!({
            "type": "DataDomeSliderTask",
            "websiteURL": ctx.page_url,
            "captchaUrl": iframe_url,
            "userAgent": user_agent,
        });
        if let Some(proxy) = ctx.proxy {
            task["proxy"] = json!(proxy);
        }

        let submit: SubmitReply = GenericTokenSolver::post_json(
            &self.client,
            &self.endpoint,
            "createTask",
            &json!({ "clientKey": self.api_key, "task": task }),
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
        debug!(task_id, "DataDome task submitted");

        loop {
            if started.elapsed() >= self.config.timeout {
                return Err(CaptchaError::Timeout(self.config.timeout));
            }
            sleep(self.config.poll_interval).await;

            let poll: PollReply = GenericTokenSolver::post_json(
                &self.client,
                &self.endpoint,
                "getTaskResult",
                &json!({ "clientKey": self.api_key, "taskId": task_id }),
            )
            .await?;

            if poll.error_id != 0 || poll.error_code.is_some() {
                let reason = poll
                    .error_code
                    .unwrap_or_else(|| format!("errorId {}", poll.error_id));
                warn!(task_id, reason, "DataDome task failed");
                return Ok(CaptchaOutcome::failed(reason));
            }

            match poll.status.as_deref() {
                Some("ready") => {
                    let cookie = poll.solution.and_then(|s| s.cookie);
                    return match cookie {
                        Some(cookie) => Ok(CaptchaOutcome::solved_with_cookie(cookie)),
                        None => Ok(CaptchaOutcome::failed("ready with no cookie")),
                    };
                }
                Some("processing") => continue,
                other => {
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

    fn datadome_observation() -> CaptchaObservation {
        CaptchaObservation {
            kind: CaptchaKind::DataDome,
            site_key: None,
            iframe_url: Some("https://geo.captcha-delivery.com/captcha/?cid=1".to_string()),
        }
    }

    #[tokio::test]
    async fn yields_datadome_cookie() {
        let mut server = mockito::Server::new_async().await;
        let _submit = server
            .mock("POST", "/createTask")
            .with_body(r#"{"errorId":0,"taskId":11}"#)
            .create_async()
            .await;
        let _poll = server
            .mock("POST", "/getTaskResult")
            .with_body(
                r#"{"errorId":0,"status":"ready","solution":{"cookie":"datadome=solved123"}}"#,
            )
            .create_async()
            .await;

        let solver = DataDomeSolver::new(
            server.url(),
            "key",
            SolverConfig {
                timeout: Duration::from_secs(10),
                poll_interval: Duration::from_millis(10),
            },
        )
        .unwrap();

        let observation = datadome_observation();
        let outcome = solver
            .solve_if_present(SolveContext {
                page_url: "https://example.com/a",
                observation: &observation,
                user_agent: Some("Mozilla/5.0 test"),
                proxy: None,
            })
            .await
            .unwrap();

        assert!(outcome.solved);
        assert_eq!(outcome.updated_cookie.as_deref(), Some("datadome=solved123"));
    }

    #[tokio::test]
    async fn refuses_without_user_agent() {
        let solver = DataDomeSolver::new(
            "https://solver.example",
            "key",
            SolverConfig::default(),
        )
        .unwrap();

        let observation = datadome_observation();
        let outcome = solver
            .solve_if_present(SolveContext {
                page_url: "https://example.com/a",
                observation: &observation,
                user_agent: None,
                proxy: None,
            })
            .await
            .unwrap();
        assert!(!outcome.solved);
    }
}
