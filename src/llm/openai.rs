//! OpenAI-compatible chat-completions client for selector suggestion.
//!
//! Posts one deterministic (temperature 0) request per discovery iteration
//! and salvages the candidate array from whatever shape the reply takes.
//! Rate-limit and transient server errors retry with exponential backoff,
//! honoring a server-advised delay when one is sent.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, warn};

use super::{SelectorPrompt, XpathSuggester, parse_xpath_reply};
use crate::config::ScraperConfig;

const SYSTEM_PROMPT: &str = "You analyze the structure of web pages. Given a simplified DOM, \
sample text from the article, and the page URL, respond with the XPath of the element that \
contains the main article content. Respond with a JSON array of candidate XPath strings, \
most promising first, and nothing else. No prose, no markdown.";

/// Base delay of the backoff schedule; doubles per retry (1s, 2s, 4s).
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Retries after the initial attempt.
const MAX_ATTEMPT_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Production [`XpathSuggester`] over an OpenAI-compatible endpoint.
pub struct OpenAiSuggester {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiSuggester {
    /// Build the client from the validated configuration.
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.llm_timeout())
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.llm_endpoint().to_string(),
            api_key: config.llm_api_key().map(str::to_string),
            model: config.llm_model().to_string(),
        })
    }

    fn render_user_message(prompt: &SelectorPrompt<'_>) -> String {
        let mut message = String::with_capacity(prompt.simplified_dom.len() + 1024);
        let _ = writeln!(message, "URL: {}", prompt.url);

        if !prompt.snippets.is_empty() {
            message.push_str("\nText that appears in the main content:\n");
            for snippet in prompt.snippets {
                let _ = writeln!(message, "- {snippet}");
            }
        }

        if !prompt.feedback.is_empty() {
            message.push_str("\nSelectors already tried that did NOT work:\n");
            for entry in prompt.feedback {
                let _ = writeln!(message, "- {}: {}", entry.xpath, entry.reason);
            }
            message.push_str("Do not repeat any of them.\n");
        }

        message.push_str("\nSimplified DOM:\n");
        message.push_str(prompt.simplified_dom);
        message
    }

    async fn post_once(&self, body: &serde_json::Value) -> Result<LlmHttpOutcome> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("LLM request failed")?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let advised = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Ok(LlmHttpOutcome::Transient { status, advised });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, body, "LLM provider rejected the request");
            return Err(anyhow!("LLM provider returned {status}"));
        }

        let reply: ChatReply = response
            .json()
            .await
            .context("Failed to decode LLM response body")?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("LLM response contained no choices"))?;

        Ok(LlmHttpOutcome::Reply(content))
    }
}

enum LlmHttpOutcome {
    Reply(String),
    Transient {
        status: reqwest::StatusCode,
        advised: Option<Duration>,
    },
}

#[async_trait]
impl XpathSuggester for OpenAiSuggester {
    async fn suggest_xpaths(&self, prompt: SelectorPrompt<'_>) -> Result<Vec<String>> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::render_user_message(&prompt) },
            ],
        });

        let mut attempt = 0u32;
        loop {
            match self.post_once(&body).await? {
                LlmHttpOutcome::Reply(content) => {
                    let candidates = parse_xpath_reply(&content);
                    if candidates.is_empty() {
                        debug!(content, "LLM reply yielded no parseable XPaths");
                    }
                    return Ok(candidates);
                }
                LlmHttpOutcome::Transient { status, advised } => {
                    if attempt >= MAX_ATTEMPT_RETRIES {
                        return Err(anyhow!(
                            "LLM provider still failing ({status}) after {MAX_ATTEMPT_RETRIES} retries"
                        ));
                    }
                    let backoff = BACKOFF_BASE * 2u32.pow(attempt);
                    let delay = advised.unwrap_or(backoff);
                    warn!(%status, ?delay, attempt, "LLM transient failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::feedback::FeedbackEntry;

    #[test]
    fn user_message_carries_all_sections() {
        let snippets = vec!["First long paragraph…".to_string()];
        let feedback = vec![FeedbackEntry {
            xpath: "//div[@id='old']".to_string(),
            reason: "matched 0 elements".to_string(),
        }];
        let prompt = SelectorPrompt {
            url: "https://example.com/a",
            simplified_dom: "<body><article id=\"main\"></article></body>",
            snippets: &snippets,
            feedback: &feedback,
        };

        let message = OpenAiSuggester::render_user_message(&prompt);
        assert!(message.contains("URL: https://example.com/a"));
        assert!(message.contains("First long paragraph…"));
        assert!(message.contains("//div[@id='old']: matched 0 elements"));
        assert!(message.contains("article id=\"main\""));
    }
}
