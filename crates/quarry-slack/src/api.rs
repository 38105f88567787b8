//! Thin Slack Web API client: post, update, and read thread replies.

use serde::Deserialize;
use thiserror::Error;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum SlackError {
    /// Slack accepted the request but refused it; `code` is the platform's
    /// error string (e.g. `msg_too_long`, `channel_not_found`).
    #[error("slack api error: {code}")]
    Api { code: String },
    #[error("slack http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SlackError {
    pub fn is_msg_too_long(&self) -> bool {
        matches!(self, Self::Api { code } if code == "msg_too_long")
    }
}

/// One message out of `conversations.replies`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SlackClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    messages: Option<Vec<ThreadMessage>>,
}

impl ApiEnvelope {
    fn check(self) -> Result<Self, SlackError> {
        if self.ok {
            Ok(self)
        } else {
            Err(SlackError::Api {
                code: self.error.unwrap_or_else(|| "unknown_error".into()),
            })
        }
    }
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            token: token.into(),
            base_url: SLACK_API_BASE.to_string(),
        }
    }

    /// Point the client at a non-Slack base URL. Test hook.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Post a message, optionally into a thread. Returns the new message ts.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, SlackError> {
        let mut body = serde_json::json!({"channel": channel, "text": text});
        if let Some(ts) = thread_ts {
            body["thread_ts"] = serde_json::Value::String(ts.to_string());
        }
        let envelope = self.call("chat.postMessage", &body).await?;
        Ok(envelope.ts.unwrap_or_default())
    }

    /// Replace the text of an existing message.
    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), SlackError> {
        let body = serde_json::json!({"channel": channel, "ts": ts, "text": text});
        self.call("chat.update", &body).await?;
        Ok(())
    }

    /// Full reply chain of a thread, oldest first.
    pub async fn thread_replies(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Vec<ThreadMessage>, SlackError> {
        let url = format!(
            "{}/conversations.replies?channel={}&ts={}",
            self.base_url, channel, thread_ts
        );
        let envelope: ApiEnvelope = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.check()?.messages.unwrap_or_default())
    }

    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<ApiEnvelope, SlackError> {
        let url = format!("{}/{method}", self.base_url);
        let envelope: ApiEnvelope = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        envelope.check()
    }
}
