//! Message lifecycle: provisional reply, final edit, oversize splitting.
//!
//! The user sees a "working" message as soon as their event is accepted;
//! once the answer exists the provisional message is edited in place. Every
//! failure path still leaves something visible in the thread.

use std::sync::Arc;

use crate::api::{SlackClient, SlackError};
use crate::split::{split_for_limit, SLACK_MESSAGE_LIMIT};

const WORKING_MESSAGE: &str = ":hourglass_flowing_sand: Working on it...";

pub struct MessageLifecycle {
    slack: Arc<SlackClient>,
    limit: usize,
}

impl MessageLifecycle {
    pub fn new(slack: Arc<SlackClient>) -> Self {
        Self {
            slack,
            limit: SLACK_MESSAGE_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Post the provisional reply into the thread. A failure here degrades
    /// the experience but must not abort the conversation, so it maps to
    /// `None` and the final answer gets posted as a fresh message instead.
    pub async fn post_provisional(&self, channel: &str, thread_ts: &str) -> Option<String> {
        match self
            .slack
            .post_message(channel, WORKING_MESSAGE, Some(thread_ts))
            .await
        {
            Ok(ts) => Some(ts),
            Err(e) => {
                tracing::warn!(channel, error = %e, "provisional message failed");
                None
            }
        }
    }

    /// Deliver the final text: edit the provisional message when there is
    /// one, splitting into follow-up thread messages when the text exceeds
    /// the platform limit.
    pub async fn deliver(
        &self,
        channel: &str,
        thread_ts: &str,
        provisional_ts: Option<&str>,
        text: &str,
    ) {
        let chunks = split_for_limit(text, self.limit);
        match provisional_ts {
            Some(ts) => self.deliver_with_edit(channel, thread_ts, ts, text, chunks).await,
            None => self.post_chunks(channel, thread_ts, &chunks).await,
        }
    }

    async fn deliver_with_edit(
        &self,
        channel: &str,
        thread_ts: &str,
        ts: &str,
        text: &str,
        chunks: Vec<String>,
    ) {
        match self.slack.update_message(channel, ts, &chunks[0]).await {
            Ok(()) => {
                self.post_chunks(channel, thread_ts, &chunks[1..]).await;
            }
            Err(e) if e.is_msg_too_long() => {
                // The platform's ceiling came in under ours; re-split with
                // half the window and try once more.
                let chunks = split_for_limit(text, self.limit / 2);
                match self.slack.update_message(channel, ts, &chunks[0]).await {
                    Ok(()) => self.post_chunks(channel, thread_ts, &chunks[1..]).await,
                    Err(e) => self.render_error(channel, ts, &e).await,
                }
            }
            Err(e) => self.render_error(channel, ts, &e).await,
        }
    }

    async fn post_chunks(&self, channel: &str, thread_ts: &str, chunks: &[String]) {
        for chunk in chunks {
            if let Err(e) = self.slack.post_message(channel, chunk, Some(thread_ts)).await {
                tracing::error!(channel, error = %e, "follow-up chunk failed");
                return;
            }
        }
    }

    /// The user must never be left staring at the working message; replace
    /// it with a visible error block.
    async fn render_error(&self, channel: &str, ts: &str, error: &SlackError) {
        tracing::error!(channel, error = %error, "final message update failed");
        let block = format!("Something went wrong while posting the reply:\n```{error}```");
        if let Err(e) = self.slack.update_message(channel, ts, &block).await {
            tracing::error!(channel, error = %e, "error block update failed");
        }
    }
}
