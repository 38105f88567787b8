//! Event dispatcher: the one place that decides whether an inbound event
//! becomes work.
//!
//! The webhook handler calls `handle` and returns immediately; accepted
//! events run on spawned tasks behind a semaphore so a burst of mentions
//! cannot fan out into unbounded concurrent conversations.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use quarry_core::Orchestrator;
use quarry_provider::LlmMessage;
use quarry_schema::{EventEnvelope, SlackEvent};
use quarry_slack::{markdown_to_mrkdwn, MessageLifecycle, SlackClient, SlackError};

use crate::context::{clean_mention, thread_context};
use crate::dedup::ProcessedEvents;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub dedup_capacity: usize,
    pub max_concurrency: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 1024,
            max_concurrency: 10,
        }
    }
}

pub struct EventDispatcher {
    processed: ProcessedEvents,
    limiter: Arc<Semaphore>,
    slack: Arc<SlackClient>,
    lifecycle: Arc<MessageLifecycle>,
    orchestrator: Arc<Orchestrator>,
}

impl EventDispatcher {
    pub fn new(
        slack: Arc<SlackClient>,
        lifecycle: Arc<MessageLifecycle>,
        orchestrator: Arc<Orchestrator>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            processed: ProcessedEvents::new(config.dedup_capacity),
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            slack,
            lifecycle,
            orchestrator,
        }
    }

    /// Accept or reject one event callback. Returns fast in every case;
    /// the conversational work happens on a spawned task.
    pub fn handle(self: &Arc<Self>, envelope: EventEnvelope) -> bool {
        let Some(event_id) = envelope.event_id else {
            tracing::warn!("event callback without event_id");
            return false;
        };
        let Some(event) = envelope.event else {
            tracing::warn!(%event_id, "event callback without event body");
            return false;
        };

        if let Some(bot_id) = &event.bot_id {
            tracing::debug!(%event_id, %bot_id, "ignoring bot-authored event");
            return true;
        }
        // Recorded before any work starts: a redelivery racing this one
        // sees the id immediately.
        if !self.processed.insert(&event_id) {
            tracing::info!(%event_id, "duplicate event ignored");
            return true;
        }
        if !(event.is_app_mention() || event.is_direct_message()) {
            tracing::debug!(%event_id, kind = %event.kind, "event kind not routed");
            return true;
        }

        let this = Arc::clone(self);
        let trace_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "slack_event",
            %trace_id,
            %event_id,
            channel = %event.channel,
            kind = %event.kind
        );
        tokio::spawn(
            async move {
                let _permit = match this.limiter.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                this.process(event).await;
            }
            .instrument(span),
        );
        true
    }

    async fn process(&self, event: SlackEvent) {
        let channel = event.channel.clone();
        let thread_ts = event.reply_thread_ts().to_string();

        let provisional = self.lifecycle.post_provisional(&channel, &thread_ts).await;

        let context = match self.build_context(&event).await {
            Ok(context) if !context.is_empty() => context,
            Ok(_) => vec![LlmMessage::user(clean_mention(&event.text))],
            Err(e) => {
                tracing::warn!(error = %e, "thread history unavailable, using event text");
                vec![LlmMessage::user(clean_mention(&event.text))]
            }
        };

        let answer = self.orchestrator.converse(context).await;
        let text = markdown_to_mrkdwn(&answer);
        self.lifecycle
            .deliver(&channel, &thread_ts, provisional.as_deref(), &text)
            .await;
    }

    /// Mentions always read the whole thread. DMs read it only when the
    /// message is itself a thread reply; a top-level DM is its own context.
    async fn build_context(&self, event: &SlackEvent) -> Result<Vec<LlmMessage>, SlackError> {
        let wants_history = event.is_app_mention() || event.thread_ts.is_some();
        if wants_history {
            let messages = self
                .slack
                .thread_replies(&event.channel, event.reply_thread_ts())
                .await?;
            Ok(thread_context(&messages))
        } else {
            Ok(vec![LlmMessage::user(clean_mention(&event.text))])
        }
    }
}
