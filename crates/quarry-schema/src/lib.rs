//! Inbound Slack payload model shared by the webhook surface and the
//! event dispatcher.

use serde::{Deserialize, Serialize};

/// Outer payload delivered to the Events API endpoint.
///
/// Slack sends two shapes on the same route: a one-time `url_verification`
/// handshake carrying `challenge`, and `event_callback` envelopes carrying
/// the actual event plus a delivery-unique `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

impl EventEnvelope {
    pub fn is_url_verification(&self) -> bool {
        self.kind == "url_verification"
    }

    pub fn is_event_callback(&self) -> bool {
        self.kind == "event_callback"
    }
}

/// Inner event object. Only the fields the dispatcher routes on are modeled;
/// everything else Slack sends is ignored at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
}

impl SlackEvent {
    pub fn is_app_mention(&self) -> bool {
        self.kind == "app_mention"
    }

    pub fn is_direct_message(&self) -> bool {
        self.kind == "message" && self.channel_type.as_deref() == Some("im")
    }

    /// Thread anchor for replies: the existing thread when there is one,
    /// otherwise the event's own ts starts a new thread.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_verification() {
        let json = r#"{"type":"url_verification","challenge":"abc123","token":"t"}"#;
        let env: EventEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.is_url_verification());
        assert_eq!(env.challenge.as_deref(), Some("abc123"));
        assert!(env.event.is_none());
    }

    #[test]
    fn parses_app_mention_callback() {
        let json = r#"{
            "type": "event_callback",
            "event_id": "Ev001",
            "team_id": "T1",
            "event": {
                "type": "app_mention",
                "channel": "C42",
                "user": "U7",
                "text": "<@UBOT> what is up",
                "ts": "1700000000.000100"
            }
        }"#;
        let env: EventEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.is_event_callback());
        assert_eq!(env.event_id.as_deref(), Some("Ev001"));
        let ev = env.event.unwrap();
        assert!(ev.is_app_mention());
        assert!(!ev.is_direct_message());
        assert_eq!(ev.reply_thread_ts(), "1700000000.000100");
    }

    #[test]
    fn direct_message_routing_fields() {
        let json = r#"{
            "type": "message",
            "channel": "D9",
            "channel_type": "im",
            "user": "U7",
            "text": "hello",
            "ts": "2.0",
            "thread_ts": "1.0"
        }"#;
        let ev: SlackEvent = serde_json::from_str(json).unwrap();
        assert!(ev.is_direct_message());
        assert_eq!(ev.reply_thread_ts(), "1.0");
        assert!(ev.bot_id.is_none());
    }

    #[test]
    fn bot_message_carries_bot_id() {
        let json = r#"{
            "type": "message",
            "channel": "D9",
            "channel_type": "im",
            "bot_id": "B1",
            "text": "I am a bot",
            "ts": "3.0"
        }"#;
        let ev: SlackEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.bot_id.as_deref(), Some("B1"));
        assert!(ev.user.is_none());
    }
}
