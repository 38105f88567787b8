//! Turning a Slack thread into inference messages.

use quarry_provider::LlmMessage;
use quarry_slack::ThreadMessage;

/// Strip `<@UXXXX>` mention tags and trim the remainder.
pub fn clean_mention(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("<@") {
        let tail = &rest[open + 2..];
        match tail.find('>') {
            Some(close)
                if close > 0
                    && tail[..close]
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) =>
            {
                out.push_str(&rest[..open]);
                rest = &tail[close + 1..];
            }
            _ => {
                out.push_str(&rest[..open + 2]);
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Thread replies → alternating conversation history. Bot-authored messages
/// take the assistant role; messages that are empty after mention cleaning
/// are dropped.
pub fn thread_context(messages: &[ThreadMessage]) -> Vec<LlmMessage> {
    messages
        .iter()
        .filter_map(|m| {
            let text = clean_mention(&m.text);
            if text.is_empty() {
                return None;
            }
            Some(if m.bot_id.is_some() {
                LlmMessage::assistant(text)
            } else {
                LlmMessage::user(text)
            })
        })
        .collect()
}
