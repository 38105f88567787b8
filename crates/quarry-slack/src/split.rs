//! Splitting over-long replies into postable chunks.

/// Slack rejects chat messages around 4000 characters; stay under it with
/// headroom for mrkdwn escapes.
pub const SLACK_MESSAGE_LIMIT: usize = 3900;

/// Split `text` into the fewest chunks of at most `limit` characters,
/// cutting on line boundaries where one exists inside the window. Chunks
/// keep their trailing newlines, so concatenating them reproduces `text`
/// exactly.
pub fn split_for_limit(text: &str, limit: usize) -> Vec<String> {
    debug_assert!(limit > 0);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > limit {
        let boundary = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..boundary];
        let cut = match window.rfind('\n') {
            // keep the newline with the leading chunk
            Some(pos) if pos > 0 => pos + 1,
            _ => boundary,
        };
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    chunks.push(rest.to_string());
    chunks
}
