//! Markdown to Slack mrkdwn conversion.
//!
//! Covers what the model actually emits: headings, bold, strikethrough and
//! inline links. Fenced code blocks pass through untouched.

pub fn markdown_to_mrkdwn(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_code_block = false;

    for line in input.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            out.push(line.to_string());
            continue;
        }
        if in_code_block {
            out.push(line.to_string());
            continue;
        }
        out.push(convert_line(line));
    }

    let mut result = out.join("\n");
    if input.ends_with('\n') {
        result.push('\n');
    }
    result
}

fn convert_line(line: &str) -> String {
    let line = match strip_heading(line) {
        Some(rest) => format!("*{}*", rest.trim_end()),
        None => line.to_string(),
    };
    let line = convert_links(&line);
    let line = line.replace("**", "*");
    line.replace("~~", "~")
}

/// `## title` → `title`; anything else → None.
fn strip_heading(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) {
        trimmed[hashes..].strip_prefix(' ')
    } else {
        None
    }
}

/// `[text](url)` → `<url|text>`.
fn convert_links(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find('[') {
        let Some(mid) = rest[open..].find("](").map(|i| open + i) else {
            break;
        };
        let Some(close) = rest[mid + 2..].find(')').map(|i| mid + 2 + i) else {
            break;
        };
        let text = &rest[open + 1..mid];
        let url = &rest[mid + 2..close];
        out.push_str(&rest[..open]);
        out.push_str(&format!("<{url}|{text}>"));
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}
