pub mod api;
pub mod lifecycle;
pub mod mrkdwn;
pub mod split;

pub use api::{SlackClient, SlackError, ThreadMessage};
pub use lifecycle::MessageLifecycle;
pub use mrkdwn::markdown_to_mrkdwn;
pub use split::{split_for_limit, SLACK_MESSAGE_LIMIT};
