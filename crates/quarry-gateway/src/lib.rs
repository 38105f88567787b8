//! Event gateway: dedup, routing and the bounded processing pool between
//! the webhook surface and the conversation orchestrator.

pub mod context;
pub mod dedup;
pub mod dispatcher;

pub use context::{clean_mention, thread_context};
pub use dedup::ProcessedEvents;
pub use dispatcher::{DispatcherConfig, EventDispatcher};
