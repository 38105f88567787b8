use std::sync::Arc;

use quarry_gateway::EventDispatcher;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<EventDispatcher>,
}
