pub mod orchestrator;
pub mod tool;

pub use orchestrator::*;
pub use tool::*;
