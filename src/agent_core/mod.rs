//! Agent Core: conversation history and the tool-orchestration loop.

pub mod conversation;
pub mod errors;
pub mod orchestrator;
pub mod tool_router;
pub mod types;

pub use conversation::Conversation;
pub use errors::AgentError;
pub use orchestrator::Orchestrator;
pub use tool_router::{LiveExecutor, StubExecutor, ToolExecutor, ToolRouter};
pub use types::{Message, ToolInvocationRecord, ToolOutcome};
