// Relay between a chat surface, a hosted assistant run, and web search.
//
// `conversation` holds the turn state machine; everything else is the data
// model and the clients it talks to.

pub mod config;
pub mod conversation;
pub mod error;
pub mod message;
pub mod provider;
pub mod registry;
pub mod run;
pub mod search;
pub mod secret;
pub mod session;
pub mod token;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export the main types for convenient usage
pub use config::Config;
pub use conversation::{ConversationRun, RunOptions, TurnReply};
pub use error::{Error, Result, ToolError};
pub use message::{Message, Role};
pub use provider::AssistantsApi;
pub use registry::{AssistantHandle, AssistantRegistry, AssistantSpec};
pub use run::{Run, RunHandle, RunPhase, RunStatus};
pub use search::{ContextEncoding, SearchContext, SearchProvider};
pub use secret::Secret;
pub use session::Session;
pub use token::TokenBudget;
pub use tool::{SearchTool, ToolCall, ToolDefinition, ToolOutput};
