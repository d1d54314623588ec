use async_trait::async_trait;

use crate::error::Result;
use crate::registry::{AssistantHandle, AssistantSpec};
use crate::run::Run;
use crate::tool::ToolOutput;
use crate::{Message, Role};

pub mod openai;

/// The remote operations a turn consumes from a hosted assistant service.
///
/// Every method is a single request/response; none of them retry.
#[async_trait]
pub trait AssistantsApi: Send + Sync {
    /// Creates a new assistant definition
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle>;

    /// Fetches an existing assistant, failing if it no longer exists
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantHandle>;

    /// Opens a new conversation thread and returns its id
    async fn create_thread(&self) -> Result<String>;

    /// Appends a message to a thread
    async fn create_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()>;

    /// Starts a run of `assistant_id` against the thread
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Answers the run's pending tool calls in one batch
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run>;

    /// Lists the thread's messages, oldest first
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>>;
}
