//! Scripted doubles for the remote services.
//!
//! `ScriptedAssistantsApi` keeps threads, runs and assistants in memory and
//! moves each run through a caller-supplied list of [`RunStep`]s, one per
//! status poll. Every call is counted so tests can assert on traffic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::message::{Message, Role};
use crate::provider::AssistantsApi;
use crate::registry::{AssistantHandle, AssistantSpec};
use crate::run::{RequiredAction, Run, RunError, RunStatus, SubmitToolOutputs};
use crate::search::{SearchContext, SearchProvider};
use crate::tool::{ToolCall, ToolOutput};

/// What the next status poll of a run reports
#[derive(Debug, Clone)]
pub enum RunStep {
    Pending,
    RequiresAction(Vec<ToolCall>),
    Completed,
    Failed(String),
}

impl RunStep {
    /// A `requires_action` step asking for one search
    pub fn search_call(id: &str, query: &str) -> Self {
        let arguments = serde_json::json!({ "query": query }).to_string();
        RunStep::RequiresAction(vec![ToolCall::new(id, "search", arguments)])
    }
}

/// Number of calls made to each remote operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create_assistant: usize,
    pub retrieve_assistant: usize,
    pub create_thread: usize,
    pub create_message: usize,
    pub create_run: usize,
    pub retrieve_run: usize,
    pub submit_tool_outputs: usize,
    pub list_messages: usize,
}

#[derive(Debug, Default)]
struct ScriptState {
    script: VecDeque<RunStep>,
    stalled: bool,
    reply: Option<String>,
    fail_assistant_creation: bool,
    assistants: HashMap<String, AssistantHandle>,
    threads: HashMap<String, Vec<Message>>,
    thread_order: Vec<String>,
    runs: HashMap<String, Run>,
    submitted: Vec<Vec<ToolOutput>>,
    calls: CallCounts,
    next_id: usize,
}

impl ScriptState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }
}

/// In-memory Assistants API driven by a script of run steps
#[derive(Debug, Clone, Default)]
pub struct ScriptedAssistantsApi {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedAssistantsApi {
    /// A service whose runs complete on the first poll with a stock reply
    pub fn new() -> Self {
        let api = Self::default();
        api.state.lock().unwrap().reply = Some("Here is what I found.".to_string());
        api
    }

    /// Steps handed out to status polls, across all runs, in order.
    /// Once the script is exhausted every poll reports `completed`.
    pub fn with_script(self, steps: Vec<RunStep>) -> Self {
        self.state.lock().unwrap().script = steps.into();
        self
    }

    /// Text of the assistant message appended when a run completes
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.state.lock().unwrap().reply = Some(reply.into());
        self
    }

    /// Once the script is exhausted, polls keep reporting `in_progress`
    pub fn stalled(self) -> Self {
        self.state.lock().unwrap().stalled = true;
        self
    }

    pub fn fail_assistant_creation(self) -> Self {
        self.state.lock().unwrap().fail_assistant_creation = true;
        self
    }

    /// Pre-populates a thread, bypassing the call counters
    pub fn seed_thread(&self, thread_id: &str, messages: Vec<Message>) {
        self.state
            .lock()
            .unwrap()
            .threads
            .insert(thread_id.to_string(), messages);
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls.clone()
    }

    /// Thread ids in creation order
    pub fn threads_created(&self) -> Vec<String> {
        self.state.lock().unwrap().thread_order.clone()
    }

    /// Every batch passed to `submit_tool_outputs`, in order
    pub fn submitted_outputs(&self) -> Vec<Vec<ToolOutput>> {
        self.state.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl AssistantsApi for ScriptedAssistantsApi {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_assistant += 1;
        if state.fail_assistant_creation {
            return Err(Error::ProviderUnavailable("assistant creation is disabled".into()));
        }
        let handle = AssistantHandle {
            id: state.next_id("asst"),
            name: Some(spec.name.clone()),
            model: spec.model.clone(),
            instructions: Some(spec.instructions.clone()),
            tools: spec.tools.clone(),
        };
        state.assistants.insert(handle.id.clone(), handle.clone());
        Ok(handle)
    }

    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.retrieve_assistant += 1;
        state
            .assistants
            .get(assistant_id)
            .cloned()
            .ok_or_else(|| Error::ProviderUnavailable(format!("No assistant found with id '{assistant_id}'.")))
    }

    async fn create_thread(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_thread += 1;
        let id = state.next_id("thread");
        state.threads.insert(id.clone(), Vec::new());
        state.thread_order.push(id.clone());
        Ok(id)
    }

    async fn create_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_message += 1;
        let thread = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| Error::ProviderUnavailable(format!("No thread found with id '{thread_id}'.")))?;
        thread.push(Message {
            role,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> Result<Run> {
        let mut state = self.state.lock().unwrap();
        state.calls.create_run += 1;
        let run = Run {
            id: state.next_id("run"),
            thread_id: thread_id.to_string(),
            status: RunStatus::Queued,
            required_action: None,
            last_error: None,
        };
        state.runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.state.lock().unwrap();
        state.calls.retrieve_run += 1;
        let exhausted = if state.stalled {
            RunStep::Pending
        } else {
            RunStep::Completed
        };
        let step = state.script.pop_front().unwrap_or(exhausted);
        let reply = state.reply.clone();

        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::ProviderUnavailable(format!("No run found with id '{run_id}'.")))?;
        run.required_action = None;
        match step {
            RunStep::Pending => run.status = RunStatus::InProgress,
            RunStep::RequiresAction(tool_calls) => {
                run.status = RunStatus::RequiresAction;
                run.required_action = Some(RequiredAction {
                    action_type: "submit_tool_outputs".to_string(),
                    submit_tool_outputs: SubmitToolOutputs { tool_calls },
                });
            }
            RunStep::Completed => run.status = RunStatus::Completed,
            RunStep::Failed(message) => {
                run.status = RunStatus::Failed;
                run.last_error = Some(RunError {
                    code: Some("server_error".to_string()),
                    message,
                });
            }
        }
        let run = run.clone();

        if run.status == RunStatus::Completed {
            if let (Some(reply), Some(thread)) = (reply, state.threads.get_mut(thread_id)) {
                thread.push(Message::assistant(reply));
            }
        }
        Ok(run)
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        let mut state = self.state.lock().unwrap();
        state.calls.submit_tool_outputs += 1;
        state.submitted.push(outputs.to_vec());
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::ProviderUnavailable(format!("No run found with id '{run_id}'.")))?;
        run.status = RunStatus::Queued;
        run.required_action = None;
        Ok(run.clone())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_messages += 1;
        state
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| Error::ProviderUnavailable(format!("No thread found with id '{thread_id}'.")))
    }
}

/// Search double returning a fixed blob and recording queries
#[derive(Debug, Clone, Default)]
pub struct ScriptedSearch {
    blob: Option<String>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSearch {
    pub fn new(blob: impl Into<String>) -> Self {
        Self {
            blob: Some(blob.into()),
            queries: Arc::default(),
        }
    }

    /// A search backend whose every call fails
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<SearchContext> {
        self.queries.lock().unwrap().push(query.to_string());
        match &self.blob {
            Some(blob) => Ok(SearchContext::new(blob.clone())),
            None => Err(Error::ProviderUnavailable("search backend is down".into())),
        }
    }
}
