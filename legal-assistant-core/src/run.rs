use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Status of a remote run, as reported by the Assistants API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

/// The coarse state a turn cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Still working; keep polling
    Pending,
    /// Waiting on tool outputs from us
    NeedsTool,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn phase(self) -> RunPhase {
        match self {
            RunStatus::Queued
            | RunStatus::InProgress
            | RunStatus::Cancelling
            | RunStatus::Unknown => RunPhase::Pending,
            RunStatus::RequiresAction => RunPhase::NeedsTool,
            RunStatus::Completed => RunPhase::Completed,
            RunStatus::Failed
            | RunStatus::Cancelled
            | RunStatus::Incomplete
            | RunStatus::Expired => RunPhase::Failed,
        }
    }
}

/// Error details attached to a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitToolOutputs {
    pub tool_calls: Vec<ToolCall>,
}

/// What a run in `requires_action` is waiting for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub submit_tool_outputs: SubmitToolOutputs,
}

/// One execution of an assistant against a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub required_action: Option<RequiredAction>,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl Run {
    pub fn phase(&self) -> RunPhase {
        self.status.phase()
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            thread_id: self.thread_id.clone(),
            run_id: self.id.clone(),
        }
    }

    /// Tool calls the run is blocked on, empty unless `requires_action`
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        self.required_action
            .as_ref()
            .map(|action| action.submit_tool_outputs.tool_calls.as_slice())
            .unwrap_or_default()
    }

    /// Human-readable reason for a failed run
    pub fn failure_reason(&self) -> String {
        match &self.last_error {
            Some(RunError {
                code: Some(code),
                message,
            }) => format!("{code}: {message}"),
            Some(RunError { message, .. }) => message.clone(),
            None => format!("run ended with status {:?}", self.status),
        }
    }
}

/// Identifiers of the run driven by the current turn
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunHandle {
    pub thread_id: String,
    pub run_id: String,
}
