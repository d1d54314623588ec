use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::provider::AssistantsApi;
use crate::session::Session;
use crate::tool::{LlmToolInfo, SearchTool};

/// Persona instructions for the legal assistant
pub const LEGAL_EXPERT_INSTRUCTIONS: &str = "\
You are a legal expert. Your goal is to provide answers based on information from the internet.
You must use the provided search function to find relevant online information.
Please include relevant URL sources at the end of your answers.
Output responses in markdown format.";

pub const DEFAULT_ASSISTANT_NAME: &str = "Legal Expert Assistant";

/// Everything submitted when an assistant is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub tools: Vec<LlmToolInfo>,
}

impl AssistantSpec {
    /// The legal-expert persona with the web-search tool declared
    pub fn legal_expert(model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: DEFAULT_ASSISTANT_NAME.to_string(),
            instructions: LEGAL_EXPERT_INSTRUCTIONS.to_string(),
            model: model.into(),
            tools: vec![LlmToolInfo::from_definition(&SearchTool)?],
        })
    }
}

/// A remote assistant the current session can run against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantHandle {
    pub id: String,
    pub name: Option<String>,
    pub model: String,
    pub instructions: Option<String>,
    pub tools: Vec<LlmToolInfo>,
}

/// Hands out the session's assistant, creating it at most once while it stays valid.
pub struct AssistantRegistry {
    api: Arc<dyn AssistantsApi>,
    spec: AssistantSpec,
}

impl AssistantRegistry {
    pub fn new(api: Arc<dyn AssistantsApi>, spec: AssistantSpec) -> Self {
        Self { api, spec }
    }

    pub fn spec(&self) -> &AssistantSpec {
        &self.spec
    }

    /// Returns the session's cached assistant, or creates and caches a new one.
    ///
    /// Any failure to retrieve the cached id falls through to creation; a
    /// creation failure is returned to the caller.
    #[instrument(skip(self, session), fields(session = %session.id()))]
    pub async fn get_or_create(&self, session: &mut Session) -> Result<AssistantHandle> {
        if let Some(cached) = session.assistant_id() {
            match self.api.retrieve_assistant(cached).await {
                Ok(handle) => {
                    debug!("Reusing assistant {}", handle.id);
                    return Ok(handle);
                }
                Err(e) => {
                    warn!("Cached assistant {} is no longer usable: {}", cached, e);
                }
            }
        }

        let handle = self.api.create_assistant(&self.spec).await?;
        info!("Created assistant {} ({})", handle.id, self.spec.model);
        session.cache_assistant(handle.id.clone());
        Ok(handle)
    }
}
