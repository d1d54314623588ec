use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{Error, Result};
use crate::message::{Message, Role};
use crate::provider::AssistantsApi;
use crate::registry::{AssistantHandle, AssistantSpec};
use crate::run::Run;
use crate::secret::Secret;
use crate::tool::{LlmToolInfo, ToolOutput};

/// Configuration for the OpenAI Assistants provider
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: Secret<String>,
    /// Base URL for the API
    pub base_url: String,
    /// Organization ID (optional)
    pub organization: Option<String>,
}

impl OpenAIConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            api_key,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            organization: None,
        }
    }
}

/// Assistants API (v2) over HTTP
#[derive(Debug, Clone)]
pub struct OpenAIAssistantsProvider {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIAssistantsProvider {
    /// Creates a new provider with custom configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use legal_assistant_core::Secret;
    /// use legal_assistant_core::provider::openai::{OpenAIAssistantsProvider, OpenAIConfig};
    ///
    /// let config = OpenAIConfig::new(Secret::new("sk-test".to_string()));
    /// let provider = OpenAIAssistantsProvider::with_config(config);
    /// ```
    #[instrument(skip(config), level = "debug")]
    pub fn with_config(config: OpenAIConfig) -> Self {
        info!("Creating new OpenAIAssistantsProvider");
        debug!("Base URL: {}", config.base_url);
        debug!("Organization set: {}", config.organization.is_some());

        Self {
            config,
            client: Client::new(),
        }
    }

    /// Builds an authenticated request for `path` under the base URL
    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url_str = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let url = match Url::parse(&url_str) {
            Ok(url) => url,
            Err(e) => {
                error!("Failed to parse URL '{}': {}", url_str, e);
                return Err(e.into());
            }
        };
        debug!("Created request: {} {}", method, url);

        let mut builder = self
            .client
            .request(method, url)
            .header("Authorization", self.config.api_key.bearer())
            .header("OpenAI-Beta", "assistants=v2");
        if let Some(org) = &self.config.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        Ok(builder)
    }

    /// Sends the request and decodes a successful body as `T`
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = match builder.send().await {
            Ok(resp) => {
                debug!("Received response with status: {}", resp.status());
                resp
            }
            Err(e) => {
                error!("HTTP request failed: {}", e);
                return Err(e.into());
            }
        };

        let status = response.status();
        let body = response.text().await?;
        trace!("Response body: {}", body);

        // Error bodies take precedence over the status-specific decoding.
        if let Ok(OpenAIErrorResponse { error: Some(api_error) }) =
            serde_json::from_str::<OpenAIErrorResponse>(&body)
        {
            error!(
                %status,
                kind = ?api_error.error_type,
                code = ?api_error.code,
                "OpenAI API returned an error: {}",
                api_error.message
            );
            return Err(match status {
                StatusCode::UNAUTHORIZED => Error::Authentication(api_error.message),
                _ => Error::ProviderUnavailable(api_error.message),
            });
        }
        if !status.is_success() {
            error!(%status, "OpenAI API request failed");
            return Err(Error::ProviderUnavailable(format!("{status}: {body}")));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to deserialize response: {}", e);
            Error::Serialization(e)
        })
    }
}

#[async_trait]
impl AssistantsApi for OpenAIAssistantsProvider {
    #[instrument(skip(self, spec), fields(model = %spec.model), level = "debug")]
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantHandle> {
        let payload = CreateAssistantRequest {
            name: &spec.name,
            instructions: &spec.instructions,
            model: &spec.model,
            tools: spec.tools.iter().map(OpenAITool::from).collect(),
        };
        let builder = self.request(Method::POST, "assistants")?.json(&payload);
        let assistant: OpenAIAssistant = self.send(builder).await?;
        Ok(assistant.into())
    }

    #[instrument(skip(self), level = "debug")]
    async fn retrieve_assistant(&self, assistant_id: &str) -> Result<AssistantHandle> {
        let builder = self.request(Method::GET, &format!("assistants/{assistant_id}"))?;
        let assistant: OpenAIAssistant = self.send(builder).await?;
        Ok(assistant.into())
    }

    #[instrument(skip(self), level = "debug")]
    async fn create_thread(&self) -> Result<String> {
        let builder = self
            .request(Method::POST, "threads")?
            .json(&serde_json::json!({}));
        let thread: OpenAIThread = self.send(builder).await?;
        debug!("Created thread {}", thread.id);
        Ok(thread.id)
    }

    #[instrument(skip(self, content), level = "debug")]
    async fn create_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()> {
        let payload = CreateMessageRequest { role, content };
        let builder = self
            .request(Method::POST, &format!("threads/{thread_id}/messages"))?
            .json(&payload);
        let _: serde_json::Value = self.send(builder).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let payload = CreateRunRequest { assistant_id };
        let builder = self
            .request(Method::POST, &format!("threads/{thread_id}/runs"))?
            .json(&payload);
        self.send(builder).await
    }

    #[instrument(skip(self), level = "trace")]
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let builder = self.request(Method::GET, &format!("threads/{thread_id}/runs/{run_id}"))?;
        self.send(builder).await
    }

    #[instrument(skip(self, outputs), fields(outputs = outputs.len()), level = "debug")]
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        let payload = SubmitToolOutputsRequest {
            tool_outputs: outputs,
        };
        let builder = self
            .request(
                Method::POST,
                &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            )?
            .json(&payload);
        self.send(builder).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        let builder = self
            .request(Method::GET, &format!("threads/{thread_id}/messages"))?
            .query(&[("order", "asc"), ("limit", "100")]);
        let list: OpenAIMessageList = self.send(builder).await?;
        debug!("Thread {} holds {} messages", thread_id, list.data.len());
        Ok(list.data.into_iter().map(Message::from).collect())
    }
}

/// Represents a tool function in the OpenAI API format
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAIFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Represents a tool in the OpenAI API format
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAITool {
    /// The type of the tool ("function", "code_interpreter", ...)
    pub r#type: String,
    /// The function definition, present for function tools only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<OpenAIFunction>,
}

impl From<&LlmToolInfo> for OpenAITool {
    fn from(value: &LlmToolInfo) -> Self {
        OpenAITool {
            r#type: "function".to_string(),
            function: Some(OpenAIFunction {
                name: value.name.clone(),
                description: value.description.clone(),
                parameters: value.parameters.clone(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateAssistantRequest<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
    tools: Vec<OpenAITool>,
}

#[derive(Debug, Deserialize)]
struct OpenAIAssistant {
    id: String,
    #[serde(default)]
    name: Option<String>,
    model: String,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    tools: Vec<OpenAITool>,
}

impl From<OpenAIAssistant> for AssistantHandle {
    fn from(assistant: OpenAIAssistant) -> Self {
        let tools = assistant
            .tools
            .into_iter()
            .filter_map(|tool| tool.function)
            .map(|function| LlmToolInfo {
                name: function.name,
                description: function.description,
                parameters: function.parameters,
            })
            .collect();
        AssistantHandle {
            id: assistant.id,
            name: assistant.name,
            model: assistant.model,
            instructions: assistant.instructions,
            tools,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIThread {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputsRequest<'a> {
    tool_outputs: &'a [ToolOutput],
}

#[derive(Debug, Deserialize)]
struct OpenAIMessageList {
    data: Vec<OpenAIThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIThreadMessage {
    role: Role,
    #[serde(default)]
    content: Vec<OpenAIContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentBlock {
    Text { text: OpenAIText },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct OpenAIText {
    value: String,
}

impl From<OpenAIThreadMessage> for Message {
    fn from(message: OpenAIThreadMessage) -> Self {
        let mut texts = Vec::with_capacity(message.content.len());
        for block in message.content {
            match block {
                OpenAIContentBlock::Text { text } => texts.push(text.value),
                OpenAIContentBlock::Unsupported => {
                    warn!("Skipping non-text content block in {} message", message.role);
                }
            }
        }
        Message {
            role: message.role,
            content: texts.join("\n"),
        }
    }
}

/// Represents an error response from the OpenAI API
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAIErrorResponse {
    pub error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAIError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}
