use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{Result, ToolError};

/// Name of the single function the assistant is allowed to call
pub const SEARCH_TOOL_NAME: &str = "search";

/// Defines a function the remote assistant may call back into
///
/// The input type doubles as the parameter schema sent to the assistant, so it
/// must implement `JsonSchema`.
///
/// # Examples
///
/// ```
/// use legal_assistant_core::tool::{LlmToolInfo, SearchTool, ToolDefinition};
///
/// let info = LlmToolInfo::from_definition(&SearchTool).unwrap();
/// assert_eq!(info.name, "search");
/// assert_eq!(info.parameters["required"][0], "query");
/// ```
pub trait ToolDefinition {
    /// The input type that this tool accepts
    type Input: DeserializeOwned + JsonSchema + Send + Sync + 'static;

    fn name(&self) -> String;

    fn description(&self) -> String;

    /// Helper to generate the JSON schema for the input type
    fn schema(&self) -> Result<Value> {
        let schema = schemars::schema_for!(Self::Input);
        serde_json::to_value(schema.schema)
            .map_err(|e| ToolError::SchemaGenerationError(self.name(), e).into())
    }
}

/// Assistant-facing representation of a tool
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LlmToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl LlmToolInfo {
    pub fn from_definition<T: ToolDefinition>(tool: &T) -> Result<Self> {
        Ok(Self {
            name: tool.name(),
            description: tool.description(),
            parameters: tool.schema()?,
        })
    }
}

/// Arguments of the web-search function
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SearchRequest {
    /// The search query to use
    pub query: String,
}

/// The web-search function declared on the assistant
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchTool;

impl ToolDefinition for SearchTool {
    type Input = SearchRequest;

    fn name(&self) -> String {
        SEARCH_TOOL_NAME.to_string()
    }

    fn description(&self) -> String {
        "Retrieve information on recent events and legal sources from the web.".to_string()
    }
}

/// The function half of a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// JSON-encoded argument object, exactly as sent by the run
    pub arguments: String,
}

/// A request from a run for the caller to execute a named function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    pub function: Function,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_type: function_type(),
            function: Function {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Decodes the JSON arguments into the tool's input type
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.function.arguments)
            .map_err(|e| ToolError::ArgumentParsingError(self.function.name.clone(), e).into())
    }
}

/// The answer to one tool call, fed back into the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}
