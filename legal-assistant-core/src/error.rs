use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when resolving a tool call
#[derive(Error, Debug)]
pub enum ToolError {
    /// Error generating JSON schema for tool
    #[error("Failed to generate schema for tool '{0}': {1}")]
    SchemaGenerationError(String, serde_json::Error),

    /// The arguments sent by the run could not be decoded
    #[error("Failed to parse arguments for tool '{0}': {1}")]
    ArgumentParsingError(String, serde_json::Error),
}

/// Represents errors that can occur while relaying a legal question
#[derive(Error, Debug)]
pub enum Error {
    /// Error during serialization or deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error during HTTP request
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Couldn't parse base url")]
    BaseUrlError(#[from] url::ParseError),

    /// A required setting is missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The remote service answered with an error body
    #[error("Provider not available: {0}")]
    ProviderUnavailable(String),

    /// The user's query cannot be submitted
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid tool arguments
    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),

    /// Tool-specific error
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// The remote run reached a failed terminal state
    #[error("Run {run_id} failed: {reason}")]
    RunFailed { run_id: String, reason: String },

    /// The remote run did not leave the pending state in time
    #[error("Run {run_id} did not finish within {waited:?}")]
    Timeout { run_id: String, waited: Duration },

    /// The caller abandoned the turn
    #[error("Turn was cancelled")]
    Cancelled,

    /// The run kept requesting tools past the configured bound
    #[error("Run requested more than {0} rounds of tool calls")]
    ToolRoundsExceeded(usize),

    /// The thread holds no assistant reply
    #[error("Thread {0} has no assistant reply")]
    EmptyReply(String),
}

/// A Result type that uses our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failed_message_names_run() {
        let err = Error::RunFailed {
            run_id: "run_42".to_string(),
            reason: "rate_limit_exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "Run run_42 failed: rate_limit_exceeded");
    }

    #[test]
    fn test_tool_error_converts() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = ToolError::ArgumentParsingError("search".to_string(), source).into();
        assert!(matches!(err, Error::Tool(ToolError::ArgumentParsingError(ref name, _)) if name == "search"));
        assert!(err.to_string().starts_with("Tool error: Failed to parse arguments for tool 'search'"));
    }
}
