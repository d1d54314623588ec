use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace};

use crate::error::{Error, Result};
use crate::secret::Secret;
use crate::token::TokenBudget;

/// Anything that can turn a query into context for a tool output.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Runs one search. The query must be non-empty.
    async fn search(&self, query: &str) -> Result<SearchContext>;
}

/// Search results serialized for inclusion in a model's tool output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchContext(String);

/// How a context blob is placed into a tool output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextEncoding {
    /// The blob is submitted verbatim
    #[default]
    Raw,
    /// The blob is submitted as a JSON string literal
    Json,
}

impl SearchContext {
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Renders the blob as tool-output text
    ///
    /// # Examples
    ///
    /// ```
    /// use legal_assistant_core::search::{ContextEncoding, SearchContext};
    ///
    /// let ctx = SearchContext::new(r#"[{"url":"https://a.example"}]"#);
    /// assert_eq!(ctx.clone().into_tool_output(ContextEncoding::Raw), r#"[{"url":"https://a.example"}]"#);
    /// assert_eq!(
    ///     ctx.into_tool_output(ContextEncoding::Json),
    ///     r#""[{\"url\":\"https://a.example\"}]""#
    /// );
    /// ```
    pub fn into_tool_output(self, encoding: ContextEncoding) -> String {
        match encoding {
            ContextEncoding::Raw => self.0,
            // Serializing a str cannot fail.
            ContextEncoding::Json => serde_json::Value::String(self.0).to_string(),
        }
    }
}

/// Configuration for the Tavily search provider
#[derive(Debug, Clone)]
pub struct TavilyConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    /// Upper bound on the size of the assembled context
    pub max_tokens: usize,
    pub max_results: usize,
}

impl TavilyConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.tavily.com";

    pub fn new(api_key: Secret<String>) -> Self {
        Self {
            api_key,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            max_tokens: 8000,
            max_results: 5,
        }
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'static str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct ContextSource<'a> {
    url: &'a str,
    content: &'a str,
}

/// Advanced-depth web search against the Tavily API
#[derive(Debug, Clone)]
pub struct TavilySearchProvider {
    config: TavilyConfig,
    client: Client,
}

impl TavilySearchProvider {
    #[instrument(skip(config), level = "debug")]
    pub fn with_config(config: TavilyConfig) -> Self {
        info!("Creating new TavilySearchProvider");
        debug!("Base URL: {}", config.base_url);
        debug!("Context token budget: {}", config.max_tokens);
        Self {
            config,
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> Result<Url> {
        let url_str = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        Url::parse(&url_str).map_err(|e| {
            error!("Failed to parse URL '{}': {}", url_str, e);
            e.into()
        })
    }

    /// Packs ranked results into a JSON array of sources within the budget
    fn build_context(&self, results: &[TavilyResult]) -> Result<SearchContext> {
        let mut budget = TokenBudget::new(self.config.max_tokens);
        let mut sources = Vec::new();
        for result in results {
            if !budget.try_consume(&result.content) {
                debug!(
                    "Token budget reached after {} sources ({} left)",
                    sources.len(),
                    budget.remaining()
                );
                break;
            }
            sources.push(ContextSource {
                url: &result.url,
                content: &result.content,
            });
        }
        Ok(SearchContext(serde_json::to_string(&sources)?))
    }
}

#[async_trait]
impl SearchProvider for TavilySearchProvider {
    #[instrument(skip(self), level = "debug")]
    async fn search(&self, query: &str) -> Result<SearchContext> {
        if query.trim().is_empty() {
            return Err(Error::InvalidToolArguments("search query is empty".into()));
        }

        let payload = TavilyRequest {
            query,
            search_depth: "advanced",
            max_results: self.config.max_results,
            include_answer: false,
        };

        debug!("Sending search request");
        let response = self
            .client
            .post(self.endpoint()?)
            .header("Authorization", self.config.api_key.bearer())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Search request failed: {}", e);
                Error::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;
        trace!("Search response body: {}", body);

        if !status.is_success() {
            error!(%status, "Search API returned an error");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication(body),
                _ => Error::ProviderUnavailable(format!("search returned {status}: {body}")),
            });
        }

        let parsed: TavilyResponse = serde_json::from_str(&body)?;
        info!("Search returned {} results", parsed.results.len());
        self.build_context(&parsed.results)
    }
}
