use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

use crate::conversation::RunOptions;
use crate::error::{Error, Result};
use crate::provider::openai::OpenAIConfig;
use crate::search::{ContextEncoding, TavilyConfig};
use crate::secret::Secret;

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Process-wide settings, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAIConfig,
    pub tavily: TavilyConfig,
    /// Model id the assistant is created with
    pub model: String,
    /// Assistant created by an earlier process, tried before creating one
    pub assistant_id: Option<String>,
    pub run: RunOptions,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// `OPENAI_API_KEY` and `TAVILY_API_KEY` are required. Everything else
    /// has a default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value
    ///
    /// # Examples
    ///
    /// ```
    /// use legal_assistant_core::Config;
    ///
    /// let config = Config::from_lookup(|var| match var {
    ///     "OPENAI_API_KEY" => Some("sk-test".to_string()),
    ///     "TAVILY_API_KEY" => Some("tvly-test".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.model, "gpt-4o");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let openai_key = vars.required("OPENAI_API_KEY")?;
        let tavily_key = vars.required("TAVILY_API_KEY")?;

        let mut openai = OpenAIConfig::new(openai_key);
        if let Some(base_url) = vars.optional("OPENAI_BASE_URL") {
            openai.base_url = base_url;
        }
        openai.organization = vars.optional("OPENAI_ORGANIZATION");

        let mut tavily = TavilyConfig::new(tavily_key);
        if let Some(base_url) = vars.optional("TAVILY_BASE_URL") {
            tavily.base_url = base_url;
        }
        if let Some(tokens) = vars.parsed::<usize>("LEGAL_ASSISTANT_SEARCH_TOKENS")? {
            tavily.max_tokens = tokens;
        }

        let mut run = RunOptions::default();
        if let Some(ms) = vars.parsed::<u64>("LEGAL_ASSISTANT_POLL_MS")? {
            run.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = vars.parsed::<u64>("LEGAL_ASSISTANT_TIMEOUT_SECS")? {
            run.timeout = Duration::from_secs(secs);
        }
        if let Some(rounds) = vars.parsed::<usize>("LEGAL_ASSISTANT_MAX_TOOL_ROUNDS")? {
            run.max_tool_rounds = rounds;
        }
        if let Some(encoding) = vars.optional("LEGAL_ASSISTANT_CONTEXT_ENCODING") {
            run.context_encoding = match encoding.to_ascii_lowercase().as_str() {
                "raw" => ContextEncoding::Raw,
                "json" => ContextEncoding::Json,
                other => {
                    return Err(Error::Configuration(format!(
                        "LEGAL_ASSISTANT_CONTEXT_ENCODING must be 'raw' or 'json', got '{other}'"
                    )));
                }
            };
        }

        let config = Self {
            openai,
            tavily,
            model: vars
                .optional("LEGAL_ASSISTANT_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            assistant_id: vars.optional("LEGAL_ASSISTANT_ID"),
            run,
        };
        info!("Loaded configuration for model {}", config.model);
        debug!(?config, "Configuration");
        Ok(config)
    }
}

/// Variable source with blank values treated as unset
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &str) -> Result<Secret<String>> {
        self.optional(var)
            .map(Secret::new)
            .ok_or_else(|| Error::Configuration(format!("{var} must be set")))
    }

    fn parsed<T: FromStr>(&self, var: &str) -> Result<Option<T>> {
        self.optional(var)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|_| Error::Configuration(format!("{var} has an invalid value '{raw}'")))
            })
            .transpose()
    }
}
