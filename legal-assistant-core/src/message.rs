use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>()\[\]"'`]+"#).expect("URL pattern is valid")
});

/// Represents the author of a message in a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user
    User,
    /// Message from the assistant
    Assistant,
}

impl Role {
    /// Returns the wire name of the role
    ///
    /// # Examples
    ///
    /// ```
    /// use legal_assistant_core::Role;
    ///
    /// assert_eq!(Role::Assistant.as_str(), "assistant");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role-tagged piece of text, as shown in the chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Creates a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Returns the URLs cited in the message, in order of first appearance
    ///
    /// Trailing sentence punctuation is not part of the URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use legal_assistant_core::Message;
    ///
    /// let msg = Message::assistant(
    ///     "Four years ([source](https://law.justia.com/ccp-337/)). See https://example.org.",
    /// );
    /// assert_eq!(
    ///     msg.cited_urls(),
    ///     vec!["https://law.justia.com/ccp-337/", "https://example.org"]
    /// );
    /// ```
    pub fn cited_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for found in URL_PATTERN.find_iter(&self.content) {
            let url = found.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
            if !urls.iter().any(|seen| seen == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    /// Formats the message as a `role: text` transcript line
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}
