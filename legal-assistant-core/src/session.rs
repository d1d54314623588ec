use uuid::Uuid;

use crate::Message;

/// State that lives for one chat session and nothing longer.
///
/// Holds the cached assistant id and the displayed history. A session is
/// created when a user starts chatting and dropped (or [`Session::clear`]ed)
/// when they leave; it is never shared between sessions.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    assistant_id: Option<String>,
    history: Vec<Message>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            assistant_id: None,
            history: Vec::new(),
        }
    }

    /// Starts a session that first tries an assistant created earlier
    pub fn with_assistant(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: Some(assistant_id.into()),
            ..Self::new()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant_id.as_deref()
    }

    pub(crate) fn cache_assistant(&mut self, assistant_id: String) {
        self.assistant_id = Some(assistant_id);
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Ends the session: forgets the history and the cached assistant.
    ///
    /// The cleared value is a fresh session with a new id.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
