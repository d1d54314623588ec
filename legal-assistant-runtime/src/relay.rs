use std::sync::Arc;

use legal_assistant_core::provider::openai::OpenAIAssistantsProvider;
use legal_assistant_core::search::TavilySearchProvider;
use legal_assistant_core::{
    AssistantRegistry, AssistantSpec, AssistantsApi, Config, ConversationRun, Result, RunOptions,
    SearchProvider, Session, TurnReply,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Registry and conversation wired to one pair of remote services
pub struct Relay {
    registry: AssistantRegistry,
    conversation: ConversationRun,
    assistant_id: Option<String>,
}

impl Relay {
    pub fn new(
        api: Arc<dyn AssistantsApi>,
        search: Arc<dyn SearchProvider>,
        spec: AssistantSpec,
        options: RunOptions,
    ) -> Self {
        Self {
            registry: AssistantRegistry::new(api.clone(), spec),
            conversation: ConversationRun::new(api, search, options),
            assistant_id: None,
        }
    }

    /// Builds the HTTP-backed relay described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = Arc::new(OpenAIAssistantsProvider::with_config(config.openai.clone()));
        let search = Arc::new(TavilySearchProvider::with_config(config.tavily.clone()));
        let spec = AssistantSpec::legal_expert(config.model.clone())?;
        info!("Relay ready for model {}", config.model);

        Ok(Self::new(api, search, spec, config.run.clone())
            .with_assistant_id(config.assistant_id.clone()))
    }

    /// Assistant id every new session tries before creating its own
    pub fn with_assistant_id(mut self, assistant_id: Option<String>) -> Self {
        self.assistant_id = assistant_id;
        self
    }

    pub fn new_session(&self) -> Session {
        match &self.assistant_id {
            Some(id) => Session::with_assistant(id.clone()),
            None => Session::new(),
        }
    }

    pub fn conversation(&self) -> &ConversationRun {
        &self.conversation
    }

    #[instrument(skip(self, session, query, cancel))]
    pub async fn ask(
        &self,
        session: &mut Session,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReply> {
        self.conversation
            .run_turn(&self.registry, session, query, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legal_assistant_core::testing::{ScriptedAssistantsApi, ScriptedSearch};

    fn relay(api: Arc<ScriptedAssistantsApi>) -> Relay {
        Relay::new(
            api,
            Arc::new(ScriptedSearch::new("[]")),
            AssistantSpec::legal_expert("gpt-4o").unwrap(),
            RunOptions::default(),
        )
    }

    #[test]
    fn test_new_session_seeds_configured_assistant() {
        let relay = relay(Arc::new(ScriptedAssistantsApi::new()))
            .with_assistant_id(Some("asst_configured".to_string()));

        assert_eq!(relay.new_session().assistant_id(), Some("asst_configured"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_do_not_share_assistants() {
        let api = Arc::new(ScriptedAssistantsApi::new());
        let relay = relay(api.clone());
        let cancel = CancellationToken::new();

        let mut first = relay.new_session();
        let mut second = relay.new_session();
        relay.ask(&mut first, "What is bail?", &cancel).await.unwrap();
        relay.ask(&mut second, "What is parole?", &cancel).await.unwrap();

        assert_eq!(api.calls().create_assistant, 2);
        assert_ne!(first.assistant_id(), second.assistant_id());
    }
}
