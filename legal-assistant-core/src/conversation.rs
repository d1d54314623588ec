use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::message::{Message, Role};
use crate::provider::AssistantsApi;
use crate::registry::{AssistantHandle, AssistantRegistry};
use crate::run::{Run, RunHandle, RunPhase};
use crate::search::{ContextEncoding, SearchProvider};
use crate::session::Session;
use crate::tool::{SEARCH_TOOL_NAME, SearchRequest, ToolCall, ToolOutput};

/// Knobs for driving one run to completion
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pause between two status polls
    pub poll_interval: Duration,
    /// Longest a single wait for a run may take
    pub timeout: Duration,
    /// How many times a turn will answer `requires_action`
    pub max_tool_rounds: usize,
    pub context_encoding: ContextEncoding,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
            max_tool_rounds: 3,
            context_encoding: ContextEncoding::Raw,
        }
    }
}

/// Drives a user turn through the remote run, relaying search tool calls.
///
/// A run moves `pending -> {completed | failed | requires_action}`; after the
/// tool outputs are submitted it is pending again. `completed` and `failed`
/// end the turn.
pub struct ConversationRun {
    api: Arc<dyn AssistantsApi>,
    search: Arc<dyn SearchProvider>,
    options: RunOptions,
}

impl ConversationRun {
    pub fn new(
        api: Arc<dyn AssistantsApi>,
        search: Arc<dyn SearchProvider>,
        options: RunOptions,
    ) -> Self {
        Self {
            api,
            search,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Opens a thread, posts the query and starts a run on it.
    #[instrument(skip(self, assistant, query), fields(assistant = %assistant.id))]
    pub async fn start_turn(&self, assistant: &AssistantHandle, query: &str) -> Result<RunHandle> {
        if query.trim().is_empty() {
            return Err(Error::InvalidQuery("query is empty".into()));
        }

        let thread_id = self.api.create_thread().await?;
        self.api.create_message(&thread_id, Role::User, query).await?;
        let run = self.api.create_run(&thread_id, &assistant.id).await?;
        info!("Started run {} on thread {}", run.id, thread_id);

        Ok(RunHandle {
            thread_id,
            run_id: run.id,
        })
    }

    /// Polls the run until it leaves the pending phase.
    ///
    /// Fails with [`Error::Timeout`] once `options.timeout` has elapsed and
    /// with [`Error::Cancelled`] as soon as `cancel` fires.
    #[instrument(skip(self, cancel), fields(run = %handle.run_id))]
    pub async fn await_completion(
        &self,
        handle: &RunHandle,
        cancel: &CancellationToken,
    ) -> Result<Run> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Turn cancelled while waiting on run {}", handle.run_id);
                Err(Error::Cancelled)
            }
            outcome = tokio::time::timeout(self.options.timeout, self.poll_until_settled(handle)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        error!("Run {} still pending after {:?}", handle.run_id, self.options.timeout);
                        Err(Error::Timeout {
                            run_id: handle.run_id.clone(),
                            waited: self.options.timeout,
                        })
                    }
                }
            }
        }
    }

    async fn poll_until_settled(&self, handle: &RunHandle) -> Result<Run> {
        let mut polls: u32 = 0;
        loop {
            tokio::time::sleep(self.options.poll_interval).await;
            let run = self
                .api
                .retrieve_run(&handle.thread_id, &handle.run_id)
                .await?;
            polls += 1;
            if run.phase() != RunPhase::Pending {
                debug!("Run {} is {:?} after {} polls", run.id, run.status, polls);
                return Ok(run);
            }
        }
    }

    /// Answers the run's tool calls in one batch and returns the resumed run.
    ///
    /// Only the search tool is served. Calls to any other name, repeated call
    /// ids and empty search results contribute no output.
    #[instrument(skip(self, calls), fields(run = %handle.run_id, calls = calls.len()))]
    pub async fn resolve_tool_calls(
        &self,
        handle: &RunHandle,
        calls: &[ToolCall],
    ) -> Result<RunHandle> {
        let mut answered = HashSet::new();
        let mut outputs = Vec::with_capacity(calls.len());

        for call in calls {
            if call.function.name != SEARCH_TOOL_NAME {
                warn!("Skipping call {} to unrecognized tool '{}'", call.id, call.function.name);
                continue;
            }
            if !answered.insert(call.id.as_str()) {
                warn!("Tool call {} appears twice; answering once", call.id);
                continue;
            }

            let request: SearchRequest = call.parse_arguments()?;
            debug!("Searching for '{}'", request.query);
            let context = self.search.search(&request.query).await?;
            if context.is_empty() {
                debug!("Search for call {} returned nothing", call.id);
                continue;
            }
            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                output: context.into_tool_output(self.options.context_encoding),
            });
        }

        info!("Submitting {} tool outputs", outputs.len());
        let run = self
            .api
            .submit_tool_outputs(&handle.thread_id, &handle.run_id, &outputs)
            .await?;
        Ok(run.handle())
    }

    /// Returns the newest assistant reply on the thread
    #[instrument(skip(self))]
    pub async fn collect_final_message(&self, thread_id: &str) -> Result<String> {
        let messages = self.api.list_messages(thread_id).await?;
        messages
            .into_iter()
            .rev()
            .find(Message::is_assistant)
            .map(|message| message.content)
            .ok_or_else(|| Error::EmptyReply(thread_id.to_string()))
    }

    /// Returns the whole thread as `role: text` lines, oldest first
    #[instrument(skip(self))]
    pub async fn collect_transcript(&self, thread_id: &str) -> Result<String> {
        let messages = self.api.list_messages(thread_id).await?;
        Ok(messages
            .iter()
            .map(Message::transcript_line)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Runs one user turn end to end and returns the assistant's reply.
    ///
    /// The query is recorded in the session history up front; the reply is
    /// recorded once the run completes. A failed run ends the turn without
    /// reading the thread.
    #[instrument(skip(self, registry, session, query, cancel), fields(session = %session.id()))]
    pub async fn run_turn(
        &self,
        registry: &AssistantRegistry,
        session: &mut Session,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReply> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query is empty".into()));
        }

        let assistant = registry.get_or_create(session).await?;
        session.push(Message::user(query));

        let mut handle = self.start_turn(&assistant, query).await?;
        let mut rounds = 0;
        loop {
            let run = self.await_completion(&handle, cancel).await?;
            match run.phase() {
                RunPhase::Completed => break,
                RunPhase::Failed => {
                    let reason = run.failure_reason();
                    error!("Run {} failed: {}", run.id, reason);
                    return Err(Error::RunFailed {
                        run_id: run.id,
                        reason,
                    });
                }
                RunPhase::NeedsTool => {
                    if rounds == self.options.max_tool_rounds {
                        error!("Run {} wants tools again after {} rounds", run.id, rounds);
                        return Err(Error::ToolRoundsExceeded(self.options.max_tool_rounds));
                    }
                    rounds += 1;
                    handle = self.resolve_tool_calls(&handle, run.pending_tool_calls()).await?;
                }
                RunPhase::Pending => continue,
            }
        }

        let reply = self.collect_final_message(&handle.thread_id).await?;
        info!("Turn finished after {} tool rounds", rounds);
        session.push(Message::assistant(reply.clone()));

        Ok(TurnReply {
            thread_id: handle.thread_id,
            text: reply,
            tool_rounds: rounds,
        })
    }
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub thread_id: String,
    pub text: String,
    pub tool_rounds: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AssistantSpec;
    use crate::testing::{RunStep, ScriptedAssistantsApi, ScriptedSearch};
    use tracing_test::traced_test;

    fn conversation(api: Arc<ScriptedAssistantsApi>, search: Arc<ScriptedSearch>) -> ConversationRun {
        ConversationRun::new(api, search, RunOptions::default())
    }

    fn assistant() -> AssistantHandle {
        AssistantHandle {
            id: "asst_test".into(),
            name: None,
            model: "gpt-4o".into(),
            instructions: None,
            tools: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_start_turn_rejects_blank_query() {
        let api = Arc::new(ScriptedAssistantsApi::new());
        let conv = conversation(api.clone(), Arc::new(ScriptedSearch::new("ctx")));

        let err = conv.start_turn(&assistant(), " \n").await.unwrap_err();

        assert!(matches!(err, Error::InvalidQuery(_)));
        assert_eq!(api.calls().create_thread, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_completion_waits_through_pending() {
        let api = Arc::new(ScriptedAssistantsApi::new().with_script(vec![
            RunStep::Pending,
            RunStep::Pending,
            RunStep::Completed,
        ]));
        let conv = conversation(api.clone(), Arc::new(ScriptedSearch::new("ctx")));
        let handle = conv.start_turn(&assistant(), "hello").await.unwrap();

        let run = conv
            .await_completion(&handle, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(run.phase(), RunPhase::Completed);
        assert_eq!(api.calls().retrieve_run, 3);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_resolve_skips_unknown_tools() {
        let api = Arc::new(ScriptedAssistantsApi::new());
        let search = Arc::new(ScriptedSearch::new("[{\"url\":\"https://a.example\"}]"));
        let conv = conversation(api.clone(), search.clone());
        let handle = conv.start_turn(&assistant(), "hello").await.unwrap();

        let calls = vec![
            ToolCall::new("call_1", "get_weather", r#"{"location":"SF"}"#),
            ToolCall::new("call_2", "search", r#"{"query":"adverse possession"}"#),
            ToolCall::new("call_2", "search", r#"{"query":"adverse possession"}"#),
        ];
        conv.resolve_tool_calls(&handle, &calls).await.unwrap();

        let submitted = api.submitted_outputs();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].len(), 1);
        assert_eq!(submitted[0][0].tool_call_id, "call_2");
        assert_eq!(search.queries(), vec!["adverse possession".to_string()]);
        assert!(logs_contain("unrecognized tool 'get_weather'"));
    }

    #[tokio::test]
    async fn test_resolve_json_encoding() {
        let api = Arc::new(ScriptedAssistantsApi::new());
        let options = RunOptions {
            context_encoding: ContextEncoding::Json,
            ..RunOptions::default()
        };
        let conv = ConversationRun::new(api.clone(), Arc::new(ScriptedSearch::new("a \"quoted\" blob")), options);
        let handle = conv.start_turn(&assistant(), "hello").await.unwrap();

        conv.resolve_tool_calls(&handle, &[ToolCall::new("call_1", "search", r#"{"query":"q"}"#)])
            .await
            .unwrap();

        assert_eq!(api.submitted_outputs()[0][0].output, r#""a \"quoted\" blob""#);
    }

    #[tokio::test]
    async fn test_final_message_is_newest_assistant_reply() {
        let api = Arc::new(ScriptedAssistantsApi::new());
        let conv = conversation(api.clone(), Arc::new(ScriptedSearch::new("ctx")));
        api.seed_thread(
            "thread_seeded",
            vec![
                Message::user("first question"),
                Message::assistant("first answer"),
                Message::user("second question"),
                Message::assistant("second answer"),
            ],
        );

        let reply = conv.collect_final_message("thread_seeded").await.unwrap();
        let transcript = conv.collect_transcript("thread_seeded").await.unwrap();

        assert_eq!(reply, "second answer");
        assert_eq!(
            transcript,
            "user: first question\nassistant: first answer\nuser: second question\nassistant: second answer"
        );
    }

    #[tokio::test]
    async fn test_final_message_without_reply() {
        let api = Arc::new(ScriptedAssistantsApi::new());
        let conv = conversation(api.clone(), Arc::new(ScriptedSearch::new("ctx")));
        api.seed_thread("thread_quiet", vec![Message::user("anyone?")]);

        let err = conv.collect_final_message("thread_quiet").await.unwrap_err();
        assert!(matches!(err, Error::EmptyReply(id) if id == "thread_quiet"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_turn_records_history() {
        let api = Arc::new(
            ScriptedAssistantsApi::new()
                .with_script(vec![RunStep::Completed])
                .with_reply("Consult a lawyer. https://example.org/help"),
        );
        let conv = conversation(api.clone(), Arc::new(ScriptedSearch::new("ctx")));
        let registry = AssistantRegistry::new(api.clone(), AssistantSpec::legal_expert("gpt-4o").unwrap());
        let mut session = Session::new();

        let reply = conv
            .run_turn(&registry, &mut session, "  Can I break my lease?  ", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.tool_rounds, 0);
        assert_eq!(
            session.history(),
            &[
                Message::user("Can I break my lease?"),
                Message::assistant("Consult a lawyer. https://example.org/help"),
            ]
        );
    }
}
