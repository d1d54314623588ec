use std::io::Write;

use anyhow::{Context, Result};
use legal_assistant_core::{Error, Message};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::relay::Relay;

/// A simple interactive chat over any line-oriented input, interrupted by Ctrl-C.
///
/// One SIGINT listener lives for the whole chat and feeds [`chat_loop`].
pub async fn run_chat<R, W>(relay: &Relay, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });

    let result = chat_loop(relay, input, out, rx).await;
    listener.abort();
    result
}

/// The chat itself, with interrupts delivered on `interrupts`.
///
/// `exit` or `quit` ends the loop, `reset` starts a new session. An
/// interrupt cancels the turn in flight; at the prompt it ends the chat.
pub async fn chat_loop<R, W>(
    relay: &Relay,
    input: R,
    out: &mut W,
    mut interrupts: mpsc::UnboundedReceiver<()>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "=== AI Legal Assistant ===")?;
    writeln!(out, "Type your legal question and press enter to send.")?;
    writeln!(out, "Type 'reset' for a new conversation, 'exit' to quit.")?;
    writeln!(out)?;

    let mut session = relay.new_session();
    let mut lines = input.lines();

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            Some(()) = interrupts.recv() => {
                writeln!(out)?;
                writeln!(out, "Goodbye!")?;
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();

        match line.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => {
                writeln!(out, "Goodbye!")?;
                break;
            }
            "reset" => {
                session = relay.new_session();
                writeln!(out, "Started a new conversation.")?;
                writeln!(out)?;
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let turn = relay.ask(&mut session, line, &cancel);
        tokio::pin!(turn);
        let outcome = loop {
            tokio::select! {
                outcome = &mut turn => break outcome,
                Some(()) = interrupts.recv() => cancel.cancel(),
            }
        };

        match outcome {
            Ok(reply) => {
                writeln!(out, "Assistant: {}", reply.text)?;
                let sources = Message::assistant(reply.text).cited_urls();
                if !sources.is_empty() {
                    writeln!(out, "Sources:")?;
                    for url in sources {
                        writeln!(out, "  - {url}")?;
                    }
                }
            }
            Err(Error::Cancelled) => {
                info!("Turn interrupted by the user");
                writeln!(out, "(cancelled)")?;
            }
            Err(e) => {
                warn!("Turn ended with an error: {}", e);
                writeln!(out, "Error: {e}")?;
            }
        }
        writeln!(out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use legal_assistant_core::testing::{CallCounts, RunStep, ScriptedAssistantsApi, ScriptedSearch};
    use legal_assistant_core::{AssistantSpec, RunOptions};
    use tokio::io::BufReader;

    fn relay(api: ScriptedAssistantsApi) -> (Relay, Arc<ScriptedAssistantsApi>) {
        let api = Arc::new(api);
        let relay = Relay::new(
            api.clone(),
            Arc::new(ScriptedSearch::new("[]")),
            AssistantSpec::legal_expert("gpt-4o").unwrap(),
            RunOptions::default(),
        );
        (relay, api)
    }

    /// A receiver whose sender is already gone
    fn no_interrupts() -> mpsc::UnboundedReceiver<()> {
        mpsc::unbounded_channel().1
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_prints_reply_and_sources() {
        let (relay, api) = relay(
            ScriptedAssistantsApi::new()
                .with_reply("Small claims cases are capped at $12,500. https://www.courts.ca.gov/1256.htm"),
        );
        let mut out = Vec::new();

        chat_loop(&relay, &b"What is the small claims limit?\n\nexit\n"[..], &mut out, no_interrupts())
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Assistant: Small claims cases are capped at $12,500."));
        assert!(printed.contains("  - https://www.courts.ca.gov/1256.htm"));
        assert!(printed.ends_with("Goodbye!\n"));
        assert_eq!(api.calls().create_run, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_reports_errors_and_keeps_going() {
        let (relay, api) = relay(ScriptedAssistantsApi::new().with_script(vec![RunStep::Failed(
            "Rate limit reached".to_string(),
        )]));
        let mut out = Vec::new();

        chat_loop(&relay, &b"first\nsecond\n"[..], &mut out, no_interrupts())
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Error: "));
        assert!(printed.contains("Rate limit reached"));
        assert!(printed.contains("Assistant: Here is what I found."));
        assert_eq!(api.calls().create_run, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_starts_new_session() {
        let (relay, api) = relay(ScriptedAssistantsApi::new());
        let mut out = Vec::new();

        chat_loop(&relay, &b"one\nreset\ntwo\nquit\n"[..], &mut out, no_interrupts())
            .await
            .unwrap();

        assert!(String::from_utf8(out).unwrap().contains("Started a new conversation."));
        assert_eq!(api.calls().create_assistant, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cancels_turn_then_chat_continues() {
        let (relay, api) = relay(ScriptedAssistantsApi::new().stalled());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3_500)).await;
            tx.send(()).unwrap();
        });
        let mut out = Vec::new();

        chat_loop(&relay, &b"Is my lease valid?\nexit\n"[..], &mut out, rx)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("(cancelled)"));
        assert!(printed.ends_with("Goodbye!\n"));
        assert_eq!(api.calls().retrieve_run, 3);
    }

    #[tokio::test]
    async fn test_interrupt_at_prompt_ends_chat() {
        let (relay, api) = relay(ScriptedAssistantsApi::new());
        // Keeping the writer open leaves the prompt waiting for input.
        let (_keyboard, stdin) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(()).unwrap();
        let mut out = Vec::new();

        chat_loop(&relay, BufReader::new(stdin), &mut out, rx)
            .await
            .unwrap();

        assert!(String::from_utf8(out).unwrap().ends_with("Goodbye!\n"));
        assert_eq!(api.calls(), CallCounts::default());
    }
}
