use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::client::ChatClient;
use crate::sink::OutputSink;
use crate::types::Message;
use crate::{ChatError, Result};

/// Shown before each interactive read.
pub const PROMPT: &str = "> ";

/// Inputs that end an interactive session.
pub const EXIT_COMMANDS: &[&str] = &["/exit", "/quit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeMode {
    Interactive,
    /// Also prints collected citations after the answer.
    SingleShot,
}

/// Result of one user turn.
#[derive(Debug, Default)]
pub struct ExchangeOutcome {
    pub answer: String,
    pub citations: Vec<String>,
    /// Request or streaming failure; the partial answer is still recorded.
    pub error: Option<ChatError>,
    /// Failure while finishing the output (filter write or exit status).
    pub sink_error: Option<ChatError>,
}

// ─── Session ──────────────────────────────────────────────────────────────

/// Owns the conversation history and runs exchanges one at a time.
///
/// History only grows: each exchange appends the user prompt and then,
/// after output is finalized, the assistant answer (empty if the request
/// failed) so roles keep alternating.
pub struct Session {
    client: ChatClient,
    history: Vec<Message>,
}

impl Session {
    pub fn new(client: ChatClient) -> Self {
        let history = client
            .config()
            .system
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| vec![Message::system(s)])
            .unwrap_or_default();
        Self { client, history }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Read-eval loop over `input` until EOF, an exit command, or
    /// cancellation.
    ///
    /// Exchange errors are printed and the loop continues. A failed filter
    /// spawn, a failed read from `input` or a broken stdout ends it with an
    /// error.
    pub async fn run_interactive<R, W>(
        &mut self,
        input: R,
        mut prompt_out: W,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        loop {
            prompt_out.write_all(PROMPT.as_bytes()).await?;
            prompt_out.flush().await?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = cancel.cancelled() => break,
            };
            let Some(line) = line else {
                break;
            };

            let prompt = line.trim();
            if prompt.is_empty() {
                continue;
            }
            if EXIT_COMMANDS.contains(&prompt) {
                tracing::debug!(command = prompt, "exit requested");
                break;
            }

            let outcome = self
                .exchange(prompt, ExchangeMode::Interactive, cancel)
                .await?;
            if let Some(err) = &outcome.sink_error {
                report("output error", err);
            }
            match outcome.error {
                Some(err) if err.is_cancelled() => break,
                Some(err) if err.is_fatal() => return Err(err),
                Some(err) => report("request error", &err),
                None => {}
            }
        }
        Ok(())
    }

    /// One exchange over the whole of `input`.
    ///
    /// The answer is finalized even when the request fails; the failure is
    /// returned afterwards. Cancellation counts as success.
    pub async fn run_single_shot(&mut self, input: &str, cancel: &CancellationToken) -> Result<()> {
        let prompt = input.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }

        let outcome = self
            .exchange(prompt, ExchangeMode::SingleShot, cancel)
            .await?;
        match (outcome.error, outcome.sink_error) {
            (Some(err), _) if err.is_cancelled() => Ok(()),
            (Some(err), sink_err) => {
                if let Some(sink_err) = sink_err {
                    report("output error", &sink_err);
                }
                Err(err)
            }
            (None, Some(sink_err)) => Err(sink_err),
            (None, None) => Ok(()),
        }
    }

    /// Run a single exchange: stream the answer into a fresh sink, finalize
    /// it, and record both turns.
    ///
    /// Returns `Err` only when the output filter cannot be spawned.
    pub async fn exchange(
        &mut self,
        prompt: &str,
        mode: ExchangeMode,
        cancel: &CancellationToken,
    ) -> Result<ExchangeOutcome> {
        let mut sink = OutputSink::open(self.client.config().pipe.as_deref())?;
        self.history.push(Message::user(prompt));

        let mut outcome = ExchangeOutcome::default();
        if let Err(err) = self.stream_answer(&mut sink, cancel, &mut outcome).await {
            tracing::debug!(error = %err, "exchange failed");
            outcome.error = Some(err);
        }

        outcome.sink_error = finalize(sink, mode, &outcome.citations).await.err();
        self.history.push(Message::assistant(outcome.answer.clone()));
        Ok(outcome)
    }

    async fn stream_answer(
        &self,
        sink: &mut OutputSink,
        cancel: &CancellationToken,
        outcome: &mut ExchangeOutcome,
    ) -> Result<()> {
        let mut stream = self.client.execute(&self.history, cancel).await?;

        while let Some(delta) = stream.next_delta().await? {
            if let Some(err) = &delta.error {
                eprintln!("chunk error: {err}");
                continue;
            }
            if !delta.text.is_empty() {
                sink.write(&delta.text).await?;
                outcome.answer.push_str(&delta.text);
            }
            if !delta.citations.is_empty() {
                outcome.citations = delta.citations;
            }
        }

        if let Some(usage) = stream.usage() {
            tracing::info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost = ?usage.cost,
                "exchange usage"
            );
        }
        Ok(())
    }
}

/// Write the trailing block and close the sink.
///
/// Citations are only printed in single-shot mode; interactive sessions
/// never show them.
async fn finalize(mut sink: OutputSink, mode: ExchangeMode, citations: &[String]) -> Result<()> {
    let mut tail = String::new();
    if mode == ExchangeMode::SingleShot && !citations.is_empty() {
        tail.push_str(&format_links(citations));
    }
    tail.push('\n');

    let written = sink.write(&tail).await;
    let ended = sink.end().await;
    written.and(ended)
}

pub fn format_links(citations: &[String]) -> String {
    format!("\n\nLinks:\n\n{}", citations.join("\n"))
}

fn report(context: &str, err: &ChatError) {
    eprintln!("{context}: {}", crate::error::describe(err));
}

// ─── Tests ────────────────────────────────────────────────────────────────
