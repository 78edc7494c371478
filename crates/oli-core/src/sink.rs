use std::process::Stdio;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};

use crate::{ChatError, Result};

// ─── OutputSink ───────────────────────────────────────────────────────────

/// Destination for one exchange's answer.
///
/// Either a plain writer (normally stdout) or the stdin of an external filter
/// such as a pager or markdown renderer. A sink is opened per exchange and
/// consumed by [`OutputSink::end`]; it is never reused.
pub struct OutputSink {
    target: Target,
}

enum Target {
    Direct(Box<dyn AsyncWrite + Send + Unpin>),
    Piped {
        command: String,
        child: Child,
        stdin: Option<ChildStdin>,
    },
}

impl OutputSink {
    /// Open a sink for the configured filter command, or stdout if there is
    /// none. Blank commands count as none.
    ///
    /// The filter runs under `sh -c` with stdout and stderr inherited from
    /// this process.
    pub fn open(pipe: Option<&str>) -> Result<Self> {
        match pipe.map(str::trim).filter(|c| !c.is_empty()) {
            None => Ok(Self::stdout()),
            Some(command) => Self::spawn(command),
        }
    }

    pub fn stdout() -> Self {
        Self::from_writer(tokio::io::stdout())
    }

    pub fn from_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            target: Target::Direct(Box::new(writer)),
        }
    }

    fn spawn(command: &str) -> Result<Self> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| ChatError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChatError::Sink("filter stdin not captured".into()))?;

        tracing::debug!(command, pid = ?child.id(), "spawned output filter");
        Ok(Self {
            target: Target::Piped {
                command: command.to_string(),
                child,
                stdin: Some(stdin),
            },
        })
    }

    pub fn is_piped(&self) -> bool {
        matches!(self.target, Target::Piped { .. })
    }

    /// Forward `text` and flush so partial answers show up immediately.
    pub async fn write(&mut self, text: &str) -> Result<()> {
        match &mut self.target {
            Target::Direct(w) => {
                w.write_all(text.as_bytes()).await?;
                w.flush().await?;
            }
            Target::Piped { command, stdin, .. } => {
                let stdin = stdin
                    .as_mut()
                    .ok_or_else(|| ChatError::Sink("filter stdin already closed".into()))?;
                stdin
                    .write_all(text.as_bytes())
                    .await
                    .map_err(|e| ChatError::Sink(format!("write to `{command}` failed: {e}")))?;
                stdin
                    .flush()
                    .await
                    .map_err(|e| ChatError::Sink(format!("write to `{command}` failed: {e}")))?;
            }
        }
        Ok(())
    }

    /// Finish the exchange's output.
    ///
    /// For a filter: close its stdin first so it sees end-of-input, then wait
    /// for it to exit. A non-zero exit is an error.
    pub async fn end(self) -> Result<()> {
        match self.target {
            Target::Direct(mut w) => {
                w.flush().await?;
                Ok(())
            }
            Target::Piped {
                command,
                mut child,
                stdin,
            } => {
                // Dropping the handle closes the pipe.
                drop(stdin);

                let status = child
                    .wait()
                    .await
                    .map_err(|e| ChatError::Sink(format!("waiting for `{command}` failed: {e}")))?;
                if status.success() {
                    return Ok(());
                }
                let msg = match status.code() {
                    Some(code) => format!("`{command}` exited with code {code}"),
                    None => format!("`{command}` terminated by signal"),
                };
                Err(ChatError::Sink(msg))
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
