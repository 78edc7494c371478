use anyhow::{anyhow, Result};
use oli_core::{ChatClient, Session};
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// How long the worker may take to unwind after a signal before we return.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Where the prompt comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Terminal without prompt arguments: read-eval loop.
    Interactive,
    /// Terminal with prompt arguments: one exchange.
    Prompt(String),
    /// Piped stdin: read it all, one exchange.
    Batch,
}

impl Input {
    pub fn detect(stdin_is_terminal: bool, args: &[String]) -> Self {
        if !stdin_is_terminal {
            return Input::Batch;
        }
        let prompt = args.join(" ");
        if prompt.trim().is_empty() {
            Input::Interactive
        } else {
            Input::Prompt(prompt)
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Run the session on a worker task and wait for shutdown.
///
/// The worker cancels the token when it finishes; SIGINT/SIGTERM cancel it
/// from outside. Either way this returns once the token fires and the worker
/// has stopped (or the grace period ran out).
pub async fn run(client: ChatClient, input: Input) -> Result<()> {
    let cancel = CancellationToken::new();
    watch_signals(cancel.clone());

    let worker_cancel = cancel.clone();
    let mut worker = tokio::spawn(async move {
        let result = drive(client, input, &worker_cancel).await;
        worker_cancel.cancel();
        result
    });

    cancel.cancelled().await;

    match tokio::time::timeout(SHUTDOWN_GRACE, &mut worker).await {
        Ok(Ok(result)) => result.map_err(Into::into),
        Ok(Err(join_err)) => Err(anyhow!("session task failed: {join_err}")),
        Err(_) => {
            tracing::debug!("session did not stop within grace period");
            worker.abort();
            Ok(())
        }
    }
}

async fn drive(client: ChatClient, input: Input, cancel: &CancellationToken) -> oli_core::Result<()> {
    let mut session = Session::new(client);
    match input {
        Input::Interactive => {
            session
                .run_interactive(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), cancel)
                .await
        }
        Input::Prompt(prompt) => session.run_single_shot(&prompt, cancel).await,
        Input::Batch => {
            let mut stdin = tokio::io::stdin();
            let mut text = String::new();
            tokio::select! {
                read = stdin.read_to_string(&mut text) => { read?; }
                _ = cancel.cancelled() => return Ok(()),
            }
            session.run_single_shot(&text, cancel).await
        }
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

fn watch_signals(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = termination_signal() => {
                tracing::debug!("termination signal received");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

#[cfg(unix)]
async fn termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "cannot listen for SIGTERM");
            return ctrl_c().await;
        }
    };
    tokio::select! {
        _ = ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn termination_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
