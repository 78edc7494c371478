use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or invalid configuration (e.g. no API key).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no prompt provided")]
    EmptyPrompt,

    #[error("request failed")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-2xx status.
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A structured error object embedded in an otherwise valid chunk.
    #[error("upstream error: {0}")]
    Protocol(String),

    /// Output filter write or wait failure.
    #[error("output sink error: {0}")]
    Sink(String),

    #[error("failed to spawn output filter `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

impl ChatError {
    /// Cooperative shutdown; callers treat this as a clean exit.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Cancelled)
    }

    /// Errors that unwind to process exit rather than ending one exchange.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChatError::Config(_) | ChatError::Spawn { .. } | ChatError::Io(_)
        )
    }
}

/// `err` followed by its source chain, joined with `: `.
pub fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
