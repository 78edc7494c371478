//! `oli-core`: the streaming half of the `oli` OpenRouter client.
//!
//! # Architecture
//!
//! ```text
//! Session          ← owns history, runs interactive or single-shot exchanges
//!     │
//!     ▼
//! ChatClient       ← POST /chat/completions with `Accept: text/event-stream`
//!     │
//!     ▼
//! DeltaStream      ← buffers the body into lines, checks cancellation per line
//!     │
//!     ▼
//! ChunkDecoder     ← `data: {...}` → StreamDelta (text, citations, error)
//!     │
//!     ▼
//! OutputSink       ← stdout, or the stdin of a `sh -c` filter (pager, renderer)
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use oli_core::{ChatClient, ChatConfig, Session};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = ChatClient::new(ChatConfig::new("sk-or-..."))?;
//! let mut session = Session::new(client);
//! session.run_single_shot("Explain SSE in one line", &CancellationToken::new()).await?;
//! ```

pub mod chunk;
pub mod client;
pub mod error;
pub mod session;
pub mod sink;
pub mod stream;
pub mod types;

#[cfg(test)]
mod tests;

pub use chunk::{ChunkDecoder, ChunkError, Decoded, StreamDelta};
pub use client::ChatClient;
pub use error::ChatError;
pub use session::{ExchangeMode, ExchangeOutcome, Session};
pub use sink::OutputSink;
pub use stream::DeltaStream;
pub use types::{ChatConfig, ChatRequest, Message, Plugin, Role, Usage};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ChatError>;
