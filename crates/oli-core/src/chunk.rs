use crate::types::{RawChunk, Usage};

/// SSE field prefix carrying a payload.
pub const DATA_PREFIX: &str = "data:";

/// Payload that terminates the stream.
pub const DONE_MARKER: &str = "[DONE]";

// ─── StreamDelta ──────────────────────────────────────────────────────────

/// What went wrong with a single chunk.
///
/// The two outcomes are deliberately separate: a payload that could not be
/// parsed is reported and skipped, while an `error` object inside a valid
/// payload ends the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    Malformed,
    Upstream { message: String },
}

impl ChunkError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChunkError::Upstream { .. })
    }
}

impl std::fmt::Display for ChunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkError::Malformed => f.write_str("cannot parse stream chunk"),
            ChunkError::Upstream { message } => write!(f, "upstream error: {message}"),
        }
    }
}

/// One decoded `data:` event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    /// Possibly empty (role-only chunks).
    pub text: String,
    /// Only set on chunks that carry a non-empty citation list.
    pub citations: Vec<String>,
    pub error: Option<ChunkError>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn failed(error: ChunkError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Outcome of decoding one physical line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Not a data line (comment, keep-alive, blank) or a chunk with no choices.
    Ignored,
    /// `data: [DONE]`: stop reading.
    Done,
    Delta(StreamDelta),
}

// ─── ChunkDecoder ─────────────────────────────────────────────────────────

/// Turns raw SSE lines into [`StreamDelta`]s for one exchange.
///
/// Keeps the side-channel state that outlives a single line: the latest
/// citation list (last write wins) and the latest usage record.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    citations: Vec<String>,
    usage: Option<Usage>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, line: &str) -> Decoded {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return Decoded::Ignored;
        };
        let payload = payload.trim();

        if payload == DONE_MARKER {
            return Decoded::Done;
        }

        let chunk: RawChunk = match serde_json::from_str(payload) {
            Ok(c) => c,
            Err(_) => return Decoded::Delta(StreamDelta::failed(ChunkError::Malformed)),
        };

        if let Some(err) = &chunk.error {
            return Decoded::Delta(StreamDelta::failed(ChunkError::Upstream {
                message: err.describe(),
            }));
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let mut citations = Vec::new();
        if let Some(list) = chunk.citations.filter(|c| !c.is_empty()) {
            self.citations = list.clone();
            citations = list;
        }

        // Only the first choice is rendered.
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Decoded::Ignored;
        };

        Decoded::Delta(StreamDelta {
            text: choice.delta.content.unwrap_or_default(),
            citations,
            error: None,
        })
    }

    /// Latest non-empty citation list seen by this decoder.
    pub fn citations(&self) -> &[String] {
        &self.citations
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
