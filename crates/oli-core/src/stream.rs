use tokio_util::sync::CancellationToken;

use crate::chunk::{ChunkDecoder, ChunkError, Decoded, StreamDelta};
use crate::types::Usage;
use crate::{ChatError, Result};

// ─── DeltaStream ──────────────────────────────────────────────────────────

/// The body of a streamed completion, decoded one line at a time.
///
/// Each physical line is one SSE record. Network chunks are buffered until a
/// full line is available; an unterminated last line is still decoded at
/// EOF. The response is released as soon as the stream finishes, fails or
/// is cancelled, and in any case when the `DeltaStream` is dropped.
#[derive(Debug)]
pub struct DeltaStream {
    response: Option<reqwest::Response>,
    buf: Vec<u8>,
    eof: bool,
    decoder: ChunkDecoder,
    cancel: CancellationToken,
    lines: usize,
}

impl DeltaStream {
    pub(crate) fn new(response: reqwest::Response, cancel: CancellationToken) -> Self {
        Self {
            response: Some(response),
            buf: Vec::new(),
            eof: false,
            decoder: ChunkDecoder::new(),
            cancel,
            lines: 0,
        }
    }

    /// Next delta in arrival order.
    ///
    /// `Ok(None)` on `[DONE]` or end of body. Malformed chunks come back as a
    /// delta carrying [`ChunkError::Malformed`] so the caller can report them
    /// and keep going; an upstream error object ends the stream with
    /// [`ChatError::Protocol`].
    pub async fn next_delta(&mut self) -> Result<Option<StreamDelta>> {
        loop {
            let Some(line) = self.next_line().await? else {
                self.finish();
                return Ok(None);
            };

            if self.cancel.is_cancelled() {
                tracing::debug!(lines = self.lines, "stream cancelled");
                self.finish();
                return Err(ChatError::Cancelled);
            }
            self.lines += 1;

            match self.decoder.decode(&line) {
                Decoded::Ignored => continue,
                Decoded::Done => {
                    tracing::debug!(lines = self.lines, "stream done");
                    self.finish();
                    return Ok(None);
                }
                Decoded::Delta(delta) => match &delta.error {
                    Some(ChunkError::Upstream { message }) => {
                        let message = message.clone();
                        self.finish();
                        return Err(ChatError::Protocol(message));
                    }
                    Some(ChunkError::Malformed) => {
                        tracing::debug!(line = %truncate(&line, 120), "skipping malformed chunk");
                        return Ok(Some(delta));
                    }
                    None => return Ok(Some(delta)),
                },
            }
        }
    }

    /// Latest non-empty citation list seen so far.
    pub fn citations(&self) -> &[String] {
        self.decoder.citations()
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.decoder.usage()
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let rest = self.buf.split_off(pos + 1);
                let mut line = std::mem::replace(&mut self.buf, rest);
                line.pop();
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buf);
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            let Some(response) = self.response.as_mut() else {
                self.eof = true;
                continue;
            };
            match response.chunk().await {
                Ok(Some(bytes)) => self.buf.extend_from_slice(&bytes),
                Ok(None) => self.eof = true,
                Err(e) => {
                    self.finish();
                    return Err(ChatError::Transport(e));
                }
            }
        }
    }

    fn finish(&mut self) {
        self.response = None;
        self.eof = true;
        self.buf.clear();
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatClient;
    use crate::types::{ChatConfig, Message};

    async fn open(body: &str) -> (mockito::ServerGuard, DeltaStream, CancellationToken) {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let config = ChatConfig {
            base_url: server.url(),
            ..ChatConfig::new("sk-test")
        };
        let client = ChatClient::new(config).unwrap();
        let cancel = CancellationToken::new();
        let stream = client
            .execute(&[Message::user("hi")], &cancel)
            .await
            .unwrap();
        (server, stream, cancel)
    }

    async fn drain(stream: &mut DeltaStream) -> (String, Vec<StreamDelta>) {
        let mut text = String::new();
        let mut deltas = Vec::new();
        while let Some(d) = stream.next_delta().await.unwrap() {
            text.push_str(&d.text);
            deltas.push(d);
        }
        (text, deltas)
    }

    #[tokio::test]
    async fn yields_fragments_in_order() {
        let body = concat!(
            ": OPENROUTER PROCESSING\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n",
            "data: [DONE]\n",
        );
        let (_server, mut stream, _cancel) = open(body).await;
        let (text, deltas) = drain(&mut stream).await;
        assert_eq!(text, "Hi there");
        // The role-only chunk still counts as a delta.
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[0].text, "");
    }

    #[tokio::test]
    async fn stops_at_done_marker() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        );
        let (_server, mut stream, _cancel) = open(body).await;
        let (text, _) = drain(&mut stream).await;
        assert_eq!(text, "a");
        assert!(stream.next_delta().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_without_done_is_clean() {
        // No trailing newline on the last line either.
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}";
        let (_server, mut stream, _cancel) = open(body).await;
        let (text, _) = drain(&mut stream).await;
        assert_eq!(text, "tail");
    }

    #[tokio::test]
    async fn crlf_lines_are_handled() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\ndata: [DONE]\r\n";
        let (_server, mut stream, _cancel) = open(body).await;
        let (text, _) = drain(&mut stream).await;
        assert_eq!(text, "x");
    }

    #[tokio::test]
    async fn malformed_chunk_is_reported_and_skipped() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {oops\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            "data: [DONE]\n",
        );
        let (_server, mut stream, _cancel) = open(body).await;
        let (text, deltas) = drain(&mut stream).await;
        assert_eq!(text, "ab");
        assert_eq!(deltas[1].error, Some(ChunkError::Malformed));
    }

    #[tokio::test]
    async fn embedded_error_ends_stream() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"error\":{\"message\":\"provider overloaded\"}}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
        );
        let (_server, mut stream, _cancel) = open(body).await;
        assert_eq!(stream.next_delta().await.unwrap().unwrap().text, "a");
        let err = stream.next_delta().await.unwrap_err();
        match err {
            ChatError::Protocol(msg) => assert!(msg.contains("provider overloaded")),
            other => panic!("expected Protocol, got {other:?}"),
        }
        assert!(stream.next_delta().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_line() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            "data: [DONE]\n",
        );
        let (_server, mut stream, cancel) = open(body).await;
        assert_eq!(stream.next_delta().await.unwrap().unwrap().text, "a");
        cancel.cancel();
        let err = stream.next_delta().await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn citations_last_write_wins() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}],\"citations\":[\"https://one\"]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}],\"citations\":[\"https://two\",\"https://three\"]}\n",
            "data: [DONE]\n",
        );
        let (_server, mut stream, _cancel) = open(body).await;
        drain(&mut stream).await;
        assert_eq!(stream.citations(), ["https://two", "https://three"]);
    }
}
