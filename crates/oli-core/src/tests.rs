/// Decoding tests against chunk payloads captured from OpenRouter streams.
#[cfg(test)]
mod unit {
    use crate::chunk::{ChunkDecoder, Decoded};
    use crate::types::RawChunk;

    fn parse(json: &str) -> RawChunk {
        serde_json::from_str(json).expect("failed to parse chunk")
    }

    #[test]
    fn parse_full_openai_style_chunk() {
        let json = r#"{
            "id": "gen-1700000000-abc",
            "provider": "Google",
            "model": "google/gemini-2.5-flash",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "choices": [{
                "index": 0,
                "delta": {"role": "assistant", "content": "Hello"},
                "finish_reason": null,
                "native_finish_reason": null,
                "logprobs": null
            }]
        }"#;
        let chunk = parse(json);
        assert_eq!(chunk.choices.len(), 1);
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hello"));
        assert_eq!(chunk.choices[0].delta.role.as_deref(), Some("assistant"));
        assert!(chunk.error.is_none());
    }

    #[test]
    fn parse_final_usage_chunk() {
        let json = r#"{
            "id": "gen-1",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 40, "total_tokens": 52, "cost": 0.00011}
        }"#;
        let chunk = parse(json);
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 40);
        assert!((usage.cost.unwrap() - 0.00011).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_online_chunk_with_citations() {
        let json = r#"{
            "choices": [{"index": 0, "delta": {"content": "According to [1]"}}],
            "citations": ["https://example.com/a", "https://example.com/b"]
        }"#;
        let chunk = parse(json);
        assert_eq!(chunk.citations.unwrap().len(), 2);
    }

    #[test]
    fn parse_mid_stream_error_chunk() {
        let json = r#"{
            "id": "gen-2",
            "object": "chat.completion.chunk",
            "error": {"code": "server_error", "message": "Provider disconnected"},
            "choices": [{"index": 0, "delta": {"content": ""}, "finish_reason": "error"}]
        }"#;
        let chunk = parse(json);
        let err = chunk.error.unwrap();
        assert!(err.describe().starts_with("Provider disconnected"));
    }

    #[test]
    fn decoder_handles_a_captured_session() {
        let lines = [
            ": OPENROUTER PROCESSING",
            "",
            r#"data: {"id":"gen-3","choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
            "",
            r#"data: {"id":"gen-3","choices":[{"index":0,"delta":{"content":"Rust "}}]}"#,
            "",
            r#"data: {"id":"gen-3","choices":[{"index":0,"delta":{"content":"is fast."}}]}"#,
            "",
            r#"data: {"id":"gen-3","choices":[{"index":0,"delta":{"content":""},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":4,"total_tokens":9}}"#,
            "",
            "data: [DONE]",
        ];

        let mut decoder = ChunkDecoder::new();
        let mut answer = String::new();
        let mut deltas = 0;
        for line in lines {
            match decoder.decode(line) {
                Decoded::Delta(d) => {
                    deltas += 1;
                    answer.push_str(&d.text);
                }
                Decoded::Done => break,
                Decoded::Ignored => {}
            }
        }
        assert_eq!(answer, "Rust is fast.");
        assert_eq!(deltas, 4);
        assert_eq!(decoder.usage().unwrap().total_tokens, 9);
    }

    #[test]
    fn public_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<crate::ChatClient>();
        assert_send::<crate::Session>();
        assert_send::<crate::OutputSink>();
        assert_send::<crate::DeltaStream>();
        assert_send::<crate::ChatError>();
    }
}
