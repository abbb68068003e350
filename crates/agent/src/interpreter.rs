//! Response interpretation: model stream in, [`Decision`] out.
//!
//! The whole stream is drained before anything is parsed; the model is
//! expected to reason in free text and finish with one JSON object, so
//! only the trailing object counts.

use serde_json::{Map, Value};
use stepwise_core::decision::{Action, Decision};
use stepwise_core::error::ProviderError;
use stepwise_core::provider::ChunkReceiver;
use tracing::{debug, trace};

/// Drain a response stream and extract the decision it ends with.
///
/// Text fragments are concatenated; usage chunks go to [`Decision::usage`].
/// Malformed model text never fails here (it becomes [`Action::Invalid`]);
/// only a transport error on the stream does.
pub async fn interpret(mut rx: ChunkReceiver) -> Result<Decision, ProviderError> {
    let mut buffer = String::new();
    let mut usage = None;
    let mut fragments = 0usize;

    while let Some(item) = rx.recv().await {
        let chunk = item?;
        if let Some(text) = chunk.content {
            trace!(fragment = %text, "Received fragment");
            buffer.push_str(&text);
            fragments += 1;
        }
        if chunk.usage.is_some() {
            usage = chunk.usage;
        }
        if chunk.done {
            break;
        }
    }

    debug!(fragments, chars = buffer.len(), "Response stream drained");

    Ok(Decision {
        action: extract_action(&buffer),
        usage,
    })
}

/// Find the trailing JSON object in `buffer` and map it to an action.
///
/// The candidate ends at the last `}`. It starts at the last `{` before
/// that; if the slice does not parse (the trailing object has nested
/// objects), earlier `{` positions are tried in turn. The reported parse
/// error is always the one from the last-brace attempt.
pub fn extract_action(buffer: &str) -> Action {
    let Some(close) = buffer.rfind('}') else {
        return parse_failure(buffer, "");
    };

    let candidates = buffer[..close].match_indices('{').map(|(i, _)| i).rev();
    let mut first_error = None;

    for open in candidates {
        match serde_json::from_str::<Map<String, Value>>(&buffer[open..=close]) {
            Ok(object) => return to_action(object),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => invalid(format!("Failed to parse JSON: {e}")),
        None => parse_failure(buffer, ""),
    }
}

fn parse_failure(buffer: &str, candidate: &str) -> Action {
    debug!(chars = buffer.len(), "No JSON object in response");
    match serde_json::from_str::<Value>(candidate) {
        Err(e) => invalid(format!("Failed to parse JSON: {e}")),
        Ok(_) => invalid("Failed to parse JSON: no object found".into()),
    }
}

fn invalid(error: String) -> Action {
    Action::Invalid { error }
}

fn to_action(mut object: Map<String, Value>) -> Action {
    let tool = match object.get("tool") {
        Some(Value::String(tool)) => tool.clone(),
        _ => return invalid("Decision has no 'tool' field".into()),
    };

    if tool == "stop" {
        Action::Stop {
            result: object.remove("result").unwrap_or(Value::Null),
        }
    } else {
        Action::Invoke {
            tool,
            input: object
                .remove("input")
                .unwrap_or_else(|| Value::String(String::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepwise_core::provider::{StreamChunk, Usage};
    use tokio::sync::mpsc;

    async fn stream_of(items: Vec<Result<StreamChunk, ProviderError>>) -> ChunkReceiver {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.send(item).await.unwrap();
        }
        rx
    }

    fn texts(fragments: &[&str]) -> Vec<Result<StreamChunk, ProviderError>> {
        fragments.iter().map(|f| Ok(StreamChunk::text(*f))).collect()
    }

    #[tokio::test]
    async fn fragments_are_concatenated_before_parsing() {
        let rx = stream_of(texts(&[
            "Thinking...",
            "{\"tool\": \"calculator\"",
            ", \"input\": \"2+2\"}",
        ]))
        .await;
        let decision = interpret(rx).await.unwrap();
        assert_eq!(
            decision.action,
            Action::Invoke {
                tool: "calculator".into(),
                input: json!("2+2"),
            }
        );
        assert!(decision.usage.is_none());
    }

    #[tokio::test]
    async fn chunking_does_not_matter() {
        let text = "I will add them. {\"tool\": \"calculator\", \"input\": \"3 + 2\"}";
        let whole = interpret(stream_of(texts(&[text])).await).await.unwrap();

        let chars: Vec<String> = text.chars().map(String::from).collect();
        let per_char: Vec<&str> = chars.iter().map(String::as_str).collect();
        let split = interpret(stream_of(texts(&per_char)).await).await.unwrap();

        assert_eq!(whole, split);
    }

    #[tokio::test]
    async fn usage_goes_to_side_channel() {
        let usage = Usage {
            prompt_tokens: 40,
            completion_tokens: 9,
            total_tokens: 49,
        };
        let mut items = texts(&["{\"tool\": \"stop\", \"result\": 4}"]);
        items.push(Ok(StreamChunk::usage(usage.clone())));
        items.push(Ok(StreamChunk::done()));

        let decision = interpret(stream_of(items).await).await.unwrap();
        assert_eq!(decision.action, Action::Stop { result: json!(4) });
        assert_eq!(decision.usage, Some(usage));
    }

    #[tokio::test]
    async fn transport_error_is_returned() {
        let items = vec![
            Ok(StreamChunk::text("{\"tool\": ")),
            Err(ProviderError::StreamInterrupted("connection reset".into())),
        ];
        let err = interpret(stream_of(items).await).await.unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }

    #[tokio::test]
    async fn empty_stream_is_invalid_not_error() {
        let decision = interpret(stream_of(vec![]).await).await.unwrap();
        assert!(matches!(decision.action, Action::Invalid { .. }));
    }

    #[test]
    fn stop_without_result_is_null() {
        assert_eq!(
            extract_action(r#"{"tool": "stop"}"#),
            Action::Stop { result: Value::Null }
        );
    }

    #[test]
    fn invoke_without_input_is_empty_string() {
        assert_eq!(
            extract_action(r#"{"tool": "calculator"}"#),
            Action::Invoke {
                tool: "calculator".into(),
                input: json!(""),
            }
        );
    }

    #[test]
    fn only_the_trailing_object_counts() {
        let text = r#"Earlier I tried {"tool": "calculator", "input": "1+1"}, now {"tool": "stop", "result": "done"}"#;
        assert_eq!(extract_action(text), Action::Stop { result: json!("done") });
    }

    #[test]
    fn nested_trailing_object_is_recovered() {
        let text = r#"Plan: {"tool": "calculator", "input": {"expression": "2*(3+4)"}}"#;
        assert_eq!(
            extract_action(text),
            Action::Invoke {
                tool: "calculator".into(),
                input: json!({"expression": "2*(3+4)"}),
            }
        );
    }

    #[test]
    fn no_braces_is_a_parse_failure() {
        match extract_action("I am not sure what to do.") {
            Action::Invalid { error } => assert!(error.starts_with("Failed to parse JSON: ")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn malformed_trailing_object_is_a_parse_failure() {
        match extract_action(r#"{"tool": "calculator", "input": }"#) {
            Action::Invalid { error } => assert!(error.starts_with("Failed to parse JSON: ")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn object_without_tool_is_invalid() {
        assert_eq!(
            extract_action(r#"{"answer": 4}"#),
            Action::Invalid {
                error: "Decision has no 'tool' field".into()
            }
        );
        assert_eq!(
            extract_action(r#"{"tool": 7}"#),
            Action::Invalid {
                error: "Decision has no 'tool' field".into()
            }
        );
    }
}
