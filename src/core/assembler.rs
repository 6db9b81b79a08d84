//! Decoding and folding of streamed response events.
//!
//! Event bodies decode to either the `[DONE]` sentinel or a structured
//! chunk; delta fragments are folded, in arrival order and exactly once
//! each, into the target message's first text block and its reasoning
//! channel. After every fold the message is valid for display, so a reader
//! observing between events always sees consistent partial state.

use std::error::Error;
use std::fmt;

use crate::api::{ChatResponse, ChatResponseDelta};
use crate::core::message::Message;

/// Sentinel terminating a stream normally.
pub const DONE_SENTINEL: &str = "[DONE]";

/// An inbound event could not be parsed. Streaming stops; the partial
/// message built so far is retained, not discarded.
#[derive(Debug)]
pub struct ProtocolDecodeError {
    payload: String,
    source: serde_json::Error,
}

impl ProtocolDecodeError {
    /// A truncated view of the offending payload, for diagnostics.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl fmt::Display for ProtocolDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed stream event: {}", self.source)
    }
}

impl Error for ProtocolDecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// One decoded server-sent event body.
#[derive(Debug)]
pub enum SsePayload {
    /// The literal `[DONE]` sentinel; terminates the stream, no content.
    Done,
    Event(ChatResponse),
}

/// Decode one event body: either the `[DONE]` sentinel or a structured
/// chunk.
pub fn decode_sse_payload(payload: &str) -> Result<SsePayload, ProtocolDecodeError> {
    if payload == DONE_SENTINEL {
        return Ok(SsePayload::Done);
    }
    serde_json::from_str::<ChatResponse>(payload)
        .map(SsePayload::Event)
        .map_err(|source| ProtocolDecodeError {
            payload: payload.chars().take(200).collect(),
            source,
        })
}

/// Fold one delta: content appends to the first text block, reasoning
/// appends to the reasoning channel. Fragments are concatenated in arrival
/// order with no separator inserted; the upstream protocol guarantees they
/// are exact substrings to be joined contiguously.
pub fn apply_delta(target: &mut Message, delta: &ChatResponseDelta) {
    if let Some(content) = &delta.content {
        target.append_text(content);
    }
    if let Some(reasoning) = &delta.reasoning {
        target.append_reasoning(reasoning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;

    fn delta(content: Option<&str>, reasoning: Option<&str>) -> ChatResponseDelta {
        ChatResponseDelta {
            role: None,
            content: content.map(str::to_owned),
            reasoning: reasoning.map(str::to_owned),
        }
    }

    #[test]
    fn folds_content_fragments_in_arrival_order() {
        let mut target = Message::assistant_placeholder();
        apply_delta(&mut target, &delta(Some("Hel"), None));
        apply_delta(&mut target, &delta(Some("lo"), None));
        assert_eq!(target.text_content(), Some("Hello"));
        assert!(target.reasoning_text.is_none());
    }

    #[test]
    fn folding_is_independent_of_chunk_granularity() {
        let mut fine = Message::assistant_placeholder();
        let mut coarse = Message::assistant_placeholder();

        for fragment in ["a", "b", "c"] {
            apply_delta(&mut fine, &delta(Some(fragment), None));
        }
        apply_delta(&mut coarse, &delta(Some("ab"), None));
        apply_delta(&mut coarse, &delta(Some("c"), None));

        assert_eq!(fine.text_content(), coarse.text_content());
    }

    #[test]
    fn reasoning_folds_to_its_own_channel() {
        let mut target = Message::assistant_placeholder();
        apply_delta(&mut target, &delta(None, Some("hm, ")));
        apply_delta(&mut target, &delta(Some("Answer"), Some("ok")));

        assert_eq!(target.reasoning_text.as_deref(), Some("hm, ok"));
        assert_eq!(target.text_content(), Some("Answer"));
    }

    #[test]
    fn done_sentinel_decodes_without_content() {
        assert!(matches!(
            decode_sse_payload(DONE_SENTINEL).unwrap(),
            SsePayload::Done
        ));
    }

    #[test]
    fn structured_chunk_decodes_to_its_delta() {
        let payload = r#"{"choices":[{"delta":{"content":"hi","reasoning":"why"},"index":0}]}"#;
        let SsePayload::Event(event) = decode_sse_payload(payload).unwrap() else {
            panic!("expected structured event");
        };
        assert_eq!(event.choices[0].delta.content.as_deref(), Some("hi"));
        assert_eq!(event.choices[0].delta.reasoning.as_deref(), Some("why"));
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = decode_sse_payload("{not json").unwrap_err();
        assert!(err.to_string().contains("malformed stream event"));
        assert_eq!(err.payload(), "{not json");
    }

    #[test]
    fn oversized_malformed_payloads_are_truncated_for_diagnostics() {
        let payload = "x".repeat(500);
        let err = decode_sse_payload(&payload).unwrap_err();
        assert_eq!(err.payload().len(), 200);
    }
}
