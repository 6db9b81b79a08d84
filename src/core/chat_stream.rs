//! SSE transport for one in-flight completions request.
//!
//! A spawned task posts the request, splits the byte stream into lines, and
//! forwards decoded events over an unbounded channel tagged with a stream
//! id. The single consumer (the generation controller's owner) applies them
//! in arrival order; events from superseded streams are discarded by id.
//! Cancellation is cooperative via a [`CancellationToken`] checked at every
//! suspension point.

use std::fmt;

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::ChatRequest;
use crate::core::assembler::{decode_sse_payload, SsePayload};
use crate::utils::url::construct_api_url;

/// Why a stream stopped abnormally. Both variants retain the partial
/// message; they differ only for diagnostics and retry messaging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFailure {
    /// An inbound event could not be parsed.
    Protocol(String),
    /// Network or API failure before or during streaming.
    Transport(String),
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFailure::Protocol(msg) => write!(f, "protocol error: {msg}"),
            StreamFailure::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// One event delivered to the stream consumer.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// Incremental content and/or reasoning fragments from one chunk.
    Delta {
        content: Option<String>,
        reasoning: Option<String>,
    },
    /// Abnormal termination; no further events follow for this stream.
    Failed(StreamFailure),
    /// Normal termination (`[DONE]` or transport end-of-stream).
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Pull a human-readable summary out of an API error body, falling back to
/// the collapsed raw text.
fn summarize_api_error(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty error body>".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let summary = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .or_else(|| {
                value.get("error").and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    _ => None,
                })
            })
            .or_else(|| value.get("message").and_then(|v| v.as_str()).map(str::to_owned));
        if let Some(summary) = summary {
            return summary.split_whitespace().collect::<Vec<_>>().join(" ");
        }
    }

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when a JSON payload is an in-stream error object rather than a
/// chunk. Some providers deliver failures this way mid-stream.
fn is_error_payload(payload: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(payload)
        .map(|value| value.get("error").is_some())
        .unwrap_or(false)
}

fn handle_data_payload(
    payload: &str,
    tx: &mpsc::UnboundedSender<(StreamEvent, u64)>,
    stream_id: u64,
) -> bool {
    if payload.trim().is_empty() {
        return false;
    }

    match decode_sse_payload(payload) {
        Ok(SsePayload::Done) => {
            let _ = tx.send((StreamEvent::End, stream_id));
            true
        }
        Ok(SsePayload::Event(event)) => {
            if let Some(choice) = event.choices.first() {
                if choice.delta.content.is_some() || choice.delta.reasoning.is_some() {
                    let _ = tx.send((
                        StreamEvent::Delta {
                            content: choice.delta.content.clone(),
                            reasoning: choice.delta.reasoning.clone(),
                        },
                        stream_id,
                    ));
                }
            }
            false
        }
        Err(err) => {
            let failure = if is_error_payload(payload) {
                StreamFailure::Transport(summarize_api_error(payload))
            } else {
                StreamFailure::Protocol(err.to_string())
            };
            let _ = tx.send((StreamEvent::Failed(failure), stream_id));
            true
        }
    }
}

fn process_sse_line(
    line: &str,
    tx: &mpsc::UnboundedSender<(StreamEvent, u64)>,
    stream_id: u64,
) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx, stream_id))
        .unwrap_or(false)
}

/// Everything a spawned stream task needs.
pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub request: ChatRequest,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub stream_id: u64,
}

/// Spawns stream tasks and hands their events to a single receiver.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamEvent, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamEvent, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                api_key,
                request,
                cancel_token,
                stream_id,
            } = params;

            tokio::select! {
                _ = async {
                    let url = construct_api_url(&base_url, "chat/completions");
                    debug!(stream_id, model = %request.model, "dispatching completions request");

                    let response = match client
                        .post(url)
                        .bearer_auth(&api_key)
                        .json(&request)
                        .send()
                        .await
                    {
                        Ok(response) => response,
                        Err(e) => {
                            let _ = tx.send((
                                StreamEvent::Failed(StreamFailure::Transport(e.to_string())),
                                stream_id,
                            ));
                            return;
                        }
                    };

                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "<no body>".to_string());
                        let _ = tx.send((
                            StreamEvent::Failed(StreamFailure::Transport(format!(
                                "{status}: {}",
                                summarize_api_error(&body)
                            ))),
                            stream_id,
                        ));
                        return;
                    }

                    let mut stream = response.bytes_stream();
                    let mut buffer: Vec<u8> = Vec::new();

                    while let Some(chunk) = stream.next().await {
                        if cancel_token.is_cancelled() {
                            return;
                        }

                        let chunk_bytes = match chunk {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                let _ = tx.send((
                                    StreamEvent::Failed(StreamFailure::Transport(e.to_string())),
                                    stream_id,
                                ));
                                return;
                            }
                        };
                        buffer.extend_from_slice(&chunk_bytes);

                        while let Some(newline_pos) = memchr(b'\n', &buffer) {
                            let line = match std::str::from_utf8(&buffer[..newline_pos]) {
                                Ok(s) => s.trim().to_string(),
                                Err(e) => {
                                    debug!(stream_id, error = %e, "dropping non-UTF-8 line");
                                    buffer.drain(..=newline_pos);
                                    continue;
                                }
                            };

                            let should_end = process_sse_line(&line, &tx, stream_id);
                            buffer.drain(..=newline_pos);
                            if should_end {
                                return;
                            }
                        }
                    }

                    let _ = tx.send((StreamEvent::End, stream_id));
                } => {}
                _ = cancel_token.cancelled() => {
                    debug!(stream_id, "stream task cancelled");
                }
            }
        });
    }
}
