//! The generation session state machine.
//!
//! One controller orchestrates one request/stream/cancel lifecycle at a
//! time: `Idle -> Requesting -> Streaming -> {Completed, Cancelled, Failed}
//! -> Idle`. The active session is the sole concurrency guard — a start
//! request while one is active is rejected, never queued. All transitions
//! happen on the single logical thread that drains the stream event channel,
//! so state is internally consistent between suspension points.

use std::error::Error;
use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::assembler;
use crate::core::chat::ChatCollection;
use crate::core::chat_stream::{StreamEvent, StreamFailure};
use crate::core::message::Message;
use crate::core::ops;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Streaming,
    Completed,
    /// Expected outcome of a user-initiated stop; not a failure. Partial
    /// content is retained.
    Cancelled,
    Failed,
}

/// A start request was rejected because a session is already active. The
/// collection is left unchanged; the caller may retry after the active
/// session terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyGenerating;

impl fmt::Display for AlreadyGenerating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a generation is already in progress")
    }
}

impl Error for AlreadyGenerating {}

/// The ephemeral record of one in-flight request. Never persisted.
#[derive(Debug)]
pub struct GenerationSession {
    pub target_chat_id: String,
    pub target_message_id: String,
    pub state: SessionState,
    pub cancel_requested: bool,
    pub stream_id: u64,
    cancel_token: CancellationToken,
    failure: Option<StreamFailure>,
}

impl GenerationSession {
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Requesting | SessionState::Streaming)
    }

    /// Token the transport task selects on; cancelled cooperatively.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn failure(&self) -> Option<&StreamFailure> {
        self.failure.as_ref()
    }
}

/// Drives session state from intents and stream events, producing
/// copy-on-write collection updates.
#[derive(Debug, Default)]
pub struct GenerationController {
    session: Option<GenerationSession>,
    next_stream_id: u64,
}

impl GenerationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Idle` when no session exists or the last one was acknowledged.
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    /// True while a session holds the mutual-exclusion guard.
    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(GenerationSession::is_active)
    }

    pub fn session(&self) -> Option<&GenerationSession> {
        self.session.as_ref()
    }

    /// `Idle -> Requesting`. Appends an empty assistant placeholder to the
    /// target chat and records the new session. Rejected without any state
    /// change while another session is active.
    pub fn begin(
        &mut self,
        collection: &ChatCollection,
        chat_index: usize,
    ) -> Result<ChatCollection, AlreadyGenerating> {
        if self.is_active() {
            return Err(AlreadyGenerating);
        }

        let placeholder = Message::assistant_placeholder();
        let target_message_id = placeholder.id.clone();
        let next = ops::append_message(collection, chat_index, placeholder);
        let target_chat_id = next.chats[chat_index].id.clone();

        self.next_stream_id += 1;
        debug!(
            stream_id = self.next_stream_id,
            chat_id = %target_chat_id,
            "generation session starting"
        );
        self.session = Some(GenerationSession {
            target_chat_id,
            target_message_id,
            state: SessionState::Requesting,
            cancel_requested: false,
            stream_id: self.next_stream_id,
            cancel_token: CancellationToken::new(),
            failure: None,
        });

        Ok(next)
    }

    /// Apply one transport event to the session and the collection.
    ///
    /// Returns `Some(new_collection)` only when the event changed
    /// conversation state (a folded delta, or the placeholder rollback on a
    /// pre-stream failure). Events carrying a stale stream id, or arriving
    /// after the session reached a terminal state, are discarded.
    pub fn apply_event(
        &mut self,
        collection: &ChatCollection,
        event: StreamEvent,
        stream_id: u64,
    ) -> Option<ChatCollection> {
        let session = self.session.as_mut()?;
        if stream_id != session.stream_id || !session.is_active() {
            return None;
        }

        match event {
            StreamEvent::Delta { content, reasoning } => {
                // The first chunk is the transport's confirmation that the
                // request was accepted.
                if session.state == SessionState::Requesting {
                    session.state = SessionState::Streaming;
                }

                let Some((chat_pos, _)) = collection.chat_by_id(&session.target_chat_id) else {
                    debug!(stream_id, "target chat gone; dropping delta");
                    return None;
                };
                let mut next = collection.clone();
                let target = next.chats[chat_pos]
                    .messages
                    .iter_mut()
                    .find(|m| m.id == session.target_message_id)?;
                assembler::apply_delta(
                    target,
                    &crate::api::ChatResponseDelta {
                        role: None,
                        content,
                        reasoning,
                    },
                );
                Some(next)
            }
            StreamEvent::End => {
                debug!(stream_id, "generation completed");
                session.state = SessionState::Completed;
                None
            }
            StreamEvent::Failed(failure) => {
                let rollback = session.state == SessionState::Requesting;
                debug!(stream_id, failure = %failure, rollback, "generation failed");
                session.state = SessionState::Failed;
                session.failure = Some(failure);

                if rollback {
                    // The transport rejected the request before any chunk
                    // arrived; remove the placeholder so the chat returns to
                    // its pre-request shape.
                    let (chat_pos, chat) = collection.chat_by_id(&session.target_chat_id)?;
                    let message_pos = chat
                        .messages
                        .iter()
                        .position(|m| m.id == session.target_message_id)?;
                    Some(ops::delete_message(collection, chat_pos, message_pos))
                } else {
                    // Mid-stream failure: the partial message is kept, never
                    // silently erased.
                    None
                }
            }
        }
    }

    /// Explicit stop request. Cooperative: flags the session, cancels the
    /// transport token, and frees the mutual-exclusion guard immediately.
    ///
    /// Returns `Some(new_collection)` when the session was still
    /// `Requesting`: no chunk ever arrived, so the empty placeholder is not
    /// partial content and is rolled back the same way a pre-stream failure
    /// rolls it back. Once streaming has begun, returns `None` and whatever
    /// was folded so far is kept.
    pub fn cancel(&mut self, collection: &ChatCollection) -> Option<ChatCollection> {
        let session = self.session.as_mut()?;
        if !session.is_active() {
            return None;
        }

        let rollback = session.state == SessionState::Requesting;
        debug!(stream_id = session.stream_id, rollback, "generation cancelled");
        session.cancel_requested = true;
        session.cancel_token.cancel();
        session.state = SessionState::Cancelled;

        if rollback {
            let (chat_pos, chat) = collection.chat_by_id(&session.target_chat_id)?;
            let message_pos = chat
                .messages
                .iter()
                .position(|m| m.id == session.target_message_id)?;
            Some(ops::delete_message(collection, chat_pos, message_pos))
        } else {
            None
        }
    }

    /// `{Completed, Cancelled, Failed} -> Idle`. Returns the terminal
    /// session record so the caller can inspect the outcome (e.g. to run a
    /// derivative titling step after `Completed`).
    pub fn acknowledge(&mut self) -> Option<GenerationSession> {
        match self.session.as_ref() {
            Some(session) if !session.is_active() => self.session.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat::{Chat, ChatCollection, ChatDefaults};
    use crate::core::message::Role;

    fn delta(content: &str) -> StreamEvent {
        StreamEvent::Delta {
            content: Some(content.to_string()),
            reasoning: None,
        }
    }

    fn collection_with_messages(texts: &[&str]) -> ChatCollection {
        let mut chat = Chat::new(None, None, &ChatDefaults::default());
        for (i, text) in texts.iter().enumerate() {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            chat.messages.push(Message::text(role, *text));
        }
        ChatCollection {
            chats: vec![chat],
            current_index: 0,
        }
    }

    #[test]
    fn begin_appends_placeholder_and_enters_requesting() {
        let mut controller = GenerationController::new();
        let collection = collection_with_messages(&["question"]);

        let next = controller.begin(&collection, 0).unwrap();
        assert_eq!(next.chats[0].messages.len(), 2);
        let placeholder = &next.chats[0].messages[1];
        assert_eq!(placeholder.role, Role::Assistant);
        assert_eq!(placeholder.text_content(), Some(""));
        assert_eq!(controller.state(), SessionState::Requesting);
        assert!(controller.is_active());

        // The source collection is untouched.
        assert_eq!(collection.chats[0].messages.len(), 1);
    }

    #[test]
    fn start_while_active_is_rejected_without_any_change() {
        let mut controller = GenerationController::new();
        let collection = collection_with_messages(&["question"]);
        let streaming = controller.begin(&collection, 0).unwrap();
        let snapshot = serde_json::to_string(&streaming).unwrap();

        assert_eq!(controller.begin(&streaming, 0), Err(AlreadyGenerating));
        assert_eq!(serde_json::to_string(&streaming).unwrap(), snapshot);
        assert_eq!(controller.state(), SessionState::Requesting);
    }

    #[test]
    fn chunks_fold_into_the_placeholder_and_complete() {
        let mut controller = GenerationController::new();
        let mut collection = controller
            .begin(&collection_with_messages(&[]), 0)
            .unwrap();
        let stream_id = controller.session().unwrap().stream_id;

        collection = controller
            .apply_event(&collection, delta("Hel"), stream_id)
            .unwrap();
        assert_eq!(controller.state(), SessionState::Streaming);
        collection = controller
            .apply_event(&collection, delta("lo"), stream_id)
            .unwrap();
        assert!(controller
            .apply_event(&collection, StreamEvent::End, stream_id)
            .is_none());

        let message = &collection.chats[0].messages[0];
        assert_eq!(message.text_content(), Some("Hello"));
        assert!(message.reasoning_text.is_none());
        assert_eq!(controller.state(), SessionState::Completed);

        let session = controller.acknowledge().expect("terminal session");
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn reasoning_deltas_fold_into_the_reasoning_channel() {
        let mut controller = GenerationController::new();
        let mut collection = controller
            .begin(&collection_with_messages(&[]), 0)
            .unwrap();
        let stream_id = controller.session().unwrap().stream_id;

        collection = controller
            .apply_event(
                &collection,
                StreamEvent::Delta {
                    content: None,
                    reasoning: Some("step one".to_string()),
                },
                stream_id,
            )
            .unwrap();

        let message = &collection.chats[0].messages[0];
        assert_eq!(message.reasoning_text.as_deref(), Some("step one"));
        assert_eq!(message.text_content(), Some(""));
    }

    #[test]
    fn pre_stream_failure_rolls_back_the_placeholder() {
        // Three messages, regenerate the last, then the transport rejects
        // the replacement request before any chunk: the chat must end at
        // exactly two messages.
        let mut controller = GenerationController::new();
        let original = collection_with_messages(&["q1", "a1", "q2"]);
        let after_regen = ops::regenerate_last(&original, 0);
        assert_eq!(after_regen.chats[0].messages.len(), 2);

        let requesting = controller.begin(&after_regen, 0).unwrap();
        assert_eq!(requesting.chats[0].messages.len(), 3);
        let stream_id = controller.session().unwrap().stream_id;

        let rolled_back = controller
            .apply_event(
                &requesting,
                StreamEvent::Failed(StreamFailure::Transport("401 unauthorized".into())),
                stream_id,
            )
            .expect("rollback produces a new collection");

        assert_eq!(rolled_back.chats[0].messages.len(), 2);
        assert_eq!(
            rolled_back.chats[0].messages,
            after_regen.chats[0].messages
        );
        assert_eq!(controller.state(), SessionState::Failed);
        assert!(matches!(
            controller.session().unwrap().failure(),
            Some(StreamFailure::Transport(_))
        ));
    }

    #[test]
    fn mid_stream_failure_keeps_the_partial_message() {
        let mut controller = GenerationController::new();
        let mut collection = controller
            .begin(&collection_with_messages(&["q"]), 0)
            .unwrap();
        let stream_id = controller.session().unwrap().stream_id;

        collection = controller
            .apply_event(&collection, delta("partial answer"), stream_id)
            .unwrap();
        assert!(controller
            .apply_event(
                &collection,
                StreamEvent::Failed(StreamFailure::Protocol("bad json".into())),
                stream_id,
            )
            .is_none());

        assert_eq!(controller.state(), SessionState::Failed);
        assert_eq!(
            collection.chats[0].messages[1].text_content(),
            Some("partial answer")
        );
    }

    #[test]
    fn cancel_mid_stream_retains_partial_and_frees_the_guard() {
        let mut controller = GenerationController::new();
        let mut collection = controller
            .begin(&collection_with_messages(&["q"]), 0)
            .unwrap();
        let stream_id = controller.session().unwrap().stream_id;
        let token = controller.session().unwrap().cancel_token();

        collection = controller
            .apply_event(&collection, delta("so far"), stream_id)
            .unwrap();
        assert!(controller.cancel(&collection).is_none());

        assert_eq!(controller.state(), SessionState::Cancelled);
        assert!(controller.session().unwrap().cancel_requested);
        assert!(token.is_cancelled());
        assert_eq!(collection.chats[0].messages[1].text_content(), Some("so far"));

        // The guard is freed immediately; a new start succeeds.
        assert!(!controller.is_active());
        let next = controller.begin(&collection, 0);
        assert!(next.is_ok());
    }

    #[test]
    fn cancel_before_any_chunk_rolls_back_the_placeholder() {
        // Three messages, regenerate the last, start a replacement, then
        // cancel before the first chunk: the chat must end at exactly two
        // messages, the empty placeholder removed.
        let mut controller = GenerationController::new();
        let original = collection_with_messages(&["q1", "a1", "q2"]);
        let after_regen = ops::regenerate_last(&original, 0);
        assert_eq!(after_regen.chats[0].messages.len(), 2);

        let requesting = controller.begin(&after_regen, 0).unwrap();
        assert_eq!(requesting.chats[0].messages.len(), 3);
        let token = controller.session().unwrap().cancel_token();

        let rolled_back = controller
            .cancel(&requesting)
            .expect("pre-stream cancel produces a rollback");

        assert_eq!(rolled_back.chats[0].messages.len(), 2);
        assert_eq!(
            rolled_back.chats[0].messages,
            after_regen.chats[0].messages
        );
        assert_eq!(controller.state(), SessionState::Cancelled);
        assert!(token.is_cancelled());
        assert!(!controller.is_active());
    }

    #[test]
    fn late_events_from_a_superseded_stream_are_discarded() {
        let mut controller = GenerationController::new();
        let mut collection = controller
            .begin(&collection_with_messages(&["q"]), 0)
            .unwrap();
        let stale_id = controller.session().unwrap().stream_id;

        collection = controller
            .cancel(&collection)
            .expect("pre-stream cancel produces a rollback");
        collection = controller.begin(&collection, 0).unwrap();
        let fresh_id = controller.session().unwrap().stream_id;
        assert_ne!(stale_id, fresh_id);

        assert!(controller
            .apply_event(&collection, delta("zombie"), stale_id)
            .is_none());
        let updated = controller
            .apply_event(&collection, delta("live"), fresh_id)
            .unwrap();
        assert_eq!(
            updated.chats[0].messages.last().unwrap().text_content(),
            Some("live")
        );
    }

    #[test]
    fn events_after_terminal_state_are_discarded() {
        let mut controller = GenerationController::new();
        let collection = controller
            .begin(&collection_with_messages(&[]), 0)
            .unwrap();
        let stream_id = controller.session().unwrap().stream_id;

        controller.apply_event(&collection, StreamEvent::End, stream_id);
        assert_eq!(controller.state(), SessionState::Completed);
        assert!(controller
            .apply_event(&collection, delta("late"), stream_id)
            .is_none());
    }
}
