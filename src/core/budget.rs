//! Token-budget trimming of outbound conversation history.
//!
//! Before a request is issued, the history is reduced to a configured
//! ceiling: starting from the most recent message and walking backward,
//! whole messages are included until the cumulative approximate token count
//! would exceed the budget, then the walk stops. A message's content is
//! never truncated mid-string — earlier messages are omitted wholesale. The
//! leading system message, if present, is always included regardless of
//! budget.

use crate::core::constants::{APPROX_BYTES_PER_TOKEN, APPROX_IMAGE_TOKENS};
use crate::core::message::{ContentBlock, Message, Role};

/// Approximate token cost of one message. Only used to decide which whole
/// messages fit; precision beyond "roughly proportional to length" is not
/// required.
pub fn approx_message_tokens(message: &Message) -> usize {
    message
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => text.len() / APPROX_BYTES_PER_TOKEN,
            ContentBlock::Image { .. } => APPROX_IMAGE_TOKENS,
        })
        .sum()
}

/// Reduce `messages` to fit `budget` approximate tokens, returning the kept
/// messages in conversation order.
pub fn reduce_to_budget(messages: &[Message], budget: usize) -> Vec<Message> {
    let (system, rest) = match messages.first() {
        Some(first) if first.role == Role::System => (Some(first), &messages[1..]),
        _ => (None, messages),
    };

    // The system message is included regardless of budget and does not
    // consume it, so a long prompt can never starve the recent turns.
    let mut used = 0;
    let mut kept_tail: Vec<&Message> = Vec::new();
    for message in rest.iter().rev() {
        let cost = approx_message_tokens(message);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept_tail.push(message);
    }

    system
        .into_iter()
        .chain(kept_tail.into_iter().rev())
        .cloned()
        .collect()
}
