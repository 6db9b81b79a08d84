//! Copy-on-write mutation operations over a [`ChatCollection`].
//!
//! Every operation takes the collection by reference and returns a new,
//! structurally valid collection; previously taken references to the old
//! value remain valid and unaffected. Index preconditions are contracts the
//! caller must uphold — the presentation collaborator only offers indices it
//! read from the collection — so violations panic rather than returning a
//! recoverable error.

use crate::core::chat::ChatCollection;
use crate::core::message::Message;

/// Direction for [`move_message`]: `Up` is toward index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

fn check_chat_index(collection: &ChatCollection, chat_index: usize) {
    assert!(
        chat_index < collection.chats.len(),
        "chat index {chat_index} out of range ({} chats)",
        collection.chats.len()
    );
}

fn check_message_index(collection: &ChatCollection, chat_index: usize, message_index: usize) {
    let len = collection.chats[chat_index].messages.len();
    assert!(
        message_index < len,
        "message index {message_index} out of range ({len} messages)"
    );
}

/// Remove the message at `message_index`, preserving the relative order of
/// all other messages.
pub fn delete_message(
    collection: &ChatCollection,
    chat_index: usize,
    message_index: usize,
) -> ChatCollection {
    check_chat_index(collection, chat_index);
    check_message_index(collection, chat_index, message_index);

    let mut next = collection.clone();
    next.chats[chat_index].messages.remove(message_index);
    next
}

/// Swap the message at `message_index` with its neighbor in `direction`.
///
/// Moving the first message up or the last message down is a precondition
/// violation, not a silent no-op; callers check boundaries before invoking.
pub fn move_message(
    collection: &ChatCollection,
    chat_index: usize,
    message_index: usize,
    direction: MoveDirection,
) -> ChatCollection {
    check_chat_index(collection, chat_index);
    check_message_index(collection, chat_index, message_index);

    let neighbor = match direction {
        MoveDirection::Up => {
            assert!(message_index != 0, "cannot move first message up");
            message_index - 1
        }
        MoveDirection::Down => {
            let last = collection.chats[chat_index].messages.len() - 1;
            assert!(message_index != last, "cannot move last message down");
            message_index + 1
        }
    };

    let mut next = collection.clone();
    next.chats[chat_index].messages.swap(message_index, neighbor);
    next
}

/// Remove the final message of the target chat, expected to be the
/// assistant's prior answer. The caller is responsible for subsequently
/// starting a new generation session to produce a replacement; this
/// operation does not itself contact the network.
pub fn regenerate_last(collection: &ChatCollection, chat_index: usize) -> ChatCollection {
    check_chat_index(collection, chat_index);
    assert!(
        !collection.chats[chat_index].messages.is_empty(),
        "cannot regenerate in an empty chat"
    );

    let mut next = collection.clone();
    next.chats[chat_index].messages.pop();
    next
}

/// Append to the end of the chat's message sequence. Used both for user
/// turns and for seeding the empty assistant placeholder before a stream
/// begins.
pub fn append_message(
    collection: &ChatCollection,
    chat_index: usize,
    message: Message,
) -> ChatCollection {
    check_chat_index(collection, chat_index);

    let mut next = collection.clone();
    next.chats[chat_index].messages.push(message);
    next
}
