//! Unique id generation for chats and messages.
//!
//! Ids are assigned once at creation and never reused or reassigned, so
//! in-flight streams can keep targeting a message even if the collection is
//! reordered underneath them.

/// Generate a fresh random id in UUIDv4 text format.
///
/// Panics if the OS entropy source is unavailable, which is not a
/// recoverable condition for this crate.
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).expect("OS entropy source unavailable");

    // Stamp the version (4) and variant (10xx) bits so the output is a
    // well-formed UUIDv4 rather than raw hex.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let mut out = String::with_capacity(36);
    for (i, byte) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
