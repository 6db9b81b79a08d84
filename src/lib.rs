//! Colloquy is a conversation state engine for chat clients that talk to
//! OpenAI-compatible completions APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the chat data model, the copy-on-write mutation
//!   operations, the stream assembler, and the generation session state
//!   machine that orchestrates one request/stream/cancel lifecycle.
//! - [`api`] defines the wire payloads exchanged with the completions API
//!   and builds budget-trimmed outbound requests from a chat.
//! - [`utils`] holds small shared helpers (id generation, URL handling).
//!
//! Presentation, persistence, and authentication are external collaborators:
//! they read [`core::chat::ChatCollection`] and
//! [`core::controller::GenerationController`] state for display, and issue
//! intents through [`core::ops`] and the controller. Nothing in this crate
//! renders markdown or stores anything other than its own defaults file.

pub mod api;
pub mod core;
pub mod utils;
