pub mod assembler;
pub mod budget;
pub mod chat;
pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod controller;
pub mod message;
pub mod ops;
