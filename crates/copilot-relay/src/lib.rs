//! copilot-relay: Relay implementations for copilot
//!
//! This crate provides implementations of the `Relay` trait: a direct
//! forwarder to an OpenAI-compatible chat-completions API and a client for a
//! `{messages} -> {reply}` relay endpoint.

pub mod http;
pub mod openai;

pub use http::HttpRelay;
pub use openai::OpenAIRelay;
