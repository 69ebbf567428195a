//! Streaming chat engine for a browser assistant: decodes server-sent model
//! output, rebuilds streamed tool calls, runs a bounded tool-calling loop and
//! keeps a size-bounded history per session.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod media;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod ui;

pub use error::{EngineError, Result};
pub use orchestrator::{ChatEvent, ChatInput, ChatOutcome, ChatReply, EngineSettings, Orchestrator, PageContext};
