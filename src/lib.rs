//! Concierge - humanized auto-responder for a messaging account

pub mod clock;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod notify;
pub mod session;
pub mod subprocess;
pub mod supervisor;
pub mod telemetry;
pub mod template;
