//! Legal Assistant Runtime
//!
//! The chat surfaces in front of `legal-assistant-core`: a small web page
//! served with axum, a terminal REPL, and the shared [`Relay`] both of them
//! drive.

pub mod relay;
pub mod repl;
pub mod web;

pub use relay::Relay;

// Re-export core types for convenience
pub use legal_assistant_core;
