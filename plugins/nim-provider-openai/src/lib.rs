//! NIM Provider (OpenAI-compatible)
//!
//! Concrete collaborators for `nim-core`: [`HttpTransport`] sends the JSON
//! bodies the core assembles to an OpenAI-compatible endpoint, and
//! [`NimChatModel`] implements `LlmProvider` on top of any transport for
//! the agent loop.

mod chat_model;
mod transport;

pub use chat_model::NimChatModel;
pub use transport::{HttpError, HttpTransport};
