//! OpenAI chat completions

pub mod adapter;
pub mod types;

pub use adapter::OpenAiAdapter;
pub use types::{ChatMessage, ChatPayload};
