//! Anthropic messages API

pub mod adapter;
pub mod types;

pub use adapter::AnthropicAdapter;
pub use types::{ContentBlock, MessagesPayload};
