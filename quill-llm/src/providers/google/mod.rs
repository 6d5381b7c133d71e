//! Google Gemini generateContent

pub mod adapter;
pub mod types;

pub use adapter::GoogleAdapter;
pub use types::{GenerateContentPayload, Part};
