//! Provider adapters
//!
//! One module per wire format. Each has a `types` module with the serde
//! payload structs and an `adapter` module with the conversions.

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use google::GoogleAdapter;
pub use openai::OpenAiAdapter;
