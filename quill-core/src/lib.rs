//! Quill Core - Shared Data Types
//!
//! Pure data structures shared by every other crate in the workspace:
//!
//! - [`Value`]: the dynamically typed value the expression language works on,
//!   together with the ECMAScript coercions (`ToNumber`, `ToString`, truthiness,
//!   equality) the interpreter builds on.
//! - [`Message`] / [`ContentPart`] / [`Role`]: the provider-neutral conversation
//!   representation produced by the compiler and consumed by the adapters.
//! - [`PromptConfig`] / [`ToolDefinition`] / [`ProviderKind`]: the typed view of a
//!   document's front matter.
//!
//! This crate contains no parsing and no evaluation logic.

mod config;
mod error;
mod message;
mod value;

pub use config::*;
pub use error::*;
pub use message::*;
pub use value::*;
