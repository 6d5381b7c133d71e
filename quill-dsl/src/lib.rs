//! Quill DSL - Prompt Template Parser & Pretty-Printer
//!
//! A prompt document is Markdown-flavoured text with optional YAML front
//! matter, `{{ expression }}` placeholders, `{{#if}}`/`{{#each}}` blocks and a
//! small set of XML-like tags (`<system>`, `<user>`, `<step>`, ...).
//!
//! Architecture:
//! ```text
//! Source text
//!     ↓
//! Front matter (YAML → JSON mapping)
//!     ↓
//! Template parser (text, blocks, tags, fences)
//!     ↓            ↘
//!     ↓             Expression lexer + parser (inside each {{ }})
//!     ↓
//! Document AST (+ SHA-256 digest)
//!     ↓
//! Pretty printer (for round-trip testing)
//! ```

pub mod config;
pub mod lexer;
pub mod parser;
pub mod pretty_printer;

// Re-export key types for convenience
pub use config::*;
pub use lexer::{Span, Token, TokenKind};
pub use parser::*;
pub use pretty_printer::{pretty_print, print_expression};
