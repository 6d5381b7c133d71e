//! Lexer module for the Quill expression language

pub mod scanner;
pub mod token;

pub use scanner::*;
pub use token::*;
