//! Parser module for Quill documents

pub mod ast;
pub mod expression;
pub mod parser;

pub use ast::*;
pub use expression::{parse_expression, ExpressionParser};
pub use parser::*;
