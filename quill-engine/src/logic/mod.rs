//! Logic engine: expression evaluation, operators, the built-in allow-list
//! and static scope analysis.

pub mod builtins;
pub mod context;
pub mod evaluate;
pub mod operators;

pub use context::{document_parameters, resolve_scope_context, walk_expression, ScopeContext};
pub use evaluate::evaluate;
