//! Quill Engine - Interpreter, Compiler & Chain
//!
//! Runs parsed prompt documents:
//!
//! - [`logic`]: the sandboxed expression interpreter and static scope analysis
//! - [`scope`]: variable frames used while rendering
//! - [`compiler`]: single-step compilation into provider-neutral messages
//! - [`chain`]: resumable multi-step execution driven by model responses
//!
//! ```text
//! Document + Parameters
//!     ↓
//! Static analysis (missing parameters)
//!     ↓
//! Renderer (replay earlier steps → collect target step → probe for more)
//!     ↓
//! Messages + PromptConfig  ──▶  Chain (await model / tool results, repeat)
//! ```

pub mod chain;
pub mod compiler;
pub mod error;
pub mod logic;
pub mod scope;

pub use chain::{
    create_chain, Awaiting, Chain, ChainResponse, ChainState, Completion, Step, StepResult,
};
pub use compiler::{
    check_parameters, compile, compile_source, compile_with_options, parameters_from_json,
    ChainOptions, Compilation,
};
pub use error::*;
pub use logic::{document_parameters, evaluate, resolve_scope_context, ScopeContext};
pub use scope::{Parameters, Scope, ScopeId};

use quill_dsl::parse;

/// Parse `source` and compile it with JSON `parameters`.
pub fn render(source: &str, parameters: serde_json::Value) -> QuillResult<Compilation> {
    let document = parse(source)?;
    let parameters = parameters_from_json(parameters)?;
    Ok(compile(&document, &parameters)?)
}
