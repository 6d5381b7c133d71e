//! Compiler
//!
//! Turns a parsed document plus parameters into provider-neutral messages.
//! [`compile`] handles single-step documents; multi-step documents go through
//! [`crate::chain::Chain`], which drives the same renderer one step at a time.

mod render;

pub(crate) use render::{render_step, RenderedStep};

use crate::error::{CompileError, CompileResult};
use crate::logic::document_parameters;
use crate::scope::Parameters;
use quill_core::{Message, PromptConfig, Role, Value};
use quill_dsl::{parse, Document};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// OPTIONS AND OUTPUT
// ============================================================================

/// Knobs for compiling and chaining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOptions {
    /// Upper bound on document steps a chain may render.
    pub max_steps: usize,
    /// Role of content written outside any message tag.
    pub default_role: Role,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            max_steps: 20,
            default_role: Role::System,
        }
    }
}

/// A compiled single-step prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compilation {
    pub config: PromptConfig,
    pub messages: Vec<Message>,
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Compile a single-step document with the default options.
pub fn compile(document: &Document, parameters: &Parameters) -> CompileResult<Compilation> {
    compile_with_options(document, parameters, &ChainOptions::default())
}

pub fn compile_with_options(
    document: &Document,
    parameters: &Parameters,
    options: &ChainOptions,
) -> CompileResult<Compilation> {
    check_parameters(document, parameters)?;
    let config = document.prompt_config()?;
    let rendered = render_step(document, parameters, options, 0, &[])?;
    if !rendered.is_last_step {
        return Err(CompileError::MultipleSteps);
    }
    let config = config.with_overrides(&rendered.overrides)?;
    debug!(
        digest = %document.digest,
        messages = rendered.messages.len(),
        "compiled document"
    );
    Ok(Compilation {
        config,
        messages: rendered.messages,
    })
}

/// Parse and compile in one go.
pub fn compile_source(source: &str, parameters: &Parameters) -> CompileResult<Compilation> {
    let document = parse(source).map_err(CompileError::Parse)?;
    compile(&document, parameters)
}

/// Fail with [`CompileError::MissingParameters`] unless every free name of
/// the document is supplied.
pub fn check_parameters(document: &Document, parameters: &Parameters) -> CompileResult<()> {
    let names: Vec<String> = document_parameters(document)
        .into_iter()
        .filter(|name| !parameters.contains_key(name))
        .collect();
    if names.is_empty() {
        Ok(())
    } else {
        Err(CompileError::MissingParameters { names })
    }
}

/// Parameters from a JSON object.
pub fn parameters_from_json(value: serde_json::Value) -> CompileResult<Parameters> {
    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect()),
        other => Err(CompileError::InvalidParameters {
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
