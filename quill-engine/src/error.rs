//! Error types for evaluation, compilation and the chain protocol

use quill_core::{ConfigError, UnsupportedContentError};
use quill_dsl::{ParseErrors, Span};
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// EVAL ERRORS
// ============================================================================

/// A runtime failure while evaluating an expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("'{name}' is not defined (line {}, column {})", .span.line, .span.column)]
    UndefinedVariable { name: String, span: Span },

    #[error(
        "Cannot read property '{property}' of {target} (line {}, column {})",
        .span.line,
        .span.column
    )]
    NullReference {
        property: String,
        /// `null` or `undefined`
        target: String,
        span: Span,
    },

    #[error("'{name}' is not an available function (line {}, column {})", .span.line, .span.column)]
    UnknownFunction { name: String, span: Span },

    #[error("Invalid argument to {function}: {reason} (line {}, column {})", .span.line, .span.column)]
    InvalidArgument {
        function: String,
        reason: String,
        span: Span,
    },

    #[error("Invalid operand for '{operator}': {reason} (line {}, column {})", .span.line, .span.column)]
    InvalidOperand {
        operator: String,
        reason: String,
        span: Span,
    },

    #[error("Invalid assignment: {reason} (line {}, column {})", .span.line, .span.column)]
    InvalidAssignment { reason: String, span: Span },
}

impl EvalError {
    /// Stable name of the error kind, used in chain error events.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::UndefinedVariable { .. } => "UndefinedVariable",
            EvalError::NullReference { .. } => "NullReference",
            EvalError::UnknownFunction { .. } => "UnknownFunction",
            EvalError::InvalidArgument { .. } => "InvalidArgument",
            EvalError::InvalidOperand { .. } => "InvalidOperand",
            EvalError::InvalidAssignment { .. } => "InvalidAssignment",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            EvalError::UndefinedVariable { span, .. }
            | EvalError::NullReference { span, .. }
            | EvalError::UnknownFunction { span, .. }
            | EvalError::InvalidArgument { span, .. }
            | EvalError::InvalidOperand { span, .. }
            | EvalError::InvalidAssignment { span, .. } => *span,
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

// ============================================================================
// COMPILE ERRORS
// ============================================================================

/// Errors that stop a compile or a chain step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error("document has parse errors: {0}")]
    Parse(ParseErrors),

    #[error("{0}")]
    Eval(#[from] EvalError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("missing parameters: {}", .names.join(", "))]
    MissingParameters { names: Vec<String> },

    #[error("invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("document has more than one step; run it as a chain")]
    MultipleSteps,

    #[error("tool '{name}' is not declared in the document config")]
    UnknownTool { name: String },

    #[error("{message} (line {}, column {})", .span.line, .span.column)]
    InvalidStructure { message: String, span: Span },

    #[error("response bound to '{name}' is not valid JSON: {reason}")]
    InvalidStepResponse { name: String, reason: String },

    #[error("chain exceeded the maximum of {max_steps} steps")]
    MaxStepsExceeded { max_steps: usize },
}

impl CompileError {
    /// Stable name of the error kind, used in chain error events.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::Parse(_) => "ParseError",
            CompileError::Eval(inner) => inner.kind(),
            CompileError::Config(_) => "ConfigError",
            CompileError::MissingParameters { .. } => "MissingParameters",
            CompileError::InvalidParameters { .. } => "InvalidParameters",
            CompileError::MultipleSteps => "MultipleSteps",
            CompileError::UnknownTool { .. } => "UnknownTool",
            CompileError::InvalidStructure { .. } => "InvalidStructure",
            CompileError::InvalidStepResponse { .. } => "InvalidStepResponse",
            CompileError::MaxStepsExceeded { .. } => "MaxStepsExceeded",
        }
    }

    /// Source location, when the error points at one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Eval(inner) => Some(inner.span()),
            CompileError::InvalidStructure { span, .. } => Some(*span),
            CompileError::Parse(errors) => errors.iter().next().map(|e| e.span),
            _ => None,
        }
    }

    pub(crate) fn structure(message: impl Into<String>, span: Span) -> Self {
        CompileError::InvalidStructure {
            message: message.into(),
            span,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// CHAIN ERRORS
// ============================================================================

/// Protocol misuse by the host. The chain state is left untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
pub enum ChainStateError {
    #[error("chain has not started; call step() first")]
    NotStarted,

    #[error("chain is awaiting a response; resume it instead of stepping again")]
    AwaitingResponse,

    #[error("chain already finished ({state})")]
    Finished { state: String },

    #[error("expected {expected}, got {found}")]
    UnexpectedResponse { expected: String, found: String },

    #[error("tool results do not match the pending calls: expected [{}], got [{}]", .expected.join(", "), .found.join(", "))]
    ToolResultMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Anything a chain call can fail with.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChainError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    State(#[from] ChainStateError),
}

impl ChainError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChainError::Compile(inner) => inner.kind(),
            ChainError::State(_) => "ChainStateError",
        }
    }
}

// ============================================================================
// MASTER ERROR TYPE
// ============================================================================

/// Master error type for all Quill operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuillError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseErrors),

    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Chain error: {0}")]
    ChainState(#[from] ChainStateError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adapter error: {0}")]
    Unsupported(#[from] UnsupportedContentError),
}

impl From<ChainError> for QuillError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Compile(inner) => QuillError::Compile(inner),
            ChainError::State(inner) => QuillError::ChainState(inner),
        }
    }
}

/// Result type alias for Quill operations.
pub type QuillResult<T> = Result<T, QuillError>;

// ============================================================================
// TESTS
// ============================================================================
