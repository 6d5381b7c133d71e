//! Chain events and their SSE encoding.

use quill_engine::{ChainError, ChainResponse, Completion, Step};
use serde::Serialize;

/// Something that happened while driving a chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ChainEvent {
    /// A conversation is ready for the model.
    Step(Step),
    /// The host's response to step `index` was accepted.
    StepComplete {
        index: usize,
        response: ChainResponse,
    },
    /// The chain finished. Terminal.
    Complete(Completion),
    /// The chain failed. Terminal.
    Error {
        name: String,
        message: String,
        /// Source location, when the failure points at one.
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl ChainEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ChainEvent::Step(_) => "step",
            ChainEvent::StepComplete { .. } => "step-complete",
            ChainEvent::Complete(_) => "complete",
            ChainEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainEvent::Complete(_) | ChainEvent::Error { .. })
    }

    pub fn from_error(err: &ChainError) -> Self {
        let stack = match err {
            ChainError::Compile(inner) => inner
                .span()
                .map(|span| format!("at line {}, column {}", span.line, span.column)),
            ChainError::State(_) => None,
        };
        ChainEvent::Error {
            name: err.kind().to_string(),
            message: err.to_string(),
            stack,
        }
    }
}

/// An event with its position in the stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventFrame {
    pub id: u64,
    #[serde(flatten)]
    pub event: ChainEvent,
}

impl EventFrame {
    /// Render as a server-sent event, blank line included.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        let data = serde_json::to_string(&self.event)?;
        Ok(format!(
            "id: {}\nevent: {}\ndata: {}\n\n",
            self.id,
            self.event.name(),
            data
        ))
    }
}
