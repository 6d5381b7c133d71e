//! Resumable multi-step chains
//!
//! A [`Chain`] walks a document one step at a time. Each step renders the
//! conversation so far plus the messages of the next document step, then
//! waits for the host to supply the model's answer (or the results of the
//! tools the model asked for) before moving on.
//!
//! ```text
//!   Pending ──step()──▶ AwaitingResponse(Model) ──assistant text──▶ next step / Complete
//!                              │
//!                              └─assistant tool calls──▶ AwaitingResponse(ToolResults)
//!                                                             │
//!                                                             └─tool results──▶ next step / Complete
//! ```
//!
//! Protocol mistakes by the host ([`ChainStateError`]) leave the chain as it
//! was. Compile failures move it to [`ChainState::Errored`] for good.

use crate::compiler::{check_parameters, render_step, ChainOptions};
use crate::error::{ChainError, ChainStateError, CompileError, CompileResult};
use crate::scope::Parameters;
use quill_core::{Message, PromptConfig, Role, ToolCall, ToolResult, Value};
use quill_dsl::Document;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// STATE
// ============================================================================

/// What the chain is waiting for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Awaiting {
    /// The model's reply to the rendered conversation.
    Model,
    /// Results for tool calls the model made.
    ToolResults { calls: Vec<ToolCall> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainState {
    Pending,
    AwaitingResponse { awaiting: Awaiting },
    Complete,
    Errored,
}

impl ChainState {
    pub fn name(&self) -> &'static str {
        match self {
            ChainState::Pending => "pending",
            ChainState::AwaitingResponse { .. } => "awaiting_response",
            ChainState::Complete => "complete",
            ChainState::Errored => "errored",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ChainState::Complete | ChainState::Errored)
    }
}

/// Input the host feeds back into a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChainResponse {
    /// The model's message, possibly carrying tool calls.
    Assistant(Message),
    /// One result per pending tool call.
    ToolResults(Vec<ToolResult>),
    /// Shorthand for the result of the only pending tool call.
    ToolOutput(Value),
}

impl ChainResponse {
    pub fn assistant(text: impl Into<String>) -> Self {
        ChainResponse::Assistant(Message::assistant(text))
    }

    fn describe(&self) -> &'static str {
        match self {
            ChainResponse::Assistant(_) => "assistant message",
            ChainResponse::ToolResults(_) => "tool results",
            ChainResponse::ToolOutput(_) => "tool output",
        }
    }
}

/// A conversation ready to be sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// Position among the steps this chain has emitted, from zero.
    pub index: usize,
    pub config: PromptConfig,
    pub conversation: Vec<Message>,
    pub is_last_step: bool,
    /// Tool calls the host must answer before the chain can continue.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_tool_calls: Vec<ToolCall>,
}

/// The final conversation of a finished chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub config: PromptConfig,
    pub conversation: Vec<Message>,
}

impl Completion {
    /// Text of the last assistant message.
    pub fn response_text(&self) -> Option<String> {
        self.conversation
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .map(Message::text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepResult {
    Step(Step),
    Complete(Completion),
}

// ============================================================================
// CHAIN
// ============================================================================

/// A document being executed step by step.
#[derive(Debug, Clone)]
pub struct Chain {
    document: Arc<Document>,
    parameters: Parameters,
    options: ChainOptions,
    state: ChainState,
    conversation: Vec<Message>,
    config: PromptConfig,
    /// Response text of every finished document step, in order.
    responses: Vec<String>,
    /// Text of an assistant message that is waiting on its tool results.
    pending_text: String,
    document_step: usize,
    is_last_step: bool,
    /// The current step binds its answer with `as`.
    binds_response: bool,
    emitted: usize,
}

/// Start a chain over `document`. Nothing is checked until the first step.
pub fn create_chain(document: Arc<Document>, parameters: Parameters, options: ChainOptions) -> Chain {
    Chain::new(document, parameters, options)
}

impl Chain {
    pub fn new(document: Arc<Document>, parameters: Parameters, options: ChainOptions) -> Self {
        Self {
            document,
            parameters,
            options,
            state: ChainState::Pending,
            conversation: Vec::new(),
            config: PromptConfig::default(),
            responses: Vec::new(),
            pending_text: String::new(),
            document_step: 0,
            is_last_step: false,
            binds_response: false,
            emitted: 0,
        }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    /// Number of steps emitted so far.
    pub fn steps_emitted(&self) -> usize {
        self.emitted
    }

    /// Advance the chain.
    ///
    /// `None` starts a pending chain; `Some(response)` is the same as
    /// [`Chain::resume`].
    pub fn step(&mut self, response: Option<ChainResponse>) -> Result<StepResult, ChainError> {
        match response {
            Some(response) => self.resume(response),
            None => match self.state {
                ChainState::Pending => self.guard(Chain::start),
                ChainState::AwaitingResponse { .. } => {
                    Err(ChainStateError::AwaitingResponse.into())
                }
                ChainState::Complete | ChainState::Errored => Err(self.finished()),
            },
        }
    }

    /// Feed the model's answer, or tool results, into a waiting chain.
    pub fn resume(&mut self, response: ChainResponse) -> Result<StepResult, ChainError> {
        let awaiting = match &self.state {
            ChainState::Pending => return Err(ChainStateError::NotStarted.into()),
            ChainState::Complete | ChainState::Errored => return Err(self.finished()),
            ChainState::AwaitingResponse { awaiting } => awaiting.clone(),
        };

        match (awaiting, response) {
            (Awaiting::Model, ChainResponse::Assistant(message)) => {
                if message.role != Role::Assistant {
                    return Err(ChainStateError::UnexpectedResponse {
                        expected: "assistant message".to_string(),
                        found: format!("{} message", message.role),
                    }
                    .into());
                }
                self.guard(|chain| chain.accept_model(message))
            }
            (Awaiting::ToolResults { calls }, ChainResponse::ToolResults(results)) => {
                let results = match_tool_results(&calls, results)?;
                self.guard(|chain| chain.accept_tool_results(results))
            }
            (Awaiting::ToolResults { calls }, ChainResponse::ToolOutput(value)) => {
                let [call] = calls.as_slice() else {
                    return Err(ChainStateError::UnexpectedResponse {
                        expected: format!("tool results for {} calls", calls.len()),
                        found: "tool output".to_string(),
                    }
                    .into());
                };
                let result = ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    result: value.to_json(),
                    is_error: false,
                };
                self.guard(|chain| chain.accept_tool_results(vec![result]))
            }
            (awaiting, response) => Err(ChainStateError::UnexpectedResponse {
                expected: match awaiting {
                    Awaiting::Model => "assistant message".to_string(),
                    Awaiting::ToolResults { .. } => "tool results".to_string(),
                },
                found: response.describe().to_string(),
            }
            .into()),
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Run a transition; a compile error ends the chain.
    fn guard(
        &mut self,
        transition: impl FnOnce(&mut Chain) -> CompileResult<StepResult>,
    ) -> Result<StepResult, ChainError> {
        match transition(self) {
            Ok(result) => Ok(result),
            Err(error) => {
                warn!(error = %error, step = self.document_step, "chain errored");
                self.state = ChainState::Errored;
                Err(error.into())
            }
        }
    }

    fn start(&mut self) -> CompileResult<StepResult> {
        check_parameters(&self.document, &self.parameters)?;
        self.render_next()
    }

    /// Render the current document step, or complete if there is none.
    fn render_next(&mut self) -> CompileResult<StepResult> {
        if self.document_step >= self.options.max_steps {
            return Err(CompileError::MaxStepsExceeded {
                max_steps: self.options.max_steps,
            });
        }
        let rendered = render_step(
            &self.document,
            &self.parameters,
            &self.options,
            self.document_step,
            &self.responses,
        )?;
        if !rendered.found {
            return Ok(self.complete());
        }

        self.config = self.document.prompt_config()?.with_overrides(&rendered.overrides)?;
        self.conversation.extend(rendered.messages);
        self.is_last_step = rendered.is_last_step;
        self.binds_response = rendered.binds_response;
        self.state = ChainState::AwaitingResponse {
            awaiting: Awaiting::Model,
        };
        Ok(StepResult::Step(self.emit(Vec::new())))
    }

    fn accept_model(&mut self, message: Message) -> CompileResult<StepResult> {
        let calls: Vec<ToolCall> = message.tool_calls().cloned().collect();
        if let Some(unknown) = calls.iter().find(|call| !self.config.has_tool(&call.name)) {
            return Err(CompileError::UnknownTool {
                name: unknown.name.clone(),
            });
        }

        let text = message.text();
        self.conversation.push(message);
        if calls.is_empty() {
            return self.finish_step(text);
        }

        self.pending_text = text;
        self.state = ChainState::AwaitingResponse {
            awaiting: Awaiting::ToolResults {
                calls: calls.clone(),
            },
        };
        Ok(StepResult::Step(self.emit(calls)))
    }

    fn accept_tool_results(&mut self, results: Vec<ToolResult>) -> CompileResult<StepResult> {
        self.conversation
            .extend(results.into_iter().map(Message::tool_result));
        let text = std::mem::take(&mut self.pending_text);
        // Nothing reads the answer of an unbound last step.
        if self.is_last_step && !self.binds_response {
            return self.finish_step(text);
        }

        // The model answers again with the results in view.
        self.state = ChainState::AwaitingResponse {
            awaiting: Awaiting::Model,
        };
        Ok(StepResult::Step(self.emit(Vec::new())))
    }

    /// The current document step has its answer.
    fn finish_step(&mut self, response: String) -> CompileResult<StepResult> {
        self.responses.push(response);
        if self.is_last_step {
            return Ok(self.complete());
        }
        self.document_step += 1;
        self.render_next()
    }

    fn emit(&mut self, pending_tool_calls: Vec<ToolCall>) -> Step {
        let step = Step {
            index: self.emitted,
            config: self.config.clone(),
            conversation: self.conversation.clone(),
            is_last_step: self.is_last_step,
            pending_tool_calls,
        };
        self.emitted += 1;
        debug!(
            index = step.index,
            document_step = self.document_step,
            messages = step.conversation.len(),
            is_last_step = step.is_last_step,
            tool_calls = step.pending_tool_calls.len(),
            "chain step"
        );
        step
    }

    fn complete(&mut self) -> StepResult {
        self.state = ChainState::Complete;
        debug!(messages = self.conversation.len(), "chain complete");
        StepResult::Complete(Completion {
            config: self.config.clone(),
            conversation: self.conversation.clone(),
        })
    }

    fn finished(&self) -> ChainError {
        ChainStateError::Finished {
            state: self.state.name().to_string(),
        }
        .into()
    }
}

/// Every pending call answered exactly once, nothing extra. Each result
/// takes the name of the call it answers.
fn match_tool_results(
    calls: &[ToolCall],
    mut results: Vec<ToolResult>,
) -> Result<Vec<ToolResult>, ChainStateError> {
    let mut expected: Vec<String> = calls.iter().map(|call| call.id.clone()).collect();
    let mut found: Vec<String> = results.iter().map(|result| result.id.clone()).collect();
    expected.sort();
    found.sort();
    if expected != found {
        return Err(ChainStateError::ToolResultMismatch { expected, found });
    }

    for result in &mut results {
        if let Some(call) = calls.iter().find(|call| call.id == result.id) {
            if result.name != call.name {
                debug!(id = %result.id, host = %result.name, call = %call.name, "renaming tool result");
                result.name = call.name.clone();
            }
        }
    }
    Ok(results)
}
