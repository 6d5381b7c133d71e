//! Quill Test Utilities
//!
//! Shared test infrastructure for the Quill workspace:
//! - A scripted model that drives chains with canned responses
//! - Proptest generators for values, parameters and messages
//! - Fixture documents for the common scenarios
//! - Assertions for Quill-specific error shapes

pub use quill_core::{
    ContentPart, Message, PromptConfig, ProviderKind, Role, ToolCall, ToolResult, Value,
};
pub use quill_dsl::{parse, Document};
pub use quill_engine::{
    create_chain, Chain, ChainError, ChainOptions, ChainResponse, ChainState, ChainStateError,
    CompileError, Completion, Parameters, Step, StepResult,
};

use std::collections::VecDeque;
use std::sync::Arc;

// ============================================================================
// SCRIPTED MODEL
// ============================================================================

/// Everything a chain emitted while being driven to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub steps: Vec<Step>,
    pub completion: Completion,
}

/// Stand-in for a model: answers each chain step with the next canned response.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    responses: VecDeque<ChainResponse>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = ChainResponse>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
        }
    }

    /// A model that answers with plain assistant text.
    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|text| ChainResponse::assistant(*text)))
    }

    pub fn remaining(&self) -> usize {
        self.responses.len()
    }

    /// Start `chain` and answer every step until it completes.
    ///
    /// # Panics
    ///
    /// When the script runs out while the chain still awaits a response.
    pub fn run(&mut self, chain: &mut Chain) -> Result<Transcript, ChainError> {
        let mut steps = Vec::new();
        let mut result = chain.step(None)?;
        loop {
            match result {
                StepResult::Complete(completion) => return Ok(Transcript { steps, completion }),
                StepResult::Step(step) => {
                    steps.push(step);
                    let response = self
                        .responses
                        .pop_front()
                        .unwrap_or_else(|| panic!("script exhausted after {} steps", steps.len()));
                    result = chain.resume(response)?;
                }
            }
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Quill values and messages.

    use super::*;
    use proptest::prelude::*;

    /// Identifiers that are safe as parameter names.
    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,6}".prop_filter("reserved word", |name| {
            !matches!(
                name.as_str(),
                "as" | "if" | "else" | "each" | "in" | "typeof" | "void" | "null" | "true"
                    | "false" | "undefined"
            )
        })
    }

    /// Finite numbers; `NaN` breaks equality-based properties.
    pub fn arb_number() -> impl Strategy<Value = f64> {
        prop_oneof![
            (-1000i32..1000).prop_map(f64::from),
            (-1.0e6f64..1.0e6),
        ]
    }

    /// Text without template syntax.
    pub fn arb_plain_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 .,!?]{1,24}".prop_filter("blank", |text| !text.trim().is_empty())
    }

    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            arb_number().prop_map(Value::Number),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ]
    }

    /// JSON-representable values, nested up to three levels.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map(arb_identifier(), inner, 0..4).prop_map(Value::Object),
            ]
        })
    }

    pub fn arb_parameters() -> impl Strategy<Value = Parameters> {
        prop::collection::btree_map(arb_identifier(), arb_value(), 0..5)
    }

    fn arb_call_id() -> impl Strategy<Value = String> {
        "call_[a-zA-Z0-9]{4,8}"
    }

    /// Tool arguments: a flat JSON object of integers, strings and flags.
    pub fn arb_arguments() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            (-1000i64..1000).prop_map(serde_json::Value::from),
            "[a-z ]{0,10}".prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
        ];
        prop::collection::btree_map(arb_identifier(), leaf, 0..4)
            .prop_map(|map| serde_json::Value::Object(map.into_iter().collect()))
    }

    pub fn arb_tool_call() -> impl Strategy<Value = ToolCall> {
        (arb_call_id(), arb_identifier(), arb_arguments()).prop_map(|(id, name, arguments)| {
            ToolCall {
                id,
                name,
                arguments,
            }
        })
    }

    /// Inline base64 images; every provider accepts these.
    pub fn arb_inline_image() -> impl Strategy<Value = ContentPart> {
        ("[A-Za-z0-9+/]{4,16}", prop_oneof![Just("image/png"), Just("image/jpeg")]).prop_map(
            |(data, mime)| ContentPart::Image {
                image: format!("data:{};base64,{}", mime, data),
                mime_type: Some(mime.to_string()),
            },
        )
    }

    pub fn arb_user_message() -> impl Strategy<Value = Message> {
        let part = prop_oneof![
            3 => arb_plain_text().prop_map(ContentPart::text),
            1 => arb_inline_image(),
        ];
        prop::collection::vec(part, 1..3).prop_map(|parts| Message::new(Role::User, parts))
    }

    /// An assistant turn calling tools, followed by one tool message per call.
    ///
    /// Call ids are numbered from `first_id` so results always resolve.
    pub fn arb_tool_exchange(first_id: usize) -> impl Strategy<Value = Vec<Message>> {
        prop::collection::vec((arb_tool_call(), arb_plain_text()), 1..3).prop_map(
            move |calls| {
                let calls: Vec<(ToolCall, String)> = calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, (call, output))| {
                        let id = format!("call_{}", first_id + i);
                        (ToolCall { id, ..call }, output)
                    })
                    .collect();
                let mut messages = vec![Message::assistant_tool_calls(
                    calls.iter().map(|(call, _)| call.clone()).collect(),
                )];
                messages.extend(calls.into_iter().map(|(call, output)| {
                    Message::tool_result(ToolResult {
                        id: call.id,
                        name: call.name,
                        result: serde_json::Value::String(output),
                        is_error: false,
                    })
                }));
                messages
            },
        )
    }

    /// Conversations every supported provider can carry: leading text-only
    /// system messages, then user turns, assistant text and tool exchanges.
    pub fn arb_conversation() -> impl Strategy<Value = Vec<Message>> {
        let turn = |index: usize| {
            prop_oneof![
                arb_user_message().prop_map(|message| vec![message]),
                arb_plain_text().prop_map(|text| vec![Message::assistant(text)]),
                arb_tool_exchange(index * 10),
            ]
        };
        let turns = (
            turn(0),
            turn(1),
            turn(2),
            turn(3),
            1usize..=4,
        )
            .prop_map(|(a, b, c, d, keep)| {
                [a, b, c, d].into_iter().take(keep).flatten().collect::<Vec<_>>()
            });
        (prop::collection::vec(arb_plain_text().prop_map(Message::system), 0..3), turns)
            .prop_map(|(mut system, turns)| {
                system.extend(turns);
                system
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Documents and parameters for the common scenarios.

    use super::*;

    pub const HELLO_WORLD: &str = "Hello {{ name }}!";

    pub const PREMIUM_CONDITIONAL: &str = "---
model: gpt-4
---
<system>You are a support agent.</system>
{{#if premium}}
<system>This customer has priority support.</system>
{{/if}}
<user>{{ question }}</user>
";

    pub const WEATHER_TOOL: &str = "---
model: gpt-4o
provider: openai
tools:
  get_weather:
    description: Current weather for a city
    parameters:
      type: object
      properties:
        city:
          type: string
---
<user>What's the weather in {{ city }}?</user>
";

    pub const TWO_STEP_CHAIN: &str = "---
model: gpt-4o-mini
---
<step as=\"topic\">
  <user>Suggest a topic about {{ subject }}.</user>
</step>
<step model=\"gpt-4o\">
  <user>Write a haiku about {{ topic }}.</user>
</step>
";

    pub const LOOP_ACCUMULATOR: &str = "{{ total = 0 }}
{{#each items as item, i}}
{{ line = i + 1 + '. ' + item.name }}
{{ total += item.price }}
{{ line }}
{{/each}}
Total: {{ total }}
";

    /// Parse a fixture, panicking on syntax errors.
    pub fn document(source: &str) -> Arc<Document> {
        match parse(source) {
            Ok(document) => Arc::new(document),
            Err(errors) => panic!("fixture does not parse: {}", errors),
        }
    }

    /// Parameters from a JSON object literal.
    pub fn params(value: serde_json::Value) -> Parameters {
        match quill_engine::parameters_from_json(value) {
            Ok(parameters) => parameters,
            Err(error) => panic!("fixture parameters: {}", error),
        }
    }

    pub fn chain(source: &str, parameters: serde_json::Value) -> Chain {
        create_chain(document(source), params(parameters), ChainOptions::default())
    }

    pub fn weather_call(id: &str, city: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "get_weather".to_string(),
            arguments: serde_json::json!({ "city": city }),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Quill-specific results.

    use super::*;

    /// Assert that a chain call failed with the given error kind.
    #[track_caller]
    pub fn assert_chain_error_kind<T: std::fmt::Debug>(result: &Result<T, ChainError>, kind: &str) {
        match result {
            Err(error) => assert_eq!(error.kind(), kind, "unexpected error: {}", error),
            Ok(value) => panic!("Expected {} error, got Ok: {:?}", kind, value),
        }
    }

    /// Assert that a chain call was rejected as protocol misuse.
    #[track_caller]
    pub fn assert_state_error<T: std::fmt::Debug>(result: &Result<T, ChainError>) {
        match result {
            Err(ChainError::State(_)) => {}
            other => panic!("Expected ChainStateError, got: {:?}", other),
        }
    }

    /// Assert roles and texts of a conversation.
    #[track_caller]
    pub fn assert_conversation(messages: &[Message], expected: &[(Role, &str)]) {
        let actual: Vec<(Role, String)> = messages
            .iter()
            .map(|message| (message.role, message.text()))
            .collect();
        let expected: Vec<(Role, String)> = expected
            .iter()
            .map(|(role, text)| (*role, text.to_string()))
            .collect();
        assert_eq!(actual, expected);
    }

    /// Unwrap a step, failing on completion.
    #[track_caller]
    pub fn expect_step(result: Result<StepResult, ChainError>) -> Step {
        match result {
            Ok(StepResult::Step(step)) => step,
            other => panic!("Expected a step, got: {:?}", other),
        }
    }

    /// Unwrap a completion, failing on a step.
    #[track_caller]
    pub fn expect_complete(result: Result<StepResult, ChainError>) -> Completion {
        match result {
            Ok(StepResult::Complete(completion)) => completion,
            other => panic!("Expected completion, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
