//! End-to-end scenarios: parse → compile / chain → conversation.

use quill_engine::{compile, render, ChainError, ChainStateError, QuillError};
use quill_test_utils::assertions::*;
use quill_test_utils::fixtures::{self, chain, document, params, weather_call};
use quill_test_utils::{ChainResponse, ChainState, Message, Role, ScriptedModel, Value};
use serde_json::json;

// ============================================================================
// SINGLE-STEP COMPILATION
// ============================================================================

#[test]
fn test_hello_world_compiles_to_one_message() {
    let compilation = render(fixtures::HELLO_WORLD, json!({"name": "Ada"})).expect("compiles");
    assert_eq!(compilation.messages, vec![Message::system("Hello Ada!")]);
}

#[test]
fn test_false_conditional_is_omitted() {
    let document = document(fixtures::PREMIUM_CONDITIONAL);
    let compilation = compile(
        &document,
        &params(json!({"premium": false, "question": "Where is my order?"})),
    )
    .expect("compiles");

    assert_eq!(compilation.config.model.as_deref(), Some("gpt-4"));
    assert_conversation(
        &compilation.messages,
        &[
            (Role::System, "You are a support agent."),
            (Role::User, "Where is my order?"),
        ],
    );
    assert!(compilation
        .messages
        .iter()
        .all(|message| !message.text().contains("priority")));
}

#[test]
fn test_true_conditional_is_included() {
    let compilation = render(
        fixtures::PREMIUM_CONDITIONAL,
        json!({"premium": true, "question": "Hi"}),
    )
    .expect("compiles");
    assert_eq!(compilation.messages.len(), 3);
    assert_eq!(compilation.messages[1].text(), "This customer has priority support.");
}

#[test]
fn test_render_reports_missing_parameters() {
    let err = render(fixtures::HELLO_WORLD, json!({})).expect_err("name missing");
    assert!(matches!(err, QuillError::Compile(_)));
    assert!(err.to_string().contains("name"));
}

#[test]
fn test_loop_accumulator_and_loop_locals() {
    let source = format!("{}{{{{ typeof line }}}}", fixtures::LOOP_ACCUMULATOR);
    let compilation = render(
        &source,
        json!({"items": [{"name": "Tea", "price": 3}, {"name": "Cake", "price": 4.5}]}),
    )
    .expect("compiles");

    let text = compilation.messages[0].text();
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    assert_eq!(lines, ["1. Tea", "2. Cake", "Total: 7.5", "undefined"]);
}

#[test]
fn test_optional_chaining_in_templates() {
    let compilation =
        render("<user>{{ profile?.address.city ?? 'unknown' }}</user>", json!({"profile": null}))
            .expect("short-circuits");
    assert_eq!(compilation.messages, vec![Message::user("unknown")]);

    let err = render("<user>{{ profile.address.city }}</user>", json!({"profile": null}))
        .expect_err("null reference");
    assert!(err.to_string().contains("address"));
}

// ============================================================================
// CHAINS
// ============================================================================

#[test]
fn test_tool_call_scenario() {
    let mut chain = chain(fixtures::WEATHER_TOOL, json!({"city": "Paris"}));

    let first = expect_step(chain.step(None));
    assert_eq!(first.index, 0);
    assert!(first.is_last_step);
    assert_conversation(&first.conversation, &[(Role::User, "What's the weather in Paris?")]);

    let call = weather_call("call_1", "Paris");
    let second = expect_step(chain.resume(ChainResponse::Assistant(
        Message::assistant_tool_calls(vec![call.clone()]),
    )));
    assert_eq!(second.index, 1);
    assert_eq!(second.pending_tool_calls, vec![call.clone()]);
    assert_eq!(second.pending_tool_calls[0].name, "get_weather");

    let completion = expect_complete(chain.resume(ChainResponse::ToolOutput(Value::object([(
        "temperature",
        Value::string("20C"),
    )]))));

    let conversation = &completion.conversation;
    assert_eq!(conversation.len(), 3);
    assert_eq!(conversation[1].tool_calls().next(), Some(&call));
    let result = conversation[2].tool_results().next().expect("tool result");
    assert_eq!(result.id, "call_1");
    assert_eq!(result.name, "get_weather");
    assert_eq!(result.result, json!({"temperature": "20C"}));
    assert_eq!(chain.state(), &ChainState::Complete);
}

#[test]
fn test_stepping_twice_while_awaiting_is_rejected() {
    let mut chain = chain(fixtures::WEATHER_TOOL, json!({"city": "Oslo"}));
    expect_step(chain.step(None));
    expect_step(chain.resume(ChainResponse::Assistant(Message::assistant_tool_calls(vec![
        weather_call("a", "Oslo"),
        weather_call("b", "Bergen"),
    ]))));

    let before = chain.state().clone();
    let result = chain.step(None);
    assert_state_error(&result);
    assert_eq!(result, Err(ChainError::State(ChainStateError::AwaitingResponse)));
    assert_eq!(chain.state(), &before);

    // A lone output is ambiguous with two calls pending.
    assert_state_error(&chain.resume(ChainResponse::ToolOutput(Value::Null)));
    assert_eq!(chain.state(), &before);
}

#[test]
fn test_multi_step_chain_binds_and_overrides() {
    let mut chain = chain(fixtures::TWO_STEP_CHAIN, json!({"subject": "the sea"}));

    let first = expect_step(chain.step(None));
    assert!(!first.is_last_step);
    assert_eq!(first.config.model.as_deref(), Some("gpt-4o-mini"));
    assert_conversation(&first.conversation, &[(Role::User, "Suggest a topic about the sea.")]);

    let second = expect_step(chain.resume(ChainResponse::assistant("tides")));
    assert!(second.is_last_step);
    assert_eq!(second.config.model.as_deref(), Some("gpt-4o"));
    assert_conversation(
        &second.conversation,
        &[
            (Role::User, "Suggest a topic about the sea."),
            (Role::Assistant, "tides"),
            (Role::User, "Write a haiku about tides."),
        ],
    );

    let completion = expect_complete(chain.resume(ChainResponse::assistant("Moon pulls...")));
    assert_eq!(completion.conversation.len(), 4);
}

#[test]
fn test_step_indices_strictly_increase() {
    let mut chain = chain(fixtures::WEATHER_TOOL, json!({"city": "Rome"}));
    let mut model = ScriptedModel::new([
        ChainResponse::Assistant(Message::assistant_tool_calls(vec![weather_call("c1", "Rome")])),
        ChainResponse::ToolOutput(Value::string("sunny")),
    ]);
    let transcript = model.run(&mut chain).expect("completes");
    let indices: Vec<usize> = transcript.steps.iter().map(|step| step.index).collect();
    assert_eq!(indices, [0, 1]);
}

#[test]
fn test_replay_is_deterministic() {
    let run = || {
        let mut chain = chain(fixtures::TWO_STEP_CHAIN, json!({"subject": "mountains"}));
        ScriptedModel::replying(&["granite", "Stone holds the sky"])
            .run(&mut chain)
            .expect("completes")
    };
    assert_eq!(run(), run());
}

#[test]
fn test_loop_generated_steps() {
    let mut chain = chain(
        "{{#each questions as q}}<step><user>{{ q }}</user></step>{{/each}}",
        json!({"questions": ["one?", "two?", "three?"]}),
    );
    let transcript = ScriptedModel::replying(&["1", "2", "3"])
        .run(&mut chain)
        .expect("completes");
    assert_eq!(transcript.steps.len(), 3);
    assert!(transcript.steps[..2].iter().all(|step| !step.is_last_step));
    assert!(transcript.steps[2].is_last_step);
    assert_eq!(
        transcript.steps[2].conversation.last(),
        Some(&Message::user("three?"))
    );
}

#[test]
fn test_errored_chain_stays_errored() {
    let mut chain = chain("<user>{{ a.b }}</user>", json!({"a": null}));
    assert_chain_error_kind(&chain.step(None), "NullReference");
    assert_eq!(chain.state(), &ChainState::Errored);
    assert_state_error(&chain.step(None));
    assert_state_error(&chain.resume(ChainResponse::assistant("late")));
}
