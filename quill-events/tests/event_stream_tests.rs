//! Event stream scenarios and properties.

use proptest::prelude::*;
use quill_events::{ChainEvent, EmitterError, EventEmitter, EventFrame};
use quill_test_utils::fixtures::{self, weather_call};
use quill_test_utils::generators::arb_plain_text;
use quill_test_utils::{Chain, ChainResponse, Message, Value};
use serde_json::json;

fn drive(chain: &mut Chain, responses: Vec<ChainResponse>) -> Vec<EventFrame> {
    let mut emitter = EventEmitter::new();
    let mut frames = emitter.advance(chain, None).expect("starts");
    for response in responses {
        if emitter.is_closed() {
            break;
        }
        frames.extend(emitter.advance(chain, Some(response)).expect("advances"));
    }
    frames
}

#[test]
fn test_tool_call_stream() {
    let mut chain = fixtures::chain(fixtures::WEATHER_TOOL, json!({"city": "Paris"}));
    let frames = drive(
        &mut chain,
        vec![
            ChainResponse::Assistant(Message::assistant_tool_calls(vec![weather_call(
                "call_1", "Paris",
            )])),
            ChainResponse::ToolOutput(Value::object([("temperature", Value::string("20C"))])),
        ],
    );

    let names: Vec<&str> = frames.iter().map(|frame| frame.event.name()).collect();
    assert_eq!(
        names,
        vec!["step", "step-complete", "step", "step-complete", "complete"]
    );

    match &frames[2].event {
        ChainEvent::Step(step) => assert_eq!(step.pending_tool_calls.len(), 1),
        other => panic!("expected tool step, got {:?}", other),
    }
    match frames.last().map(|frame| &frame.event) {
        Some(ChainEvent::Complete(completion)) => {
            assert_eq!(completion.conversation.len(), 3);
            assert_eq!(completion.conversation[2].tool_results().count(), 1);
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[test]
fn test_sse_output_for_stream() {
    let mut chain = fixtures::chain(fixtures::HELLO_WORLD, json!({"name": "Ada"}));
    let frames = drive(&mut chain, vec![ChainResponse::assistant("Hello!")]);
    let sse: String = frames
        .iter()
        .map(|frame| frame.to_sse().expect("encodes"))
        .collect();

    assert!(sse.starts_with("id: 1\nevent: step\ndata: {"));
    assert!(sse.contains("id: 2\nevent: step-complete\n"));
    assert!(sse.contains("id: 3\nevent: complete\n"));
    assert_eq!(sse.matches("\n\n").count(), 3);
}

#[test]
fn test_runtime_error_carries_location() {
    let mut chain = fixtures::chain("<user>\n{{ missing.name }}\n</user>", json!({"missing": null}));
    let mut emitter = EventEmitter::new();
    let frames = emitter.advance(&mut chain, None).expect("emits");

    match &frames[0].event {
        ChainEvent::Error { name, stack, .. } => {
            assert_eq!(name, "NullReference");
            let stack = stack.as_deref().expect("location");
            assert!(stack.starts_with("at line 2, column "), "{}", stack);
        }
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(
        emitter.advance(&mut chain, None).expect_err("closed"),
        EmitterError::Closed
    );
}

proptest! {
    #[test]
    fn prop_frame_ids_and_step_indices_increase(
        subject in arb_plain_text(),
        replies in prop::collection::vec(arb_plain_text(), 2),
    ) {
        let mut chain = fixtures::chain(fixtures::TWO_STEP_CHAIN, json!({ "subject": subject }));
        let frames = drive(&mut chain, replies.into_iter().map(ChainResponse::assistant).collect());

        let ids: Vec<u64> = frames.iter().map(|frame| frame.id).collect();
        let expected: Vec<u64> = (1..=frames.len() as u64).collect();
        prop_assert_eq!(ids, expected);

        let indices: Vec<usize> = frames
            .iter()
            .filter_map(|frame| match &frame.event {
                ChainEvent::Step(step) => Some(step.index),
                _ => None,
            })
            .collect();
        prop_assert!(indices.windows(2).all(|pair| pair[0] < pair[1]));
        prop_assert_eq!(frames.iter().filter(|frame| frame.event.is_terminal()).count(), 1);
    }

    #[test]
    fn prop_replayed_streams_match(subject in arb_plain_text(), reply in arb_plain_text()) {
        let run = || {
            let mut chain = fixtures::chain(fixtures::TWO_STEP_CHAIN, json!({ "subject": subject }));
            drive(&mut chain, vec![
                ChainResponse::assistant(reply.clone()),
                ChainResponse::assistant("done"),
            ])
        };
        prop_assert_eq!(run(), run());
    }
}
