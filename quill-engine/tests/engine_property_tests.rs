//! Property-Based Tests for the Engine
//!
//! Properties:
//! - Evaluation is deterministic for an unmutated scope
//! - Names first assigned inside a loop body never outlive the body
//! - Compilation substitutes parameters verbatim and reports every missing one
//! - Two chains fed the same responses emit identical steps

use proptest::prelude::*;
use quill_dsl::parse_expression;
use quill_engine::{compile, evaluate, render, CompileError, Parameters, Scope};
use quill_test_utils::fixtures::{self, chain, document};
use quill_test_utils::generators::{arb_number, arb_plain_text, arb_value};
use quill_test_utils::{Message, ScriptedModel, Value};
use serde_json::json;

// ============================================================================
// ARBITRATORS
// ============================================================================

const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "==", "!=", "===", "!==", "<", "<=", ">", ">=", "&&", "||",
    "??", "&", "|", "^", "<<", ">>", ">>>",
];

fn arb_leaf_source() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..100).prop_map(|n| n.to_string()),
        "[a-z ]{0,4}".prop_map(|s| format!("'{}'", s)),
        Just("null".to_string()),
        Just("undefined".to_string()),
        Just("true".to_string()),
        prop::sample::select(vec!["a", "b", "c"]).prop_map(str::to_string),
    ]
}

/// Side-effect free expression sources over the parameters `a`, `b`, `c`.
fn arb_expression_source() -> impl Strategy<Value = String> {
    arb_leaf_source().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(OPERATORS), inner.clone())
                .prop_map(|(l, op, r)| format!("({} {} {})", l, op, r)),
            inner.clone().prop_map(|e| format!("!{}", e)),
            inner.clone().prop_map(|e| format!("typeof {}", e)),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(t, c, a)| format!("({} ? {} : {})", t, c, a)),
            (inner.clone(), inner.clone()).prop_map(|(x, y)| format!("[{}, {}]", x, y)),
            inner.clone().prop_map(|e| format!("{{ k: {} }}?.k", e)),
            inner.clone().prop_map(|e| format!("String({})", e)),
            inner.prop_map(|e| format!("{}?.length", e)),
        ]
    })
}

fn arb_abc() -> impl Strategy<Value = Parameters> {
    (arb_value(), arb_value(), arb_value()).prop_map(|(a, b, c)| {
        [("a", a), ("b", b), ("c", c)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    })
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_evaluation_is_deterministic(
        source in arb_expression_source(),
        parameters in arb_abc(),
    ) {
        let expression = parse_expression(&source).expect("generated source parses");
        let mut first_scope = Scope::with_parameters(parameters.clone());
        let mut second_scope = Scope::with_parameters(parameters);
        let first = evaluate(&expression, &mut first_scope);
        let second = evaluate(&expression, &mut second_scope);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_loop_assignments_stay_in_the_body(
        numbers in prop::collection::vec(arb_number(), 0..8),
    ) {
        let source = "{{ sum = 0 }}{{#each xs as x}}{{ last = x }}{{ sum += x }}{{/each}}\
                      {{ typeof last }}|{{ sum }}";
        let compilation = render(source, json!({ "xs": numbers })).expect("compiles");
        let expected_sum = numbers.iter().fold(0.0, |acc, n| acc + n);
        let text = compilation.messages[0].text();
        prop_assert_eq!(
            text,
            format!("undefined|{}", Value::Number(expected_sum).to_display_string())
        );
    }

    #[test]
    fn prop_parameters_render_verbatim(name in arb_plain_text()) {
        let compilation = render(fixtures::HELLO_WORLD, json!({ "name": name.clone() }))
            .expect("compiles");
        prop_assert_eq!(
            compilation.messages,
            vec![Message::system(format!("Hello {}!", name).trim())]
        );
    }

    #[test]
    fn prop_missing_parameters_are_all_reported(
        provide_premium in any::<bool>(),
        provide_question in any::<bool>(),
    ) {
        let mut parameters = Parameters::new();
        let mut missing = Vec::new();
        if provide_premium {
            parameters.insert("premium".to_string(), Value::Bool(true));
        } else {
            missing.push("premium".to_string());
        }
        if provide_question {
            parameters.insert("question".to_string(), Value::string("?"));
        } else {
            missing.push("question".to_string());
        }

        let result = compile(&document(fixtures::PREMIUM_CONDITIONAL), &parameters);
        if missing.is_empty() {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(result, Err(CompileError::MissingParameters { names: missing }));
        }
    }

    #[test]
    fn prop_chain_replay_is_deterministic(
        subject in arb_plain_text(),
        first in arb_plain_text(),
        second in arb_plain_text(),
    ) {
        let run = || {
            let mut chain = chain(fixtures::TWO_STEP_CHAIN, json!({ "subject": subject.clone() }));
            ScriptedModel::replying(&[first.as_str(), second.as_str()])
                .run(&mut chain)
                .expect("completes")
        };
        let a = run();
        let b = run();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.steps.len(), 2);
        let bound = a.steps[1].conversation.last().map(Message::text);
        prop_assert_eq!(bound, Some(format!("Write a haiku about {}.", first)));
    }
}
