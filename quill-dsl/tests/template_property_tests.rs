//! Property-Based Tests for Template Round-Trip
//!
//! Property: For any well-formed document AST, pretty-printing → parsing
//! SHALL produce a structurally equal AST (spans ignored).
//!
//! This validates:
//! - The printer emits the parentheses and escapes the parser needs
//! - The parser preserves all semantic information
//! - Round-trip is lossless (at AST level, not byte-level)

use proptest::prelude::*;
use quill_dsl::lexer::{is_plain_identifier, Span};
use quill_dsl::parser::ast::*;
use quill_dsl::{parse, parse_expression, parse_with_diagnostics, pretty_print, print_expression};
use std::collections::BTreeMap;

// ============================================================================
// ARBITRATORS (Generate Random AST Nodes)
// ============================================================================

fn span() -> Span {
    Span::default()
}

/// Identifiers that are never keywords or block words.
fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,5}".prop_filter("reserved word", |name| {
        is_plain_identifier(name) && !matches!(name.as_str(), "as" | "if" | "else" | "each")
    })
}

fn arb_literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        Just(Literal::Undefined),
        Just(Literal::Null),
        any::<bool>().prop_map(Literal::Bool),
        (0u32..10_000).prop_map(|n| Literal::Number(n as f64)),
        (0u32..100).prop_map(|n| Literal::Number(n as f64 + 0.5)),
        "[a-zA-Z0-9 '\"\\\\{}]{0,8}".prop_map(Literal::String),
    ]
}

fn arb_leaf() -> impl Strategy<Value = Expression> {
    prop_oneof![
        arb_literal().prop_map(|value| Expression::Literal {
            value,
            span: span()
        }),
        arb_identifier().prop_map(|name| Expression::Identifier { name, span: span() }),
    ]
}

fn arb_binary_operator() -> impl Strategy<Value = BinaryOperator> {
    prop_oneof![
        Just(BinaryOperator::Add),
        Just(BinaryOperator::Sub),
        Just(BinaryOperator::Mul),
        Just(BinaryOperator::Div),
        Just(BinaryOperator::Rem),
        Just(BinaryOperator::Exp),
        Just(BinaryOperator::Eq),
        Just(BinaryOperator::StrictNotEq),
        Just(BinaryOperator::Lt),
        Just(BinaryOperator::Ge),
        Just(BinaryOperator::In),
        Just(BinaryOperator::BitAnd),
        Just(BinaryOperator::BitOr),
        Just(BinaryOperator::BitXor),
        Just(BinaryOperator::Shl),
        Just(BinaryOperator::UShr),
    ]
}

fn arb_logical_operator() -> impl Strategy<Value = LogicalOperator> {
    prop_oneof![
        Just(LogicalOperator::And),
        Just(LogicalOperator::Or),
        Just(LogicalOperator::Nullish),
    ]
}

fn arb_unary_operator() -> impl Strategy<Value = UnaryOperator> {
    prop_oneof![
        Just(UnaryOperator::Not),
        Just(UnaryOperator::Minus),
        Just(UnaryOperator::Plus),
        Just(UnaryOperator::BitNot),
        Just(UnaryOperator::Typeof),
        Just(UnaryOperator::Void),
    ]
}

/// Expressions in the shape the parser produces: optional accesses only
/// ever appear directly under a `Chain`.
fn arb_expression() -> impl Strategy<Value = Expression> {
    arb_leaf().prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            (arb_binary_operator(), inner.clone(), inner.clone()).prop_map(
                |(operator, left, right)| Expression::Binary {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                    span: span(),
                }
            ),
            (arb_logical_operator(), inner.clone(), inner.clone()).prop_map(
                |(operator, left, right)| Expression::Logical {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                    span: span(),
                }
            ),
            (arb_unary_operator(), inner.clone()).prop_map(|(operator, argument)| {
                Expression::Unary {
                    operator,
                    argument: Box::new(argument),
                    span: span(),
                }
            }),
            (inner.clone(), inner.clone(), inner.clone()).prop_map(
                |(test, consequent, alternate)| Expression::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                    span: span(),
                }
            ),
            (inner.clone(), arb_identifier()).prop_map(|(object, name)| Expression::Member {
                object: Box::new(object),
                property: MemberProperty::Named(name),
                optional: false,
                span: span(),
            }),
            (inner.clone(), inner.clone()).prop_map(|(object, property)| Expression::Member {
                object: Box::new(object),
                property: MemberProperty::Computed(Box::new(property)),
                optional: false,
                span: span(),
            }),
            (inner.clone(), arb_identifier()).prop_map(|(object, name)| Expression::Chain {
                expression: Box::new(Expression::Member {
                    object: Box::new(object),
                    property: MemberProperty::Named(name),
                    optional: true,
                    span: span(),
                }),
                span: span(),
            }),
            (arb_identifier(), prop::collection::vec(inner.clone(), 0..3)).prop_map(
                |(callee, arguments)| Expression::Call {
                    callee: Box::new(Expression::Identifier {
                        name: callee,
                        span: span(),
                    }),
                    arguments: arguments.into_iter().map(ArrayElement::Item).collect(),
                    optional: false,
                    span: span(),
                }
            ),
            prop::collection::vec((inner.clone(), any::<bool>()), 0..3).prop_map(|items| {
                Expression::Array {
                    elements: items
                        .into_iter()
                        .map(|(e, spread)| {
                            if spread {
                                ArrayElement::Spread(e)
                            } else {
                                ArrayElement::Item(e)
                            }
                        })
                        .collect(),
                    span: span(),
                }
            }),
            prop::collection::vec(("[a-z]{1,4}", inner.clone()), 0..3).prop_map(|entries| {
                Expression::Object {
                    properties: entries
                        .into_iter()
                        .map(|(key, value)| Property::KeyValue {
                            key: PropertyKey::Named(key),
                            value,
                        })
                        .collect(),
                    span: span(),
                }
            }),
            (arb_identifier(), inner.clone()).prop_map(|(name, value)| {
                Expression::Assignment {
                    operator: AssignmentOperator::Assign,
                    target: Box::new(Expression::Identifier { name, span: span() }),
                    value: Box::new(value),
                    span: span(),
                }
            }),
            prop::collection::vec(inner, 2..4).prop_map(|expressions| Expression::Sequence {
                expressions,
                span: span(),
            }),
        ]
    })
}

/// Plain text, including backslashes that may sit next to markup and
/// dashes that may look like front matter.
fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-zA-Z0-9 .,!?:\\\\\n-]{1,12}",
        1 => "[a-z \\\\]{0,4}".prop_map(|tail| format!("---\n{}\n---\n", tail)),
    ]
}

fn arb_tag_name() -> impl Strategy<Value = TagName> {
    prop::sample::select(TagName::ALL.to_vec())
}

fn arb_attribute_value() -> impl Strategy<Value = AttributeValue> {
    prop_oneof![
        Just(AttributeValue::Flag),
        "[a-z0-9 ]{0,6}".prop_map(AttributeValue::Literal),
        arb_expression().prop_map(AttributeValue::Expression),
    ]
}

fn arb_nodes() -> impl Strategy<Value = Vec<Node>> {
    let leaf = prop_oneof![
        arb_text().prop_map(|value| Node::Text {
            value,
            span: span()
        }),
        arb_expression().prop_map(|expression| Node::Expression {
            expression,
            span: span()
        }),
    ];

    let node = leaf.prop_recursive(3, 24, 4, |inner| {
        let children = prop::collection::vec(inner, 0..4).prop_map(merge_text);
        prop_oneof![
            (
                prop::collection::vec((arb_expression(), children.clone()), 1..3),
                prop::option::of(children.clone())
            )
                .prop_map(|(branches, alternate)| Node::If(IfBlock {
                    branches: branches
                        .into_iter()
                        .map(|(test, children)| IfBranch { test, children })
                        .collect(),
                    alternate,
                    span: span(),
                })),
            (
                arb_expression(),
                arb_identifier(),
                prop::option::of(arb_identifier()),
                children.clone(),
                prop::option::of(children.clone())
            )
                .prop_map(|(iterable, item, index, body, alternate)| {
                    Node::Each(EachBlock {
                        iterable,
                        item,
                        index,
                        body,
                        alternate,
                        span: span(),
                    })
                }),
            (
                arb_tag_name(),
                prop::collection::btree_map("[a-z]{1,5}", arb_attribute_value(), 0..3),
                children,
                any::<bool>()
            )
                .prop_map(|(name, attributes, children, self_closing)| {
                    element(name, attributes, children, self_closing)
                }),
        ]
    });

    prop::collection::vec(node, 0..6).prop_map(merge_text)
}

fn element(
    name: TagName,
    attributes: BTreeMap<String, AttributeValue>,
    children: Vec<Node>,
    self_closing: bool,
) -> Node {
    Node::Element(Element {
        name,
        attributes: attributes
            .into_iter()
            .map(|(name, value)| Attribute {
                name,
                value,
                span: span(),
            })
            .collect(),
        self_closing: self_closing && children.is_empty(),
        children,
        span: span(),
    })
}

fn arb_config() -> impl Strategy<Value = Option<Node>> {
    prop::option::of(("gpt-[a-z0-9]{1,5}", 0u32..4).prop_map(|(model, tokens)| {
        let raw = format!("model: {}\nmax_tokens: {}", model, tokens * 100 + 1);
        Node::Config(ConfigBlock {
            value: serde_json::json!({"model": model, "max_tokens": tokens * 100 + 1}),
            raw,
            span: span(),
        })
    }))
}

fn arb_document() -> impl Strategy<Value = Document> {
    (arb_config(), arb_nodes()).prop_map(|(config, mut nodes)| {
        if config.is_some() {
            // The closing `---` must end its line.
            match nodes.first_mut() {
                Some(Node::Text { value, .. }) => value.insert(0, '\n'),
                _ => nodes.insert(
                    0,
                    Node::Text {
                        value: "\n".to_string(),
                        span: span(),
                    },
                ),
            }
        }
        Document {
            nodes: config.into_iter().chain(nodes).collect(),
            digest: String::new(),
        }
    })
}

/// The parser never produces two text nodes in a row.
fn merge_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::new();
    for node in nodes {
        match (merged.last_mut(), node) {
            (Some(Node::Text { value: previous, .. }), Node::Text { value, .. }) => {
                previous.push_str(&value);
            }
            (_, node) => merged.push(node),
        }
    }
    merged
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_document_round_trip(document in arb_document()) {
        let printed = pretty_print(&document);
        let reparsed = parse(&printed);
        prop_assert!(reparsed.is_ok(), "printed document failed to parse:\n{}\n{:?}", printed, reparsed);
        if let Ok(reparsed) = reparsed {
            prop_assert!(
                document.structurally_eq(&reparsed),
                "structure changed:\n{}\n{:#?}\n{:#?}",
                printed,
                document.nodes,
                reparsed.nodes
            );
        }
    }

    #[test]
    fn prop_expression_round_trip(expression in arb_expression()) {
        let printed = print_expression(&expression);
        let reparsed = parse_expression(&printed);
        prop_assert!(reparsed.is_ok(), "printed expression failed to parse: {}", printed);
        if let Ok(mut reparsed) = reparsed {
            reparsed.erase_spans();
            prop_assert_eq!(reparsed, expression, "printed: {}", printed);
        }
    }

    #[test]
    fn prop_printing_is_a_fixpoint(document in arb_document()) {
        let printed = pretty_print(&document);
        if let Ok(reparsed) = parse(&printed) {
            prop_assert_eq!(pretty_print(&reparsed), printed);
        }
    }

    #[test]
    fn prop_parser_never_panics(source in "\\PC{0,64}") {
        let (document, errors) = parse_with_diagnostics(&source);
        prop_assert_eq!(document.digest.len(), 64);
        for error in errors {
            prop_assert!(error.span.start <= source.len());
            prop_assert!(error.span.line >= 1);
        }
    }

    #[test]
    fn prop_markup_soup_never_panics(
        pieces in prop::collection::vec(
            prop::sample::select(vec![
                "{{", "}}", "{{#if a}}", "{{/if}}", "{{:else}}", "{{#each xs as x}}",
                "{{/each}}", "<user>", "</user>", "<step as=\"s\">", "</step>",
                "```\n", "\n", "---\n", "{{!--", "--}}", "\\{{", "text", " ", "-}}", "{{-",
            ]),
            0..16,
        )
    ) {
        let source: String = pieces.concat();
        let _ = parse_with_diagnostics(&source);
    }

    #[test]
    fn prop_digest_is_deterministic(source in "[a-z {}<>/#]{0,32}") {
        let (first, _) = parse_with_diagnostics(&source);
        let (second, _) = parse_with_diagnostics(&source);
        prop_assert_eq!(first.digest, second.digest);
    }
}
