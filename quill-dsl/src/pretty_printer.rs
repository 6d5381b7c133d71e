//! Pretty-printer for Quill documents
//!
//! Turns an AST back into source text. Parsing the output yields a tree that
//! is structurally equal (ignoring spans) to the input tree.

use crate::lexer::is_plain_identifier;
use crate::parser::ast::*;
use crate::parser::parser::escapable_len;
use quill_core::number_to_string;

/// Pretty-print a document back to source form.
pub fn pretty_print(document: &Document) -> String {
    let mut output = String::new();
    print_nodes(&document.nodes, false, &mut output);
    let has_config = matches!(document.nodes.first(), Some(Node::Config(_)));
    if !has_config && output.trim_start().starts_with("---") {
        // Leading dashes in text must not read as front matter.
        output.insert_str(0, "{{!-- --}}");
    }
    output
}

/// Print one expression with the minimum parentheses needed to keep its
/// structure.
pub fn print_expression(expression: &Expression) -> String {
    let mut output = String::new();
    write_expression(expression, &mut output);
    output
}

// ============================================================================
// TEMPLATE NODES
// ============================================================================

/// `closed` is set when a block or tag closer follows the last node.
fn print_nodes(nodes: &[Node], closed: bool, output: &mut String) {
    for (i, node) in nodes.iter().enumerate() {
        let markup_follows = match nodes.get(i + 1) {
            None => closed,
            Some(Node::Text { .. } | Node::Fence(_)) => false,
            Some(_) => true,
        };
        print_node(node, markup_follows, output);
    }
}

fn print_node(node: &Node, markup_follows: bool, output: &mut String) {
    match node {
        Node::Config(config) => {
            output.push_str("---\n");
            if !config.raw.is_empty() {
                output.push_str(&config.raw);
                output.push('\n');
            }
            output.push_str("---");
        }
        Node::Text { value, .. } => output.push_str(&escape_text(value, markup_follows)),
        Node::Expression { expression, .. } => {
            output.push_str("{{ ");
            write_expression(expression, output);
            output.push_str(" }}");
        }
        Node::If(block) => {
            for (i, branch) in block.branches.iter().enumerate() {
                output.push_str(if i == 0 { "{{#if " } else { "{{:else if " });
                write_expression(&branch.test, output);
                output.push_str("}}");
                print_nodes(&branch.children, true, output);
            }
            if let Some(alternate) = &block.alternate {
                output.push_str("{{:else}}");
                print_nodes(alternate, true, output);
            }
            output.push_str("{{/if}}");
        }
        Node::Each(block) => {
            output.push_str("{{#each ");
            write_expression(&block.iterable, output);
            output.push_str(" as ");
            output.push_str(&block.item);
            if let Some(index) = &block.index {
                output.push_str(", ");
                output.push_str(index);
            }
            output.push_str("}}");
            print_nodes(&block.body, true, output);
            if let Some(alternate) = &block.alternate {
                output.push_str("{{:else}}");
                print_nodes(alternate, true, output);
            }
            output.push_str("{{/each}}");
        }
        Node::Element(element) => {
            output.push('<');
            output.push_str(element.name.as_str());
            for attribute in &element.attributes {
                output.push(' ');
                output.push_str(&attribute.name);
                match &attribute.value {
                    AttributeValue::Flag => {}
                    AttributeValue::Literal(value) => {
                        let quote = if value.contains('"') { '\'' } else { '"' };
                        output.push('=');
                        output.push(quote);
                        output.push_str(value);
                        output.push(quote);
                    }
                    AttributeValue::Expression(expression) => {
                        output.push_str("={{ ");
                        write_expression(expression, output);
                        output.push_str(" }}");
                    }
                }
            }
            if element.self_closing && element.children.is_empty() {
                output.push_str(" />");
            } else {
                output.push('>');
                print_nodes(&element.children, true, output);
                output.push_str("</");
                output.push_str(element.name.as_str());
                output.push('>');
            }
        }
        Node::Fence(fence) => output.push_str(&fence.raw()),
    }
}

/// Re-escape `{{` and known tag openers inside literal text. Backslashes
/// right before markup are doubled so they stay literal.
fn escape_text(value: &str, markup_follows: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(c) = rest.chars().next() {
        if c == '\\' {
            let run = rest.len() - rest.trim_start_matches('\\').len();
            let after = &rest[run..];
            let before_markup = if after.is_empty() {
                markup_follows
            } else {
                escapable_len(after).is_some()
            };
            escaped.push_str(&rest[..run]);
            if before_markup {
                escaped.push_str(&rest[..run]);
            }
            rest = after;
            continue;
        }
        if let Some(len) = escapable_len(rest) {
            escaped.push('\\');
            escaped.push_str(&rest[..len]);
            rest = &rest[len..];
            continue;
        }
        escaped.push(c);
        rest = &rest[c.len_utf8()..];
    }
    escaped
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

const ASSIGNMENT: u8 = 2;
const UNARY: u8 = 16;
const MEMBER: u8 = 18;

fn write_expression(expression: &Expression, output: &mut String) {
    match expression {
        Expression::Literal { value, .. } => write_literal(value, output),
        Expression::Identifier { name, .. } => output.push_str(name),
        Expression::Array { elements, .. } => {
            output.push('[');
            write_elements(elements, output);
            output.push(']');
        }
        Expression::Object { properties, .. } => {
            if properties.is_empty() {
                output.push_str("{}");
                return;
            }
            output.push_str("{ ");
            for (i, property) in properties.iter().enumerate() {
                if i > 0 {
                    output.push_str(", ");
                }
                match property {
                    Property::KeyValue { key, value } => {
                        match key {
                            PropertyKey::Named(name) if is_property_name(name) => {
                                output.push_str(name)
                            }
                            PropertyKey::Named(name) => write_string(name, output),
                            PropertyKey::Computed(key) => {
                                output.push('[');
                                write_operand(key, ASSIGNMENT, output);
                                output.push(']');
                            }
                        }
                        output.push_str(": ");
                        write_operand(value, ASSIGNMENT, output);
                    }
                    Property::Spread(value) => {
                        output.push_str("...");
                        write_operand(value, ASSIGNMENT, output);
                    }
                }
            }
            output.push_str(" }");
        }
        Expression::Sequence { expressions, .. } => {
            for (i, item) in expressions.iter().enumerate() {
                if i > 0 {
                    output.push_str(", ");
                }
                write_operand(item, ASSIGNMENT, output);
            }
        }
        Expression::Logical {
            operator,
            left,
            right,
            ..
        } => {
            let precedence = expression.precedence();
            write_logical_operand(*operator, left, precedence, output);
            output.push(' ');
            output.push_str(operator.as_str());
            output.push(' ');
            write_logical_operand(*operator, right, precedence + 1, output);
        }
        Expression::Binary {
            operator,
            left,
            right,
            ..
        } => {
            let precedence = operator.precedence();
            if *operator == BinaryOperator::Exp {
                // Right associative, and a bare unary may not be its base.
                let needs_parens = left.precedence() <= precedence
                    || matches!(**left, Expression::Unary { .. });
                write_wrapped(left, needs_parens, output);
                output.push_str(" ** ");
                write_operand(right, precedence, output);
            } else {
                write_operand(left, precedence, output);
                output.push(' ');
                output.push_str(operator.as_str());
                output.push(' ');
                write_operand(right, precedence + 1, output);
            }
        }
        Expression::Unary {
            operator, argument, ..
        } => {
            output.push_str(operator.as_str());
            let mut operand = String::new();
            write_operand(argument, UNARY, &mut operand);
            let needs_space = match operator {
                UnaryOperator::Typeof | UnaryOperator::Void => true,
                UnaryOperator::Minus => operand.starts_with('-'),
                UnaryOperator::Plus => operand.starts_with('+'),
                UnaryOperator::Not | UnaryOperator::BitNot => false,
            };
            if needs_space {
                output.push(' ');
            }
            output.push_str(&operand);
        }
        Expression::Update {
            operator,
            prefix,
            argument,
            ..
        } => {
            if *prefix {
                output.push_str(operator.as_str());
                write_operand(argument, UNARY, output);
            } else {
                write_operand(argument, MEMBER, output);
                output.push_str(operator.as_str());
            }
        }
        Expression::Assignment {
            operator,
            target,
            value,
            ..
        } => {
            write_operand(target, MEMBER, output);
            output.push(' ');
            output.push_str(operator.as_str());
            output.push(' ');
            write_operand(value, ASSIGNMENT, output);
        }
        Expression::Member {
            object,
            property,
            optional,
            ..
        } => {
            write_callee(object, output);
            match property {
                MemberProperty::Named(name) => {
                    output.push_str(if *optional { "?." } else { "." });
                    output.push_str(name);
                }
                MemberProperty::Computed(property) => {
                    if *optional {
                        output.push_str("?.");
                    }
                    output.push('[');
                    write_expression(property, output);
                    output.push(']');
                }
            }
        }
        Expression::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => {
            write_operand(test, 4, output);
            output.push_str(" ? ");
            write_operand(consequent, ASSIGNMENT, output);
            output.push_str(" : ");
            write_operand(alternate, ASSIGNMENT, output);
        }
        Expression::Call {
            callee,
            arguments,
            optional,
            ..
        } => {
            write_callee(callee, output);
            if *optional {
                output.push_str("?.");
            }
            output.push('(');
            write_elements(arguments, output);
            output.push(')');
        }
        Expression::Chain { expression, .. } => write_expression(expression, output),
    }
}

/// Write `operand`, parenthesised if it binds looser than `min_precedence`.
fn write_operand(operand: &Expression, min_precedence: u8, output: &mut String) {
    write_wrapped(operand, operand.precedence() < min_precedence, output);
}

fn write_wrapped(operand: &Expression, parens: bool, output: &mut String) {
    if parens {
        output.push('(');
        write_expression(operand, output);
        output.push(')');
    } else {
        write_expression(operand, output);
    }
}

/// `??` cannot share an unparenthesised operand with `||` or `&&`.
fn write_logical_operand(
    parent: LogicalOperator,
    operand: &Expression,
    min_precedence: u8,
    output: &mut String,
) {
    let mixes = match operand {
        Expression::Logical { operator, .. } => {
            (parent == LogicalOperator::Nullish) != (*operator == LogicalOperator::Nullish)
        }
        _ => false,
    };
    write_wrapped(
        operand,
        mixes || operand.precedence() < min_precedence,
        output,
    );
}

/// Object of a member access or callee of a call.
fn write_callee(object: &Expression, output: &mut String) {
    let needs_parens = match object {
        // `(a?.b).c` must not extend the optional chain.
        Expression::Chain { .. } => true,
        Expression::Literal {
            value: Literal::Number(_),
            ..
        } => true,
        other => other.precedence() < MEMBER,
    };
    write_wrapped(object, needs_parens, output);
}

fn write_elements(elements: &[ArrayElement], output: &mut String) {
    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            output.push_str(", ");
        }
        if let ArrayElement::Spread(_) = element {
            output.push_str("...");
        }
        write_operand(element.expression(), ASSIGNMENT, output);
    }
}

fn write_literal(literal: &Literal, output: &mut String) {
    match literal {
        Literal::Undefined => output.push_str("undefined"),
        Literal::Null => output.push_str("null"),
        Literal::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Literal::Number(n) => output.push_str(&number_to_string(*n)),
        Literal::String(s) => write_string(s, output),
    }
}

fn write_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => output.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => output.push(c),
        }
    }
    output.push('"');
}

fn is_property_name(name: &str) -> bool {
    is_plain_identifier(name)
        || matches!(
            name,
            "true" | "false" | "null" | "undefined" | "typeof" | "void" | "in"
        )
}
