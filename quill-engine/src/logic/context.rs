//! Static scope analysis
//!
//! Walks a document without evaluating it and records which identifiers are
//! read before anything defines them. Those are the document's parameters;
//! the compiler checks they are all supplied before running anything.
//!
//! The walk mirrors the runtime scoping rules: `{{#if}}` branches and
//! `{{#each}}` bodies get a child context whose new definitions do not
//! escape, while reads of undefined names always propagate outward.

use crate::logic::builtins;
use quill_dsl::{
    ArrayElement, AttributeValue, Document, Expression, MemberProperty, Node, Property,
    PropertyKey, TagName, UnaryOperator,
};
use std::collections::BTreeSet;

/// What a walk has learned so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeContext {
    /// Names in scope at this point (parameters excluded).
    pub defined: BTreeSet<String>,
    /// Names read while not defined: the free parameters.
    pub used_undefined: BTreeSet<String>,
    /// Every name written anywhere.
    pub assigned: BTreeSet<String>,
}

impl ScopeContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&mut self, name: &str) {
        if !self.defined.contains(name) && builtins::global_constant(name).is_none() {
            self.used_undefined.insert(name.to_string());
        }
    }

    fn define(&mut self, name: &str) {
        self.defined.insert(name.to_string());
        self.assigned.insert(name.to_string());
    }

    /// A context for a nested block.
    fn child(&self) -> ScopeContext {
        ScopeContext {
            defined: self.defined.clone(),
            used_undefined: BTreeSet::new(),
            assigned: BTreeSet::new(),
        }
    }

    /// Fold a finished child back in; its definitions stay local.
    fn absorb(&mut self, child: ScopeContext) {
        self.used_undefined.extend(child.used_undefined);
        self.assigned.extend(child.assigned);
    }
}

/// Extend `context` with everything `node` reads and defines.
pub fn resolve_scope_context(node: &Node, context: ScopeContext) -> ScopeContext {
    let mut context = context;
    walk_node(node, &mut context);
    context
}

/// Free parameters of a whole document, sorted.
pub fn document_parameters(document: &Document) -> BTreeSet<String> {
    document
        .nodes
        .iter()
        .fold(ScopeContext::new(), |context, node| {
            resolve_scope_context(node, context)
        })
        .used_undefined
}

fn walk_nodes(nodes: &[Node], context: &mut ScopeContext) {
    for node in nodes {
        walk_node(node, context);
    }
}

fn walk_block(nodes: &[Node], context: &mut ScopeContext, bindings: &[&str]) {
    let mut child = context.child();
    for name in bindings {
        child.defined.insert(name.to_string());
    }
    walk_nodes(nodes, &mut child);
    context.absorb(child);
}

fn walk_node(node: &Node, context: &mut ScopeContext) {
    match node {
        Node::Config(_) | Node::Text { .. } | Node::Fence(_) => {}
        Node::Expression { expression, .. } => walk_expression(expression, context),
        Node::If(block) => {
            for branch in &block.branches {
                walk_expression(&branch.test, context);
                walk_block(&branch.children, context, &[]);
            }
            if let Some(alternate) = &block.alternate {
                walk_block(alternate, context, &[]);
            }
        }
        Node::Each(block) => {
            walk_expression(&block.iterable, context);
            let mut bindings = vec![block.item.as_str()];
            if let Some(index) = &block.index {
                bindings.push(index);
            }
            walk_block(&block.body, context, &bindings);
            if let Some(alternate) = &block.alternate {
                walk_block(alternate, context, &[]);
            }
        }
        Node::Element(element) => {
            for attribute in &element.attributes {
                if let AttributeValue::Expression(expression) = &attribute.value {
                    walk_expression(expression, context);
                }
            }
            walk_nodes(&element.children, context);
            if element.name == TagName::Step {
                if let Some(AttributeValue::Literal(name)) =
                    element.attribute("as").map(|a| &a.value)
                {
                    context.define(name);
                }
            }
        }
    }
}

/// Record the reads and writes of one expression, in evaluation order.
pub fn walk_expression(expression: &Expression, context: &mut ScopeContext) {
    match expression {
        Expression::Literal { .. } => {}
        Expression::Identifier { name, .. } => context.read(name),
        Expression::Array { elements, .. } => walk_elements(elements, context),
        Expression::Object { properties, .. } => {
            for property in properties {
                match property {
                    Property::KeyValue { key, value } => {
                        if let PropertyKey::Computed(key) = key {
                            walk_expression(key, context);
                        }
                        walk_expression(value, context);
                    }
                    Property::Spread(value) => walk_expression(value, context),
                }
            }
        }
        Expression::Sequence { expressions, .. } => {
            for expression in expressions {
                walk_expression(expression, context);
            }
        }
        Expression::Logical { left, right, .. } | Expression::Binary { left, right, .. } => {
            walk_expression(left, context);
            walk_expression(right, context);
        }
        Expression::Unary {
            operator, argument, ..
        } => {
            // `typeof name` is the way to probe for an optional parameter.
            let probe = *operator == UnaryOperator::Typeof
                && matches!(argument.as_ref(), Expression::Identifier { .. });
            if !probe {
                walk_expression(argument, context);
            }
        }
        Expression::Update { argument, .. } => walk_target(argument, context, true),
        Expression::Assignment {
            operator,
            target,
            value,
            ..
        } => {
            let compound = *operator != quill_dsl::AssignmentOperator::Assign;
            if let Expression::Identifier { name, .. } = target.as_ref() {
                if compound {
                    context.read(name);
                }
                walk_expression(value, context);
                context.define(name);
            } else {
                walk_target(target, context, compound);
                walk_expression(value, context);
            }
        }
        Expression::Member {
            object, property, ..
        } => {
            if !is_namespace(object, context) {
                walk_expression(object, context);
            }
            if let MemberProperty::Computed(property) = property {
                walk_expression(property, context);
            }
        }
        Expression::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => {
            walk_expression(test, context);
            walk_expression(consequent, context);
            walk_expression(alternate, context);
        }
        Expression::Call {
            callee, arguments, ..
        } => {
            match callee.as_ref() {
                Expression::Identifier { name, .. }
                    if builtins::is_global_function(name) && !context.defined.contains(name) => {}
                other => walk_expression(other, context),
            }
            walk_elements(arguments, context);
        }
        Expression::Chain { expression, .. } => walk_expression(expression, context),
    }
}

fn walk_elements(elements: &[ArrayElement], context: &mut ScopeContext) {
    for element in elements {
        walk_expression(element.expression(), context);
    }
}

/// An assignment or update target. The root binding is read first (member
/// targets need an existing value) and, for plain names, defined afterwards.
fn walk_target(target: &Expression, context: &mut ScopeContext, reads_value: bool) {
    match target {
        Expression::Identifier { name, .. } => {
            if reads_value {
                context.read(name);
            }
            context.define(name);
        }
        Expression::Member {
            object, property, ..
        } => {
            walk_expression(object, context);
            if let MemberProperty::Computed(property) = property {
                walk_expression(property, context);
            }
            if let Some(root) = root_name(object) {
                context.assigned.insert(root.to_string());
            }
        }
        other => walk_expression(other, context),
    }
}

fn root_name(expression: &Expression) -> Option<&str> {
    match expression {
        Expression::Identifier { name, .. } => Some(name),
        Expression::Member { object, .. } => root_name(object),
        _ => None,
    }
}

fn is_namespace(expression: &Expression, context: &ScopeContext) -> bool {
    matches!(
        expression,
        Expression::Identifier { name, .. }
            if builtins::is_namespace(name) && !context.defined.contains(name)
    )
}
