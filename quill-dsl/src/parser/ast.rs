//! AST type definitions

use crate::lexer::Span;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

// ============================================================================
// DOCUMENT
// ============================================================================

/// A parsed prompt document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub nodes: Vec<Node>,
    /// Hex SHA-256 of the source text.
    pub digest: String,
}

impl Document {
    /// The front-matter block, if the document has one.
    pub fn config(&self) -> Option<&ConfigBlock> {
        self.nodes.iter().find_map(|node| match node {
            Node::Config(config) => Some(config),
            _ => None,
        })
    }

    /// True if both documents have the same tree, ignoring spans and digest.
    pub fn structurally_eq(&self, other: &Document) -> bool {
        let mut left = self.nodes.clone();
        let mut right = other.nodes.clone();
        left.iter_mut().for_each(Node::erase_spans);
        right.iter_mut().for_each(Node::erase_spans);
        left == right
    }
}

/// Raw and decoded front matter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigBlock {
    /// YAML text between the `---` fences.
    pub raw: String,
    /// The decoded mapping (always a JSON object).
    pub value: serde_json::Value,
    pub span: Span,
}

// ============================================================================
// TEMPLATE NODES
// ============================================================================

/// Classification of block-like nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TagKind {
    Conditional,
    Loop,
    MessageRole,
    Step,
    Content,
    Fence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Node {
    Config(ConfigBlock),
    Text { value: String, span: Span },
    Expression { expression: Expression, span: Span },
    If(IfBlock),
    Each(EachBlock),
    Element(Element),
    Fence(Fence),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Config(config) => config.span,
            Node::Text { span, .. } | Node::Expression { span, .. } => *span,
            Node::If(block) => block.span,
            Node::Each(block) => block.span,
            Node::Element(element) => element.span,
            Node::Fence(fence) => fence.span,
        }
    }

    pub fn tag_kind(&self) -> Option<TagKind> {
        match self {
            Node::If(_) => Some(TagKind::Conditional),
            Node::Each(_) => Some(TagKind::Loop),
            Node::Element(element) => Some(element.name.kind()),
            Node::Fence(_) => Some(TagKind::Fence),
            Node::Config(_) | Node::Text { .. } | Node::Expression { .. } => None,
        }
    }

    fn erase_spans(&mut self) {
        match self {
            Node::Config(config) => config.span = Span::default(),
            Node::Text { span, .. } => *span = Span::default(),
            Node::Expression { expression, span } => {
                *span = Span::default();
                expression.erase_spans();
            }
            Node::If(block) => {
                block.span = Span::default();
                for branch in &mut block.branches {
                    branch.test.erase_spans();
                    branch.children.iter_mut().for_each(Node::erase_spans);
                }
                if let Some(alternate) = &mut block.alternate {
                    alternate.iter_mut().for_each(Node::erase_spans);
                }
            }
            Node::Each(block) => {
                block.span = Span::default();
                block.iterable.erase_spans();
                block.body.iter_mut().for_each(Node::erase_spans);
                if let Some(alternate) = &mut block.alternate {
                    alternate.iter_mut().for_each(Node::erase_spans);
                }
            }
            Node::Element(element) => {
                element.span = Span::default();
                for attribute in &mut element.attributes {
                    attribute.span = Span::default();
                    if let AttributeValue::Expression(expression) = &mut attribute.value {
                        expression.erase_spans();
                    }
                }
                element.children.iter_mut().for_each(Node::erase_spans);
            }
            Node::Fence(fence) => fence.span = Span::default(),
        }
    }
}

/// `{{#if}} ... {{:else if}} ... {{:else}} ... {{/if}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfBlock {
    /// At least one branch; evaluated in order.
    pub branches: Vec<IfBranch>,
    pub alternate: Option<Vec<Node>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfBranch {
    pub test: Expression,
    pub children: Vec<Node>,
}

/// `{{#each list as item, index}} ... {{:else}} ... {{/each}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EachBlock {
    pub iterable: Expression,
    pub item: String,
    pub index: Option<String>,
    pub body: Vec<Node>,
    /// Rendered when the iterable is empty.
    pub alternate: Option<Vec<Node>>,
    pub span: Span,
}

/// A recognised XML-like tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub name: TagName,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub self_closing: bool,
    pub span: Span,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributeValue {
    /// `name="text"` or `name='text'`
    Literal(String),
    /// `name={{ expr }}`
    Expression(Expression),
    /// Bare `name`
    Flag,
}

/// A fenced code block kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fence {
    pub info: String,
    pub body: String,
    pub span: Span,
}

impl Fence {
    /// The fence exactly as it appears in the source.
    pub fn raw(&self) -> String {
        format!("```{}\n{}```", self.info, self.body)
    }
}

/// Every tag name the parser recognises. Anything else is plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TagName {
    System,
    User,
    Assistant,
    Tool,
    Message,
    Step,
    ContentText,
    ContentImage,
    ContentFile,
    ToolCall,
}

impl TagName {
    pub const ALL: [TagName; 10] = [
        TagName::System,
        TagName::User,
        TagName::Assistant,
        TagName::Tool,
        TagName::Message,
        TagName::Step,
        TagName::ContentText,
        TagName::ContentImage,
        TagName::ContentFile,
        TagName::ToolCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagName::System => "system",
            TagName::User => "user",
            TagName::Assistant => "assistant",
            TagName::Tool => "tool",
            TagName::Message => "message",
            TagName::Step => "step",
            TagName::ContentText => "content-text",
            TagName::ContentImage => "content-image",
            TagName::ContentFile => "content-file",
            TagName::ToolCall => "tool-call",
        }
    }

    pub fn from_name(name: &str) -> Option<TagName> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == name)
    }

    pub fn kind(&self) -> TagKind {
        match self {
            TagName::System
            | TagName::User
            | TagName::Assistant
            | TagName::Tool
            | TagName::Message => TagKind::MessageRole,
            TagName::Step => TagKind::Step,
            TagName::ContentText
            | TagName::ContentImage
            | TagName::ContentFile
            | TagName::ToolCall => TagKind::Content,
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Expression {
    Literal {
        value: Literal,
        span: Span,
    },
    Identifier {
        name: String,
        span: Span,
    },
    Array {
        elements: Vec<ArrayElement>,
        span: Span,
    },
    Object {
        properties: Vec<Property>,
        span: Span,
    },
    Sequence {
        expressions: Vec<Expression>,
        span: Span,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expression>,
        right: Box<Expression>,
        span: Span,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
        span: Span,
    },
    Unary {
        operator: UnaryOperator,
        argument: Box<Expression>,
        span: Span,
    },
    Update {
        operator: UpdateOperator,
        prefix: bool,
        argument: Box<Expression>,
        span: Span,
    },
    Assignment {
        operator: AssignmentOperator,
        target: Box<Expression>,
        value: Box<Expression>,
        span: Span,
    },
    Member {
        object: Box<Expression>,
        property: MemberProperty,
        optional: bool,
        span: Span,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
        span: Span,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<ArrayElement>,
        optional: bool,
        span: Span,
    },
    /// Boundary of an optional chain: a nullish `?.` anywhere inside makes
    /// the whole chain evaluate to `undefined`.
    Chain {
        expression: Box<Expression>,
        span: Span,
    },
}

/// An array element or call argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArrayElement {
    Item(Expression),
    Spread(Expression),
}

impl ArrayElement {
    pub fn expression(&self) -> &Expression {
        match self {
            ArrayElement::Item(e) | ArrayElement::Spread(e) => e,
        }
    }

    fn expression_mut(&mut self) -> &mut Expression {
        match self {
            ArrayElement::Item(e) | ArrayElement::Spread(e) => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Property {
    /// `key: value`, `"key": value` or shorthand `key`
    KeyValue { key: PropertyKey, value: Expression },
    /// `...expr`
    Spread(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PropertyKey {
    Named(String),
    Computed(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MemberProperty {
    /// `a.b`
    Named(String),
    /// `a[b]`
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LogicalOperator {
    And,
    Or,
    Nullish,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "&&",
            LogicalOperator::Or => "||",
            LogicalOperator::Nullish => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::Exp => "**",
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::StrictEq => "===",
            BinaryOperator::StrictNotEq => "!==",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::In => "in",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::UShr => ">>>",
        }
    }

    /// Binding power; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::BitOr => 7,
            BinaryOperator::BitXor => 8,
            BinaryOperator::BitAnd => 9,
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::StrictEq
            | BinaryOperator::StrictNotEq => 10,
            BinaryOperator::Lt
            | BinaryOperator::Le
            | BinaryOperator::Gt
            | BinaryOperator::Ge
            | BinaryOperator::In => 11,
            BinaryOperator::Shl | BinaryOperator::Shr | BinaryOperator::UShr => 12,
            BinaryOperator::Add | BinaryOperator::Sub => 13,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Rem => 14,
            BinaryOperator::Exp => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
    BitNot,
    Typeof,
    Void,
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::BitNot => "~",
            UnaryOperator::Typeof => "typeof",
            UnaryOperator::Void => "void",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

impl UpdateOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOperator::Increment => "++",
            UpdateOperator::Decrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssignmentOperator {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Nullish,
}

impl AssignmentOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentOperator::Assign => "=",
            AssignmentOperator::Add => "+=",
            AssignmentOperator::Sub => "-=",
            AssignmentOperator::Mul => "*=",
            AssignmentOperator::Div => "/=",
            AssignmentOperator::Rem => "%=",
            AssignmentOperator::Exp => "**=",
            AssignmentOperator::Shl => "<<=",
            AssignmentOperator::Shr => ">>=",
            AssignmentOperator::UShr => ">>>=",
            AssignmentOperator::BitAnd => "&=",
            AssignmentOperator::BitOr => "|=",
            AssignmentOperator::BitXor => "^=",
            AssignmentOperator::And => "&&=",
            AssignmentOperator::Or => "||=",
            AssignmentOperator::Nullish => "??=",
        }
    }

    /// The arithmetic operator of a compound assignment.
    pub fn binary(&self) -> Option<BinaryOperator> {
        match self {
            AssignmentOperator::Add => Some(BinaryOperator::Add),
            AssignmentOperator::Sub => Some(BinaryOperator::Sub),
            AssignmentOperator::Mul => Some(BinaryOperator::Mul),
            AssignmentOperator::Div => Some(BinaryOperator::Div),
            AssignmentOperator::Rem => Some(BinaryOperator::Rem),
            AssignmentOperator::Exp => Some(BinaryOperator::Exp),
            AssignmentOperator::Shl => Some(BinaryOperator::Shl),
            AssignmentOperator::Shr => Some(BinaryOperator::Shr),
            AssignmentOperator::UShr => Some(BinaryOperator::UShr),
            AssignmentOperator::BitAnd => Some(BinaryOperator::BitAnd),
            AssignmentOperator::BitOr => Some(BinaryOperator::BitOr),
            AssignmentOperator::BitXor => Some(BinaryOperator::BitXor),
            AssignmentOperator::Assign
            | AssignmentOperator::And
            | AssignmentOperator::Or
            | AssignmentOperator::Nullish => None,
        }
    }
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Literal { span, .. }
            | Expression::Identifier { span, .. }
            | Expression::Array { span, .. }
            | Expression::Object { span, .. }
            | Expression::Sequence { span, .. }
            | Expression::Logical { span, .. }
            | Expression::Binary { span, .. }
            | Expression::Unary { span, .. }
            | Expression::Update { span, .. }
            | Expression::Assignment { span, .. }
            | Expression::Member { span, .. }
            | Expression::Conditional { span, .. }
            | Expression::Call { span, .. }
            | Expression::Chain { span, .. } => *span,
        }
    }

    /// Binding power used by the printer to decide on parentheses.
    pub fn precedence(&self) -> u8 {
        match self {
            Expression::Sequence { .. } => 1,
            Expression::Assignment { .. } => 2,
            Expression::Conditional { .. } => 3,
            Expression::Logical { operator, .. } => match operator {
                LogicalOperator::Nullish => 4,
                LogicalOperator::Or => 5,
                LogicalOperator::And => 6,
            },
            Expression::Binary { operator, .. } => operator.precedence(),
            Expression::Unary { .. } => 16,
            Expression::Update { prefix: true, .. } => 16,
            Expression::Update { prefix: false, .. } => 17,
            Expression::Member { .. } | Expression::Call { .. } | Expression::Chain { .. } => 18,
            Expression::Literal { .. }
            | Expression::Identifier { .. }
            | Expression::Array { .. }
            | Expression::Object { .. } => 19,
        }
    }

    /// True for expressions whose only purpose is a side effect; such
    /// placeholders render nothing.
    pub fn is_side_effect(&self) -> bool {
        matches!(
            self,
            Expression::Assignment { .. } | Expression::Update { .. }
        )
    }

    pub fn erase_spans(&mut self) {
        match self {
            Expression::Literal { span, .. } | Expression::Identifier { span, .. } => {
                *span = Span::default();
            }
            Expression::Array { elements, span } => {
                *span = Span::default();
                for element in elements {
                    element.expression_mut().erase_spans();
                }
            }
            Expression::Object { properties, span } => {
                *span = Span::default();
                for property in properties {
                    match property {
                        Property::KeyValue { key, value } => {
                            if let PropertyKey::Computed(key) = key {
                                key.erase_spans();
                            }
                            value.erase_spans();
                        }
                        Property::Spread(value) => value.erase_spans(),
                    }
                }
            }
            Expression::Sequence { expressions, span } => {
                *span = Span::default();
                expressions.iter_mut().for_each(Expression::erase_spans);
            }
            Expression::Logical {
                left, right, span, ..
            }
            | Expression::Binary {
                left, right, span, ..
            } => {
                *span = Span::default();
                left.erase_spans();
                right.erase_spans();
            }
            Expression::Unary { argument, span, .. } | Expression::Update { argument, span, .. } => {
                *span = Span::default();
                argument.erase_spans();
            }
            Expression::Assignment {
                target,
                value,
                span,
                ..
            } => {
                *span = Span::default();
                target.erase_spans();
                value.erase_spans();
            }
            Expression::Member {
                object,
                property,
                span,
                ..
            } => {
                *span = Span::default();
                object.erase_spans();
                if let MemberProperty::Computed(property) = property {
                    property.erase_spans();
                }
            }
            Expression::Conditional {
                test,
                consequent,
                alternate,
                span,
            } => {
                *span = Span::default();
                test.erase_spans();
                consequent.erase_spans();
                alternate.erase_spans();
            }
            Expression::Call {
                callee,
                arguments,
                span,
                ..
            } => {
                *span = Span::default();
                callee.erase_spans();
                for argument in arguments {
                    argument.expression_mut().erase_spans();
                }
            }
            Expression::Chain { expression, span } => {
                *span = Span::default();
                expression.erase_spans();
            }
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParseErrorKind {
    UnterminatedConfig,
    InvalidConfig,
    UnbalancedTag,
    UnterminatedExpression,
    InvalidExpression,
    InvalidAttribute,
    UnterminatedFence,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseErrorKind::UnterminatedConfig => "UnterminatedConfig",
            ParseErrorKind::InvalidConfig => "InvalidConfig",
            ParseErrorKind::UnbalancedTag => "UnbalancedTag",
            ParseErrorKind::UnterminatedExpression => "UnterminatedExpression",
            ParseErrorKind::InvalidExpression => "InvalidExpression",
            ParseErrorKind::InvalidAttribute => "InvalidAttribute",
            ParseErrorKind::UnterminatedFence => "UnterminatedFence",
        };
        f.write_str(name)
    }
}

/// Parse error with location information.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind} at line {}, column {}: {message}", .span.line, .span.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }
}

/// Every error from one parse, in source order.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", summarize(.0))]
pub struct ParseErrors(pub Vec<ParseError>);

impl ParseErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn summarize(errors: &[ParseError]) -> String {
    match errors {
        [] => "no parse errors".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}
