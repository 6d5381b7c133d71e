//! Expression parser
//!
//! Recursive descent over the tokens of a single mustache. Precedence, from
//! loosest to tightest:
//!
//! ```text
//! ,  =/op=  ?:  ??  ||  &&  |  ^  &  == != === !==  < <= > >= in
//! << >> >>>  + -  * / %  **  unary/prefix  postfix  . ?. [] ()
//! ```

use super::ast::*;
use crate::lexer::{Span, Token, TokenKind};
use std::collections::HashSet;

// ============================================================================
// PARSER IMPLEMENTATION
// ============================================================================

pub struct ExpressionParser {
    tokens: Vec<Token>,
    pos: usize,
    /// Spans of expressions written inside parentheses; needed to reject
    /// `a || b ?? c` while allowing `(a || b) ?? c`.
    parenthesized: HashSet<(usize, usize)>,
}

type PResult<T> = Result<T, ParseError>;

impl ExpressionParser {
    /// `tokens` must end with an `Eof` or `Close` token.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            parenthesized: HashSet::new(),
        }
    }

    /// Parse a complete expression; the next token must be a terminator.
    pub fn parse_complete(&mut self) -> PResult<Expression> {
        let expression = self.parse_expression()?;
        if !self.at_end() {
            return Err(self.unexpected("end of expression"));
        }
        Ok(expression)
    }

    /// Parse a full expression including comma sequences.
    pub fn parse_expression(&mut self) -> PResult<Expression> {
        let first = self.parse_assignment()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat(&TokenKind::Comma) {
            expressions.push(self.parse_assignment()?);
        }
        let span = span_of(&expressions);
        Ok(Expression::Sequence { expressions, span })
    }

    /// The token the parser stopped at.
    pub fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    pub fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub fn at_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Eof | TokenKind::Close { .. }
        )
    }

    /// Consume an identifier token.
    pub fn expect_identifier(&mut self, what: &str) -> PResult<(String, Span)> {
        match self.current().kind.clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    pub fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Span> {
        if self.check(&kind) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    pub fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        let kind = match token.kind {
            TokenKind::Eof => ParseErrorKind::UnterminatedExpression,
            _ => ParseErrorKind::InvalidExpression,
        };
        let message = match &token.kind {
            TokenKind::Error(msg) => msg.clone(),
            other => format!("expected {}, found {}", expected, other.describe()),
        };
        ParseError::new(kind, message, token.span)
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> ParseError {
        ParseError::new(ParseErrorKind::InvalidExpression, message, span)
    }

    // ========================================================================
    // ASSIGNMENT AND CONDITIONAL
    // ========================================================================

    fn parse_assignment(&mut self) -> PResult<Expression> {
        let target = self.parse_conditional()?;

        let Some(operator) = assignment_operator(&self.current().kind) else {
            return Ok(target);
        };
        let op_span = self.advance().span;
        if !is_assignment_target(&target) {
            return Err(self.error_at(op_span, "invalid assignment target"));
        }
        let value = self.parse_assignment()?;
        let span = target.span().to(value.span());
        Ok(Expression::Assignment {
            operator,
            target: Box::new(target),
            value: Box::new(value),
            span,
        })
    }

    fn parse_conditional(&mut self) -> PResult<Expression> {
        let test = self.parse_short_circuit()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect(TokenKind::Colon)?;
        let alternate = self.parse_assignment()?;
        let span = test.span().to(alternate.span());
        Ok(Expression::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        })
    }

    // ========================================================================
    // LOGICAL
    // ========================================================================

    fn parse_short_circuit(&mut self) -> PResult<Expression> {
        let mut left = self.parse_logical_or()?;
        if !self.check(&TokenKind::QuestionQuestion) {
            return Ok(left);
        }
        if self.is_bare_logical(&left) {
            return Err(self.mixed_nullish(left.span()));
        }
        while self.eat(&TokenKind::QuestionQuestion) {
            let right = self.parse_binary(7)?;
            left = logical(LogicalOperator::Nullish, left, right);
        }
        if self.check(&TokenKind::OrOr) || self.check(&TokenKind::AndAnd) {
            return Err(self.mixed_nullish(self.current().span));
        }
        Ok(left)
    }

    fn is_bare_logical(&self, expression: &Expression) -> bool {
        match expression {
            Expression::Logical { span, .. } => {
                !self.parenthesized.contains(&(span.start, span.end))
            }
            _ => false,
        }
    }

    fn mixed_nullish(&self, span: Span) -> ParseError {
        self.error_at(
            span,
            "'??' cannot be mixed with '||' or '&&' without parentheses",
        )
    }

    fn parse_logical_or(&mut self) -> PResult<Expression> {
        let mut left = self.parse_logical_and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.parse_logical_and()?;
            left = logical(LogicalOperator::Or, left, right);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Expression> {
        let mut left = self.parse_binary(7)?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.parse_binary(7)?;
            left = logical(LogicalOperator::And, left, right);
        }
        Ok(left)
    }

    // ========================================================================
    // BINARY
    // ========================================================================

    /// Precedence climbing over [`BinaryOperator::precedence`].
    fn parse_binary(&mut self, min_precedence: u8) -> PResult<Expression> {
        let mut left = self.parse_unary()?;

        while let Some(operator) = binary_operator(&self.current().kind) {
            let precedence = operator.precedence();
            if precedence < min_precedence {
                break;
            }
            let op_span = self.advance().span;

            let right = if operator == BinaryOperator::Exp {
                if self.is_bare_unary(&left) {
                    return Err(self.error_at(
                        op_span,
                        "unary operator before '**' requires parentheses",
                    ));
                }
                self.parse_binary(precedence)?
            } else {
                self.parse_binary(precedence + 1)?
            };

            let span = left.span().to(right.span());
            left = Expression::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn is_bare_unary(&self, expression: &Expression) -> bool {
        match expression {
            Expression::Unary { span, .. } => {
                !self.parenthesized.contains(&(span.start, span.end))
            }
            _ => false,
        }
    }

    // ========================================================================
    // UNARY AND UPDATE
    // ========================================================================

    fn parse_unary(&mut self) -> PResult<Expression> {
        let token = self.current().clone();
        let operator = match token.kind {
            TokenKind::Bang => Some(UnaryOperator::Not),
            TokenKind::Minus => Some(UnaryOperator::Minus),
            TokenKind::Plus => Some(UnaryOperator::Plus),
            TokenKind::Tilde => Some(UnaryOperator::BitNot),
            TokenKind::Typeof => Some(UnaryOperator::Typeof),
            TokenKind::Void => Some(UnaryOperator::Void),
            _ => None,
        };
        if let Some(operator) = operator {
            self.advance();
            let argument = self.parse_unary()?;
            let span = token.span.to(argument.span());
            return Ok(Expression::Unary {
                operator,
                argument: Box::new(argument),
                span,
            });
        }

        let update = match token.kind {
            TokenKind::PlusPlus => Some(UpdateOperator::Increment),
            TokenKind::MinusMinus => Some(UpdateOperator::Decrement),
            _ => None,
        };
        if let Some(operator) = update {
            self.advance();
            let argument = self.parse_unary()?;
            if !is_assignment_target(&argument) {
                return Err(self.error_at(argument.span(), "invalid update target"));
            }
            let span = token.span.to(argument.span());
            return Ok(Expression::Update {
                operator,
                prefix: true,
                argument: Box::new(argument),
                span,
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expression> {
        let argument = self.parse_call_member()?;
        let operator = match self.current().kind {
            TokenKind::PlusPlus => UpdateOperator::Increment,
            TokenKind::MinusMinus => UpdateOperator::Decrement,
            _ => return Ok(argument),
        };
        let op_span = self.advance().span;
        if !is_assignment_target(&argument) {
            return Err(self.error_at(argument.span(), "invalid update target"));
        }
        let span = argument.span().to(op_span);
        Ok(Expression::Update {
            operator,
            prefix: false,
            argument: Box::new(argument),
            span,
        })
    }

    // ========================================================================
    // MEMBER ACCESS AND CALLS
    // ========================================================================

    fn parse_call_member(&mut self) -> PResult<Expression> {
        let mut expression = self.parse_primary()?;
        let mut optional_chain = false;

        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    expression = self.parse_named_member(expression, false)?;
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    optional_chain = true;
                    expression = match self.current().kind {
                        TokenKind::LParen => self.parse_call(expression, true)?,
                        TokenKind::LBracket => self.parse_computed_member(expression, true)?,
                        _ => self.parse_named_member(expression, true)?,
                    };
                }
                TokenKind::LBracket => {
                    expression = self.parse_computed_member(expression, false)?;
                }
                TokenKind::LParen => {
                    expression = self.parse_call(expression, false)?;
                }
                _ => break,
            }
        }

        if optional_chain {
            let span = expression.span();
            expression = Expression::Chain {
                expression: Box::new(expression),
                span,
            };
        }
        Ok(expression)
    }

    fn parse_named_member(&mut self, object: Expression, optional: bool) -> PResult<Expression> {
        let token = self.current().clone();
        let Some(name) = token.kind.as_property_name() else {
            return Err(self.unexpected("property name"));
        };
        let name = name.to_string();
        self.advance();
        let span = object.span().to(token.span);
        Ok(Expression::Member {
            object: Box::new(object),
            property: MemberProperty::Named(name),
            optional,
            span,
        })
    }

    fn parse_computed_member(
        &mut self,
        object: Expression,
        optional: bool,
    ) -> PResult<Expression> {
        self.expect(TokenKind::LBracket)?;
        let property = self.parse_expression()?;
        let end = self.expect(TokenKind::RBracket)?;
        let span = object.span().to(end);
        Ok(Expression::Member {
            object: Box::new(object),
            property: MemberProperty::Computed(Box::new(property)),
            optional,
            span,
        })
    }

    fn parse_call(&mut self, callee: Expression, optional: bool) -> PResult<Expression> {
        self.expect(TokenKind::LParen)?;
        let arguments = self.parse_elements(TokenKind::RParen)?;
        let end = self.expect(TokenKind::RParen)?;
        let span = callee.span().to(end);
        Ok(Expression::Call {
            callee: Box::new(callee),
            arguments,
            optional,
            span,
        })
    }

    /// Comma separated items with optional spread, up to (not including)
    /// `close`. A trailing comma is allowed.
    fn parse_elements(&mut self, close: TokenKind) -> PResult<Vec<ArrayElement>> {
        let mut elements = Vec::new();
        while !self.check(&close) {
            if self.eat(&TokenKind::Ellipsis) {
                elements.push(ArrayElement::Spread(self.parse_assignment()?));
            } else {
                elements.push(ArrayElement::Item(self.parse_assignment()?));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(elements)
    }

    // ========================================================================
    // PRIMARY
    // ========================================================================

    fn parse_primary(&mut self) -> PResult<Expression> {
        let token = self.current().clone();
        let literal = match &token.kind {
            TokenKind::Number(n) => Some(Literal::Number(*n)),
            TokenKind::String(s) => Some(Literal::String(s.clone())),
            TokenKind::True => Some(Literal::Bool(true)),
            TokenKind::False => Some(Literal::Bool(false)),
            TokenKind::Null => Some(Literal::Null),
            TokenKind::Undefined => Some(Literal::Undefined),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(Expression::Literal {
                value,
                span: token.span,
            });
        }

        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expression::Identifier {
                    name,
                    span: token.span,
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                let span = inner.span();
                self.parenthesized.insert((span.start, span.end));
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let elements = self.parse_elements(TokenKind::RBracket)?;
                let end = self.expect(TokenKind::RBracket)?;
                Ok(Expression::Array {
                    elements,
                    span: token.span.to(end),
                })
            }
            TokenKind::LBrace => self.parse_object(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_object(&mut self) -> PResult<Expression> {
        let start = self.expect(TokenKind::LBrace)?;
        let mut properties = Vec::new();

        while !self.check(&TokenKind::RBrace) {
            properties.push(self.parse_property()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let end = self.expect(TokenKind::RBrace)?;
        Ok(Expression::Object {
            properties,
            span: start.to(end),
        })
    }

    fn parse_property(&mut self) -> PResult<Property> {
        if self.eat(&TokenKind::Ellipsis) {
            return Ok(Property::Spread(self.parse_assignment()?));
        }

        let token = self.current().clone();
        let key = match &token.kind {
            TokenKind::LBracket => {
                self.advance();
                let key = self.parse_assignment()?;
                self.expect(TokenKind::RBracket)?;
                PropertyKey::Computed(key)
            }
            TokenKind::String(s) => {
                self.advance();
                PropertyKey::Named(s.clone())
            }
            TokenKind::Number(n) => {
                self.advance();
                PropertyKey::Named(quill_core::number_to_string(*n))
            }
            kind => match kind.as_property_name() {
                Some(name) => {
                    let name = name.to_string();
                    self.advance();
                    // `{ name }` shorthand
                    if matches!(token.kind, TokenKind::Identifier(_))
                        && (self.check(&TokenKind::Comma) || self.check(&TokenKind::RBrace))
                    {
                        return Ok(Property::KeyValue {
                            key: PropertyKey::Named(name.clone()),
                            value: Expression::Identifier {
                                name,
                                span: token.span,
                            },
                        });
                    }
                    PropertyKey::Named(name)
                }
                None => return Err(self.unexpected("property key")),
            },
        };

        self.expect(TokenKind::Colon)?;
        let value = self.parse_assignment()?;
        Ok(Property::KeyValue { key, value })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn logical(operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
    let span = left.span().to(right.span());
    Expression::Logical {
        operator,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

fn span_of(expressions: &[Expression]) -> Span {
    match (expressions.first(), expressions.last()) {
        (Some(first), Some(last)) => first.span().to(last.span()),
        _ => Span::default(),
    }
}

fn is_assignment_target(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Identifier { .. } | Expression::Member { optional: false, .. }
    )
}

fn binary_operator(kind: &TokenKind) -> Option<BinaryOperator> {
    let operator = match kind {
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Sub,
        TokenKind::Star => BinaryOperator::Mul,
        TokenKind::Slash => BinaryOperator::Div,
        TokenKind::Percent => BinaryOperator::Rem,
        TokenKind::StarStar => BinaryOperator::Exp,
        TokenKind::EqEq => BinaryOperator::Eq,
        TokenKind::NotEq => BinaryOperator::NotEq,
        TokenKind::EqEqEq => BinaryOperator::StrictEq,
        TokenKind::NotEqEq => BinaryOperator::StrictNotEq,
        TokenKind::Lt => BinaryOperator::Lt,
        TokenKind::Le => BinaryOperator::Le,
        TokenKind::Gt => BinaryOperator::Gt,
        TokenKind::Ge => BinaryOperator::Ge,
        TokenKind::In => BinaryOperator::In,
        TokenKind::Amp => BinaryOperator::BitAnd,
        TokenKind::Pipe => BinaryOperator::BitOr,
        TokenKind::Caret => BinaryOperator::BitXor,
        TokenKind::Shl => BinaryOperator::Shl,
        TokenKind::Shr => BinaryOperator::Shr,
        TokenKind::UShr => BinaryOperator::UShr,
        _ => return None,
    };
    Some(operator)
}

fn assignment_operator(kind: &TokenKind) -> Option<AssignmentOperator> {
    let operator = match kind {
        TokenKind::Assign => AssignmentOperator::Assign,
        TokenKind::PlusAssign => AssignmentOperator::Add,
        TokenKind::MinusAssign => AssignmentOperator::Sub,
        TokenKind::StarAssign => AssignmentOperator::Mul,
        TokenKind::SlashAssign => AssignmentOperator::Div,
        TokenKind::PercentAssign => AssignmentOperator::Rem,
        TokenKind::StarStarAssign => AssignmentOperator::Exp,
        TokenKind::ShlAssign => AssignmentOperator::Shl,
        TokenKind::ShrAssign => AssignmentOperator::Shr,
        TokenKind::UShrAssign => AssignmentOperator::UShr,
        TokenKind::AmpAssign => AssignmentOperator::BitAnd,
        TokenKind::PipeAssign => AssignmentOperator::BitOr,
        TokenKind::CaretAssign => AssignmentOperator::BitXor,
        TokenKind::AndAndAssign => AssignmentOperator::And,
        TokenKind::OrOrAssign => AssignmentOperator::Or,
        TokenKind::QuestionQuestionAssign => AssignmentOperator::Nullish,
        _ => return None,
    };
    Some(operator)
}

/// Parse a standalone expression (no surrounding mustache).
pub fn parse_expression(source: &str) -> Result<Expression, ParseError> {
    let tokens = crate::lexer::Lexer::new(source).tokenize();
    ExpressionParser::new(tokens).parse_complete()
}
