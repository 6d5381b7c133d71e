//! Template parser implementation

use super::ast::*;
use super::expression::ExpressionParser;
use crate::config::decode_front_matter;
use crate::lexer::{Lexer, Span, Token, TokenKind};
use sha2::{Digest, Sha256};

// ============================================================================
// PARSER STATE
// ============================================================================

/// A construct that is currently open and waiting for its closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    If,
    Each,
    Tag(TagName),
}

impl Frame {
    fn describe(&self) -> String {
        match self {
            Frame::If => "{{#if}}".to_string(),
            Frame::Each => "{{#each}}".to_string(),
            Frame::Tag(name) => format!("<{}>", name),
        }
    }
}

/// Why [`Parser::parse_nodes`] returned.
#[derive(Debug)]
enum Stop {
    Eof,
    /// `{{:else}}` or `{{:else if cond}}`
    Else {
        condition: Option<Expression>,
        span: Span,
    },
    /// `{{/if}}`, `{{/each}}` or `</tag>`; always matches some open frame.
    Close { frame: Frame, span: Span },
}

/// Parser for prompt documents.
///
/// Errors never abort the parse: each one is recorded and the parser resumes
/// after the offending construct, so a single pass reports every problem.
pub struct Parser<'a> {
    source: &'a str,
    pos: usize,
    line_starts: Vec<usize>,
    open: Vec<Frame>,
    errors: Vec<ParseError>,
    trim_next: bool,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            pos: 0,
            line_starts,
            open: Vec::new(),
            errors: Vec::new(),
            trim_next: false,
        }
    }

    /// Parse the whole document, returning the (possibly partial) tree and
    /// every error found.
    pub fn parse_document(mut self) -> (Document, Vec<ParseError>) {
        let mut nodes = Vec::new();
        if let Some(config) = self.parse_config() {
            nodes.push(Node::Config(config));
        }

        // Nothing is open at the top level, so this only stops at the end.
        let (mut children, _) = self.parse_nodes();
        nodes.append(&mut children);

        let digest = hex::encode(Sha256::digest(self.source.as_bytes()));
        tracing::debug!(
            nodes = nodes.len(),
            errors = self.errors.len(),
            digest = %digest,
            "parsed document"
        );
        (Document { nodes, digest }, self.errors)
    }

    // ========================================================================
    // FRONT MATTER
    // ========================================================================

    fn parse_config(&mut self) -> Option<ConfigBlock> {
        let start = self.source.len() - self.source.trim_start().len();
        let rest = &self.source[start..];
        let opening = rest.strip_prefix("---")?;
        let opening_line_end = opening.find('\n').unwrap_or(opening.len());
        if !opening[..opening_line_end].trim().is_empty() {
            return None;
        }

        let raw_start = start + 3 + opening_line_end + 1;
        if raw_start > self.source.len() {
            let span = self.span(start, self.source.len());
            self.error(
                ParseErrorKind::UnterminatedConfig,
                "front matter is missing its closing '---'",
                span,
            );
            self.pos = self.source.len();
            return None;
        }

        let close = self.line_starts.iter().copied().find(|&line| {
            line >= raw_start && self.line_text(line).trim_end() == "---"
        });
        let Some(close) = close else {
            let span = self.span(start, raw_start);
            self.error(
                ParseErrorKind::UnterminatedConfig,
                "front matter is missing its closing '---'",
                span,
            );
            self.pos = raw_start;
            return None;
        };

        let raw = self.source[raw_start..close]
            .strip_suffix('\n')
            .map(|s| s.strip_suffix('\r').unwrap_or(s))
            .unwrap_or("")
            .to_string();
        self.pos = close + 3;
        let span = self.span(start, self.pos);

        match decode_front_matter(&raw) {
            Ok(value) => Some(ConfigBlock { raw, value, span }),
            Err(reason) => {
                self.error(ParseErrorKind::InvalidConfig, reason, span);
                None
            }
        }
    }

    fn line_text(&self, line_start: usize) -> &'a str {
        let rest = &self.source[line_start..];
        &rest[..rest.find('\n').unwrap_or(rest.len())]
    }

    // ========================================================================
    // NODE SEQUENCES
    // ========================================================================

    /// Parse nodes until a closer, an `{{:else}}` or the end of input.
    fn parse_nodes(&mut self) -> (Vec<Node>, Stop) {
        let mut nodes = Vec::new();
        let mut text = TextBuffer::default();

        let source = self.source;
        loop {
            let rest = &source[self.pos..];
            let Some(c) = rest.chars().next() else {
                self.flush(&mut nodes, &mut text);
                return (nodes, Stop::Eof);
            };

            // Before markup, `\\` is one backslash and an odd run escapes
            // the markup itself.
            if c == '\\' {
                let run = rest.len() - rest.trim_start_matches('\\').len();
                if let Some(len) = escapable_len(&rest[run..]) {
                    self.trim_next = false;
                    let mut literal = "\\".repeat(run / 2);
                    let consumed = if run % 2 == 1 {
                        literal.push_str(&rest[run..run + len]);
                        run + len
                    } else {
                        run
                    };
                    text.push(self.pos, &literal, consumed);
                    self.pos += consumed;
                    continue;
                }
            }

            if rest.starts_with("{{") {
                self.trim_next = false;
                match self.parse_mustache(&mut text) {
                    Mustache::Skip => {}
                    Mustache::Node(node) => {
                        self.flush(&mut nodes, &mut text);
                        nodes.push(node);
                    }
                    Mustache::Block(node, stop) => {
                        self.flush(&mut nodes, &mut text);
                        nodes.push(node);
                        if let Some(stop) = stop {
                            return (nodes, stop);
                        }
                    }
                    Mustache::Stop(stop) => {
                        self.flush(&mut nodes, &mut text);
                        return (nodes, stop);
                    }
                }
                continue;
            }

            if c == '<' {
                if let Some((name, end)) = self.close_tag_at(self.pos) {
                    self.trim_next = false;
                    let span = self.span(self.pos, end);
                    self.pos = end;
                    if self.open.contains(&Frame::Tag(name)) {
                        self.flush(&mut nodes, &mut text);
                        return (
                            nodes,
                            Stop::Close {
                                frame: Frame::Tag(name),
                                span,
                            },
                        );
                    }
                    self.error(
                        ParseErrorKind::UnbalancedTag,
                        format!("unexpected closing tag </{}>", name),
                        span,
                    );
                    continue;
                }
                if let Some(name) = self.open_tag_at(self.pos) {
                    self.trim_next = false;
                    self.flush(&mut nodes, &mut text);
                    let (node, stop) = self.parse_element(name);
                    nodes.push(node);
                    if let Some(stop) = stop {
                        return (nodes, stop);
                    }
                    continue;
                }
            }

            if rest.starts_with("```") && self.at_line_start(self.pos) {
                self.trim_next = false;
                self.flush(&mut nodes, &mut text);
                if let Some(fence) = self.parse_fence() {
                    nodes.push(Node::Fence(fence));
                }
                continue;
            }

            if self.trim_next && c.is_whitespace() {
                self.pos += c.len_utf8();
                continue;
            }
            self.trim_next = false;
            text.push_char(self.pos, c);
            self.pos += c.len_utf8();
        }
    }

    fn flush(&mut self, nodes: &mut Vec<Node>, text: &mut TextBuffer) {
        if let Some((value, start, end)) = text.take() {
            let span = self.span(start, end);
            nodes.push(Node::Text { value, span });
        }
    }

    // ========================================================================
    // MUSTACHES
    // ========================================================================

    fn parse_mustache(&mut self, text: &mut TextBuffer) -> Mustache {
        let start = self.pos;

        if self.source[start..].starts_with("{{!--") {
            match self.source[start + 5..].find("--}}") {
                Some(offset) => self.pos = start + 5 + offset + 4,
                None => {
                    let span = self.span(start, self.source.len());
                    self.error(
                        ParseErrorKind::UnterminatedExpression,
                        "unterminated comment",
                        span,
                    );
                    self.pos = self.source.len();
                }
            }
            return Mustache::Skip;
        }

        let mut cursor = start + 2;
        if self.source[cursor..].starts_with('-') {
            cursor += 1;
            text.trim_end();
        }
        cursor = self.skip_whitespace(cursor);

        let sigil = self.source[cursor..].chars().next();
        match sigil {
            Some('#') => {
                let (word, after) = self.read_word(cursor + 1);
                match word {
                    "if" => self.parse_if(start, after),
                    "each" => self.parse_each(start, after),
                    _ => {
                        let _ = self.lex_to_close(start, after);
                        let span = self.span(start, self.pos);
                        self.error(
                            ParseErrorKind::UnbalancedTag,
                            format!("unknown block '{{{{#{}}}}}'", word),
                            span,
                        );
                        Mustache::Skip
                    }
                }
            }
            Some(':') => self.parse_else(start, cursor + 1),
            Some('/') => self.parse_block_close(start, cursor + 1),
            _ => {
                let Some((tokens, _)) = self.lex_to_close(start, cursor) else {
                    return Mustache::Skip;
                };
                let span = self.span(start, self.pos);
                match ExpressionParser::new(tokens).parse_complete() {
                    Ok(expression) => Mustache::Node(Node::Expression { expression, span }),
                    Err(err) => {
                        self.errors.push(err);
                        Mustache::Skip
                    }
                }
            }
        }
    }

    /// Lex from `from` to the closing `}}` of the mustache that opened at
    /// `start`, leaving `self.pos` after it. Returns `None` (after recording
    /// an error) when the mustache never closes.
    fn lex_to_close(&mut self, start: usize, from: usize) -> Option<(Vec<Token>, bool)> {
        let (line, column) = self.location(from);
        let tokens = Lexer::at(self.source, from, line, column).tokenize_mustache();
        match tokens.last().map(|t| (&t.kind, t.span.end)) {
            Some((TokenKind::Close { trim }, end)) => {
                let trim = *trim;
                self.pos = end;
                if trim {
                    self.trim_next = true;
                }
                Some((tokens, trim))
            }
            _ => {
                let span = self.span(start, self.source.len());
                self.error(
                    ParseErrorKind::UnterminatedExpression,
                    "expression is missing its closing '}}'",
                    span,
                );
                self.pos = match self.source[start + 2..].find("}}") {
                    Some(offset) => start + 2 + offset + 2,
                    None => self.source.len(),
                };
                None
            }
        }
    }

    fn parse_if(&mut self, start: usize, from: usize) -> Mustache {
        let mut test = self.parse_header_expression(start, from);
        let opener_end = self.pos;

        self.open.push(Frame::If);
        let mut branches = Vec::new();
        let mut alternate: Option<Vec<Node>> = None;
        let mut leftover = None;

        loop {
            let (children, stop) = self.parse_nodes();
            if alternate.is_some() {
                if let Some(nodes) = alternate.as_mut() {
                    nodes.extend(children);
                }
            } else {
                branches.push(IfBranch {
                    test: test.clone(),
                    children,
                });
            }

            match stop {
                Stop::Else { condition, span } => {
                    if alternate.is_some() {
                        self.error(
                            ParseErrorKind::UnbalancedTag,
                            "{{:else}} after the final {{:else}}",
                            span,
                        );
                        continue;
                    }
                    match condition {
                        Some(condition) => test = condition,
                        None => alternate = Some(Vec::new()),
                    }
                }
                Stop::Close {
                    frame: Frame::If, ..
                } => break,
                other => {
                    self.unclosed(Frame::If, start, opener_end);
                    leftover = Some(other);
                    break;
                }
            }
        }
        self.open.pop();

        let span = self.span(start, self.pos);
        Mustache::Block(
            Node::If(IfBlock {
                branches,
                alternate,
                span,
            }),
            leftover,
        )
    }

    fn parse_each(&mut self, start: usize, from: usize) -> Mustache {
        let header = self.lex_to_close(start, from);
        let opener_end = self.pos;
        let placeholder = || Expression::Literal {
            value: Literal::Undefined,
            span: Span::default(),
        };

        let (iterable, item, index) = match header {
            Some((tokens, _)) => match parse_each_header(tokens) {
                Ok(header) => header,
                Err(err) => {
                    self.errors.push(err);
                    (placeholder(), "item".to_string(), None)
                }
            },
            None => (placeholder(), "item".to_string(), None),
        };

        self.open.push(Frame::Each);
        let (body, mut stop) = self.parse_nodes();
        let mut alternate = None;

        if let Stop::Else { condition, span } = stop {
            if condition.is_some() {
                self.error(
                    ParseErrorKind::UnbalancedTag,
                    "{{:else if}} is not allowed inside {{#each}}",
                    span,
                );
            }
            let (nodes, next) = self.parse_nodes();
            alternate = Some(nodes);
            stop = next;
            while let Stop::Else { span, .. } = stop {
                self.error(
                    ParseErrorKind::UnbalancedTag,
                    "{{:else}} after the final {{:else}}",
                    span,
                );
                let (nodes, next) = self.parse_nodes();
                if let Some(alt) = alternate.as_mut() {
                    alt.extend(nodes);
                }
                stop = next;
            }
        }
        self.open.pop();

        let leftover = match stop {
            Stop::Close {
                frame: Frame::Each, ..
            } => None,
            other => {
                self.unclosed(Frame::Each, start, opener_end);
                Some(other)
            }
        };

        let span = self.span(start, self.pos);
        Mustache::Block(
            Node::Each(EachBlock {
                iterable,
                item,
                index,
                body,
                alternate,
                span,
            }),
            leftover,
        )
    }

    fn parse_else(&mut self, start: usize, from: usize) -> Mustache {
        let (word, after) = self.read_word(from);
        let Some((tokens, _)) = self.lex_to_close(start, after) else {
            return Mustache::Skip;
        };
        let span = self.span(start, self.pos);

        if word != "else" {
            self.error(
                ParseErrorKind::UnbalancedTag,
                format!("unknown block '{{{{:{}}}}}'", word),
                span,
            );
            return Mustache::Skip;
        }

        let in_block = matches!(self.open.last(), Some(Frame::If) | Some(Frame::Each));
        if !in_block {
            self.error(
                ParseErrorKind::UnbalancedTag,
                "{{:else}} outside of {{#if}} or {{#each}}",
                span,
            );
            return Mustache::Skip;
        }

        let mut parser = ExpressionParser::new(tokens);
        let condition = match parser.current().kind.clone() {
            TokenKind::Identifier(name) if name == "if" => {
                parser.advance();
                match parser.parse_complete() {
                    Ok(expression) => Some(expression),
                    Err(err) => {
                        self.errors.push(err);
                        Some(Expression::Literal {
                            value: Literal::Undefined,
                            span: Span::default(),
                        })
                    }
                }
            }
            _ => {
                if !parser.at_end() {
                    self.errors.push(parser.unexpected("'}}' or 'if'"));
                }
                None
            }
        };
        Mustache::Stop(Stop::Else { condition, span })
    }

    fn parse_block_close(&mut self, start: usize, from: usize) -> Mustache {
        let (word, after) = self.read_word(from);
        let Some((tokens, _)) = self.lex_to_close(start, after) else {
            return Mustache::Skip;
        };
        let span = self.span(start, self.pos);

        let frame = match word {
            "if" => Frame::If,
            "each" => Frame::Each,
            _ => {
                self.error(
                    ParseErrorKind::UnbalancedTag,
                    format!("unknown block '{{{{/{}}}}}'", word),
                    span,
                );
                return Mustache::Skip;
            }
        };
        let parser = ExpressionParser::new(tokens);
        if !parser.at_end() {
            self.errors.push(parser.unexpected("'}}'"));
        }

        if self.open.contains(&frame) {
            Mustache::Stop(Stop::Close { frame, span })
        } else {
            self.error(
                ParseErrorKind::UnbalancedTag,
                format!("unexpected {{{{/{}}}}}", word),
                span,
            );
            Mustache::Skip
        }
    }

    /// Parse `{{#if <expr>}}`; on failure the test becomes `undefined` so the
    /// block still pairs with its closer.
    fn parse_header_expression(&mut self, start: usize, from: usize) -> Expression {
        let placeholder = Expression::Literal {
            value: Literal::Undefined,
            span: Span::default(),
        };
        let Some((tokens, _)) = self.lex_to_close(start, from) else {
            return placeholder;
        };
        match ExpressionParser::new(tokens).parse_complete() {
            Ok(expression) => expression,
            Err(err) => {
                self.errors.push(err);
                placeholder
            }
        }
    }

    fn unclosed(&mut self, frame: Frame, start: usize, opener_end: usize) {
        let span = self.span(start, opener_end);
        self.error(
            ParseErrorKind::UnbalancedTag,
            format!("{} is never closed", frame.describe()),
            span,
        );
    }

    // ========================================================================
    // ELEMENTS
    // ========================================================================

    fn parse_element(&mut self, name: TagName) -> (Node, Option<Stop>) {
        let start = self.pos;
        self.pos += 1 + name.as_str().len();

        let mut attributes: Vec<Attribute> = Vec::new();
        let mut self_closing = false;

        loop {
            self.pos = self.skip_whitespace(self.pos);
            let rest = &self.source[self.pos..];
            if rest.starts_with("/>") {
                self.pos += 2;
                self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break;
            }
            if rest.is_empty() {
                let span = self.span(start, self.pos);
                self.error(
                    ParseErrorKind::UnbalancedTag,
                    format!("<{}> tag is never finished", name),
                    span,
                );
                self_closing = true;
                break;
            }

            match self.parse_attribute() {
                Ok(attribute) => {
                    if attributes.iter().any(|a| a.name == attribute.name) {
                        self.error(
                            ParseErrorKind::InvalidAttribute,
                            format!("duplicate attribute '{}'", attribute.name),
                            attribute.span,
                        );
                    } else {
                        attributes.push(attribute);
                    }
                }
                Err(err) => {
                    self.errors.push(err);
                    // Resynchronise at the end of the tag.
                    match self.source[self.pos..].find('>') {
                        Some(offset) => {
                            self_closing = self.source[..self.pos + offset].ends_with('/');
                            self.pos += offset + 1;
                        }
                        None => {
                            self.pos = self.source.len();
                            self_closing = true;
                        }
                    }
                    break;
                }
            }
        }

        let opener_end = self.pos;
        if self_closing {
            let span = self.span(start, self.pos);
            return (
                Node::Element(Element {
                    name,
                    attributes,
                    children: Vec::new(),
                    self_closing: true,
                    span,
                }),
                None,
            );
        }

        self.open.push(Frame::Tag(name));
        let (children, stop) = self.parse_nodes();
        self.open.pop();

        let leftover = match stop {
            Stop::Close {
                frame: Frame::Tag(closed),
                ..
            } if closed == name => None,
            other => {
                self.unclosed(Frame::Tag(name), start, opener_end);
                Some(other)
            }
        };

        let span = self.span(start, self.pos);
        (
            Node::Element(Element {
                name,
                attributes,
                children,
                self_closing: false,
                span,
            }),
            leftover,
        )
    }

    fn parse_attribute(&mut self) -> Result<Attribute, ParseError> {
        let start = self.pos;
        let name_len = self.source[start..]
            .find(|c: char| !is_attribute_name_char(c))
            .unwrap_or(self.source.len() - start);
        if name_len == 0 {
            let span = self.span(start, start + 1);
            return Err(ParseError::new(
                ParseErrorKind::InvalidAttribute,
                "expected attribute name",
                span,
            ));
        }
        let name = self.source[start..start + name_len].to_string();
        self.pos = start + name_len;

        let after_name = self.skip_whitespace(self.pos);
        if !self.source[after_name..].starts_with('=') {
            return Ok(Attribute {
                name,
                value: AttributeValue::Flag,
                span: self.span(start, self.pos),
            });
        }
        self.pos = self.skip_whitespace(after_name + 1);

        let rest = &self.source[self.pos..];
        let value = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let Some(len) = rest[1..].find(quote) else {
                    let span = self.span(start, self.source.len());
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidAttribute,
                        format!("unterminated value for attribute '{}'", name),
                        span,
                    ));
                };
                let value = rest[1..1 + len].to_string();
                self.pos += len + 2;
                AttributeValue::Literal(value)
            }
            Some('{') if rest.starts_with("{{") => {
                let mustache_start = self.pos;
                let from = self.skip_whitespace(mustache_start + 2);
                let Some((tokens, _)) = self.lex_to_close(mustache_start, from) else {
                    let span = self.span(start, self.pos);
                    return Err(ParseError::new(
                        ParseErrorKind::InvalidAttribute,
                        format!("unterminated value for attribute '{}'", name),
                        span,
                    ));
                };
                self.trim_next = false;
                AttributeValue::Expression(ExpressionParser::new(tokens).parse_complete()?)
            }
            _ => {
                let span = self.span(start, self.pos);
                return Err(ParseError::new(
                    ParseErrorKind::InvalidAttribute,
                    format!(
                        "value of attribute '{}' must be quoted or a {{{{ expression }}}}",
                        name
                    ),
                    span,
                ));
            }
        };

        Ok(Attribute {
            name,
            value,
            span: self.span(start, self.pos),
        })
    }

    fn open_tag_at(&self, at: usize) -> Option<TagName> {
        open_tag(self.source.get(at..)?)
    }

    /// Known closing tag at `at`; returns the tag and the offset after `>`.
    fn close_tag_at(&self, at: usize) -> Option<(TagName, usize)> {
        close_tag(self.source.get(at..)?).map(|(name, len)| (name, at + len))
    }

    // ========================================================================
    // FENCES
    // ========================================================================

    fn parse_fence(&mut self) -> Option<Fence> {
        let start = self.pos;
        let after_ticks = start + 3;
        let Some(info_len) = self.source[after_ticks..].find('\n') else {
            return self.unterminated_fence(start);
        };
        let info = self.source[after_ticks..after_ticks + info_len].to_string();
        let body_start = after_ticks + info_len + 1;

        let close = self
            .line_starts
            .iter()
            .copied()
            .find(|&line| line >= body_start && self.source[line..].starts_with("```"));
        let Some(close) = close else {
            return self.unterminated_fence(start);
        };

        let body = self.source[body_start..close].to_string();
        self.pos = close + 3;
        Some(Fence {
            info,
            body,
            span: self.span(start, self.pos),
        })
    }

    fn unterminated_fence(&mut self, start: usize) -> Option<Fence> {
        let span = self.span(start, self.source.len());
        self.error(
            ParseErrorKind::UnterminatedFence,
            "code fence is never closed",
            span,
        );
        self.pos = self.source.len();
        None
    }

    // ========================================================================
    // POSITIONS
    // ========================================================================

    fn at_line_start(&self, at: usize) -> bool {
        at == 0 || self.source.as_bytes().get(at - 1) == Some(&b'\n')
    }

    fn skip_whitespace(&self, from: usize) -> usize {
        let rest = &self.source[from..];
        from + (rest.len() - rest.trim_start().len())
    }

    fn read_word(&self, from: usize) -> (&'a str, usize) {
        let rest = &self.source[from..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        (&self.source[from..from + len], from + len)
    }

    /// 1-based line and column (in characters) of a byte offset.
    fn location(&self, offset: usize) -> (usize, usize) {
        let line = self.line_starts.partition_point(|&s| s <= offset).max(1);
        let line_start = self.line_starts[line - 1];
        let column = self.source[line_start..offset].chars().count() + 1;
        (line, column)
    }

    fn span(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.location(start);
        Span::new(start, end, line, column)
    }

    fn error(&mut self, kind: ParseErrorKind, message: impl Into<String>, span: Span) {
        self.errors.push(ParseError::new(kind, message, span));
    }
}

// ============================================================================
// HELPERS
// ============================================================================

enum Mustache {
    /// Comment, error, or anything else that produces no node.
    Skip,
    Node(Node),
    /// A block node plus a stop that belongs to an enclosing construct.
    Block(Node, Option<Stop>),
    Stop(Stop),
}

/// Pending literal text and the source range it came from.
#[derive(Default)]
struct TextBuffer {
    value: String,
    start: Option<usize>,
    end: usize,
}

impl TextBuffer {
    /// Append `s`, which stood for `consumed` bytes of source at `at`.
    fn push(&mut self, at: usize, s: &str, consumed: usize) {
        self.start.get_or_insert(at);
        self.value.push_str(s);
        self.end = at + consumed;
    }

    fn push_char(&mut self, at: usize, c: char) {
        self.push(at, c.encode_utf8(&mut [0; 4]), c.len_utf8());
    }

    fn trim_end(&mut self) {
        let len = self.value.trim_end().len();
        self.value.truncate(len);
    }

    fn take(&mut self) -> Option<(String, usize, usize)> {
        let start = self.start.take()?;
        let value = std::mem::take(&mut self.value);
        if value.is_empty() {
            None
        } else {
            Some((value, start, self.end))
        }
    }
}

fn is_attribute_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}

/// Known tag opened at the start of `s` (`<name` followed by whitespace,
/// `>` or `/`).
fn open_tag(s: &str) -> Option<TagName> {
    let rest = s.strip_prefix('<')?;
    let (name, len) = tag_name_prefix(rest)?;
    match rest[len..].chars().next() {
        Some(c) if c.is_whitespace() || c == '>' || c == '/' => Some(name),
        _ => None,
    }
}

/// Known closing tag at the start of `s`, with its length through `>`.
fn close_tag(s: &str) -> Option<(TagName, usize)> {
    let rest = s.strip_prefix("</")?;
    let (name, len) = tag_name_prefix(rest)?;
    let after = &rest[len..];
    let trimmed = after.trim_start();
    if !trimmed.starts_with('>') {
        return None;
    }
    Some((name, 2 + len + (after.len() - trimmed.len()) + 1))
}

/// Length of the markup opener at the start of `s` that a backslash
/// escapes: `{{` or the `<` of a known tag.
pub(crate) fn escapable_len(s: &str) -> Option<usize> {
    if s.starts_with("{{") {
        Some(2)
    } else if open_tag(s).is_some() || close_tag(s).is_some() {
        Some(1)
    } else {
        None
    }
}

/// Longest known tag name at the start of `s`.
fn tag_name_prefix(s: &str) -> Option<(TagName, usize)> {
    TagName::ALL
        .iter()
        .filter(|tag| s.starts_with(tag.as_str()))
        .max_by_key(|tag| tag.as_str().len())
        .map(|tag| (*tag, tag.as_str().len()))
}

fn parse_each_header(
    tokens: Vec<Token>,
) -> Result<(Expression, String, Option<String>), ParseError> {
    let mut parser = ExpressionParser::new(tokens);
    let iterable = parser.parse_expression()?;

    match parser.current().kind.clone() {
        TokenKind::Identifier(word) if word == "as" => {
            parser.advance();
        }
        _ => return Err(parser.unexpected("'as'")),
    }
    let (item, _) = parser.expect_identifier("loop variable name")?;
    let index = if parser.eat(&TokenKind::Comma) {
        Some(parser.expect_identifier("index variable name")?.0)
    } else {
        None
    };
    if !parser.at_end() {
        return Err(parser.unexpected("'}}'"));
    }
    Ok((iterable, item, index))
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Parse a document, failing with every error found.
pub fn parse(source: &str) -> Result<Document, ParseErrors> {
    let (document, errors) = parse_with_diagnostics(source);
    if errors.is_empty() {
        Ok(document)
    } else {
        Err(ParseErrors(errors))
    }
}

/// Parse a document, keeping the partial tree alongside any errors.
pub fn parse_with_diagnostics(source: &str) -> (Document, Vec<ParseError>) {
    Parser::new(source).parse_document()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(source: &str) -> Vec<Node> {
        match parse(source) {
            Ok(document) => document.nodes,
            Err(errors) => panic!("unexpected parse errors: {}", errors),
        }
    }

    fn errors(source: &str) -> Vec<ParseError> {
        match parse(source) {
            Ok(_) => panic!("expected parse errors for {:?}", source),
            Err(errors) => errors.0,
        }
    }

    fn text(node: &Node) -> &str {
        match node {
            Node::Text { value, .. } => value,
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_text_and_placeholder() {
        let nodes = nodes("Hello {{ name }}!");
        assert_eq!(nodes.len(), 3);
        assert_eq!(text(&nodes[0]), "Hello ");
        assert!(matches!(
            &nodes[1],
            Node::Expression { expression: Expression::Identifier { name, .. }, .. } if name == "name"
        ));
        assert_eq!(text(&nodes[2]), "!");
    }

    #[test]
    fn test_spans_carry_line_and_column() {
        let nodes = nodes("line one\n  {{ x }}");
        let span = nodes[1].span();
        assert_eq!((span.line, span.column), (2, 3));
        assert_eq!(span.start, 11);
        assert_eq!(span.end, 18);
        assert_eq!(nodes[0].span(), Span::new(0, 11, 1, 1));
    }

    #[test]
    fn test_front_matter() {
        let document = parse("---\nmodel: gpt-4\n---\nHi").expect("valid document");
        let config = document.config().expect("config block");
        assert_eq!(config.raw, "model: gpt-4");
        assert_eq!(config.value["model"], "gpt-4");
        assert_eq!(text(&document.nodes[1]), "\nHi");
        assert_eq!(
            document.prompt_config().expect("typed").model.as_deref(),
            Some("gpt-4")
        );
    }

    #[test]
    fn test_front_matter_errors() {
        let errs = errors("---\nmodel: gpt-4\nHi");
        assert_eq!(errs[0].kind, ParseErrorKind::UnterminatedConfig);

        let errs = errors("---\n- a\n- b\n---\n");
        assert_eq!(errs[0].kind, ParseErrorKind::InvalidConfig);
    }

    #[test]
    fn test_if_else_chain() {
        let nodes = nodes("{{#if a}}A{{:else if b}}B{{:else}}C{{/if}}");
        let Node::If(block) = &nodes[0] else {
            panic!("expected if block");
        };
        assert_eq!(block.branches.len(), 2);
        assert_eq!(text(&block.branches[1].children[0]), "B");
        let alternate = block.alternate.as_ref().expect("else branch");
        assert_eq!(text(&alternate[0]), "C");
    }

    #[test]
    fn test_each_with_index_and_else() {
        let nodes = nodes("{{#each items as item, i}}{{ i }}{{:else}}none{{/each}}");
        let Node::Each(block) = &nodes[0] else {
            panic!("expected each block");
        };
        assert_eq!(block.item, "item");
        assert_eq!(block.index.as_deref(), Some("i"));
        assert_eq!(block.body.len(), 1);
        assert_eq!(text(&block.alternate.as_ref().expect("else")[0]), "none");
    }

    #[test]
    fn test_each_header_requires_as() {
        let errs = errors("{{#each items}}x{{/each}}");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ParseErrorKind::InvalidExpression);
    }

    #[test]
    fn test_elements_and_attributes() {
        let nodes = nodes(r#"<step as="answer" json model='gpt-4o' temperature={{ t }}>Q</step>"#);
        let Node::Element(element) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(element.name, TagName::Step);
        assert_eq!(element.attributes.len(), 4);
        assert_eq!(
            element.attribute("as").map(|a| &a.value),
            Some(&AttributeValue::Literal("answer".to_string()))
        );
        assert_eq!(
            element.attribute("json").map(|a| &a.value),
            Some(&AttributeValue::Flag)
        );
        assert!(matches!(
            element.attribute("temperature").map(|a| &a.value),
            Some(AttributeValue::Expression(_))
        ));
        assert_eq!(text(&element.children[0]), "Q");
    }

    #[test]
    fn test_self_closing_element() {
        let nodes = nodes(r#"<assistant><tool-call id="1" name="f" arguments={{ {a: 1} }} /></assistant>"#);
        let Node::Element(assistant) = &nodes[0] else {
            panic!("expected element");
        };
        let Node::Element(call) = &assistant.children[0] else {
            panic!("expected tool-call");
        };
        assert_eq!(call.name, TagName::ToolCall);
        assert!(call.self_closing);
        assert_eq!(call.attributes.len(), 3);
    }

    #[test]
    fn test_unknown_tags_are_text() {
        let nodes = nodes("<b>bold</b> and <users>");
        assert_eq!(nodes.len(), 1);
        assert_eq!(text(&nodes[0]), "<b>bold</b> and <users>");
    }

    #[test]
    fn test_escapes() {
        let nodes = nodes(r"literal \{{ x }} and \<user>");
        assert_eq!(nodes.len(), 1);
        assert_eq!(text(&nodes[0]), "literal {{ x }} and <user>");
    }

    #[test]
    fn test_backslash_runs_before_markup() {
        let live = nodes(r"a\\{{ x }}");
        assert_eq!(live.len(), 2);
        assert_eq!(text(&live[0]), r"a\");
        assert!(matches!(live[1], Node::Expression { .. }));

        let escaped = nodes(r"a\\\{{ x }} \\\</user> C:\\dir");
        assert_eq!(escaped.len(), 1);
        assert_eq!(text(&escaped[0]), r"a\{{ x }} \</user> C:\\dir");
    }

    #[test]
    fn test_comments_are_dropped() {
        let nodes = nodes("a{{!-- note: {{ x }} --}}b");
        assert_eq!(nodes.len(), 1);
        assert_eq!(text(&nodes[0]), "ab");
    }

    #[test]
    fn test_trim_modifiers() {
        let nodes = nodes("a   {{- x -}}   b");
        assert_eq!(text(&nodes[0]), "a");
        assert_eq!(text(&nodes[2]), "b");
    }

    #[test]
    fn test_fence_is_verbatim() {
        let nodes = nodes("Code:\n```js\nconst a = {{ b }};\n<user>\n```\ndone");
        assert_eq!(text(&nodes[0]), "Code:\n");
        let Node::Fence(fence) = &nodes[1] else {
            panic!("expected fence");
        };
        assert_eq!(fence.info, "js");
        assert_eq!(fence.body, "const a = {{ b }};\n<user>\n");
        assert_eq!(text(&nodes[2]), "\ndone");
    }

    #[test]
    fn test_unterminated_fence() {
        let errs = errors("```\nno end");
        assert_eq!(errs[0].kind, ParseErrorKind::UnterminatedFence);
    }

    #[test]
    fn test_unclosed_block_reports_unbalanced() {
        let errs = errors("{{#if a}}never closed");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ParseErrorKind::UnbalancedTag);
        assert_eq!(errs[0].span.start, 0);
    }

    #[test]
    fn test_stray_closers() {
        let errs = errors("text {{/if}} more </user>");
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| e.kind == ParseErrorKind::UnbalancedTag));
    }

    #[test]
    fn test_mismatched_nesting_recovers() {
        let (document, errs) = parse_with_diagnostics("<user>{{#if a}}x</user>after");
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.contains("{{#if}}"));
        // `</user>` still closes the element.
        assert!(matches!(document.nodes[0], Node::Element(_)));
        assert_eq!(text(&document.nodes[1]), "after");
    }

    #[test]
    fn test_all_errors_are_collected() {
        let errs = errors("{{ 1 + }} ok {{ a b }} <user bad=unquoted>x</user> {{#each}}{{/each}}");
        let kinds: Vec<_> = errs.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ParseErrorKind::InvalidExpression,
                ParseErrorKind::InvalidExpression,
                ParseErrorKind::InvalidAttribute,
                ParseErrorKind::InvalidExpression,
            ]
        );
    }

    #[test]
    fn test_unterminated_expression() {
        let errs = errors("Hello {{ name");
        assert_eq!(errs[0].kind, ParseErrorKind::UnterminatedExpression);
    }

    #[test]
    fn test_else_outside_block() {
        let errs = errors("<user>{{:else}}</user>");
        assert_eq!(errs[0].kind, ParseErrorKind::UnbalancedTag);
    }

    #[test]
    fn test_digest_is_sha256_of_source() {
        let document = parse("").expect("empty document");
        assert_eq!(
            document.digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(document.nodes.is_empty());
    }
}
