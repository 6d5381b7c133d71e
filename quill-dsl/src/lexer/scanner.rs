//! Lexer implementation

use super::token::*;

// ============================================================================
// LEXER IMPLEMENTATION
// ============================================================================

/// Lexer for the expression language found between `{{` and `}}`.
///
/// The lexer works on the whole document so spans are document-absolute; it
/// can be started at any offset and stops producing useful tokens once the
/// mustache closes.
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    brace_depth: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        Self::at(source, 0, 1, 1)
    }

    /// Create a lexer that starts at byte `pos`, which sits on `line`/`column`.
    pub fn at(source: &'a str, pos: usize, line: usize, column: usize) -> Self {
        Self {
            source,
            pos: pos.min(source.len()),
            line,
            column,
            brace_depth: 0,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(&mut self) -> Vec<Token> {
        self.collect_until(|_| false)
    }

    /// Tokenize up to and including the token that closes the current
    /// mustache. The last token is either [`TokenKind::Close`] or
    /// [`TokenKind::Eof`].
    pub fn tokenize_mustache(&mut self) -> Vec<Token> {
        self.collect_until(|kind| matches!(kind, TokenKind::Close { .. }))
    }

    fn collect_until(&mut self, stop: impl Fn(&TokenKind) -> bool) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof || stop(&token.kind);
            tokens.push(token);
            if done {
                break;
            }
        }

        tokens
    }

    /// Get the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let start_pos = self.pos;
        let start_line = self.line;
        let start_col = self.column;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '{' => {
                    self.advance();
                    self.brace_depth += 1;
                    TokenKind::LBrace
                }
                '}' => {
                    if self.brace_depth == 0 && self.rest().starts_with("}}") {
                        self.advance_n(2);
                        TokenKind::Close { trim: false }
                    } else {
                        self.advance();
                        self.brace_depth = self.brace_depth.saturating_sub(1);
                        TokenKind::RBrace
                    }
                }
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                '~' => self.single(TokenKind::Tilde),

                '.' => {
                    if self.rest().starts_with("...") {
                        self.advance_n(3);
                        TokenKind::Ellipsis
                    } else if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
                        self.scan_number()
                    } else {
                        self.single(TokenKind::Dot)
                    }
                }

                '?' => {
                    if self.rest().starts_with("??=") {
                        self.advance_n(3);
                        TokenKind::QuestionQuestionAssign
                    } else if self.rest().starts_with("??") {
                        self.advance_n(2);
                        TokenKind::QuestionQuestion
                    } else if self.rest().starts_with("?.")
                        && !self.peek_nth(2).is_some_and(|c| c.is_ascii_digit())
                    {
                        // `a?.5:b` is a conditional, not optional chaining
                        self.advance_n(2);
                        TokenKind::QuestionDot
                    } else {
                        self.single(TokenKind::Question)
                    }
                }

                '-' => {
                    if self.brace_depth == 0 && self.rest().starts_with("-}}") {
                        self.advance_n(3);
                        TokenKind::Close { trim: true }
                    } else {
                        self.operator(&[
                            ("--", TokenKind::MinusMinus),
                            ("-=", TokenKind::MinusAssign),
                            ("-", TokenKind::Minus),
                        ])
                    }
                }

                '+' => self.operator(&[
                    ("++", TokenKind::PlusPlus),
                    ("+=", TokenKind::PlusAssign),
                    ("+", TokenKind::Plus),
                ]),
                '*' => self.operator(&[
                    ("**=", TokenKind::StarStarAssign),
                    ("**", TokenKind::StarStar),
                    ("*=", TokenKind::StarAssign),
                    ("*", TokenKind::Star),
                ]),
                '/' => self.operator(&[("/=", TokenKind::SlashAssign), ("/", TokenKind::Slash)]),
                '%' => self.operator(&[
                    ("%=", TokenKind::PercentAssign),
                    ("%", TokenKind::Percent),
                ]),
                '=' => self.operator(&[
                    ("===", TokenKind::EqEqEq),
                    ("==", TokenKind::EqEq),
                    ("=", TokenKind::Assign),
                ]),
                '!' => self.operator(&[
                    ("!==", TokenKind::NotEqEq),
                    ("!=", TokenKind::NotEq),
                    ("!", TokenKind::Bang),
                ]),
                '<' => self.operator(&[
                    ("<<=", TokenKind::ShlAssign),
                    ("<<", TokenKind::Shl),
                    ("<=", TokenKind::Le),
                    ("<", TokenKind::Lt),
                ]),
                '>' => self.operator(&[
                    (">>>=", TokenKind::UShrAssign),
                    (">>>", TokenKind::UShr),
                    (">>=", TokenKind::ShrAssign),
                    (">>", TokenKind::Shr),
                    (">=", TokenKind::Ge),
                    (">", TokenKind::Gt),
                ]),
                '&' => self.operator(&[
                    ("&&=", TokenKind::AndAndAssign),
                    ("&&", TokenKind::AndAnd),
                    ("&=", TokenKind::AmpAssign),
                    ("&", TokenKind::Amp),
                ]),
                '|' => self.operator(&[
                    ("||=", TokenKind::OrOrAssign),
                    ("||", TokenKind::OrOr),
                    ("|=", TokenKind::PipeAssign),
                    ("|", TokenKind::Pipe),
                ]),
                '^' => self.operator(&[("^=", TokenKind::CaretAssign), ("^", TokenKind::Caret)]),

                '"' | '\'' => self.scan_string(c),

                c if c.is_ascii_digit() => self.scan_number(),

                c if is_identifier_start(c) => self.scan_identifier(),

                c => {
                    self.advance();
                    TokenKind::Error(format!("Unexpected character: {}", c))
                }
            },
        };

        Token {
            kind,
            span: Span {
                start: start_pos,
                end: self.pos,
                line: start_line,
                column: start_col,
            },
        }
    }

    /// Byte offset of the next unread character.
    pub fn position(&self) -> (usize, usize, usize) {
        (self.pos, self.line, self.column)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Longest-match over `candidates`, which must be ordered longest first.
    fn operator(&mut self, candidates: &[(&str, TokenKind)]) -> TokenKind {
        for (text, kind) in candidates {
            if self.rest().starts_with(text) {
                self.advance_n(text.chars().count());
                return kind.clone();
            }
        }
        let c = self.advance().unwrap_or('\0');
        TokenKind::Error(format!("Unexpected character: {}", c))
    }

    /// Scan an identifier or keyword.
    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            if is_identifier_part(c) {
                self.advance();
            } else {
                break;
            }
        }

        match &self.source[start..self.pos] {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "undefined" => TokenKind::Undefined,
            "typeof" => TokenKind::Typeof,
            "void" => TokenKind::Void,
            "in" => TokenKind::In,
            ident => TokenKind::Identifier(ident.to_string()),
        }
    }

    /// Scan a single or double quoted string literal.
    fn scan_string(&mut self, quote: char) -> TokenKind {
        self.advance(); // opening quote
        let mut value = String::new();

        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return TokenKind::Error("Unterminated string literal".to_string());
                }
                Some(c) if c == quote => {
                    self.advance();
                    return TokenKind::String(value);
                }
                Some('\\') => {
                    self.advance();
                    match self.scan_escape() {
                        Ok(Some(c)) => value.push(c),
                        Ok(None) => {}
                        Err(msg) => return TokenKind::Error(msg),
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Decode the escape after a backslash. `Ok(None)` is a line continuation.
    fn scan_escape(&mut self) -> Result<Option<char>, String> {
        let c = match self.advance() {
            Some(c) => c,
            None => return Err("Unterminated string literal".to_string()),
        };
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' if !self.peek_char().is_some_and(|c| c.is_ascii_digit()) => '\0',
            '\n' => return Ok(None),
            'x' => {
                let code = self.scan_hex_digits(2)?;
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            'u' => {
                let code = self.scan_unicode_escape()?;
                if (0xD800..0xDC00).contains(&code) && self.rest().starts_with("\\u") {
                    // Surrogate pair written as two escapes
                    let save = (self.pos, self.line, self.column);
                    self.advance_n(2);
                    let low = self.scan_unicode_escape()?;
                    if (0xDC00..0xE000).contains(&low) {
                        let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                        return Ok(Some(
                            char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER),
                        ));
                    }
                    (self.pos, self.line, self.column) = save;
                }
                char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
            other => other,
        };
        Ok(Some(decoded))
    }

    fn scan_unicode_escape(&mut self) -> Result<u32, String> {
        if self.peek_char() == Some('{') {
            self.advance();
            let start = self.pos;
            while self.peek_char().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let digits = &self.source[start..self.pos];
            if self.peek_char() != Some('}') || digits.is_empty() {
                return Err("Invalid unicode escape".to_string());
            }
            self.advance();
            u32::from_str_radix(digits, 16).map_err(|_| "Invalid unicode escape".to_string())
        } else {
            self.scan_hex_digits(4)
        }
    }

    fn scan_hex_digits(&mut self, count: usize) -> Result<u32, String> {
        let start = self.pos;
        for _ in 0..count {
            match self.peek_char() {
                Some(c) if c.is_ascii_hexdigit() => {
                    self.advance();
                }
                _ => return Err("Invalid hexadecimal escape".to_string()),
            }
        }
        u32::from_str_radix(&self.source[start..self.pos], 16)
            .map_err(|_| "Invalid hexadecimal escape".to_string())
    }

    /// Scan a numeric literal: decimal, `.5`, exponent, or `0x`/`0o`/`0b`.
    fn scan_number(&mut self) -> TokenKind {
        let start = self.pos;

        if self.peek_char() == Some('0') {
            let radix = match self.peek_nth(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.advance_n(2);
                let digits_start = self.pos;
                while self.peek_char().is_some_and(|c| c.is_digit(radix)) {
                    self.advance();
                }
                let digits = &self.source[digits_start..self.pos];
                return match u64::from_str_radix(digits, radix) {
                    Ok(n) => TokenKind::Number(n as f64),
                    Err(_) => TokenKind::Error(format!(
                        "Invalid number: {}",
                        &self.source[start..self.pos]
                    )),
                };
            }
        }

        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek_char() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.advance();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let signed = matches!(self.peek_nth(1), Some('+') | Some('-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_nth(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.advance_n(digit_at);
                while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let text = &self.source[start..self.pos];
        if self.peek_char().is_some_and(is_identifier_start) {
            return TokenKind::Error(format!("Invalid number: {}", text));
        }
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Error(format!("Invalid number: {}", text)),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }
}

pub fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

pub fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// True if `name` lexes as a single plain identifier (not a keyword).
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_part);
    valid
        && !matches!(
            name,
            "true" | "false" | "null" | "undefined" | "typeof" | "void" | "in"
        )
}
