use super::ast::Span;
use super::error::DslError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Punct,
    /// Quoted literal. `text` holds the unescaped content without quotes.
    String,
    /// Numeric literal. `text` holds the raw source spelling.
    Number,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    /// Bracket nesting level. An opening bracket and its matching closer
    /// carry the same depth.
    pub depth: u32,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == kw
    }

    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Identifier
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Numeric value of a `Number` token. Handles `0x` hex spellings.
    pub fn number(&self) -> Option<f64> {
        if self.kind != TokenKind::Number {
            return None;
        }
        parse_number(&self.text)
    }
}

const KEYWORDS: &[&str] = &[
    "function", "const", "let", "var", "return", "if", "else", "for", "while", "do", "switch",
    "case", "default", "break", "continue", "new", "this", "class", "async", "await", "export",
    "import", "from", "typeof", "true", "false", "null", "undefined",
];

/// Multi-character operators, longest first so the scan can take the first hit.
const MULTI_PUNCT: &[&str] = &[
    "...", "===", "!==", "**=", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--",
    "+=", "-=", "*=", "/=", "%=", "**",
];

const SINGLE_PUNCT: &[u8] = b"{}()[];,.:?+-*/%<>=!&|^~@#";

/// Tokenize a whole script. The returned stream always ends with one `Eof` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, DslError> {
    let mut lexer = Lexer::new(source);
    lexer.tokenize()
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    text.parse::<f64>().ok()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: u32,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            depth: 0,
            tokens: Vec::new(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, DslError> {
        loop {
            self.skip_whitespace_and_comments()?;
            let Some(ch) = self.peek() else { break };
            let start = self.pos;

            match ch {
                b'"' | b'\'' | b'`' => self.lex_string(start, ch)?,
                b'0'..=b'9' => self.lex_number(start)?,
                b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(start)?;
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => self.lex_ident(start),
                _ => self.lex_punct(start)?,
            }
        }

        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            span: Span::new(self.pos, self.pos),
            depth: self.depth,
        });
        Ok(std::mem::take(&mut self.tokens))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, text: String, start: usize, end: usize) {
        let depth = if kind == TokenKind::Punct {
            match text.as_str() {
                "{" | "(" | "[" => {
                    let d = self.depth;
                    self.depth += 1;
                    d
                }
                "}" | ")" | "]" => {
                    self.depth = self.depth.saturating_sub(1);
                    self.depth
                }
                _ => self.depth,
            }
        } else {
            self.depth
        };
        self.tokens.push(Token {
            kind,
            text,
            span: Span::new(start, end),
            depth,
        });
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), DslError> {
        while let Some(ch) = self.peek() {
            match ch {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => {
                                return Err(DslError::lexer(
                                    "Unterminated block comment",
                                    Span::new(start, self.pos),
                                ));
                            }
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ => {
                    // Other Unicode whitespace (e.g. NBSP) is skipped as well.
                    match self.source.get(self.pos..).and_then(|rest| rest.chars().next()) {
                        Some(c) if !c.is_ascii() && c.is_whitespace() => self.pos += c.len_utf8(),
                        _ => break,
                    }
                }
            }
        }
        Ok(())
    }

    fn lex_string(&mut self, start: usize, quote: u8) -> Result<(), DslError> {
        let rest = self.source.get(start + 1..).unwrap_or("");
        let mut value = String::new();
        let mut escaped = false;
        let mut end = None;

        for (i, ch) in rest.char_indices() {
            if escaped {
                value.push(match ch {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
                escaped = false;
                continue;
            }
            match ch {
                '\\' => escaped = true,
                '\n' if quote != b'`' => break,
                c if c.is_ascii() && c as u8 == quote => {
                    end = Some(start + 1 + i + 1);
                    break;
                }
                c => value.push(c),
            }
        }

        match end {
            Some(end) => {
                self.pos = end;
                self.push(TokenKind::String, value, start, end);
                Ok(())
            }
            None => {
                let line_end = rest.find('\n').map_or(self.bytes.len(), |i| start + 1 + i);
                Err(DslError::lexer(
                    "Unterminated string literal",
                    Span::new(start, line_end),
                ))
            }
        }
    }

    fn lex_number(&mut self, start: usize) -> Result<(), DslError> {
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
        } else {
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
            if matches!(self.peek(), Some(b'e' | b'E')) {
                let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
                if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1 + sign;
                    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                        self.pos += 1;
                    }
                }
            }
        }

        let text = self.source.get(start..self.pos).unwrap_or("");
        let trailing_ident = self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$');
        if trailing_ident || parse_number(text).is_none() {
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$')
            {
                self.pos += 1;
            }
            return Err(DslError::lexer(
                format!("Invalid number: {}", self.source.get(start..self.pos).unwrap_or("")),
                Span::new(start, self.pos),
            ));
        }
        self.push(TokenKind::Number, text.to_string(), start, self.pos);
        Ok(())
    }

    fn lex_ident(&mut self, start: usize) {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$')
        {
            self.pos += 1;
        }
        let word = self.source.get(start..self.pos).unwrap_or("");
        let kind = if KEYWORDS.contains(&word) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        self.push(kind, word.to_string(), start, self.pos);
    }

    fn lex_punct(&mut self, start: usize) -> Result<(), DslError> {
        let rest = self.source.get(start..).unwrap_or("");
        if let Some(op) = MULTI_PUNCT.iter().find(|op| rest.starts_with(**op)) {
            self.pos += op.len();
            self.push(TokenKind::Punct, (*op).to_string(), start, self.pos);
            return Ok(());
        }
        match self.peek() {
            Some(ch) if SINGLE_PUNCT.contains(&ch) => {
                self.pos += 1;
                self.push(TokenKind::Punct, char::from(ch).to_string(), start, self.pos);
                Ok(())
            }
            _ => {
                let ch = rest.chars().next().unwrap_or('\u{fffd}');
                Err(DslError::lexer(
                    format!("Unexpected character: '{ch}'"),
                    Span::new(start, start + ch.len_utf8()),
                ))
            }
        }
    }
}
