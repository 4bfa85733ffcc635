//! Lifecycle extractor.
//!
//! This is a best-effort scan, not a grammar for the whole file. It looks for
//! two declaration shapes and captures the exact body text of each:
//!
//! ```text
//! function onUpdate(dt: number): void { ... }
//! const onStart = () => { ... }
//! ```
//!
//! Every other token is stepped over. Bracket matching relies only on the
//! depth recorded by the lexer.

use indexmap::IndexMap;

use super::ast::{Lifecycle, LifecycleBody, ParseResult, Span};
use super::error::DslError;
use super::lexer::Token;

pub fn extract_lifecycles(source: &str, tokens: &[Token]) -> ParseResult {
    let mut extractor = Extractor::new(source, tokens);
    match extractor.run() {
        Ok(()) => ParseResult {
            bodies: extractor.found.into_values().collect(),
            is_valid: true,
            error: None,
        },
        Err(e) => ParseResult {
            bodies: extractor.found.into_values().collect(),
            is_valid: false,
            error: Some(e.format_with_source(source)),
        },
    }
}

/// A declaration whose body was located; indexes point into the token slice.
struct Declaration {
    name: String,
    open: usize,
    close: usize,
}

struct Extractor<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    found: IndexMap<Lifecycle, LifecycleBody>,
}

impl<'a> Extractor<'a> {
    fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            found: IndexMap::new(),
        }
    }

    fn run(&mut self) -> Result<(), DslError> {
        while let Some(tok) = self.tokens.get(self.pos) {
            if tok.is_eof() {
                break;
            }
            let declaration = if tok.is_keyword("function") {
                self.function_decl(self.pos)?
            } else if self.starts_binding(self.pos) {
                self.arrow_decl(self.pos)?
            } else {
                None
            };

            match declaration {
                Some(decl) => {
                    self.record(&decl);
                    self.pos = decl.close + 1;
                }
                None => self.pos += 1,
            }
        }
        Ok(())
    }

    fn record(&mut self, decl: &Declaration) {
        let Some(lifecycle) = Lifecycle::from_script_name(&decl.name) else {
            log::trace!("[Script] ignoring non-lifecycle declaration '{}'", decl.name);
            return;
        };
        let (Some(open), Some(close)) = (self.tokens.get(decl.open), self.tokens.get(decl.close))
        else {
            return;
        };
        let span = Span::new(open.span.end, close.span.start);
        let body = self.source.get(span.start..span.end).unwrap_or_default().to_string();
        // Later definitions replace earlier ones.
        self.found.insert(lifecycle, LifecycleBody { lifecycle, body, span });
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn tok(&self, idx: usize) -> Option<&'a Token> {
        self.tokens.get(idx)
    }

    fn span_at(&self, idx: usize) -> Span {
        self.tok(idx).map_or(Span::new(self.source.len(), self.source.len()), |t| t.span)
    }

    /// Index of the closer that matches the opening bracket at `open`.
    fn find_matching(&self, open: usize) -> Option<usize> {
        let opener = self.tok(open)?;
        let closer = match opener.text.as_str() {
            "{" => "}",
            "(" => ")",
            "[" => "]",
            _ => return None,
        };
        self.tokens
            .iter()
            .enumerate()
            .skip(open + 1)
            .find(|(_, t)| t.depth == opener.depth && matches!(t.text.as_str(), "}" | ")" | "]") && !t.is_eof())
            .filter(|(_, t)| t.is_punct(closer))
            .map(|(i, _)| i)
    }

    /// `const name =`, `let name =`, `var name =` or a bare `name =` that is
    /// not a member assignment.
    fn starts_binding(&self, idx: usize) -> bool {
        let Some(tok) = self.tok(idx) else { return false };
        let is_decl_kw = tok.is_keyword("const") || tok.is_keyword("let") || tok.is_keyword("var");
        if is_decl_kw {
            return self.tok(idx + 1).is_some_and(Token::is_ident);
        }
        let after_dot = idx
            .checked_sub(1)
            .and_then(|prev| self.tok(prev))
            .is_some_and(|prev| prev.is_punct(".") || prev.is_punct("?."));
        tok.is_ident() && !after_dot && self.tok(idx + 1).is_some_and(|t| t.is_punct("="))
    }

    fn unterminated(&self, what: &str, name: &str, at: usize) -> DslError {
        DslError::parser(format!("Unterminated {what} in declaration of '{name}'"), self.span_at(at))
    }

    /// Skip an optional return type annotation, stopping at `stop` on the
    /// declaration's own depth. Returns the index of the stop token.
    fn skip_annotation(&self, from: usize, depth: u32, stop: &str) -> Option<usize> {
        let mut idx = from;
        loop {
            let tok = self.tok(idx)?;
            if tok.is_eof() {
                return None;
            }
            if tok.depth == depth {
                if tok.is_punct(stop) {
                    return Some(idx);
                }
                if tok.is_punct(";") || tok.is_punct("}") || tok.is_punct(")") {
                    return None;
                }
            }
            if tok.depth < depth {
                return None;
            }
            idx += 1;
        }
    }

    // ── Shape (a): function declarations ──────────────────────────

    fn function_decl(&self, start: usize) -> Result<Option<Declaration>, DslError> {
        let Some(name_tok) = self.tok(start + 1).filter(|t| t.is_ident()) else {
            return Ok(None);
        };
        let name = name_tok.text.clone();
        let paren = start + 2;
        let Some(paren_tok) = self.tok(paren).filter(|t| t.is_punct("(")) else {
            return Ok(None);
        };
        let close_paren = self
            .find_matching(paren)
            .ok_or_else(|| self.unterminated("parameter list", &name, paren))?;

        let Some(open) = self.skip_annotation(close_paren + 1, paren_tok.depth, "{") else {
            if self.tok(close_paren + 1).is_some_and(Token::is_eof) {
                return Err(DslError::parser(
                    format!("Missing body in declaration of '{name}'"),
                    self.span_at(close_paren),
                ));
            }
            // A signature without a body (overload declaration).
            return Ok(None);
        };
        let close = self
            .find_matching(open)
            .ok_or_else(|| self.unterminated("body", &name, open))?;
        Ok(Some(Declaration { name, open, close }))
    }

    // ── Shape (b): arrow function bindings ────────────────────────

    fn arrow_decl(&self, start: usize) -> Result<Option<Declaration>, DslError> {
        let mut idx = start;
        if self.tok(idx).is_some_and(|t| t.kind == super::lexer::TokenKind::Keyword) {
            idx += 1;
        }
        let Some(name_tok) = self.tok(idx).filter(|t| t.is_ident()) else {
            return Ok(None);
        };
        let name = name_tok.text.clone();
        let depth = name_tok.depth;
        idx += 1;
        if !self.tok(idx).is_some_and(|t| t.is_punct("=")) {
            return Ok(None);
        }
        idx += 1;
        if self.tok(idx).is_some_and(|t| t.is_keyword("async")) {
            idx += 1;
        }

        // Parameters: `( ... )` or a single bare identifier.
        match self.tok(idx) {
            Some(t) if t.is_punct("(") => {
                idx = self
                    .find_matching(idx)
                    .ok_or_else(|| self.unterminated("parameter list", &name, idx))?
                    + 1;
            }
            Some(t) if t.is_ident() => idx += 1,
            _ => return Ok(None),
        }

        let Some(arrow) = self.skip_annotation(idx, depth, "=>") else {
            return Ok(None);
        };
        let open = arrow + 1;
        if !self.tok(open).is_some_and(|t| t.is_punct("{")) {
            // Expression-bodied arrows are not a lifecycle shape.
            return Ok(None);
        }
        let close = self
            .find_matching(open)
            .ok_or_else(|| self.unterminated("body", &name, open))?;
        Ok(Some(Declaration { name, open, close }))
    }
}
