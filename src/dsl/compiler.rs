use std::time::Instant;

use indexmap::IndexMap;

use super::ast::{BinOp, Expr, Lifecycle, ParseResult, Span};
use super::builtins::{self, Opcode, Shape};
use super::error::DslError;
use super::lexer::{tokenize, Token, TokenKind};
use super::optimize::fold_constants;
use crate::events::LogLevel;
use crate::model::{Axis, Color, MaterialScalar, TransformField};

/// Parenthesis nesting allowed inside one expression.
const MAX_EXPR_DEPTH: usize = 64;
/// Binary operators allowed in one statement. Chains build left-deep trees
/// that every later pass walks recursively.
const MAX_BINARY_OPS: usize = 256;

/// A compiled script: one flat instruction list per lifecycle it defines.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub script_id: String,
    pub content_hash: Option<String>,
    pub lifecycles: IndexMap<Lifecycle, CompiledLifecycle>,
    pub compiled_at: Instant,
}

impl CompiledScript {
    pub fn lifecycle(&self, lifecycle: Lifecycle) -> Option<&CompiledLifecycle> {
        self.lifecycles.get(&lifecycle)
    }

    pub fn instruction_count(&self) -> usize {
        self.lifecycles.values().map(|l| l.instructions.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledLifecycle {
    pub instructions: Vec<Instruction>,
    /// Source text of statements that matched no catalog shape.
    pub skipped: Vec<String>,
}

/// How an axis assignment combines with the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
}

/// One runnable operation. Operands are already folded.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    SetPosition([Expr; 3]),
    SetRotation([Expr; 3]),
    SetScale([Expr; 3]),
    Translate([Expr; 3]),
    Rotate([Expr; 3]),
    AssignField {
        field: TransformField,
        axis: Axis,
        op: AssignOp,
        value: Expr,
    },
    SetMaterialColor(Color),
    SetMaterialScalar {
        property: MaterialScalar,
        value: Expr,
    },
    Log {
        level: LogLevel,
        message: String,
    },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::SetPosition(_) => Opcode::SetPosition,
            Instruction::SetRotation(_) => Opcode::SetRotation,
            Instruction::SetScale(_) => Opcode::SetScale,
            Instruction::Translate(_) => Opcode::Translate,
            Instruction::Rotate(_) => Opcode::Rotate,
            Instruction::AssignField { .. } => Opcode::AssignField,
            Instruction::SetMaterialColor(_) => Opcode::SetMaterialColor,
            Instruction::SetMaterialScalar { .. } => Opcode::SetMaterialScalar,
            Instruction::Log { .. } => Opcode::Log,
        }
    }
}

/// Compile every executable body of `parsed`. Error spans point into the
/// full source the bodies were extracted from.
pub fn compile_script(
    script_id: &str,
    content_hash: Option<String>,
    parsed: &ParseResult,
    max_instructions: usize,
    now: Instant,
) -> Result<CompiledScript, DslError> {
    let mut lifecycles = IndexMap::new();
    for body in parsed.executable_bodies() {
        let compiled = compile_body(&body.body, max_instructions).map_err(|mut e| {
            e.span = Span::new(e.span.start + body.span.start, e.span.end + body.span.start);
            e
        })?;
        lifecycles.insert(body.lifecycle, compiled);
    }
    Ok(CompiledScript {
        script_id: script_id.to_string(),
        content_hash,
        lifecycles,
        compiled_at: now,
    })
}

/// Compile one lifecycle body. Statements matching no catalog shape are
/// skipped and recorded; only re-tokenization failure or an oversized
/// result is an error.
pub fn compile_body(body: &str, max_instructions: usize) -> Result<CompiledLifecycle, DslError> {
    let tokens = tokenize(body)?;
    let mut compiled = CompiledLifecycle::default();

    for stmt in split_statements(body, &tokens) {
        match compile_statement(stmt) {
            Some(instruction) => compiled.instructions.push(instruction),
            None => {
                let text = statement_text(body, stmt);
                log::debug!("[Script] skipped unrecognized statement: {text}");
                compiled.skipped.push(text);
            }
        }
    }

    if compiled.instructions.len() > max_instructions {
        return Err(DslError::compiler(
            format!(
                "Lifecycle compiles to {} instructions (limit {max_instructions})",
                compiled.instructions.len()
            ),
            Span::new(0, body.len()),
        ));
    }
    Ok(compiled)
}

// ── Statement splitting ──────────────────────────────────────────

/// Split at top-level `;` and at line breaks the previous token cannot
/// continue across. Empty statements are dropped.
fn split_statements<'t>(body: &str, tokens: &'t [Token]) -> Vec<&'t [Token]> {
    let tokens = match tokens.split_last() {
        Some((eof, rest)) if eof.is_eof() => rest,
        _ => tokens,
    };

    let mut statements = Vec::new();
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        if tok.depth == 0 && tok.is_punct(";") {
            statements.push(&tokens[start..i]);
            start = i + 1;
            continue;
        }
        if i > start && tok.depth == 0 {
            let prev = &tokens[i - 1];
            let gap = body.get(prev.span.end..tok.span.start).unwrap_or_default();
            let breaks = prev.depth == 0 && ends_expression(prev) && !continues_expression(tok);
            if breaks && gap.contains('\n') {
                statements.push(&tokens[start..i]);
                start = i;
            }
        }
    }
    statements.push(&tokens[start..]);
    statements.retain(|s| !s.is_empty());
    statements
}

fn ends_expression(tok: &Token) -> bool {
    match tok.kind {
        TokenKind::Identifier | TokenKind::Keyword | TokenKind::Number | TokenKind::String => true,
        TokenKind::Punct => matches!(tok.text.as_str(), ")" | "]" | "}" | "++" | "--"),
        TokenKind::Eof => false,
    }
}

/// Tokens that join a line to the one above: `.translate(...)` chains.
fn continues_expression(tok: &Token) -> bool {
    tok.is_punct(".") || tok.is_punct("?.")
}

fn statement_text(body: &str, stmt: &[Token]) -> String {
    match (stmt.first(), stmt.last()) {
        (Some(first), Some(last)) => body
            .get(first.span.start..last.span.end)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

// ── Statement shapes ─────────────────────────────────────────────

fn compile_statement(tokens: &[Token]) -> Option<Instruction> {
    let mut p = StmtParser {
        tokens,
        pos: 0,
        depth: 0,
        binary_ops: 0,
    };
    let path = p.member_path()?;

    let instruction = if p.eat_punct("(") {
        let entry = builtins::lookup(&path)?;
        let instruction = match entry.shape {
            Shape::Vector { field, relative } => {
                let x = p.expr()?;
                p.expect_punct(",")?;
                let y = p.expr()?;
                p.expect_punct(",")?;
                let z = p.expr()?;
                let args = [x, y, z];
                match (field, relative) {
                    (TransformField::Position, false) => Instruction::SetPosition(args),
                    (TransformField::Rotation, false) => Instruction::SetRotation(args),
                    (TransformField::Scale, false) => Instruction::SetScale(args),
                    (TransformField::Position, true) => Instruction::Translate(args),
                    (TransformField::Rotation, true) => Instruction::Rotate(args),
                    (TransformField::Scale, true) => return None,
                }
            }
            Shape::Color => {
                let tok = p.next()?;
                let color = match tok.kind {
                    TokenKind::String | TokenKind::Number => Color::from_hex(&tok.text)?,
                    _ => return None,
                };
                Instruction::SetMaterialColor(color)
            }
            Shape::Scalar(property) => Instruction::SetMaterialScalar {
                property,
                value: p.expr()?,
            },
            Shape::Log(level) => {
                let tok = p.next().filter(|t| t.kind == TokenKind::String)?;
                Instruction::Log {
                    level,
                    message: tok.text.clone(),
                }
            }
            Shape::FieldAssign(_) => return None,
        };
        p.expect_punct(")")?;
        instruction
    } else {
        let op = match p.next()?.text.as_str() {
            "=" => AssignOp::Set,
            "+=" => AssignOp::Add,
            "-=" => AssignOp::Sub,
            _ => return None,
        };
        let (target, axis_name) = path.rsplit_once('.')?;
        let axis = Axis::from_script_name(axis_name)?;
        let Shape::FieldAssign(field) = builtins::lookup(target)?.shape else {
            return None;
        };
        Instruction::AssignField {
            field,
            axis,
            op,
            value: p.expr()?,
        }
    };

    p.at_end().then_some(instruction)
}

struct StmtParser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    binary_ops: usize,
}

impl<'t> StmtParser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_punct(p)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Option<()> {
        self.eat_punct(p).then_some(())
    }

    /// `a.b.c` joined back into one string.
    fn member_path(&mut self) -> Option<String> {
        let first = self.next().filter(|t| t.is_ident())?;
        let mut path = first.text.clone();
        while self.peek().is_some_and(|t| t.is_punct(".")) {
            self.pos += 1;
            let segment = self.next().filter(|t| t.is_ident())?;
            path.push('.');
            path.push_str(&segment.text);
        }
        Some(path)
    }

    // ── Expressions ────────────────────────────────────────────────

    fn expr(&mut self) -> Option<Expr> {
        self.additive().map(fold_constants)
    }

    fn additive(&mut self) -> Option<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(t) if t.is_punct("+") => BinOp::Add,
                Some(t) if t.is_punct("-") => BinOp::Sub,
                _ => return Some(left),
            };
            self.pos += 1;
            self.count_binary_op()?;
            let right = self.multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(t) if t.is_punct("*") => BinOp::Mul,
                Some(t) if t.is_punct("/") => BinOp::Div,
                _ => return Some(left),
            };
            self.pos += 1;
            self.count_binary_op()?;
            let right = self.unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn unary(&mut self) -> Option<Expr> {
        if self.eat_punct("-") {
            return self.nested(|p| p.unary()).map(|e| Expr::Neg(Box::new(e)));
        }
        if self.eat_punct("+") {
            return self.nested(|p| p.unary());
        }
        self.primary()
    }

    fn count_binary_op(&mut self) -> Option<()> {
        self.binary_ops += 1;
        (self.binary_ops <= MAX_BINARY_OPS).then_some(())
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> Option<Expr>) -> Option<Expr> {
        if self.depth >= MAX_EXPR_DEPTH {
            return None;
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn primary(&mut self) -> Option<Expr> {
        let tok = self.peek()?;
        match tok.kind {
            TokenKind::Number => {
                self.pos += 1;
                tok.number().map(Expr::Const)
            }
            TokenKind::Punct if tok.is_punct("(") => {
                self.pos += 1;
                let inner = self.nested(|p| p.additive())?;
                self.expect_punct(")")?;
                Some(inner)
            }
            TokenKind::Identifier => {
                let path = self.member_path()?;
                if self.eat_punct("(") {
                    let call = self.call(&path)?;
                    self.expect_punct(")")?;
                    Some(call)
                } else {
                    Self::value_path(&path)
                }
            }
            _ => None,
        }
    }

    fn value_path(path: &str) -> Option<Expr> {
        if let Some(var) = builtins::lookup_implicit(path) {
            return Some(var.to_expr());
        }
        let (prefix, name) = path.split_once('.')?;
        (builtins::PARAM_PREFIXES.contains(&prefix) && !name.contains('.'))
            .then(|| Expr::Param(name.to_string()))
    }

    /// Arguments of a call inside an expression; the caller consumes `)`.
    fn call(&mut self, path: &str) -> Option<Expr> {
        if let Some(func) = builtins::lookup_math(path) {
            let arg = self.nested(|p| p.additive())?;
            return Some(Expr::Call { func, arg: Box::new(arg) });
        }
        match path {
            builtins::INPUT_KEY_DOWN => {
                let key = self.next().filter(|t| t.kind == TokenKind::String)?;
                Some(Expr::KeyDown(key.text.clone()))
            }
            builtins::INPUT_MOUSE_BUTTON_DOWN => {
                let button = self.next()?.number()?;
                if button.fract() != 0.0 || !(0.0..=255.0).contains(&button) {
                    return None;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let button = button as u8;
                Some(Expr::MouseButtonDown(button))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::dsl::ast::{LifecycleBody, MathFn};

    fn compile(body: &str) -> CompiledLifecycle {
        compile_body(body, 4096).unwrap()
    }

    fn consts(x: f64, y: f64, z: f64) -> [Expr; 3] {
        [Expr::Const(x), Expr::Const(y), Expr::Const(z)]
    }

    #[test]
    fn transform_calls() {
        let compiled = compile(
            "entity.transform.setPosition(1, 2, 3);\n\
             entity.transform.setRotation(0, 90, 0);\n\
             entity.transform.setScale(2, 2, 2);\n\
             entity.transform.translate(0.1, 0, 0);\n\
             entity.transform.rotate(0, 1, 0);",
        );
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::SetPosition(consts(1.0, 2.0, 3.0)),
                Instruction::SetRotation(consts(0.0, 90.0, 0.0)),
                Instruction::SetScale(consts(2.0, 2.0, 2.0)),
                Instruction::Translate(consts(0.1, 0.0, 0.0)),
                Instruction::Rotate(consts(0.0, 1.0, 0.0)),
            ]
        );
        assert!(compiled.skipped.is_empty());
    }

    #[test]
    fn field_assignments() {
        let compiled = compile(
            "entity.position.y += deltaTime * 2\n\
             entity.transform.rotation.z = 45\n\
             entity.scale.x -= 0.5",
        );
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::AssignField {
                    field: TransformField::Position,
                    axis: Axis::Y,
                    op: AssignOp::Add,
                    value: Expr::Binary {
                        op: BinOp::Mul,
                        left: Box::new(Expr::DeltaTime),
                        right: Box::new(Expr::Const(2.0)),
                    },
                },
                Instruction::AssignField {
                    field: TransformField::Rotation,
                    axis: Axis::Z,
                    op: AssignOp::Set,
                    value: Expr::Const(45.0),
                },
                Instruction::AssignField {
                    field: TransformField::Scale,
                    axis: Axis::X,
                    op: AssignOp::Sub,
                    value: Expr::Const(0.5),
                },
            ]
        );
    }

    #[test]
    fn material_calls() {
        let compiled = compile(
            "entity.material.setColor('#ff0000');\n\
             entity.meshRenderer.material.setColor(0x00ff00);\n\
             entity.material.setColor(\"#00f\");\n\
             entity.material.setMetalness(0.8);\n\
             entity.material.setRoughness(parameters.rough);",
        );
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::SetMaterialColor(Color::rgb(255, 0, 0)),
                Instruction::SetMaterialColor(Color::rgb(0, 255, 0)),
                Instruction::SetMaterialColor(Color::rgb(0, 0, 255)),
                Instruction::SetMaterialScalar {
                    property: MaterialScalar::Metalness,
                    value: Expr::Const(0.8),
                },
                Instruction::SetMaterialScalar {
                    property: MaterialScalar::Roughness,
                    value: Expr::Param("rough".into()),
                },
            ]
        );
    }

    #[test]
    fn console_calls() {
        let compiled = compile("console.log('started'); console.warn(\"careful\"); console.log(time);");
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::Log { level: LogLevel::Log, message: "started".into() },
                Instruction::Log { level: LogLevel::Warn, message: "careful".into() },
            ]
        );
        assert_eq!(compiled.skipped, vec!["console.log(time)".to_string()]);
    }

    #[test]
    fn expression_atoms() {
        let compiled = compile(
            "entity.transform.setPosition(Math.sin(time.time) * params.radius, \
             input.isKeyDown('Space') - input.isMouseButtonDown(0), frameCount / 60 + Math.PI)",
        );
        let [Instruction::SetPosition([x, y, z])] = compiled.instructions.as_slice() else {
            panic!("expected one SetPosition, got {:?}", compiled.instructions);
        };
        assert_eq!(
            *x,
            Expr::Binary {
                op: BinOp::Mul,
                left: Box::new(Expr::Call { func: MathFn::Sin, arg: Box::new(Expr::Time) }),
                right: Box::new(Expr::Param("radius".into())),
            }
        );
        assert_eq!(
            *y,
            Expr::Binary {
                op: BinOp::Sub,
                left: Box::new(Expr::KeyDown("Space".into())),
                right: Box::new(Expr::MouseButtonDown(0)),
            }
        );
        assert!(matches!(z, Expr::Binary { op: BinOp::Add, .. }));
    }

    #[test]
    fn constants_fold_at_compile_time() {
        let compiled = compile("entity.transform.setPosition(-(1 + 2) * 2, 4 / 0, cos(0))");
        assert_eq!(
            compiled.instructions,
            vec![Instruction::SetPosition(consts(-6.0, 0.0, 1.0))]
        );
    }

    #[test]
    fn unrecognized_statements_are_skipped_in_order() {
        let compiled = compile(
            "const speed = 2;\n\
             entity.transform.translate(1, 0, 0);\n\
             if (time > 1) { entity.transform.translate(0, 1, 0); }\n\
             doSomething();\n\
             entity.transform.setScale(1, 1);\n\
             entity.transform.rotate(0, 0, 1)",
        );
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::Translate(consts(1.0, 0.0, 0.0)),
                Instruction::Rotate(consts(0.0, 0.0, 1.0)),
            ]
        );
        assert_eq!(
            compiled.skipped,
            vec![
                "const speed = 2".to_string(),
                "if (time > 1) { entity.transform.translate(0, 1, 0); }".to_string(),
                "doSomething()".to_string(),
                "entity.transform.setScale(1, 1)".to_string(),
            ]
        );
    }

    #[test]
    fn multi_line_call_is_one_statement() {
        let compiled = compile("entity.transform.setPosition(\n  1,\n  2,\n  3\n)\nentity.transform\n  .translate(1, 1, 1)");
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::SetPosition(consts(1.0, 2.0, 3.0)),
                Instruction::Translate(consts(1.0, 1.0, 1.0)),
            ]
        );
    }

    #[test]
    fn line_continuation_after_operator() {
        let compiled = compile("entity.position.x = 1 +\n 2");
        assert_eq!(
            compiled.instructions,
            vec![Instruction::AssignField {
                field: TransformField::Position,
                axis: Axis::X,
                op: AssignOp::Set,
                value: Expr::Const(3.0),
            }]
        );
    }

    #[test]
    fn rejects_malformed_shapes() {
        let compiled = compile(
            "entity.material.setColor('red');\n\
             entity.position.w = 1;\n\
             entity.transform.setPosition(1, 2, 3) + 1;\n\
             entity.transform.translate(unknown, 0, 0);\n\
             input.isMouseButtonDown(1.5);\n\
             entity.position = 3;",
        );
        assert!(compiled.instructions.is_empty());
        assert_eq!(compiled.skipped.len(), 6);
    }

    #[test]
    fn deeply_nested_expression_is_skipped_not_overflowed() {
        let body = format!(
            "entity.position.x = {}1{};",
            "(".repeat(MAX_EXPR_DEPTH + 10),
            ")".repeat(MAX_EXPR_DEPTH + 10)
        );
        let compiled = compile(&body);
        assert!(compiled.instructions.is_empty());
        assert_eq!(compiled.skipped.len(), 1);
    }

    #[test]
    fn long_operator_chain_is_skipped_not_overflowed() {
        let body = format!("entity.position.x = {}time;", "time + ".repeat(10_000));
        let compiled = compile(&body);
        assert!(compiled.instructions.is_empty());
        assert_eq!(compiled.skipped.len(), 1);

        let product = format!("entity.position.y = {}2;", "time * ".repeat(10_000));
        assert!(compile(&product).instructions.is_empty());
    }

    #[test]
    fn operator_chain_within_limit_compiles() {
        let body = format!("entity.position.x = {}1", "time + ".repeat(MAX_BINARY_OPS));
        let compiled = compile(&body);
        assert_eq!(compiled.instructions.len(), 1);
        assert!(compiled.skipped.is_empty());
    }

    #[test]
    fn deterministic_output() {
        let body = "entity.transform.translate(Math.sin(time) * 2, 0, deltaTime);\nconsole.log('x')";
        assert_eq!(compile(body), compile(body));
    }

    #[test]
    fn instruction_limit_is_a_compile_failure() {
        let body = "entity.position.x += 1;".repeat(5);
        let err = compile_body(&body, 4).unwrap_err();
        assert!(err.message.contains("limit 4"), "{}", err.message);
        assert!(compile_body(&body, 5).is_ok());
    }

    #[test]
    fn lexical_failure_in_body_is_a_compile_failure() {
        assert!(compile_body("console.log('unterminated\n')", 10).is_err());
    }

    #[test]
    fn script_errors_are_offset_into_source() {
        let parsed = ParseResult {
            bodies: vec![LifecycleBody {
                lifecycle: Lifecycle::OnStart,
                body: "\n  console.log(\"a\n\") ".into(),
                span: Span::new(20, 40),
            }],
            is_valid: true,
            error: None,
        };
        let err = compile_script("s", None, &parsed, 10, Instant::now()).unwrap_err();
        // Opening quote sits at body offset 15.
        assert_eq!(err.span.start, 35);
    }

    #[test]
    fn opcode_matches_instruction() {
        let compiled = compile("entity.material.setMetalness(1); console.error('x')");
        let opcodes: Vec<Opcode> = compiled.instructions.iter().map(Instruction::opcode).collect();
        assert_eq!(opcodes, vec![Opcode::SetMaterialScalar, Opcode::Log]);
    }
}
