#[allow(clippy::module_name_repetitions)]
pub mod ast;
#[allow(clippy::module_name_repetitions)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::single_match_else,
)]
pub mod parser;
pub mod builtins;
pub mod optimize;
pub mod reference;
#[allow(
    clippy::indexing_slicing,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
)]
pub mod compiler;
#[allow(
    clippy::indexing_slicing,
    clippy::needless_pass_by_value,
)]
pub mod vm;

use std::time::Instant;

use ast::ParseResult;
use compiler::CompiledScript;

use crate::error::ScriptError;

/// Tokenize and extract lifecycle bodies. Never fails: lexical errors come
/// back as an invalid `ParseResult`.
pub fn parse_source(source: &str) -> ParseResult {
    match lexer::tokenize(source) {
        Ok(tokens) => parser::extract_lifecycles(source, &tokens),
        Err(e) => ParseResult::invalid(e.format_with_source(source)),
    }
}

/// Compile a script source into a `CompiledScript` ready for the runner.
///
/// This is the primary entry point for the pipeline:
/// source → tokenize → extract lifecycles → compile bodies → `CompiledScript`
pub fn compile_source(
    script_id: &str,
    source: &str,
    content_hash: Option<String>,
    max_instructions: usize,
    now: Instant,
) -> Result<CompiledScript, ScriptError> {
    let tokens = lexer::tokenize(source).map_err(|e| ScriptError::Lexical {
        message: e.format_with_source(source),
    })?;
    let parsed = parser::extract_lifecycles(source, &tokens);
    if !parsed.is_valid {
        return Err(ScriptError::Parse {
            message: parsed.error.unwrap_or_else(|| "invalid script".to_string()),
        });
    }
    compiler::compile_script(script_id, content_hash, &parsed, max_instructions, now).map_err(|e| {
        ScriptError::Compile {
            message: e.format_with_source(source),
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use ast::Lifecycle;

    #[test]
    fn lexical_error_becomes_invalid_parse() {
        let result = parse_source("function onStart() { let x = 'open\n }");
        assert!(!result.is_valid);
        assert!(result.error.unwrap().starts_with("[lexer] line 1:"));
        assert!(result.bodies.is_empty());
    }

    #[test]
    fn compile_source_classifies_failures() {
        let now = Instant::now();
        assert!(matches!(
            compile_source("s", "let a = @@ `", None, 16, now),
            Err(ScriptError::Lexical { .. })
        ));
        assert!(matches!(
            compile_source("s", "function onStart() {", None, 16, now),
            Err(ScriptError::Parse { .. })
        ));
        let many = format!("function onUpdate() {{ {} }}", "entity.position.x += 1;".repeat(3));
        let err = compile_source("s", &many, None, 2, now).unwrap_err();
        let ScriptError::Compile { message } = err else {
            panic!("expected compile error, got {err:?}");
        };
        assert!(message.starts_with("[compiler] line 1:"), "{message}");
    }

    #[test]
    fn compiles_all_lifecycles() {
        let src = "function onStart() { console.log('hi') }\nconst onUpdate = () => { entity.position.x += deltaTime }";
        let compiled = compile_source("s", src, Some("h".into()), 16, Instant::now()).unwrap();
        assert_eq!(compiled.script_id, "s");
        assert_eq!(compiled.content_hash.as_deref(), Some("h"));
        assert_eq!(
            compiled.lifecycles.keys().copied().collect::<Vec<_>>(),
            vec![Lifecycle::OnStart, Lifecycle::OnUpdate]
        );
        assert_eq!(compiled.instruction_count(), 2);
    }
}
