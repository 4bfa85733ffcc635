//! Fallback backend for hosts that must not run script instructions.
//!
//! Compiling only detects which lifecycles and catalog operations a script
//! mentions, by scanning its text. Executing never touches the entity.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use ts_rs::TS;

use crate::cache::BoundedCache;
use crate::clock::{Clock, SystemClock};
use crate::dsl::ast::Lifecycle;
use crate::dsl::builtins::{Opcode, Shape, CATALOG};
use crate::events::ScriptEvent;
use crate::executor::{CompileOutcome, ExecuteOptions, ExecuteOutcome, ExecutorStats, ScriptBackend, ScriptExecutor};
use crate::settings::ScriptRuntimeConfig;
use crate::util::duration_ms;

/// What a text scan found in a script.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, TS)]
#[ts(export)]
pub struct SafeModeReport {
    pub lifecycles: Vec<Lifecycle>,
    /// Catalog operations mentioned anywhere in the source, in catalog order.
    pub operations: Vec<Opcode>,
}

/// Scan `code` for lifecycle definitions and catalog operations without
/// tokenizing it. Never fails; unbalanced or invalid source still yields
/// whatever names appear in it.
pub fn detect(code: &str) -> SafeModeReport {
    let lifecycles = Lifecycle::ALL
        .into_iter()
        .filter(|lc| defines(code, lc.script_name()))
        .collect();

    let mut operations = Vec::new();
    for entry in CATALOG {
        if operations.contains(&entry.opcode) {
            continue;
        }
        let found = entry.paths.iter().any(|path| match entry.shape {
            Shape::FieldAssign(_) => ["x", "y", "z"]
                .iter()
                .any(|axis| word_positions(code, &format!("{path}.{axis}")).next().is_some()),
            _ => word_positions(code, path).any(|end| next_non_space(code, end) == Some('(')),
        });
        if found {
            operations.push(entry.opcode);
        }
    }

    SafeModeReport { lifecycles, operations }
}

/// True when `name` appears as a whole word followed by `(` or a single `=`.
fn defines(code: &str, name: &str) -> bool {
    word_positions(code, name).any(|end| {
        let rest = code.get(end..).unwrap_or_default().trim_start();
        rest.starts_with('(') || (rest.starts_with('=') && !rest.starts_with("=="))
    })
}

/// End offsets of each whole-word occurrence of `needle`.
fn word_positions<'a>(code: &'a str, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    code.match_indices(needle).filter_map(move |(start, m)| {
        let end = start + m.len();
        let before = code.get(..start).and_then(|s| s.chars().next_back());
        let after = code.get(end..).and_then(|s| s.chars().next());
        let bounded = !before.is_some_and(|c| is_word(c) || c == '.') && !after.is_some_and(is_word);
        bounded.then_some(end)
    })
}

fn next_non_space(code: &str, from: usize) -> Option<char> {
    code.get(from..)?.chars().find(|c| !c.is_whitespace())
}

/// Backend that reports lifecycles but runs nothing.
pub struct SafeModeExecutor {
    clock: Arc<dyn Clock>,
    reports: BoundedCache<String, SafeModeReport>,
    counters: Mutex<(u64, u64)>,
}

impl SafeModeExecutor {
    pub fn new(config: &ScriptRuntimeConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &ScriptRuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            reports: BoundedCache::new(config.cache_capacity, config.cache_ttl(), Arc::clone(&clock)),
            clock,
            counters: Mutex::new((0, 0)),
        }
    }

    pub fn report(&self, script_id: &str) -> Option<Arc<SafeModeReport>> {
        self.reports.peek(script_id)
    }

    fn elapsed_ms(&self, start: Instant) -> f64 {
        duration_ms(self.clock.now().saturating_duration_since(start))
    }
}

impl ScriptBackend for SafeModeExecutor {
    fn compile(&self, script_id: &str, code: &str, _code_hash: Option<&str>) -> CompileOutcome {
        let start = self.clock.now();
        let report = detect(code);
        log::debug!(
            "[ScriptExecutor] safe mode: '{script_id}' defines {} lifecycle(s)",
            report.lifecycles.len()
        );
        let lifecycles = report.lifecycles.clone();
        self.reports.put(script_id.to_string(), Arc::new(report));
        self.counters.lock().0 += 1;
        CompileOutcome {
            ok: true,
            cached: false,
            elapsed_ms: self.elapsed_ms(start),
            error: None,
            lifecycles,
        }
    }

    fn execute(&self, script_id: &str, lifecycle: Lifecycle, _options: ExecuteOptions<'_>) -> ExecuteOutcome {
        let start = self.clock.now();
        log::debug!("[ScriptExecutor] safe mode: not running {lifecycle} for '{script_id}'");
        self.counters.lock().1 += 1;
        ExecuteOutcome {
            ok: true,
            elapsed_ms: self.elapsed_ms(start),
            instructions_run: 0,
            error: None,
            logs: Vec::new(),
        }
    }

    fn invalidate(&self, script_id: &str) {
        self.reports.invalidate(script_id);
    }

    fn clear(&self) {
        self.reports.clear();
    }

    fn stats(&self) -> ExecutorStats {
        let cache = self.reports.stats();
        let (compilations, executions) = *self.counters.lock();
        ExecutorStats {
            compiled_scripts: cache.entries,
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_evictions: cache.evictions,
            compilations,
            executions,
            ..ExecutorStats::default()
        }
    }

    fn drain_events(&self) -> Vec<ScriptEvent> {
        Vec::new()
    }
}

/// The backend selected by `config.safe_mode`.
pub fn backend_for(config: ScriptRuntimeConfig) -> Box<dyn ScriptBackend> {
    if config.safe_mode {
        log::info!("[ScriptExecutor] safe mode enabled, scripts will not execute");
        Box::new(SafeModeExecutor::new(&config))
    } else {
        Box::new(ScriptExecutor::new(config))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::EntityState;

    #[test]
    fn detects_lifecycles_by_text() {
        let report = detect(
            "function onStart() {}\nconst onUpdate = (dt) => { entity.transform.translate(dt, 0, 0) }\n\
             let disabled = onDisableHandler;",
        );
        assert_eq!(report.lifecycles, vec![Lifecycle::OnStart, Lifecycle::OnUpdate]);
        assert_eq!(report.operations, vec![Opcode::Translate]);
    }

    #[test]
    fn comparison_is_not_a_definition() {
        let report = detect("if (onEnable == null) {}");
        assert!(report.lifecycles.is_empty());
    }

    #[test]
    fn detects_field_writes_and_console() {
        let report = detect("function onUpdate() { entity.position.y += 1; console.warn('x') }");
        assert_eq!(report.lifecycles, vec![Lifecycle::OnUpdate]);
        assert!(report.operations.contains(&Opcode::AssignField));
        assert!(report.operations.contains(&Opcode::Log));
    }

    #[test]
    fn invalid_source_still_reports() {
        let report = detect("function onDestroy() { entity.material.setColor('#fff'");
        assert_eq!(report.lifecycles, vec![Lifecycle::OnDestroy]);
        assert_eq!(report.operations, vec![Opcode::SetMaterialColor]);
    }

    #[test]
    fn safe_mode_never_touches_the_entity() {
        let exec = SafeModeExecutor::new(&ScriptRuntimeConfig::default());
        let outcome = exec.compile("s", "function onStart() { entity.position.x = 9 }", None);
        assert!(outcome.ok);
        assert_eq!(outcome.lifecycles, vec![Lifecycle::OnStart]);

        let mut entity = EntityState::new(1);
        let outcome = exec.execute("s", Lifecycle::OnStart, ExecuteOptions::new(1).with_entity(&mut entity));
        assert!(outcome.ok);
        assert_eq!(outcome.instructions_run, 0);
        assert_eq!(entity.transform.unwrap().position.x, 0.0);

        let stats = exec.stats();
        assert_eq!((stats.compilations, stats.executions, stats.compiled_scripts), (1, 1, 1));
        exec.invalidate("s");
        assert!(exec.report("s").is_none());
        assert!(exec.drain_events().is_empty());
    }

    #[test]
    fn backend_follows_config() {
        let config = ScriptRuntimeConfig {
            safe_mode: true,
            ..ScriptRuntimeConfig::default()
        };
        let backend = backend_for(config);
        backend.compile("s", "function onStart() { entity.position.x = 9 }", None);
        let mut entity = EntityState::new(1);
        backend.execute("s", Lifecycle::OnStart, ExecuteOptions::new(1).with_entity(&mut entity));
        assert_eq!(entity.transform.unwrap().position.x, 0.0);

        let backend = backend_for(ScriptRuntimeConfig::default());
        backend.compile("s", "function onStart() { entity.position.x = 9 }", None);
        backend.execute("s", Lifecycle::OnStart, ExecuteOptions::new(1).with_entity(&mut entity));
        assert_eq!(entity.transform.unwrap().position.x, 9.0);
    }
}
