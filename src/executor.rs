//! Orchestration facade: compile scripts into the cache, execute lifecycles.
//!
//! Every operation returns an outcome value. Nothing raises past this layer;
//! a failing script only fails its own call.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use ts_rs::TS;

use crate::cache::BoundedCache;
use crate::clock::{Clock, SystemClock};
use crate::dsl::ast::Lifecycle;
use crate::dsl::compiler::CompiledScript;
use crate::dsl::vm::{self, ExecutionContext, RunReport};
use crate::error::{ExecutionError, ScriptError};
use crate::events::{ScriptEvent, ScriptLog};
use crate::model::{EntityCapabilities, InputState, NoInput, ScriptParameters, TimeInfo};
use crate::settings::ScriptRuntimeConfig;
use crate::util::{duration_ms, RollingAverage};

/// The surface shared by the full executor and the safe-mode fallback.
pub trait ScriptBackend: Send + Sync {
    fn compile(&self, script_id: &str, code: &str, code_hash: Option<&str>) -> CompileOutcome;
    fn execute(&self, script_id: &str, lifecycle: Lifecycle, options: ExecuteOptions<'_>) -> ExecuteOutcome;
    /// Drop everything cached for one script.
    fn invalidate(&self, script_id: &str);
    fn clear(&self);
    fn stats(&self) -> ExecutorStats;
    fn drain_events(&self) -> Vec<ScriptEvent>;
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct CompileOutcome {
    pub ok: bool,
    /// True when the cached compile was reused because the hash matched.
    pub cached: bool,
    pub elapsed_ms: f64,
    pub error: Option<ScriptError>,
    pub lifecycles: Vec<Lifecycle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct ExecuteOutcome {
    pub ok: bool,
    pub elapsed_ms: f64,
    /// Instructions reached, including ones skipped for a missing capability.
    pub instructions_run: usize,
    pub error: Option<ScriptError>,
    pub logs: Vec<ScriptLog>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, TS)]
#[ts(export)]
pub struct ExecutorStats {
    pub compiled_scripts: usize,
    pub parameter_sets: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub compilations: u64,
    pub executions: u64,
    pub failures: u64,
    pub avg_compile_ms: f64,
    pub avg_execute_ms: f64,
}

/// Per-call inputs to `execute`.
pub struct ExecuteOptions<'a> {
    pub entity_id: u64,
    pub time: TimeInfo,
    pub input: &'a dyn InputState,
    /// Raw JSON object of parameter values.
    pub parameters: Option<&'a str>,
    /// Hash of `parameters`; when present the parse is cached.
    pub parameters_hash: Option<&'a str>,
    /// Overrides the configured default budget.
    pub budget: Option<Duration>,
    pub entity: Option<&'a mut dyn EntityCapabilities>,
}

impl<'a> ExecuteOptions<'a> {
    pub fn new(entity_id: u64) -> Self {
        Self {
            entity_id,
            time: TimeInfo::default(),
            input: &NoInput,
            parameters: None,
            parameters_hash: None,
            budget: None,
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: &'a mut dyn EntityCapabilities) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_time(mut self, time: TimeInfo) -> Self {
        self.time = time;
        self
    }

    pub fn with_input(mut self, input: &'a dyn InputState) -> Self {
        self.input = input;
        self
    }

    pub fn with_parameters(mut self, json: &'a str, hash: Option<&'a str>) -> Self {
        self.parameters = Some(json);
        self.parameters_hash = hash;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }
}

struct Counters {
    compilations: u64,
    executions: u64,
    failures: u64,
    compile_ms: RollingAverage,
    execute_ms: RollingAverage,
}

/// One lock per script id with a compile in flight. Compiles of the same
/// script run one at a time and in arrival order.
#[derive(Default)]
struct CompileGuards(Mutex<HashMap<String, Arc<Mutex<()>>>>);

impl CompileGuards {
    fn acquire(&self, script_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.0.lock().entry(script_id.to_string()).or_default())
    }

    fn release(&self, script_id: &str, guard: Arc<Mutex<()>>) {
        let mut guards = self.0.lock();
        drop(guard);
        if guards.get(script_id).is_some_and(|g| Arc::strong_count(g) == 1) {
            guards.remove(script_id);
        }
    }
}

/// Owned scripting runtime: compiled-script cache, parameter cache,
/// counters and the diagnostic buffer.
pub struct ScriptExecutor {
    config: ScriptRuntimeConfig,
    clock: Arc<dyn Clock>,
    scripts: BoundedCache<String, CompiledScript>,
    /// Parsed parameters keyed by (script id, parameters hash).
    parameters: BoundedCache<(String, String), ScriptParameters>,
    empty_parameters: Arc<ScriptParameters>,
    counters: Mutex<Counters>,
    events: Mutex<VecDeque<ScriptEvent>>,
    compile_guards: CompileGuards,
}

impl ScriptExecutor {
    pub fn new(config: ScriptRuntimeConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ScriptRuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = config.cache_ttl();
        Self {
            scripts: BoundedCache::new(config.cache_capacity, ttl, Arc::clone(&clock)),
            parameters: BoundedCache::new(config.parameter_cache_capacity, ttl, Arc::clone(&clock)),
            empty_parameters: Arc::new(ScriptParameters::new()),
            counters: Mutex::new(Counters {
                compilations: 0,
                executions: 0,
                failures: 0,
                compile_ms: RollingAverage::new(config.stats_window),
                execute_ms: RollingAverage::new(config.stats_window),
            }),
            events: Mutex::new(VecDeque::new()),
            compile_guards: CompileGuards::default(),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ScriptRuntimeConfig {
        &self.config
    }

    /// The cached compile for a script, without refreshing it.
    pub fn compiled(&self, script_id: &str) -> Option<Arc<CompiledScript>> {
        self.scripts.peek(script_id)
    }

    fn elapsed_ms(&self, start: Instant) -> f64 {
        duration_ms(self.clock.now().saturating_duration_since(start))
    }

    fn push_event(&self, event: ScriptEvent) {
        let capacity = self.config.event_buffer_capacity;
        if capacity == 0 {
            return;
        }
        let mut events = self.events.lock();
        while events.len() >= capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    fn resolve_parameters(
        &self,
        script_id: &str,
        json: Option<&str>,
        hash: Option<&str>,
    ) -> Result<Arc<ScriptParameters>, ScriptError> {
        let Some(json) = json else {
            return Ok(Arc::clone(&self.empty_parameters));
        };
        let Some(hash) = hash else {
            return ScriptParameters::parse(json).map(Arc::new);
        };

        let key = (script_id.to_string(), hash.to_string());
        if let Some(params) = self.parameters.get(&key) {
            return Ok(params);
        }
        let params = Arc::new(ScriptParameters::parse(json)?);
        self.parameters.put(key, Arc::clone(&params));
        Ok(params)
    }

    fn fail_execution(
        &self,
        script_id: &str,
        entity_id: u64,
        lifecycle: Lifecycle,
        error: &ScriptError,
    ) {
        log::warn!("[ScriptExecutor] {lifecycle} failed for '{script_id}' (entity {entity_id}): {error}");
        self.counters.lock().failures += 1;
        self.push_event(ScriptEvent::ExecutionFailed {
            script_id: script_id.to_string(),
            entity_id,
            lifecycle,
            error: error.to_string(),
        });
    }

    fn forward_report(&self, script_id: &str, entity_id: u64, lifecycle: Lifecycle, report: &RunReport) {
        for entry in &report.logs {
            log::log!(entry.level.as_log_level(), "[Script] {script_id}: {}", entry.message);
            self.push_event(ScriptEvent::Log {
                script_id: script_id.to_string(),
                entity_id,
                level: entry.level,
                message: entry.message.clone(),
            });
        }
        for fault in &report.faults {
            self.push_event(ScriptEvent::InstructionSkipped {
                script_id: script_id.to_string(),
                entity_id,
                lifecycle,
                fault: fault.clone(),
            });
        }
    }

    /// Runs with the script's compile guard held.
    fn compile_fresh_or_cached(&self, script_id: &str, code: &str, code_hash: Option<&str>) -> CompileOutcome {
        let start = self.clock.now();

        if let Some(hash) = code_hash {
            if let Some(existing) = self.scripts.get(script_id) {
                if existing.content_hash.as_deref() == Some(hash) {
                    log::trace!("[ScriptExecutor] '{script_id}' unchanged, using cached compile");
                    return CompileOutcome {
                        ok: true,
                        cached: true,
                        elapsed_ms: self.elapsed_ms(start),
                        error: None,
                        lifecycles: existing.lifecycles.keys().copied().collect(),
                    };
                }
            }
        }

        let result = crate::dsl::compile_source(
            script_id,
            code,
            code_hash.map(str::to_string),
            self.config.max_instructions_per_lifecycle,
            start,
        );
        let elapsed_ms = self.elapsed_ms(start);

        match result {
            Ok(compiled) => {
                let lifecycles: Vec<Lifecycle> = compiled.lifecycles.keys().copied().collect();
                if self.config.report_skipped_statements {
                    for (lifecycle, body) in &compiled.lifecycles {
                        if !body.skipped.is_empty() {
                            self.push_event(ScriptEvent::StatementsSkipped {
                                script_id: script_id.to_string(),
                                lifecycle: *lifecycle,
                                statements: body.skipped.clone(),
                            });
                        }
                    }
                }
                log::debug!(
                    "[ScriptExecutor] compiled '{script_id}': {} instruction(s) in {elapsed_ms:.3} ms",
                    compiled.instruction_count()
                );
                self.push_event(ScriptEvent::Compiled {
                    script_id: script_id.to_string(),
                    lifecycles: lifecycles.clone(),
                    instructions: compiled.instruction_count(),
                    elapsed_ms,
                });
                self.scripts.put(script_id.to_string(), Arc::new(compiled));
                {
                    let mut counters = self.counters.lock();
                    counters.compilations += 1;
                    counters.compile_ms.record(elapsed_ms);
                }
                CompileOutcome {
                    ok: true,
                    cached: false,
                    elapsed_ms,
                    error: None,
                    lifecycles,
                }
            }
            Err(error) => {
                log::warn!("[ScriptExecutor] failed to compile '{script_id}': {error}");
                self.counters.lock().failures += 1;
                self.push_event(ScriptEvent::CompileFailed {
                    script_id: script_id.to_string(),
                    error: error.to_string(),
                });
                CompileOutcome {
                    ok: false,
                    cached: false,
                    elapsed_ms,
                    error: Some(error),
                    lifecycles: Vec::new(),
                }
            }
        }
    }
}

impl ScriptBackend for ScriptExecutor {
    fn compile(&self, script_id: &str, code: &str, code_hash: Option<&str>) -> CompileOutcome {
        let guard = self.compile_guards.acquire(script_id);
        let outcome = {
            let _compiling = guard.lock();
            self.compile_fresh_or_cached(script_id, code, code_hash)
        };
        self.compile_guards.release(script_id, guard);
        outcome
    }

    fn execute(&self, script_id: &str, lifecycle: Lifecycle, options: ExecuteOptions<'_>) -> ExecuteOutcome {
        let start = self.clock.now();
        let ExecuteOptions {
            entity_id,
            time,
            input,
            parameters,
            parameters_hash,
            budget,
            entity,
        } = options;
        let failed = |error: ScriptError, instructions_run: usize, logs: Vec<ScriptLog>| {
            self.fail_execution(script_id, entity_id, lifecycle, &error);
            ExecuteOutcome {
                ok: false,
                elapsed_ms: self.elapsed_ms(start),
                instructions_run,
                error: Some(error),
                logs,
            }
        };

        let Some(script) = self.scripts.get(script_id) else {
            let error = ExecutionError::NotCompiled {
                script_id: script_id.to_string(),
            };
            return failed(error.into(), 0, Vec::new());
        };

        let Some(compiled) = script.lifecycle(lifecycle) else {
            // A script need not define every lifecycle.
            let elapsed_ms = self.elapsed_ms(start);
            let mut counters = self.counters.lock();
            counters.executions += 1;
            counters.execute_ms.record(elapsed_ms);
            return ExecuteOutcome {
                ok: true,
                elapsed_ms,
                instructions_run: 0,
                error: None,
                logs: Vec::new(),
            };
        };

        let params = match self.resolve_parameters(script_id, parameters, parameters_hash) {
            Ok(params) => params,
            Err(error) => return failed(error, 0, Vec::new()),
        };

        let mut ctx = ExecutionContext {
            entity_id,
            time,
            input,
            parameters: &params,
            budget: budget.or_else(|| self.config.default_budget()),
            entity: entity.map(|e| e as &mut dyn EntityCapabilities),
        };
        let report = vm::run(&compiled.instructions, &mut ctx, self.clock.as_ref());
        self.forward_report(script_id, entity_id, lifecycle, &report);

        let error = match report.stopped {
            Some(stopped) => Some(ScriptError::from(stopped)),
            None if !report.faults.is_empty() => Some(ScriptError::from(ExecutionError::CapabilityUnavailable {
                lifecycle,
                faults: report.faults,
            })),
            None => None,
        };

        {
            let elapsed_ms = self.elapsed_ms(start);
            let mut counters = self.counters.lock();
            counters.executions += 1;
            counters.execute_ms.record(elapsed_ms);
        }

        match error {
            Some(error) => failed(error, report.executed, report.logs),
            None => ExecuteOutcome {
                ok: true,
                elapsed_ms: self.elapsed_ms(start),
                instructions_run: report.executed,
                error: None,
                logs: report.logs,
            },
        }
    }

    fn invalidate(&self, script_id: &str) {
        let had_script = self.scripts.invalidate(script_id);
        let params = self.parameters.invalidate_where(|(sid, _), _| sid == script_id);
        log::debug!(
            "[ScriptExecutor] invalidated '{script_id}' (compiled: {had_script}, parameter sets: {params})"
        );
    }

    fn clear(&self) {
        self.scripts.clear();
        self.parameters.clear();
        log::debug!("[ScriptExecutor] cleared all caches");
    }

    fn stats(&self) -> ExecutorStats {
        let scripts = self.scripts.stats();
        let counters = self.counters.lock();
        ExecutorStats {
            compiled_scripts: scripts.entries,
            parameter_sets: self.parameters.len(),
            cache_hits: scripts.hits,
            cache_misses: scripts.misses,
            cache_evictions: scripts.evictions,
            compilations: counters.compilations,
            executions: counters.executions,
            failures: counters.failures,
            avg_compile_ms: counters.compile_ms.mean(),
            avg_execute_ms: counters.execute_ms.mean(),
        }
    }

    fn drain_events(&self) -> Vec<ScriptEvent> {
        self.events.lock().drain(..).collect()
    }
}
