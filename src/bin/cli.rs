use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use vibe_scripting::dsl::ast::Lifecycle;
use vibe_scripting::dsl::reference::script_reference;
use vibe_scripting::executor::{ExecuteOptions, ExecuteOutcome, ScriptBackend, ScriptExecutor};
use vibe_scripting::model::{EntityState, InputSnapshot, Material, TimeInfo};
use vibe_scripting::safe_mode::{self, backend_for};
use vibe_scripting::settings::{self, ScriptRuntimeConfig};
use vibe_scripting::util::content_hash;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vibe-script", about = "Compile and run entity scripts headlessly", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Runtime config file (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a script and report its lifecycles and skipped statements
    Check { file: PathBuf },
    /// Run a script against an in-memory entity
    Run {
        file: PathBuf,
        /// Lifecycle to run every frame. Without it: onStart once, then onUpdate.
        #[arg(long, value_parser = parse_lifecycle)]
        lifecycle: Option<Lifecycle>,
        #[arg(long, default_value = "1")]
        frames: u64,
        /// Seconds per frame
        #[arg(long, default_value = "0.016666666666666666")]
        dt: f64,
        #[arg(long, default_value = "1")]
        entity: u64,
        /// Parameter values as a JSON object
        #[arg(long)]
        params: Option<String>,
        /// Per-execution budget in milliseconds
        #[arg(long)]
        budget_ms: Option<f64>,
        /// Keys held down for every frame
        #[arg(long = "key")]
        keys: Vec<String>,
        /// Run against an entity with no material
        #[arg(long)]
        no_material: bool,
    },
    /// Report lifecycles and operations by text scan only (safe mode)
    Detect { file: PathBuf },
    /// Print the JSON schema of the config file
    Schema,
    /// Print the markdown reference of operations and variables scripts can use
    Reference,
}

fn parse_lifecycle(s: &str) -> Result<Lifecycle, String> {
    s.parse()
}

// ── Helpers ──────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> ScriptRuntimeConfig {
    let Some(path) = path else {
        return ScriptRuntimeConfig::default();
    };
    match settings::load_config(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn read_script(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: cannot read {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn script_id(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned())
}

fn print_json(value: &impl Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// ── Commands ─────────────────────────────────────────────────────

fn run_check(config: ScriptRuntimeConfig, file: &Path, raw_json: bool) {
    let code = read_script(file);
    let id = script_id(file);
    let executor = ScriptExecutor::new(config);
    let outcome = executor.compile(&id, &code, Some(&content_hash(&code)));

    if raw_json {
        let compiled = executor.compiled(&id);
        let lifecycles: Vec<Value> = compiled
            .iter()
            .flat_map(|c| c.lifecycles.iter())
            .map(|(lifecycle, body)| {
                serde_json::json!({
                    "lifecycle": lifecycle,
                    "instructions": body.instructions.len(),
                    "skipped": body.skipped,
                })
            })
            .collect();
        print_json(&serde_json::json!({ "outcome": outcome, "lifecycles": lifecycles }));
    } else if let Some(error) = &outcome.error {
        eprintln!("Error: {error}");
    } else if let Some(compiled) = executor.compiled(&id) {
        println!("{id}: compiled in {:.3} ms", outcome.elapsed_ms);
        if compiled.lifecycles.is_empty() {
            println!("  (no lifecycles defined)");
        }
        for (lifecycle, body) in &compiled.lifecycles {
            println!("  {lifecycle}: {} instruction(s)", body.instructions.len());
            for stmt in &body.skipped {
                println!("    skipped: {stmt}");
            }
        }
    }

    if !outcome.ok {
        process::exit(1);
    }
}

#[derive(Serialize)]
struct FrameResult {
    frame: u64,
    lifecycle: Lifecycle,
    outcome: ExecuteOutcome,
}

#[allow(clippy::too_many_arguments)]
fn run_script(
    config: ScriptRuntimeConfig,
    file: &Path,
    lifecycle: Option<Lifecycle>,
    frames: u64,
    dt: f64,
    entity_id: u64,
    params: Option<&str>,
    budget_ms: Option<f64>,
    keys: &[String],
    no_material: bool,
    raw_json: bool,
) {
    let code = read_script(file);
    let id = script_id(file);
    let backend = backend_for(config);

    let compiled = backend.compile(&id, &code, Some(&content_hash(&code)));
    if !compiled.ok {
        if raw_json {
            print_json(&serde_json::json!({ "compile": compiled }));
        } else if let Some(error) = &compiled.error {
            eprintln!("Error: {error}");
        }
        process::exit(1);
    }

    let mut entity = EntityState::new(entity_id);
    if !no_material {
        entity = entity.with_material(Material::default());
    }
    let input = keys
        .iter()
        .fold(InputSnapshot::default(), |input, key| input.with_key(key.as_str()));
    let params_hash = params.map(content_hash);

    let mut schedule = Vec::new();
    match lifecycle {
        Some(lc) => schedule.extend((0..frames).map(|f| (f, lc))),
        None => {
            schedule.push((0, Lifecycle::OnStart));
            schedule.extend((0..frames).map(|f| (f, Lifecycle::OnUpdate)));
        }
    }

    let mut results = Vec::with_capacity(schedule.len());
    for (frame, lc) in schedule {
        let mut options = ExecuteOptions::new(entity_id)
            .with_entity(&mut entity)
            .with_time(TimeInfo::at_frame(frame, dt))
            .with_input(&input);
        if let Some(json) = params {
            options = options.with_parameters(json, params_hash.as_deref());
        }
        if let Some(budget) = budget_ms.and_then(settings::budget_from_ms) {
            options = options.with_budget(budget);
        }
        let outcome = backend.execute(&id, lc, options);
        results.push(FrameResult {
            frame,
            lifecycle: lc,
            outcome,
        });
    }

    let failed = results.iter().any(|r| !r.outcome.ok);
    if raw_json {
        print_json(&serde_json::json!({
            "compile": compiled,
            "frames": results,
            "entity": entity,
            "stats": backend.stats(),
            "events": backend.drain_events(),
        }));
    } else {
        for r in &results {
            let status = if r.outcome.ok { "ok" } else { "FAILED" };
            println!(
                "[frame {}] {}: {status}, {} instruction(s), {:.3} ms",
                r.frame, r.lifecycle, r.outcome.instructions_run, r.outcome.elapsed_ms
            );
            for log in &r.outcome.logs {
                println!("    {:?}: {}", log.level, log.message);
            }
            if let Some(error) = &r.outcome.error {
                println!("    error: {error}");
            }
        }
        if let Some(t) = entity.transform {
            println!("position: {:.4} {:.4} {:.4}", t.position.x, t.position.y, t.position.z);
            println!("rotation: {:.4} {:.4} {:.4}", t.rotation.x, t.rotation.y, t.rotation.z);
            println!("scale:    {:.4} {:.4} {:.4}", t.scale.x, t.scale.y, t.scale.z);
        }
        if let Some(m) = entity.material {
            println!(
                "material: {} metalness {:.3} roughness {:.3}",
                m.color, m.metalness, m.roughness
            );
        }
    }

    if failed {
        process::exit(1);
    }
}

fn run_detect(file: &Path, raw_json: bool) {
    let code = read_script(file);
    let report = safe_mode::detect(&code);
    if raw_json {
        print_json(&report);
        return;
    }
    let lifecycles: Vec<&str> = report.lifecycles.iter().map(|lc| lc.script_name()).collect();
    let operations: Vec<&str> = report.operations.iter().map(|op| op.name()).collect();
    println!("lifecycles: {}", lifecycles.join(", "));
    println!("operations: {}", operations.join(", "));
}

// ── Main ─────────────────────────────────────────────────────────

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let raw = cli.json;

    match cli.command {
        Commands::Schema => print_json(&settings::config_schema()),
        Commands::Reference => print!("{}", script_reference()),
        Commands::Detect { file } => run_detect(&file, raw),
        Commands::Check { file } => run_check(load_config(cli.config.as_deref()), &file, raw),
        Commands::Run {
            file,
            lifecycle,
            frames,
            dt,
            entity,
            params,
            budget_ms,
            keys,
            no_material,
        } => run_script(
            load_config(cli.config.as_deref()),
            &file,
            lifecycle,
            frames,
            dt,
            entity,
            params.as_deref(),
            budget_ms,
            &keys,
            no_material,
            raw,
        ),
    }
}
