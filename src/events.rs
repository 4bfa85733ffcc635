//! Diagnostic records the runtime hands to its host.
//!
//! Records are buffered by the executor and drained by the host each frame.
//! Event names are shared with the editor frontend.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::dsl::ast::Lifecycle;
use crate::error::InstructionFault;

pub const SCRIPT_LOG: &str = "script:log";
pub const SCRIPT_COMPILED: &str = "script:compiled";
pub const SCRIPT_COMPILE_FAILED: &str = "script:compile_failed";
pub const SCRIPT_EXECUTION_FAILED: &str = "script:execution_failed";
pub const SCRIPT_INSTRUCTION_SKIPPED: &str = "script:instruction_skipped";
pub const SCRIPT_STATEMENTS_SKIPPED: &str = "script:statements_skipped";

/// Severity of a `console.*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Log | LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Output of one logging instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScriptLog {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(tag = "event", rename_all = "camelCase")]
#[ts(export)]
pub enum ScriptEvent {
    Log {
        script_id: String,
        entity_id: u64,
        level: LogLevel,
        message: String,
    },
    Compiled {
        script_id: String,
        lifecycles: Vec<Lifecycle>,
        instructions: usize,
        elapsed_ms: f64,
    },
    CompileFailed {
        script_id: String,
        error: String,
    },
    ExecutionFailed {
        script_id: String,
        entity_id: u64,
        lifecycle: Lifecycle,
        error: String,
    },
    InstructionSkipped {
        script_id: String,
        entity_id: u64,
        lifecycle: Lifecycle,
        fault: InstructionFault,
    },
    StatementsSkipped {
        script_id: String,
        lifecycle: Lifecycle,
        statements: Vec<String>,
    },
}

impl ScriptEvent {
    /// Event name the host forwards this record under.
    pub fn name(&self) -> &'static str {
        match self {
            ScriptEvent::Log { .. } => SCRIPT_LOG,
            ScriptEvent::Compiled { .. } => SCRIPT_COMPILED,
            ScriptEvent::CompileFailed { .. } => SCRIPT_COMPILE_FAILED,
            ScriptEvent::ExecutionFailed { .. } => SCRIPT_EXECUTION_FAILED,
            ScriptEvent::InstructionSkipped { .. } => SCRIPT_INSTRUCTION_SKIPPED,
            ScriptEvent::StatementsSkipped { .. } => SCRIPT_STATEMENTS_SKIPPED,
        }
    }

    pub fn script_id(&self) -> &str {
        match self {
            ScriptEvent::Log { script_id, .. }
            | ScriptEvent::Compiled { script_id, .. }
            | ScriptEvent::CompileFailed { script_id, .. }
            | ScriptEvent::ExecutionFailed { script_id, .. }
            | ScriptEvent::InstructionSkipped { script_id, .. }
            | ScriptEvent::StatementsSkipped { script_id, .. } => script_id,
        }
    }
}
