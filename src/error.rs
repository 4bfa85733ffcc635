use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use crate::dsl::ast::Lifecycle;

/// Error taxonomy for the scripting runtime. Serialized with a `code` tag so
/// the editor can match on the failure kind.
#[derive(Debug, Clone, PartialEq, Serialize, TS, Error)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum ScriptError {
    #[error("Lexical error: {message}")]
    Lexical { message: String },
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Compile error: {message}")]
    Compile { message: String },
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("Invalid parameters: {message}")]
    Parameters { message: String },
    #[error("Config error: {message}")]
    Config { message: String },
}

/// Why an `execute` call did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, TS, Error)]
#[serde(tag = "kind")]
#[ts(export)]
pub enum ExecutionError {
    #[error("Script '{script_id}' has not been compiled")]
    NotCompiled { script_id: String },
    #[error("Execution budget of {budget_ms} ms exceeded after {completed} of {total} instructions")]
    BudgetExceeded {
        completed: usize,
        total: usize,
        budget_ms: f64,
    },
    #[error("{} instruction(s) in {lifecycle} targeted a missing capability", .faults.len())]
    CapabilityUnavailable {
        lifecycle: Lifecycle,
        faults: Vec<InstructionFault>,
    },
}

/// One instruction skipped at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct InstructionFault {
    /// Position in the lifecycle's instruction list.
    pub index: usize,
    pub opcode: String,
    pub reason: String,
}

impl From<std::io::Error> for ScriptError {
    fn from(e: std::io::Error) -> Self {
        ScriptError::Config {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ScriptError {
    fn from(e: serde_json::Error) -> Self {
        ScriptError::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn execution_errors_wrap_transparently() {
        let err: ScriptError = ExecutionError::NotCompiled {
            script_id: "mover".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Script 'mover' has not been compiled");
    }

    #[test]
    fn budget_message_names_progress() {
        let err = ExecutionError::BudgetExceeded {
            completed: 3,
            total: 10,
            budget_ms: 1.5,
        };
        assert_eq!(
            err.to_string(),
            "Execution budget of 1.5 ms exceeded after 3 of 10 instructions"
        );
    }

    #[test]
    fn serializes_with_code_tag() {
        let err = ScriptError::Parse {
            message: "bad".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "Parse");
        assert_eq!(json["detail"]["message"], "bad");
    }
}
