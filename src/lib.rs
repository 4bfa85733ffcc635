pub mod cache;
pub mod clock;
pub mod dsl;
pub mod error;
pub mod events;
pub mod executor;
pub mod model;
pub mod safe_mode;
pub mod settings;
pub mod util;

pub use dsl::ast::Lifecycle;
pub use error::{ExecutionError, ScriptError};
pub use events::ScriptEvent;
pub use executor::{CompileOutcome, ExecuteOptions, ExecuteOutcome, ExecutorStats, ScriptBackend, ScriptExecutor};
pub use safe_mode::{backend_for, SafeModeExecutor};
pub use settings::ScriptRuntimeConfig;
