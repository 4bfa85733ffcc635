use std::fs;
use std::path::Path;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ScriptError;

/// Runtime configuration for the scripting system. Missing fields take
/// their defaults, so an empty object is a valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(default)]
#[ts(export)]
pub struct ScriptRuntimeConfig {
    /// Maximum number of compiled scripts kept in memory.
    pub cache_capacity: usize,
    /// Seconds a compiled script stays cached without being used.
    pub cache_ttl_secs: u64,
    /// Maximum number of parsed parameter sets kept in memory.
    pub parameter_cache_capacity: usize,
    /// Per-execution budget in milliseconds. None = unlimited.
    pub default_budget_ms: Option<f64>,
    /// Compiling a lifecycle to more instructions than this fails.
    pub max_instructions_per_lifecycle: usize,
    /// Emit a diagnostic event listing statements the compiler skipped.
    pub report_skipped_statements: bool,
    /// Number of samples in the rolling timing averages.
    pub stats_window: usize,
    /// Diagnostic events buffered before the oldest are dropped.
    pub event_buffer_capacity: usize,
    /// Detect lifecycles only; never execute instructions.
    pub safe_mode: bool,
}

impl Default for ScriptRuntimeConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            cache_ttl_secs: 300,
            parameter_cache_capacity: 256,
            default_budget_ms: None,
            max_instructions_per_lifecycle: 4096,
            report_skipped_statements: false,
            stats_window: 120,
            event_buffer_capacity: 1024,
            safe_mode: false,
        }
    }
}

impl ScriptRuntimeConfig {
    /// A TTL of zero disables expiry.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }

    pub fn default_budget(&self) -> Option<Duration> {
        self.default_budget_ms.and_then(budget_from_ms)
    }

    pub fn validate(&self) -> Result<(), ScriptError> {
        let invalid = |message: &str| {
            Err(ScriptError::Config {
                message: message.to_string(),
            })
        };
        if self.cache_capacity == 0 {
            return invalid("cache_capacity must be at least 1");
        }
        if self.parameter_cache_capacity == 0 {
            return invalid("parameter_cache_capacity must be at least 1");
        }
        if self.max_instructions_per_lifecycle == 0 {
            return invalid("max_instructions_per_lifecycle must be at least 1");
        }
        if self.default_budget_ms.is_some_and(|ms| budget_from_ms(ms).is_none()) {
            return invalid("default_budget_ms must be a positive number of milliseconds");
        }
        Ok(())
    }
}

/// Budget in milliseconds as a `Duration`. None for zero, negative,
/// non-finite or unrepresentably large values.
pub fn budget_from_ms(ms: f64) -> Option<Duration> {
    if ms.is_nan() || ms <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<ScriptRuntimeConfig, ScriptError> {
    let data = fs::read_to_string(path)?;
    let config: ScriptRuntimeConfig = serde_json::from_str(&data)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &ScriptRuntimeConfig) -> Result<(), ScriptError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    // Write to a sibling then rename so readers never see a partial file.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// JSON schema of the config file, for editor tooling.
pub fn config_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(ScriptRuntimeConfig)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let dir = std::env::temp_dir().join("vibe_scripting_test_config");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("scripting.json");

        let config = ScriptRuntimeConfig {
            cache_capacity: 7,
            default_budget_ms: Some(2.5),
            safe_mode: true,
            ..ScriptRuntimeConfig::default()
        };
        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).expect("should load");
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ScriptRuntimeConfig = serde_json::from_str(r#"{"cache_ttl_secs": 5}"#).unwrap();
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(5)));
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.max_instructions_per_lifecycle, 4096);
        assert_eq!(config.default_budget(), None);
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let config = ScriptRuntimeConfig {
            cache_ttl_secs: 0,
            ..ScriptRuntimeConfig::default()
        };
        assert_eq!(config.cache_ttl(), None);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = ScriptRuntimeConfig {
            cache_capacity: 0,
            ..ScriptRuntimeConfig::default()
        };
        assert!(matches!(bad.validate(), Err(ScriptError::Config { .. })));
        let bad_budget = ScriptRuntimeConfig {
            default_budget_ms: Some(-1.0),
            ..ScriptRuntimeConfig::default()
        };
        assert!(bad_budget.validate().is_err());
        assert!(ScriptRuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_huge_budget_is_rejected_not_panicking() {
        let huge = ScriptRuntimeConfig {
            default_budget_ms: Some(1e30),
            ..ScriptRuntimeConfig::default()
        };
        assert!(matches!(huge.validate(), Err(ScriptError::Config { .. })));
        assert_eq!(huge.default_budget(), None);
        assert_eq!(budget_from_ms(f64::INFINITY), None);
        assert_eq!(budget_from_ms(f64::NAN), None);
        assert_eq!(budget_from_ms(0.0), None);
        assert_eq!(budget_from_ms(2.0), Some(Duration::from_millis(2)));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let path = std::env::temp_dir().join("vibe_scripting_no_such_config.json");
        let _ = fs::remove_file(&path);
        assert!(matches!(load_config(&path), Err(ScriptError::Config { .. })));
    }

    #[test]
    fn test_schema_lists_fields() {
        let schema = serde_json::to_value(config_schema()).unwrap();
        assert!(schema["properties"]["cache_capacity"].is_object());
        assert!(schema["properties"]["safe_mode"].is_object());
    }
}
