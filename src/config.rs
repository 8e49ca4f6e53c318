//! Scheduler configuration.
//!
//! A single documented tunable — `wakelock_threshold_ms` — plus a capacity
//! hint for the default processing queue. Loaded the way the rest of this
//! codebase's services load configuration: TOML file if present, defaults
//! otherwise, no panics on a missing file.

use crate::error::{AlarmError, Result};
use serde::Deserialize;
use std::path::Path;

/// Boundary, in milliseconds, below which a deadline is served by arming the
/// process timer under a wake lock rather than programming a wake alarm.
pub const DEFAULT_WAKELOCK_THRESHOLD_MS: u64 = 3000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Deadlines closer than this use the process timer + wake lock path;
    /// deadlines farther out use the wake alarm path. Test-overridable.
    pub wakelock_threshold_ms: u64,

    /// Bound applied to the default processing queue's channel. `None`
    /// means unbounded.
    pub default_queue_capacity: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wakelock_threshold_ms: DEFAULT_WAKELOCK_THRESHOLD_MS,
            default_queue_capacity: None,
        }
    }
}

impl SchedulerConfig {
    /// Parses a TOML document into a config, layering onto defaults for any
    /// field the document omits.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AlarmError::Init {
            reason: format!("invalid scheduler config: {e}"),
        })
    }

    /// Loads configuration from `path` if it exists, otherwise returns
    /// defaults. Mirrors the file-or-default loading hierarchy used
    /// elsewhere in this codebase, without the environment-variable
    /// override layer (not needed for a single tunable — see DESIGN.md).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| AlarmError::Init {
            reason: format!("unable to read config file {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_matches_spec() {
        assert_eq!(SchedulerConfig::default().wakelock_threshold_ms, 3000);
    }

    #[test]
    fn partial_toml_layers_onto_defaults() {
        let cfg = SchedulerConfig::from_toml_str("wakelock_threshold_ms = 50\n").unwrap();
        assert_eq!(cfg.wakelock_threshold_ms, 50);
        assert_eq!(cfg.default_queue_capacity, None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = SchedulerConfig::load("/nonexistent/path/alarm-scheduler.toml").unwrap();
        assert_eq!(cfg.wakelock_threshold_ms, DEFAULT_WAKELOCK_THRESHOLD_MS);
    }
}
