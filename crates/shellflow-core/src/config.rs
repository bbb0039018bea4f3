//! Engine configuration.
//!
//! Defaults match the limits the engine was designed around; a YAML file
//! and `SHELLFLOW_*` environment variables can override them.
//!
//! ```yaml
//! stdoutCap: 50000
//! stderrCap: 10000
//! defaultStepTimeoutMs: 60000
//! stopGracePeriodMs: 3000
//! sessionTimeoutMs: 300000
//! shell: /bin/sh
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Exit code reported when a command is killed by its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the OS refuses to start a command.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 1;

/// Exit code reported for a command stopped by cancellation.
pub const CANCELLED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Maximum number of characters kept from stdout.
    pub stdout_cap: usize,
    /// Maximum number of characters kept from stderr.
    pub stderr_cap: usize,
    /// Timeout for bare execution requests that do not specify one.
    pub default_exec_timeout_ms: u64,
    /// Timeout for workflow command steps without a per-step override.
    pub default_step_timeout_ms: u64,
    /// How long an interrupted process may take to exit before it is killed.
    pub stop_grace_period_ms: u64,
    /// Wall-clock limit for a streaming session.
    pub session_timeout_ms: u64,
    /// Shell used to interpret command text.
    pub shell: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stdout_cap: 50_000,
            stderr_cap: 10_000,
            default_exec_timeout_ms: 30_000,
            default_step_timeout_ms: 60_000,
            stop_grace_period_ms: 3_000,
            session_timeout_ms: 300_000,
            shell: default_shell().to_string(),
        }
    }
}

#[cfg(unix)]
fn default_shell() -> &'static str {
    "/bin/sh"
}

#[cfg(not(unix))]
fn default_shell() -> &'static str {
    "cmd"
}

impl EngineConfig {
    /// Load a YAML config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("[EngineConfig] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Internal(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ServerError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ServerError::BadRequest(format!("Failed to parse engine config: {}", e)))
    }

    /// Apply `SHELLFLOW_*` overrides from the process environment.
    pub fn from_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("[EngineConfig] Ignoring non-numeric {}={}", key, raw);
                    None
                }
            }
        };

        if let Some(v) = number("SHELLFLOW_STDOUT_CAP") {
            self.stdout_cap = v as usize;
        }
        if let Some(v) = number("SHELLFLOW_STDERR_CAP") {
            self.stderr_cap = v as usize;
        }
        if let Some(v) = number("SHELLFLOW_EXEC_TIMEOUT_MS") {
            self.default_exec_timeout_ms = v;
        }
        if let Some(v) = number("SHELLFLOW_STEP_TIMEOUT_MS") {
            self.default_step_timeout_ms = v;
        }
        if let Some(v) = number("SHELLFLOW_STOP_GRACE_MS") {
            self.stop_grace_period_ms = v;
        }
        if let Some(v) = number("SHELLFLOW_SESSION_TIMEOUT_MS") {
            self.session_timeout_ms = v;
        }
        if let Some(shell) = lookup("SHELLFLOW_SHELL").filter(|s| !s.trim().is_empty()) {
            self.shell = shell;
        }
        self
    }

    pub fn default_exec_timeout(&self) -> Duration {
        Duration::from_millis(self.default_exec_timeout_ms)
    }

    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_millis(self.default_step_timeout_ms)
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.stdout_cap, 50_000);
        assert_eq!(config.stderr_cap, 10_000);
        assert_eq!(config.default_step_timeout(), Duration::from_secs(60));
        assert_eq!(config.stop_grace_period(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml("stdoutCap: 10\nshell: /bin/bash\n").unwrap();
        assert_eq!(config.stdout_cap, 10);
        assert_eq!(config.shell, "/bin/bash");
        assert_eq!(config.stderr_cap, 10_000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SHELLFLOW_STEP_TIMEOUT_MS", "1500"),
            ("SHELLFLOW_STDERR_CAP", "not-a-number"),
            ("SHELLFLOW_SHELL", "/bin/bash"),
        ]);
        let config = EngineConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.default_step_timeout_ms, 1500);
        assert_eq!(config.stderr_cap, 10_000);
        assert_eq!(config.shell, "/bin/bash");
    }
}
