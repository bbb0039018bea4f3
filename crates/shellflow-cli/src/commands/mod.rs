//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the shellflow-core domain logic through `AppState`.

pub mod exec;
pub mod server;
pub mod stream;
pub mod workflow;

use shellflow_core::state::AppState;
use shellflow_core::EngineConfig;
use std::sync::Arc;

/// Load the engine configuration from `path` (missing file means defaults),
/// then apply `SHELLFLOW_*` environment overrides.
pub fn load_config(path: &str) -> EngineConfig {
    let config = EngineConfig::load(path).unwrap_or_else(|e| {
        eprintln!("Failed to load config '{}': {}", path, e);
        std::process::exit(1);
    });
    config.from_env()
}

/// Initialize a shared `AppState` from the given SQLite database path.
///
/// This mirrors `shellflow_server::create_app_state` but avoids starting
/// the HTTP server for non-server commands.
pub fn init_state(db_path: &str, config: EngineConfig) -> AppState {
    let db = shellflow_core::Database::open(db_path).unwrap_or_else(|e| {
        eprintln!("Failed to open database '{}': {}", db_path, e);
        std::process::exit(1);
    });

    Arc::new(shellflow_core::AppStateInner::new(db, config))
}

/// Resolve `--cwd`, defaulting to the process working directory.
pub fn resolve_cwd(cwd: Option<&str>) -> String {
    match cwd {
        Some(dir) if !dir.is_empty() => dir.to_string(),
        _ => std::env::current_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| ".".to_string()),
    }
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Print a value as one compact JSON line.
pub fn print_json_line<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => eprintln!("Failed to encode frame: {}", e),
    }
}
