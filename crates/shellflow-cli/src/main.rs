//! Shellflow CLI — run shell commands and command workflows.
//!
//! Reuses the same core engine (shellflow-core) and server bootstrap
//! (shellflow-server) that back the HTTP API.

use clap::{Parser, Subcommand};

use shellflow_cli::commands;

/// Shellflow CLI — command execution and workflow orchestration
#[derive(Parser)]
#[command(
    name = "shellflow",
    version,
    about = "Shellflow CLI — command execution and workflow orchestration"
)]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "SHELLFLOW_DB_PATH", default_value = "shellflow.db")]
    db: String,

    /// Path to the engine configuration (YAML). Missing file means defaults.
    #[arg(long, env = "SHELLFLOW_CONFIG", default_value = "shellflow.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command to completion and print the execution record
    Exec {
        /// Shell command line
        command: String,
        /// Working directory (defaults to the current directory)
        #[arg(long)]
        cwd: Option<String>,
        /// Timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Extra environment variable, KEY=VALUE (repeatable)
        #[arg(long = "env", value_parser = commands::exec::parse_env_pair)]
        env: Vec<(String, String)>,
    },

    /// Run a command and stream its output as JSON lines
    Stream {
        /// Shell command line
        command: String,
        /// Working directory (defaults to the current directory)
        #[arg(long)]
        cwd: Option<String>,
    },

    /// Run or validate workflow definitions
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Start the Shellflow HTTP server
    Server {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3210)]
        port: u16,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Run a workflow file, printing progress frames
    Run {
        /// Path to a YAML or JSON workflow definition
        file: String,
        /// Working directory for the steps (defaults to the current directory)
        #[arg(long)]
        cwd: Option<String>,
    },
    /// Validate a workflow file without running it
    Validate {
        /// Path to a YAML or JSON workflow definition
        file: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shellflow_core=warn,shellflow_cli=info".into()),
        )
        .init();

    let result = if let Some(command) = cli.command {
        let config = commands::load_config(&cli.config);
        match command {
            Commands::Exec {
                command,
                cwd,
                timeout_ms,
                env,
            } => {
                let state = commands::init_state(&cli.db, config);
                let cwd = commands::resolve_cwd(cwd.as_deref());
                commands::exec::run(&state, &command, &cwd, timeout_ms, env).await
            }

            Commands::Stream { command, cwd } => {
                let state = commands::init_state(&cli.db, config);
                let cwd = commands::resolve_cwd(cwd.as_deref());
                commands::stream::run(&state, &command, &cwd).await
            }

            Commands::Workflow { action } => match action {
                WorkflowAction::Run { file, cwd } => {
                    let state = commands::init_state(&cli.db, config);
                    let cwd = commands::resolve_cwd(cwd.as_deref());
                    commands::workflow::run(&state, &file, &cwd).await
                }
                WorkflowAction::Validate { file } => commands::workflow::validate(&file).await,
            },

            Commands::Server { host, port } => {
                commands::server::run(host, port, cli.db, config).await
            }
        }
    } else {
        // No subcommand — show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(0)
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
