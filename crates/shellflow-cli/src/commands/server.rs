//! `shellflow server` — Start the Shellflow HTTP server.

use shellflow_core::EngineConfig;

pub async fn run(
    host: String,
    port: u16,
    db_path: String,
    engine: EngineConfig,
) -> Result<i32, String> {
    let config = shellflow_server::ServerConfig {
        host: host.clone(),
        port,
        db_path,
        engine,
    };

    println!("Starting Shellflow server on {}:{}...", host, port);

    let addr = shellflow_server::start_server(config).await?;
    println!("Shellflow server listening on http://{}", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(0)
}
