use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use emberd::Config;
use emberd::Engine;
use emberd::LogLevel;
use emberd::api;

#[derive(Parser)]
#[command(name = "emberd", about = "Fireplace bridge daemon")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "emberd.toml")]
    config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)?;

    let level: LogLevel = match &args.log_level {
        Some(s) => s.parse().map_err(Box::<dyn std::error::Error>::from)?,
        None => config.logging.level,
    };
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(level))
        .init();

    tracing::info!("emberd starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let mut engine = Engine::new();
    engine.register_integrations_from_config(&config);
    let engine = Arc::new(engine);

    // Engine event loop runs for the process lifetime.
    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run().await })
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let api_task = if config.api.enabled {
        let listen = config.api.listen.clone();
        let port = config.api.port;
        let engine = engine.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(listen, port, engine, shutdown_rx).await {
                tracing::error!("API server error: {}", e);
            }
        }))
    } else {
        None
    };

    tracing::info!("All integrations started, entering main loop");
    tracing::info!("Press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    let _ = shutdown_tx.send(());
    if let Some(task) = api_task {
        let _ = task.await;
    }
    engine_task.abort();

    tracing::info!("emberd shutdown complete");
    Ok(())
}
